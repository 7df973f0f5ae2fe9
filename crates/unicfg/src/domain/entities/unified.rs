//! UnifiedConfiguration - Transient `{personality, role, agent}` aggregate
//!
//! Not persisted as such; its consistency is derived from the three owned
//! entities plus the checksum of the rendered file artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{
    Agent, AgentDraft, AgentPatch, CustomRole, PersonalityConfiguration, PersonalityDraft,
    PersonalityPatch, RoleDraft, RolePatch,
};
use crate::domain::errors::DomainError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedConfiguration {
    pub personality: PersonalityConfiguration,
    pub role: CustomRole,
    pub agent: Agent,
}

impl UnifiedConfiguration {
    pub fn agent_id(&self) -> Uuid {
        self.agent.id
    }

    /// Aggregate version (the agent's metadata version)
    pub fn version(&self) -> u64 {
        self.agent.metadata.version
    }

    /// SHA-256 (hex) of the canonical JSON form
    pub fn checksum(&self) -> Result<String, DomainError> {
        let bytes =
            serde_json::to_vec(self).map_err(|e| DomainError::Serialization(e.to_string()))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// The request that would recreate this configuration
    pub fn to_request(&self) -> UnifiedConfigurationRequest {
        UnifiedConfigurationRequest {
            personality: self.personality.to_draft(),
            role: self.role.to_draft(),
            agent: self.agent.to_draft(),
        }
    }
}

/// Request to create a unified configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedConfigurationRequest {
    pub personality: PersonalityDraft,
    pub role: RoleDraft,
    pub agent: AgentDraft,
}

impl UnifiedConfigurationRequest {
    pub fn new(personality: PersonalityDraft, role: RoleDraft, agent: AgentDraft) -> Self {
        Self {
            personality,
            role,
            agent,
        }
    }

    /// The request as it would look after applying `update`
    pub fn patched(&self, update: &UnifiedConfigurationUpdate) -> Self {
        Self {
            personality: match &update.personality {
                Some(patch) => self.personality.patched(patch),
                None => self.personality.clone(),
            },
            role: match &update.role {
                Some(patch) => self.role.patched(patch),
                None => self.role.clone(),
            },
            agent: match &update.agent {
                Some(patch) => self.agent.patched(patch),
                None => self.agent.clone(),
            },
        }
    }
}

/// Partial update of a unified configuration
///
/// Subsystems left as `None` are not touched. `expected_version` is the
/// aggregate version the caller read; `timestamp` orders concurrent writers
/// and defaults to the time the coordinator receives the update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedConfigurationUpdate {
    #[serde(default)]
    pub expected_version: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub personality: Option<PersonalityPatch>,
    #[serde(default)]
    pub role: Option<RolePatch>,
    #[serde(default)]
    pub agent: Option<AgentPatch>,
}

impl UnifiedConfigurationUpdate {
    pub fn is_empty(&self) -> bool {
        self.personality.as_ref().map_or(true, PersonalityPatch::is_empty)
            && self.role.as_ref().map_or(true, RolePatch::is_empty)
            && self.agent.as_ref().map_or(true, AgentPatch::is_empty)
    }

    pub fn with_expected_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Field-level union of two updates; fields set in `later` win
    pub fn merge(self, later: UnifiedConfigurationUpdate) -> Self {
        Self {
            expected_version: later.expected_version.or(self.expected_version),
            timestamp: later.timestamp.or(self.timestamp),
            personality: merge_patch(self.personality, later.personality, PersonalityPatch::merge),
            role: merge_patch(self.role, later.role, RolePatch::merge),
            agent: merge_patch(self.agent, later.agent, AgentPatch::merge),
        }
    }

    pub fn personality_changes(&self) -> Option<&PersonalityPatch> {
        self.personality.as_ref().filter(|p| !p.is_empty())
    }

    pub fn role_changes(&self) -> Option<&RolePatch> {
        self.role.as_ref().filter(|p| !p.is_empty())
    }
}

fn merge_patch<T>(earlier: Option<T>, later: Option<T>, merge: fn(T, T) -> T) -> Option<T> {
    match (earlier, later) {
        (Some(e), Some(l)) => Some(merge(e, l)),
        (e, l) => l.or(e),
    }
}
