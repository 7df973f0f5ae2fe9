//! Agent - Aggregate root of a unified configuration
//!
//! References a personality and a role by id. Its `metadata.version` is the
//! version of the whole unified configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form runtime settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,
    /// Maximum tokens per response
    pub max_tokens: u32,
    /// Region the agent's data must stay in
    #[serde(default)]
    pub data_residency: Option<String>,
    #[serde(default = "default_encryption")]
    pub encryption_at_rest: bool,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_encryption() -> bool {
    true
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 4096,
            data_residency: None,
            encryption_at_rest: true,
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub version: u64,
    pub is_active: bool,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub personality_id: Uuid,
    pub role_id: Uuid,
    pub role_name: String,
    pub model: String,
    pub capabilities: Vec<String>,
    pub constraints: Vec<String>,
    pub settings: AgentSettings,
    pub metadata: AgentMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentDraft {
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub settings: AgentSettings,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// References resolved by the coordinator before the agent is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLinks {
    pub personality_id: Uuid,
    pub role_id: Uuid,
    pub role_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPatch {
    pub name: Option<String>,
    pub model: Option<String>,
    pub capabilities: Option<Vec<String>>,
    pub constraints: Option<Vec<String>>,
    pub settings: Option<AgentSettings>,
    pub tags: Option<Vec<String>>,
    /// Set by the coordinator when the linked role is renamed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
}

impl Agent {
    pub fn new(draft: &AgentDraft, links: &AgentLinks) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: draft.name.clone(),
            personality_id: links.personality_id,
            role_id: links.role_id,
            role_name: links.role_name.clone(),
            model: draft.model.clone(),
            capabilities: draft.capabilities.clone(),
            constraints: draft.constraints.clone(),
            settings: draft.settings.clone(),
            metadata: AgentMetadata {
                version: 1,
                is_active: true,
                tags: draft.tags.clone(),
                created_at: now,
                updated_at: now,
                archived_at: None,
            },
        }
    }

    /// Apply a patch; always produces the next version, even for an empty patch
    pub fn apply(&self, patch: &AgentPatch) -> Self {
        let draft = self.to_draft().patched(patch);
        Self {
            id: self.id,
            name: draft.name,
            personality_id: self.personality_id,
            role_id: self.role_id,
            role_name: patch
                .role_name
                .clone()
                .unwrap_or_else(|| self.role_name.clone()),
            model: draft.model,
            capabilities: draft.capabilities,
            constraints: draft.constraints,
            settings: draft.settings,
            metadata: AgentMetadata {
                version: self.metadata.version + 1,
                tags: draft.tags,
                updated_at: Utc::now(),
                ..self.metadata.clone()
            },
        }
    }

    /// Metadata-only transition; references are preserved
    pub fn archived(&self) -> Self {
        let now = Utc::now();
        Self {
            metadata: AgentMetadata {
                version: self.metadata.version + 1,
                is_active: false,
                updated_at: now,
                archived_at: Some(now),
                ..self.metadata.clone()
            },
            ..self.clone()
        }
    }

    pub fn is_archived(&self) -> bool {
        self.metadata.archived_at.is_some()
    }

    pub fn to_draft(&self) -> AgentDraft {
        AgentDraft {
            name: self.name.clone(),
            model: self.model.clone(),
            capabilities: self.capabilities.clone(),
            constraints: self.constraints.clone(),
            settings: self.settings.clone(),
            tags: self.metadata.tags.clone(),
        }
    }
}

impl AgentDraft {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn patched(&self, patch: &AgentPatch) -> Self {
        Self {
            name: patch.name.clone().unwrap_or_else(|| self.name.clone()),
            model: patch.model.clone().unwrap_or_else(|| self.model.clone()),
            capabilities: patch
                .capabilities
                .clone()
                .unwrap_or_else(|| self.capabilities.clone()),
            constraints: patch
                .constraints
                .clone()
                .unwrap_or_else(|| self.constraints.clone()),
            settings: patch
                .settings
                .clone()
                .unwrap_or_else(|| self.settings.clone()),
            tags: patch.tags.clone().unwrap_or_else(|| self.tags.clone()),
        }
    }
}

impl AgentPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.model.is_none()
            && self.capabilities.is_none()
            && self.constraints.is_none()
            && self.settings.is_none()
            && self.tags.is_none()
            && self.role_name.is_none()
    }

    pub fn merge(self, later: AgentPatch) -> Self {
        Self {
            name: later.name.or(self.name),
            model: later.model.or(self.model),
            capabilities: later.capabilities.or(self.capabilities),
            constraints: later.constraints.or(self.constraints),
            settings: later.settings.or(self.settings),
            tags: later.tags.or(self.tags),
            role_name: later.role_name.or(self.role_name),
        }
    }
}
