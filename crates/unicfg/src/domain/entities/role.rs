//! CustomRole - Capabilities and constraints assigned to an agent
//!
//! Owned by the Role subsystem; referenced by Agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRole {
    pub id: Uuid,
    pub name: String,
    pub capabilities: Vec<String>,
    pub constraints: Vec<String>,
    /// Role template this role was derived from
    pub template_id: Option<Uuid>,
    /// Customizations applied on top of the template
    pub customizations: Vec<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDraft {
    pub name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub template_id: Option<Uuid>,
    #[serde(default)]
    pub customizations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePatch {
    pub name: Option<String>,
    pub capabilities: Option<Vec<String>>,
    pub constraints: Option<Vec<String>>,
    pub template_id: Option<Uuid>,
    pub customizations: Option<Vec<String>>,
}

impl CustomRole {
    pub fn new(draft: &RoleDraft) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: draft.name.clone(),
            capabilities: draft.capabilities.clone(),
            constraints: draft.constraints.clone(),
            template_id: draft.template_id,
            customizations: draft.customizations.clone(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&self, patch: &RolePatch) -> Self {
        let draft = self.to_draft().patched(patch);
        Self {
            name: draft.name,
            capabilities: draft.capabilities,
            constraints: draft.constraints,
            template_id: draft.template_id,
            customizations: draft.customizations,
            version: self.version + 1,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn to_draft(&self) -> RoleDraft {
        RoleDraft {
            name: self.name.clone(),
            capabilities: self.capabilities.clone(),
            constraints: self.constraints.clone(),
            template_id: self.template_id,
            customizations: self.customizations.clone(),
        }
    }
}

impl RoleDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
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

    pub fn with_template(mut self, template_id: Uuid) -> Self {
        self.template_id = Some(template_id);
        self
    }

    pub fn patched(&self, patch: &RolePatch) -> Self {
        Self {
            name: patch.name.clone().unwrap_or_else(|| self.name.clone()),
            capabilities: patch
                .capabilities
                .clone()
                .unwrap_or_else(|| self.capabilities.clone()),
            constraints: patch
                .constraints
                .clone()
                .unwrap_or_else(|| self.constraints.clone()),
            template_id: patch.template_id.or(self.template_id),
            customizations: patch
                .customizations
                .clone()
                .unwrap_or_else(|| self.customizations.clone()),
        }
    }
}

impl RolePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.capabilities.is_none()
            && self.constraints.is_none()
            && self.template_id.is_none()
            && self.customizations.is_none()
    }

    pub fn merge(self, later: RolePatch) -> Self {
        Self {
            name: later.name.or(self.name),
            capabilities: later.capabilities.or(self.capabilities),
            constraints: later.constraints.or(self.constraints),
            template_id: later.template_id.or(self.template_id),
            customizations: later.customizations.or(self.customizations),
        }
    }
}
