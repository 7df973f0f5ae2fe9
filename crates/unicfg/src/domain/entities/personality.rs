//! PersonalityConfiguration - Traits and instructions shaping an agent
//!
//! Owned by the Personality subsystem; referenced (not owned) by Agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Personality - bounded trait set plus free-text instructions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalityConfiguration {
    pub id: Uuid,
    pub name: String,
    /// Trait name -> value in `0.0..=1.0`
    pub traits: BTreeMap<String, f64>,
    pub instructions: String,
    pub is_template: bool,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data needed to create a personality
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalityDraft {
    pub name: String,
    #[serde(default)]
    pub traits: BTreeMap<String, f64>,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub is_template: bool,
}

/// Partial update; `None` leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalityPatch {
    pub name: Option<String>,
    pub traits: Option<BTreeMap<String, f64>>,
    pub instructions: Option<String>,
    pub is_template: Option<bool>,
}

impl PersonalityConfiguration {
    /// Create a new personality at version 1
    pub fn new(draft: &PersonalityDraft) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: draft.name.clone(),
            traits: draft.traits.clone(),
            instructions: draft.instructions.clone(),
            is_template: draft.is_template,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a patch, producing the next version
    pub fn apply(&self, patch: &PersonalityPatch) -> Self {
        Self {
            id: self.id,
            name: patch.name.clone().unwrap_or_else(|| self.name.clone()),
            traits: patch.traits.clone().unwrap_or_else(|| self.traits.clone()),
            instructions: patch
                .instructions
                .clone()
                .unwrap_or_else(|| self.instructions.clone()),
            is_template: patch.is_template.unwrap_or(self.is_template),
            version: self.version + 1,
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }

    pub fn to_draft(&self) -> PersonalityDraft {
        PersonalityDraft {
            name: self.name.clone(),
            traits: self.traits.clone(),
            instructions: self.instructions.clone(),
            is_template: self.is_template,
        }
    }

    /// Trait value, treating a missing trait as 0.0
    pub fn trait_value(&self, name: &str) -> f64 {
        self.traits.get(name).copied().unwrap_or(0.0)
    }
}

impl PersonalityDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_trait(mut self, name: impl Into<String>, value: f64) -> Self {
        self.traits.insert(name.into(), value);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn patched(&self, patch: &PersonalityPatch) -> Self {
        Self {
            name: patch.name.clone().unwrap_or_else(|| self.name.clone()),
            traits: patch.traits.clone().unwrap_or_else(|| self.traits.clone()),
            instructions: patch
                .instructions
                .clone()
                .unwrap_or_else(|| self.instructions.clone()),
            is_template: patch.is_template.unwrap_or(self.is_template),
        }
    }
}

impl PersonalityPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.traits.is_none()
            && self.instructions.is_none()
            && self.is_template.is_none()
    }

    /// Field-level union; fields set in `later` win
    pub fn merge(self, later: PersonalityPatch) -> Self {
        Self {
            name: later.name.or(self.name),
            traits: later.traits.or(self.traits),
            instructions: later.instructions.or(self.instructions),
            is_template: later.is_template.or(self.is_template),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_bumps_version_and_keeps_untouched_fields() {
        let personality =
            PersonalityConfiguration::new(&PersonalityDraft::new("Calm").with_trait("warmth", 0.8));
        let updated = personality.apply(&PersonalityPatch {
            instructions: Some("Answer briefly".to_string()),
            ..Default::default()
        });

        assert_eq!(updated.id, personality.id);
        assert_eq!(updated.version, 2);
        assert_eq!(updated.name, "Calm");
        assert_eq!(updated.trait_value("warmth"), 0.8);
        assert_eq!(updated.instructions, "Answer briefly");
    }

    #[test]
    fn test_merge_prefers_later_fields() {
        let earlier = PersonalityPatch {
            name: Some("A".to_string()),
            instructions: Some("first".to_string()),
            ..Default::default()
        };
        let later = PersonalityPatch {
            name: Some("B".to_string()),
            ..Default::default()
        };
        let merged = earlier.merge(later);

        assert_eq!(merged.name.as_deref(), Some("B"));
        assert_eq!(merged.instructions.as_deref(), Some("first"));
    }
}
