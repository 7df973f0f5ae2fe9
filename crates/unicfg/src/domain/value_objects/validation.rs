//! ValidationResult - Outcome of validating a configuration request

use serde::{Deserialize, Serialize};

/// Validation layers, run in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLayer {
    Schema,
    BusinessRules,
    Security,
    Dependency,
}

impl ValidationLayer {
    pub const ORDER: [ValidationLayer; 4] = [
        ValidationLayer::Schema,
        ValidationLayer::BusinessRules,
        ValidationLayer::Security,
        ValidationLayer::Dependency,
    ];
}

impl std::fmt::Display for ValidationLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationLayer::Schema => write!(f, "schema"),
            ValidationLayer::BusinessRules => write!(f, "business_rules"),
            ValidationLayer::Security => write!(f, "security"),
            ValidationLayer::Dependency => write!(f, "dependency"),
        }
    }
}

/// A single validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Offending field, e.g. `role.capabilities`
    pub field: String,
    /// Stable machine-readable code, e.g. `CAPABILITY_CONSTRAINT_CONFLICT`
    pub code: String,
    /// Human-actionable message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<ValidationLayer>,
}

impl ValidationIssue {
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
            layer: None,
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.field, self.code, self.message)
    }
}

/// Result of a validation call; never mutated after return
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<ValidationIssue>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Combine two results of the same layer
    pub fn merge(mut self, other: ValidationResult) -> Self {
        self.errors.extend(other.errors);
        self.is_valid = self.errors.is_empty();
        self
    }

    /// Tag every untagged issue with the layer that produced it
    pub fn with_layer(mut self, layer: ValidationLayer) -> Self {
        for issue in &mut self.errors {
            issue.layer.get_or_insert(layer);
        }
        self
    }

    /// Issue codes, in order
    pub fn codes(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.code.as_str()).collect()
    }

    /// One-line summary of every issue
    pub fn summary(&self) -> String {
        if self.errors.is_empty() {
            return "no errors".to_string();
        }
        let details: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        format!("{} error(s): {}", self.errors.len(), details.join("; "))
    }
}
