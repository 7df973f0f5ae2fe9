//! ConflictStrategy - How concurrent writes to one aggregate are resolved

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// The change with the latest timestamp wins
    #[default]
    LastWriteWins,
    /// The change with the earliest timestamp wins
    FirstWriteWins,
    /// Field-level union; the latest writer wins per field
    Merge,
}

impl std::fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictStrategy::LastWriteWins => write!(f, "last_write_wins"),
            ConflictStrategy::FirstWriteWins => write!(f, "first_write_wins"),
            ConflictStrategy::Merge => write!(f, "merge"),
        }
    }
}

impl std::str::FromStr for ConflictStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "last_write_wins" | "lww" => Ok(ConflictStrategy::LastWriteWins),
            "first_write_wins" | "fww" => Ok(ConflictStrategy::FirstWriteWins),
            "merge" => Ok(ConflictStrategy::Merge),
            _ => Err(format!("Unknown conflict strategy: {}", s)),
        }
    }
}
