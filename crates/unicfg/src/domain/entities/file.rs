//! ConfigurationFile - Rendered artifact of a unified configuration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationFile {
    pub agent_id: Uuid,
    pub path: String,
    /// SHA-256 (hex) of the canonical JSON of the unified configuration
    pub checksum: String,
    /// Aggregate version the file was rendered from
    pub version: u64,
    pub written_at: DateTime<Utc>,
}

impl ConfigurationFile {
    pub fn new(agent_id: Uuid, path: String, checksum: String, version: u64) -> Self {
        Self {
            agent_id,
            path,
            checksum,
            version,
            written_at: Utc::now(),
        }
    }
}
