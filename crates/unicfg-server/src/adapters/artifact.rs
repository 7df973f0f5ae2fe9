//! Filesystem implementation of ConfigurationFileService
//!
//! Renders each unified configuration to `<root>/<agent_id>.json`. Writes go
//! through a temporary file and a rename so readers never see a torn file.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use unicfg::{
    AgentDraft, ConfigurationFile, ConfigurationFileService, DomainError, Operation, ServiceName,
    UnifiedConfiguration, ValidationIssue, ValidationResult,
};

use super::memory::FaultPlan;

const SERVICE: ServiceName = ServiceName::File;
const MAX_NAME_LEN: usize = 128;

/// On-disk layout of an artifact
#[derive(Debug, Serialize, Deserialize)]
struct ArtifactDocument {
    file: ConfigurationFile,
    configuration: UnifiedConfiguration,
}

pub struct FsConfigurationFiles {
    root: PathBuf,
    /// Bytes before the last write/delete; `None` when the file did not exist
    undo: Mutex<HashMap<Uuid, Option<Vec<u8>>>>,
    faults: FaultPlan,
}

impl FsConfigurationFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            undo: Mutex::new(HashMap::new()),
            faults: FaultPlan::new(),
        }
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, agent_id: Uuid) -> PathBuf {
        self.root.join(format!("{}.json", agent_id))
    }

    async fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>, DomainError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DomainError::Repository(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<(), DomainError> {
        let io_err = |e: std::io::Error| {
            DomainError::Repository(format!("Failed to write {}: {}", path.display(), e))
        };
        tokio::fs::create_dir_all(&self.root).await.map_err(io_err)?;
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&staging, path).await.map_err(io_err)
    }

    async fn remove(path: &Path) -> Result<(), DomainError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DomainError::Repository(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl ConfigurationFileService for FsConfigurationFiles {
    async fn write(&self, config: &UnifiedConfiguration) -> Result<ConfigurationFile, DomainError> {
        let agent_id = config.agent_id();
        let path = self.path_for(agent_id);
        let previous = Self::read_bytes(&path).await?;
        let operation = if previous.is_some() {
            Operation::Update
        } else {
            Operation::Create
        };
        self.faults.enact(SERVICE, operation).await?;

        let file = ConfigurationFile::new(
            agent_id,
            path.display().to_string(),
            config.checksum()?,
            config.version(),
        );
        let document = ArtifactDocument {
            file: file.clone(),
            configuration: config.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| DomainError::Serialization(e.to_string()))?;

        self.write_bytes(&path, &bytes).await?;
        self.undo.lock().insert(agent_id, previous);

        tracing::debug!(agent_id = %agent_id, version = file.version, "Wrote configuration file");
        Ok(file)
    }

    async fn read(&self, agent_id: Uuid) -> Result<Option<ConfigurationFile>, DomainError> {
        self.faults.enact(SERVICE, Operation::Read).await?;
        let Some(bytes) = Self::read_bytes(&self.path_for(agent_id)).await? else {
            return Ok(None);
        };
        let document: ArtifactDocument = serde_json::from_slice(&bytes)
            .map_err(|e| DomainError::Serialization(e.to_string()))?;
        Ok(Some(document.file))
    }

    async fn delete(&self, agent_id: Uuid) -> Result<(), DomainError> {
        self.faults.enact(SERVICE, Operation::Delete).await?;
        let path = self.path_for(agent_id);
        let previous = Self::read_bytes(&path)
            .await?
            .ok_or_else(|| DomainError::not_found("ConfigurationFile", agent_id))?;

        Self::remove(&path).await?;
        self.undo.lock().insert(agent_id, Some(previous));
        Ok(())
    }

    /// Agent names end up in the artifact and must be safe to render
    async fn validate_entity(&self, draft: &AgentDraft) -> Result<ValidationResult, DomainError> {
        self.faults.enact(SERVICE, Operation::Validate).await?;

        let name = &draft.name;
        let unsafe_char = name
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control());
        let mut errors = Vec::new();
        if unsafe_char {
            errors.push(ValidationIssue::new(
                "agent.name",
                "INVALID_FILE_NAME",
                format!(
                    "agent name '{}' contains path separators or control characters; remove them",
                    name.escape_debug()
                ),
            ));
        }
        if name.chars().count() > MAX_NAME_LEN {
            errors.push(ValidationIssue::new(
                "agent.name",
                "INVALID_FILE_NAME",
                format!("agent name is longer than {} characters; shorten it", MAX_NAME_LEN),
            ));
        }
        Ok(ValidationResult::from_errors(errors))
    }

    async fn rollback(&self, agent_id: Uuid) -> Result<(), DomainError> {
        self.faults.enact(SERVICE, Operation::Rollback).await?;
        let Some(previous) = self.undo.lock().remove(&agent_id) else {
            return Ok(());
        };

        let path = self.path_for(agent_id);
        let restored = match &previous {
            Some(bytes) => self.write_bytes(&path, bytes).await,
            None => Self::remove(&path).await,
        };
        if restored.is_err() {
            // Keep the pre-image so a later recovery can retry
            self.undo.lock().insert(agent_id, previous);
        }
        restored
    }

    fn release(&self, agent_id: Uuid) {
        self.undo.lock().remove(&agent_id);
    }
}
