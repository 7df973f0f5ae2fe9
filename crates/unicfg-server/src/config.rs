//! Server configuration
//!
//! Read from an optional TOML file named by `UNICFG_CONFIG`, then overridden
//! by individual `UNICFG_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use unicfg::ConflictStrategy;

use crate::application::CoordinatorConfig;

pub const CONFIG_PATH_VAR: &str = "UNICFG_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub bind_addr: String,
    /// Bearer token for the API; auth is disabled when unset
    pub api_key: Option<String>,
    /// Directory configuration artifacts are rendered into
    pub artifact_dir: PathBuf,
    pub coordinator: CoordinatorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            api_key: None,
            artifact_dir: PathBuf::from("./artifacts"),
            coordinator: CoordinatorConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from `UNICFG_CONFIG` (if set) and the process environment
    pub fn load() -> anyhow::Result<Self> {
        let base = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        base.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `UNICFG_*` overrides; `lookup` returns a variable's value
    pub fn apply_overrides<F>(mut self, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("UNICFG_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(key) = lookup("UNICFG_API_KEY") {
            self.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(dir) = lookup("UNICFG_ARTIFACT_DIR") {
            self.artifact_dir = PathBuf::from(dir);
        }
        if let Some(strategy) = lookup("UNICFG_CONFLICT_STRATEGY") {
            let strategy: ConflictStrategy = strategy
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("UNICFG_CONFLICT_STRATEGY")?;
            self.coordinator = self.coordinator.with_conflict_strategy(strategy);
        }
        if let Some(strict) = lookup("UNICFG_STRICT_VERSIONING") {
            let strict: bool = strict.parse().with_context(|| {
                format!("UNICFG_STRICT_VERSIONING must be true or false, got '{}'", strict)
            })?;
            self.coordinator = self.coordinator.with_strict_versioning(strict);
        }
        Ok(self)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}
