//! Engine configuration, with optional TOML file loading.
//!
//! Every field has a serde default so a partial `amanu.toml` works; the
//! whole struct defaults to a memory-only engine with console logging.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::query::QueryLimits;

/// Configuration for the amanu engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Data directory for the durable store. `None` for memory-only mode.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Mirror log events into the durable store. Requires `data_dir`.
    #[serde(default)]
    pub durable_log: bool,
    /// Per-kind result limit when the caller names none.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Hard per-kind result cap.
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    /// Most candidates an ambiguous resolution carries.
    #[serde(default = "default_candidate_cap")]
    pub candidate_cap: usize,
    /// Ring-buffer capacity of the in-memory log sink.
    #[serde(default = "default_memory_log_events")]
    pub memory_log_events: usize,
    /// Idle minutes after which `evict_idle_contexts` drops a conversation.
    #[serde(default = "default_context_idle_minutes")]
    pub context_idle_minutes: u64,
}

fn default_limit() -> usize {
    10
}
fn default_max_limit() -> usize {
    50
}
fn default_candidate_cap() -> usize {
    5
}
fn default_memory_log_events() -> usize {
    256
}
fn default_context_idle_minutes() -> u64 {
    240
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            durable_log: false,
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            candidate_cap: default_candidate_cap(),
            memory_log_events: default_memory_log_events(),
            context_idle_minutes: default_context_idle_minutes(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Read {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Cross-field checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_limit == 0 || self.max_limit == 0 {
            return Err(ConfigError::Invalid {
                message: "limits must be greater than zero".into(),
            });
        }
        if self.default_limit > self.max_limit {
            return Err(ConfigError::Invalid {
                message: format!(
                    "default_limit ({}) exceeds max_limit ({})",
                    self.default_limit, self.max_limit
                ),
            });
        }
        if self.candidate_cap == 0 {
            return Err(ConfigError::Invalid {
                message: "candidate_cap must be greater than zero".into(),
            });
        }
        if self.durable_log && self.data_dir.is_none() {
            return Err(ConfigError::Invalid {
                message: "durable_log requires a data_dir".into(),
            });
        }
        Ok(())
    }

    /// The per-kind limits the query engine applies.
    pub fn limits(&self) -> QueryLimits {
        QueryLimits {
            default_limit: self.default_limit,
            max_limit: self.max_limit,
        }
    }
}
