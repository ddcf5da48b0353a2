//! Pipeline configuration
//!
//! Precedence, lowest first: built-in defaults, YAML file, environment, CLI flags.
//! The CLI layer applies its own overrides after [`PipelineConfig::load`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::pipeline::roles::RoleTable;
use crate::workflow_utils::RetryPolicy;

/// Env var overriding `gateway.base_url`
pub const ENV_BASE_URL: &str = "ARCHGEN_BASE_URL";
/// Env var overriding `gateway.model`
pub const ENV_MODEL: &str = "ARCHGEN_MODEL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub retry: RetryPolicy,

    /// Concurrent specialist vision calls; 1 runs them sequentially
    pub vision_concurrency: usize,

    pub continuation: ContinuationSettings,

    pub context: ContextLimits,

    pub gateway: GatewaySettings,

    pub role_table: RoleTable,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            vision_concurrency: 1,
            continuation: ContinuationSettings::default(),
            context: ContextLimits::default(),
            gateway: GatewaySettings::default(),
            role_table: RoleTable::default(),
        }
    }
}

/// Bounds of the long-form continuation loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuationSettings {
    /// Continuation calls allowed after the first draft
    pub max_rounds: u32,

    /// Characters of accumulated content replayed in each continuation prompt
    pub tail_window_chars: usize,
}

impl Default for ContinuationSettings {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            tail_window_chars: 4000,
        }
    }
}

/// Prompt-size limits for dependency and vision context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextLimits {
    /// Characters of each dependency's content included in a unit prompt
    pub excerpt_chars: usize,

    /// Characters of the integrated vision included in a unit prompt
    pub vision_slice_chars: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            excerpt_chars: 2000,
            vision_slice_chars: 3000,
        }
    }
}

/// Model endpoint settings for [`crate::gateway::HttpGateway`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub base_url: String,
    pub model: String,

    /// Name of the env var holding the API key; the key itself is never stored
    pub api_key_env: String,

    pub timeout_secs: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "openai/gpt-4o".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            timeout_secs: 120,
            max_tokens: Some(8192),
            temperature: Some(0.2),
        }
    }
}

impl PipelineConfig {
    /// Load defaults, then the YAML file, then environment overrides.
    ///
    /// An explicit `path` must exist; without one the per-user config file is
    /// read when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_BASE_URL) {
            if !url.trim().is_empty() {
                self.gateway.base_url = url;
            }
        }
        if let Ok(model) = std::env::var(ENV_MODEL) {
            if !model.trim().is_empty() {
                self.gateway.model = model;
            }
        }
    }
}

/// `config.yaml` in the per-user config directory
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "archgen", "archgen")
        .map(|dirs| dirs.config_dir().join("config.yaml"))
}

/// Default location of the SQLite job database
pub fn default_jobs_db_path() -> PathBuf {
    if let Some(dirs) = directories::ProjectDirs::from("com", "archgen", "archgen") {
        dirs.data_dir().join("jobs.db")
    } else {
        PathBuf::from(".archgen-jobs.db")
    }
}
