use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "docpatch";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Chat-completions API version the Azure deployment is called with.
pub const DEFAULT_API_VERSION: &str = "2023-12-01-preview";

/// Default deployment name of the chat model.
pub const DEFAULT_DEPLOYMENT: &str = "gpt4o";

/// Request timeout for one analysis call (seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Maximum source-text length embedded in a prompt (characters).
pub const DEFAULT_MAX_SOURCE_CHARS: usize = 50_000;

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "docpatch=info,warn"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// How the API key is presented to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// Azure OpenAI: `api-key: <key>`.
    #[default]
    ApiKeyHeader,
    /// OpenAI-compatible: `Authorization: Bearer <key>`.
    Bearer,
}

/// Settings for the remote analysis service and the pass around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Base URL, e.g. `https://my-resource.openai.azure.com`.
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
    pub auth_scheme: AuthScheme,
    /// Overrides the task's default sampling temperature.
    pub temperature: Option<f32>,
    /// Overrides the task's default completion budget.
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
    pub max_source_chars: usize,
    /// Inserted paragraphs take the style of the unit they follow.
    pub inherit_style: bool,
    /// When set, each pass writes its structure, prompt, reply and report here.
    pub dump_dir: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            deployment: DEFAULT_DEPLOYMENT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            auth_scheme: AuthScheme::default(),
            temperature: None,
            max_tokens: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_source_chars: DEFAULT_MAX_SOURCE_CHARS,
            inherit_style: true,
            dump_dir: None,
        }
    }
}

impl AnalysisConfig {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Load from a JSON file; absent fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_json::from_str(&raw)?;
        config.endpoint = config.endpoint.trim_end_matches('/').to_string();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint is required".into()));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "endpoint must be an http(s) URL, got {}",
                self.endpoint
            )));
        }
        if self.deployment.trim().is_empty() {
            return Err(ConfigError::Invalid("deployment is required".into()));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::Invalid(format!(
                    "temperature must be within 0.0..=2.0, got {t}"
                )));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(ConfigError::Invalid("max_tokens must be positive".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".into()));
        }
        Ok(())
    }

    /// Full chat-completions URL of the deployment.
    pub fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }
}
