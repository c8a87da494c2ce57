//! TOML Configuration File Support
//!
//! Loads client configuration from `~/.config/threadline/config.toml`.
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! base_url = "http://localhost:8000"
//! user_id = "local-user"
//! request_timeout_secs = 30
//! connect_timeout_secs = 10
//!
//! [stream]
//! apply_batch_size = 8
//! max_frame_bytes = 1048576
//!
//! [chat]
//! workspace_id = "default"
//! plan_mode = false
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sse::DEFAULT_MAX_FRAME_BYTES;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Where the configuration was last changed from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Command-line argument
    Cli,
    /// Environment variable
    Env,
    /// TOML configuration file
    File,
    /// Built-in default
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[server]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Chat service root URL
    pub base_url: Option<String>,

    /// Value sent in the `X-User-Id` header
    pub user_id: Option<String>,

    /// Replay request timeout in seconds
    pub request_timeout_secs: Option<u64>,

    /// Connect timeout in seconds
    pub connect_timeout_secs: Option<u64>,
}

/// `[stream]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// Queued updates applied per flush
    pub apply_batch_size: Option<usize>,

    /// Largest accepted SSE frame in bytes
    pub max_frame_bytes: Option<usize>,
}

/// `[chat]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Workspace to send turns to
    pub workspace_id: Option<String>,

    /// Default plan-mode flag
    pub plan_mode: Option<bool>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadlineToml {
    /// Server section
    pub server: ServerToml,

    /// Stream section
    pub stream: StreamToml,

    /// Chat section
    pub chat: ChatToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved client configuration
#[derive(Clone, Debug)]
pub struct ThreadlineConfig {
    /// Chat service root URL
    pub base_url: String,

    /// Static user identity
    pub user_id: String,

    /// Replay request timeout
    pub request_timeout: Duration,

    /// Connect timeout
    pub connect_timeout: Duration,

    /// Queued updates applied per flush
    pub apply_batch_size: usize,

    /// Largest accepted SSE frame in bytes
    pub max_frame_bytes: usize,

    /// Workspace to send turns to
    pub workspace_id: String,

    /// Default plan-mode flag
    pub plan_mode: bool,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for ThreadlineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            user_id: "local-user".to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            apply_batch_size: 8,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            workspace_id: "default".to_string(),
            plan_mode: false,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ThreadlineConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the configuration was last changed from
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check values that would make the client unusable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for an empty base URL or
    /// user id, a zero batch size, or a zero frame limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "server.base_url must not be empty".to_string(),
            ));
        }
        if self.user_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "server.user_id must not be empty".to_string(),
            ));
        }
        if self.apply_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "stream.apply_batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "stream.max_frame_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/threadline/config.toml` when a config
/// directory is known.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("threadline").join("config.toml"))
}

/// Load configuration from the default path, then the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error.
pub fn load_config() -> Result<ThreadlineConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the environment
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ThreadlineConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_with_env<F>(
    path: Option<PathBuf>,
    env: F,
) -> Result<ThreadlineConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ThreadlineConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ThreadlineToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);

    Ok(config)
}

fn apply_toml_config(config: &mut ThreadlineConfig, toml: &ThreadlineToml) {
    if let Some(ref url) = toml.server.base_url {
        config.base_url.clone_from(url);
    }
    if let Some(ref user) = toml.server.user_id {
        config.user_id.clone_from(user);
    }
    if let Some(secs) = toml.server.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.server.connect_timeout_secs {
        config.connect_timeout = Duration::from_secs(secs);
    }

    if let Some(size) = toml.stream.apply_batch_size {
        config.apply_batch_size = size;
    }
    if let Some(bytes) = toml.stream.max_frame_bytes {
        config.max_frame_bytes = bytes;
    }

    if let Some(ref workspace) = toml.chat.workspace_id {
        config.workspace_id.clone_from(workspace);
    }
    if let Some(plan_mode) = toml.chat.plan_mode {
        config.plan_mode = plan_mode;
    }
}

fn apply_env_config<F>(config: &mut ThreadlineConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = env("THREADLINE_BASE_URL") {
        config.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(user) = env("THREADLINE_USER_ID") {
        config.user_id = user;
        config.source = ConfigSource::Env;
    }
    if let Some(workspace) = env("THREADLINE_WORKSPACE") {
        config.workspace_id = workspace;
        config.source = ConfigSource::Env;
    }
    if let Some(size) = env("THREADLINE_BATCH_SIZE") {
        if let Ok(n) = size.parse::<usize>() {
            config.apply_batch_size = n;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(timeout) = env("THREADLINE_TIMEOUT") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.request_timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Base URL override
    pub base_url: Option<String>,

    /// User id override
    pub user_id: Option<String>,

    /// Workspace override
    pub workspace_id: Option<String>,

    /// Batch size override
    pub apply_batch_size: Option<usize>,

    /// Plan mode override
    pub plan_mode: Option<bool>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Set user id override
    #[must_use]
    pub fn with_user_id(mut self, user: String) -> Self {
        self.user_id = Some(user);
        self
    }

    /// Set workspace override
    #[must_use]
    pub fn with_workspace_id(mut self, workspace: String) -> Self {
        self.workspace_id = Some(workspace);
        self
    }

    /// Set batch size override
    #[must_use]
    pub fn with_apply_batch_size(mut self, size: usize) -> Self {
        self.apply_batch_size = Some(size);
        self
    }

    /// Set plan mode override
    #[must_use]
    pub fn with_plan_mode(mut self, plan_mode: bool) -> Self {
        self.plan_mode = Some(plan_mode);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ThreadlineConfig) {
        if self.base_url.is_some()
            || self.user_id.is_some()
            || self.workspace_id.is_some()
            || self.apply_batch_size.is_some()
            || self.plan_mode.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.base_url {
            config.base_url.clone_from(url);
        }
        if let Some(ref user) = self.user_id {
            config.user_id.clone_from(user);
        }
        if let Some(ref workspace) = self.workspace_id {
            config.workspace_id.clone_from(workspace);
        }
        if let Some(size) = self.apply_batch_size {
            config.apply_batch_size = size;
        }
        if let Some(plan_mode) = self.plan_mode {
            config.plan_mode = plan_mode;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
