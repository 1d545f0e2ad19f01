//! Configuration schema and figment-based loader.
//!
//! Sources are layered, later overriding earlier:
//!
//! 1. Built-in defaults
//! 2. `ziggurat.toml` (current directory, then the user config directory)
//! 3. `ziggurat.<profile>.toml` for the active profile
//! 4. `ZIGGURAT_*` environment variables (`__` separates nesting, e.g.
//!    `ZIGGURAT_LOGGING__LEVEL=debug`)
//!
//! The active profile comes from `ZIGGURAT_PROFILE` unless set explicitly
//! on the loader.

use std::collections::BTreeMap;
use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Failures while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(#[from] figment::Error),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Schema
// =============================================================================

/// Root configuration for one bot process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// The bot's login name on the platform.
    #[serde(default = "default_bot_name")]
    pub bot_name: String,

    /// The fixed command prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// The bot's home channel. Defaults to the bot's own name.
    #[serde(default)]
    pub home_channel: Option<String>,

    /// Identities pinned to Admin privilege everywhere.
    #[serde(default)]
    pub operators: Vec<String>,

    /// Channels joined at startup.
    #[serde(default)]
    pub channels: Vec<String>,

    /// Runtime environment; dev marks outbound lines and may echo fault
    /// summaries.
    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_name: default_bot_name(),
            prefix: default_prefix(),
            home_channel: None,
            operators: Vec::new(),
            channels: Vec::new(),
            environment: Environment::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl BotConfig {
    /// The effective home channel.
    pub fn home_channel(&self) -> &str {
        self.home_channel.as_deref().unwrap_or(&self.bot_name)
    }
}

fn default_bot_name() -> String {
    "ziggurat".to_string()
}

fn default_prefix() -> String {
    "+".to_string()
}

/// Runtime environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[serde(alias = "dev")]
    Development,
    #[serde(alias = "prod")]
    Production,
}

impl Environment {
    pub fn is_dev(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// Logging section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    /// Log to this file instead of stdout.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Per-module level overrides, e.g. `ziggurat_framework = "trace"`.
    #[serde(default)]
    pub filters: BTreeMap<String, LogLevel>,
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
}

// =============================================================================
// Loader
// =============================================================================

/// Layered configuration loader.
///
/// ```rust,ignore
/// let config = ConfigLoader::new().profile("production").load()?;
/// ```
#[derive(Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    profile: Option<String>,
    skip_env: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from this file only instead of searching the usual places.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Ignore `ZIGGURAT_*` environment variables. Mostly for tests.
    pub fn skip_env(mut self) -> Self {
        self.skip_env = true;
        self
    }

    pub fn load(self) -> ConfigResult<BotConfig> {
        let profile = self
            .profile
            .or_else(|| std::env::var("ZIGGURAT_PROFILE").ok());

        let mut figment = Figment::from(Serialized::defaults(BotConfig::default()));

        match &self.file {
            Some(file) => {
                debug!(file = %file.display(), "loading configuration file");
                figment = figment.merge(Toml::file(file));
            }
            None => {
                for dir in search_dirs() {
                    figment = figment.merge(Toml::file(dir.join("ziggurat.toml")));
                    if let Some(profile) = &profile {
                        figment = figment
                            .merge(Toml::file(dir.join(format!("ziggurat.{profile}.toml"))));
                    }
                }
            }
        }

        if !self.skip_env {
            figment = figment.merge(Env::prefixed("ZIGGURAT_").split("__"));
        }

        Ok(figment.extract()?)
    }
}

/// Directories searched for configuration files, nearest first.
fn search_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from(".")];
    if let Some(config) = dirs::config_dir() {
        dirs.push(config.join("ziggurat"));
    }
    dirs
}
