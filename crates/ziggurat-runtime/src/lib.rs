//! Configuration, logging and process assembly for the Ziggurat chat bot.

pub mod config;
pub mod logging;
pub mod runtime;

pub use config::{
    BotConfig, ConfigError, ConfigLoader, ConfigResult, Environment, LogFormat,
    LogLevel, LoggingConfig,
};
pub use logging::{init_from_config, LoggingBuilder};
pub use runtime::Runtime;
