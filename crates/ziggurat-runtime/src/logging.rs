//! Logging setup over `tracing-subscriber`.
//!
//! Initialized once from the configuration's logging section; `RUST_LOG`
//! takes precedence over the configured base level when set.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Initialize logging from a [`LoggingConfig`]. Safe to call more than
/// once; only the first initialization wins.
pub fn init_from_config(config: &LoggingConfig) {
    LoggingBuilder::from_config(config).init();
}

/// Builder for the tracing subscriber.
///
/// ```rust,ignore
/// LoggingBuilder::new()
///     .directive("ziggurat_framework=debug")
///     .init();
/// ```
#[derive(Default)]
pub struct LoggingBuilder {
    base_level: Option<&'static str>,
    directives: Vec<String>,
    format: LogFormat,
    file: Option<PathBuf>,
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut builder = Self::new();
        builder.base_level = Some(config.level.as_str());
        builder.format = config.format;
        builder.file.clone_from(&config.file);
        for (module, level) in &config.filters {
            builder.directives.push(format!("{}={}", module, level.as_str()));
        }
        builder
    }

    /// Add a filter directive, e.g. `"ziggurat_framework=trace"`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Initialize, ignoring a second initialization attempt.
    pub fn init(self) {
        let _ = self.try_init();
    }

    pub fn try_init(self) -> Result<(), TryInitError> {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.base_level.unwrap_or("info")));
        for directive in &self.directives {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }

        macro_rules! init_with_writer {
            ($writer:expr) => {
                match self.format {
                    LogFormat::Compact => tracing_subscriber::registry()
                        .with(fmt::layer().compact().with_writer($writer))
                        .with(filter)
                        .try_init(),
                    LogFormat::Full => tracing_subscriber::registry()
                        .with(fmt::layer().with_writer($writer))
                        .with(filter)
                        .try_init(),
                    LogFormat::Pretty => tracing_subscriber::registry()
                        .with(fmt::layer().pretty().with_writer($writer))
                        .with(filter)
                        .try_init(),
                }
            };
        }

        match &self.file {
            Some(path) => {
                let appender = tracing_appender::rolling::never(
                    path.parent().unwrap_or_else(|| Path::new(".")),
                    path.file_name().unwrap_or_else(|| OsStr::new("ziggurat.log")),
                );
                init_with_writer!(appender)
            }
            None => init_with_writer!(std::io::stdout),
        }
    }
}
