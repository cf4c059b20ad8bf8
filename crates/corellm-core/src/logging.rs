//! Process-wide log setup. Nothing is installed implicitly: the entry point
//! calls [`init`] once with the configuration it wants.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::constants::logging::DEFAULT_LEVEL;
use crate::error::CoreLlmError;

/// Where log records go.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSink {
    #[default]
    Stderr,
    /// Append to a file.
    File(PathBuf),
    /// Swallow everything, including backend chatter.
    Silent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    pub sink: LogSink,
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            sink: LogSink::Stderr,
            level: DEFAULT_LEVEL.to_string(),
        }
    }
}

impl LogConfig {
    pub fn silent() -> Self {
        Self {
            sink: LogSink::Silent,
            ..Self::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        if self.sink == LogSink::Silent {
            return EnvFilter::new("off");
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LogConfig) -> Result<(), CoreLlmError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_target(false);

    let installed = match &config.sink {
        LogSink::Stderr => builder.with_writer(std::io::stderr).try_init(),
        LogSink::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    CoreLlmError::Logging(format!("Cannot open {}: {e}", path.display()))
                })?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        LogSink::Silent => builder.with_writer(std::io::sink).try_init(),
    };

    installed.map_err(|e| CoreLlmError::Logging(e.to_string()))
}
