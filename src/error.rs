// src/error.rs

use thiserror::Error;

/// Startup errors. Any of these stops the unit before the first tick.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid<S: Into<String>>(field: &'static str, reason: S) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Input that the configured track source cannot consume.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("{source_kind} track source cannot consume {input_kind} input")]
    InputMismatch {
        source_kind: &'static str,
        input_kind: &'static str,
    },
}
