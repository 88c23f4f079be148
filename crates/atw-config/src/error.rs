use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid defaults: {0}")]
    InvalidDefaults(String),

    #[error("Invalid event-rate-limit: {0}")]
    InvalidEventRateLimit(String),

    #[error("Invalid webhook '{id}': {reason}")]
    InvalidTarget { id: String, reason: String },
}

impl ConfigError {
    pub fn invalid_target(id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}
