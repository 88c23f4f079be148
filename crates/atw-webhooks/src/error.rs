//! Error types for the dispatch pipeline.
//!
//! None of these ever reach the host's event callback: configuration-time
//! errors surface from registry building, and delivery-time errors are
//! classified into counters by the worker.

use atw_config::ConfigError;
use std::time::Duration;
use thiserror::Error;

/// A malformed template, reported when the configuration is loaded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unclosed '{{' at position {position}")]
    Unclosed { position: usize },

    #[error("unmatched '}}' at position {position}")]
    StrayClose { position: usize },

    #[error("empty placeholder at position {position}")]
    EmptyPlaceholder { position: usize },

    #[error("invalid placeholder key '{key}'")]
    InvalidKey { key: String },

    #[error("unknown transform '{name}' on '{key}'")]
    UnknownTransform { key: String, name: String },

    #[error("transform '{name}' on '{key}' expects {expected} argument(s), got {actual}")]
    Arity {
        key: String,
        name: String,
        expected: &'static str,
        actual: usize,
    },

    #[error("transform 'truncate' on '{key}' needs a non-negative integer, got '{value}'")]
    InvalidNumber { key: String, value: String },

    #[error("invalid regex '{pattern}' on '{key}': {message}")]
    InvalidRegex {
        key: String,
        pattern: String,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("webhook '{target}' is not subscribed to event kind '{kind}'")]
    KindMismatch { target: String, kind: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A failed delivery attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("endpoint responded with HTTP {0}")]
    Status(u16),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DeliveryError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid template for webhook '{target}': {source}")]
    Template {
        target: String,
        #[source]
        source: TemplateError,
    },

    #[error("Invalid header '{header}' for webhook '{target}'")]
    InvalidHeader { target: String, header: String },
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Dispatcher is already running")]
    AlreadyRunning,

    #[error("Dispatcher has been stopped")]
    Stopped,

    #[error("No Tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("Unknown webhook '{0}'")]
    UnknownTarget(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
