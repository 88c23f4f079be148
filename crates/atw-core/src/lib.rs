//! Core utilities and types shared across all AllTheWebhooks crates

pub mod event;
pub mod matcher;
pub mod redaction;
pub mod utils;
mod warnings;

// Re-export commonly used types
pub use event::*;
pub use matcher::*;
pub use redaction::RedactionPolicy;
pub use utils::*;
pub use warnings::WarningTracker;

// Re-export external dependencies
pub use chrono;
pub use serde;
pub use serde_json;
pub use tracing;
pub use uuid;
