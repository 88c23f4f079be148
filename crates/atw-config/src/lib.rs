//! Configuration document for AllTheWebhooks.
//!
//! The document is YAML with kebab-case keys. A reload always replaces the
//! whole document; see [`WebhooksConfig::load_from_path`].

mod document;
mod error;
mod resolve;

pub use document::*;
pub use error::ConfigError;
pub use resolve::{ResolvedTarget, DEFAULT_TEMPLATE};
