//! Host event model and the event normalizer.
//!
//! Host events are mapped to dispatch kinds through an explicit registration
//! table ([`default_definitions`]) assembled at startup.

pub mod catalog;
pub mod host;
pub mod normalizer;

pub use catalog::{default_definitions, AttributeType, EventDefinition, NormalizeFn};
pub use host::*;
pub use normalizer::Normalizer;
