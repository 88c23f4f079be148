//! Event-to-webhook dispatch pipeline.
//!
//! ```text
//! HostEvent ─▶ Normalizer ─▶ HandlerRegistry::lookup ─▶ admission ─▶ conditions ─▶ PayloadBuilder
//!                                                                                      │
//!     CircuitBreaker ◀── DeliveryWorker (one per target) ◀── DeliveryQueue ◀──────────────┘
//! ```
//!
//! Everything left of the queue runs on the caller's thread and never blocks;
//! everything right of it runs on tokio tasks owned by [`WebhookDispatcher`].

pub mod admission;
pub mod circuit;
pub mod client;
pub mod conditions;
pub mod dispatcher;
pub mod error;
pub mod payload;
pub mod queue;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod stats;
pub mod target;
pub mod template;
pub mod worker;

pub use admission::{AdmissionControl, AdmissionDecision, AdmissionSettings};
pub use circuit::{Admission, CircuitBreaker, CircuitPolicy, CircuitSnapshot, CircuitState};
pub use client::{sign_payload, HttpTransport, WebhookRequest, WebhookTransport};
pub use conditions::Conditions;
pub use dispatcher::{TargetHealth, WebhookDispatcher};
pub use error::{BuildError, DeliveryError, DispatchError, RegistryError, TemplateError};
pub use payload::PayloadBuilder;
pub use queue::{DeliveryQueue, QueuedDelivery};
pub use rate_limit::{RateLimitPolicy, TokenBucket};
pub use registry::{DispatcherSettings, HandlerRegistry, RegistrySnapshot};
pub use retry::RetryPolicy;
pub use stats::{DispatcherStats, DispatcherTotals, EventStats, TargetStats};
pub use target::WebhookTarget;
pub use template::{Rendered, Template};
pub use worker::{DeliveryOutcome, OutcomeStatus};
