//! Delivery Worker: one task per target lane.
//!
//! The worker is the only writer of its lane's circuit breaker and token
//! bucket, so neither needs a lock. Per delivery it runs, in order: backoff
//! wait, circuit admission, rate limiting, the HTTP call, then retry or
//! a terminal outcome.

use crate::circuit::{Admission, CircuitBreaker, CircuitSnapshot};
use crate::client::{WebhookRequest, WebhookTransport};
use crate::error::DeliveryError;
use crate::queue::{DeliveryQueue, QueuedDelivery, RejectReason};
use crate::rate_limit::TokenBucket;
use crate::registry::HandlerRegistry;
use crate::stats::{bump, EventKindCounters, TargetCounters};
use crate::target::WebhookTarget;
use arc_swap::ArcSwap;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything the host path and a target's worker share about one target.
///
/// A lane outlives reloads that keep its target id; only the target it
/// points at is swapped.
#[derive(Debug)]
pub struct TargetLane {
    id: String,
    target: ArcSwap<WebhookTarget>,
    queue: DeliveryQueue,
    counters: TargetCounters,
    events: Arc<EventKindCounters>,
    circuit: Arc<watch::Sender<CircuitSnapshot>>,
}

impl TargetLane {
    pub fn new(target: Arc<WebhookTarget>) -> Self {
        let (circuit, _) = watch::channel(CircuitSnapshot::default());
        Self {
            id: target.id().to_string(),
            queue: DeliveryQueue::new(target.queue_capacity()),
            target: ArcSwap::new(target),
            counters: TargetCounters::default(),
            events: Arc::new(EventKindCounters::default()),
            circuit: Arc::new(circuit),
        }
    }

    /// Share per-kind counters with the rest of the dispatcher.
    pub fn with_event_counters(mut self, events: Arc<EventKindCounters>) -> Self {
        self.events = events;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> Arc<WebhookTarget> {
        self.target.load_full()
    }

    /// Point the lane at a reloaded target with the same id.
    pub fn update_target(&self, target: Arc<WebhookTarget>) {
        self.queue.set_capacity(target.queue_capacity());
        self.target.store(target);
    }

    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    pub fn counters(&self) -> &TargetCounters {
        &self.counters
    }

    pub fn event_counters(&self) -> &EventKindCounters {
        &self.events
    }

    pub fn circuit(&self) -> CircuitSnapshot {
        *self.circuit.borrow()
    }

    pub fn subscribe_circuit(&self) -> watch::Receiver<CircuitSnapshot> {
        self.circuit.subscribe()
    }

    /// Count a delivery that will never be attempted again because of shutdown or removal.
    pub(crate) fn discard(&self, delivery: &QueuedDelivery, outcomes: &broadcast::Sender<DeliveryOutcome>) {
        bump(&self.counters.discarded_on_shutdown);
        self.record_outcome(delivery, &OutcomeStatus::Discarded);
        publish(
            outcomes,
            DeliveryOutcome::new(delivery, OutcomeStatus::Discarded, delivery.attempt - 1),
        );
    }

    fn record_outcome(&self, delivery: &QueuedDelivery, status: &OutcomeStatus) {
        let counters = self.events.kind(delivery.event.kind());
        match status {
            OutcomeStatus::Delivered { .. } => bump(&counters.delivered),
            OutcomeStatus::RateLimited => bump(&counters.rate_limited),
            OutcomeStatus::RetryExhausted { .. }
            | OutcomeStatus::CircuitOpen
            | OutcomeStatus::QueueFull
            | OutcomeStatus::Discarded => bump(&counters.dropped),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Delivered { http_status: u16 },
    RetryExhausted { error: String },
    RateLimited,
    CircuitOpen,
    QueueFull,
    Discarded,
}

/// Terminal outcome of one queue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub target_id: String,
    pub event_id: String,
    pub kind: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
    /// HTTP calls made for this entry.
    pub attempts: u32,
    /// Backoff delays applied between attempts, in order.
    pub backoff: Vec<Duration>,
}

impl DeliveryOutcome {
    fn new(delivery: &QueuedDelivery, status: OutcomeStatus, attempts: u32) -> Self {
        Self {
            target_id: delivery.target.id().to_string(),
            event_id: delivery.event.source_event_id().to_string(),
            kind: delivery.event.kind().to_string(),
            status,
            attempts,
            backoff: delivery.backoff_history.clone(),
        }
    }
}

fn publish(outcomes: &broadcast::Sender<DeliveryOutcome>, outcome: DeliveryOutcome) {
    // No subscribers is the normal case
    let _ = outcomes.send(outcome);
}

pub struct DeliveryWorker {
    lane: Arc<TargetLane>,
    transport: Arc<dyn WebhookTransport>,
    registry: Arc<HandlerRegistry>,
    outcomes: broadcast::Sender<DeliveryOutcome>,
    cancel: CancellationToken,
    breaker: CircuitBreaker,
    bucket: TokenBucket,
}

impl DeliveryWorker {
    pub fn new(
        lane: Arc<TargetLane>,
        transport: Arc<dyn WebhookTransport>,
        registry: Arc<HandlerRegistry>,
        outcomes: broadcast::Sender<DeliveryOutcome>,
        cancel: CancellationToken,
    ) -> Self {
        let target = lane.target();
        let breaker =
            CircuitBreaker::with_publisher(lane.id(), target.circuit(), lane.circuit.clone());
        let bucket = TokenBucket::new(target.rate_limit(), Instant::now());
        Self {
            lane,
            transport,
            registry,
            outcomes,
            cancel,
            breaker,
            bucket,
        }
    }

    /// Process deliveries until the queue is closed and empty or the worker is cancelled.
    pub async fn run(mut self) {
        info!("🚀 Delivery worker started for webhook {}", self.lane.id());

        loop {
            let delivery = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                next = self.lane.queue.pop() => match next {
                    Some(delivery) => delivery,
                    None => break,
                },
            };
            self.process(delivery).await;
        }

        info!("🛑 Delivery worker stopped for webhook {}", self.lane.id());
    }

    async fn process(&mut self, mut delivery: QueuedDelivery) {
        self.refresh_policies();

        if let Some(not_before) = delivery.not_before.take() {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.lane.discard(&delivery, &self.outcomes);
                    return;
                }
                () = tokio::time::sleep_until(not_before.into()) => {}
            }
        }

        let now = Instant::now();
        if let Admission::Rejected { retry_in } = self.breaker.admit(now) {
            bump(&self.lane.counters.dropped_circuit_open);
            debug!(
                "Circuit open for webhook {}, dropping {} (probe in {:?})",
                self.lane.id(),
                delivery.event.kind(),
                retry_in
            );
            self.finish(&delivery, OutcomeStatus::CircuitOpen, delivery.attempt - 1);
            return;
        }

        if let Err(wait) = self.bucket.try_acquire(now) {
            let allowed = self.lane.target.load().rate_limit_rechecks();
            if delivery.rate_limit_rechecks < allowed {
                delivery.rate_limit_rechecks += 1;
                delivery.not_before = Some(now + wait);
                self.requeue(delivery);
            } else {
                bump(&self.lane.counters.dropped_rate_limited);
                warn!(
                    "Webhook {} rate limited, dropping {} after {} recheck(s)",
                    self.lane.id(),
                    delivery.event.kind(),
                    delivery.rate_limit_rechecks
                );
                self.finish(&delivery, OutcomeStatus::RateLimited, delivery.attempt - 1);
            }
            return;
        }

        let result = match WebhookRequest::for_delivery(&delivery, Utc::now().timestamp()) {
            Ok(request) => {
                bump(&self.lane.counters.http_calls);
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => {
                        self.lane.discard(&delivery, &self.outcomes);
                        return;
                    }
                    result = self.transport.send(request) => result,
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(status) if (200..300).contains(&status) => {
                bump(&self.lane.counters.delivered);
                self.breaker.record_success();
                debug!(
                    "Delivered {} to webhook {} (HTTP {}, attempt {})",
                    delivery.event.kind(),
                    self.lane.id(),
                    status,
                    delivery.attempt
                );
                self.finish(
                    &delivery,
                    OutcomeStatus::Delivered {
                        http_status: status,
                    },
                    delivery.attempt,
                );
            }
            Ok(status) => self.handle_failure(delivery, DeliveryError::Status(status)),
            Err(e) => self.handle_failure(delivery, e),
        }
    }

    fn handle_failure(&mut self, mut delivery: QueuedDelivery, failure: DeliveryError) {
        bump(&self.lane.counters.failed_attempts);
        bump(&self.lane.events.kind(delivery.event.kind()).failed);
        self.breaker.record_failure(Instant::now());

        let retry = delivery.target.retry();
        let log_failures = self.registry.snapshot().settings().log_webhook_failures;
        if log_failures {
            warn!(
                "Webhook {} delivery to {} failed (attempt {}/{}): {}",
                self.lane.id(),
                delivery.target.masked_url(),
                delivery.attempt,
                retry.max_attempts,
                failure
            );
        }

        if retry.should_retry(delivery.attempt) {
            let delay = retry.backoff_delay(delivery.attempt);
            delivery.attempt += 1;
            delivery.not_before = Some(Instant::now() + delay);
            delivery.rate_limit_rechecks = 0;
            delivery.backoff_history.push(delay);
            bump(&self.lane.counters.retries);
            self.requeue(delivery);
        } else {
            bump(&self.lane.counters.dropped_retry_exhausted);
            if log_failures {
                error!(
                    "❌ Webhook {} gave up on {} after {} attempt(s): {}",
                    self.lane.id(),
                    delivery.event.kind(),
                    delivery.attempt,
                    failure
                );
            }
            let attempts = delivery.attempt;
            self.finish(
                &delivery,
                OutcomeStatus::RetryExhausted {
                    error: failure.to_string(),
                },
                attempts,
            );
        }
    }

    /// Put a delivery back at the tail of the lane's queue.
    fn requeue(&self, delivery: QueuedDelivery) {
        if let Err(rejected) = self.lane.queue.try_enqueue(delivery) {
            let delivery = rejected.delivery;
            match rejected.reason {
                RejectReason::Closed => self.lane.discard(&delivery, &self.outcomes),
                RejectReason::Full => {
                    bump(&self.lane.counters.dropped_queue_full);
                    warn!(
                        "Queue for webhook {} is full, dropping requeued {}",
                        self.lane.id(),
                        delivery.event.kind()
                    );
                    let attempts = delivery.attempt - 1;
                    self.finish(&delivery, OutcomeStatus::QueueFull, attempts);
                }
            }
        }
    }

    fn finish(&self, delivery: &QueuedDelivery, status: OutcomeStatus, attempts: u32) {
        self.lane.record_outcome(delivery, &status);
        publish(
            &self.outcomes,
            DeliveryOutcome::new(delivery, status, attempts),
        );
    }

    /// Pick up rate-limit and circuit parameters from a reloaded target.
    fn refresh_policies(&mut self) {
        let target = self.lane.target.load();
        if self.bucket.policy() != target.rate_limit() {
            debug!("Rate limit for webhook {} changed, resetting bucket", self.lane.id());
            self.bucket = TokenBucket::new(target.rate_limit(), Instant::now());
        }
        if self.breaker.policy() != target.circuit() {
            self.breaker.set_policy(target.circuit());
        }
    }
}
