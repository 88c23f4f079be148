//! `WebhookDispatcher`: the lifecycle facade the host talks to.
//!
//! The host path (`handle_event`/`dispatch`) normalizes, looks up targets,
//! applies the event rate limit, evaluates conditions, builds payloads and
//! enqueues. It never blocks and
//! never returns an error; every failure becomes a counter.

use crate::admission::{AdmissionControl, AdmissionDecision};
use crate::circuit::{CircuitSnapshot, CircuitState};
use crate::client::WebhookTransport;
use crate::error::DispatchError;
use crate::queue::{QueuedDelivery, RejectReason};
use crate::registry::{HandlerRegistry, RegistrySnapshot};
use crate::stats::{
    bump, DispatcherCounters, DispatcherStats, EventKindCounters, TargetStats, TargetStatsEntry,
};
use crate::worker::{DeliveryOutcome, DeliveryWorker, TargetLane};
use arc_swap::ArcSwap;
use atw_config::WebhooksConfig;
use atw_core::{DispatchEvent, WarningTracker};
use atw_events::{HostEvent, Normalizer};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const OUTCOME_CHANNEL_CAPACITY: usize = 1024;

type LaneTable = HashMap<String, Arc<TargetLane>>;

struct WorkerHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct RuntimeState {
    handle: Handle,
    cancel: CancellationToken,
    workers: HashMap<String, WorkerHandle>,
}

enum Lifecycle {
    Idle,
    Running(RuntimeState),
    Stopped,
}

/// Per-target health row for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct TargetHealth {
    pub id: String,
    /// Masked; safe to print.
    pub url: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_for_ms: Option<u64>,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub stats: TargetStats,
}

pub struct WebhookDispatcher {
    registry: Arc<HandlerRegistry>,
    normalizer: Arc<Normalizer>,
    transport: Arc<dyn WebhookTransport>,
    lanes: ArcSwap<LaneTable>,
    counters: DispatcherCounters,
    events: Arc<EventKindCounters>,
    admission: ArcSwap<AdmissionControl>,
    outcomes: broadcast::Sender<DeliveryOutcome>,
    accepting: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    warnings: WarningTracker,
}

impl WebhookDispatcher {
    /// Create a dispatcher over `snapshot`. Events can be dispatched (and are
    /// queued) before [`start`](Self::start); nothing is delivered until then.
    pub fn new(
        snapshot: RegistrySnapshot,
        normalizer: Arc<Normalizer>,
        transport: Arc<dyn WebhookTransport>,
    ) -> Self {
        let events = Arc::new(EventKindCounters::default());
        let lanes: LaneTable = snapshot
            .targets()
            .iter()
            .map(|target| {
                (
                    target.id().to_string(),
                    Arc::new(TargetLane::new(target.clone()).with_event_counters(events.clone())),
                )
            })
            .collect();
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);
        let admission = AdmissionControl::new(snapshot.admission().clone());

        Self {
            registry: Arc::new(HandlerRegistry::new(snapshot)),
            normalizer,
            transport,
            lanes: ArcSwap::from_pointee(lanes),
            counters: DispatcherCounters::default(),
            events,
            admission: ArcSwap::from_pointee(admission),
            outcomes,
            accepting: AtomicBool::new(true),
            lifecycle: Mutex::new(Lifecycle::Idle),
            warnings: WarningTracker::new(),
        }
    }

    pub fn from_config(
        config: &WebhooksConfig,
        normalizer: Arc<Normalizer>,
        transport: Arc<dyn WebhookTransport>,
    ) -> Result<Self, DispatchError> {
        let snapshot = RegistrySnapshot::build(config, &normalizer)?;
        for warning in snapshot.warnings() {
            warn!("{}", warning);
        }
        Ok(Self::new(snapshot, normalizer, transport))
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn one worker per target on the current tokio runtime.
    pub fn start(&self) -> Result<(), DispatchError> {
        let handle = Handle::try_current().map_err(|e| DispatchError::NoRuntime(e.to_string()))?;
        let mut lifecycle = self.lock();
        match *lifecycle {
            Lifecycle::Running(_) => return Err(DispatchError::AlreadyRunning),
            Lifecycle::Stopped => return Err(DispatchError::Stopped),
            Lifecycle::Idle => {}
        }

        let mut state = RuntimeState {
            handle,
            cancel: CancellationToken::new(),
            workers: HashMap::new(),
        };
        for lane in self.lanes.load().values() {
            self.spawn_worker(&mut state, lane.clone());
        }

        info!(
            "🚀 Webhook dispatcher started with {} worker(s)",
            state.workers.len()
        );
        *lifecycle = Lifecycle::Running(state);
        Ok(())
    }

    fn spawn_worker(&self, state: &mut RuntimeState, lane: Arc<TargetLane>) {
        let cancel = state.cancel.child_token();
        let id = lane.id().to_string();
        let worker = DeliveryWorker::new(
            lane,
            self.transport.clone(),
            self.registry.clone(),
            self.outcomes.clone(),
            cancel.clone(),
        );
        let handle = state.handle.spawn(worker.run());
        state.workers.insert(id, WorkerHandle { cancel, handle });
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lock(), Lifecycle::Running(_))
    }

    /// Host callback: normalize a host event and route it.
    pub fn handle_event(&self, event: &HostEvent) {
        bump(&self.counters.events_received);
        match self.normalizer.normalize(event) {
            Some(event) => self.route(Arc::new(event), None, false, &mut Report::silent()),
            None => bump(&self.counters.events_skipped),
        }
    }

    /// Route an already normalized event.
    pub fn dispatch(&self, event: DispatchEvent) {
        bump(&self.counters.events_received);
        self.route(Arc::new(event), None, false, &mut Report::silent());
    }

    /// Route an event and describe each step. With `only_target`, only that
    /// webhook is considered; with `dry_run`, nothing is enqueued or counted.
    pub fn dispatch_with_report(
        &self,
        event: DispatchEvent,
        only_target: Option<&str>,
        dry_run: bool,
    ) -> Result<Vec<String>, DispatchError> {
        if let Some(id) = only_target {
            if self.registry.snapshot().target(id).is_none() {
                return Err(DispatchError::UnknownTarget(id.to_string()));
            }
        }
        if !dry_run && !self.accepting.load(Ordering::Acquire) {
            return Err(DispatchError::Stopped);
        }

        let mut report = Report::collecting();
        report.line(|| {
            format!(
                "Event {} ({}) with {} attribute(s)",
                event.kind(),
                event.source_event_id(),
                event.attributes().len()
            )
        });
        if !dry_run {
            bump(&self.counters.events_received);
        }
        self.route(Arc::new(event), only_target, dry_run, &mut report);
        Ok(report.into_lines())
    }

    fn route(
        &self,
        event: Arc<DispatchEvent>,
        only_target: Option<&str>,
        dry_run: bool,
        report: &mut Report,
    ) {
        if !dry_run && !self.accepting.load(Ordering::Acquire) {
            debug!("Dispatcher stopped, ignoring {}", event.kind());
            return;
        }

        let snapshot = self.registry.snapshot();
        let mut targets = snapshot.lookup(event.kind()).into_owned();
        if let Some(id) = only_target {
            targets.retain(|target| target.id() == id);
        }

        if targets.is_empty() {
            if !dry_run {
                bump(&self.counters.events_unrouted);
            }
            report.line(|| format!("No webhook is subscribed to {}", event.kind()));
            return;
        }

        if !self.admit(&event, dry_run, report) {
            return;
        }

        let lanes = self.lanes.load();
        for target in targets {
            let Some(lane) = lanes.get(target.id()) else {
                // Target retired by a concurrent reload
                debug!("No lane for webhook {}, skipping", target.id());
                continue;
            };

            if let Some(key) = target.conditions().first_failure(event.attributes()) {
                if !dry_run {
                    bump(&lane.counters().filtered);
                    bump(&self.events.kind(event.kind()).dropped);
                }
                report.line(|| format!("{}: condition on '{}' not met, skipped", target.id(), key));
                continue;
            }

            let payload = match snapshot.builder().build(&event, &target) {
                Ok(payload) => payload,
                Err(e) => {
                    if !dry_run {
                        bump(&lane.counters().build_failures);
                        bump(&self.events.kind(event.kind()).dropped);
                    }
                    warn!("Failed to build payload for webhook {}: {}", target.id(), e);
                    report.line(|| format!("{}: payload build failed: {}", target.id(), e));
                    continue;
                }
            };
            report.line(|| {
                format!(
                    "{}: payload ({} bytes): {}",
                    target.id(),
                    payload.len(),
                    String::from_utf8_lossy(&payload)
                )
            });

            if dry_run {
                report.line(|| format!("{}: dry run, not enqueued", target.id()));
                continue;
            }

            let id = target.id().to_string();
            let delivery = QueuedDelivery::new(event.clone(), target, payload);
            match lane.queue().try_enqueue(delivery) {
                Ok(()) => {
                    bump(&lane.counters().enqueued);
                    report.line(|| format!("{}: enqueued", id));
                }
                Err(rejected) => match rejected.reason {
                    RejectReason::Full => {
                        bump(&lane.counters().dropped_queue_full);
                        bump(&self.events.kind(event.kind()).dropped);
                        self.warnings.warn_once(
                            &format!("queue-full:{}", id),
                            &format!("Queue for webhook {} is full, dropping events", id),
                        );
                        report.line(|| format!("{}: queue full, dropped", id));
                    }
                    RejectReason::Closed => {
                        // Lost a race with stop() or the retirement of this webhook
                        lane.discard(&rejected.delivery, &self.outcomes);
                        report.line(|| format!("{}: queue closed, discarded", id));
                    }
                },
            }
        }
    }

    /// Apply the host-side admission limit. Returns false if the event must
    /// not reach any target. A dry run only reports a muted kind.
    fn admit(&self, event: &DispatchEvent, dry_run: bool, report: &mut Report) -> bool {
        let admission = self.admission.load();
        let kind = event.kind();
        if dry_run {
            if admission.is_muted(kind) {
                report.line(|| format!("{} is disabled until reload (rate limited)", kind));
            }
            return true;
        }

        let decision = admission.admit(kind, Instant::now());
        if decision == AdmissionDecision::Admitted {
            return true;
        }

        bump(&self.counters.events_rate_limited);
        bump(&self.events.kind(kind).rate_limited);
        match decision {
            AdmissionDecision::Limited { muted: true } => {
                self.warnings.warn_once(
                    &format!("rate-limit-disabled:{}", kind),
                    &format!("Event rate limit exceeded, disabling {} until reload", kind),
                );
                report.line(|| format!("Rate limited; {} disabled until reload", kind));
            }
            AdmissionDecision::Disabled => {
                report.line(|| format!("{} is disabled until reload; event not fired", kind));
            }
            _ => {
                debug!("Event rate limit exceeded, dropping {}", kind);
                report.line(|| "Rate limited; event not fired".to_string());
            }
        }
        false
    }

    /// Swap in a new registry snapshot.
    ///
    /// Targets are matched by id: retained targets keep their queue, circuit
    /// state and counters; new targets get a lane (and a worker when running);
    /// removed targets are retired and their queued deliveries discarded.
    pub fn reload(&self, snapshot: RegistrySnapshot) -> Result<Vec<String>, DispatchError> {
        let mut lifecycle = self.lock();
        if matches!(*lifecycle, Lifecycle::Stopped) {
            return Err(DispatchError::Stopped);
        }

        let current = self.lanes.load_full();
        let mut next = LaneTable::with_capacity(snapshot.targets().len());
        for target in snapshot.targets() {
            let lane = match current.get(target.id()) {
                Some(lane) => {
                    lane.update_target(target.clone());
                    lane.clone()
                }
                None => {
                    let lane = Arc::new(
                        TargetLane::new(target.clone()).with_event_counters(self.events.clone()),
                    );
                    if let Lifecycle::Running(state) = &mut *lifecycle {
                        self.spawn_worker(state, lane.clone());
                    }
                    info!("Added webhook {}", target.id());
                    lane
                }
            };
            next.insert(target.id().to_string(), lane);
        }

        // Lookups against the old snapshot must still find retiring lanes until the swap
        let mut union = (*current).clone();
        union.extend(next.iter().map(|(id, lane)| (id.clone(), lane.clone())));
        self.lanes.store(Arc::new(union));

        let warnings = snapshot.warnings().to_vec();
        let admission = AdmissionControl::new(snapshot.admission().clone());
        self.registry.replace(snapshot);
        self.lanes.store(Arc::new(next));
        self.admission.store(Arc::new(admission));
        self.warnings.reset();

        let next = self.lanes.load();
        for (id, lane) in current.iter() {
            if next.contains_key(id) {
                continue;
            }
            lane.queue().close();
            if let Lifecycle::Running(state) = &mut *lifecycle {
                if let Some(worker) = state.workers.remove(id) {
                    worker.cancel.cancel();
                }
            }
            let discarded = lane.queue().drain();
            for delivery in &discarded {
                lane.discard(delivery, &self.outcomes);
            }
            info!(
                "Retired webhook {} ({} queued deliveries discarded)",
                id,
                discarded.len()
            );
        }

        for warning in &warnings {
            warn!("{}", warning);
        }
        Ok(warnings)
    }

    /// Build a snapshot from `config` and swap it in. On error the current
    /// registry stays in place.
    pub fn reload_from_config(&self, config: &WebhooksConfig) -> Result<Vec<String>, DispatchError> {
        let snapshot = RegistrySnapshot::build(config, &self.normalizer)?;
        self.reload(snapshot)
    }

    /// Stop accepting events, let workers flush for the configured grace
    /// period, then cancel them and discard whatever is left.
    pub async fn stop(&self) {
        self.accepting.store(false, Ordering::Release);
        let state = {
            let mut lifecycle = self.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running(state) => Some(state),
                Lifecycle::Idle | Lifecycle::Stopped => None,
            }
        };

        let lanes = self.lanes.load_full();
        for lane in lanes.values() {
            lane.queue().close();
        }

        if let Some(state) = state {
            let grace = self.registry.snapshot().settings().shutdown_grace;
            info!(
                "Stopping webhook dispatcher, flushing for up to {:?}",
                grace
            );
            let deadline = tokio::time::Instant::now() + grace;

            let mut pending = Vec::new();
            for (id, mut worker) in state.workers {
                match tokio::time::timeout_at(deadline, &mut worker.handle).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("Delivery worker for webhook {} failed: {}", id, e),
                    Err(_) => pending.push((id, worker.handle)),
                }
            }

            state.cancel.cancel();
            for (id, handle) in pending {
                debug!("Grace period elapsed for webhook {}, cancelling", id);
                if let Err(e) = handle.await {
                    error!("Delivery worker for webhook {} failed: {}", id, e);
                }
            }
        }

        let mut discarded = 0;
        for lane in lanes.values() {
            for delivery in lane.queue().drain() {
                lane.discard(&delivery, &self.outcomes);
                discarded += 1;
            }
        }
        info!(
            "🛑 Webhook dispatcher stopped ({} queued deliveries discarded)",
            discarded
        );
    }

    /// Health rows for every current target, in configuration order.
    pub fn health(&self) -> Vec<TargetHealth> {
        let snapshot = self.registry.snapshot();
        let lanes = self.lanes.load();
        snapshot
            .targets()
            .iter()
            .filter_map(|target| lanes.get(target.id()))
            .map(|lane| {
                let CircuitSnapshot {
                    state,
                    consecutive_failures,
                    opened_at,
                } = lane.circuit();
                let target = lane.target();
                TargetHealth {
                    id: lane.id().to_string(),
                    url: target.masked_url().to_string(),
                    state,
                    consecutive_failures,
                    opened_for_ms: opened_at
                        .map(|at| u64::try_from(at.elapsed().as_millis()).unwrap_or(u64::MAX)),
                    queue_depth: lane.queue().len(),
                    queue_capacity: lane.queue().capacity(),
                    stats: lane.counters().snapshot(),
                }
            })
            .collect()
    }

    pub fn stats(&self) -> DispatcherStats {
        let snapshot = self.registry.snapshot();
        let lanes = self.lanes.load();
        DispatcherStats {
            totals: self.counters.snapshot(),
            targets: snapshot
                .targets()
                .iter()
                .filter_map(|target| lanes.get(target.id()))
                .map(|lane| TargetStatsEntry {
                    id: lane.id().to_string(),
                    stats: lane.counters().snapshot(),
                })
                .collect(),
            events: self.events.snapshot(),
        }
    }

    /// Terminal outcome of every queue entry from now on.
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<DeliveryOutcome> {
        self.outcomes.subscribe()
    }

    pub fn subscribe_circuit(&self, id: &str) -> Option<watch::Receiver<CircuitSnapshot>> {
        self.lanes.load().get(id).map(|lane| lane.subscribe_circuit())
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn normalizer(&self) -> &Arc<Normalizer> {
        &self.normalizer
    }

    pub fn warnings(&self) -> Vec<String> {
        self.registry.snapshot().warnings().to_vec()
    }
}

impl Drop for WebhookDispatcher {
    fn drop(&mut self) {
        let lifecycle = self
            .lifecycle
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Lifecycle::Running(state) = lifecycle {
            state.cancel.cancel();
        }
    }
}

/// Step-by-step report for manual firing; a no-op on the host path.
struct Report(Option<Vec<String>>);

impl Report {
    fn silent() -> Self {
        Self(None)
    }

    fn collecting() -> Self {
        Self(Some(Vec::new()))
    }

    fn line(&mut self, line: impl FnOnce() -> String) {
        if let Some(lines) = &mut self.0 {
            lines.push(line());
        }
    }

    fn into_lines(self) -> Vec<String> {
        self.0.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::WebhookRequest;
    use crate::error::DeliveryError;
    use crate::worker::OutcomeStatus;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl WebhookTransport for Unreachable {
        async fn send(&self, _request: WebhookRequest) -> Result<u16, DeliveryError> {
            Err(DeliveryError::Transport("unreachable".into()))
        }
    }

    fn dispatcher(yaml: &str) -> WebhookDispatcher {
        WebhookDispatcher::from_config(
            &WebhooksConfig::from_yaml(yaml).unwrap(),
            Arc::new(Normalizer::with_defaults()),
            Arc::new(Unreachable),
        )
        .unwrap()
    }

    #[test]
    fn test_start_requires_runtime() {
        let dispatcher = dispatcher("webhooks: {}");
        assert!(matches!(dispatcher.start(), Err(DispatchError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn test_lifecycle_errors() {
        let dispatcher = dispatcher("webhooks: {}");
        dispatcher.start().unwrap();
        assert!(dispatcher.is_running());
        assert!(matches!(dispatcher.start(), Err(DispatchError::AlreadyRunning)));
        dispatcher.stop().await;
        assert!(!dispatcher.is_running());
        assert!(matches!(dispatcher.start(), Err(DispatchError::Stopped)));
    }

    #[test]
    fn test_unknown_target_in_report() {
        let dispatcher = dispatcher("webhooks:\n  a: { url: 'http://h/', events: [player.join] }");
        let event = dispatcher
            .normalizer()
            .synthetic("player.join", Default::default());
        let err = dispatcher
            .dispatch_with_report(event, Some("b"), true)
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownTarget(ref id) if id == "b"));
    }

    #[test]
    fn test_skipped_host_event() {
        let dispatcher = dispatcher("webhooks: {}");
        dispatcher.handle_event(&HostEvent::Unknown);
        let totals = dispatcher.stats().totals;
        assert_eq!(totals.events_received, 1);
        assert_eq!(totals.events_skipped, 1);
    }

    #[test]
    fn test_closed_queue_rejection_counts_as_discard() {
        let dispatcher = dispatcher("webhooks:\n  a: { url: 'http://h/', events: [player.join] }");
        let mut outcomes = dispatcher.subscribe_outcomes();
        dispatcher.lanes.load()["a"].queue().close();

        dispatcher.dispatch(DispatchEvent::new("player.join", Default::default()));

        let stats = dispatcher.stats();
        let a = stats.target("a").unwrap();
        assert_eq!(a.discarded_on_shutdown, 1);
        assert_eq!(a.dropped_queue_full, 0);
        assert_eq!(a.enqueued, 0);
        assert_eq!(stats.event("player.join").unwrap().dropped, 1);
        assert_eq!(outcomes.try_recv().unwrap().status, OutcomeStatus::Discarded);
    }

    #[test]
    fn test_reload_rearms_warn_once() {
        let yaml = "webhooks:\n  a: { url: 'http://h/', events: [player.join], queue-capacity: 1 }";
        let dispatcher = dispatcher(yaml);
        for _ in 0..2 {
            dispatcher.dispatch(DispatchEvent::new("player.join", Default::default()));
        }
        assert_eq!(dispatcher.stats().target("a").unwrap().dropped_queue_full, 1);
        assert!(!dispatcher.warnings.warn_once("queue-full:a", "again"));

        dispatcher
            .reload_from_config(&WebhooksConfig::from_yaml(yaml).unwrap())
            .unwrap();
        assert!(dispatcher.warnings.warn_once("queue-full:a", "again"));
    }

    #[test]
    fn test_health_rows_in_config_order() {
        let dispatcher = dispatcher(
            "webhooks:\n  z: { url: 'https://h/secret', events: [player.join] }\n  a: { url: 'http://h/', events: [player.quit] }",
        );
        let health = dispatcher.health();
        assert_eq!(health.len(), 2);
        assert_eq!(health[0].id, "z");
        assert_eq!(health[0].state, CircuitState::Closed);
        assert!(!health[0].url.contains("secret"));
        assert_eq!(health[1].queue_capacity, 1000);
    }
}
