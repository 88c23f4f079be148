//! Handler Registry: event kind → ordered webhook targets.
//!
//! A [`RegistrySnapshot`] is immutable. [`HandlerRegistry`] holds the current
//! snapshot behind an `ArcSwap`, so lookups never block and always see one
//! whole snapshot; a reload builds a new snapshot and swaps it in.

use crate::admission::AdmissionSettings;
use crate::error::RegistryError;
use crate::payload::PayloadBuilder;
use crate::target::WebhookTarget;
use arc_swap::ArcSwap;
use atw_config::WebhooksConfig;
use atw_core::{is_wildcard, pattern_matches, EVENT_NAME_ATTRIBUTE};
use atw_events::Normalizer;
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Dispatcher-wide settings carried with each snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherSettings {
    pub shutdown_grace: Duration,
    pub log_webhook_failures: bool,
    pub warn_on_unresolved_events: bool,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            shutdown_grace: Duration::from_secs(5),
            log_webhook_failures: true,
            warn_on_unresolved_events: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    targets: Vec<Arc<WebhookTarget>>,
    by_kind: HashMap<String, Vec<Arc<WebhookTarget>>>,
    builder: PayloadBuilder,
    settings: DispatcherSettings,
    admission: AdmissionSettings,
    warnings: Vec<String>,
}

impl RegistrySnapshot {
    /// Build a snapshot from a configuration document.
    ///
    /// Structural problems are errors. Event patterns that match no known kind
    /// and template or condition keys no matched kind provides are collected
    /// as warnings.
    pub fn build(config: &WebhooksConfig, normalizer: &Normalizer) -> Result<Self, RegistryError> {
        let resolved = config.resolved_targets()?;
        let targets = resolved
            .into_iter()
            .map(WebhookTarget::from_resolved)
            .collect::<Result<Vec<_>, _>>()?;

        let settings = DispatcherSettings {
            shutdown_grace: Duration::from_millis(config.dispatcher.shutdown_grace_ms),
            log_webhook_failures: config.logging.log_webhook_failures,
            warn_on_unresolved_events: config.logging.warn_on_unresolved_events,
        };
        let builder = PayloadBuilder::new(config.redaction.policy())
            .warn_on_missing(settings.warn_on_unresolved_events);

        let warnings = targets
            .iter()
            .flat_map(|target| target_warnings(target, normalizer))
            .collect();

        let known: Vec<&str> = normalizer.known_kinds().collect();
        Ok(Self::assemble(targets, &known, builder, settings, warnings)
            .with_admission(AdmissionSettings::from(&config.event_rate_limit)))
    }

    /// Build a snapshot from already constructed targets.
    pub fn from_targets(
        targets: Vec<WebhookTarget>,
        known_kinds: &[&str],
        builder: PayloadBuilder,
        settings: DispatcherSettings,
    ) -> Self {
        Self::assemble(targets, known_kinds, builder, settings, Vec::new())
    }

    fn assemble(
        targets: Vec<WebhookTarget>,
        known_kinds: &[&str],
        builder: PayloadBuilder,
        settings: DispatcherSettings,
        warnings: Vec<String>,
    ) -> Self {
        let targets: Vec<Arc<WebhookTarget>> = targets.into_iter().map(Arc::new).collect();

        let mut kinds: BTreeSet<&str> = known_kinds.iter().copied().collect();
        for target in &targets {
            kinds.extend(
                target
                    .event_kinds()
                    .iter()
                    .map(String::as_str)
                    .filter(|pattern| !is_wildcard(pattern)),
            );
        }

        let mut by_kind = HashMap::with_capacity(kinds.len());
        for kind in kinds {
            let matched: Vec<_> = targets
                .iter()
                .filter(|target| target.accepts(kind))
                .cloned()
                .collect();
            if !matched.is_empty() {
                by_kind.insert(kind.to_string(), matched);
            }
        }

        debug!(
            "Built handler registry with {} webhook(s) over {} routed kind(s)",
            targets.len(),
            by_kind.len()
        );

        Self {
            targets,
            by_kind,
            builder,
            settings,
            admission: AdmissionSettings::default(),
            warnings,
        }
    }

    /// Replace the host-side admission limits.
    pub fn with_admission(mut self, admission: AdmissionSettings) -> Self {
        self.admission = admission;
        self
    }

    /// Targets subscribed to `kind`, in configuration order.
    pub fn lookup(&self, kind: &str) -> Cow<'_, [Arc<WebhookTarget>]> {
        if let Some(targets) = self.by_kind.get(kind) {
            return Cow::Borrowed(targets.as_slice());
        }
        // Kinds outside the precomputed set are rare (manual firing of unknown kinds)
        let matched: Vec<_> = self
            .targets
            .iter()
            .filter(|target| target.accepts(kind))
            .cloned()
            .collect();
        Cow::Owned(matched)
    }

    pub fn targets(&self) -> &[Arc<WebhookTarget>] {
        &self.targets
    }

    pub fn target(&self, id: &str) -> Option<&Arc<WebhookTarget>> {
        self.targets.iter().find(|target| target.id() == id)
    }

    pub fn builder(&self) -> &PayloadBuilder {
        &self.builder
    }

    pub fn settings(&self) -> DispatcherSettings {
        self.settings
    }

    pub fn admission(&self) -> &AdmissionSettings {
        &self.admission
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

fn target_warnings(target: &WebhookTarget, normalizer: &Normalizer) -> Vec<String> {
    let mut warnings = Vec::new();

    let mut matched = Vec::new();
    for pattern in target.event_kinds() {
        let hits: Vec<_> = normalizer
            .definitions()
            .iter()
            .filter(|definition| pattern_matches(pattern, definition.kind))
            .collect();
        if hits.is_empty() {
            warnings.push(format!(
                "Webhook '{}' subscribes to '{}', which matches no known event",
                target.id(),
                pattern
            ));
        }
        matched.extend(hits);
    }

    for pattern in target.excluded_kinds() {
        if !normalizer
            .definitions()
            .iter()
            .any(|definition| pattern_matches(pattern, definition.kind))
        {
            warnings.push(format!(
                "Webhook '{}' excludes '{}', which matches no known event",
                target.id(),
                pattern
            ));
        }
    }
    matched.retain(|definition| target.accepts(definition.kind));

    // Nothing to check keys against when only unknown kinds are subscribed
    if matched.is_empty() {
        return warnings;
    }

    let provided =
        |key: &str| key == EVENT_NAME_ATTRIBUTE || matched.iter().any(|d| d.declares(key));

    let mut reported = BTreeSet::new();
    for key in target.template().keys() {
        if !provided(key) && reported.insert(key.to_string()) {
            warnings.push(format!(
                "Webhook '{}' template references '{{{}}}', which none of its events provide",
                target.id(),
                key
            ));
        }
    }
    for key in target.conditions().keys() {
        if !provided(key) && reported.insert(key.to_string()) {
            warnings.push(format!(
                "Webhook '{}' has a condition on '{}', which none of its events provide",
                target.id(),
                key
            ));
        }
    }

    warnings
}

/// The shared, atomically replaceable registry.
#[derive(Debug)]
pub struct HandlerRegistry {
    current: ArcSwap<RegistrySnapshot>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new(RegistrySnapshot::default())
    }
}

impl HandlerRegistry {
    pub fn new(snapshot: RegistrySnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    /// The current snapshot. Holding it keeps that snapshot alive across a reload.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    pub fn lookup(&self, kind: &str) -> Vec<Arc<WebhookTarget>> {
        self.current.load().lookup(kind).into_owned()
    }

    /// Swap in a new snapshot, returning the previous one.
    pub fn replace(&self, snapshot: RegistrySnapshot) -> Arc<RegistrySnapshot> {
        let snapshot = Arc::new(snapshot);
        info!(
            "🔄 Handler registry replaced ({} webhook(s))",
            snapshot.targets().len()
        );
        self.current.swap(snapshot)
    }
}
