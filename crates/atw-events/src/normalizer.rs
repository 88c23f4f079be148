use crate::catalog::{catalog_markdown, default_definitions, EventDefinition};
use crate::host::HostEvent;
use atw_core::{AttributeValue, Attributes, DispatchEvent};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Converts host events into [`DispatchEvent`]s using an explicit
/// registration table keyed by host type.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    definitions: Vec<EventDefinition>,
    by_host_type: HashMap<&'static str, usize>,
    by_kind: HashMap<&'static str, usize>,
}

impl Normalizer {
    /// An empty normalizer; every host event is skipped until definitions are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A normalizer with the built-in definitions registered.
    pub fn with_defaults() -> Self {
        let mut normalizer = Self::new();
        for definition in default_definitions() {
            normalizer.register(definition);
        }
        normalizer
    }

    /// Register a definition. Every definition sharing its kind or its host
    /// type is replaced, so each kind and host type stays claimed once.
    pub fn register(&mut self, definition: EventDefinition) {
        let mut displaced: Vec<usize> = [
            self.by_kind.get(definition.kind),
            self.by_host_type.get(definition.host_type),
        ]
        .into_iter()
        .flatten()
        .copied()
        .collect();
        displaced.sort_unstable();
        displaced.dedup();

        for &index in displaced.iter().rev() {
            let previous = self.definitions.remove(index);
            warn!(
                "Replacing event definition {} ({})",
                previous.kind, previous.host_type
            );
        }
        match displaced.first() {
            Some(&index) => self.definitions.insert(index, definition),
            None => self.definitions.push(definition),
        }
        self.reindex();
    }

    fn reindex(&mut self) {
        self.by_kind.clear();
        self.by_host_type.clear();
        for (index, definition) in self.definitions.iter().enumerate() {
            self.by_kind.insert(definition.kind, index);
            self.by_host_type.insert(definition.host_type, index);
        }
    }

    /// Normalize a host event. Unregistered host types and events the
    /// definition declines (e.g. non-player damage) yield `None`.
    pub fn normalize(&self, event: &HostEvent) -> Option<DispatchEvent> {
        let Some(&index) = self.by_host_type.get(event.host_type()) else {
            debug!("Skipping unregistered host event {}", event.host_type());
            return None;
        };
        let definition = &self.definitions[index];
        let extracted = (definition.normalize)(event)?;
        Some(DispatchEvent::new(
            definition.kind,
            complete_attributes(definition, extracted),
        ))
    }

    /// Build an event of `kind` for manual firing. Declared attributes that
    /// are not overridden are absent. Unknown kinds carry only the overrides.
    pub fn synthetic(&self, kind: &str, overrides: Attributes) -> DispatchEvent {
        let attributes = match self.definition(kind) {
            Some(definition) => complete_attributes(definition, overrides),
            None => overrides,
        };
        DispatchEvent::new(kind, attributes)
    }

    pub fn definition(&self, kind: &str) -> Option<&EventDefinition> {
        self.by_kind.get(kind).map(|&index| &self.definitions[index])
    }

    pub fn definitions(&self) -> &[EventDefinition] {
        &self.definitions
    }

    pub fn known_kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.definitions.iter().map(|definition| definition.kind)
    }

    pub fn is_known_kind(&self, kind: &str) -> bool {
        self.by_kind.contains_key(kind)
    }

    pub fn catalog_markdown(&self) -> String {
        catalog_markdown(&self.definitions)
    }
}

fn complete_attributes(definition: &EventDefinition, mut attributes: Attributes) -> Attributes {
    for (name, _) in definition.attributes {
        attributes
            .entry((*name).to_string())
            .or_insert(AttributeValue::Absent);
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AttributeType;

    #[test]
    fn test_empty_normalizer_skips_everything() {
        let normalizer = Normalizer::new();
        assert!(normalizer
            .normalize(&HostEvent::PlayerJoinEvent { player: None })
            .is_none());
    }

    #[test]
    fn test_register_replaces_existing_kind() {
        let mut normalizer = Normalizer::with_defaults();
        let count = normalizer.definitions().len();
        normalizer.register(EventDefinition {
            kind: "player.join",
            host_type: "PlayerJoinEvent",
            category: "player",
            description: "Custom join",
            attributes: &[("greeting", AttributeType::String)],
            normalize: |_| {
                let mut attributes = Attributes::new();
                attributes.insert("greeting".into(), "hello".into());
                Some(attributes)
            },
        });
        assert_eq!(normalizer.definitions().len(), count);

        let event = normalizer
            .normalize(&HostEvent::PlayerJoinEvent { player: None })
            .unwrap();
        assert_eq!(event.attribute("greeting").as_text(), "hello");
        assert!(!event.attributes().contains_key("player.name"));
    }

    #[test]
    fn test_register_displaces_both_kind_and_host_type_owners() {
        let mut normalizer = Normalizer::with_defaults();
        let count = normalizer.definitions().len();
        normalizer.register(EventDefinition {
            kind: "player.join",
            host_type: "PlayerQuitEvent",
            category: "player",
            description: "Join reported on quit",
            attributes: &[],
            normalize: |_| Some(Attributes::new()),
        });

        assert_eq!(normalizer.definitions().len(), count - 1);
        assert!(!normalizer.is_known_kind("player.quit"));
        assert_eq!(
            normalizer
                .definitions()
                .iter()
                .filter(|definition| definition.host_type == "PlayerQuitEvent")
                .count(),
            1
        );
        assert!(normalizer
            .normalize(&HostEvent::PlayerJoinEvent { player: None })
            .is_none());
        let event = normalizer
            .normalize(&HostEvent::PlayerQuitEvent { player: None })
            .unwrap();
        assert_eq!(event.kind(), "player.join");
        assert_eq!(
            normalizer.definition("player.join").unwrap().host_type,
            "PlayerQuitEvent"
        );
    }

    #[test]
    fn test_synthetic_unknown_kind() {
        let normalizer = Normalizer::with_defaults();
        let mut overrides = Attributes::new();
        overrides.insert("player".into(), "Alice".into());
        let event = normalizer.synthetic("chat.message", overrides);
        assert_eq!(event.kind(), "chat.message");
        assert_eq!(event.attribute("player").as_text(), "Alice");
        assert_eq!(event.attributes().len(), 2);
    }
}
