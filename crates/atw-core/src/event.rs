//! The uniform event record every host event is normalized into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Attribute key that always carries the event kind.
pub const EVENT_NAME_ATTRIBUTE: &str = "event.name";

static ABSENT: AttributeValue = AttributeValue::Absent;

/// A single attribute value extracted from a host event.
///
/// Missing data is represented explicitly as [`AttributeValue::Absent`] rather
/// than by leaving the key out, so templates and conditions see every declared
/// attribute of a kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum AttributeValue {
    #[default]
    Absent,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

impl AttributeValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Text rendering used by templates and equality conditions. Absent renders empty.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::Absent => Cow::Borrowed(""),
            Self::Bool(b) => Cow::Owned(b.to_string()),
            Self::Integer(i) => Cow::Owned(i.to_string()),
            Self::Number(n) => Cow::Owned(n.to_string()),
            Self::Text(s) => Cow::Borrowed(s.as_str()),
        }
    }

    /// Numeric view used by ordering conditions.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Absent => None,
            Self::Bool(_) => None,
            Self::Integer(i) => Some(*i as f64),
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Absent)
    }
}

/// Ordered attribute map. Ordering keeps rendering and serialization deterministic.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Normalized, immutable event record handed to the dispatch pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchEvent {
    kind: String,
    occurred_at: DateTime<Utc>,
    attributes: Attributes,
    source_event_id: String,
}

impl DispatchEvent {
    /// Create an event that occurred now, with a fresh source id.
    pub fn new(kind: impl Into<String>, attributes: Attributes) -> Self {
        Self::with_identity(
            kind,
            Utc::now(),
            uuid::Uuid::new_v4().to_string(),
            attributes,
        )
    }

    /// Create an event with an explicit timestamp and source id.
    pub fn with_identity(
        kind: impl Into<String>,
        occurred_at: DateTime<Utc>,
        source_event_id: impl Into<String>,
        mut attributes: Attributes,
    ) -> Self {
        let kind = kind.into();
        attributes.insert(
            EVENT_NAME_ATTRIBUTE.to_string(),
            AttributeValue::Text(kind.clone()),
        );
        Self {
            kind,
            occurred_at,
            attributes,
            source_event_id: source_event_id.into(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn source_event_id(&self) -> &str {
        &self.source_event_id
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Look up an attribute; unknown keys read as [`AttributeValue::Absent`].
    pub fn attribute(&self, key: &str) -> &AttributeValue {
        self.attributes.get(key).unwrap_or(&ABSENT)
    }
}
