//! Per-webhook attribute conditions, evaluated on the host path before a
//! payload is built.

use atw_config::{ConditionOperators, ConditionSpec};
use atw_core::{AttributeValue, Attributes};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions(Vec<(String, ConditionSpec)>);

impl Conditions {
    pub fn new(conditions: BTreeMap<String, ConditionSpec>) -> Self {
        Self(conditions.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(key, _)| key.as_str())
    }

    /// True when every condition holds.
    pub fn evaluate(&self, attributes: &Attributes) -> bool {
        self.first_failure(attributes).is_none()
    }

    /// The attribute key of the first condition that does not hold.
    pub fn first_failure(&self, attributes: &Attributes) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, spec)| !holds(attributes.get(key), spec))
            .map(|(key, _)| key.as_str())
    }
}

fn holds(field: Option<&AttributeValue>, spec: &ConditionSpec) -> bool {
    match spec {
        ConditionSpec::Equals(expected) => equals(field, expected),
        ConditionSpec::AnyOf(values) => values.iter().any(|expected| equals(field, expected)),
        ConditionSpec::Operators(operators) => operators_hold(field, operators),
    }
}

fn operators_hold(field: Option<&AttributeValue>, operators: &ConditionOperators) -> bool {
    let ConditionOperators {
        equals: eq,
        not,
        greater_than,
        less_than,
        greater_than_or_equal,
        less_than_or_equal,
    } = operators;

    eq.as_ref().map_or(true, |v| equals(field, v))
        && not.as_ref().map_or(true, |v| !equals(field, v))
        && greater_than
            .as_ref()
            .map_or(true, |v| compare(field, v) == Ordering::Greater)
        && less_than
            .as_ref()
            .map_or(true, |v| compare(field, v) == Ordering::Less)
        && greater_than_or_equal
            .as_ref()
            .map_or(true, |v| compare(field, v) != Ordering::Less)
        && less_than_or_equal
            .as_ref()
            .map_or(true, |v| compare(field, v) != Ordering::Greater)
}

/// Case-insensitive text equality. A missing or absent field only equals null.
fn equals(field: Option<&AttributeValue>, expected: &AttributeValue) -> bool {
    match field {
        None | Some(AttributeValue::Absent) => expected.is_absent(),
        Some(value) => value.as_text().to_lowercase() == expected.as_text().to_lowercase(),
    }
}

/// Numeric comparison; values that are not numbers compare as zero.
fn compare(field: Option<&AttributeValue>, expected: &AttributeValue) -> Ordering {
    let field = field.and_then(AttributeValue::as_f64).unwrap_or(0.0);
    let expected = expected.as_f64().unwrap_or(0.0);
    field.total_cmp(&expected)
}
