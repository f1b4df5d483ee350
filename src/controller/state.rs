//! Controller state: immutable snapshots of a key→value record.
//!
//! A [`State`] is frozen at creation: `set_state` builds the next snapshot by
//! shallow-merging changes over the current one and swaps the whole record.
//! Snapshots handed to render callbacks are therefore never mutated behind
//! the consumer's back, and an unchanged snapshot keeps its identity.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::{Serialize, Serializer};

use crate::registry::ControllerId;

/// Dynamic payload carried by state entries and event data.
///
/// `Controller` is a handle variant: state may refer to another controller
/// (for example the field currently being edited) by id, resolved through the
/// registry when needed.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
    Object(IndexMap<String, Value>),
    Controller(ControllerId),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_controller(&self) -> Option<ControllerId> {
        match self {
            Value::Controller(id) => Some(*id),
            _ => None,
        }
    }

    /// Truthiness following the usual scripting rules: `Null`, `false`, `0`,
    /// and the empty string are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(value) => *value,
            Value::Number(value) => *value != 0.0,
            Value::Text(value) => !value.is_empty(),
            Value::List(_) | Value::Object(_) | Value::Controller(_) => true,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<ControllerId> for Value {
    fn from(id: ControllerId) -> Self {
        Value::Controller(id)
    }
}

impl<V: Into<Value>> From<Option<V>> for Value {
    fn from(value: Option<V>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A set of changes to shallow-merge over the current state.
///
/// Keys in the changes override, all other keys are retained. A `Null` value
/// stores `Null` under the key; `set_state` never removes keys.
#[derive(Debug, Clone, Default)]
pub struct StateChanges {
    entries: IndexMap<String, Value>,
}

impl StateChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for StateChanges {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// A frozen state snapshot. Cloning shares the underlying record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    record: Arc<IndexMap<String, Value>>,
}

impl State {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.record.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.record.contains_key(key)
    }

    /// Truthiness of an entry; missing keys read as `false`.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(Value::is_truthy)
    }

    /// Text of an entry; missing or non-text keys read as empty.
    pub fn text(&self, key: &str) -> &str {
        self.get(key).and_then(Value::as_str).unwrap_or("")
    }

    pub fn controller(&self, key: &str) -> Option<ControllerId> {
        self.get(key).and_then(Value::as_controller)
    }

    pub fn len(&self) -> usize {
        self.record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.record.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// The next snapshot: `changes` shallow-merged over this one.
    pub fn merged(&self, changes: StateChanges) -> State {
        if changes.is_empty() {
            return self.clone();
        }
        let mut record = (*self.record).clone();
        for (key, value) in changes.entries {
            record.insert(key, value);
        }
        State {
            record: Arc::new(record),
        }
    }

    /// True if both handles share the same underlying snapshot.
    pub fn shares_snapshot(&self, other: &State) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
    }

    #[cfg(feature = "json")]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&*self.record).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.record.serialize(serializer)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for State {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        State {
            record: Arc::new(
                iter.into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_merges_compose() {
        let initial = State::from_iter([("open", false), ("saving", false)]);
        let first = initial.merged(StateChanges::new().set("open", true));
        let second = first.merged(StateChanges::new().set("saving", true).set("count", 3i64));

        assert_eq!(
            second,
            State::from_iter([
                ("open", Value::Bool(true)),
                ("saving", Value::Bool(true)),
                ("count", Value::Number(3.0)),
            ]),
        );
        // The intermediate snapshot is untouched by the second merge.
        assert_eq!(first.get("saving"), Some(&Value::Bool(false)));
        assert!(!first.contains_key("count"));
    }

    #[test]
    fn null_changes_keep_the_key() {
        let state = State::from_iter([("field", Value::Text("name".into()))]);
        let next = state.merged(StateChanges::new().set("field", Value::Null));
        assert!(next.contains_key("field"));
        assert_eq!(next.get("field"), Some(&Value::Null));
        assert!(!next.flag("field"));
    }

    #[test]
    fn empty_changes_share_the_snapshot() {
        let state = State::from_iter([("open", true)]);
        let next = state.merged(StateChanges::new());
        assert!(state.shares_snapshot(&next));
    }

    #[test]
    fn merged_snapshots_are_distinct() {
        let state = State::from_iter([("open", true)]);
        let next = state.merged(StateChanges::new().set("open", false));
        assert!(!state.shares_snapshot(&next));
        assert!(state.flag("open"));
        assert!(!next.flag("open"));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Text(String::new()).is_truthy());
        assert!(Value::Number(-1.0).is_truthy());
        assert!(Value::Text("x".into()).is_truthy());
        assert!(Value::List(vec![]).is_truthy());
    }

    #[test]
    fn typed_accessors() {
        let state = State::from_iter([("label", "Save"), ("missing-type", "")]);
        assert_eq!(state.text("label"), "Save");
        assert_eq!(state.text("absent"), "");
        assert_eq!(state.controller("label"), None);
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_snapshot() {
        let state = State::from_iter([("open", true)]);
        assert_eq!(
            state.to_json(),
            serde_json::json!({"open": {"Bool": true}}),
        );
    }
}
