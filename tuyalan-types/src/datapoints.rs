//! Datapoint snapshot
//!
//! A device exposes its state as a flat map from datapoint code (a decimal
//! string such as `"104"`) to a JSON value.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Last known datapoint values of one device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Datapoints(Map<String, Value>);

impl Datapoints {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Merge a partial update, last write wins per code
    ///
    /// Returns the codes whose value actually changed.
    pub fn merge(&mut self, update: &Map<String, Value>) -> Vec<String> {
        let mut changed = Vec::new();

        for (code, value) in update {
            if self.0.get(code) != Some(value) {
                self.0.insert(code.clone(), value.clone());
                changed.push(code.clone());
            }
        }

        changed
    }

    pub fn insert(&mut self, code: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(code.into(), value.into())
    }

    pub fn get(&self, code: &str) -> Option<&Value> {
        self.0.get(code)
    }

    pub fn get_str(&self, code: &str) -> Option<&str> {
        self.get(code).and_then(Value::as_str)
    }

    pub fn get_bool(&self, code: &str) -> Option<bool> {
        self.get(code).and_then(Value::as_bool)
    }

    /// Integer value, accepting numeric strings as some firmwares send them
    pub fn get_i64(&self, code: &str) -> Option<i64> {
        match self.get(code)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn contains(&self, code: &str) -> bool {
        self.0.contains_key(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Datapoints {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Datapoints> for Value {
    fn from(dps: Datapoints) -> Self {
        Value::Object(dps.0)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Datapoints {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Display for Datapoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.0.clone()))
    }
}
