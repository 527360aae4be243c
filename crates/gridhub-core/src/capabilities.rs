//! Capability sets requested by clients and advertised by nodes.
//!
//! A capability set is a flat map of names to JSON values, e.g.
//! `{"browserName": "chrome", "platform": "LINUX"}`. Requests are matched
//! against a node's advertised sets with [`Capabilities::satisfied_by`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wildcard values that match whatever a node offers.
const WILDCARDS: &[&str] = &["", "any", "*"];

/// An ordered map of capability names to values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(BTreeMap<String, Value>);

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a `key=value` pair as given on the command line.
    ///
    /// The value is read as JSON when it parses (`maxInstances=5`,
    /// `headless=true`), otherwise kept as a plain string.
    pub fn parse_pair(pair: &str) -> Option<(String, Value)> {
        let (key, raw) = pair.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        let raw = raw.trim();
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        Some((key.to_string(), value))
    }

    /// Whether `offered` can serve this request.
    ///
    /// Every requested key must be present in `offered` with an equal
    /// value. `null`, `""`, `"any"` and `"*"` (case-insensitive) match
    /// anything, including a missing key. String comparison ignores case.
    pub fn satisfied_by(&self, offered: &Capabilities) -> bool {
        self.0.iter().all(|(key, wanted)| {
            if is_wildcard(wanted) {
                return true;
            }
            match offered.0.get(key) {
                Some(have) => values_match(wanted, have),
                None => false,
            }
        })
    }
}

fn is_wildcard(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => WILDCARDS.iter().any(|w| s.eq_ignore_ascii_case(w)),
        _ => false,
    }
}

fn values_match(wanted: &Value, have: &Value) -> bool {
    match (wanted, have) {
        (Value::String(w), Value::String(h)) => w.eq_ignore_ascii_case(h),
        _ => wanted == have,
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Capabilities {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
