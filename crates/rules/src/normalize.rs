//! Value normalization shared by leaf evaluation and reason formatting.
//!
//! Stored values arrive as scalars, arrays, or comma-joined strings
//! (multi-select fields). Both sides of a comparison are folded into a
//! [`ValueSet`]: the whole trimmed, lowercased strings plus every
//! comma-separated part.

use std::collections::BTreeSet;

/// Case-folded view of one or more values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueSet {
    wholes: BTreeSet<String>,
    parts: BTreeSet<String>,
}

impl ValueSet {
    /// Build from a single raw value (possibly comma-joined).
    pub fn from_value(raw: &str) -> Self {
        let mut set = Self::default();
        set.insert(raw);
        set
    }

    /// Build from a list of raw values, any of which may match.
    pub fn from_items<S: AsRef<str>>(items: &[S]) -> Self {
        let mut set = Self::default();
        for item in items {
            set.insert(item.as_ref());
        }
        set
    }

    fn insert(&mut self, raw: &str) {
        let whole = fold(raw);
        if !whole.is_empty() {
            self.wholes.insert(whole);
        }
        for part in raw.split(',') {
            let part = fold(part);
            if !part.is_empty() {
                self.parts.insert(part);
            }
        }
    }

    /// True when the two sets share a whole value or any comma-separated part.
    pub fn intersects(&self, other: &ValueSet) -> bool {
        !self.wholes.is_disjoint(&other.wholes) || !self.parts.is_disjoint(&other.parts)
    }

    pub fn is_empty(&self) -> bool {
        self.wholes.is_empty()
    }
}

fn fold(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Render a JSON scalar as the string form used for comparison.
///
/// Whole-number floats drop their fraction so `5.0` compares equal to `"5"`.
pub fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Number(n) => Some(match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        }),
        _ => None,
    }
}

/// Format expected values for a human-readable reason: `"x"` or `"x" or "y"`.
pub fn display_expected<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| format!("\"{}\"", item.as_ref().trim()))
        .collect::<Vec<_>>()
        .join(" or ")
}
