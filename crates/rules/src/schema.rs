//! Typed rule tree.
//!
//! Stored forms carry their rules as generic JSON of the shape
//! `{logic: AND|OR, conditions: [Condition | RuleTree, ...]}`. The parser in
//! [`crate::parser`] converts that JSON into [`RuleNode`] once per run so the
//! evaluator never sees an ill-shaped node.

use serde::Serialize;

use crate::normalize::ValueSet;

/// How a group combines its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    And,
    Or,
}

impl Logic {
    /// Parse a stored logic label. Missing or unrecognized labels mean `AND`.
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(|l| l.trim().to_ascii_uppercase()) {
            Some(l) if l == "OR" => Logic::Or,
            _ => Logic::And,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Logic::And => "AND",
            Logic::Or => "OR",
        }
    }
}

/// A node of the rule tree: either a group of children or a field condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RuleNode {
    Group {
        logic: Logic,
        children: Vec<RuleNode>,
    },
    Leaf(Condition),
}

impl RuleNode {
    /// Visit every leaf condition, depth first.
    pub fn for_each_condition<'a>(&'a self, f: &mut impl FnMut(&'a Condition)) {
        match self {
            RuleNode::Group { children, .. } => {
                for child in children {
                    child.for_each_condition(f);
                }
            }
            RuleNode::Leaf(condition) => f(condition),
        }
    }
}

/// Leaf check: the member's value for `field_id` must match `expected`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    /// Normalized (trimmed, lowercased) field identifier.
    pub field_id: String,
    /// Human-readable label used in rejection reasons.
    pub field_name: String,
    /// Expected values as authored. More than one means "any of".
    pub expected: Vec<String>,
    #[serde(skip)]
    pub(crate) matcher: ValueSet,
}

impl Condition {
    pub fn new(field_id: impl Into<String>, field_name: impl Into<String>, expected: Vec<String>) -> Self {
        let matcher = ValueSet::from_items(&expected);
        Self {
            field_id: normalize_field_id(&field_id.into()),
            field_name: field_name.into(),
            expected,
            matcher,
        }
    }

    /// Whether the member's raw stored value satisfies this condition.
    pub fn matches(&self, actual: &str) -> bool {
        self.matcher.intersects(&ValueSet::from_value(actual))
    }
}

/// Field ids are compared trimmed and lowercased so UUIDs match regardless of case.
pub fn normalize_field_id(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
