//! Rule tree evaluation.
//!
//! [`evaluate`] answers pass/fail; [`evaluate_with_failures`] also collects
//! the leaf conditions that caused a failure, for rejection reasons.

mod reason;

use std::collections::HashMap;

use serde::Serialize;

use crate::schema::{Condition, Logic, RuleNode};

pub use reason::{format_rejection_reason, SHORTLISTED_REASON};

/// Recorded as the actual value when the member never answered the field.
pub const NOT_SUBMITTED: &str = "Not submitted";

/// Member answers keyed by normalized field id.
pub type FieldValues = HashMap<String, String>;

/// A leaf condition that did not hold for a member.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedCondition {
    pub field_id: String,
    pub field_label: String,
    pub expected: Vec<String>,
    pub actual: String,
}

/// Outcome of evaluating a tree, with the failures that explain a `false`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Evaluation {
    pub passed: bool,
    pub failures: Vec<FailedCondition>,
}

/// Evaluate a rule tree against a member's values.
pub fn evaluate(node: &RuleNode, values: &FieldValues) -> bool {
    match node {
        RuleNode::Group { logic, children } => match logic {
            Logic::And => children.iter().all(|c| evaluate(c, values)),
            Logic::Or => children.is_empty() || children.iter().any(|c| evaluate(c, values)),
        },
        RuleNode::Leaf(condition) => leaf_holds(condition, values),
    }
}

/// Evaluate a rule tree and collect the failed leaves.
///
/// A group that passes contributes no failures, even when some of its `OR`
/// branches failed.
pub fn evaluate_with_failures(node: &RuleNode, values: &FieldValues) -> Evaluation {
    let mut failures = Vec::new();
    let passed = collect(node, values, &mut failures);
    Evaluation { passed, failures }
}

fn collect(node: &RuleNode, values: &FieldValues, failures: &mut Vec<FailedCondition>) -> bool {
    match node {
        RuleNode::Group { logic, children } => {
            if children.is_empty() {
                return true;
            }
            let mut local = Vec::new();
            let results: Vec<bool> = children
                .iter()
                .map(|c| collect(c, values, &mut local))
                .collect();
            let passed = match logic {
                Logic::And => results.iter().all(|r| *r),
                Logic::Or => results.iter().any(|r| *r),
            };
            if !passed {
                failures.extend(local);
            }
            passed
        }
        RuleNode::Leaf(condition) => {
            if leaf_holds(condition, values) {
                return true;
            }
            failures.push(FailedCondition {
                field_id: condition.field_id.clone(),
                field_label: condition.field_name.clone(),
                expected: condition.expected.clone(),
                actual: values
                    .get(&condition.field_id)
                    .cloned()
                    .unwrap_or_else(|| NOT_SUBMITTED.to_string()),
            });
            false
        }
    }
}

fn leaf_holds(condition: &Condition, values: &FieldValues) -> bool {
    values
        .get(&condition.field_id)
        .is_some_and(|actual| condition.matches(actual))
}

// ── Tests ───────────────────────────────────────────────────────────
