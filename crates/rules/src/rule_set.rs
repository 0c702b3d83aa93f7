//! Per-cohort rule set built from the cohort's active forms.

use std::collections::HashMap;

use cohort_core::{FormRecord, MemberStatus};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, RuleError};
use crate::evaluator::{
    evaluate_with_failures, format_rejection_reason, Evaluation, FieldValues, SHORTLISTED_REASON,
};
use crate::parser::{is_rule_tree, parse_rule_tree};
use crate::schema::{normalize_field_id, RuleNode};
use crate::validation::validate_field_references;

/// One rule-bearing form, parsed and validated.
#[derive(Debug, Clone, PartialEq)]
pub struct FormRule {
    pub form_id: Uuid,
    pub title: String,
    pub tree: RuleNode,
}

/// Status and reason derived for one member.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub status: MemberStatus,
    pub reason: String,
    pub evaluation: Evaluation,
}

/// All rule-bearing forms of a cohort. A member is shortlisted only when
/// every form passes.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    forms: Vec<FormRule>,
}

impl RuleSet {
    /// Build the rule set for a cohort from its active forms.
    ///
    /// Forms without a top-level `{logic, conditions}` tree are ignored. Any
    /// tree that fails to parse or references an undefined field fails the
    /// whole set.
    pub fn from_forms(forms: &[FormRecord]) -> Result<Self> {
        if forms.is_empty() {
            return Err(RuleError::NoActiveForm);
        }

        let mut rules = Vec::new();
        for form in forms {
            let Some(raw) = form.rules.as_ref().filter(|r| is_rule_tree(r)) else {
                debug!(form_id = %form.form_id, "Form carries no rule tree, ignoring");
                continue;
            };

            let tree = parse_rule_tree(raw).map_err(|e| RuleError::InForm {
                form_id: form.form_id,
                source: Box::new(e),
            })?;
            validate_field_references(form.form_id, &tree, &form.fields)?;

            rules.push(FormRule {
                form_id: form.form_id,
                title: form.title.clone(),
                tree,
            });
        }

        if rules.is_empty() {
            return Err(RuleError::NoRuleTree);
        }
        Ok(Self { forms: rules })
    }

    pub fn forms(&self) -> &[FormRule] {
        &self.forms
    }

    /// Evaluate every form; failures of all failing forms are concatenated.
    pub fn evaluate(&self, values: &FieldValues) -> Evaluation {
        let mut combined = Evaluation {
            passed: true,
            failures: Vec::new(),
        };
        for form in &self.forms {
            let eval = evaluate_with_failures(&form.tree, values);
            if !eval.passed {
                combined.passed = false;
                combined.failures.extend(eval.failures);
            }
        }
        combined
    }

    /// Map an evaluation onto the member's new status and reason.
    pub fn decide(&self, values: &FieldValues) -> Decision {
        let evaluation = self.evaluate(values);
        let (status, reason) = if evaluation.passed {
            (MemberStatus::Shortlisted, SHORTLISTED_REASON.to_string())
        } else {
            (
                MemberStatus::Rejected,
                format_rejection_reason(&evaluation.failures),
            )
        };
        Decision {
            status,
            reason,
            evaluation,
        }
    }
}

/// Build the evaluator's lookup map from `(field_id, value)` pairs.
///
/// Keys are normalized the same way rule leaves are. When a field appears
/// twice the later value wins.
pub fn field_values<I, K>(pairs: I) -> FieldValues
where
    I: IntoIterator<Item = (K, String)>,
    K: AsRef<str>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (normalize_field_id(k.as_ref()), v))
        .collect::<HashMap<_, _>>()
}
