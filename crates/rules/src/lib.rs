//! Eligibility rule trees for cohort membership shortlisting.
//!
//! Stored forms carry an AND/OR tree of field conditions. This crate parses
//! that JSON into [`RuleNode`], checks it against the form's field schema,
//! and evaluates members against it, producing the failed conditions used in
//! rejection reasons.

pub mod error;
pub mod evaluator;
pub mod normalize;
pub mod parser;
pub mod rule_set;
pub mod schema;
pub mod validation;

pub use error::RuleError;
pub use evaluator::{
    evaluate, evaluate_with_failures, format_rejection_reason, Evaluation, FailedCondition,
    FieldValues, NOT_SUBMITTED, SHORTLISTED_REASON,
};
pub use parser::{is_rule_tree, parse_rule_tree};
pub use rule_set::{field_values, Decision, FormRule, RuleSet};
pub use schema::{Condition, Logic, RuleNode};
