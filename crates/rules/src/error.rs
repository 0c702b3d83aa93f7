//! Errors raised while loading a cohort's rule set.
//!
//! Every variant is a cohort-level validation failure: the cohort is skipped
//! for the run and nothing about its members changes.

use uuid::Uuid;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RuleError {
    /// The cohort has no active form for its membership context.
    #[error("no active form")]
    NoActiveForm,

    /// Active forms exist, but none carries a `logic` + `conditions` tree.
    #[error("no active form carries a rule tree")]
    NoRuleTree,

    /// A rule tree node has a shape the parser cannot interpret.
    #[error("malformed rule tree at {path}: {reason}")]
    Malformed { path: String, reason: String },

    /// A form's rules reference fields missing from its field schema.
    #[error("form {form_id} rules reference undefined fields: {}", field_ids.join(", "))]
    UndefinedFields { form_id: Uuid, field_ids: Vec<String> },

    /// Wraps a malformed tree with the form it came from.
    #[error("form {form_id}: {source}")]
    InForm {
        form_id: Uuid,
        #[source]
        source: Box<RuleError>,
    },
}

impl RuleError {
    pub(crate) fn malformed(path: &str, reason: impl Into<String>) -> Self {
        RuleError::Malformed {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;
