use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Context type under which membership forms are attached to a cohort.
pub const COHORT_MEMBER_CONTEXT: &str = "COHORTMEMBER";

/// An active form as stored: the field schema and the raw rule tree JSON.
///
/// Parsing `rules` into a typed tree happens in `cohort-rules`, so a
/// malformed tree is caught when the cohort's rule set is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormRecord {
    pub form_id: Uuid,
    pub title: String,
    pub fields: serde_json::Value,
    pub rules: Option<serde_json::Value>,
}
