//! Human-readable status reasons.

use crate::normalize::display_expected;

use super::FailedCondition;

pub const SHORTLISTED_REASON: &str = "Shortlisted: all eligibility criteria met";

/// `Rejected: Field A expected "yes" but found "no"; ...`
pub fn format_rejection_reason(failures: &[FailedCondition]) -> String {
    if failures.is_empty() {
        return "Rejected: eligibility criteria not met".to_string();
    }

    let parts: Vec<String> = failures
        .iter()
        .map(|f| {
            format!(
                "{} expected {} but found \"{}\"",
                f.field_label,
                display_expected(&f.expected),
                f.actual.trim()
            )
        })
        .collect();

    format!("Rejected: {}", parts.join("; "))
}
