//! Status-change notifications sent to members.
//!
//! Message content lives in the notification service's templates; this
//! module only picks the template key and fills its replacements.

use std::collections::BTreeMap;

use cohort_core::{Cohort, MemberStatus, UserContact};

use crate::traits::NotificationRequest;

pub const CONTEXT: &str = "COHORT";

/// Template key used by the rejection-email sweep.
pub const REJECTED_KEY: &str = "COHORT_MEMBER_REJECTED";

/// Template key for a status, e.g. `COHORT_MEMBER_SHORTLISTED`.
pub fn status_key(status: MemberStatus) -> String {
    format!("COHORT_MEMBER_{}", status.as_str().to_ascii_uppercase())
}

/// Build the notification for a member's new status. `None` when the user
/// has no email address on file.
pub fn status_notification(
    contact: &UserContact,
    cohort: &Cohort,
    status: MemberStatus,
    reason: Option<&str>,
) -> Option<NotificationRequest> {
    let email = contact.email.as_deref()?.trim();
    if email.is_empty() {
        return None;
    }

    let mut replacements = BTreeMap::from([
        ("{username}".to_string(), contact.name.clone()),
        ("{cohortName}".to_string(), cohort.name.clone()),
        ("{status}".to_string(), status.as_str().to_string()),
    ]);
    if let Some(reason) = reason {
        replacements.insert("{statusReason}".to_string(), reason.to_string());
    }

    Some(NotificationRequest {
        context: CONTEXT.to_string(),
        key: status_key(status),
        replacements,
        recipients: vec![email.to_string()],
    })
}
