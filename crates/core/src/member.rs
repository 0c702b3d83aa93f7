use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Lifecycle of a cohort membership.
///
/// `applied -> submitted -> {shortlisted | rejected} -> {dropout | archived}`,
/// plus the administrative `active` / `inactive` states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Applied,
    Submitted,
    Shortlisted,
    Rejected,
    Dropout,
    Archived,
    Active,
    Inactive,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Applied => "applied",
            MemberStatus::Submitted => "submitted",
            MemberStatus::Shortlisted => "shortlisted",
            MemberStatus::Rejected => "rejected",
            MemberStatus::Dropout => "dropout",
            MemberStatus::Archived => "archived",
            MemberStatus::Active => "active",
            MemberStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "applied" => Ok(MemberStatus::Applied),
            "submitted" => Ok(MemberStatus::Submitted),
            "shortlisted" => Ok(MemberStatus::Shortlisted),
            "rejected" => Ok(MemberStatus::Rejected),
            "dropout" => Ok(MemberStatus::Dropout),
            "archived" => Ok(MemberStatus::Archived),
            "active" => Ok(MemberStatus::Active),
            "inactive" => Ok(MemberStatus::Inactive),
            other => Err(DomainError::UnknownMemberStatus(other.to_string())),
        }
    }
}

/// One user's membership record within a cohort for an academic year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortMember {
    pub membership_id: Uuid,
    pub user_id: Uuid,
    pub cohort_id: Uuid,
    pub cohort_academic_year_id: Uuid,
    pub status: MemberStatus,
    pub status_reason: Option<String>,
    pub rejection_email_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Decision produced for one member. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub status: MemberStatus,
    pub status_reason: String,
    pub user_id: Uuid,
    pub cohort_id: Uuid,
}

/// Contact details used to address notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContact {
    pub user_id: Uuid,
    pub name: String,
    pub email: Option<String>,
}
