use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CohortStatus {
    Active,
    Inactive,
    Archived,
}

impl CohortStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CohortStatus::Active => "active",
            CohortStatus::Inactive => "inactive",
            CohortStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for CohortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CohortStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(CohortStatus::Active),
            "inactive" => Ok(CohortStatus::Inactive),
            "archived" => Ok(CohortStatus::Archived),
            other => Err(DomainError::UnknownCohortStatus(other.to_string())),
        }
    }
}

/// Administrative grouping of members for one academic year.
///
/// The shortlist and rejection-notification dates are custom field values
/// attached to the cohort, not columns, so they do not appear here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    pub cohort_id: Uuid,
    pub name: String,
    pub status: CohortStatus,
}

impl Cohort {
    pub fn is_active(&self) -> bool {
        self.status == CohortStatus::Active
    }
}
