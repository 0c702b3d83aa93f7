//! Finds cohorts due for processing and loads what each run needs from them.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};
use uuid::Uuid;

use cohort_core::{Cohort, CohortMember};
use cohort_rules::{RuleError, RuleSet};
use cohort_storage::{CohortStore, StorageError};

/// Which member backlog a run works through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backlog {
    /// `submitted` members awaiting evaluation.
    Submitted,
    /// `rejected` members whose rejection email is still unsent.
    UnnotifiedRejected,
}

/// Why a cohort's rule set could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum RuleSetError {
    #[error(transparent)]
    Rules(#[from] RuleError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Clone)]
pub struct CohortScanner {
    store: Arc<dyn CohortStore>,
}

impl CohortScanner {
    pub fn new(store: Arc<dyn CohortStore>) -> Self {
        Self { store }
    }

    /// Active cohorts whose date field is on or before `today`. Past dates
    /// are included so a missed run is picked up by the next one.
    pub async fn find_eligible_cohorts(
        &self,
        date_field_id: Uuid,
        today: NaiveDate,
    ) -> Result<Vec<Cohort>, StorageError> {
        let cohorts = self.store.eligible_cohorts(date_field_id, today).await?;
        info!(%date_field_id, %today, count = cohorts.len(), "Eligible cohorts found");
        Ok(cohorts)
    }

    /// Load, parse and validate the rule trees of the cohort's active forms.
    pub async fn load_rule_set(&self, cohort: &Cohort) -> Result<RuleSet, RuleSetError> {
        let forms = self.store.active_forms(cohort.cohort_id).await?;
        match RuleSet::from_forms(&forms) {
            Ok(rule_set) => Ok(rule_set),
            Err(e) => {
                match &e {
                    RuleError::UndefinedFields { form_id, field_ids } => warn!(
                        cohort_id = %cohort.cohort_id,
                        %form_id,
                        field_ids = %field_ids.join(","),
                        "Rule tree references undefined fields, skipping cohort"
                    ),
                    other => warn!(
                        cohort_id = %cohort.cohort_id,
                        forms = forms.len(),
                        error = %other,
                        "No usable rule set, skipping cohort"
                    ),
                }
                Err(e.into())
            }
        }
    }

    /// Oldest-first backlog, capped at `limit` members.
    pub async fn load_backlog(
        &self,
        cohort: &Cohort,
        backlog: Backlog,
        limit: usize,
    ) -> Result<Vec<CohortMember>, StorageError> {
        let members = match backlog {
            Backlog::Submitted => self.store.submitted_members(cohort.cohort_id, limit).await?,
            Backlog::UnnotifiedRejected => {
                self.store
                    .unnotified_rejected_members(cohort.cohort_id, limit)
                    .await?
            }
        };
        if members.len() == limit {
            warn!(
                cohort_id = %cohort.cohort_id,
                limit,
                "Backlog hit the per-run cap; the remainder is picked up next run"
            );
        }
        Ok(members)
    }
}
