//! Applies a status transition to one member and fans it out.
//!
//! The status write is the only step whose failure fails the member. LMS
//! enrollment, search index sync and email are independent best-effort steps
//! that log and record their own failures; a later run or a reconciliation
//! sweep can retry them.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cohort_connector::search::has_application;
use cohort_connector::{IndexUpdate, LearningService, SearchIndex};
use cohort_core::{Cohort, CohortMember, MemberStatus};
use cohort_notify::{status_notification, NotificationService};
use cohort_storage::CohortStore;

use crate::context::RunContext;
use crate::error::{EngineError, MemberError};
use crate::failure_log::{FailureRecord, FailureScope};

/// Where the transition comes from; decides which side effects fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Scheduled shortlisting: the write only claims `submitted` members, and
    /// only `shortlisted` is emailed right away.
    Batch,
    /// A single administrative update: unconditional write, de-enrollment on
    /// rejection, email for the configured statuses.
    Interactive,
}

/// What happened to one member.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateOutcome {
    pub courses_enrolled: usize,
    pub courses_unenrolled: usize,
    pub enrollment_failures: usize,
    pub index_synced: bool,
    pub emailed: bool,
}

pub struct MemberStatusUpdater {
    store: Arc<dyn CohortStore>,
    lms: Arc<dyn LearningService>,
    index: Option<Arc<dyn SearchIndex>>,
    notifier: Arc<dyn NotificationService>,
}

impl MemberStatusUpdater {
    pub fn new(
        store: Arc<dyn CohortStore>,
        lms: Arc<dyn LearningService>,
        index: Option<Arc<dyn SearchIndex>>,
        notifier: Arc<dyn NotificationService>,
    ) -> Self {
        Self {
            store,
            lms,
            index,
            notifier,
        }
    }

    /// Persist `status` + `reason`, then run the side effects for `mode`.
    pub async fn apply(
        &self,
        ctx: &RunContext,
        cohort: &Cohort,
        member: &CohortMember,
        status: MemberStatus,
        reason: &str,
        mode: UpdateMode,
    ) -> Result<UpdateOutcome, MemberError> {
        self.persist(member, status, reason, mode).await?;
        Ok(self.fan_out(ctx, cohort, member, status, reason, mode).await)
    }

    /// The status write. In batch mode the row is claimed only while it is
    /// still `submitted`; zero rows affected fails the member.
    pub async fn persist(
        &self,
        member: &CohortMember,
        status: MemberStatus,
        reason: &str,
        mode: UpdateMode,
    ) -> Result<(), MemberError> {
        let expected = match mode {
            UpdateMode::Batch => Some(MemberStatus::Submitted),
            UpdateMode::Interactive => None,
        };
        let rows = self
            .store
            .update_member_status(member.membership_id, expected, status, reason)
            .await?;
        if rows == 0 {
            return Err(MemberError::NotUpdated);
        }
        debug!(membership_id = %member.membership_id, %status, "Member status written");
        Ok(())
    }

    /// Side effects of a committed status write. Each external call is bounded
    /// by the per-call timeout only; failures are recorded, never returned.
    pub async fn fan_out(
        &self,
        ctx: &RunContext,
        cohort: &Cohort,
        member: &CohortMember,
        status: MemberStatus,
        reason: &str,
        mode: UpdateMode,
    ) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::default();

        match (status, mode) {
            (MemberStatus::Shortlisted, _) => self.enroll(ctx, member, &mut outcome).await,
            (MemberStatus::Rejected, UpdateMode::Interactive) => {
                self.unenroll(ctx, member, &mut outcome).await
            }
            _ => {}
        }

        if ctx.settings.search_sync_enabled {
            outcome.index_synced = self.sync_index(ctx, member, status, reason).await;
        }

        let should_email = ctx.settings.email_notifications_enabled
            && match mode {
                UpdateMode::Batch => status == MemberStatus::Shortlisted,
                UpdateMode::Interactive => ctx.settings.notifies_on(status),
            };
        if should_email {
            outcome.emailed = self.email(ctx, cohort, member, status, reason).await;
        }

        outcome
    }

    /// Interactive single-member update, outside any batch run.
    pub async fn update_member(
        &self,
        ctx: &RunContext,
        membership_id: Uuid,
        status: MemberStatus,
        reason: &str,
    ) -> Result<UpdateOutcome, EngineError> {
        let member = self
            .store
            .fetch_member(membership_id)
            .await?
            .ok_or(EngineError::MemberNotFound(membership_id))?;
        let cohort = self
            .store
            .cohort(member.cohort_id)
            .await?
            .ok_or(MemberError::CohortMissing(member.cohort_id))?;

        let outcome = self
            .apply(ctx, &cohort, &member, status, reason, UpdateMode::Interactive)
            .await?;
        info!(%membership_id, %status, ?outcome, "Member status updated");
        Ok(outcome)
    }

    async fn enroll(&self, ctx: &RunContext, member: &CohortMember, outcome: &mut UpdateOutcome) {
        let Some(courses) = self.courses(ctx, member).await else {
            outcome.enrollment_failures += 1;
            return;
        };
        for course in courses {
            match ctx
                .external("lms_enroll", self.lms.enroll(&course.course_id, member.user_id))
                .await
            {
                Ok(()) => outcome.courses_enrolled += 1,
                Err(e) => {
                    outcome.enrollment_failures += 1;
                    side_effect_failed(ctx, member, "lms_enroll", &format!("course {}: {e}", course.course_id)).await;
                }
            }
        }
    }

    async fn unenroll(&self, ctx: &RunContext, member: &CohortMember, outcome: &mut UpdateOutcome) {
        let Some(courses) = self.courses(ctx, member).await else {
            outcome.enrollment_failures += 1;
            return;
        };
        for course in courses {
            match ctx
                .external("lms_unenroll", self.lms.unenroll(&course.course_id, member.user_id))
                .await
            {
                Ok(()) => outcome.courses_unenrolled += 1,
                Err(e) => {
                    outcome.enrollment_failures += 1;
                    side_effect_failed(ctx, member, "lms_unenroll", &format!("course {}: {e}", course.course_id)).await;
                }
            }
        }
    }

    async fn courses(&self, ctx: &RunContext, member: &CohortMember) -> Option<Vec<cohort_connector::Course>> {
        match ctx
            .external("lms_courses", self.lms.published_courses(member.cohort_id))
            .await
        {
            Ok(courses) => Some(courses),
            Err(e) => {
                side_effect_failed(ctx, member, "lms_courses", &e.to_string()).await;
                None
            }
        }
    }

    /// Patch the member's application entry for this cohort, or append one
    /// when the indexed document has none yet. Unindexed users are skipped.
    async fn sync_index(
        &self,
        ctx: &RunContext,
        member: &CohortMember,
        status: MemberStatus,
        reason: &str,
    ) -> bool {
        let Some(index) = &self.index else {
            return false;
        };

        let doc = match ctx.external("index_get", index.get(member.user_id)).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                debug!(user_id = %member.user_id, "User not indexed, skipping index sync");
                return false;
            }
            Err(e) => {
                side_effect_failed(ctx, member, "index_get", &e.to_string()).await;
                return false;
            }
        };

        let now = Utc::now();
        let update = if has_application(&doc, member.cohort_id) {
            IndexUpdate::application_status(member.cohort_id, status, reason, now)
        } else {
            IndexUpdate::append_application(member.cohort_id, status, reason, now)
        };

        match ctx.external("index_update", index.update(member.user_id, update)).await {
            Ok(()) => true,
            Err(e) => {
                side_effect_failed(ctx, member, "index_update", &e.to_string()).await;
                false
            }
        }
    }

    async fn email(
        &self,
        ctx: &RunContext,
        cohort: &Cohort,
        member: &CohortMember,
        status: MemberStatus,
        reason: &str,
    ) -> bool {
        let contact = match self.store.user_contact(member.user_id).await {
            Ok(Some(contact)) => contact,
            Ok(None) => {
                side_effect_failed(ctx, member, "notify", "user not found").await;
                return false;
            }
            Err(e) => {
                side_effect_failed(ctx, member, "notify", &e.to_string()).await;
                return false;
            }
        };
        let Some(request) = status_notification(&contact, cohort, status, Some(reason)) else {
            side_effect_failed(ctx, member, "notify", &MemberError::MissingEmail(member.user_id).to_string()).await;
            return false;
        };

        match ctx.external("notify", self.notifier.send(&request)).await {
            Ok(report) if report.is_clean() => true,
            Ok(report) => {
                let errors: Vec<String> = report
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.recipient, e.error))
                    .collect();
                warn!(
                    user_id = %member.user_id,
                    email = %request.recipients.join(","),
                    cohort_id = %member.cohort_id,
                    "Status email reported delivery errors"
                );
                side_effect_failed(ctx, member, "notify", &errors.join("; ")).await;
                false
            }
            Err(e) => {
                side_effect_failed(ctx, member, "notify", &e.to_string()).await;
                false
            }
        }
    }
}

async fn side_effect_failed(ctx: &RunContext, member: &CohortMember, stage: &str, error: &str) {
    ctx.record_failure(FailureRecord {
        cohort_id: member.cohort_id,
        membership_id: Some(member.membership_id),
        user_id: Some(member.user_id),
        scope: FailureScope::SideEffect,
        stage: stage.to_string(),
        error: error.to_string(),
    })
    .await;
}
