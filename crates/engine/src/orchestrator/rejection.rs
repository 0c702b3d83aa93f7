use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::{error, info, warn};

use cohort_core::{Cohort, CohortMember, MemberStatus};
use cohort_notify::{status_notification, NotificationService};
use cohort_storage::CohortStore;

use crate::batch::{BatchRunner, BatchWorker, Subject};
use crate::context::RunContext;
use crate::error::{EngineError, MemberError};
use crate::report::{CohortOutcome, RejectionEmailReport};
use crate::scanner::Backlog;

use super::Engine;

const EMAIL_DISABLED: &str = "email notifications disabled";

/// Sends the deferred rejection email and flips the member's sent flag.
struct RejectionEmailWorker<'a> {
    ctx: &'a RunContext,
    cohort: &'a Cohort,
    store: &'a dyn CohortStore,
    notifier: &'a dyn NotificationService,
}

#[async_trait]
impl BatchWorker for RejectionEmailWorker<'_> {
    type Item = CohortMember;
    type Prefetch = ();
    type Committed = ();

    async fn prepare(&self, _batch: &[CohortMember]) -> Result<(), MemberError> {
        Ok(())
    }

    async fn process(&self, member: &CohortMember, _prefetch: &()) -> Result<(), MemberError> {
        let contact = self
            .store
            .user_contact(member.user_id)
            .await?
            .ok_or(MemberError::MissingEmail(member.user_id))?;
        let request = status_notification(
            &contact,
            self.cohort,
            MemberStatus::Rejected,
            member.status_reason.as_deref(),
        )
        .ok_or(MemberError::MissingEmail(member.user_id))?;

        let report = self.ctx.external("notify", self.notifier.send(&request)).await?;
        if !report.is_clean() {
            let errors: Vec<String> = report
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.recipient, e.error))
                .collect();
            warn!(
                user_id = %member.user_id,
                email = %request.recipients.join(","),
                cohort_id = %member.cohort_id,
                "Rejection email reported delivery errors; will retry next run"
            );
            return Err(MemberError::Delivery(errors.join("; ")));
        }

        if self.store.mark_rejection_email_sent(member.membership_id).await? == 0 {
            return Err(MemberError::NotUpdated);
        }
        Ok(())
    }

    async fn follow_up(&self, _member: &CohortMember, _committed: ()) -> &'static str {
        "sent"
    }

    fn subject(&self, member: &CohortMember) -> Subject {
        Subject {
            cohort_id: member.cohort_id,
            membership_id: Some(member.membership_id),
            user_id: Some(member.user_id),
        }
    }
}

impl Engine {
    /// Email rejected members of every cohort whose rejection-notification
    /// date is today or earlier.
    pub async fn send_rejection_emails(&self) -> Result<RejectionEmailReport, EngineError> {
        self.send_rejection_emails_on(Utc::now().date_naive()).await
    }

    pub async fn send_rejection_emails_on(
        &self,
        today: NaiveDate,
    ) -> Result<RejectionEmailReport, EngineError> {
        let date_field = self.settings.rejection_field()?;
        let ctx = self.context("rejection_emails");

        if !self.settings.email_notifications_enabled {
            info!(run_id = %ctx.run_id, "Rejection email sweep skipped: {EMAIL_DISABLED}");
            return Ok(RejectionEmailReport::skipped(ctx.run_id, ctx.started_at, EMAIL_DISABLED));
        }

        let started = Instant::now();
        info!(run_id = %ctx.run_id, %today, "Rejection email sweep started");

        let cohorts = match self.scanner.find_eligible_cohorts(date_field, today).await {
            Ok(cohorts) => cohorts,
            Err(e) => {
                error!(run_id = %ctx.run_id, error = %e, "Failed to list eligible cohorts");
                return Ok(RejectionEmailReport::build(
                    ctx.run_id,
                    ctx.started_at,
                    Some(e.to_string()),
                    Vec::new(),
                    started.elapsed(),
                ));
            }
        };

        let mut outcomes = Vec::with_capacity(cohorts.len());
        for cohort in &cohorts {
            outcomes.push(self.email_cohort(&ctx, cohort).await);
        }

        let report =
            RejectionEmailReport::build(ctx.run_id, ctx.started_at, None, outcomes, started.elapsed());
        info!(
            run_id = %ctx.run_id,
            cohorts = report.totals.cohorts_scanned,
            sent = report.totals.sent,
            failed = report.totals.failed,
            "Rejection email sweep finished"
        );
        Ok(report)
    }

    async fn email_cohort(&self, ctx: &RunContext, cohort: &Cohort) -> CohortOutcome {
        let started = Instant::now();
        let members = match self
            .scanner
            .load_backlog(cohort, Backlog::UnnotifiedRejected, self.settings.backlog_limit)
            .await
        {
            Ok(members) => members,
            Err(e) => {
                error!(cohort_id = %cohort.cohort_id, error = %e, "Failed to load backlog");
                return CohortOutcome::skipped(cohort, e.to_string());
            }
        };
        if members.is_empty() {
            return CohortOutcome::empty(cohort);
        }

        let worker = RejectionEmailWorker {
            ctx,
            cohort,
            store: Arc::as_ref(&self.store),
            notifier: Arc::as_ref(&self.notifier),
        };
        let summary = BatchRunner::from_context(ctx).run(&members, &worker, ctx).await;
        info!(
            cohort_id = %cohort.cohort_id,
            sent = summary.succeeded("sent"),
            failed = summary.failed,
            "Cohort rejection emails sent"
        );
        CohortOutcome::processed(cohort, summary, started.elapsed())
    }
}
