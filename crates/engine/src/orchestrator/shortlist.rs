use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::{error, info};
use uuid::Uuid;

use cohort_core::{Cohort, CohortMember, EvaluationResult};
use cohort_rules::{FieldValues, RuleSet};

use crate::batch::{BatchRunner, BatchWorker, Subject};
use crate::context::RunContext;
use crate::error::{EngineError, MemberError};
use crate::report::{CohortOutcome, ShortlistReport};
use crate::resolver::{lookup, FieldValueResolver};
use crate::scanner::Backlog;
use crate::updater::{MemberStatusUpdater, UpdateMode};

use super::Engine;

/// Evaluates one cohort's submitted members against its rule set.
struct ShortlistWorker<'a> {
    ctx: &'a RunContext,
    cohort: &'a Cohort,
    rule_set: &'a RuleSet,
    resolver: &'a FieldValueResolver,
    updater: &'a MemberStatusUpdater,
}

#[async_trait]
impl BatchWorker for ShortlistWorker<'_> {
    type Item = CohortMember;
    type Prefetch = HashMap<Uuid, FieldValues>;
    type Committed = EvaluationResult;

    async fn prepare(&self, batch: &[CohortMember]) -> Result<Self::Prefetch, MemberError> {
        let user_ids: Vec<Uuid> = batch.iter().map(|m| m.user_id).collect();
        let resolved = self.resolver.resolve_batch(&user_ids).await?;
        Ok(resolved
            .into_iter()
            .map(|(user_id, values)| (user_id, lookup(&values)))
            .collect())
    }

    async fn process(
        &self,
        member: &CohortMember,
        prefetch: &Self::Prefetch,
    ) -> Result<EvaluationResult, MemberError> {
        let empty = FieldValues::new();
        let values = prefetch.get(&member.user_id).unwrap_or(&empty);
        let decision = self.rule_set.decide(values);
        let result = EvaluationResult {
            status: decision.status,
            status_reason: decision.reason,
            user_id: member.user_id,
            cohort_id: member.cohort_id,
        };

        self.updater
            .persist(member, result.status, &result.status_reason, UpdateMode::Batch)
            .await?;
        Ok(result)
    }

    async fn follow_up(&self, member: &CohortMember, result: EvaluationResult) -> &'static str {
        self.updater
            .fan_out(
                self.ctx,
                self.cohort,
                member,
                result.status,
                &result.status_reason,
                UpdateMode::Batch,
            )
            .await;
        result.status.as_str()
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
    /// Shortlist every cohort whose shortlist date is today or earlier.
    pub async fn evaluate_shortlisting(&self) -> Result<ShortlistReport, EngineError> {
        self.evaluate_shortlisting_on(Utc::now().date_naive()).await
    }

    pub async fn evaluate_shortlisting_on(&self, today: NaiveDate) -> Result<ShortlistReport, EngineError> {
        let date_field = self.settings.shortlist_field()?;
        let ctx = self.context("shortlist");
        let started = Instant::now();
        info!(run_id = %ctx.run_id, %today, "Shortlisting run started");

        let cohorts = match self.scanner.find_eligible_cohorts(date_field, today).await {
            Ok(cohorts) => cohorts,
            Err(e) => {
                error!(run_id = %ctx.run_id, error = %e, "Failed to list eligible cohorts");
                return Ok(ShortlistReport::build(
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
            outcomes.push(self.shortlist_cohort(&ctx, cohort).await);
        }

        let report = ShortlistReport::build(ctx.run_id, ctx.started_at, None, outcomes, started.elapsed());
        info!(
            run_id = %ctx.run_id,
            cohorts = report.totals.cohorts_scanned,
            processed = report.totals.processed,
            shortlisted = report.totals.shortlisted,
            rejected = report.totals.rejected,
            failed = report.totals.failed,
            records_per_second = report.performance.records_per_second,
            "Shortlisting run finished"
        );
        Ok(report)
    }

    async fn shortlist_cohort(&self, ctx: &RunContext, cohort: &Cohort) -> CohortOutcome {
        let started = Instant::now();

        let rule_set = match self.scanner.load_rule_set(cohort).await {
            Ok(rule_set) => rule_set,
            Err(e) => return CohortOutcome::skipped(cohort, e.to_string()),
        };

        let members = match self
            .scanner
            .load_backlog(cohort, Backlog::Submitted, self.settings.backlog_limit)
            .await
        {
            Ok(members) => members,
            Err(e) => {
                error!(cohort_id = %cohort.cohort_id, error = %e, "Failed to load backlog");
                return CohortOutcome::skipped(cohort, e.to_string());
            }
        };
        if members.is_empty() {
            info!(cohort_id = %cohort.cohort_id, "No submitted members");
            return CohortOutcome::empty(cohort);
        }

        info!(
            cohort_id = %cohort.cohort_id,
            cohort = %cohort.name,
            members = members.len(),
            forms = rule_set.forms().len(),
            "Evaluating cohort"
        );
        let worker = ShortlistWorker {
            ctx,
            cohort,
            rule_set: &rule_set,
            resolver: &self.resolver,
            updater: Arc::as_ref(&self.updater),
        };
        let summary = BatchRunner::from_context(ctx).run(&members, &worker, ctx).await;

        info!(
            cohort_id = %cohort.cohort_id,
            processed = summary.processed,
            shortlisted = summary.succeeded("shortlisted"),
            rejected = summary.succeeded("rejected"),
            failed = summary.failed,
            "Cohort evaluated"
        );
        CohortOutcome::processed(cohort, summary, started.elapsed())
    }
}
