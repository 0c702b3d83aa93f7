//! Run reports returned by the orchestrators.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use cohort_core::Cohort;

use crate::batch::BatchSummary;

/// How a cohort fared in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CohortState {
    Processed,
    /// Nothing in the backlog.
    Empty,
    /// Rule set missing or invalid, or the backlog could not be loaded.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortOutcome {
    pub cohort_id: Uuid,
    pub name: String,
    pub state: CohortState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub processed: u64,
    pub succeeded: BTreeMap<String, u64>,
    pub failed: u64,
    pub batches: u64,
    pub slow_batches: u64,
    pub elapsed_ms: u64,
}

impl CohortOutcome {
    pub fn skipped(cohort: &Cohort, reason: impl Into<String>) -> Self {
        Self::without_work(cohort, CohortState::Skipped, Some(reason.into()))
    }

    pub fn empty(cohort: &Cohort) -> Self {
        Self::without_work(cohort, CohortState::Empty, None)
    }

    fn without_work(cohort: &Cohort, state: CohortState, reason: Option<String>) -> Self {
        Self {
            cohort_id: cohort.cohort_id,
            name: cohort.name.clone(),
            state,
            reason,
            processed: 0,
            succeeded: BTreeMap::new(),
            failed: 0,
            batches: 0,
            slow_batches: 0,
            elapsed_ms: 0,
        }
    }

    pub fn processed(cohort: &Cohort, summary: BatchSummary, elapsed: Duration) -> Self {
        Self {
            cohort_id: cohort.cohort_id,
            name: cohort.name.clone(),
            state: CohortState::Processed,
            reason: None,
            processed: summary.processed,
            succeeded: summary
                .succeeded
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            failed: summary.failed,
            batches: summary.batches,
            slow_batches: summary.slow_batches,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn count(&self, kind: &str) -> u64 {
        self.succeeded.get(kind).copied().unwrap_or(0)
    }
}

/// Throughput over the whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Performance {
    pub elapsed_ms: u64,
    pub batches: u64,
    pub slow_batches: u64,
    pub records_per_second: f64,
    /// Naive 24h projection: `records_per_second * 86400`.
    pub projected_daily_capacity: u64,
}

impl Performance {
    pub fn from_outcomes(outcomes: &[CohortOutcome], elapsed: Duration) -> Self {
        let processed: u64 = outcomes.iter().map(|o| o.processed).sum();
        let secs = elapsed.as_secs_f64();
        let records_per_second = if secs > 0.0 {
            processed as f64 / secs
        } else {
            0.0
        };
        Self {
            elapsed_ms: elapsed.as_millis() as u64,
            batches: outcomes.iter().map(|o| o.batches).sum(),
            slow_batches: outcomes.iter().map(|o| o.slow_batches).sum(),
            records_per_second,
            projected_daily_capacity: (records_per_second * 86_400.0) as u64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ShortlistTotals {
    pub cohorts_scanned: u64,
    pub cohorts_processed: u64,
    pub cohorts_skipped: u64,
    pub processed: u64,
    pub shortlisted: u64,
    pub rejected: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShortlistReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Set when the eligible-cohort query itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_error: Option<String>,
    pub cohorts: Vec<CohortOutcome>,
    pub totals: ShortlistTotals,
    pub performance: Performance,
}

impl ShortlistReport {
    pub fn build(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        scan_error: Option<String>,
        cohorts: Vec<CohortOutcome>,
        elapsed: Duration,
    ) -> Self {
        let mut totals = ShortlistTotals {
            cohorts_scanned: cohorts.len() as u64,
            ..ShortlistTotals::default()
        };
        for c in &cohorts {
            match c.state {
                CohortState::Processed => totals.cohorts_processed += 1,
                CohortState::Skipped => totals.cohorts_skipped += 1,
                CohortState::Empty => {}
            }
            totals.processed += c.processed;
            totals.shortlisted += c.count("shortlisted");
            totals.rejected += c.count("rejected");
            totals.failed += c.failed;
        }
        let performance = Performance::from_outcomes(&cohorts, elapsed);
        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            scan_error,
            cohorts,
            totals,
            performance,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RejectionTotals {
    pub cohorts_scanned: u64,
    pub cohorts_processed: u64,
    pub cohorts_skipped: u64,
    pub processed: u64,
    pub sent: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectionEmailReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_error: Option<String>,
    pub cohorts: Vec<CohortOutcome>,
    pub totals: RejectionTotals,
    pub performance: Performance,
}

impl RejectionEmailReport {
    pub fn build(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        scan_error: Option<String>,
        cohorts: Vec<CohortOutcome>,
        elapsed: Duration,
    ) -> Self {
        let mut totals = RejectionTotals {
            cohorts_scanned: cohorts.len() as u64,
            ..RejectionTotals::default()
        };
        for c in &cohorts {
            match c.state {
                CohortState::Processed => totals.cohorts_processed += 1,
                CohortState::Skipped => totals.cohorts_skipped += 1,
                CohortState::Empty => {}
            }
            totals.processed += c.processed;
            totals.sent += c.count("sent");
            totals.failed += c.failed;
        }
        let performance = Performance::from_outcomes(&cohorts, elapsed);
        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            skipped_reason: None,
            scan_error,
            cohorts,
            totals,
            performance,
        }
    }

    /// Report for a sweep that did not run at all.
    pub fn skipped(run_id: Uuid, started_at: DateTime<Utc>, reason: &str) -> Self {
        let mut report = Self::build(run_id, started_at, None, Vec::new(), Duration::ZERO);
        report.skipped_reason = Some(reason.to_string());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_core::CohortStatus;

    fn cohort(name: &str) -> Cohort {
        Cohort {
            cohort_id: Uuid::new_v4(),
            name: name.into(),
            status: CohortStatus::Active,
        }
    }

    #[test]
    fn totals_sum_over_cohorts() {
        let mut summary = BatchSummary {
            processed: 10,
            failed: 1,
            batches: 2,
            slow_batches: 1,
            ..BatchSummary::default()
        };
        summary.succeeded.insert("shortlisted", 6);
        summary.succeeded.insert("rejected", 3);

        let outcomes = vec![
            CohortOutcome::processed(&cohort("a"), summary, Duration::from_millis(500)),
            CohortOutcome::skipped(&cohort("b"), "no active form"),
            CohortOutcome::empty(&cohort("c")),
        ];
        let report = ShortlistReport::build(Uuid::new_v4(), Utc::now(), None, outcomes, Duration::from_secs(2));

        assert_eq!(report.totals.cohorts_scanned, 3);
        assert_eq!(report.totals.cohorts_processed, 1);
        assert_eq!(report.totals.cohorts_skipped, 1);
        assert_eq!(report.totals.processed, 10);
        assert_eq!(report.totals.shortlisted, 6);
        assert_eq!(report.totals.rejected, 3);
        assert_eq!(report.totals.failed, 1);
        assert_eq!(report.performance.batches, 2);
        assert_eq!(report.performance.records_per_second, 5.0);
        assert_eq!(report.performance.projected_daily_capacity, 432_000);
    }

    #[test]
    fn zero_elapsed_has_zero_throughput() {
        let perf = Performance::from_outcomes(&[], Duration::ZERO);
        assert_eq!(perf.records_per_second, 0.0);
        assert_eq!(perf.projected_daily_capacity, 0);
    }

    #[test]
    fn skipped_sweep_serializes_reason() {
        let report = RejectionEmailReport::skipped(Uuid::new_v4(), Utc::now(), "email notifications disabled");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["skipped_reason"], "email notifications disabled");
        assert_eq!(json["totals"]["sent"], 0);
        assert!(json.get("scan_error").is_none());
    }
}
