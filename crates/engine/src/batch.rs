//! Batched, bounded-concurrency member processing.
//!
//! Members are split into consecutive batches. At most `max_concurrency`
//! batches are in flight at once; within a batch the worker's `prepare` runs
//! once for the whole batch, then members are processed one at a time.
//! Results are folded in backlog order by the single consumer of the stream.
//!
//! The member deadline covers `process` only. `follow_up` runs after the
//! member's write has committed and is never cut short by it.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::{with_timeout, RunContext};
use crate::error::MemberError;
use crate::failure_log::{FailureRecord, FailureScope};

/// Identifies the member a failure belongs to.
#[derive(Debug, Clone, Copy)]
pub struct Subject {
    pub cohort_id: Uuid,
    pub membership_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

/// Per-member work driven by [`BatchRunner`].
#[async_trait]
pub trait BatchWorker: Send + Sync {
    type Item: Send + Sync;
    type Prefetch: Send + Sync;
    /// What `process` committed for one member.
    type Committed: Send;

    /// Load whatever the whole batch needs in one go.
    async fn prepare(&self, batch: &[Self::Item]) -> Result<Self::Prefetch, MemberError>;

    /// Process one member up to and including its committing write. An error
    /// here fails the member.
    async fn process(
        &self,
        item: &Self::Item,
        prefetch: &Self::Prefetch,
    ) -> Result<Self::Committed, MemberError>;

    /// Post-commit work. Cannot fail the member; the returned label names the
    /// outcome kind (e.g. `"shortlisted"`) for aggregation.
    async fn follow_up(&self, item: &Self::Item, committed: Self::Committed) -> &'static str;

    fn subject(&self, item: &Self::Item) -> Subject;
}

/// Counts aggregated across batches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub processed: u64,
    pub succeeded: BTreeMap<&'static str, u64>,
    pub failed: u64,
    pub batches: u64,
    pub slow_batches: u64,
}

impl BatchSummary {
    pub fn succeeded(&self, kind: &str) -> u64 {
        self.succeeded.get(kind).copied().unwrap_or(0)
    }

    fn merge(&mut self, other: BatchSummary) {
        self.processed += other.processed;
        for (kind, count) in other.succeeded {
            *self.succeeded.entry(kind).or_default() += count;
        }
        self.failed += other.failed;
        self.batches += other.batches;
        self.slow_batches += other.slow_batches;
    }
}

#[derive(Debug, Clone)]
pub struct BatchRunner {
    batch_size: usize,
    max_concurrency: usize,
    member_timeout: Duration,
    slow_batch_threshold: Duration,
}

impl BatchRunner {
    pub fn new(batch_size: usize, max_concurrency: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            max_concurrency: max_concurrency.max(1),
            member_timeout: Duration::from_secs(60),
            slow_batch_threshold: Duration::from_secs(30),
        }
    }

    pub fn from_context(ctx: &RunContext) -> Self {
        Self::new(ctx.settings.batch_size, ctx.settings.max_concurrent_batches)
            .member_timeout(ctx.settings.member_timeout)
            .slow_batch_threshold(ctx.settings.slow_batch_threshold)
    }

    pub fn member_timeout(mut self, timeout: Duration) -> Self {
        self.member_timeout = timeout;
        self
    }

    pub fn slow_batch_threshold(mut self, threshold: Duration) -> Self {
        self.slow_batch_threshold = threshold;
        self
    }

    /// Run every item through `worker`. Never fails: member errors are
    /// counted and written to the run's failure log.
    pub async fn run<W: BatchWorker>(
        &self,
        items: &[W::Item],
        worker: &W,
        ctx: &RunContext,
    ) -> BatchSummary {
        let total_batches = items.len().div_ceil(self.batch_size);
        let progress_every = (self.max_concurrency * 10) as u64;

        let mut results = stream::iter(items.chunks(self.batch_size).enumerate())
            .map(|(index, batch)| self.run_batch(index, batch, worker, ctx))
            .buffered(self.max_concurrency);

        let mut summary = BatchSummary::default();
        while let Some(batch_summary) = results.next().await {
            summary.merge(batch_summary);
            if summary.batches % progress_every == 0 {
                info!(
                    run_id = %ctx.run_id,
                    batches = summary.batches,
                    total_batches,
                    processed = summary.processed,
                    failed = summary.failed,
                    "Batch progress"
                );
            }
        }
        summary
    }

    async fn run_batch<W: BatchWorker>(
        &self,
        index: usize,
        batch: &[W::Item],
        worker: &W,
        ctx: &RunContext,
    ) -> BatchSummary {
        let started = Instant::now();
        let mut summary = BatchSummary {
            batches: 1,
            ..BatchSummary::default()
        };

        let prefetch = match worker.prepare(batch).await {
            Ok(p) => p,
            Err(e) => {
                let error = e.to_string();
                for item in batch {
                    summary.processed += 1;
                    summary.failed += 1;
                    record(ctx, worker.subject(item), "prefetch", &error).await;
                }
                return summary;
            }
        };

        for item in batch {
            summary.processed += 1;
            let committed = with_timeout(self.member_timeout, "member", async {
                worker.process(item, &prefetch).await
            })
            .await;
            match committed {
                Ok(committed) => {
                    let kind = worker.follow_up(item, committed).await;
                    *summary.succeeded.entry(kind).or_default() += 1;
                }
                Err(e) => {
                    summary.failed += 1;
                    record(ctx, worker.subject(item), e.stage(), &e.to_string()).await;
                }
            }
        }

        let elapsed = started.elapsed();
        if elapsed > self.slow_batch_threshold {
            summary.slow_batches = 1;
            warn!(
                run_id = %ctx.run_id,
                batch = index,
                size = batch.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow batch"
            );
        }
        summary
    }
}

async fn record(ctx: &RunContext, subject: Subject, stage: &str, error: &str) {
    ctx.record_failure(FailureRecord {
        cohort_id: subject.cohort_id,
        membership_id: subject.membership_id,
        user_id: subject.user_id,
        scope: FailureScope::Member,
        stage: stage.to_string(),
        error: error.to_string(),
    })
    .await;
}

// ── Tests ───────────────────────────────────────────────────────────
