//! Per-run state threaded through orchestrators, the batch runner and workers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use cohort_core::config::EngineSettings;

use crate::error::MemberError;
use crate::failure_log::{FailureLog, FailureRecord};

/// Read-only configuration plus the failure sink for one run.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub kind: &'static str,
    pub started_at: DateTime<Utc>,
    pub settings: Arc<EngineSettings>,
    failure_log: Arc<FailureLog>,
}

impl RunContext {
    pub fn new(kind: &'static str, settings: Arc<EngineSettings>, failure_log: Arc<FailureLog>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            kind,
            started_at: Utc::now(),
            settings,
            failure_log,
        }
    }

    /// Append a member-level failure to the durable failure log.
    pub async fn record_failure(&self, record: FailureRecord) {
        self.failure_log.append(self.run_id, self.kind, record).await;
    }

    /// Run an external call under the configured per-call timeout.
    pub async fn external<T, E, F>(&self, stage: &'static str, call: F) -> Result<T, MemberError>
    where
        F: Future<Output = Result<T, E>>,
        MemberError: From<E>,
    {
        with_timeout(self.settings.external_call_timeout, stage, call).await
    }
}

/// Await `call`, mapping an elapsed deadline to [`MemberError::Timeout`].
pub async fn with_timeout<T, E, F>(limit: Duration, stage: &'static str, call: F) -> Result<T, MemberError>
where
    F: Future<Output = Result<T, E>>,
    MemberError: From<E>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(MemberError::from),
        Err(_) => Err(MemberError::Timeout {
            stage,
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}
