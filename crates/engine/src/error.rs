use uuid::Uuid;

use cohort_connector::ConnectorError;
use cohort_core::ConfigError;
use cohort_notify::NotifyError;
use cohort_storage::StorageError;

/// Errors returned to callers of the engine.
///
/// Orchestrator runs only ever fail with [`EngineError::Config`]; everything
/// else is absorbed into the run report.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("service client error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("notification client error: {0}")]
    Notify(#[from] NotifyError),

    #[error("cohort membership not found: {0}")]
    MemberNotFound(Uuid),

    #[error(transparent)]
    Member(#[from] MemberError),
}

/// Why processing a single member failed. Counted and logged per member.
#[derive(Debug, thiserror::Error)]
pub enum MemberError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("status write affected no rows (member changed or vanished mid-run)")]
    NotUpdated,

    #[error("cohort {0} not found")]
    CohortMissing(Uuid),

    #[error("user {0} has no email address")]
    MissingEmail(Uuid),

    #[error("notification failed: {0}")]
    Notify(#[from] NotifyError),

    #[error("notification reported delivery errors: {0}")]
    Delivery(String),

    #[error("external call failed: {0}")]
    Connector(#[from] ConnectorError),

    #[error("{stage} timed out after {timeout_ms}ms")]
    Timeout { stage: &'static str, timeout_ms: u64 },
}

impl MemberError {
    /// Pipeline stage the failure belongs to, for the failure log.
    pub fn stage(&self) -> &'static str {
        match self {
            MemberError::Storage(_) | MemberError::NotUpdated | MemberError::CohortMissing(_) => {
                "persist"
            }
            MemberError::MissingEmail(_) | MemberError::Notify(_) | MemberError::Delivery(_) => {
                "notify"
            }
            MemberError::Connector(_) => "external",
            MemberError::Timeout { stage, .. } => stage,
        }
    }
}
