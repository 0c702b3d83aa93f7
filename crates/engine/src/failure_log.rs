//! Durable JSONL log of member and side-effect failures for manual review.
//!
//! One JSON object per line. Write errors are logged and swallowed so the
//! log can never fail a run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, warn};
use uuid::Uuid;

/// Whether a failure counted against the member or only against one of the
/// side effects of an already-committed status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureScope {
    Member,
    SideEffect,
}

/// What failed, as recorded by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub cohort_id: Uuid,
    pub membership_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub scope: FailureScope,
    pub stage: String,
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailureLogEntry {
    pub run_id: Uuid,
    pub kind: String,
    #[serde(flatten)]
    pub record: FailureRecord,
    pub timestamp: DateTime<Utc>,
}

/// Append-only failure log. With no path configured, failures only reach
/// the tracing output.
pub struct FailureLog {
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl FailureLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn append(&self, run_id: Uuid, kind: &str, record: FailureRecord) {
        match record.scope {
            FailureScope::Member => error!(
                %run_id,
                kind,
                cohort_id = %record.cohort_id,
                membership_id = ?record.membership_id,
                user_id = ?record.user_id,
                stage = %record.stage,
                error = %record.error,
                "Member processing failed"
            ),
            FailureScope::SideEffect => warn!(
                %run_id,
                kind,
                cohort_id = %record.cohort_id,
                membership_id = ?record.membership_id,
                user_id = ?record.user_id,
                stage = %record.stage,
                error = %record.error,
                "Side effect failed; status change stands"
            ),
        }

        let Some(path) = &self.path else {
            return;
        };

        let entry = FailureLogEntry {
            run_id,
            kind: kind.to_string(),
            record,
            timestamp: Utc::now(),
        };
        let mut line = match serde_json::to_string(&entry) {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "failed to serialize failure log entry");
                return;
            }
        };
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                warn!(error = %e, "failed to create failure log directory");
                return;
            }
        }
        let mut file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to open failure log");
                return;
            }
        };
        if let Err(e) = file.write_all(line.as_bytes()).await {
            warn!(error = %e, "failed to write failure log entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(scope: FailureScope, stage: &str) -> FailureRecord {
        FailureRecord {
            cohort_id: Uuid::new_v4(),
            membership_id: Some(Uuid::new_v4()),
            user_id: Some(Uuid::new_v4()),
            scope,
            stage: stage.to_string(),
            error: "boom".to_string(),
        }
    }

    #[tokio::test]
    async fn appends_one_line_per_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("failures.jsonl");
        let log = FailureLog::new(Some(path.clone()));
        let run_id = Uuid::new_v4();

        log.append(run_id, "shortlist", record(FailureScope::Member, "persist")).await;
        log.append(run_id, "shortlist", record(FailureScope::SideEffect, "notify")).await;

        let content = std::fs::read_to_string(&path).unwrap();
        let entries: Vec<FailureLogEntry> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].run_id, run_id);
        assert_eq!(entries[0].kind, "shortlist");
        assert_eq!(entries[0].record.scope, FailureScope::Member);
        assert_eq!(entries[1].record.stage, "notify");
        assert_eq!(entries[1].record.scope, FailureScope::SideEffect);
        assert!(content.contains(r#""scope":"side_effect""#));
    }

    #[tokio::test]
    async fn disabled_log_writes_nothing() {
        let log = FailureLog::disabled();
        log.append(Uuid::new_v4(), "shortlist", record(FailureScope::Member, "persist"))
            .await;
        assert!(log.path().is_none());
    }
}
