//! Cohort member shortlisting engine.
//!
//! For every cohort whose shortlist date has arrived, evaluates `submitted`
//! members against the cohort's rule set and moves each to `shortlisted` or
//! `rejected`, then fans the change out to the LMS, the search index and the
//! notification service. A companion sweep sends deferred rejection emails.
//!
//! Work is batched and run with bounded concurrency; a failing member is
//! counted and logged without stopping its batch or the run.

pub mod batch;
pub mod context;
pub mod error;
pub mod failure_log;
pub mod orchestrator;
pub mod report;
pub mod resolver;
pub mod scanner;
pub mod schedule;
pub mod updater;

pub use batch::{BatchRunner, BatchSummary, BatchWorker};
pub use context::RunContext;
pub use error::{EngineError, MemberError};
pub use failure_log::{FailureLog, FailureRecord, FailureScope};
pub use orchestrator::{Engine, Services};
pub use report::{CohortOutcome, CohortState, RejectionEmailReport, ShortlistReport};
pub use resolver::FieldValueResolver;
pub use scanner::CohortScanner;
pub use updater::{MemberStatusUpdater, UpdateMode, UpdateOutcome};
