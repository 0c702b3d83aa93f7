use thiserror::Error;

/// Fatal configuration problems. Raised before any cohort is touched.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("required setting {0} is not set")]
    Missing(&'static str),

    #[error("setting {key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Errors converting stored values into domain types.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown member status: {0}")]
    UnknownMemberStatus(String),

    #[error("unknown cohort status: {0}")]
    UnknownCohortStatus(String),
}
