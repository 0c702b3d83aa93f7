use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid {what} in row {id}: {reason}")]
    Decode {
        what: &'static str,
        id: Uuid,
        reason: String,
    },

    #[error("not configured: {0}")]
    NotConfigured(String),
}
