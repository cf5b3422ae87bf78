//! Error handling

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the record source and the session store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage cannot be reached at all. Aborts the whole run.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A single statement or transaction failed. Aborts the current flush only.
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Whether the run must stop instead of moving on to the next session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_) => StoreError::Unavailable(err.to_string()),
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Run-level failures. Anything returned here ends the current run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Record source failed: {0}")]
    Source(#[source] StoreError),

    #[error("Session store failed: {0}")]
    Store(#[source] StoreError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
