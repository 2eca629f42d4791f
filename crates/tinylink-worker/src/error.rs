use std::time::Duration;
use thiserror::Error;

/// Result type for task pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("task pool is shut down")]
    Closed,
    #[error("task did not finish within {0:?}")]
    Timeout(Duration),
    #[error("task ended without reporting a result")]
    Aborted,
}
