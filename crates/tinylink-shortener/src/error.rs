use crate::service::BatchResult;
use thiserror::Error;
use tinylink_core::{CoreError, StorageError};
use tinylink_worker::PoolError;

/// Result type for shortener operations.
pub type Result<T> = std::result::Result<T, ShortenerError>;

#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("empty batch is not allowed")]
    EmptyBatch,
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl ShortenerError {
    /// HTTP-style status hint for callers translating this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ShortenerError::InvalidUrl(_)
            | ShortenerError::EmptyBatch
            | ShortenerError::Batch(_) => 400,
            ShortenerError::Core(err) => err.status_code(),
            ShortenerError::Storage(err) => err.status_code(),
            ShortenerError::Pool(PoolError::Timeout(_)) => 504,
            ShortenerError::Pool(_) => 503,
        }
    }
}

/// A batch stopped at its first failing item.
///
/// `completed` holds the results saved before the failure, in input order.
#[derive(Debug, Clone, Error)]
#[error("batch stopped after {} item(s): {source}", .completed.len())]
pub struct BatchError {
    pub completed: Vec<BatchResult>,
    pub source: Box<ShortenerError>,
}
