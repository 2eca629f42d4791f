//! Fixed-size asynchronous task pool.
//!
//! A [`TaskPool`] runs submitted actions on a fixed number of tokio tasks.
//! Submission is a handoff: [`TaskPool::submit`] returns once a worker has
//! taken the action, so callers are back-pressured when every worker is busy.

pub mod error;
mod pool;
mod task;

pub use error::{PoolError, Result};
pub use pool::TaskPool;
pub use task::{TaskContext, TaskHandle};

use typed_builder::TypedBuilder;

/// Default number of workers.
pub const DEFAULT_WORKERS: usize = 10;

#[derive(Debug, Clone, TypedBuilder)]
pub struct PoolSettings {
    /// Number of actions that may run at the same time.
    #[builder(default = DEFAULT_WORKERS)]
    pub workers: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}
