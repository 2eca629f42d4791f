//! URL shortener service.
//!
//! [`ShortenerService`] ties a storage backend to a task pool and exposes
//! the user-facing operations: shorten, resolve, list and batch delete.

pub mod error;
pub mod service;

pub use error::{BatchError, Result, ShortenerError};
pub use service::{ensure_owner, BatchItem, BatchResult, ShortenerService};
