//! Core types and traits for the tinylink URL shortener.
//!
//! This crate provides the entity model, the error taxonomy and the
//! [`Repository`] contract shared by every storage backend, the code
//! generators and the shortener service.

pub mod error;
pub mod identity;
pub mod model;
pub mod repository;
pub mod shortcode;

pub use error::{CoreError, StorageError};
pub use identity::{OwnerId, RequestContext};
pub use model::{
    HealthStatus, SaveOutcome, SaveStatus, StorageStats, UrlRecord, UserUrl,
};
pub use repository::Repository;
pub use shortcode::ShortCode;
