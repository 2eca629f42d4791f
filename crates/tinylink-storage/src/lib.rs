//! Storage backends for tinylink.
//!
//! Three interchangeable implementations of [`Repository`]: an in-process
//! map, a JSON-lines file and a PostgreSQL table. All of them bound code
//! collision retries by [`StorageSettings::max_attempts`] and share the
//! tombstone semantics defined in `tinylink_core`.

mod allocator;
pub mod file;
pub mod memory;
pub mod postgres;

pub use allocator::MAX_ALLOCATION_ATTEMPTS;
pub use file::FileRepository;
pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;
pub use tinylink_core::repository::Repository;
pub use tinylink_core::StorageError;

use typed_builder::TypedBuilder;

/// Settings shared by every backend.
#[derive(Debug, Clone, TypedBuilder)]
pub struct StorageSettings {
    /// Prefix for rendered short URLs, e.g. `http://localhost:8080`.
    #[builder(setter(into))]
    pub base_url: String,
    /// Upper bound on code generation attempts per save.
    #[builder(default = MAX_ALLOCATION_ATTEMPTS)]
    pub max_attempts: usize,
}
