use crate::error::StorageError;
use crate::identity::OwnerId;
use crate::shortcode::ShortCode;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// A stored URL mapping.
///
/// `short_code` and `original_url` never change once stored; `deleted` only
/// ever flips from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub short_code: ShortCode,
    /// The redirect target.
    pub original_url: String,
    pub owner_id: OwnerId,
    /// Tombstone flag. Deleted records stay addressable so reads can report `Gone`.
    pub deleted: bool,
    /// Creation time, when the backend records one.
    pub created_at: Option<Timestamp>,
}

impl UrlRecord {
    pub fn is_live(&self) -> bool {
        !self.deleted
    }
}

/// One entry of an owner's URL listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUrl {
    pub short_url: String,
    pub original_url: String,
}

/// Whether `save_unique` created a mapping or found a live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Created,
    Conflict,
}

impl SaveStatus {
    pub fn status_code(&self) -> u16 {
        match self {
            SaveStatus::Created => 201,
            SaveStatus::Conflict => 409,
        }
    }
}

/// Result of a successful `save_unique`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Full short URL (`base_url/code`) of the new or the existing mapping.
    pub short_url: String,
    pub status: SaveStatus,
}

impl SaveOutcome {
    pub fn created(short_url: String) -> Self {
        Self {
            short_url,
            status: SaveStatus::Created,
        }
    }

    pub fn conflict(short_url: String) -> Self {
        Self {
            short_url,
            status: SaveStatus::Conflict,
        }
    }

    /// Converts a conflict into [`StorageError::AlreadyExists`] carrying the
    /// existing short URL.
    pub fn into_result(self) -> Result<String, StorageError> {
        match self.status {
            SaveStatus::Created => Ok(self.short_url),
            SaveStatus::Conflict => Err(StorageError::AlreadyExists(self.short_url)),
        }
    }
}

/// Outcome of a successful health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
}

impl HealthStatus {
    pub fn status_code(&self) -> u16 {
        200
    }
}

/// Aggregate counters over live records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    /// Number of live (non-deleted) short URLs.
    pub urls: u64,
    /// Number of distinct owners with at least one live short URL.
    pub users: u64,
}
