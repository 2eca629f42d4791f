use crate::error::Result;
use crate::identity::OwnerId;
use crate::model::{HealthStatus, SaveOutcome, StorageStats, UrlRecord, UserUrl};
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use std::sync::Arc;

/// Storage contract shared by the in-memory, file and relational backends.
///
/// Every implementation must be safe to call concurrently and must never
/// hand the same short code to two records, including tombstoned ones.
/// Dropping a returned future abandons the wait, not necessarily the write.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    /// Stores `original_url` under a freshly allocated short code.
    ///
    /// Backends that enforce one live mapping per original URL return the
    /// existing short URL with [`SaveStatus::Conflict`](crate::SaveStatus::Conflict)
    /// instead of creating a duplicate.
    async fn save_unique(&self, original_url: &str, owner: &OwnerId) -> Result<SaveOutcome>;

    /// Like [`save_unique`](Repository::save_unique) but without the conflict
    /// hint; used for batch imports where duplicates are tolerated.
    async fn save(&self, original_url: &str, owner: &OwnerId) -> Result<String>;

    /// Resolves a code to its original URL.
    ///
    /// Fails with `NotFound` for unknown codes and `Gone` for tombstones.
    async fn resolve(&self, code: &ShortCode) -> Result<String>;

    /// Returns the full record for a code, tombstones included.
    async fn find(&self, code: &ShortCode) -> Result<Option<UrlRecord>>;

    /// Lists the owner's live records, rendering codes as `base_url/code`.
    async fn list_for_owner(&self, owner: &OwnerId, base_url: &str) -> Result<Vec<UserUrl>>;

    /// Tombstones every record owned by `owner` whose code is in `codes`.
    ///
    /// Codes that are unknown or owned by someone else are ignored.
    async fn mark_deleted(&self, owner: &OwnerId, codes: &[ShortCode]) -> Result<()>;

    /// Connectivity check. Backends without a connection fail with `WrongMode`.
    async fn ping(&self) -> Result<HealthStatus>;

    /// Counts live records and their distinct owners.
    async fn stats(&self) -> Result<StorageStats>;

    /// Releases backend resources. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl<R: Repository> Repository for Arc<R> {
    async fn save_unique(&self, original_url: &str, owner: &OwnerId) -> Result<SaveOutcome> {
        (**self).save_unique(original_url, owner).await
    }

    async fn save(&self, original_url: &str, owner: &OwnerId) -> Result<String> {
        (**self).save(original_url, owner).await
    }

    async fn resolve(&self, code: &ShortCode) -> Result<String> {
        (**self).resolve(code).await
    }

    async fn find(&self, code: &ShortCode) -> Result<Option<UrlRecord>> {
        (**self).find(code).await
    }

    async fn list_for_owner(&self, owner: &OwnerId, base_url: &str) -> Result<Vec<UserUrl>> {
        (**self).list_for_owner(owner, base_url).await
    }

    async fn mark_deleted(&self, owner: &OwnerId, codes: &[ShortCode]) -> Result<()> {
        (**self).mark_deleted(owner, codes).await
    }

    async fn ping(&self) -> Result<HealthStatus> {
        (**self).ping().await
    }

    async fn stats(&self) -> Result<StorageStats> {
        (**self).stats().await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }
}
