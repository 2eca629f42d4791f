use crate::error::{BatchError, Result, ShortenerError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tinylink_core::{
    HealthStatus, OwnerId, Repository, RequestContext, SaveOutcome, ShortCode, StorageStats,
    UserUrl,
};
use tinylink_worker::{PoolError, TaskHandle, TaskPool};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// One entry of a batch shorten request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub correlation_id: String,
    pub original_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub correlation_id: String,
    pub short_url: String,
}

/// User-facing shortener operations over one storage backend.
///
/// Writes that the caller does not need to wait for (batch deletes) are
/// queued on the task pool; everything else runs on the caller's task.
#[derive(Debug)]
pub struct ShortenerService<R> {
    repository: Arc<R>,
    pool: TaskPool,
    base_url: String,
}

impl<R: Repository> ShortenerService<R> {
    pub fn new(repository: R, pool: TaskPool, base_url: impl Into<String>) -> Self {
        Self {
            repository: Arc::new(repository),
            pool,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Validates that the URL has an http(s) scheme and a host.
    fn validate_url(url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(ShortenerError::InvalidUrl(
                "URL cannot be empty".to_string(),
            ));
        }

        let Some((scheme, rest)) = url.split_once("://") else {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a valid scheme and host: {url}"
            )));
        };

        let scheme = scheme.to_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL scheme must be http or https: {scheme}"
            )));
        }

        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if host.is_empty() || host.chars().any(char::is_whitespace) {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a valid scheme and host: {url}"
            )));
        }

        Ok(())
    }

    /// Shortens `original_url` for the caller.
    ///
    /// An existing live mapping for the same URL comes back as
    /// `SaveStatus::Conflict` with the previously issued short URL.
    pub async fn shorten(&self, ctx: &RequestContext, original_url: &str) -> Result<SaveOutcome> {
        let owner = ctx.owner_id()?;
        Self::validate_url(original_url)?;

        let outcome = self.repository.save_unique(original_url, owner).await?;
        debug!(owner = %owner, short_url = %outcome.short_url, status = ?outcome.status, "shortened url");
        Ok(outcome)
    }

    /// Same as [`shorten`](Self::shorten) but runs the save on the task pool,
    /// so at most `pool.size()` saves hit storage at once.
    pub async fn shorten_via_pool(
        &self,
        ctx: &RequestContext,
        original_url: &str,
    ) -> Result<SaveOutcome> {
        let owner = *ctx.owner_id()?;
        Self::validate_url(original_url)?;

        let repository = Arc::clone(&self.repository);
        let url = original_url.to_owned();
        let (tx, rx) = oneshot::channel();

        self.pool
            .submit(move |_| async move {
                let result = repository.save_unique(&url, &owner).await;
                let report = match &result {
                    Ok(_) => Ok(()),
                    Err(err) => Err(anyhow::Error::from(err.clone())),
                };
                let _ = tx.send(result);
                report
            })
            .await?;

        let outcome = rx.await.map_err(|_| PoolError::Aborted)??;
        Ok(outcome)
    }

    /// Saves every item in order, stopping at the first failure.
    ///
    /// On failure the returned [`BatchError`] carries the results saved so far.
    pub async fn shorten_batch(
        &self,
        ctx: &RequestContext,
        items: Vec<BatchItem>,
    ) -> Result<Vec<BatchResult>> {
        let owner = ctx.owner_id()?;
        if items.is_empty() {
            return Err(ShortenerError::EmptyBatch);
        }

        let mut completed = Vec::with_capacity(items.len());
        for item in items {
            let saved = match Self::validate_url(&item.original_url) {
                Ok(()) => self
                    .repository
                    .save(&item.original_url, owner)
                    .await
                    .map_err(ShortenerError::from),
                Err(err) => Err(err),
            };

            match saved {
                Ok(short_url) => completed.push(BatchResult {
                    correlation_id: item.correlation_id,
                    short_url,
                }),
                Err(err) => {
                    warn!(
                        owner = %owner,
                        correlation_id = %item.correlation_id,
                        completed = completed.len(),
                        error = %err,
                        "batch shorten stopped"
                    );
                    return Err(BatchError {
                        completed,
                        source: Box::new(err),
                    }
                    .into());
                }
            }
        }

        info!(owner = %owner, count = completed.len(), "batch shortened");
        Ok(completed)
    }

    /// Resolves a bare code or full short URL to its original URL.
    pub async fn resolve(&self, code: &str) -> Result<String> {
        let code = ShortCode::from_url_or_code(code)?;
        let original_url = self.repository.resolve(&code).await?;
        debug!(code = %code, "resolved short code");
        Ok(original_url)
    }

    /// Live URLs owned by the caller, rendered against the service base URL.
    pub async fn user_urls(&self, ctx: &RequestContext) -> Result<Vec<UserUrl>> {
        let owner = ctx.owner_id()?;
        Ok(self.repository.list_for_owner(owner, &self.base_url).await?)
    }

    /// Parses delete targets, dropping entries that cannot be a short code.
    ///
    /// A malformed code can never match a record, so it is skipped like any
    /// other absent code.
    fn parse_codes<S: AsRef<str>>(codes: &[S]) -> Vec<ShortCode> {
        codes
            .iter()
            .filter_map(|code| match ShortCode::from_url_or_code(code.as_ref()) {
                Ok(code) => Some(code),
                Err(err) => {
                    debug!(code = code.as_ref(), error = %err, "skipping malformed short code");
                    None
                }
            })
            .collect()
    }

    /// Queues a batch delete and returns once a worker has accepted it.
    ///
    /// Codes that are malformed, absent or not owned by the caller are
    /// skipped, so an empty list queues a no-op. Storage failures are only
    /// logged; use [`delete_urls_and_wait`](Self::delete_urls_and_wait) to
    /// observe them.
    pub async fn delete_urls<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        codes: &[S],
    ) -> Result<TaskHandle> {
        let owner = *ctx.owner_id()?;
        let codes = Self::parse_codes(codes);
        let repository = Arc::clone(&self.repository);

        let handle = self
            .pool
            .submit(move |task| async move {
                if task.is_cancelled() {
                    debug!(owner = %owner, "batch delete cancelled before start");
                    return Ok(());
                }
                repository
                    .mark_deleted(&owner, &codes)
                    .await
                    .map_err(anyhow::Error::from)
            })
            .await?;

        debug!(owner = %owner, task = handle.id(), "batch delete queued");
        Ok(handle)
    }

    /// Runs a batch delete on the pool and waits for its result.
    ///
    /// Skips codes the same way [`delete_urls`](Self::delete_urls) does.
    pub async fn delete_urls_and_wait<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        codes: &[S],
    ) -> Result<()> {
        let owner = *ctx.owner_id()?;
        let codes = Self::parse_codes(codes);
        if codes.is_empty() {
            debug!(owner = %owner, "nothing to delete");
            return Ok(());
        }
        let repository = Arc::clone(&self.repository);
        let (tx, rx) = oneshot::channel();

        self.pool
            .submit(move |_| async move {
                let result = repository.mark_deleted(&owner, &codes).await;
                let report = result.clone().map_err(anyhow::Error::from);
                let _ = tx.send(result);
                report
            })
            .await?;

        rx.await.map_err(|_| PoolError::Aborted)??;
        Ok(())
    }

    pub async fn ping(&self) -> Result<HealthStatus> {
        Ok(self.repository.ping().await?)
    }

    pub async fn stats(&self) -> Result<StorageStats> {
        Ok(self.repository.stats().await?)
    }

    /// Drains the task pool, then closes the repository.
    pub async fn shutdown(&self) -> Result<()> {
        self.pool.shutdown().await;
        self.repository.close().await?;
        info!("shortener service stopped");
        Ok(())
    }
}

/// Owner id for callers that create links without an identity yet.
pub fn ensure_owner(ctx: RequestContext) -> (RequestContext, OwnerId) {
    if let Ok(owner) = ctx.owner_id().copied() {
        return (ctx, owner);
    }

    let owner = OwnerId::new_v4();
    (RequestContext::for_owner(owner), owner)
}
