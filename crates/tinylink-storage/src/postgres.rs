use crate::StorageSettings;
use async_trait::async_trait;
use jiff::Timestamp;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tinylink_core::error::Result;
use tinylink_core::{
    HealthStatus, OwnerId, Repository, SaveOutcome, ShortCode, StorageError, StorageStats,
    UrlRecord, UserUrl,
};
use tinylink_generator::{Generator, RandomGenerator};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Schema for the `shortened_urls` table, safe to apply repeatedly.
pub const SCHEMA: &str = include_str!("../ddl/postgres/shortened_urls.sql");

/// PostgreSQL implementation of the Repository trait.
///
/// Soft delete flips `is_deleted`; rows are never removed, so a tombstoned
/// `short_url` keeps its unique slot and is never handed out again. A partial
/// unique index on `original_url` (live rows only) lets `save_unique` detect an
/// existing mapping atomically through `ON CONFLICT`.
#[derive(Debug, Clone)]
pub struct PostgresRepository<G = RandomGenerator> {
    pool: PgPool,
    generator: G,
    settings: StorageSettings,
}

impl PostgresRepository<RandomGenerator> {
    /// Creates a repository from an existing connection pool.
    pub fn new(pool: PgPool, settings: StorageSettings) -> Self {
        Self::with_generator(pool, settings, RandomGenerator::new())
    }

    /// Creates a repository by opening a new connection pool.
    pub async fn connect(dsn: &str, settings: StorageSettings) -> Result<Self> {
        let pool = PgPool::connect(dsn).await.map_err(map_sqlx_error)?;
        Ok(Self::new(pool, settings))
    }
}

enum Insert {
    Created(ShortCode),
    Existing(ShortCode),
}

impl<G: Generator> PostgresRepository<G> {
    pub fn with_generator(pool: PgPool, settings: StorageSettings, generator: G) -> Self {
        Self {
            pool,
            generator,
            settings,
        }
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the table and indexes if they do not exist yet.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn insert(&self, original_url: &str, owner: &OwnerId) -> Result<Insert> {
        let attempts = self.settings.max_attempts.max(1);

        for attempt in 1..=attempts {
            let candidate = self.generator.generate();

            let inserted = sqlx::query(
                r#"
                INSERT INTO shortened_urls (user_id, short_url, original_url)
                VALUES ($1, $2, $3)
                ON CONFLICT (original_url) WHERE NOT is_deleted DO NOTHING
                RETURNING short_url
                "#,
            )
            .bind(*owner.as_uuid())
            .bind(candidate.as_str())
            .bind(original_url)
            .fetch_optional(&self.pool)
            .await;

            match inserted {
                Ok(Some(_)) => {
                    debug!(code = %candidate, owner = %owner, "inserted short url");
                    return Ok(Insert::Created(candidate));
                }
                Ok(None) => {
                    if let Some(existing) = self.live_code_for(original_url).await? {
                        debug!(code = %existing, "original url already has a live short url");
                        return Ok(Insert::Existing(existing));
                    }
                    // The live row was tombstoned between the insert and the lookup.
                    trace!(attempt, "conflicting mapping vanished, retrying insert");
                }
                Err(err) if is_unique_violation(&err) => {
                    trace!(code = %candidate, attempt, "short code collision, regenerating");
                }
                Err(err) => return Err(map_sqlx_error(err)),
            }
        }

        warn!(attempts, "gave up allocating a short code");
        Err(StorageError::ExhaustedKeyspace { attempts })
    }

    async fn live_code_for(&self, original_url: &str) -> Result<Option<ShortCode>> {
        let code: Option<String> = sqlx::query_scalar(
            r#"
            SELECT short_url
            FROM shortened_urls
            WHERE original_url = $1
              AND NOT is_deleted
            LIMIT 1
            "#,
        )
        .bind(original_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(code.map(ShortCode::new_unchecked))
    }
}

fn parse_created_at(seconds: Option<i64>) -> Result<Option<Timestamp>> {
    seconds
        .map(|value| {
            Timestamp::from_second(value).map_err(|e| {
                StorageError::InvalidData(format!("invalid created_at timestamp '{value}': {e}"))
            })
        })
        .transpose()
}

fn record_from_row(row: &PgRow) -> Result<UrlRecord> {
    let short_url: String = row.try_get("short_url").map_err(map_sqlx_error)?;
    let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
    let user_id: Uuid = row.try_get("user_id").map_err(map_sqlx_error)?;
    let deleted: bool = row.try_get("is_deleted").map_err(map_sqlx_error)?;
    let created_at: Option<i64> = row.try_get("created_at").map_err(map_sqlx_error)?;

    Ok(UrlRecord {
        short_code: ShortCode::new_unchecked(short_url),
        original_url,
        owner_id: OwnerId::from(user_id),
        deleted,
        created_at: parse_created_at(created_at)?,
    })
}

fn count(value: i64) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| StorageError::InvalidData(format!("negative row count '{value}'")))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

#[async_trait]
impl<G: Generator> Repository for PostgresRepository<G> {
    async fn save_unique(&self, original_url: &str, owner: &OwnerId) -> Result<SaveOutcome> {
        let outcome = match self.insert(original_url, owner).await? {
            Insert::Created(code) => SaveOutcome::created(code.to_url(&self.settings.base_url)),
            Insert::Existing(code) => SaveOutcome::conflict(code.to_url(&self.settings.base_url)),
        };
        Ok(outcome)
    }

    async fn save(&self, original_url: &str, owner: &OwnerId) -> Result<String> {
        let (Insert::Created(code) | Insert::Existing(code)) =
            self.insert(original_url, owner).await?;
        Ok(code.to_url(&self.settings.base_url))
    }

    async fn resolve(&self, code: &ShortCode) -> Result<String> {
        let row = sqlx::query(
            r#"
            SELECT original_url, is_deleted
            FROM shortened_urls
            WHERE short_url = $1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            trace!(code = %code, "short code not found");
            return Err(StorageError::NotFound(code.to_string()));
        };

        let deleted: bool = row.try_get("is_deleted").map_err(map_sqlx_error)?;
        if deleted {
            trace!(code = %code, "short code is tombstoned");
            return Err(StorageError::Gone(code.to_string()));
        }

        row.try_get("original_url").map_err(map_sqlx_error)
    }

    async fn find(&self, code: &ShortCode) -> Result<Option<UrlRecord>> {
        let row = sqlx::query(
            r#"
            SELECT short_url, original_url, user_id, is_deleted,
                   EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at
            FROM shortened_urls
            WHERE short_url = $1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn list_for_owner(&self, owner: &OwnerId, base_url: &str) -> Result<Vec<UserUrl>> {
        let rows = sqlx::query(
            r#"
            SELECT short_url, original_url
            FROM shortened_urls
            WHERE user_id = $1
              AND NOT is_deleted
            ORDER BY id
            "#,
        )
        .bind(*owner.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| {
                let short_url: String = row.try_get("short_url").map_err(map_sqlx_error)?;
                let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
                Ok(UserUrl {
                    short_url: ShortCode::new_unchecked(short_url).to_url(base_url),
                    original_url,
                })
            })
            .collect()
    }

    async fn mark_deleted(&self, owner: &OwnerId, codes: &[ShortCode]) -> Result<()> {
        let codes_param: Vec<String> = codes.iter().map(|c| c.as_str().to_owned()).collect();

        let result = sqlx::query(
            r#"
            UPDATE shortened_urls
            SET is_deleted = TRUE
            WHERE user_id = $1
              AND short_url = ANY($2)
              AND NOT is_deleted
            "#,
        )
        .bind(*owner.as_uuid())
        .bind(codes_param)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        info!(
            owner = %owner,
            requested = codes.len(),
            marked = result.rows_affected(),
            "marked short urls as deleted"
        );
        Ok(())
    }

    async fn ping(&self) -> Result<HealthStatus> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(HealthStatus::Ok)
    }

    async fn stats(&self) -> Result<StorageStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS urls, COUNT(DISTINCT user_id) AS users
            FROM shortened_urls
            WHERE NOT is_deleted
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let urls: i64 = row.try_get("urls").map_err(map_sqlx_error)?;
        let users: i64 = row.try_get("users").map_err(map_sqlx_error)?;

        Ok(StorageStats {
            urls: count(urls)?,
            users: count(users)?,
        })
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_map_to_availability_errors() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            StorageError::Timeout(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolClosed),
            StorageError::Unavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StorageError::InvalidData(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::Protocol("boom".into())),
            StorageError::Query(_)
        ));
    }

    #[test]
    fn created_at_accepts_epoch_seconds() {
        let parsed = parse_created_at(Some(1_700_000_000)).unwrap().unwrap();
        assert_eq!(parsed.as_second(), 1_700_000_000);
        assert!(parse_created_at(None).unwrap().is_none());
        assert!(parse_created_at(Some(i64::MAX)).is_err());
    }

    #[test]
    fn negative_counts_are_invalid() {
        assert_eq!(count(3).unwrap(), 3);
        assert!(matches!(count(-1), Err(StorageError::InvalidData(_))));
    }
}
