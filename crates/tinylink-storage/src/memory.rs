use crate::allocator::allocate;
use crate::StorageSettings;
use async_trait::async_trait;
use jiff::Timestamp;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tinylink_core::error::Result;
use tinylink_core::{
    HealthStatus, OwnerId, Repository, SaveOutcome, ShortCode, StorageError, StorageStats,
    UrlRecord, UserUrl,
};
use tinylink_generator::{Generator, RandomGenerator};
use tracing::{debug, info, trace};

/// In-memory implementation of the Repository trait.
///
/// One `RwLock` guards the whole map. Allocation and insert happen under a
/// single write guard, so two writers can never both observe a code as free.
/// Nothing survives a restart.
#[derive(Debug)]
pub struct InMemoryRepository<G = RandomGenerator> {
    storage: RwLock<HashMap<String, UrlRecord>>,
    generator: G,
    settings: StorageSettings,
}

impl InMemoryRepository<RandomGenerator> {
    /// Creates a new in-memory repository with the default random generator.
    pub fn new(settings: StorageSettings) -> Self {
        Self::with_generator(settings, RandomGenerator::new())
    }
}

impl<G: Generator> InMemoryRepository<G> {
    pub fn with_generator(settings: StorageSettings, generator: G) -> Self {
        Self {
            storage: RwLock::new(HashMap::new()),
            generator,
            settings,
        }
    }

    /// Number of stored records, tombstones included.
    pub fn len(&self) -> usize {
        self.storage.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.read().is_empty()
    }

    fn insert_new(&self, original_url: &str, owner: &OwnerId) -> Result<ShortCode> {
        let mut storage = self.storage.write();

        let code = allocate(&self.generator, self.settings.max_attempts, |candidate| {
            storage.contains_key(candidate.as_str())
        })?;

        storage.insert(
            code.as_str().to_owned(),
            UrlRecord {
                short_code: code.clone(),
                original_url: original_url.to_owned(),
                owner_id: *owner,
                deleted: false,
                created_at: Some(Timestamp::now()),
            },
        );

        debug!(code = %code, owner = %owner, "stored short url in memory");
        Ok(code)
    }
}

#[async_trait]
impl<G: Generator> Repository for InMemoryRepository<G> {
    async fn save_unique(&self, original_url: &str, owner: &OwnerId) -> Result<SaveOutcome> {
        let code = self.insert_new(original_url, owner)?;
        Ok(SaveOutcome::created(code.to_url(&self.settings.base_url)))
    }

    async fn save(&self, original_url: &str, owner: &OwnerId) -> Result<String> {
        let code = self.insert_new(original_url, owner)?;
        Ok(code.to_url(&self.settings.base_url))
    }

    async fn resolve(&self, code: &ShortCode) -> Result<String> {
        let storage = self.storage.read();

        let Some(record) = storage.get(code.as_str()) else {
            trace!(code = %code, "short code not found");
            return Err(StorageError::NotFound(code.to_string()));
        };

        if record.deleted {
            trace!(code = %code, "short code is tombstoned");
            return Err(StorageError::Gone(code.to_string()));
        }

        Ok(record.original_url.clone())
    }

    async fn find(&self, code: &ShortCode) -> Result<Option<UrlRecord>> {
        Ok(self.storage.read().get(code.as_str()).cloned())
    }

    async fn list_for_owner(&self, owner: &OwnerId, base_url: &str) -> Result<Vec<UserUrl>> {
        let storage = self.storage.read();

        let urls = storage
            .values()
            .filter(|record| record.owner_id == *owner && record.is_live())
            .map(|record| UserUrl {
                short_url: record.short_code.to_url(base_url),
                original_url: record.original_url.clone(),
            })
            .collect();

        Ok(urls)
    }

    async fn mark_deleted(&self, owner: &OwnerId, codes: &[ShortCode]) -> Result<()> {
        let mut storage = self.storage.write();
        let mut marked = 0usize;

        for code in codes {
            if let Some(record) = storage.get_mut(code.as_str()) {
                if record.owner_id == *owner && !record.deleted {
                    record.deleted = true;
                    marked += 1;
                }
            }
        }

        info!(owner = %owner, requested = codes.len(), marked, "marked short urls as deleted");
        Ok(())
    }

    async fn ping(&self) -> Result<HealthStatus> {
        Err(StorageError::WrongMode("in-memory"))
    }

    async fn stats(&self) -> Result<StorageStats> {
        let storage = self.storage.read();
        let live = storage.values().filter(|record| record.is_live());

        let mut urls = 0u64;
        let mut owners = HashSet::new();
        for record in live {
            urls += 1;
            owners.insert(record.owner_id);
        }

        Ok(StorageStats {
            urls,
            users: owners.len() as u64,
        })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
