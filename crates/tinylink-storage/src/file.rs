use crate::allocator::allocate;
use crate::StorageSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsString;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tinylink_core::error::Result;
use tinylink_core::{
    HealthStatus, OwnerId, Repository, SaveOutcome, ShortCode, StorageError, StorageStats,
    UrlRecord, UserUrl,
};
use tinylink_generator::{Generator, RandomGenerator};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};

/// One line of the log file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileEntry {
    uuid: OwnerId,
    short_url: String,
    original_url: String,
    is_deleted: bool,
}

impl From<FileEntry> for UrlRecord {
    fn from(entry: FileEntry) -> Self {
        UrlRecord {
            short_code: ShortCode::new_unchecked(entry.short_url),
            original_url: entry.original_url,
            owner_id: entry.uuid,
            deleted: entry.is_deleted,
            created_at: None,
        }
    }
}

/// File-backed implementation of the Repository trait.
///
/// Records live in a JSON-lines log: creates append one line, reads scan the
/// whole file, batch deletes rewrite it. The in-process `RwLock` serializes
/// appends and rewrites against each other and against readers; the file
/// must not be shared between processes.
#[derive(Debug)]
pub struct FileRepository<G = RandomGenerator> {
    path: PathBuf,
    lock: RwLock<()>,
    generator: G,
    settings: StorageSettings,
}

impl FileRepository<RandomGenerator> {
    /// Opens (creating if needed) the log at `path` with the default random generator.
    pub async fn open(path: impl Into<PathBuf>, settings: StorageSettings) -> Result<Self> {
        Self::open_with_generator(path, settings, RandomGenerator::new()).await
    }
}

impl<G: Generator> FileRepository<G> {
    pub async fn open_with_generator(
        path: impl Into<PathBuf>,
        settings: StorageSettings,
        generator: G,
    ) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        info!(path = %path.display(), "using file storage");

        Ok(Self {
            path,
            lock: RwLock::new(()),
            generator,
            settings,
        })
    }

    /// Returns the path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(&self) -> Result<Vec<FileEntry>> {
        let bytes = fs::read(&self.path).await?;
        let content = String::from_utf8_lossy(&bytes);
        let torn_tail = !content.is_empty() && !content.ends_with('\n');
        let total = content.lines().count();

        let mut entries = Vec::with_capacity(total);
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) if torn_tail && index + 1 == total => {
                    // An append interrupted before its newline; the next append drops it.
                    warn!(path = %self.path.display(), line = index + 1, error = %e, "ignoring torn trailing line");
                }
                Err(e) => {
                    return Err(StorageError::Serialization(format!(
                        "{}:{}: {e}",
                        self.path.display(),
                        index + 1
                    )))
                }
            }
        }

        Ok(entries)
    }

    /// Appends `entry` as one line.
    ///
    /// An unterminated last line is completed when it holds a valid entry and
    /// cut off otherwise. A failed write truncates the file back to where the
    /// new line started.
    async fn append(&self, entry: &FileEntry) -> Result<()> {
        let content = fs::read(&self.path).await?;
        let complete = complete_len(&content);
        let tail = &content[complete..];

        let mut buffer = String::new();
        let start = if tail.is_empty() {
            content.len()
        } else if serde_json::from_slice::<FileEntry>(tail).is_ok() {
            buffer.push('\n');
            content.len()
        } else {
            warn!(path = %self.path.display(), bytes = tail.len(), "discarding torn trailing line");
            complete
        };
        buffer.push_str(&encode(entry)?);
        buffer.push('\n');

        let start = start as u64;
        let mut file = OpenOptions::new().write(true).open(&self.path).await?;
        file.set_len(start).await?;
        file.seek(SeekFrom::Start(start)).await?;

        if let Err(err) = write_synced(&mut file, buffer.as_bytes()).await {
            if let Err(rollback) = file.set_len(start).await {
                warn!(path = %self.path.display(), error = %rollback, "failed to roll back partial append");
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Replaces the log with `entries` via a sibling temp file and a rename.
    async fn rewrite(&self, entries: &[FileEntry]) -> Result<()> {
        let mut buffer = String::new();
        for entry in entries {
            buffer.push_str(&encode(entry)?);
            buffer.push('\n');
        }

        let mut tmp_name = OsString::from(self.path.as_os_str());
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(buffer.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    async fn insert_new(&self, original_url: &str, owner: &OwnerId) -> Result<ShortCode> {
        let _guard = self.lock.write().await;

        let entries = self.read_entries().await?;
        let taken: HashSet<&str> = entries.iter().map(|e| e.short_url.as_str()).collect();
        let code = allocate(&self.generator, self.settings.max_attempts, |candidate| {
            taken.contains(candidate.as_str())
        })?;

        self.append(&FileEntry {
            uuid: *owner,
            short_url: code.as_str().to_owned(),
            original_url: original_url.to_owned(),
            is_deleted: false,
        })
        .await?;

        debug!(code = %code, owner = %owner, "appended short url to file");
        Ok(code)
    }
}

/// Length of `content` up to and including its last newline.
fn complete_len(content: &[u8]) -> usize {
    content
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |index| index + 1)
}

async fn write_synced(file: &mut fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.sync_data().await
}

fn encode(entry: &FileEntry) -> Result<String> {
    serde_json::to_string(entry).map_err(|e| StorageError::Serialization(e.to_string()))
}

#[async_trait]
impl<G: Generator> Repository for FileRepository<G> {
    async fn save_unique(&self, original_url: &str, owner: &OwnerId) -> Result<SaveOutcome> {
        let code = self.insert_new(original_url, owner).await?;
        Ok(SaveOutcome::created(code.to_url(&self.settings.base_url)))
    }

    async fn save(&self, original_url: &str, owner: &OwnerId) -> Result<String> {
        let code = self.insert_new(original_url, owner).await?;
        Ok(code.to_url(&self.settings.base_url))
    }

    async fn resolve(&self, code: &ShortCode) -> Result<String> {
        match self.find(code).await? {
            Some(record) if record.deleted => {
                trace!(code = %code, "short code is tombstoned");
                Err(StorageError::Gone(code.to_string()))
            }
            Some(record) => Ok(record.original_url),
            None => {
                trace!(code = %code, "short code not found");
                Err(StorageError::NotFound(code.to_string()))
            }
        }
    }

    async fn find(&self, code: &ShortCode) -> Result<Option<UrlRecord>> {
        let _guard = self.lock.read().await;

        let entry = self
            .read_entries()
            .await?
            .into_iter()
            .find(|entry| entry.short_url == code.as_str());

        Ok(entry.map(UrlRecord::from))
    }

    async fn list_for_owner(&self, owner: &OwnerId, base_url: &str) -> Result<Vec<UserUrl>> {
        let _guard = self.lock.read().await;

        let urls = self
            .read_entries()
            .await?
            .into_iter()
            .filter(|entry| entry.uuid == *owner && !entry.is_deleted)
            .map(|entry| UserUrl {
                short_url: ShortCode::new_unchecked(entry.short_url).to_url(base_url),
                original_url: entry.original_url,
            })
            .collect();

        Ok(urls)
    }

    async fn mark_deleted(&self, owner: &OwnerId, codes: &[ShortCode]) -> Result<()> {
        let _guard = self.lock.write().await;

        let targets: HashSet<&str> = codes.iter().map(ShortCode::as_str).collect();
        let mut entries = self.read_entries().await?;
        let mut marked = 0usize;

        for entry in entries.iter_mut() {
            if entry.uuid == *owner && !entry.is_deleted && targets.contains(entry.short_url.as_str())
            {
                entry.is_deleted = true;
                marked += 1;
            }
        }

        if marked > 0 {
            self.rewrite(&entries).await?;
        }

        info!(owner = %owner, requested = codes.len(), marked, "marked short urls as deleted");
        Ok(())
    }

    async fn ping(&self) -> Result<HealthStatus> {
        Err(StorageError::WrongMode("file"))
    }

    async fn stats(&self) -> Result<StorageStats> {
        let _guard = self.lock.read().await;

        let entries = self.read_entries().await?;
        let live: Vec<_> = entries.iter().filter(|entry| !entry.is_deleted).collect();
        let owners: HashSet<_> = live.iter().map(|entry| entry.uuid).collect();

        Ok(StorageStats {
            urls: live.len() as u64,
            users: owners.len() as u64,
        })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings() -> StorageSettings {
        StorageSettings::builder()
            .base_url("http://localhost:8080")
            .build()
    }

    async fn open_in(dir: &TempDir) -> FileRepository {
        FileRepository::open(dir.path().join("db").join("urls.json"), settings())
            .await
            .unwrap()
    }

    fn code_of(short_url: &str) -> ShortCode {
        ShortCode::from_url_or_code(short_url).unwrap()
    }

    #[tokio::test]
    async fn open_creates_missing_directories_and_file() {
        let dir = TempDir::new().unwrap();
        let repo = open_in(&dir).await;

        assert!(repo.path().exists());
        assert_eq!(std::fs::read_to_string(repo.path()).unwrap(), "");
    }

    #[tokio::test]
    async fn appends_one_json_line_per_record() {
        let dir = TempDir::new().unwrap();
        let repo = open_in(&dir).await;
        let owner = OwnerId::new_v4();

        let first = code_of(&repo.save("https://one.example", &owner).await.unwrap());
        repo.save("https://two.example", &owner).await.unwrap();

        let content = std::fs::read_to_string(repo.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let line: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(line["uuid"], owner.to_string());
        assert_eq!(line["short_url"], first.as_str());
        assert_eq!(line["original_url"], "https://one.example");
        assert_eq!(line["is_deleted"], false);
    }

    #[tokio::test]
    async fn reopened_repository_sees_existing_records() {
        let dir = TempDir::new().unwrap();
        let owner = OwnerId::new_v4();

        let code = {
            let repo = open_in(&dir).await;
            code_of(&repo.save("https://example.com", &owner).await.unwrap())
        };

        let reopened = open_in(&dir).await;
        assert_eq!(reopened.resolve(&code).await.unwrap(), "https://example.com");
    }

    #[tokio::test]
    async fn mark_deleted_rewrites_flags_in_place() {
        let dir = TempDir::new().unwrap();
        let repo = open_in(&dir).await;
        let owner = OwnerId::new_v4();

        let keep = code_of(&repo.save("https://keep.example", &owner).await.unwrap());
        let drop = code_of(&repo.save("https://drop.example", &owner).await.unwrap());

        repo.mark_deleted(&owner, &[drop.clone()]).await.unwrap();

        let content = std::fs::read_to_string(repo.path()).unwrap();
        let flags: Vec<bool> = content
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
            .map(|value| value["is_deleted"].as_bool().unwrap())
            .collect();
        assert_eq!(flags, vec![false, true]);

        assert_eq!(repo.resolve(&keep).await.unwrap(), "https://keep.example");
        assert!(matches!(
            repo.resolve(&drop).await.unwrap_err(),
            StorageError::Gone(_)
        ));
        assert!(!repo.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn malformed_line_is_a_serialization_error() {
        let dir = TempDir::new().unwrap();
        let repo = open_in(&dir).await;
        std::fs::write(repo.path(), "{not json}\n").unwrap();

        let err = repo
            .resolve(&ShortCode::new_unchecked("whatever"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[tokio::test]
    async fn torn_trailing_line_is_skipped_then_cut_off() {
        let dir = TempDir::new().unwrap();
        let repo = open_in(&dir).await;
        let owner = OwnerId::new_v4();

        let first = code_of(&repo.save("https://one.example", &owner).await.unwrap());
        let mut log = std::fs::OpenOptions::new()
            .append(true)
            .open(repo.path())
            .unwrap();
        std::io::Write::write_all(&mut log, br#"{"uuid":"0b1c"#).unwrap();
        drop(log);

        assert_eq!(repo.resolve(&first).await.unwrap(), "https://one.example");
        assert_eq!(repo.list_for_owner(&owner, "http://s").await.unwrap().len(), 1);

        let second = code_of(&repo.save("https://two.example", &owner).await.unwrap());
        assert_eq!(repo.resolve(&second).await.unwrap(), "https://two.example");

        let content = std::fs::read_to_string(repo.path()).unwrap();
        assert!(content.ends_with('\n'));
        assert_eq!(content.lines().count(), 2);
        for line in content.lines() {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }

    #[tokio::test]
    async fn unterminated_valid_line_is_kept() {
        let dir = TempDir::new().unwrap();
        let repo = open_in(&dir).await;
        let owner = OwnerId::new_v4();
        let line = format!(
            r#"{{"uuid":"{owner}","short_url":"handmade","original_url":"https://kept.example","is_deleted":false}}"#
        );
        std::fs::write(repo.path(), line).unwrap();

        repo.save("https://new.example", &owner).await.unwrap();

        let kept = ShortCode::new_unchecked("handmade");
        assert_eq!(repo.resolve(&kept).await.unwrap(), "https://kept.example");
        assert_eq!(std::fs::read_to_string(repo.path()).unwrap().lines().count(), 2);
    }

    #[tokio::test]
    async fn ping_reports_wrong_mode() {
        let dir = TempDir::new().unwrap();
        let repo = open_in(&dir).await;

        assert!(matches!(
            repo.ping().await.unwrap_err(),
            StorageError::WrongMode("file")
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_keep_the_log_consistent() {
        let dir = TempDir::new().unwrap();
        let repo = std::sync::Arc::new(open_in(&dir).await);
        let owner = OwnerId::new_v4();
        let mut handles = Vec::new();

        for i in 0..50u32 {
            let repo = std::sync::Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.save(&format!("https://example{i}.com"), &owner)
                    .await
                    .unwrap()
            }));
        }

        let mut urls = HashSet::new();
        for handle in handles {
            urls.insert(handle.await.unwrap());
        }

        assert_eq!(urls.len(), 50);
        assert_eq!(repo.list_for_owner(&owner, "http://s").await.unwrap().len(), 50);
    }
}
