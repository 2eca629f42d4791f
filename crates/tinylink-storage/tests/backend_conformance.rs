//! Behaviour every backend must share, checked against the in-process ones.

use std::collections::HashSet;

use tempfile::TempDir;
use tinylink_core::{OwnerId, SaveStatus, ShortCode, StorageStats, UrlRecord, UserUrl};
use tinylink_storage::{
    FileRepository, InMemoryRepository, Repository, StorageError, StorageSettings,
};

const BASE_URL: &str = "http://short.test";

fn settings() -> StorageSettings {
    StorageSettings::builder().base_url(BASE_URL).build()
}

fn code_of(short_url: &str) -> ShortCode {
    ShortCode::from_url_or_code(short_url).unwrap()
}

async fn lifecycle<R: Repository>(repo: R) {
    let owner = OwnerId::new_v4();

    let outcome = repo.save_unique("https://rust-lang.org", &owner).await.unwrap();
    assert_eq!(outcome.status, SaveStatus::Created);
    assert!(outcome.short_url.starts_with("http://short.test/"));

    let code = code_of(&outcome.short_url);
    assert_eq!(code.as_str().len(), 8);
    assert_eq!(repo.resolve(&code).await.unwrap(), "https://rust-lang.org");

    let listed = repo.list_for_owner(&owner, BASE_URL).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].short_url, outcome.short_url);

    repo.mark_deleted(&owner, &[code.clone()]).await.unwrap();

    let err = repo.resolve(&code).await.unwrap_err();
    assert!(matches!(err, StorageError::Gone(_)));
    assert_eq!(err.status_code(), 410);
    assert!(repo.list_for_owner(&owner, BASE_URL).await.unwrap().is_empty());

    let record = repo.find(&code).await.unwrap().unwrap();
    assert!(record.deleted);
    assert_eq!(record.owner_id, owner);

    // Deleting again is not an error.
    repo.mark_deleted(&owner, &[code]).await.unwrap();
}

/// Everything a caller can observe about `owner` and `codes`.
async fn snapshot<R: Repository>(
    repo: &R,
    owner: &OwnerId,
    codes: &[ShortCode],
) -> (Vec<Option<UrlRecord>>, Vec<UserUrl>, StorageStats) {
    let mut records = Vec::with_capacity(codes.len());
    for code in codes {
        records.push(repo.find(code).await.unwrap());
    }

    let mut listed = repo.list_for_owner(owner, BASE_URL).await.unwrap();
    listed.sort_by(|a, b| a.short_url.cmp(&b.short_url));

    (records, listed, repo.stats().await.unwrap())
}

/// Deletes the same code twice and returns its owner and code.
async fn repeated_delete<R: Repository>(repo: &R) -> (OwnerId, ShortCode) {
    let owner = OwnerId::new_v4();
    let kept = code_of(&repo.save("https://kept.example", &owner).await.unwrap());
    let dropped = code_of(&repo.save("https://dropped.example", &owner).await.unwrap());
    let all = [kept, dropped.clone()];

    repo.mark_deleted(&owner, &[dropped.clone()]).await.unwrap();
    let once = snapshot(repo, &owner, &all).await;

    repo.mark_deleted(&owner, &[dropped.clone()]).await.unwrap();
    let twice = snapshot(repo, &owner, &all).await;

    assert_eq!(once, twice);
    assert!(twice.0[1].as_ref().unwrap().deleted);
    assert_eq!(twice.1.len(), 1);
    assert_eq!(twice.2, StorageStats { urls: 1, users: 1 });

    (owner, dropped)
}

async fn owner_scoping<R: Repository>(repo: R) {
    let alice = OwnerId::new_v4();
    let bob = OwnerId::new_v4();

    let a = code_of(&repo.save("https://a.example", &alice).await.unwrap());
    let b = code_of(&repo.save("https://b.example", &bob).await.unwrap());

    repo.mark_deleted(&alice, &[a.clone(), b.clone()]).await.unwrap();

    assert!(matches!(
        repo.resolve(&a).await.unwrap_err(),
        StorageError::Gone(_)
    ));
    assert_eq!(repo.resolve(&b).await.unwrap(), "https://b.example");
    assert_eq!(
        repo.stats().await.unwrap(),
        StorageStats { urls: 1, users: 1 }
    );
}

async fn unknown_code<R: Repository>(repo: R) {
    let missing = ShortCode::new_unchecked("zzzzzzzz");

    let err = repo.resolve(&missing).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
    assert!(repo.find(&missing).await.unwrap().is_none());
}

async fn distinct_codes<R: Repository>(repo: R) {
    let owner = OwnerId::new_v4();
    let mut seen = HashSet::new();

    for i in 0..200 {
        let url = repo.save(&format!("https://example.com/{i}"), &owner).await.unwrap();
        assert!(seen.insert(url));
    }

    assert_eq!(repo.list_for_owner(&owner, BASE_URL).await.unwrap().len(), 200);
}

async fn file_repo(dir: &TempDir) -> FileRepository {
    FileRepository::open(dir.path().join("urls.json"), settings())
        .await
        .unwrap()
}

#[tokio::test]
async fn memory_lifecycle() {
    lifecycle(InMemoryRepository::new(settings())).await;
}

#[tokio::test]
async fn file_lifecycle() {
    let dir = TempDir::new().unwrap();
    lifecycle(file_repo(&dir).await).await;
}

#[tokio::test]
async fn memory_owner_scoping() {
    owner_scoping(InMemoryRepository::new(settings())).await;
}

#[tokio::test]
async fn file_owner_scoping() {
    let dir = TempDir::new().unwrap();
    owner_scoping(file_repo(&dir).await).await;
}

#[tokio::test]
async fn memory_unknown_code() {
    unknown_code(InMemoryRepository::new(settings())).await;
}

#[tokio::test]
async fn file_unknown_code() {
    let dir = TempDir::new().unwrap();
    unknown_code(file_repo(&dir).await).await;
}

#[tokio::test]
async fn memory_distinct_codes() {
    distinct_codes(InMemoryRepository::new(settings())).await;
}

#[tokio::test]
async fn file_distinct_codes() {
    let dir = TempDir::new().unwrap();
    distinct_codes(file_repo(&dir).await).await;
}

#[tokio::test]
async fn memory_repeated_delete() {
    repeated_delete(&InMemoryRepository::new(settings())).await;
}

#[tokio::test]
async fn file_repeated_delete_leaves_log_untouched() {
    let dir = TempDir::new().unwrap();
    let repo = file_repo(&dir).await;

    let (owner, dropped) = repeated_delete(&repo).await;
    let before = tokio::fs::read(repo.path()).await.unwrap();

    repo.mark_deleted(&owner, &[dropped]).await.unwrap();

    let after = tokio::fs::read(repo.path()).await.unwrap();
    assert_eq!(before, after);
}
