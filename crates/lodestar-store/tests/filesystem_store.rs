//! Filesystem store behavior against a real directory

use lodestar_core::{StoreError, StorePath, VersionedStore, WriteMode};
use lodestar_store::{content_digest, FilesystemVersionedStore};

fn path(raw: &str) -> StorePath {
    StorePath::new(raw).unwrap()
}

#[tokio::test]
async fn test_revisions_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let p = path("/Devices/cassini1/applied.json");

    {
        let store = FilesystemVersionedStore::open(dir.path()).await.unwrap();
        store.put(&p, b"first".to_vec(), WriteMode::CreateSafe).await.unwrap();
        store.put(&p, b"second".to_vec(), WriteMode::Update).await.unwrap();
    }

    let store = FilesystemVersionedStore::open(dir.path()).await.unwrap();
    assert_eq!(store.get(&p).await.unwrap(), b"second");

    let history = store.history(&p).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].digest, content_digest(b"first"));
    assert_eq!(store.get_revision(&p, 1).await.unwrap().unwrap(), b"first");
}

#[tokio::test]
async fn test_modes_and_tombstones() {
    let dir = tempfile::tempdir().unwrap();
    let store = FilesystemVersionedStore::open(dir.path()).await.unwrap();
    let p = path("/Services/transceivers/input.json");

    assert!(matches!(
        store.put(&p, b"{}".to_vec(), WriteMode::Update).await,
        Err(StoreError::NotFound { .. })
    ));
    store.put(&p, b"{}".to_vec(), WriteMode::Create).await.unwrap();
    assert!(matches!(
        store.put(&p, b"{}".to_vec(), WriteMode::CreateSafe).await,
        Err(StoreError::AlreadyExists { .. })
    ));

    let tomb = store.delete(&p).await.unwrap();
    assert!(tomb.is_tombstone());
    assert_eq!(tomb.seq, 2);
    assert!(matches!(store.get(&p).await, Err(StoreError::NotFound { .. })));
    assert_eq!(store.get_revision(&p, 2).await.unwrap(), None);
    assert_eq!(store.get_revision(&p, 1).await.unwrap().unwrap(), b"{}");
}

#[tokio::test]
async fn test_identical_content_shares_one_object() {
    let dir = tempfile::tempdir().unwrap();
    let store = FilesystemVersionedStore::open(dir.path()).await.unwrap();

    store.put(&path("/a"), b"same".to_vec(), WriteMode::Create).await.unwrap();
    store.put(&path("/b"), b"same".to_vec(), WriteMode::Create).await.unwrap();

    let objects = std::fs::read_dir(dir.path().join("objects")).unwrap().count();
    assert_eq!(objects, 1);
}

#[tokio::test]
async fn test_tampered_object_is_reported_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let store = FilesystemVersionedStore::open(dir.path()).await.unwrap();
    let p = path("/Devices/x/actual.json");

    let rev = store.put(&p, b"original".to_vec(), WriteMode::Create).await.unwrap();
    std::fs::write(dir.path().join("objects").join(&rev.digest), b"tampered").unwrap();

    assert!(matches!(store.get(&p).await, Err(StoreError::Corrupt { .. })));
}
