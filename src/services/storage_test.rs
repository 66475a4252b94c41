use super::*;

fn store() -> (tempfile::TempDir, LocalObjectStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalObjectStore::new(dir.path());
    (dir, store)
}

#[tokio::test]
async fn put_writes_bytes_and_reports_checksum() {
    let (dir, store) = store();
    let stored = store
        .put("courses/abc/v1/sop.txt", b"hello", "text/plain")
        .await
        .unwrap();

    assert_eq!(stored.path, "courses/abc/v1/sop.txt");
    assert_eq!(stored.size, 5);
    assert_eq!(stored.checksum, "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824");

    let on_disk = std::fs::read(dir.path().join("courses/abc/v1/sop.txt")).unwrap();
    assert_eq!(on_disk, b"hello");
    assert!(!dir.path().join("courses/abc/v1/sop.txt.tmp").exists());
}

#[tokio::test]
async fn put_overwrites_existing_object() {
    let (dir, store) = store();
    store.put("a/b.txt", b"one", "text/plain").await.unwrap();
    store.put("a/b.txt", b"two", "text/plain").await.unwrap();
    assert_eq!(std::fs::read(dir.path().join("a/b.txt")).unwrap(), b"two");
}

#[tokio::test]
async fn remove_deletes_and_tolerates_missing() {
    let (dir, store) = store();
    store.put("a/b.txt", b"x", "text/plain").await.unwrap();
    store
        .remove(&["a/b.txt".to_string(), "a/missing.txt".to_string()])
        .await
        .unwrap();
    assert!(!dir.path().join("a/b.txt").exists());
}

#[tokio::test]
async fn rejects_traversal_and_absolute_paths() {
    let (_dir, store) = store();
    for bad in ["../escape.txt", "a/../../escape.txt", "/etc/passwd", "", "./a.txt"] {
        let err = store.put(bad, b"x", "text/plain").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)), "{bad}");
    }
    let err = store.remove(&["../x".to_string()]).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidPath(_)));
}

#[test]
fn checksum_is_lowercase_hex_sha256() {
    assert_eq!(checksum(b""), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
}
