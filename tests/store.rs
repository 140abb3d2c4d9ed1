//! Tests for object stores and transfers.

use anyhow::Result;
use ironsieve::config::{RetryConfig, TransferConfig};
use ironsieve::error::{StorageError, StorageErrorKind};
use ironsieve::io::store::{LocalStore, MemoryStore, ObjectLocator, ObjectStore};
use ironsieve::io::transfer::{open_object, retry_with_backoff, upload};
use std::io::Read;

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay_ms: 1,
        max_delay_ms: 2,
    }
}

fn small_parts() -> TransferConfig {
    TransferConfig {
        multipart_threshold: 10,
        part_size: 4,
        retry: fast_retry(5),
    }
}

#[test]
fn test_memory_store_put_get_head() -> Result<()> {
    let store = MemoryStore::new();
    store.put_object("b", "k.csv", b"hello")?;
    assert_eq!(store.head_object("b", "k.csv")?.size, 5);

    let mut body = String::new();
    store.get_object("b", "k.csv")?.read_to_string(&mut body)?;
    assert_eq!(body, "hello");

    let missing = store.head_object("b", "nope").unwrap_err();
    assert_eq!(missing.kind, StorageErrorKind::NotFound);
    assert!(!missing.is_retryable());
    Ok(())
}

#[test]
fn test_retry_recovers_from_transient_failures() -> Result<()> {
    let store = MemoryStore::new();
    store.put_object("b", "k", b"x")?;
    store.fail_next(3);
    let meta = retry_with_backoff(&fast_retry(5), "head", || store.head_object("b", "k"))?;
    assert_eq!(meta.size, 1);
    Ok(())
}

#[test]
fn test_retry_gives_up_after_budget() {
    let mut calls = 0;
    let result: Result<(), StorageError> = retry_with_backoff(&fast_retry(3), "op", || {
        calls += 1;
        Err(StorageError::transient("throttled"))
    });
    assert!(result.is_err());
    assert_eq!(calls, 3);
}

#[test]
fn test_retry_skips_permanent_errors() {
    let mut calls = 0;
    let result: Result<(), StorageError> = retry_with_backoff(&fast_retry(5), "op", || {
        calls += 1;
        Err(StorageError::new(StorageErrorKind::PermissionDenied, "denied"))
    });
    assert_eq!(result.unwrap_err().kind, StorageErrorKind::PermissionDenied);
    assert_eq!(calls, 1);
}

#[test]
fn test_small_upload_is_single_put() -> Result<()> {
    let store = MemoryStore::new();
    upload(&store, "out", "small", &b"0123456789"[..], 10, &small_parts())?;
    assert_eq!(store.object_bytes("out", "small").as_deref(), Some(&b"0123456789"[..]));
    assert_eq!(store.pending_uploads(), 0);
    Ok(())
}

#[test]
fn test_large_upload_goes_multipart() -> Result<()> {
    let store = MemoryStore::new();
    let data: Vec<u8> = (0..=255u8).cycle().take(1_001).collect();
    store.fail_next(2);
    upload(&store, "out", "big", &data[..], data.len() as u64, &small_parts())?;
    assert_eq!(store.object_bytes("out", "big"), Some(data));
    assert_eq!(store.pending_uploads(), 0);
    Ok(())
}

#[test]
fn test_failed_multipart_is_aborted() {
    let store = MemoryStore::new();
    let config = TransferConfig {
        retry: fast_retry(2),
        ..small_parts()
    };
    let data = vec![7u8; 64];
    store.fail_next(1);
    upload(&store, "out", "retried", &data[..], 64, &config).expect("create retried once");
    assert_eq!(store.object_bytes("out", "retried"), Some(data));

    struct FailingReader;
    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("source vanished"))
        }
    }
    let err = upload(&store, "out", "broken", FailingReader, 64, &config).unwrap_err();
    assert_eq!(err.kind, StorageErrorKind::Other);
    assert_eq!(store.pending_uploads(), 0);
    assert!(store.object_bytes("out", "broken").is_none());
}

#[test]
fn test_open_object_retries() -> Result<()> {
    let store = MemoryStore::new();
    store.put_object("b", "k", b"payload")?;
    store.fail_next(2);
    let mut body = Vec::new();
    open_object(&store, "b", "k", &fast_retry(3))?.read_to_end(&mut body)?;
    assert_eq!(body, b"payload");
    Ok(())
}

#[test]
fn test_local_store_roundtrip_and_multipart() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = LocalStore::new(dir.path());

    store.put_object("raw", "nested/in.csv", b"a,b,c\n")?;
    assert_eq!(store.head_object("raw", "nested/in.csv")?.size, 6);
    assert!(dir.path().join("raw/nested/in.csv").is_file());

    let data = vec![b'z'; 50];
    upload(&store, "clean", "cleansed/in.csv", &data[..], 50, &small_parts())?;
    assert_eq!(std::fs::read(dir.path().join("clean/cleansed/in.csv"))?, data);
    assert!(!dir.path().join(".uploads").read_dir()?.any(|_| true));
    Ok(())
}

#[test]
fn test_delete_object() -> Result<()> {
    let store = MemoryStore::new();
    store.put_object("b", "cleansed/x.csv", b"x")?;
    store.delete_object("b", "cleansed/x.csv")?;
    assert!(store.keys("b").is_empty());
    assert_eq!(
        store.delete_object("b", "cleansed/x.csv").unwrap_err().kind,
        StorageErrorKind::NotFound
    );

    let dir = tempfile::tempdir()?;
    let local = LocalStore::new(dir.path());
    local.put_object("b", "cleansed/x.csv", b"x")?;
    local.delete_object("b", "cleansed/x.csv")?;
    assert!(!dir.path().join("b/cleansed/x.csv").exists());
    assert_eq!(
        local.delete_object("b", "cleansed/x.csv").unwrap_err().kind,
        StorageErrorKind::NotFound
    );
    Ok(())
}

#[test]
fn test_local_store_overwrites_leave_no_temp_files() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = LocalStore::new(dir.path());

    store.put_object("out", "o.csv", b"first version\n")?;
    store.put_object("out", "o.csv", b"second\n")?;
    assert_eq!(std::fs::read(dir.path().join("out/o.csv"))?, b"second\n");

    let data = vec![b'm'; 40];
    upload(&store, "out", "o.csv", &data[..], 40, &small_parts())?;
    assert_eq!(std::fs::read(dir.path().join("out/o.csv"))?, data);

    let names: Vec<String> = std::fs::read_dir(dir.path().join("out"))?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<std::io::Result<_>>()?;
    assert_eq!(names, vec!["o.csv"]);
    Ok(())
}

#[test]
fn test_local_store_rejects_escaping_keys() {
    let store = LocalStore::new("/tmp/ironsieve-never-used");
    for key in ["../etc/passwd", "/abs", "a/../../b", ""] {
        let err = store.object_path("bucket", key).unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::InvalidInput, "{key}");
    }
    assert_eq!(
        store.head_object("bucket", "missing.csv").unwrap_err().kind,
        StorageErrorKind::NotFound
    );
}

#[test]
fn test_locator_display() {
    assert_eq!(ObjectLocator::new("b", "cleansed/x.csv").to_string(), "s3://b/cleansed/x.csv");
}
