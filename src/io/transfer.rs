//! Moving streams in and out of an [`ObjectStore`] with retry.
//!
//! Transient failures (`StorageErrorKind::Transient`) are retried with
//! exponential backoff; every other kind fails immediately. Large streams
//! go up as multipart uploads so no more than one part is held in memory.

use crate::config::{RetryConfig, TransferConfig};
use crate::error::StorageResult;
use crate::io::store::ObjectStore;
use std::io::Read;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry `operation` while it fails with a retryable error.
///
/// # Errors
/// Returns the last error once it is not retryable or the attempt budget
/// is spent.
pub fn retry_with_backoff<F, T>(config: &RetryConfig, what: &str, mut operation: F) -> StorageResult<T>
where
    F: FnMut() -> StorageResult<T>,
{
    let mut attempt = 0;
    let mut delay_ms = config.initial_delay_ms;

    loop {
        attempt += 1;
        match operation() {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !err.is_retryable() || attempt >= config.max_attempts {
                    return Err(err);
                }
                warn!(operation = what, attempt, delay_ms, error = %err, "retrying");
                std::thread::sleep(Duration::from_millis(delay_ms));
                delay_ms = delay_ms.saturating_mul(2).min(config.max_delay_ms);
            }
        }
    }
}

/// Upload `size` bytes from `reader` to `bucket/key`.
///
/// Streams at or below `multipart_threshold` go up in one `put_object`;
/// larger ones are split into `part_size` parts. A failed multipart upload
/// is aborted before the error is returned.
///
/// # Errors
/// Read failures, or the storage error that exhausted its retries.
pub fn upload<R: Read>(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    mut reader: R,
    size: u64,
    config: &TransferConfig,
) -> StorageResult<()> {
    if size <= config.multipart_threshold {
        let mut data = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        reader.read_to_end(&mut data)?;
        return retry_with_backoff(&config.retry, "put_object", || {
            store.put_object(bucket, key, &data)
        });
    }

    let upload_id = retry_with_backoff(&config.retry, "create_multipart", || {
        store.create_multipart(bucket, key)
    })?;
    debug!(bucket, key, size, upload_id = %upload_id, "multipart upload started");

    let result = upload_parts(store, &upload_id, &mut reader, config).and_then(|parts| {
        retry_with_backoff(&config.retry, "complete_multipart", || {
            store.complete_multipart(&upload_id)
        })
        .map(|()| parts)
    });
    match result {
        Ok(parts) => {
            debug!(bucket, key, parts, "multipart upload complete");
            Ok(())
        }
        Err(e) => {
            if let Err(abort_err) = store.abort_multipart(&upload_id) {
                warn!(upload_id = %upload_id, error = %abort_err, "abort multipart failed");
            }
            Err(e)
        }
    }
}

fn upload_parts<R: Read>(
    store: &dyn ObjectStore,
    upload_id: &str,
    reader: &mut R,
    config: &TransferConfig,
) -> StorageResult<u32> {
    let part_size = usize::try_from(config.part_size.max(1)).unwrap_or(usize::MAX);
    let mut buf = Vec::with_capacity(part_size);
    let mut part_number = 0u32;
    loop {
        buf.clear();
        let read = reader.by_ref().take(part_size as u64).read_to_end(&mut buf)?;
        if read == 0 {
            return Ok(part_number);
        }
        part_number += 1;
        retry_with_backoff(&config.retry, "upload_part", || {
            store.upload_part(upload_id, part_number, &buf)
        })?;
    }
}

/// Open `bucket/key` for reading, retrying transient failures.
///
/// # Errors
/// The storage error that exhausted its retries.
pub fn open_object(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    config: &RetryConfig,
) -> StorageResult<Box<dyn Read + Send>> {
    retry_with_backoff(config, "get_object", || store.get_object(bucket, key))
}
