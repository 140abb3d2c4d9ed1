//! Invocation envelope: fetch an object, cleanse it, upload both outputs.
//!
//! This is the thin shell around [`CleansingEngine`]. It accepts either a
//! bucket-notification event or a plain `{ "bucket", "key" }` request,
//! streams the source object through the engine into two disk spools, and
//! only uploads once the run has succeeded. Accepted records land under
//! `cleansed/<key>` and rejected ones under `error/<key>` in the destination
//! bucket. Both outputs are published or neither is: if the second upload
//! fails, the first object is deleted again.
//!
//! ```no_run
//! use ironsieve::handler::{handle, InvocationEvent};
//! use ironsieve::io::store::LocalStore;
//! use ironsieve::{CleansingEngine, EngineConfig, TransferConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = LocalStore::new("/var/data");
//! let event: InvocationEvent =
//!     serde_json::from_str(r#"{"bucket": "raw", "key": "users.csv", "dest_bucket": "clean"}"#)?;
//! let engine = CleansingEngine::new(EngineConfig::default())?;
//! let summary = handle(&event, &store, &engine, &TransferConfig::default())?;
//! println!("{}", serde_json::to_string_pretty(&summary)?);
//! # Ok(())
//! # }
//! ```

use crate::config::TransferConfig;
use crate::config::RetryConfig;
use crate::engine::CleansingEngine;
use crate::error::{CleanseError, CleanseResult};
use crate::io::compression::open_input;
use crate::io::store::{ObjectLocator, ObjectStore};
use crate::io::transfer::{open_object, retry_with_backoff, upload};
use crate::sink::RejectCounts;
use crate::spool::Spool;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Environment variable naming the source bucket when the event has none.
pub const SOURCE_BUCKET_VAR: &str = "SOURCE_BUCKET";
/// Environment variable naming the destination bucket.
pub const DEST_BUCKET_VAR: &str = "DEST_BUCKET";

pub const ACCEPTED_PREFIX: &str = "cleansed/";
pub const REJECTED_PREFIX: &str = "error/";

/// The request that starts one cleansing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationEvent {
    /// Bucket-notification records; only the first is used.
    #[serde(rename = "Records", default, skip_serializing_if = "Vec::is_empty")]
    pub records: Vec<NotificationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_bucket: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub s3: StorageEntity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntity {
    pub bucket: BucketEntity,
    pub object: ObjectEntity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketEntity {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntity {
    pub key: String,
}

impl InvocationEvent {
    /// Direct request for `bucket/key`.
    pub fn direct(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            key: Some(key.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_dest_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.dest_bucket = Some(bucket.into());
        self
    }

    /// Source locator and destination bucket, falling back to the process
    /// environment for missing buckets.
    ///
    /// # Errors
    /// Fails if the source bucket, key or destination bucket is unknown.
    pub fn resolve(&self) -> Result<(ObjectLocator, String)> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// [`resolve`](Self::resolve) with an explicit variable lookup.
    ///
    /// # Errors
    /// Fails if the source bucket, key or destination bucket is unknown.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<(ObjectLocator, String)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = if let Some(record) = self.records.first() {
            ObjectLocator::new(&record.s3.bucket.name, &record.s3.object.key)
        } else {
            let bucket = self
                .bucket
                .clone()
                .or_else(|| lookup(SOURCE_BUCKET_VAR))
                .ok_or_else(|| anyhow!("no source bucket in event and {SOURCE_BUCKET_VAR} unset"))?;
            let key = self
                .key
                .clone()
                .ok_or_else(|| anyhow!("no object key in event"))?;
            ObjectLocator::new(bucket, key)
        };
        let dest = self
            .dest_bucket
            .clone()
            .or_else(|| lookup(DEST_BUCKET_VAR))
            .ok_or_else(|| anyhow!("no destination bucket in event and {DEST_BUCKET_VAR} unset"))?;
        Ok((source, dest))
    }
}

/// Structured result of a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanseSummary {
    pub source: String,
    pub destination_accepted: String,
    pub destination_rejected: String,
    pub input_size_bytes: u64,
    pub total_records: u64,
    pub accepted_records: u64,
    pub rejected_records: u64,
    pub rejected_by_reason: RejectCounts,
    pub workers: usize,
    pub batch_size: usize,
}

/// Run one invocation end to end.
///
/// Nothing is uploaded unless the engine run succeeds, and a failed upload
/// leaves neither output behind.
///
/// # Errors
/// Fails on an unresolvable event, a storage error that survives its
/// retries, or any engine fault.
pub fn handle(
    event: &InvocationEvent,
    store: &dyn ObjectStore,
    engine: &CleansingEngine,
    transfer: &TransferConfig,
) -> Result<CleanseSummary> {
    let (source, dest_bucket) = event.resolve()?;
    info!(source = %source, "processing object");

    let meta = retry_with_backoff(&transfer.retry, "head_object", || {
        store.head_object(&source.bucket, &source.key)
    })
    .with_context(|| format!("head {source}"))?;
    info!(source = %source, size_bytes = meta.size, "object size");

    let body = open_object(store, &source.bucket, &source.key, &transfer.retry)
        .with_context(|| format!("get {source}"))?;
    let input = open_input(body, &source.key).with_context(|| format!("decode {source}"))?;

    let out = engine
        .run(input, Spool::new()?, Spool::new()?)
        .with_context(|| format!("cleanse {source}"))?;

    let accepted = ObjectLocator::new(&dest_bucket, format!("{ACCEPTED_PREFIX}{}", source.key));
    let rejected = ObjectLocator::new(&dest_bucket, format!("{REJECTED_PREFIX}{}", source.key));
    publish(
        store,
        transfer,
        [
            (out.accepted, &accepted, out.summary.accepted_records),
            (out.rejected, &rejected, out.summary.rejected_records),
        ],
    )
    .with_context(|| format!("publish outputs of {source}"))?;

    let summary = out.summary;
    info!(
        source = %source,
        total = summary.total_records,
        accepted = summary.accepted_records,
        rejected = summary.rejected_records,
        "invocation complete"
    );
    Ok(CleanseSummary {
        source: source.to_string(),
        destination_accepted: accepted.to_string(),
        destination_rejected: rejected.to_string(),
        input_size_bytes: meta.size,
        total_records: summary.total_records,
        accepted_records: summary.accepted_records,
        rejected_records: summary.rejected_records,
        rejected_by_reason: summary.rejected_by_reason,
        workers: summary.workers,
        batch_size: summary.batch_size,
    })
}

/// Upload each spool to its target in order. On the first failure, every
/// object already written by this call is deleted before the error returns.
fn publish<const N: usize>(
    store: &dyn ObjectStore,
    transfer: &TransferConfig,
    outputs: [(Spool, &ObjectLocator, u64); N],
) -> CleanseResult<()> {
    let mut published: Vec<&ObjectLocator> = Vec::with_capacity(N);
    for (spool, target, records) in outputs {
        let result = spool
            .into_reader()
            .map_err(CleanseError::from)
            .and_then(|(file, size)| {
                info!(target = %target, records, size_bytes = size, "uploading");
                upload(store, &target.bucket, &target.key, file, size, transfer)
                    .map_err(CleanseError::from)
            });
        if let Err(e) = result {
            warn!(target = %target, error = %e, "upload failed");
            roll_back(store, &transfer.retry, &published);
            return Err(e);
        }
        published.push(target);
    }
    Ok(())
}

fn roll_back(store: &dyn ObjectStore, retry: &RetryConfig, published: &[&ObjectLocator]) {
    for target in published {
        match retry_with_backoff(retry, "delete_object", || {
            store.delete_object(&target.bucket, &target.key)
        }) {
            Ok(()) => info!(target = %target, "removed partial output"),
            Err(e) => warn!(target = %target, error = %e, "could not remove partial output"),
        }
    }
}
