//! Object storage behind a provider-agnostic trait.
//!
//! The engine never talks to storage itself; the [`handler`](crate::handler)
//! fetches the input stream and uploads the two outputs through an
//! [`ObjectStore`]. Two implementations ship with the crate:
//!
//! - [`MemoryStore`]: all state in memory, with optional transient-fault
//!   injection so retry paths can be exercised in tests;
//! - [`LocalStore`]: one directory per bucket under a root directory.
//!
//! All operations are blocking.

use crate::error::{StorageError, StorageErrorKind, StorageResult};
use crate::spool::AtomicFile;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Metadata returned by [`ObjectStore::head_object`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub bucket: String,
    pub key: String,
    pub size: u64,
}

/// A bucket/key pair, printed as `s3://bucket/key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocator {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocator {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for ObjectLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Blocking object storage operations used by the handler.
pub trait ObjectStore: Send + Sync {
    /// Size and identity of an object without reading it.
    ///
    /// # Errors
    /// `NotFound` if the object does not exist.
    fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectMetadata>;

    /// Open an object for sequential reading.
    ///
    /// # Errors
    /// `NotFound` if the object does not exist.
    fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Box<dyn Read + Send>>;

    /// Store `data` as a single object, replacing any existing one.
    ///
    /// # Errors
    /// Provider-specific failures.
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Start a multipart upload and return its id.
    ///
    /// # Errors
    /// Provider-specific failures.
    fn create_multipart(&self, bucket: &str, key: &str) -> StorageResult<String>;

    /// Upload one part. Part numbers start at 1.
    ///
    /// # Errors
    /// `NotFound` for an unknown upload id.
    fn upload_part(&self, upload_id: &str, part_number: u32, data: &[u8]) -> StorageResult<()>;

    /// Assemble the uploaded parts, in part-number order, into the object.
    ///
    /// # Errors
    /// `NotFound` for an unknown upload id.
    fn complete_multipart(&self, upload_id: &str) -> StorageResult<()>;

    /// Discard a multipart upload and its parts.
    ///
    /// # Errors
    /// `NotFound` for an unknown upload id.
    fn abort_multipart(&self, upload_id: &str) -> StorageResult<()>;

    /// Remove an object.
    ///
    /// # Errors
    /// `NotFound` if the object does not exist.
    fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    parts: HashMap<u32, Vec<u8>>,
}

type Buckets = HashMap<String, HashMap<String, Arc<Vec<u8>>>>;

/// In-memory [`ObjectStore`].
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<Mutex<Buckets>>,
    uploads: Arc<Mutex<HashMap<String, PendingUpload>>>,
    next_upload: Arc<AtomicU64>,
    /// Remaining calls that fail with a transient error before succeeding.
    transient_failures: Arc<AtomicU32>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` operations fail with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    /// Full contents of an object, if present.
    #[must_use]
    pub fn object_bytes(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let objects = self.objects.lock().ok()?;
        objects
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|data| data.as_ref().clone())
    }

    /// Keys in a bucket, sorted.
    #[must_use]
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let Ok(objects) = self.objects.lock() else {
            return Vec::new();
        };
        let mut keys: Vec<String> = objects
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Multipart uploads started but neither completed nor aborted.
    #[must_use]
    pub fn pending_uploads(&self) -> usize {
        self.uploads.lock().map(|u| u.len()).unwrap_or(0)
    }

    fn maybe_fail(&self, op: &str) -> StorageResult<()> {
        let injected = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(StorageError::transient(format!("injected failure in {op}")));
        }
        Ok(())
    }

    fn objects(&self) -> StorageResult<MutexGuard<'_, Buckets>> {
        self.objects
            .lock()
            .map_err(|_| StorageError::new(StorageErrorKind::Other, "object map poisoned"))
    }

    fn uploads(&self) -> StorageResult<MutexGuard<'_, HashMap<String, PendingUpload>>> {
        self.uploads
            .lock()
            .map_err(|_| StorageError::new(StorageErrorKind::Other, "upload map poisoned"))
    }
}

impl ObjectStore for MemoryStore {
    fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectMetadata> {
        self.maybe_fail("head_object")?;
        let objects = self.objects()?;
        let data = objects
            .get(bucket)
            .and_then(|b| b.get(key))
            .ok_or_else(|| StorageError::not_found(format!("object {bucket}/{key} not found")))?;
        Ok(ObjectMetadata {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: data.len() as u64,
        })
    }

    fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Box<dyn Read + Send>> {
        self.maybe_fail("get_object")?;
        let objects = self.objects()?;
        let data = objects
            .get(bucket)
            .and_then(|b| b.get(key))
            .cloned()
            .ok_or_else(|| StorageError::not_found(format!("object {bucket}/{key} not found")))?;
        Ok(Box::new(Cursor::new(SharedBytes(data))))
    }

    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> StorageResult<()> {
        self.maybe_fail("put_object")?;
        self.objects()?
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), Arc::new(data.to_vec()));
        Ok(())
    }

    fn create_multipart(&self, bucket: &str, key: &str) -> StorageResult<String> {
        self.maybe_fail("create_multipart")?;
        let id = format!("upload-{}", self.next_upload.fetch_add(1, Ordering::SeqCst));
        self.uploads()?.insert(
            id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: HashMap::new(),
            },
        );
        Ok(id)
    }

    fn upload_part(&self, upload_id: &str, part_number: u32, data: &[u8]) -> StorageResult<()> {
        self.maybe_fail("upload_part")?;
        let mut uploads = self.uploads()?;
        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| StorageError::not_found(format!("upload {upload_id} not found")))?;
        upload.parts.insert(part_number, data.to_vec());
        Ok(())
    }

    fn complete_multipart(&self, upload_id: &str) -> StorageResult<()> {
        self.maybe_fail("complete_multipart")?;
        let upload = self
            .uploads()?
            .remove(upload_id)
            .ok_or_else(|| StorageError::not_found(format!("upload {upload_id} not found")))?;
        let mut numbers: Vec<u32> = upload.parts.keys().copied().collect();
        numbers.sort_unstable();
        let mut data = Vec::new();
        for n in numbers {
            if let Some(part) = upload.parts.get(&n) {
                data.extend_from_slice(part);
            }
        }
        self.objects()?
            .entry(upload.bucket)
            .or_default()
            .insert(upload.key, Arc::new(data));
        Ok(())
    }

    fn abort_multipart(&self, upload_id: &str) -> StorageResult<()> {
        self.uploads()?
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(format!("upload {upload_id} not found")))
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.maybe_fail("delete_object")?;
        self.objects()?
            .get_mut(bucket)
            .and_then(|b| b.remove(key))
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(format!("object {bucket}/{key} not found")))
    }
}

/// Read-only view of a stored object that keeps it alive while being read.
struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// [`ObjectStore`] over the local filesystem: `<root>/<bucket>/<key>`.
///
/// Multipart parts are staged under `<root>/.uploads/<id>/`. Objects are
/// written through an [`AtomicFile`], so a reader never sees a truncated one.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    next_upload: Arc<AtomicU64>,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            next_upload: Arc::new(AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of an object. Rejects keys that would escape the bucket.
    ///
    /// # Errors
    /// `InvalidInput` for empty names, absolute keys or `..` components.
    pub fn object_path(&self, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        validate_name(bucket)?;
        validate_name(key)?;
        Ok(self.root.join(bucket).join(key))
    }

    fn upload_dir(&self, upload_id: &str) -> StorageResult<PathBuf> {
        validate_name(upload_id)?;
        Ok(self.root.join(".uploads").join(upload_id))
    }
}

fn validate_name(name: &str) -> StorageResult<()> {
    let path = Path::new(name);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if name.is_empty() || escapes {
        return Err(StorageError::new(
            StorageErrorKind::InvalidInput,
            format!("invalid object name '{name}'"),
        ));
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

impl ObjectStore for LocalStore {
    fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectMetadata> {
        let meta = fs::metadata(self.object_path(bucket, key)?)?;
        Ok(ObjectMetadata {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: meta.len(),
        })
    }

    fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Box<dyn Read + Send>> {
        let file = File::open(self.object_path(bucket, key)?)?;
        Ok(Box::new(file))
    }

    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.object_path(bucket, key)?;
        ensure_parent(&path)?;
        let mut out = AtomicFile::new(&path)?;
        out.write_all(data)?;
        out.persist()?;
        Ok(())
    }

    fn create_multipart(&self, bucket: &str, key: &str) -> StorageResult<String> {
        let target = self.object_path(bucket, key)?;
        let id = format!(
            "upload-{}-{}",
            std::process::id(),
            self.next_upload.fetch_add(1, Ordering::SeqCst)
        );
        let dir = self.upload_dir(&id)?;
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("target"), target.to_string_lossy().as_bytes())?;
        Ok(id)
    }

    fn upload_part(&self, upload_id: &str, part_number: u32, data: &[u8]) -> StorageResult<()> {
        let dir = self.upload_dir(upload_id)?;
        if !dir.is_dir() {
            return Err(StorageError::not_found(format!("upload {upload_id} not found")));
        }
        fs::write(dir.join(format!("part-{part_number:08}")), data)?;
        Ok(())
    }

    fn complete_multipart(&self, upload_id: &str) -> StorageResult<()> {
        let dir = self.upload_dir(upload_id)?;
        let target = PathBuf::from(fs::read_to_string(dir.join("target"))?);
        let mut parts: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("part-"))
            })
            .collect();
        parts.sort();

        ensure_parent(&target)?;
        let mut out = AtomicFile::new(&target)?;
        for part in parts {
            let mut f = File::open(part)?;
            std::io::copy(&mut f, &mut out)?;
        }
        out.persist()?;
        fs::remove_dir_all(dir)?;
        Ok(())
    }

    fn abort_multipart(&self, upload_id: &str) -> StorageResult<()> {
        fs::remove_dir_all(self.upload_dir(upload_id)?)?;
        Ok(())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        fs::remove_file(self.object_path(bucket, key)?)?;
        Ok(())
    }
}
