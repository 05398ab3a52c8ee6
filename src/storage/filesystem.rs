//! Filesystem-backed storage backend.
//!
//! Objects live at `<base_dir>/<bucket>/<name>`; metadata (content type,
//! timestamps, custom entries such as the ACL policy) is tracked in redb.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::io::AsyncReadExt;

use super::backend::{ByteStream, ObjectBackend};
use super::metadata::MetadataStore;
use super::signer::{HmacUrlSigner, SignedUrl};
use super::types::{ObjectLocation, ObjectMeta, SignMethod};
use super::validation::{normalize_location, object_path};
use crate::constants::STREAM_CHUNK_SIZE;

/// Filesystem-backed object storage backend.
///
/// `FilesystemBackend` is `Clone` and can be shared across threads. Blocking
/// filesystem and database work runs on the blocking pool.
#[derive(Clone)]
pub struct FilesystemBackend {
    base_dir: PathBuf,
    meta: MetadataStore,
    signer: HmacUrlSigner,
}

impl FilesystemBackend {
    /// Creates or opens the storage backend at the given base directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Storage directory cannot be created
    /// - Metadata database cannot be opened or initialized
    pub fn open<P: AsRef<Path>>(base_dir: P, signer: HmacUrlSigner) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();

        fs::create_dir_all(&base_dir).with_context(|| {
            format!("Failed to create storage directory: {}", base_dir.display())
        })?;

        let meta = MetadataStore::open(&base_dir.join("metadata.redb"))?;

        Ok(Self {
            base_dir,
            meta,
            signer,
        })
    }

    fn put_sync(
        &self,
        location: &ObjectLocation,
        data: &[u8],
        content_type: Option<&str>,
    ) -> Result<ObjectMeta> {
        let location = normalize_location(location)?;
        let file_path = object_path(&self.base_dir, &location)?;

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directories for: {location}"))?;
        }

        fs::write(&file_path, data)
            .with_context(|| format!("Failed to write object: {location}"))?;

        let content_type = content_type.map(ToString::to_string).or_else(|| {
            mime_guess::from_path(&file_path)
                .first()
                .map(|mime| mime.to_string())
        });

        let now = Utc::now();
        let created_at = self.meta.get(&location.key())?.map_or(now, |m| m.created_at);
        let meta = ObjectMeta {
            location,
            size: data.len() as u64,
            content_type,
            created_at,
            modified_at: now,
            metadata: Default::default(),
        };

        self.meta.put(&meta)?;

        Ok(meta)
    }

    fn head_sync(&self, location: &ObjectLocation) -> Result<Option<ObjectMeta>> {
        let location = normalize_location(location)?;
        let file_path = object_path(&self.base_dir, &location)?;

        if !file_path.is_file() {
            return Ok(None);
        }

        match self.meta.get(&location.key())? {
            Some(meta) => Ok(Some(meta)),
            None => reconstruct(&file_path, location).map(Some),
        }
    }

    fn delete_sync(&self, location: &ObjectLocation) -> Result<bool> {
        let location = normalize_location(location)?;
        let file_path = object_path(&self.base_dir, &location)?;

        // Remove metadata either way so orphaned entries get cleaned up
        self.meta.remove(&location.key())?;

        match fs::remove_file(&file_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to delete object: {location}")),
        }
    }

    fn set_metadata_sync(&self, location: &ObjectLocation, key: &str, value: &str) -> Result<bool> {
        let location = normalize_location(location)?;
        let file_path = object_path(&self.base_dir, &location)?;
        if !file_path.is_file() {
            return Ok(false);
        }

        let record_key = location.key();
        self.meta.set_entry(&record_key, key, value, || {
            reconstruct(&file_path, location).map(Some)
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Self) -> Result<T> + Send + 'static,
    {
        let backend = self.clone();
        tokio::task::spawn_blocking(move || f(backend))
            .await
            .context("Task join error")?
    }
}

/// Rebuilds metadata for a file written outside the service.
fn reconstruct(file_path: &Path, location: ObjectLocation) -> Result<ObjectMeta> {
    let metadata = fs::metadata(file_path)
        .with_context(|| format!("Failed to get file metadata: {location}"))?;
    let modified_at = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    Ok(ObjectMeta {
        size: metadata.len(),
        content_type: mime_guess::from_path(file_path)
            .first()
            .map(|mime| mime.to_string()),
        created_at: modified_at,
        modified_at,
        metadata: Default::default(),
        location,
    })
}

/// Streams a file in fixed-size chunks. The file handle is closed when the
/// stream is dropped, including when a client disconnects mid-download.
fn file_stream(file: tokio::fs::File) -> ByteStream {
    futures::stream::try_unfold(file, |mut file| async move {
        let mut buf = BytesMut::with_capacity(STREAM_CHUNK_SIZE);
        let n = file.read_buf(&mut buf).await?;
        let next = (n > 0).then(|| (buf.freeze(), file));
        Ok::<_, io::Error>(next)
    })
    .boxed()
}

#[async_trait]
impl ObjectBackend for FilesystemBackend {
    async fn put(
        &self,
        location: &ObjectLocation,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<ObjectMeta> {
        let location = location.clone();
        let content_type = content_type.map(ToString::to_string);
        self.blocking(move |b| b.put_sync(&location, &data, content_type.as_deref()))
            .await
    }

    async fn head(&self, location: &ObjectLocation) -> Result<Option<ObjectMeta>> {
        let location = location.clone();
        self.blocking(move |b| b.head_sync(&location)).await
    }

    async fn open_read(&self, location: &ObjectLocation) -> Result<Option<ByteStream>> {
        let location = normalize_location(location)?;
        let file_path = object_path(&self.base_dir, &location)?;
        match tokio::fs::File::open(&file_path).await {
            Ok(file) => Ok(Some(file_stream(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to open object: {location}")),
        }
    }

    async fn delete(&self, location: &ObjectLocation) -> Result<bool> {
        let location = location.clone();
        self.blocking(move |b| b.delete_sync(&location)).await
    }

    async fn set_metadata(
        &self,
        location: &ObjectLocation,
        key: &str,
        value: &str,
    ) -> Result<bool> {
        let location = location.clone();
        let key = key.to_string();
        let value = value.to_string();
        self.blocking(move |b| b.set_metadata_sync(&location, &key, &value))
            .await
    }

    async fn signed_url(
        &self,
        location: &ObjectLocation,
        method: SignMethod,
        ttl: Duration,
    ) -> Result<SignedUrl> {
        let location = normalize_location(location)?;
        Ok(self.signer.sign(&location, method, ttl)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    fn create_backend() -> (FilesystemBackend, TempDir) {
        let tmp = TempDir::new().unwrap();
        let signer = HmacUrlSigner::new("http://localhost:5000/storage", "k", "svc").unwrap();
        let backend = FilesystemBackend::open(tmp.path(), signer).unwrap();
        (backend, tmp)
    }

    #[tokio::test]
    async fn test_put_head_and_stream() {
        let (backend, tmp) = create_backend();
        let loc = ObjectLocation::new("bucket", "public/report.json");

        backend
            .put(&loc, Bytes::from_static(b"{\"ok\":true}"), None)
            .await
            .unwrap();

        assert!(tmp.path().join("bucket/public/report.json").is_file());

        let meta = backend.head(&loc).await.unwrap().unwrap();
        assert_eq!(meta.size, 11);
        assert_eq!(meta.content_type.as_deref(), Some("application/json"));

        let stream = backend.open_read(&loc).await.unwrap().unwrap();
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"{\"ok\":true}");
    }

    #[tokio::test]
    async fn test_large_object_streams_in_chunks() {
        let (backend, _tmp) = create_backend();
        let loc = ObjectLocation::new("bucket", "big.bin");
        let data = vec![7u8; STREAM_CHUNK_SIZE * 2 + 10];

        backend.put(&loc, Bytes::from(data.clone()), None).await.unwrap();

        let stream = backend.open_read(&loc).await.unwrap().unwrap();
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        assert!(chunks.len() >= 3);
        assert_eq!(chunks.concat(), data);
    }

    #[tokio::test]
    async fn test_missing_object() {
        let (backend, _tmp) = create_backend();
        let loc = ObjectLocation::new("bucket", "nope.txt");
        assert!(backend.head(&loc).await.unwrap().is_none());
        assert!(backend.open_read(&loc).await.unwrap().is_none());
        assert!(!backend.delete(&loc).await.unwrap());
        assert!(!backend.set_metadata(&loc, "k", "v").await.unwrap());
    }

    #[tokio::test]
    async fn test_metadata_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let signer = HmacUrlSigner::new("http://localhost:5000/storage", "k", "svc").unwrap();
        let loc = ObjectLocation::new("bucket", "x.txt");
        {
            let backend = FilesystemBackend::open(tmp.path(), signer.clone()).unwrap();
            backend.put(&loc, Bytes::from_static(b"x"), None).await.unwrap();
            backend.set_metadata(&loc, "custom:k", "v").await.unwrap();
        }

        let backend = FilesystemBackend::open(tmp.path(), signer).unwrap();
        let meta = backend.head(&loc).await.unwrap().unwrap();
        assert_eq!(meta.metadata.get("custom:k").map(String::as_str), Some("v"));
    }

    #[tokio::test]
    async fn test_file_without_metadata_is_reconstructed() {
        let (backend, tmp) = create_backend();
        fs::create_dir_all(tmp.path().join("bucket/public")).unwrap();
        fs::write(tmp.path().join("bucket/public/logo.png"), b"png").unwrap();

        let meta = backend
            .head(&ObjectLocation::new("bucket", "public/logo.png"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.size, 3);
        assert_eq!(meta.content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn test_set_metadata_on_unindexed_file() {
        let (backend, tmp) = create_backend();
        fs::create_dir_all(tmp.path().join("bucket/.private/uploads")).unwrap();
        fs::write(tmp.path().join("bucket/.private/uploads/a.txt"), b"abc").unwrap();

        let loc = ObjectLocation::new("bucket", ".private/uploads/a.txt");
        assert!(backend.set_metadata(&loc, "custom:k", "v").await.unwrap());

        let meta = backend.head(&loc).await.unwrap().unwrap();
        assert_eq!(meta.size, 3);
        assert_eq!(meta.metadata.get("custom:k").map(String::as_str), Some("v"));
    }

    #[tokio::test]
    async fn test_delete() {
        let (backend, _tmp) = create_backend();
        let loc = ObjectLocation::new("bucket", "x.txt");
        backend.put(&loc, Bytes::from_static(b"x"), None).await.unwrap();

        assert!(backend.delete(&loc).await.unwrap());
        assert!(backend.head(&loc).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_path_traversal_prevention() {
        let (backend, _tmp) = create_backend();
        for (bucket, name) in [("bucket", "../escape"), ("..", "x"), ("bucket", "/etc/passwd")] {
            let loc = ObjectLocation::new(bucket, name);
            assert!(
                backend.put(&loc, Bytes::from_static(b"x"), None).await.is_err(),
                "accepted {bucket}/{name}"
            );
        }
    }
}
