//! Backend trait for object storage.
//!
//! Defines the interface the gateway needs from a blob store, enabling
//! pluggable storage (filesystem, memory, cloud buckets, etc.).

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use super::signer::SignedUrl;
use super::types::{ObjectLocation, ObjectMeta, SignMethod};

/// Stream of object bytes. Dropping it releases the underlying reader.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Backend trait for object storage.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
/// Errors returned here are unclassified backend failures; absence is
/// reported through `Ok(None)` / `Ok(false)`.
///
/// # Example
///
/// ```ignore
/// use opsdesk::storage::{MemoryBackend, ObjectBackend, ObjectLocation};
///
/// let backend = MemoryBackend::new(signer);
/// let loc = ObjectLocation::new("bucket", "public/logo.png");
/// backend.put(&loc, image_bytes, Some("image/png")).await?;
/// let meta = backend.head(&loc).await?.unwrap();
/// ```
#[async_trait]
pub trait ObjectBackend: Send + Sync + 'static {
    /// Stores an object, replacing any existing one.
    ///
    /// `content_type` is guessed from the object name when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the location is invalid or the write fails.
    async fn put(
        &self,
        location: &ObjectLocation,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<ObjectMeta>;

    /// Retrieves object metadata without reading the object.
    ///
    /// # Errors
    ///
    /// Returns an error if the location is invalid or metadata cannot be read.
    async fn head(&self, location: &ObjectLocation) -> Result<Option<ObjectMeta>>;

    /// Checks whether an object exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the existence check itself fails.
    async fn exists(&self, location: &ObjectLocation) -> Result<bool> {
        Ok(self.head(location).await?.is_some())
    }

    /// Opens a byte stream over the object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be opened.
    async fn open_read(&self, location: &ObjectLocation) -> Result<Option<ByteStream>>;

    /// Deletes an object. Returns `Ok(false)` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    async fn delete(&self, location: &ObjectLocation) -> Result<bool>;

    /// Sets one custom metadata entry. Returns `Ok(false)` if the object
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata write fails.
    async fn set_metadata(&self, location: &ObjectLocation, key: &str, value: &str)
    -> Result<bool>;

    /// Mints a signed URL for one operation on one object.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    async fn signed_url(
        &self,
        location: &ObjectLocation,
        method: SignMethod,
        ttl: Duration,
    ) -> Result<SignedUrl>;
}
