//! In-memory storage backend.
//!
//! Provides a fast, non-persistent object store using DashMap for
//! concurrent access. Used by tests and for running without a disk.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use futures::StreamExt;

use super::backend::{ByteStream, ObjectBackend};
use super::signer::{HmacUrlSigner, SignedUrl};
use super::types::{ObjectLocation, ObjectMeta, SignMethod};
use super::validation::normalize_location;

/// Entry stored in the memory backend.
#[derive(Clone)]
struct MemoryObject {
    data: Bytes,
    meta: ObjectMeta,
}

/// In-memory object storage backend using DashMap.
///
/// All data is lost when the process exits. Signed URLs point at the
/// service's own `/storage` endpoint through the configured signer.
#[derive(Clone)]
pub struct MemoryBackend {
    data: DashMap<String, MemoryObject>,
    signer: HmacUrlSigner,
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    pub fn new(signer: HmacUrlSigner) -> Self {
        Self {
            data: DashMap::new(),
            signer,
        }
    }
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    async fn put(
        &self,
        location: &ObjectLocation,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<ObjectMeta> {
        let location = normalize_location(location)?;

        let content_type = content_type.map(ToString::to_string).or_else(|| {
            mime_guess::from_path(&location.name)
                .first()
                .map(|mime| mime.to_string())
        });

        let now = Utc::now();
        let created_at = self
            .data
            .get(&location.key())
            .map_or(now, |entry| entry.meta.created_at);
        let meta = ObjectMeta {
            location: location.clone(),
            size: data.len() as u64,
            content_type,
            created_at,
            modified_at: now,
            metadata: Default::default(),
        };

        self.data.insert(
            location.key(),
            MemoryObject {
                data,
                meta: meta.clone(),
            },
        );

        Ok(meta)
    }

    async fn head(&self, location: &ObjectLocation) -> Result<Option<ObjectMeta>> {
        let key = normalize_location(location)?.key();
        Ok(self.data.get(&key).map(|entry| entry.meta.clone()))
    }

    async fn open_read(&self, location: &ObjectLocation) -> Result<Option<ByteStream>> {
        let key = normalize_location(location)?.key();
        Ok(self.data.get(&key).map(|entry| {
            let data = entry.data.clone();
            futures::stream::once(async move { Ok(data) }).boxed()
        }))
    }

    async fn delete(&self, location: &ObjectLocation) -> Result<bool> {
        let key = normalize_location(location)?.key();
        Ok(self.data.remove(&key).is_some())
    }

    async fn set_metadata(
        &self,
        location: &ObjectLocation,
        key: &str,
        value: &str,
    ) -> Result<bool> {
        let object_key = normalize_location(location)?.key();
        let Some(mut entry) = self.data.get_mut(&object_key) else {
            return Ok(false);
        };
        entry
            .meta
            .metadata
            .insert(key.to_string(), value.to_string());
        entry.meta.modified_at = Utc::now();
        Ok(true)
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
