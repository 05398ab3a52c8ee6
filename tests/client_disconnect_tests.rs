//! Download behaviour when the backend stream breaks or the client goes away.
//!
//! Headers are sent before the body is read, so a backend failure after the
//! first chunk can only abort the body. A client that disconnects drops the
//! response body, which must release the backend reader.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::http::{StatusCode, header};
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use http_body_util::BodyExt;
use opsdesk::storage::{
    ByteStream, GatewayConfig, HmacUrlSigner, MemoryBackend, ObjectBackend, ObjectLocation,
    ObjectMeta, ObjectStorageGateway, SignMethod, SignedUrl,
};

const BASE: &str = "http://localhost:5000/storage";
const OBJECT_PATH: &str = "/objects/uploads/a.txt";

#[derive(Clone, Copy)]
enum ReadMode {
    /// One chunk, then an I/O error.
    FailAfterFirstChunk,
    /// One chunk, then nothing ever again.
    StallAfterFirstChunk,
}

/// Flips the flag when the reader holding it is dropped.
struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Memory backend whose reads misbehave after the first chunk.
struct FlakyBackend {
    inner: MemoryBackend,
    mode: ReadMode,
    released: Arc<AtomicBool>,
}

#[async_trait]
impl ObjectBackend for FlakyBackend {
    async fn put(
        &self,
        location: &ObjectLocation,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<ObjectMeta> {
        self.inner.put(location, data, content_type).await
    }

    async fn head(&self, location: &ObjectLocation) -> Result<Option<ObjectMeta>> {
        self.inner.head(location).await
    }

    async fn open_read(&self, location: &ObjectLocation) -> Result<Option<ByteStream>> {
        if self.inner.head(location).await?.is_none() {
            return Ok(None);
        }

        let first = Bytes::from_static(b"first chunk");
        let stream = match self.mode {
            ReadMode::FailAfterFirstChunk => stream::iter(vec![
                Ok(first),
                Err(io::Error::other("disk went away")),
            ])
            .boxed(),
            ReadMode::StallAfterFirstChunk => {
                let guard = ReleaseGuard(self.released.clone());
                stream::unfold((Some(first), guard), |(next, guard)| async move {
                    match next {
                        Some(chunk) => Some((Ok::<_, io::Error>(chunk), (None, guard))),
                        None => std::future::pending().await,
                    }
                })
                .boxed()
            },
        };
        Ok(Some(stream))
    }

    async fn delete(&self, location: &ObjectLocation) -> Result<bool> {
        self.inner.delete(location).await
    }

    async fn set_metadata(
        &self,
        location: &ObjectLocation,
        key: &str,
        value: &str,
    ) -> Result<bool> {
        self.inner.set_metadata(location, key, value).await
    }

    async fn signed_url(
        &self,
        location: &ObjectLocation,
        method: SignMethod,
        ttl: Duration,
    ) -> Result<SignedUrl> {
        self.inner.signed_url(location, method, ttl).await
    }
}

async fn create_gateway(mode: ReadMode) -> (ObjectStorageGateway, Arc<AtomicBool>) {
    let released = Arc::new(AtomicBool::new(false));
    let signer = HmacUrlSigner::new(BASE, "secret", "svc").unwrap();
    let backend = FlakyBackend {
        inner: MemoryBackend::new(signer),
        mode,
        released: released.clone(),
    };
    let config = GatewayConfig::new(vec!["/bucket/public".into()], "/bucket/.private")
        .with_object_url_base(BASE);
    let gateway = ObjectStorageGateway::new(backend, config);

    gateway
        .backend()
        .put(
            &ObjectLocation::new("bucket", ".private/uploads/a.txt"),
            Bytes::from_static(b"first chunk and the rest of the file"),
            Some("text/plain"),
        )
        .await
        .unwrap();

    (gateway, released)
}

// =============================================================================
// Backend failures mid-stream
// =============================================================================

#[tokio::test]
async fn test_mid_stream_failure_aborts_body() {
    let (gateway, _released) = create_gateway(ReadMode::FailAfterFirstChunk).await;
    let handle = gateway.resolve_private_object(OBJECT_PATH).await.unwrap();

    let response = gateway.stream_download(&handle, None).await;

    // Headers were already committed when the read failed.
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(header::CONTENT_LENGTH));

    let collected = response.into_body().collect().await;
    assert!(collected.is_err());
}

// =============================================================================
// Client disconnects
// =============================================================================

#[tokio::test]
async fn test_dropping_body_releases_reader() {
    let (gateway, released) = create_gateway(ReadMode::StallAfterFirstChunk).await;
    let handle = gateway.resolve_private_object(OBJECT_PATH).await.unwrap();

    let response = gateway.stream_download(&handle, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body();
    let frame = body.frame().await.unwrap().unwrap();
    assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"first chunk"));
    assert!(!released.load(Ordering::SeqCst));

    drop(body);
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_downloads_continue_after_disconnect() {
    let (gateway, released) = create_gateway(ReadMode::StallAfterFirstChunk).await;
    let handle = gateway.resolve_private_object(OBJECT_PATH).await.unwrap();

    let mut abandoned = gateway.stream_download(&handle, None).await.into_body();
    abandoned.frame().await.unwrap().unwrap();
    drop(abandoned);
    assert!(released.load(Ordering::SeqCst));

    let mut next = gateway.stream_download(&handle, None).await.into_body();
    let frame = next.frame().await.unwrap().unwrap();
    assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"first chunk"));
}
