//! Shared test host for HTTP integration tests.
//!
//! Drives the real router in-process with `tower::ServiceExt::oneshot`, on
//! top of a memory backend. Signed URLs returned by the API can be fed back
//! through [`TestHost::send_signed`].

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use opsdesk::http::{AppState, router};
use opsdesk::storage::{
    GatewayConfig, HmacUrlSigner, MemoryBackend, ObjectBackend, ObjectLocation,
    ObjectStorageGateway, parse_object_path,
};
use tower::ServiceExt;

pub const BASE_URL: &str = "http://localhost:5000";
pub const BUCKET: &str = "bucket";
pub const PRIVATE_DIR: &str = "/bucket/.private";

/// Backend location a signed URL points at.
pub fn signed_location(signed_url: &str) -> ObjectLocation {
    let path = signed_url
        .strip_prefix(&format!("{BASE_URL}/storage"))
        .and_then(|rest| rest.split('?').next())
        .expect("Signed URL does not point at this host");
    let decoded = percent_encoding::percent_decode_str(path).decode_utf8_lossy();
    parse_object_path(&decoded).expect("Signed URL has no object path")
}

/// Buffered response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn status(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("Response body is not JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Builder for [`TestHost`].
#[derive(Default)]
pub struct TestHostBuilder {
    search_paths: Vec<String>,
    cache_ttl: Option<Duration>,
}

impl TestHostBuilder {
    pub fn search_paths(mut self, paths: &[&str]) -> Self {
        self.search_paths = paths.iter().map(ToString::to_string).collect();
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn start(self) -> TestHost {
        let signer = HmacUrlSigner::new(&format!("{BASE_URL}/storage"), "test-secret", "svc")
            .expect("Failed to create signer");
        let backend = Arc::new(MemoryBackend::new(signer.clone()));

        let search_paths = if self.search_paths.is_empty() {
            vec!["/bucket/public".to_string()]
        } else {
            self.search_paths
        };
        let config = GatewayConfig::new(search_paths, PRIVATE_DIR)
            .with_object_url_base(format!("{BASE_URL}/storage"));
        let gateway = ObjectStorageGateway::from_arc(backend.clone(), config);

        let mut state = AppState::new(gateway, signer);
        if let Some(ttl) = self.cache_ttl {
            state = state.with_download_cache_ttl(ttl);
        }

        TestHost {
            router: router(state),
            backend,
        }
    }
}

/// In-process opsdesk instance.
pub struct TestHost {
    router: Router,
    pub backend: Arc<MemoryBackend>,
}

impl TestHost {
    pub fn builder() -> TestHostBuilder {
        TestHostBuilder::default()
    }

    /// Stores an object directly in the backend.
    pub async fn seed(&self, name: &str, data: &'static [u8]) {
        self.backend
            .put(
                &ObjectLocation::new(BUCKET, name),
                Bytes::from_static(data),
                None,
            )
            .await
            .expect("Failed to seed object");
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            },
            None => Body::empty(),
        };
        self.send(builder.body(body).expect("Failed to build request"))
            .await
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, None, None).await
    }

    pub async fn get_as(&self, uri: &str, user: &str) -> TestResponse {
        self.request(Method::GET, uri, Some(user), None).await
    }

    /// Sends a request to a signed URL returned by the API.
    pub async fn send_signed(
        &self,
        method: Method,
        signed_url: &str,
        body: &'static [u8],
        content_type: Option<&str>,
    ) -> TestResponse {
        let uri = signed_url
            .strip_prefix(BASE_URL)
            .expect("Signed URL does not point at this host");
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header("content-type", ct);
        }
        self.send(
            builder
                .body(Body::from(body))
                .expect("Failed to build request"),
        )
        .await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router is infallible");
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        TestResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }
}
