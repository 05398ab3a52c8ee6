//! HTTP surface of the opsdesk daemon.
//!
//! Routes:
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /health` | liveness and database pool state |
//! | `GET /metrics` | Prometheus exposition |
//! | `GET /public-objects/{*path}` | public asset download |
//! | `POST /api/objects/upload` | reserve a private object, get a signed upload URL |
//! | `PUT /api/objects/acl` | attach an access policy to an uploaded object |
//! | `GET /api/objects/read-url?path=` | short-lived signed read URL |
//! | `GET /objects/{*path}` | private object download |
//! | `GET/HEAD/PUT/DELETE /storage/{bucket}/{*name}` | signed URL endpoint |

pub(crate) mod audit;
mod handlers;
pub mod metrics;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info, warn};

use crate::bootstrap;
use crate::constants::{DOWNLOAD_CACHE_TTL, MAX_UPLOAD_BYTES, REQUEST_TIMEOUT, USER_ID_HEADER};
use crate::storage::{HmacUrlSigner, ObjectStorageGateway, StorageError};

// =============================================================================
// State
// =============================================================================

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: ObjectStorageGateway,
    /// Verifies URLs presented to `/storage`. Must match the backend's signer.
    pub signer: HmacUrlSigner,
    pub db: Option<PgPool>,
    pub metrics: Option<PrometheusHandle>,
    pub download_cache_ttl: Duration,
    pub request_timeout: Duration,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(gateway: ObjectStorageGateway, signer: HmacUrlSigner) -> Self {
        Self {
            gateway,
            signer,
            db: None,
            metrics: None,
            download_cache_ttl: DOWNLOAD_CACHE_TTL,
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_database(mut self, pool: PgPool) -> Self {
        self.db = Some(pool);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    #[must_use]
    pub fn with_download_cache_ttl(mut self, ttl: Duration) -> Self {
        self.download_cache_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Handler error, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::Internal(msg) => {
                error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            },
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => Self::NotFound("Object not found".to_string()),
            StorageError::InvalidInput(msg) => Self::BadRequest(msg),
            StorageError::InvalidSignature => Self::Forbidden("Invalid signature".to_string()),
            StorageError::Expired => Self::Forbidden("Signed URL expired".to_string()),
            StorageError::Backend(e) => Self::Internal(format!("{e:#}")),
        }
    }
}

// =============================================================================
// Router
// =============================================================================

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let timeout = state.request_timeout;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(USER_ID_HEADER),
        ])
        .max_age(Duration::from_secs(60 * 60));

    let storage = get(handlers::storage_get)
        .head(handlers::storage_head)
        .put(handlers::storage_put)
        .delete(handlers::storage_delete)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/public-objects/{*path}", get(handlers::public_object))
        .route("/api/objects/upload", post(handlers::create_upload))
        .route("/api/objects/acl", put(handlers::set_acl))
        .route("/api/objects/read-url", get(handlers::read_url))
        .route("/objects/{*path}", get(handlers::private_object))
        .route("/storage/{bucket}/{*name}", storage)
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Caller identity from the `X-User-Id` header.
pub(crate) fn caller(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// `Cache-Control` value for responses that must never be cached.
pub(crate) fn no_store() -> (HeaderName, HeaderValue) {
    (header::CACHE_CONTROL, HeaderValue::from_static("no-store"))
}

// =============================================================================
// Server
// =============================================================================

/// Binds `host:port` and serves until Ctrl-C or SIGTERM.
///
/// The host is resolved through [`bootstrap::lookup_host`] so the IPv4
/// preference set at start-up applies to the listener too.
///
/// # Errors
///
/// Returns an error if the address cannot be resolved or bound, or if the
/// server fails.
pub async fn serve(host: &str, port: u16, state: AppState) -> Result<()> {
    let addrs = bootstrap::lookup_host(host, port)
        .await
        .with_context(|| format!("Failed to resolve listen address {host}:{port}"))?;
    let addr = addrs
        .first()
        .copied()
        .with_context(|| format!("No address found for {host}:{port}"))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "opsdesk listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("opsdesk stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            },
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
