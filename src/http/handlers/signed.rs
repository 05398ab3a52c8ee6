//! Signed URL endpoint of the built-in backends.
//!
//! Every request must carry the query parameters minted by
//! [`HmacUrlSigner::sign`](crate::storage::HmacUrlSigner::sign) for the same
//! method, bucket and object name. Responses are never cached.

use anyhow::Context;
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};

use super::super::audit::{AuditEvent, log_audit_event};
use super::super::{AppError, AppState, SharedState, metrics, no_store};
use crate::constants::DEFAULT_CONTENT_TYPE;
use crate::storage::{ObjectLocation, ObjectMeta, SignMethod, SignatureParams, StorageError};

type SignedQuery = Result<Query<SignatureParams>, QueryRejection>;

fn check_signature(
    state: &AppState,
    location: &ObjectLocation,
    method: SignMethod,
    query: SignedQuery,
) -> Result<(), AppError> {
    let outcome = match query {
        Ok(Query(params)) => state.signer.verify(location, method, &params),
        Err(_) => Err(StorageError::InvalidSignature),
    };

    outcome.map_err(|e| {
        metrics::record_rejection("signature");
        log_audit_event(AuditEvent::SignatureRejected {
            location: location.to_string(),
            method: method.as_str(),
            reason: e.to_string(),
        });
        AppError::from(e)
    })
}

async fn head_or_404(state: &AppState, location: &ObjectLocation) -> Result<ObjectMeta, AppError> {
    state
        .gateway
        .backend()
        .head(location)
        .await?
        .ok_or_else(|| AppError::NotFound("Object not found".to_string()))
}

fn object_headers(meta: &ObjectMeta) -> axum::http::response::Builder {
    let (cache_name, cache_value) = no_store();
    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            meta.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE),
        )
        .header(header::CONTENT_LENGTH, meta.size)
        .header(cache_name, cache_value)
}

/// GET /storage/{bucket}/{*name} - Download through a signed URL.
pub(crate) async fn storage_get(
    State(state): State<SharedState>,
    Path((bucket, name)): Path<(String, String)>,
    query: SignedQuery,
) -> Result<Response, AppError> {
    metrics::record_object_operation("signed_get");
    let location = ObjectLocation::new(bucket, name);
    check_signature(&state, &location, SignMethod::Get, query)?;

    let meta = head_or_404(&state, &location).await?;
    let stream = state
        .gateway
        .backend()
        .open_read(&location)
        .await?
        .ok_or_else(|| AppError::NotFound("Object not found".to_string()))?;

    let response = object_headers(&meta)
        .body(Body::from_stream(stream))
        .context("Failed to build response")?;
    Ok(response)
}

/// HEAD /storage/{bucket}/{*name} - Object metadata through a signed URL.
pub(crate) async fn storage_head(
    State(state): State<SharedState>,
    Path((bucket, name)): Path<(String, String)>,
    query: SignedQuery,
) -> Result<Response, AppError> {
    metrics::record_object_operation("signed_head");
    let location = ObjectLocation::new(bucket, name);
    check_signature(&state, &location, SignMethod::Head, query)?;

    let meta = head_or_404(&state, &location).await?;
    let response = object_headers(&meta)
        .body(Body::empty())
        .context("Failed to build response")?;
    Ok(response)
}

/// PUT /storage/{bucket}/{*name} - Upload through a signed URL.
pub(crate) async fn storage_put(
    State(state): State<SharedState>,
    Path((bucket, name)): Path<(String, String)>,
    query: SignedQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    metrics::record_object_operation("signed_put");
    let location = ObjectLocation::new(bucket, name);
    check_signature(&state, &location, SignMethod::Put, query)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let meta = state
        .gateway
        .backend()
        .put(&location, body, content_type)
        .await?;

    Ok(([no_store()], Json(meta)))
}

/// DELETE /storage/{bucket}/{*name} - Delete through a signed URL.
pub(crate) async fn storage_delete(
    State(state): State<SharedState>,
    Path((bucket, name)): Path<(String, String)>,
    query: SignedQuery,
) -> Result<StatusCode, AppError> {
    metrics::record_object_operation("signed_delete");
    let location = ObjectLocation::new(bucket, name);
    check_signature(&state, &location, SignMethod::Delete, query)?;

    if state.gateway.backend().delete(&location).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Object not found".to_string()))
    }
}
