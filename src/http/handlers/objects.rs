//! Object handlers: public assets, private objects, uploads and ACLs.

use std::time::Duration;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::super::audit::{AuditEvent, log_audit_event};
use super::super::{AppError, AppState, SharedState, caller, metrics, no_store};
use crate::constants::OBJECTS_PREFIX;
use crate::storage::{
    ObjectAclPolicy, ObjectAclRule, ObjectHandle, ObjectPermission, ObjectVisibility, UploadTarget,
    can_access,
};

/// Longest read URL lifetime a caller may ask for.
const MAX_READ_URL_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UploadRequest {
    #[serde(default)]
    extension: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AclRequest {
    /// Logical path or the raw upload URL returned earlier.
    #[serde(alias = "objectURL", alias = "objectUrl")]
    object_path: String,
    #[serde(default = "default_visibility")]
    visibility: ObjectVisibility,
    #[serde(default)]
    acl_rules: Vec<ObjectAclRule>,
}

fn default_visibility() -> ObjectVisibility {
    ObjectVisibility::Private
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AclResponse {
    object_path: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReadUrlQuery {
    path: String,
    /// Lifetime in seconds.
    #[serde(default)]
    ttl: Option<u64>,
}

fn require_user(headers: &HeaderMap) -> Result<String, AppError> {
    caller(headers).ok_or_else(|| AppError::Unauthorized("Missing X-User-Id header".to_string()))
}

/// Checks the object's policy for the calling user.
///
/// Anonymous callers get 401, identified ones 403.
async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    handle: &ObjectHandle,
    permission: ObjectPermission,
) -> Result<(), AppError> {
    let user_id = caller(headers);
    if state
        .gateway
        .can_access_object(user_id.as_deref(), handle, permission)
        .await?
    {
        return Ok(());
    }

    metrics::record_rejection("acl");
    log_audit_event(AuditEvent::AccessDenied {
        path: handle.location().to_string(),
        user_id: user_id.clone(),
        permission: permission.as_str(),
    });

    Err(match user_id {
        None => AppError::Unauthorized("Authentication required".to_string()),
        Some(_) => AppError::Forbidden("Access denied".to_string()),
    })
}

/// GET /public-objects/{*path} - Download a public asset.
pub(crate) async fn public_object(
    State(state): State<SharedState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    metrics::record_object_operation("public_get");
    let handle = state
        .gateway
        .locate_public_object(&path)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    metrics::record_download("public_search_path");
    Ok(state
        .gateway
        .stream_download(&handle, Some(state.download_cache_ttl))
        .await)
}

/// GET /objects/{*path} - Download a private object the caller may read.
pub(crate) async fn private_object(
    State(state): State<SharedState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    metrics::record_object_operation("private_get");
    let logical = format!("{OBJECTS_PREFIX}{path}");
    let handle = state.gateway.resolve_private_object(&logical).await?;
    authorize(&state, &headers, &handle, ObjectPermission::Read).await?;

    metrics::record_download("private_dir");
    Ok(state
        .gateway
        .stream_download(&handle, Some(state.download_cache_ttl))
        .await)
}

/// POST /api/objects/upload - Reserve a private object and sign its upload URL.
///
/// Body is optional: `{"extension": "png"}`.
pub(crate) async fn create_upload(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadTarget>, AppError> {
    metrics::record_object_operation("upload_target");
    let user_id = require_user(&headers)?;

    let request: UploadRequest = if body.iter().all(u8::is_ascii_whitespace) {
        UploadRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?
    };

    let target = state
        .gateway
        .create_upload_target(request.extension.as_deref())
        .await?;

    log_audit_event(AuditEvent::UploadTargetIssued {
        object_path: target.object_path.clone(),
        user_id,
    });

    Ok(Json(target))
}

/// PUT /api/objects/acl - Attach an access policy to an uploaded object.
///
/// The first policy makes the caller the owner. Replacing an existing policy
/// requires write access under it; the owner is kept.
pub(crate) async fn set_acl(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(request): Json<AclRequest>,
) -> Result<Json<AclResponse>, AppError> {
    metrics::record_object_operation("set_acl");
    let user_id = require_user(&headers)?;

    let normalized = state
        .gateway
        .normalize_object_entity_path(&request.object_path);
    if !normalized.starts_with(OBJECTS_PREFIX) {
        return Err(AppError::BadRequest(format!(
            "Not a private object path: {}",
            request.object_path
        )));
    }

    let handle = state.gateway.resolve_private_object(&normalized).await?;
    let existing = state.gateway.get_object_acl_policy(&handle).await?;
    if let Some(existing) = &existing
        && !can_access(Some(&user_id), Some(existing), ObjectPermission::Write)
    {
        metrics::record_rejection("acl");
        log_audit_event(AuditEvent::AccessDenied {
            path: normalized,
            user_id: Some(user_id),
            permission: ObjectPermission::Write.as_str(),
        });
        return Err(AppError::Forbidden("Access denied".to_string()));
    }

    let policy = ObjectAclPolicy {
        owner: existing.map_or_else(|| user_id.clone(), |p| p.owner),
        visibility: request.visibility,
        acl_rules: request.acl_rules,
    };
    let object_path = state
        .gateway
        .set_object_acl_policy(&normalized, &policy)
        .await?;

    log_audit_event(AuditEvent::AclChanged {
        path: object_path.clone(),
        user_id,
        visibility: policy.visibility.as_str(),
    });

    Ok(Json(AclResponse { object_path }))
}

/// GET /api/objects/read-url?path=&ttl= - Mint a short-lived read URL.
pub(crate) async fn read_url(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<ReadUrlQuery>,
) -> Result<impl IntoResponse, AppError> {
    metrics::record_object_operation("read_url");

    let ttl = query.ttl.map(Duration::from_secs);
    if ttl.is_some_and(|ttl| ttl.is_zero() || ttl > MAX_READ_URL_TTL) {
        return Err(AppError::BadRequest(format!(
            "ttl must be between 1 and {} seconds",
            MAX_READ_URL_TTL.as_secs()
        )));
    }

    let handle = state.gateway.resolve_private_object(&query.path).await?;
    authorize(&state, &headers, &handle, ObjectPermission::Read).await?;

    let signed = state.gateway.mint_read_url(&query.path, ttl).await?;
    Ok(([no_store()], Json(signed)))
}
