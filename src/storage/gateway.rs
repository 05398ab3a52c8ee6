//! Object storage gateway.
//!
//! Maps the application's logical object paths onto backend locations:
//!
//! - public assets are looked up across an ordered list of search paths
//! - private objects live under a single private root and are addressed as
//!   `/objects/<entity-id>`
//! - uploads get a fresh id and a short-lived signed `PUT` URL
//! - downloads are streamed with a `Cache-Control` header that mirrors the
//!   object's visibility policy
//!
//! Every failure to map a private path (bad prefix, traversal, missing
//! object) surfaces as [`StorageError::NotFound`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use percent_encoding::percent_decode_str;
use serde::Serialize;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::acl::{self, ObjectAclPolicy, ObjectPermission};
use super::backend::ObjectBackend;
use super::error::{Result, StorageError};
use super::signer::SignedUrl;
use super::types::{ObjectLocation, SignMethod};
use super::validation::{
    join_object_path, normalize_private_dir, parse_object_path, validate_path,
};
use crate::constants::{
    ACL_POLICY_METADATA_KEY, DEFAULT_CONTENT_TYPE, DOWNLOAD_CACHE_TTL, OBJECTS_PREFIX,
    READ_URL_TTL, UPLOAD_URL_TTL, UPLOADS_DIR,
};

/// Longest accepted upload extension.
const MAX_EXTENSION_LEN: usize = 16;

/// Immutable gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// `/bucket/prefix` entries searched in order for public assets.
    pub public_search_paths: Vec<String>,
    /// `/bucket/prefix/` root of private objects, always `/`-terminated.
    pub private_dir: String,
    /// Base URL under which raw backend object URLs appear. Used to map such
    /// URLs back to logical paths.
    pub object_url_base: Option<String>,
}

impl GatewayConfig {
    pub fn new(public_search_paths: Vec<String>, private_dir: &str) -> Self {
        Self {
            public_search_paths,
            private_dir: normalize_private_dir(private_dir),
            object_url_base: None,
        }
    }

    #[must_use]
    pub fn with_object_url_base(mut self, base: impl Into<String>) -> Self {
        self.object_url_base = Some(base.into());
        self
    }
}

/// A located object, public or private.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHandle {
    location: ObjectLocation,
}

impl ObjectHandle {
    pub fn location(&self) -> &ObjectLocation {
        &self.location
    }
}

/// Result of [`ObjectStorageGateway::create_upload_target`].
#[derive(Debug, Clone, Serialize)]
pub struct UploadTarget {
    /// Signed `PUT` URL the client uploads to.
    #[serde(rename = "uploadURL")]
    pub upload_url: String,
    #[serde(rename = "objectPath")]
    pub object_path: String,
    #[serde(skip)]
    pub signed: SignedUrl,
}

/// Gateway between logical object paths and an [`ObjectBackend`].
///
/// Cheap to clone; all clones share the backend and configuration.
#[derive(Clone)]
pub struct ObjectStorageGateway {
    backend: Arc<dyn ObjectBackend>,
    config: Arc<GatewayConfig>,
}

impl std::fmt::Debug for ObjectStorageGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStorageGateway")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ObjectStorageGateway {
    pub fn new<B: ObjectBackend>(backend: B, config: GatewayConfig) -> Self {
        Self::from_arc(Arc::new(backend), config)
    }

    pub fn from_arc(backend: Arc<dyn ObjectBackend>, config: GatewayConfig) -> Self {
        Self {
            backend,
            config: Arc::new(config),
        }
    }

    pub fn backend(&self) -> &Arc<dyn ObjectBackend> {
        &self.backend
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    // =========================================================================
    // Public assets
    // =========================================================================

    /// Finds `relative` under the first search path that holds it.
    ///
    /// Search paths are tried in configuration order; later ones are not
    /// consulted once a match is found. A relative path that tries to
    /// escape its prefix is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself fails.
    pub async fn locate_public_object(&self, relative: &str) -> Result<Option<ObjectHandle>> {
        if validate_path(relative.trim_start_matches('/')).is_err() {
            debug!(path = %relative, "Rejected public object path");
            return Ok(None);
        }

        for prefix in &self.config.public_search_paths {
            let full = join_object_path(prefix, relative);
            let location = match parse_object_path(&full) {
                Ok(location) => location,
                Err(e) => {
                    warn!(search_path = %prefix, error = %e, "Skipping malformed search path");
                    continue;
                },
            };

            if self.backend.exists(&location).await? {
                debug!(path = %relative, search_path = %prefix, "Public object found");
                return Ok(Some(ObjectHandle { location }));
            }
        }

        Ok(None)
    }

    // =========================================================================
    // Private objects
    // =========================================================================

    /// Reserves a fresh private object and signs a 15-minute upload URL.
    ///
    /// The extension is optional; a leading `.` is accepted and stripped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidInput`] for an extension that is not
    /// short and alphanumeric, or a backend error if signing fails.
    pub async fn create_upload_target(&self, extension: Option<&str>) -> Result<UploadTarget> {
        let suffix = match extension.map(|e| e.trim().trim_start_matches('.')) {
            None | Some("") => String::new(),
            Some(ext) => {
                if ext.len() > MAX_EXTENSION_LEN || !ext.chars().all(|c| c.is_ascii_alphanumeric())
                {
                    return Err(StorageError::InvalidInput(format!(
                        "unsupported file extension: {ext:?}"
                    )));
                }
                format!(".{}", ext.to_ascii_lowercase())
            },
        };

        let entity_id = format!("{UPLOADS_DIR}/{}{suffix}", Uuid::new_v4());
        let location = parse_object_path(&format!("{}{entity_id}", self.config.private_dir))
            .context("Private object directory is misconfigured")?;

        let signed = self
            .backend
            .signed_url(&location, SignMethod::Put, UPLOAD_URL_TTL)
            .await?;

        debug!(location = %location, "Created upload target");

        Ok(UploadTarget {
            upload_url: signed.url.clone(),
            object_path: format!("{OBJECTS_PREFIX}{entity_id}"),
            signed,
        })
    }

    /// Maps a `/objects/<entity-id>` path to an existing private object.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when the prefix is missing, the
    /// entity id is malformed, or the backend has no such object.
    pub async fn resolve_private_object(&self, logical: &str) -> Result<ObjectHandle> {
        let location = self.private_location(logical)?;
        if !self.backend.exists(&location).await? {
            return Err(StorageError::NotFound);
        }
        Ok(ObjectHandle { location })
    }

    fn private_location(&self, logical: &str) -> Result<ObjectLocation> {
        let entity_id = logical
            .strip_prefix(OBJECTS_PREFIX)
            .ok_or(StorageError::NotFound)?;
        validate_path(entity_id).map_err(|_| StorageError::NotFound)?;
        parse_object_path(&format!("{}{entity_id}", self.config.private_dir))
            .map_err(|_| StorageError::NotFound)
    }

    /// Signs a fresh `GET` URL for a private object. Defaults to 300 seconds.
    ///
    /// # Errors
    ///
    /// Same as [`Self::resolve_private_object`], plus backend signing errors.
    pub async fn mint_read_url(&self, logical: &str, ttl: Option<Duration>) -> Result<SignedUrl> {
        let handle = self.resolve_private_object(logical).await?;
        Ok(self
            .backend
            .signed_url(&handle.location, SignMethod::Get, ttl.unwrap_or(READ_URL_TTL))
            .await?)
    }

    /// Maps a raw backend object URL back to its logical path.
    ///
    /// URLs outside the configured object base are returned unchanged. URLs
    /// inside it but outside the private root come back as their plain
    /// `/bucket/name` path.
    pub fn normalize_object_entity_path(&self, raw: &str) -> String {
        let Some(base) = self.config.object_url_base.as_deref() else {
            return raw.to_string();
        };
        let Some(rest) = raw.strip_prefix(base.trim_end_matches('/')) else {
            return raw.to_string();
        };
        if !rest.starts_with('/') {
            return raw.to_string();
        }

        let path = rest.split(['?', '#']).next().unwrap_or_default();
        let path = percent_decode_str(path).decode_utf8_lossy();

        match path.strip_prefix(self.config.private_dir.as_str()) {
            Some(entity_id) => format!("{OBJECTS_PREFIX}{entity_id}"),
            None => path.into_owned(),
        }
    }

    // =========================================================================
    // Access control
    // =========================================================================

    /// Attaches `policy` to the object behind `raw_path` (logical path or raw
    /// backend URL) and returns the normalized logical path.
    ///
    /// Paths that do not normalize to a logical path are returned untouched
    /// without attaching anything.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the object does not exist.
    pub async fn set_object_acl_policy(
        &self,
        raw_path: &str,
        policy: &ObjectAclPolicy,
    ) -> Result<String> {
        let normalized = self.normalize_object_entity_path(raw_path);
        if !normalized.starts_with('/') {
            return Ok(normalized);
        }

        let handle = self.resolve_private_object(&normalized).await?;
        let updated = self
            .backend
            .set_metadata(&handle.location, ACL_POLICY_METADATA_KEY, &policy.to_json()?)
            .await?;
        if !updated {
            return Err(StorageError::NotFound);
        }

        debug!(path = %normalized, owner = %policy.owner, "ACL policy set");
        Ok(normalized)
    }

    /// Reads the policy attached to an object.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the object disappeared, or a
    /// backend error for an unreadable policy.
    pub async fn get_object_acl_policy(
        &self,
        handle: &ObjectHandle,
    ) -> Result<Option<ObjectAclPolicy>> {
        let meta = self
            .backend
            .head(&handle.location)
            .await?
            .ok_or(StorageError::NotFound)?;
        Ok(acl::policy_from_meta(&meta)?)
    }

    /// Checks `requested` for `user_id` against the object's policy.
    ///
    /// # Errors
    ///
    /// Same as [`Self::get_object_acl_policy`].
    pub async fn can_access_object(
        &self,
        user_id: Option<&str>,
        handle: &ObjectHandle,
        requested: ObjectPermission,
    ) -> Result<bool> {
        let policy = self.get_object_acl_policy(handle).await?;
        Ok(acl::can_access(user_id, policy.as_ref(), requested))
    }

    // =========================================================================
    // Downloads
    // =========================================================================

    /// Streams an object as an HTTP response.
    ///
    /// `Cache-Control` is `public` only when the object's policy says so;
    /// objects without a policy are cached privately. The body is read from
    /// the backend chunk by chunk. If anything fails before the headers are
    /// built the response is a 500 with a fixed message; a failure after that
    /// aborts the body stream.
    pub async fn stream_download(
        &self,
        handle: &ObjectHandle,
        cache_ttl: Option<Duration>,
    ) -> Response {
        match self.prepare_download(handle, cache_ttl).await {
            Ok(response) => response,
            Err(e) => {
                error!(location = %handle.location, error = %e, "Error downloading file");
                (StatusCode::INTERNAL_SERVER_ERROR, "Error downloading file").into_response()
            },
        }
    }

    async fn prepare_download(
        &self,
        handle: &ObjectHandle,
        cache_ttl: Option<Duration>,
    ) -> Result<Response> {
        let meta = self
            .backend
            .head(&handle.location)
            .await?
            .ok_or(StorageError::NotFound)?;
        let is_public = acl::policy_from_meta(&meta)?.is_some_and(|p| p.is_public());

        let stream = self
            .backend
            .open_read(&handle.location)
            .await?
            .ok_or(StorageError::NotFound)?;

        let location = handle.location.clone();
        let body = Body::from_stream(stream.inspect_err(move |e| {
            warn!(location = %location, error = %e, "Download stream aborted");
        }));

        let scope = if is_public { "public" } else { "private" };
        let max_age = cache_ttl.unwrap_or(DOWNLOAD_CACHE_TTL).as_secs();

        let response = Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                meta.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE),
            )
            .header(header::CONTENT_LENGTH, meta.size)
            .header(header::CACHE_CONTROL, format!("{scope}, max-age={max_age}"))
            .body(body)
            .context("Failed to build download response")?;

        Ok(response)
    }
}
