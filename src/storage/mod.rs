//! Object storage for opsdesk.
//!
//! The [`ObjectStorageGateway`] maps logical object paths onto a pluggable
//! [`ObjectBackend`]. Two backends ship with the crate:
//!
//! - [`MemoryBackend`]: DashMap-backed, used by tests and ephemeral runs
//! - [`FilesystemBackend`]: objects on disk, metadata in redb
//!
//! Both mint HMAC-signed URLs that point back at this service's
//! `/storage/{bucket}/{*name}` endpoint.
//!
//! Security features:
//! - Path traversal protection on every object name
//! - Constant-time signature comparison
//! - Uniform not-found for every private path that fails to map

mod acl;
mod backend;
mod error;
mod filesystem;
mod gateway;
mod memory;
mod metadata;
mod signer;
mod types;
mod validation;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use acl::{
    AccessGroup, ObjectAclPolicy, ObjectAclRule, ObjectPermission, ObjectVisibility, can_access,
    policy_from_meta,
};
pub use backend::{ByteStream, ObjectBackend};
pub use error::StorageError;
pub use filesystem::FilesystemBackend;
pub use gateway::{GatewayConfig, ObjectHandle, ObjectStorageGateway, UploadTarget};
pub use memory::MemoryBackend;
pub use signer::{HmacUrlSigner, SignatureParams, SignedUrl};
pub use types::{ObjectLocation, ObjectMeta, SignMethod};
pub use validation::{normalize_private_dir, parse_object_path, parse_search_paths};

/// Which backend the daemon stores objects in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    #[default]
    Filesystem,
}

/// Opens the configured backend.
///
/// `base_dir` is only used by the filesystem backend.
///
/// # Errors
///
/// Returns an error if the filesystem backend cannot be opened.
pub fn open_backend(
    kind: BackendKind,
    base_dir: &Path,
    signer: HmacUrlSigner,
) -> Result<Arc<dyn ObjectBackend>> {
    Ok(match kind {
        BackendKind::Memory => Arc::new(MemoryBackend::new(signer)),
        BackendKind::Filesystem => Arc::new(FilesystemBackend::open(base_dir, signer)?),
    })
}
