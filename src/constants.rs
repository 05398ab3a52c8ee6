//! Default values shared across the crate.

use std::time::Duration;

/// Default HTTP listener host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default HTTP listener port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "opsdesk.toml";

/// Request timeout applied by the HTTP layer.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// Environment variables
// =============================================================================

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_PUBLIC_OBJECT_SEARCH_PATHS: &str = "PUBLIC_OBJECT_SEARCH_PATHS";
pub const ENV_PRIVATE_OBJECT_DIR: &str = "PRIVATE_OBJECT_DIR";
pub const ENV_GOOGLE_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const ENV_GCS_PROJECT_ID: &str = "GCS_PROJECT_ID";
pub const ENV_GCS_CLIENT_EMAIL: &str = "GCS_CLIENT_EMAIL";
pub const ENV_GCS_PRIVATE_KEY: &str = "GCS_PRIVATE_KEY";
pub const ENV_STRIPE_SECRET_KEY: &str = "STRIPE_SECRET_KEY";
pub const ENV_RUNTIME_MODE: &str = "OPSDESK_ENV";
pub const ENV_PUBLIC_URL: &str = "OPSDESK_PUBLIC_URL";
pub const ENV_STORAGE_DIR: &str = "OPSDESK_STORAGE_DIR";

// =============================================================================
// Object storage
// =============================================================================

/// Public search path used when none is configured.
pub const DEFAULT_PUBLIC_SEARCH_PATH: &str = "/opsdesk/public";

/// Private root used when none is configured.
pub const DEFAULT_PRIVATE_OBJECT_DIR: &str = "/opsdesk/.private";

/// Mandatory prefix of every private logical path.
pub const OBJECTS_PREFIX: &str = "/objects/";

/// Subdirectory of the private root that receives new uploads.
pub const UPLOADS_DIR: &str = "uploads";

/// Lifetime of signed upload URLs. Fixed.
pub const UPLOAD_URL_TTL: Duration = Duration::from_secs(15 * 60);

/// Default lifetime of signed read URLs.
pub const READ_URL_TTL: Duration = Duration::from_secs(300);

/// Default `max-age` for streamed downloads.
pub const DOWNLOAD_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Fallback content type when the backend has none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Object metadata key holding the JSON-encoded ACL policy.
pub const ACL_POLICY_METADATA_KEY: &str = "custom:aclPolicy";

/// Largest body accepted by the signed upload endpoint.
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Request header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Chunk size used when streaming objects off disk.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

// =============================================================================
// Database
// =============================================================================

pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;
