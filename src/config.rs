//! Configuration for the opsdesk daemon.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. Built-in defaults (see [`crate::constants`])
//! 2. An optional TOML file (`opsdesk.toml` or `--config`)
//! 3. Environment variables (`PUBLIC_OBJECT_SEARCH_PATHS`,
//!    `PRIVATE_OBJECT_DIR`, `OPSDESK_PUBLIC_URL`, `OPSDESK_STORAGE_DIR`)
//!
//! CLI flags for host and port are applied by `main` after loading.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bootstrap::EnvStore;
use crate::constants;
use crate::storage::{BackendKind, GatewayConfig, parse_object_path, parse_search_paths};

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL, embedded in signed URLs.
    pub public_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: constants::DEFAULT_HOST.to_string(),
            port: constants::DEFAULT_PORT,
            public_url: None,
            request_timeout_secs: constants::REQUEST_TIMEOUT.as_secs(),
        }
    }
}

/// Object storage settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Root directory of the filesystem backend.
    pub dir: Option<PathBuf>,
    pub public_search_paths: Vec<String>,
    pub private_dir: Option<String>,
    pub download_cache_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            dir: None,
            public_search_paths: Vec::new(),
            private_dir: None,
            download_cache_ttl_secs: constants::DOWNLOAD_CACHE_TTL.as_secs(),
        }
    }
}

/// Database pool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Whether a missing `DATABASE_URL` aborts start-up.
    pub required: bool,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            required: true,
            max_connections: constants::DEFAULT_DB_MAX_CONNECTIONS,
            acquire_timeout_secs: constants::DEFAULT_DB_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from `opsdesk.toml` in the current
    /// directory if it exists. Falls back to defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly given file is missing, or if any
    /// file found contains invalid TOML.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let default = Path::new(constants::DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::load_from(default)
                } else {
                    Ok(Self::default())
                }
            },
        }
    }

    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - Fields have invalid types
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Overrides file values with environment variables that are set.
    pub fn apply_env(&mut self, env: &dyn EnvStore) {
        if let Some(raw) = env.var(constants::ENV_PUBLIC_OBJECT_SEARCH_PATHS) {
            self.storage.public_search_paths = parse_search_paths(&raw);
        }
        if let Some(dir) = env.var(constants::ENV_PRIVATE_OBJECT_DIR) {
            self.storage.private_dir = Some(dir);
        }
        if let Some(url) = env.var(constants::ENV_PUBLIC_URL) {
            self.server.public_url = Some(url);
        }
        if let Some(dir) = env.var(constants::ENV_STORAGE_DIR) {
            self.storage.dir = Some(PathBuf::from(dir));
        }
    }

    /// Base URL clients reach this service on.
    pub fn public_url(&self) -> String {
        match &self.server.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let host = match self.server.host.as_str() {
                    "0.0.0.0" | "::" | "[::]" => "localhost",
                    host => host,
                };
                format!("http://{host}:{}", self.server.port)
            },
        }
    }

    /// Base URL of the signed `/storage` endpoint.
    pub fn storage_url(&self) -> String {
        format!("{}/storage", self.public_url())
    }

    /// Root of the filesystem backend, `~/.opsdesk/storage` by default.
    pub fn storage_dir(&self) -> PathBuf {
        self.storage.dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".opsdesk")
                .join("storage")
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn download_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.storage.download_cache_ttl_secs)
    }

    /// Gateway configuration, with development defaults for unset paths.
    pub fn gateway(&self) -> GatewayConfig {
        let search_paths = if self.storage.public_search_paths.is_empty() {
            vec![constants::DEFAULT_PUBLIC_SEARCH_PATH.to_string()]
        } else {
            self.storage.public_search_paths.clone()
        };
        let private_dir = self
            .storage
            .private_dir
            .as_deref()
            .unwrap_or(constants::DEFAULT_PRIVATE_OBJECT_DIR);

        GatewayConfig::new(search_paths, private_dir).with_object_url_base(self.storage_url())
    }

    /// Validate configuration with comprehensive checks.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails with one or more errors:
    /// - Port 0 or a zero timeout
    /// - Search paths or the private directory without a bucket and prefix
    /// - A public URL that does not parse
    /// - A zero-sized database pool
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // 1. Server
        if self.server.port == 0 {
            errors.push(
                "Server port cannot be 0. Use a valid port number (1-65535)".to_string(),
            );
        }
        if self.server.request_timeout_secs == 0 {
            errors.push("server.request_timeout_secs cannot be 0".to_string());
        }
        if let Some(url) = &self.server.public_url
            && url::Url::parse(url).is_err()
        {
            errors.push(format!("server.public_url is not a valid URL: '{url}'"));
        }

        // 2. Storage paths
        if self.storage.public_search_paths.is_empty() {
            warnings.push(format!(
                "{} not set, serving public assets from {}",
                constants::ENV_PUBLIC_OBJECT_SEARCH_PATHS,
                constants::DEFAULT_PUBLIC_SEARCH_PATH
            ));
        }
        for path in &self.storage.public_search_paths {
            if parse_object_path(path).is_err() {
                errors.push(format!(
                    "Public search path must look like /<bucket>/<prefix> (got: '{path}')"
                ));
            }
        }
        match &self.storage.private_dir {
            None => warnings.push(format!(
                "{} not set, storing private objects under {}",
                constants::ENV_PRIVATE_OBJECT_DIR,
                constants::DEFAULT_PRIVATE_OBJECT_DIR
            )),
            Some(dir) if parse_object_path(dir.trim_end_matches('/')).is_err() => {
                errors.push(format!(
                    "Private object directory must look like /<bucket>/<prefix> (got: '{dir}')"
                ));
            },
            Some(_) => {},
        }
        if self.storage.backend == BackendKind::Memory {
            warnings.push("Memory storage backend selected, objects are lost on exit".to_string());
        }

        // 3. Database
        if self.database.max_connections == 0 {
            errors.push("database.max_connections cannot be 0".to_string());
        }
        if self.database.acquire_timeout_secs == 0 {
            errors.push("database.acquire_timeout_secs cannot be 0".to_string());
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }
}
