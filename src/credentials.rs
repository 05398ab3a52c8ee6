//! Credential resolution.
//!
//! Each credential kind is resolved through a [`CredentialChain`]: an
//! ordered list of named sources where the first one that yields a value
//! wins. When every source comes up empty, development runs fall back to a
//! placeholder (logged at `warn!`) and production runs fail.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bootstrap::EnvStore;
use crate::constants::{
    ENV_GCS_CLIENT_EMAIL, ENV_GCS_PRIVATE_KEY, ENV_GCS_PROJECT_ID,
    ENV_GOOGLE_APPLICATION_CREDENTIALS, ENV_RUNTIME_MODE, ENV_STRIPE_SECRET_KEY,
};

/// Payment key used outside production when none is configured.
pub const PAYMENT_PLACEHOLDER_KEY: &str = "sk_test_placeholder";

/// Whether the process runs in production.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    Production,
    Development,
}

impl RuntimeMode {
    /// `OPSDESK_ENV=production` (any case) selects production; anything else
    /// is development.
    pub fn from_env(env: &dyn EnvStore) -> Self {
        match env.var(ENV_RUNTIME_MODE) {
            Some(v) if v.trim().eq_ignore_ascii_case("production") => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

/// Credential resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Nothing configured and no placeholder allowed.
    #[error("no {kind} credentials configured (tried: {tried})")]
    Missing { kind: &'static str, tried: String },

    /// A source was configured but could not be read.
    #[error("{kind} credential source {source_name} is unusable: {error:#}")]
    Unusable {
        kind: &'static str,
        source_name: &'static str,
        error: anyhow::Error,
    },
}

/// A source: `Ok(None)` means "not configured here, try the next one".
pub type CredentialSource<T> = fn(&dyn EnvStore) -> Result<Option<T>>;

/// A resolved credential and where it came from.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,
    pub source: &'static str,
    pub placeholder: bool,
}

/// Ordered credential sources for one credential kind.
pub struct CredentialChain<T> {
    kind: &'static str,
    sources: Vec<(&'static str, CredentialSource<T>)>,
    placeholder: Option<fn() -> T>,
}

impl<T> CredentialChain<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            sources: Vec::new(),
            placeholder: None,
        }
    }

    #[must_use]
    pub fn source(mut self, name: &'static str, source: CredentialSource<T>) -> Self {
        self.sources.push((name, source));
        self
    }

    /// Value used outside production when no source yields.
    #[must_use]
    pub fn placeholder(mut self, make: fn() -> T) -> Self {
        self.placeholder = Some(make);
        self
    }

    /// Walks the sources in order.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Unusable`] if a configured source fails to
    /// load, and [`CredentialError::Missing`] if nothing yields in
    /// production (or no placeholder exists).
    pub fn resolve(
        &self,
        env: &dyn EnvStore,
        mode: RuntimeMode,
    ) -> Result<Resolved<T>, CredentialError> {
        for (name, source) in &self.sources {
            match source(env) {
                Ok(Some(value)) => {
                    info!(kind = self.kind, source = name, "Credentials resolved");
                    return Ok(Resolved {
                        value,
                        source: name,
                        placeholder: false,
                    });
                },
                Ok(None) => {},
                Err(error) => {
                    return Err(CredentialError::Unusable {
                        kind: self.kind,
                        source_name: name,
                        error,
                    });
                },
            }
        }

        match self.placeholder {
            Some(make) if !mode.is_production() => {
                warn!(
                    kind = self.kind,
                    "No credentials configured, using development placeholder"
                );
                Ok(Resolved {
                    value: make(),
                    source: "placeholder",
                    placeholder: true,
                })
            },
            _ => Err(CredentialError::Missing {
                kind: self.kind,
                tried: self
                    .sources
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

// =============================================================================
// Storage credentials
// =============================================================================

/// Service account used to sign object URLs. The private key is the signing
/// secret.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct StorageCredentials {
    #[serde(default)]
    pub project_id: Option<String>,
    pub client_email: String,
    pub private_key: String,
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"***")
            .finish()
    }
}

impl StorageCredentials {
    /// Reads a JSON service account key file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or lacks the required
    /// fields.
    pub fn from_key_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read key file: {}", path.display()))?;
        let creds: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse key file: {}", path.display()))?;
        anyhow::ensure!(
            !creds.private_key.trim().is_empty(),
            "Key file has an empty private_key: {}",
            path.display()
        );
        Ok(creds)
    }

    fn key_file_source(env: &dyn EnvStore) -> Result<Option<Self>> {
        env.var(ENV_GOOGLE_APPLICATION_CREDENTIALS)
            .map(|path| Self::from_key_file(Path::new(&path)))
            .transpose()
    }

    fn split_env_source(env: &dyn EnvStore) -> Result<Option<Self>> {
        let (Some(project_id), Some(client_email), Some(private_key)) = (
            env.var(ENV_GCS_PROJECT_ID),
            env.var(ENV_GCS_CLIENT_EMAIL),
            env.var(ENV_GCS_PRIVATE_KEY),
        ) else {
            return Ok(None);
        };
        Ok(Some(Self {
            project_id: Some(project_id),
            client_email,
            // Keys pasted into env files usually carry escaped newlines
            private_key: private_key.replace("\\n", "\n"),
        }))
    }

    fn development() -> Self {
        Self {
            project_id: None,
            client_email: "opsdesk-dev@localhost".to_string(),
            private_key: format!("dev-{}", Uuid::new_v4().simple()),
        }
    }

    pub fn chain() -> CredentialChain<Self> {
        CredentialChain::new("storage")
            .source(ENV_GOOGLE_APPLICATION_CREDENTIALS, Self::key_file_source)
            .source("GCS_* variables", Self::split_env_source)
            .placeholder(Self::development)
    }
}

// =============================================================================
// Payment credentials
// =============================================================================

/// Payment provider secret key.
#[derive(Clone, PartialEq, Eq)]
pub struct PaymentCredentials {
    pub secret_key: String,
}

impl fmt::Debug for PaymentCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentCredentials")
            .field("secret_key", &"***")
            .finish()
    }
}

impl PaymentCredentials {
    pub fn chain() -> CredentialChain<Self> {
        CredentialChain::new("payment")
            .source(ENV_STRIPE_SECRET_KEY, |env| {
                Ok(env
                    .var(ENV_STRIPE_SECRET_KEY)
                    .map(|secret_key| Self { secret_key }))
            })
            .placeholder(|| Self {
                secret_key: PAYMENT_PLACEHOLDER_KEY.to_string(),
            })
    }
}

/// Every credential the process needs.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub mode: RuntimeMode,
    pub storage: Resolved<StorageCredentials>,
    pub payment: Resolved<PaymentCredentials>,
}

impl Credentials {
    /// Resolves all chains against `env`.
    ///
    /// # Errors
    ///
    /// Returns the first chain failure.
    pub fn resolve(env: &dyn EnvStore) -> Result<Self, CredentialError> {
        let mode = RuntimeMode::from_env(env);
        Ok(Self {
            mode,
            storage: StorageCredentials::chain().resolve(env, mode)?,
            payment: PaymentCredentials::chain().resolve(env, mode)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::MemoryEnv;
    use tempfile::TempDir;

    fn write_key_file(dir: &TempDir, body: &str) -> String {
        let path = dir.path().join("key.json");
        std::fs::write(&path, body).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_runtime_mode() {
        assert_eq!(RuntimeMode::from_env(&MemoryEnv::new()), RuntimeMode::Development);
        let env = MemoryEnv::new().with(ENV_RUNTIME_MODE, "Production");
        assert_eq!(RuntimeMode::from_env(&env), RuntimeMode::Production);
        let env = MemoryEnv::new().with(ENV_RUNTIME_MODE, "staging");
        assert_eq!(RuntimeMode::from_env(&env), RuntimeMode::Development);
    }

    #[test]
    fn test_key_file_wins_over_split_env() {
        let dir = TempDir::new().unwrap();
        let path = write_key_file(
            &dir,
            r#"{"project_id":"p","client_email":"svc@p.iam","private_key":"file-key"}"#,
        );
        let env = MemoryEnv::new()
            .with(ENV_GOOGLE_APPLICATION_CREDENTIALS, &path)
            .with(ENV_GCS_PROJECT_ID, "other")
            .with(ENV_GCS_CLIENT_EMAIL, "other@x")
            .with(ENV_GCS_PRIVATE_KEY, "env-key");

        let resolved = StorageCredentials::chain()
            .resolve(&env, RuntimeMode::Production)
            .unwrap();
        assert_eq!(resolved.source, ENV_GOOGLE_APPLICATION_CREDENTIALS);
        assert_eq!(resolved.value.private_key, "file-key");
        assert!(!resolved.placeholder);
    }

    #[test]
    fn test_split_env_requires_all_three() {
        let env = MemoryEnv::new()
            .with(ENV_GCS_PROJECT_ID, "p")
            .with(ENV_GCS_CLIENT_EMAIL, "svc@p");
        let err = StorageCredentials::chain()
            .resolve(&env, RuntimeMode::Production)
            .unwrap_err();
        assert!(matches!(err, CredentialError::Missing { kind: "storage", .. }));

        let env = env.with(ENV_GCS_PRIVATE_KEY, "line1\\nline2");
        let resolved = StorageCredentials::chain()
            .resolve(&env, RuntimeMode::Production)
            .unwrap();
        assert_eq!(resolved.value.private_key, "line1\nline2");
        assert_eq!(resolved.value.project_id.as_deref(), Some("p"));
    }

    #[test]
    fn test_unreadable_key_file_is_an_error() {
        let env = MemoryEnv::new().with(ENV_GOOGLE_APPLICATION_CREDENTIALS, "/nonexistent/key.json");
        let err = StorageCredentials::chain()
            .resolve(&env, RuntimeMode::Development)
            .unwrap_err();
        assert!(matches!(err, CredentialError::Unusable { .. }));
    }

    #[test]
    fn test_placeholder_only_outside_production() {
        let env = MemoryEnv::new();

        let resolved = PaymentCredentials::chain()
            .resolve(&env, RuntimeMode::Development)
            .unwrap();
        assert!(resolved.placeholder);
        assert_eq!(resolved.value.secret_key, PAYMENT_PLACEHOLDER_KEY);

        let err = PaymentCredentials::chain()
            .resolve(&env, RuntimeMode::Production)
            .unwrap_err();
        assert!(err.to_string().contains("STRIPE_SECRET_KEY"));
    }

    #[test]
    fn test_resolve_all() {
        let env = MemoryEnv::new().with(ENV_STRIPE_SECRET_KEY, "sk_live_x");
        let creds = Credentials::resolve(&env).unwrap();
        assert_eq!(creds.mode, RuntimeMode::Development);
        assert!(creds.storage.placeholder);
        assert_eq!(creds.payment.value.secret_key, "sk_live_x");
        assert!(!format!("{creds:?}").contains("sk_live_x"));
    }
}
