//! Environment access for the bootstrap.
//!
//! The bootstrap reads and rewrites `DATABASE_URL`. Going through [`EnvStore`]
//! keeps that mutation in one place and lets tests run against a map instead
//! of the real process environment.

use std::collections::HashMap;

/// Read/write view of environment variables.
pub trait EnvStore {
    /// Returns the value of `key`, treating empty values as unset.
    fn var(&self, key: &str) -> Option<String>;

    /// Overwrites `key`.
    fn set_var(&mut self, key: &str, value: &str);
}

/// The real process environment.
#[derive(Debug, Default)]
pub struct ProcessEnv;

impl EnvStore for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    #[allow(unsafe_code)]
    fn set_var(&mut self, key: &str, value: &str) {
        // SAFETY: only called by the bootstrap, which runs on the main thread
        // before the tokio runtime (or any other thread) is started.
        unsafe { std::env::set_var(key, value) }
    }
}

/// In-memory environment.
#[derive(Debug, Clone, Default)]
pub struct MemoryEnv {
    vars: HashMap<String, String>,
}

impl MemoryEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    /// Raw value, including empty strings.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

impl EnvStore for MemoryEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }

    fn set_var(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), value.to_string());
    }
}
