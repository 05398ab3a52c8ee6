//! redb-backed metadata store for the filesystem backend.
//!
//! One table, `objects`, maps `bucket/name` to the JSON-encoded
//! [`ObjectMeta`]. Custom entries (the ACL policy) are updated with a
//! read-modify-write inside a single write transaction, so concurrent
//! policy changes on the same object cannot interleave.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::types::ObjectMeta;

const OBJECTS_TABLE: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new("objects");

fn decode(key: &str, raw: &[u8]) -> Result<ObjectMeta> {
    serde_json::from_slice(raw)
        .with_context(|| format!("Failed to deserialize object metadata: {key}"))
}

/// Handle to the metadata database. Cheap to clone.
#[derive(Clone)]
pub(crate) struct MetadataStore {
    db: Arc<Database>,
}

impl MetadataStore {
    /// Opens (or creates) the database at `path` and ensures the table exists.
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).with_context(|| {
            format!("Failed to open storage metadata database: {}", path.display())
        })?;

        let write_txn = db
            .begin_write()
            .context("Failed to begin initialization transaction")?;
        write_txn
            .open_table(OBJECTS_TABLE)
            .context("Failed to initialize objects table")?;
        write_txn
            .commit()
            .context("Failed to commit initialization transaction")?;

        Ok(Self { db: Arc::new(db) })
    }

    pub(crate) fn get(&self, key: &str) -> Result<Option<ObjectMeta>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(OBJECTS_TABLE)
            .context("Failed to open objects table")?;

        table
            .get(key)
            .with_context(|| format!("Failed to read object metadata: {key}"))?
            .map(|guard| decode(key, guard.value()))
            .transpose()
    }

    pub(crate) fn put(&self, meta: &ObjectMeta) -> Result<()> {
        let key = meta.location.key();
        let json = serde_json::to_vec(meta).context("Failed to serialize object metadata")?;

        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        write_txn
            .open_table(OBJECTS_TABLE)
            .context("Failed to open objects table")?
            .insert(key.as_str(), json.as_slice())
            .with_context(|| format!("Failed to insert object metadata: {key}"))?;
        write_txn
            .commit()
            .context("Failed to commit metadata write")
    }

    pub(crate) fn remove(&self, key: &str) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        write_txn
            .open_table(OBJECTS_TABLE)
            .context("Failed to open objects table")?
            .remove(key)
            .with_context(|| format!("Failed to remove object metadata: {key}"))?;
        write_txn
            .commit()
            .context("Failed to commit metadata removal")
    }

    /// Sets one custom entry on the stored record for `key`.
    ///
    /// `fallback` supplies a record when none is stored yet (a file written
    /// outside the service). Returns `Ok(false)` when there is neither.
    pub(crate) fn set_entry(
        &self,
        key: &str,
        name: &str,
        value: &str,
        fallback: impl FnOnce() -> Result<Option<ObjectMeta>>,
    ) -> Result<bool> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(OBJECTS_TABLE)
                .context("Failed to open objects table")?;

            let stored = table
                .get(key)
                .with_context(|| format!("Failed to read object metadata: {key}"))?
                .map(|guard| decode(key, guard.value()))
                .transpose()?;
            let Some(mut meta) = stored.map_or_else(fallback, |m| Ok(Some(m)))? else {
                return Ok(false);
            };

            meta.metadata.insert(name.to_string(), value.to_string());
            meta.modified_at = Utc::now();
            let json = serde_json::to_vec(&meta).context("Failed to serialize object metadata")?;
            table
                .insert(key, json.as_slice())
                .with_context(|| format!("Failed to insert object metadata: {key}"))?;
        }
        write_txn
            .commit()
            .context("Failed to commit metadata update")?;
        Ok(true)
    }
}
