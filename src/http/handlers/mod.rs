//! HTTP API handlers organized by surface.

mod health;
mod objects;
mod signed;

// Re-export all handlers for use in routing
pub(crate) use health::{health, metrics};
pub(crate) use objects::{create_upload, private_object, public_object, read_url, set_acl};
pub(crate) use signed::{storage_delete, storage_get, storage_head, storage_put};
