//! opsdesk: backend for a business-operations web application.
//!
//! The crate owns two pieces of infrastructure:
//!
//! - [`bootstrap`]: rewrites `DATABASE_URL` to an IPv4 literal and sets a
//!   process-wide IPv4-first preference before anything connects
//! - [`storage`]: the object storage gateway (signed upload/read URLs,
//!   public search paths, private objects, visibility-aware downloads)
//!
//! [`http`] exposes the gateway over axum; [`config`], [`credentials`] and
//! [`database`] wire the daemon together.

#![deny(unsafe_code)]

pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod database;
pub mod http;
pub mod storage;
