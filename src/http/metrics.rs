//! Prometheus metrics for the HTTP surface.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the global Prometheus recorder.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

/// Counts an object operation (`public_get`, `private_get`, `upload_target`, ...).
pub fn record_object_operation(operation: &'static str) {
    metrics::counter!("opsdesk_object_operations_total", "operation" => operation).increment(1);
}

/// Counts a streamed download by where the object was found.
pub fn record_download(source: &'static str) {
    metrics::counter!("opsdesk_downloads_total", "source" => source).increment(1);
}

/// Counts a request rejected by the signed URL check or an ACL.
pub fn record_rejection(reason: &'static str) {
    metrics::counter!("opsdesk_rejections_total", "reason" => reason).increment(1);
}
