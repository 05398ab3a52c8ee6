//! Security audit logging for object access.
//!
//! Events go to the `audit` tracing target so they can be routed separately
//! (`RUST_LOG=audit=info`).

use tracing::{info, warn};

/// Security audit events that should be logged for monitoring and alerting.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    /// ACL check refused a caller.
    AccessDenied {
        path: String,
        user_id: Option<String>,
        permission: &'static str,
    },
    /// A request to `/storage` carried a bad or expired signature.
    SignatureRejected {
        location: String,
        method: &'static str,
        reason: String,
    },
    /// A private upload slot was handed out.
    UploadTargetIssued { object_path: String, user_id: String },
    /// An ACL policy was attached or replaced.
    AclChanged {
        path: String,
        user_id: String,
        visibility: &'static str,
    },
}

/// Log a security audit event with structured fields.
pub fn log_audit_event(event: AuditEvent) {
    match event {
        AuditEvent::AccessDenied {
            path,
            user_id,
            permission,
        } => {
            warn!(
                target: "audit",
                event_type = "access_denied",
                %path,
                user_id = user_id.as_deref().unwrap_or("anonymous"),
                permission,
                "Object access denied"
            );
        },
        AuditEvent::SignatureRejected {
            location,
            method,
            reason,
        } => {
            warn!(
                target: "audit",
                event_type = "signature_rejected",
                %location,
                method,
                %reason,
                "Signed URL rejected"
            );
        },
        AuditEvent::UploadTargetIssued {
            object_path,
            user_id,
        } => {
            info!(
                target: "audit",
                event_type = "upload_target_issued",
                %object_path,
                %user_id,
                "Upload target issued"
            );
        },
        AuditEvent::AclChanged {
            path,
            user_id,
            visibility,
        } => {
            info!(
                target: "audit",
                event_type = "acl_changed",
                %path,
                %user_id,
                visibility,
                "Object ACL changed"
            );
        },
    }
}
