use tracing::info;

use super::AuditSink;
use crate::proxy::executor::AuditEntry;

/// Writes each audit entry as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record_audit(&self, entry: AuditEntry) {
        let attempts = serde_json::to_string(&entry.attempts).unwrap_or_default();
        info!(
            target: "modelmux::audit",
            trace_id = %entry.trace_id,
            user_id = %entry.user_id,
            requested_model = %entry.requested_model,
            intent = %entry.intent,
            route_reason = %entry.route_reason,
            provider = entry.provider.as_deref().unwrap_or("-"),
            model = entry.model.as_deref().unwrap_or("-"),
            status = entry.status,
            duration_ms = entry.duration_ms,
            attempts = %attempts,
            "request completed"
        );
    }
}
