//! Tracing-backed audit sink.
//!
//! Emits one JSON line per event on the `audit` target so a subscriber can
//! route audit records separately from application logs.

use crate::providers::{AuditEvent, AuditSink};
use serde_json::Value;

/// Metadata keys containing any of these fragments are redacted.
const SENSITIVE_KEY_FRAGMENTS: [&str; 4] = ["token", "secret", "password", "code"];

/// Replacement for redacted values.
pub const REDACTED: &str = "[redacted]";

/// Audit sink that writes scrubbed JSON lines through `tracing`.
#[derive(Debug, Clone, Copy)]
pub struct TracingAuditSink {
    enabled: bool,
}

impl TracingAuditSink {
    /// Create a sink. A disabled sink drops every event.
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Whether events are written.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for TracingAuditSink {
    fn default() -> Self {
        Self::new(true)
    }
}

impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        if !self.enabled {
            return;
        }

        let event = scrub(event);
        match serde_json::to_string(&event) {
            Ok(line) => tracing::info!(target: "audit", "{line}"),
            Err(e) => tracing::warn!(error = %e, kind = ?event.kind, "Failed to serialize audit event"),
        }
    }
}

/// Redact metadata values whose keys look like secrets (case-insensitive).
#[must_use]
pub fn scrub(mut event: AuditEvent) -> AuditEvent {
    for (key, value) in &mut event.metadata {
        if is_sensitive(key) {
            *value = Value::String(REDACTED.to_string());
        }
    }
    event
}

fn is_sensitive(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEY_FRAGMENTS.iter().any(|fragment| key.contains(fragment))
}
