//! Recording audit sink for testing.

use crate::providers::{AuditEvent, AuditEventKind, AuditSink};
use std::sync::{Arc, Mutex};

/// Audit sink that keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct MockAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MockAuditSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Recorded events of one kind.
    #[must_use]
    pub fn events_of(&self, kind: AuditEventKind) -> Vec<AuditEvent> {
        self.events().into_iter().filter(|e| e.kind == kind).collect()
    }

    /// Whether any event of this kind was recorded.
    #[must_use]
    pub fn contains(&self, kind: AuditEventKind) -> bool {
        !self.events_of(kind).is_empty()
    }
}

impl AuditSink for MockAuditSink {
    async fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
