//! Audit sink trait and event model.
//!
//! Security-relevant outcomes (ceremony results, code and token issuance,
//! refresh reuse, rate limiting) are reported as [`AuditEvent`]s. Recording
//! is fire-and-forget: a sink must never fail the request that produced the
//! event.

use crate::state::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::IpAddr;

/// Kind of audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    /// Passkey registered and session created.
    RegistrationSucceeded,
    /// Registration ceremony failed.
    RegistrationFailed,
    /// Passkey assertion accepted and session created.
    AuthenticationSucceeded,
    /// Authentication ceremony failed.
    AuthenticationFailed,
    /// Authenticator reported a counter at or below the stored one.
    CounterRegression,
    /// Authorization code issued.
    CodeIssued,
    /// Authorize request rejected.
    AuthorizeFailed,
    /// Code redemption rejected.
    CodeExchangeFailed,
    /// Access/ID/refresh tokens issued.
    TokensIssued,
    /// Token request rejected after any code redemption.
    TokenFailed,
    /// Bearer token rejected at userinfo.
    UserinfoFailed,
    /// Refresh token rotated.
    RefreshRotated,
    /// A rotated-away refresh token was presented again.
    RefreshReuseDetected,
    /// Refresh token revoked.
    RefreshRevoked,
    /// Request rejected by the rate limiter.
    RateLimited,
    /// Session ended by the user.
    Logout,
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// What happened.
    pub kind: AuditEventKind,

    /// Subject, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,

    /// Client address, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,

    /// Free-form details.
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// When it happened.
    pub ts: DateTime<Utc>,
}

impl AuditEvent {
    /// Start an event of the given kind, timestamped now.
    #[must_use]
    pub fn new(kind: AuditEventKind) -> Self {
        Self {
            kind,
            user_id: None,
            ip: None,
            metadata: Map::new(),
            ts: Utc::now(),
        }
    }

    /// Attach the subject.
    #[must_use]
    pub const fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Attach the client address, if any.
    #[must_use]
    pub const fn with_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.ip = ip;
        self
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Attach the internal code of a failure.
    #[must_use]
    pub fn with_reason(self, error: &crate::AuthError) -> Self {
        self.with("reason", error.code())
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    /// Record an event.
    fn record(&self, event: AuditEvent) -> impl std::future::Future<Output = ()> + Send;
}
