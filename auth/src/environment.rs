//! Identity provider composition root.
//!
//! [`IdentityProvider`] wires every service to one key-value store, one
//! verifier, one audit sink and an optional shared rate limiter. It is built
//! once at startup and shared (behind an `Arc`) by every request.

use crate::config::IdpConfig;
use crate::error::Result;
use crate::oauth::{OAuthService, SigningKey, TokenIssuer};
use crate::providers::{
    AuditEvent, AuditEventKind, AuditSink, KeyValueStore, RateLimiter, WebAuthnVerifier,
};
use crate::rate_limit::BucketRateLimiter;
use crate::state::{Session, UserId};
use crate::stores::SessionStore;
use crate::webauthn::CeremonyOrchestrator;
use std::net::IpAddr;

/// Everything a request handler needs.
///
/// # Type Parameters
///
/// - `K`: Key-value store (Redis in production)
/// - `W`: WebAuthn verifier
/// - `A`: Audit sink
/// - `L`: Shared rate limiter (Redis in production)
pub struct IdentityProvider<K, W, A, L> {
    /// Passkey ceremonies.
    pub ceremonies: CeremonyOrchestrator<K, W, A>,
    /// OAuth 2.1 / OIDC endpoints.
    pub oauth: OAuthService<K, A>,
    /// Session store.
    pub sessions: SessionStore<K>,
    /// Per-bucket admission control.
    pub rate_limiter: BucketRateLimiter<L>,
    /// Audit sink.
    pub audit: A,
    /// Configuration the provider was built with.
    pub config: IdpConfig,
}

impl<K, W, A, L> IdentityProvider<K, W, A, L>
where
    K: KeyValueStore + Clone,
    W: WebAuthnVerifier,
    A: AuditSink + Clone,
    L: RateLimiter,
{
    /// Build the provider.
    #[must_use]
    pub fn new(
        kv: K,
        verifier: W,
        audit: A,
        shared_limiter: Option<L>,
        signing_key: SigningKey,
        config: IdpConfig,
    ) -> Self {
        tracing::info!(
            issuer = %config.issuer,
            kid = %signing_key.kid(),
            clients = config.oauth.clients.len(),
            shared_rate_limiter = shared_limiter.is_some(),
            "Identity provider initialized"
        );

        let sessions = SessionStore::new(kv.clone(), config.passkey.session_duration);
        let tokens = TokenIssuer::new(config.issuer.clone(), signing_key, config.oauth.previous_key_limit);

        Self {
            ceremonies: CeremonyOrchestrator::new(kv.clone(), verifier, audit.clone(), config.passkey.clone()),
            oauth: OAuthService::new(kv, audit.clone(), tokens, sessions.clone(), config.oauth.clone()),
            sessions,
            rate_limiter: BucketRateLimiter::new(shared_limiter, config.rate_limits.clone()),
            audit,
            config,
        }
    }

    /// Resolve a session cookie value to a live session.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn current_session(&self, session_id: &str) -> Result<Option<Session>> {
        self.sessions.get_session(session_id).await
    }

    /// End a session. Ending a missing session is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn logout(&self, session_id: &str, ip: Option<IpAddr>) -> Result<Option<UserId>> {
        let user_id = self.sessions.get_session(session_id).await?.map(|s| s.user_id);
        self.sessions.delete_session(session_id).await?;

        if let Some(user_id) = user_id {
            tracing::info!(user_id = %user_id, "Logged out");
            self.audit
                .record(
                    AuditEvent::new(AuditEventKind::Logout)
                        .with_user(user_id)
                        .with_ip(ip),
                )
                .await;
        }
        Ok(user_id)
    }
}
