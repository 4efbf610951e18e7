//! Application state for Axum handlers.
//!
//! Handlers are generic over a [`Backend`], a bundle of the four provider
//! types, so the same router serves Redis in production and in-memory mocks
//! in tests.

use crate::extractors::TrustedProxies;
use axum::extract::FromRef;
use passkey_idp_auth::audit::TracingAuditSink;
use passkey_idp_auth::providers::{AuditSink, KeyValueStore, RateLimiter, WebAuthnVerifier};
use passkey_idp_auth::stores::{RedisKeyValueStore, RedisRateLimiter};
use passkey_idp_auth::webauthn::PasskeyVerifier;
use passkey_idp_auth::IdentityProvider;
use std::sync::Arc;

/// The concrete provider types behind an [`IdentityProvider`].
pub trait Backend: Send + Sync + 'static {
    /// Key-value store.
    type Kv: KeyValueStore + Clone + 'static;
    /// WebAuthn verifier.
    type Verifier: WebAuthnVerifier + 'static;
    /// Audit sink.
    type Audit: AuditSink + Clone + 'static;
    /// Shared rate limiter.
    type Limiter: RateLimiter + 'static;
}

/// Identity provider built from a backend's types.
pub type Provider<B> = IdentityProvider<
    <B as Backend>::Kv,
    <B as Backend>::Verifier,
    <B as Backend>::Audit,
    <B as Backend>::Limiter,
>;

/// Application state shared across all HTTP handlers.
pub struct AppState<B: Backend> {
    /// The identity provider.
    pub idp: Arc<Provider<B>>,
    /// Proxies allowed to report the client address.
    pub trusted_proxies: TrustedProxies,
}

impl<B: Backend> AppState<B> {
    /// Wrap a provider.
    #[must_use]
    pub fn new(idp: Provider<B>) -> Self {
        Self {
            idp: Arc::new(idp),
            trusted_proxies: TrustedProxies::default(),
        }
    }

    /// Believe forwarding headers from these proxies.
    #[must_use]
    pub fn with_trusted_proxies(mut self, trusted_proxies: TrustedProxies) -> Self {
        self.trusted_proxies = trusted_proxies;
        self
    }

    /// Session lifetime in whole seconds, for cookie `Max-Age`.
    #[must_use]
    pub fn session_max_age(&self) -> i64 {
        self.idp.config.passkey.session_duration.num_seconds()
    }
}

// Manual impl: `B` itself need not be `Clone`.
impl<B: Backend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            idp: Arc::clone(&self.idp),
            trusted_proxies: self.trusted_proxies.clone(),
        }
    }
}

impl<B: Backend> FromRef<AppState<B>> for TrustedProxies {
    fn from_ref(state: &AppState<B>) -> Self {
        state.trusted_proxies.clone()
    }
}

/// Production backend: Redis storage and rate limiting, `webauthn-rs`
/// verification, audit events through `tracing`.
#[derive(Debug, Clone, Copy)]
pub struct RedisBackend;

impl Backend for RedisBackend {
    type Kv = RedisKeyValueStore;
    type Verifier = PasskeyVerifier;
    type Audit = TracingAuditSink;
    type Limiter = RedisRateLimiter;
}
