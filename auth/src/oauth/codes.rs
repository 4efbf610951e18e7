//! Authorization codes (OAuth 2.1, PKCE required).
//!
//! A code is 32 random bytes, bound to one client, one redirect URI and one
//! S256 challenge, and lives for 5 minutes by default. Redemption pops it
//! before any check, so a code is spent even when the exchange fails.

use super::clients::ClientRegistry;
use super::pkce::verify_s256;
use crate::constants::oauth::PKCE_METHOD_S256;
use crate::error::{AuthError, Result};
use crate::providers::{AuditEvent, AuditEventKind, AuditSink, KeyValueStore};
use crate::state::{AuthorizationCode, UserId};
use crate::stores::AuthCodeStore;
use crate::utils::random_token;
use chrono::{Duration, Utc};
use std::net::IpAddr;

/// Inputs to [`AuthorizationCodeIssuer::issue`].
#[derive(Debug, Clone, Copy)]
pub struct CodeRequest<'a> {
    /// Authenticated user.
    pub user_id: UserId,
    /// Authenticated user's email.
    pub email: &'a str,
    /// Requesting client.
    pub client_id: &'a str,
    /// Where the code will be delivered.
    pub redirect_uri: &'a str,
    /// `base64url(SHA256(code_verifier))`.
    pub code_challenge: &'a str,
    /// Must be `S256`.
    pub method: &'a str,
}

/// Identity carried by a redeemed code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeGrant {
    /// Subject.
    pub user_id: UserId,
    /// Subject's email.
    pub email: String,
    /// Client the code was issued to.
    pub client_id: String,
}

/// Issues and redeems authorization codes.
#[derive(Clone)]
pub struct AuthorizationCodeIssuer<K, A> {
    store: AuthCodeStore<K>,
    clients: ClientRegistry,
    audit: A,
    ttl: Duration,
}

impl<K: KeyValueStore, A: AuditSink> AuthorizationCodeIssuer<K, A> {
    /// Create an issuer.
    #[must_use]
    pub const fn new(kv: K, clients: ClientRegistry, audit: A, ttl: Duration) -> Self {
        Self {
            store: AuthCodeStore::new(kv),
            clients,
            audit,
            ttl,
        }
    }

    /// Registered clients.
    #[must_use]
    pub const fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Issue a code.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidClientOrRedirect` if the pair is not registered
    /// - `AuthError::InvalidPkce` if the challenge is empty or the method is not `S256`
    pub async fn issue(&self, request: CodeRequest<'_>, ip: Option<IpAddr>) -> Result<String> {
        if !self.clients.is_allowed(request.client_id, request.redirect_uri) {
            return Err(AuthError::InvalidClientOrRedirect);
        }
        if request.code_challenge.is_empty() || request.method != PKCE_METHOD_S256 {
            return Err(AuthError::InvalidPkce);
        }

        let now = Utc::now();
        let record = AuthorizationCode {
            code: random_token(32),
            client_id: request.client_id.to_string(),
            redirect_uri: request.redirect_uri.to_string(),
            code_challenge: request.code_challenge.to_string(),
            method: PKCE_METHOD_S256.to_string(),
            user_id: request.user_id,
            email: request.email.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
        };
        self.store.put(&record).await?;

        tracing::info!(user_id = %request.user_id, client_id = %request.client_id, "Authorization code issued");
        self.audit
            .record(
                AuditEvent::new(AuditEventKind::CodeIssued)
                    .with_user(request.user_id)
                    .with_ip(ip)
                    .with("client_id", request.client_id),
            )
            .await;

        Ok(record.code)
    }

    /// Redeem a code.
    ///
    /// # Errors
    ///
    /// In check order: `InvalidCode`, `InvalidClient`, `InvalidRedirectUri`,
    /// `PkceMismatch`. The code is consumed in every case.
    pub async fn exchange(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        code_verifier: &str,
        ip: Option<IpAddr>,
    ) -> Result<CodeGrant> {
        let result = self.redeem(code, client_id, redirect_uri, code_verifier).await;

        if let Err(e) = &result {
            tracing::warn!(client_id = %client_id, error = %e, "Code exchange failed");
            self.audit
                .record(
                    AuditEvent::new(AuditEventKind::CodeExchangeFailed)
                        .with_ip(ip)
                        .with_reason(e)
                        .with("client_id", client_id),
                )
                .await;
        }

        result
    }

    async fn redeem(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<CodeGrant> {
        let saved = self.store.pop(code).await?.ok_or(AuthError::InvalidCode)?;

        if saved.client_id != client_id {
            return Err(AuthError::InvalidClient);
        }
        if saved.redirect_uri != redirect_uri {
            return Err(AuthError::InvalidRedirectUri);
        }
        if saved.method != PKCE_METHOD_S256 || !verify_s256(code_verifier, &saved.code_challenge) {
            return Err(AuthError::PkceMismatch);
        }

        Ok(CodeGrant {
            user_id: saved.user_id,
            email: saved.email,
            client_id: saved.client_id,
        })
    }
}
