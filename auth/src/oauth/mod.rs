//! OAuth 2.1 authorization server with OpenID Connect ID tokens.
//!
//! # Endpoints served
//!
//! - `authorize`: session + PKCE challenge → one-time code on the redirect URI
//! - `token`: `authorization_code` and `refresh_token` grants
//! - `revoke`: refresh token revocation
//! - `userinfo`: claims of a verified access token
//! - `discovery`: OpenID provider metadata
//!
//! Only public clients with exact-match redirect URIs and S256 PKCE are
//! supported.

pub mod clients;
pub mod codes;
pub mod pkce;
pub mod refresh;
pub mod tokens;

pub use clients::ClientRegistry;
pub use codes::{AuthorizationCodeIssuer, CodeGrant, CodeRequest};
pub use refresh::RefreshRotator;
pub use tokens::{Claims, Jwk, Jwks, SigningKey, TokenIssuer};

use crate::config::OAuthConfig;
use crate::constants::oauth::{
    DEFAULT_SCOPE, GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN, PKCE_METHOD_S256, SIGNING_ALG,
};
use crate::error::{AuthError, Result};
use crate::providers::{AuditEvent, AuditEventKind, AuditSink, KeyValueStore};
use crate::state::UserId;
use crate::stores::SessionStore;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Query of `GET /oauth/authorize`.
///
/// Missing parameters deserialize as empty so they fail validation with the
/// protocol error rather than a parse error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuthorizeRequest {
    /// Requesting client.
    #[serde(default)]
    pub client_id: String,
    /// Where to send the code.
    #[serde(default)]
    pub redirect_uri: String,
    /// Opaque client state, echoed back.
    #[serde(default)]
    pub state: Option<String>,
    /// PKCE challenge.
    #[serde(default)]
    pub code_challenge: String,
    /// PKCE method; `S256` when absent.
    #[serde(default)]
    pub code_challenge_method: Option<String>,
}

/// Form body of `POST /oauth/token`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenRequest {
    /// `authorization_code` or `refresh_token`.
    #[serde(default)]
    pub grant_type: String,
    /// Code being redeemed.
    #[serde(default)]
    pub code: Option<String>,
    /// Redirect URI the code was issued for.
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Client id.
    #[serde(default)]
    pub client_id: Option<String>,
    /// PKCE verifier.
    #[serde(default)]
    pub code_verifier: Option<String>,
    /// Refresh token being rotated.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Successful token response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Always `Bearer`.
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// RS256 access token.
    pub access_token: String,
    /// RS256 ID token.
    pub id_token: String,
    /// Opaque refresh token.
    pub refresh_token: String,
}

/// `GET /oidc/userinfo` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Subject.
    pub sub: String,
    /// Email, when present in the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// OpenID provider metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)] // Field names are the OpenID Connect Discovery 1.0 metadata names
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub revocation_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
}

/// The authorization server.
pub struct OAuthService<K, A> {
    codes: AuthorizationCodeIssuer<K, A>,
    tokens: TokenIssuer,
    refresh: RefreshRotator<K, A>,
    sessions: SessionStore<K>,
    audit: A,
    config: OAuthConfig,
}

impl<K, A> OAuthService<K, A>
where
    K: KeyValueStore + Clone,
    A: AuditSink + Clone,
{
    /// Create the service.
    #[must_use]
    pub fn new(
        kv: K,
        audit: A,
        tokens: TokenIssuer,
        sessions: SessionStore<K>,
        config: OAuthConfig,
    ) -> Self {
        let clients = ClientRegistry::new(config.clients.clone());
        Self {
            codes: AuthorizationCodeIssuer::new(kv.clone(), clients, audit.clone(), config.code_ttl),
            refresh: RefreshRotator::new(kv, audit.clone(), config.refresh_token_ttl),
            tokens,
            sessions,
            audit,
            config,
        }
    }

    /// Token signer and key ring.
    #[must_use]
    pub const fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Handle an authorize request, returning the redirect location.
    ///
    /// # Errors
    ///
    /// In check order: `InvalidClientOrRedirect`, `InvalidPkce`, `LoginRequired`.
    pub async fn authorize(
        &self,
        session_id: Option<&str>,
        request: &AuthorizeRequest,
        ip: Option<IpAddr>,
    ) -> Result<String> {
        let result = self.try_authorize(session_id, request, ip).await;

        if let Err(e) = &result {
            tracing::debug!(client_id = %request.client_id, error = %e, "Authorize request rejected");
            self.audit
                .record(
                    AuditEvent::new(AuditEventKind::AuthorizeFailed)
                        .with_ip(ip)
                        .with_reason(e)
                        .with("client_id", request.client_id.as_str()),
                )
                .await;
        }

        result
    }

    async fn try_authorize(
        &self,
        session_id: Option<&str>,
        request: &AuthorizeRequest,
        ip: Option<IpAddr>,
    ) -> Result<String> {
        if !self.codes.clients().is_allowed(&request.client_id, &request.redirect_uri) {
            return Err(AuthError::InvalidClientOrRedirect);
        }

        let method = request.code_challenge_method.as_deref().unwrap_or(PKCE_METHOD_S256);
        if request.code_challenge.is_empty() || method != PKCE_METHOD_S256 {
            return Err(AuthError::InvalidPkce);
        }

        let session = match session_id {
            Some(id) => self.sessions.get_session(id).await?,
            None => None,
        }
        .ok_or(AuthError::LoginRequired)?;

        let code = self
            .codes
            .issue(
                CodeRequest {
                    user_id: session.user_id,
                    email: &session.email,
                    client_id: &request.client_id,
                    redirect_uri: &request.redirect_uri,
                    code_challenge: &request.code_challenge,
                    method,
                },
                ip,
            )
            .await?;

        Ok(redirect_location(&request.redirect_uri, &code, request.state.as_deref()))
    }

    /// Handle a token request.
    ///
    /// # Errors
    ///
    /// - `UnsupportedGrantType` for anything but the two supported grants
    /// - Code exchange errors (`InvalidCode`, `InvalidClient`, ...)
    /// - Refresh errors (`InvalidRefresh`, `RefreshReused`, `InvalidClient`)
    ///
    /// Failed code redemptions are audited as `CodeExchangeFailed`; every
    /// other failure as `TokenFailed`.
    pub async fn token(&self, request: &TokenRequest, ip: Option<IpAddr>) -> Result<TokenResponse> {
        let field = |value: &Option<String>| value.clone().unwrap_or_default();

        let result = match request.grant_type.as_str() {
            GRANT_AUTHORIZATION_CODE => {
                let grant = self
                    .codes
                    .exchange(
                        &field(&request.code),
                        &field(&request.client_id),
                        &field(&request.redirect_uri),
                        &field(&request.code_verifier),
                        ip,
                    )
                    .await?;
                self.issue_tokens(grant.user_id, &grant.email, &grant.client_id, None, ip)
                    .await
            }
            GRANT_REFRESH_TOKEN => self.refresh_grant(request, ip).await,
            _ => Err(AuthError::UnsupportedGrantType),
        };

        if let Err(e) = &result {
            tracing::debug!(grant = %request.grant_type, error = %e, "Token request rejected");
            self.audit
                .record(
                    AuditEvent::new(AuditEventKind::TokenFailed)
                        .with_ip(ip)
                        .with_reason(e)
                        .with("grant", request.grant_type.as_str())
                        .with("client_id", request.client_id.as_deref().unwrap_or_default()),
                )
                .await;
        }

        result
    }

    async fn refresh_grant(&self, request: &TokenRequest, ip: Option<IpAddr>) -> Result<TokenResponse> {
        let presented = request.refresh_token.clone().unwrap_or_default();
        let record = self.refresh.validate(&presented, ip).await?;
        if let Some(client_id) = request.client_id.as_deref() {
            if client_id != record.client_id {
                tracing::warn!(
                    user_id = %record.user_id,
                    presented = %client_id,
                    "Refresh token presented by another client"
                );
                return Err(AuthError::InvalidClient);
            }
        }
        self.issue_tokens(record.user_id, &record.email, &record.client_id, Some(&presented), ip)
            .await
    }

    async fn issue_tokens(
        &self,
        user_id: UserId,
        email: &str,
        client_id: &str,
        prev_refresh: Option<&str>,
        ip: Option<IpAddr>,
    ) -> Result<TokenResponse> {
        let access_token = self.tokens.sign_access_token(
            user_id,
            email,
            DEFAULT_SCOPE,
            client_id,
            self.config.access_token_ttl,
        )?;
        let id_token =
            self.tokens
                .sign_id_token(user_id, Some(email), client_id, self.config.id_token_ttl)?;
        let refresh_token = self
            .refresh
            .rotate(prev_refresh, user_id, client_id, email, ip)
            .await?;

        self.audit
            .record(
                AuditEvent::new(AuditEventKind::TokensIssued)
                    .with_user(user_id)
                    .with_ip(ip)
                    .with("client_id", client_id)
                    .with("grant", if prev_refresh.is_some() { GRANT_REFRESH_TOKEN } else { GRANT_AUTHORIZATION_CODE }),
            )
            .await;

        Ok(TokenResponse {
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_ttl.num_seconds(),
            access_token,
            id_token,
            refresh_token,
        })
    }

    /// Revoke a refresh token. Unknown tokens are accepted silently.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn revoke(&self, token: &str, ip: Option<IpAddr>) -> Result<()> {
        self.refresh.revoke(token, ip).await
    }

    /// Claims of a bearer access token. Rejected tokens are audited.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if the token does not verify.
    pub async fn userinfo(&self, bearer: &str, ip: Option<IpAddr>) -> Result<UserInfo> {
        match self.tokens.verify_access_token(bearer) {
            Ok(claims) => Ok(UserInfo {
                sub: claims.sub,
                email: claims.email,
            }),
            Err(e) => {
                self.audit
                    .record(AuditEvent::new(AuditEventKind::UserinfoFailed).with_ip(ip).with_reason(&e))
                    .await;
                Err(e)
            }
        }
    }

    /// Public signing keys.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InternalError` if the key ring is unavailable.
    pub fn jwks(&self) -> Result<Jwks> {
        self.tokens.public_key_set()
    }

    /// OpenID provider metadata for this issuer.
    #[must_use]
    pub fn discovery(&self) -> DiscoveryDocument {
        let issuer = self.tokens.issuer();

        DiscoveryDocument {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{issuer}/oauth/authorize"),
            token_endpoint: format!("{issuer}/oauth/token"),
            userinfo_endpoint: format!("{issuer}/oidc/userinfo"),
            jwks_uri: format!("{issuer}/jwks"),
            revocation_endpoint: format!("{issuer}/oauth/revoke"),
            response_types_supported: strings(&["code"]),
            grant_types_supported: strings(&[GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN]),
            subject_types_supported: strings(&["public"]),
            id_token_signing_alg_values_supported: strings(&[SIGNING_ALG]),
            scopes_supported: DEFAULT_SCOPE.split(' ').map(str::to_string).collect(),
            token_endpoint_auth_methods_supported: strings(&["none"]),
            code_challenge_methods_supported: strings(&[PKCE_METHOD_S256]),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

fn redirect_location(redirect_uri: &str, code: &str, state: Option<&str>) -> String {
    let separator = if redirect_uri.contains('?') { '&' } else { '?' };
    let mut location = format!("{redirect_uri}{separator}code={}", urlencoding::encode(code));
    if let Some(state) = state.filter(|s| !s.is_empty()) {
        location.push_str("&state=");
        location.push_str(&urlencoding::encode(state));
    }
    location
}

#[cfg(test)]
mod redirect_tests {
    use super::redirect_location;

    #[test]
    fn test_redirect_location() {
        assert_eq!(
            redirect_location("https://app.example.com/cb", "abc", Some("x y")),
            "https://app.example.com/cb?code=abc&state=x%20y"
        );
        assert_eq!(
            redirect_location("https://app.example.com/cb?tenant=1", "abc", None),
            "https://app.example.com/cb?tenant=1&code=abc"
        );
        assert_eq!(redirect_location("https://app.example.com/cb", "abc", Some("")), "https://app.example.com/cb?code=abc");
    }
}
