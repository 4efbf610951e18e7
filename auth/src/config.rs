//! Identity provider configuration.
//!
//! Configuration values should be provided by the application, not hardcoded.
//! Every struct has a `Default` suitable for local development and `with_*`
//! builders for overrides.

use chrono::Duration;
use std::collections::HashMap;

/// Top-level configuration bundle.
#[derive(Debug, Clone)]
pub struct IdpConfig {
    /// Issuer URL placed in `iss` and the discovery document (no trailing slash).
    pub issuer: String,

    /// Passkey ceremony settings.
    pub passkey: PasskeyConfig,

    /// OAuth / token settings.
    pub oauth: OAuthConfig,

    /// Rate limit quotas.
    pub rate_limits: RateLimitConfig,
}

impl IdpConfig {
    /// Create configuration for the given issuer with default component settings.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into().trim_end_matches('/').to_string(),
            passkey: PasskeyConfig::default(),
            oauth: OAuthConfig::default(),
            rate_limits: RateLimitConfig::default(),
        }
    }

    /// Set passkey settings.
    #[must_use]
    pub fn with_passkey(mut self, passkey: PasskeyConfig) -> Self {
        self.passkey = passkey;
        self
    }

    /// Set OAuth settings.
    #[must_use]
    pub fn with_oauth(mut self, oauth: OAuthConfig) -> Self {
        self.oauth = oauth;
        self
    }

    /// Set rate limit quotas.
    #[must_use]
    pub fn with_rate_limits(mut self, rate_limits: RateLimitConfig) -> Self {
        self.rate_limits = rate_limits;
        self
    }
}

impl Default for IdpConfig {
    fn default() -> Self {
        Self::new("http://localhost:3000")
    }
}

/// WebAuthn/Passkey ceremony configuration.
#[derive(Debug, Clone)]
pub struct PasskeyConfig {
    /// Relying Party ID override (e.g., "example.com").
    ///
    /// When `None`, the RP ID is the request host without its port.
    pub rp_id: Option<String>,

    /// Relying Party display name.
    pub rp_name: String,

    /// Challenge time-to-live.
    ///
    /// Default: 5 minutes
    pub challenge_ttl: Duration,

    /// Client-side ceremony timeout in milliseconds.
    ///
    /// Default: 60000
    pub timeout_ms: u32,

    /// Omit `allowCredentials` from authentication options so the browser
    /// offers any discoverable credential for this RP.
    pub discoverable_login: bool,

    /// Session duration after a successful ceremony.
    ///
    /// Default: 1 hour
    pub session_duration: Duration,
}

impl PasskeyConfig {
    /// Pin the Relying Party ID.
    #[must_use]
    pub fn with_rp_id(mut self, rp_id: impl Into<String>) -> Self {
        self.rp_id = Some(rp_id.into());
        self
    }

    /// Set the Relying Party display name.
    #[must_use]
    pub fn with_rp_name(mut self, rp_name: impl Into<String>) -> Self {
        self.rp_name = rp_name.into();
        self
    }

    /// Set challenge time-to-live.
    #[must_use]
    pub const fn with_challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    /// Toggle discoverable login.
    #[must_use]
    pub const fn with_discoverable_login(mut self, enabled: bool) -> Self {
        self.discoverable_login = enabled;
        self
    }

    /// Set session duration.
    #[must_use]
    pub const fn with_session_duration(mut self, duration: Duration) -> Self {
        self.session_duration = duration;
        self
    }
}

impl Default for PasskeyConfig {
    fn default() -> Self {
        Self {
            rp_id: None,
            rp_name: "Passkeys IdP".to_string(),
            challenge_ttl: Duration::minutes(5),
            timeout_ms: 60_000,
            discoverable_login: false,
            session_duration: Duration::hours(1),
        }
    }
}

/// A statically registered OAuth client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthClient {
    /// Public client id.
    pub client_id: String,

    /// Exact-match redirect URI allow-list.
    pub redirect_uris: Vec<String>,
}

impl OAuthClient {
    /// Create a client with its redirect allow-list.
    #[must_use]
    pub fn new(client_id: impl Into<String>, redirect_uris: Vec<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uris,
        }
    }
}

/// OAuth 2.1 / OIDC configuration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Registered clients.
    pub clients: Vec<OAuthClient>,

    /// Authorization code lifetime.
    ///
    /// Default: 5 minutes
    pub code_ttl: Duration,

    /// Access token lifetime.
    ///
    /// Default: 1 hour
    pub access_token_ttl: Duration,

    /// ID token lifetime.
    ///
    /// Default: 1 hour
    pub id_token_ttl: Duration,

    /// Refresh token lifetime.
    ///
    /// Default: 14 days
    pub refresh_token_ttl: Duration,

    /// How many retired signing keys stay in the JWKS.
    ///
    /// Default: 2
    pub previous_key_limit: usize,
}

impl OAuthConfig {
    /// Register a client.
    #[must_use]
    pub fn with_client(mut self, client: OAuthClient) -> Self {
        self.clients.push(client);
        self
    }

    /// Set access token lifetime.
    #[must_use]
    pub const fn with_access_token_ttl(mut self, ttl: Duration) -> Self {
        self.access_token_ttl = ttl;
        self
    }

    /// Set ID token lifetime.
    #[must_use]
    pub const fn with_id_token_ttl(mut self, ttl: Duration) -> Self {
        self.id_token_ttl = ttl;
        self
    }

    /// Set refresh token lifetime.
    #[must_use]
    pub const fn with_refresh_token_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_token_ttl = ttl;
        self
    }

    /// Set authorization code lifetime.
    #[must_use]
    pub const fn with_code_ttl(mut self, ttl: Duration) -> Self {
        self.code_ttl = ttl;
        self
    }

    /// Set the retired key limit.
    #[must_use]
    pub const fn with_previous_key_limit(mut self, limit: usize) -> Self {
        self.previous_key_limit = limit;
        self
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            clients: Vec::new(),
            code_ttl: Duration::minutes(5),
            access_token_ttl: Duration::hours(1),
            id_token_ttl: Duration::hours(1),
            refresh_token_ttl: Duration::days(14),
            previous_key_limit: 2,
        }
    }
}

/// Admission quota for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    /// Requests admitted per window.
    pub tokens: u32,

    /// Window length.
    pub window: std::time::Duration,
}

impl Quota {
    /// Quota of `tokens` per `window_secs` seconds.
    #[must_use]
    pub const fn per_window(tokens: u32, window_secs: u64) -> Self {
        Self {
            tokens,
            window: std::time::Duration::from_secs(window_secs),
        }
    }
}

/// Rate limit quotas by bucket name.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Named buckets.
    pub buckets: HashMap<String, Quota>,

    /// Quota applied to unknown buckets.
    pub fallback: Quota,
}

impl RateLimitConfig {
    /// Override or add a bucket.
    #[must_use]
    pub fn with_bucket(mut self, name: impl Into<String>, quota: Quota) -> Self {
        self.buckets.insert(name.into(), quota);
        self
    }

    /// Quota for a bucket, falling back for unknown names.
    #[must_use]
    pub fn quota(&self, bucket: &str) -> Quota {
        self.buckets.get(bucket).copied().unwrap_or(self.fallback)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let buckets = [
            ("webauthn", Quota::per_window(10, 60)),
            ("oauth", Quota::per_window(20, 60)),
            ("credentials", Quota::per_window(30, 60)),
            ("metrics", Quota::per_window(100, 60)),
            ("global", Quota::per_window(200, 60)),
        ]
        .into_iter()
        .map(|(name, quota)| (name.to_string(), quota))
        .collect();

        Self {
            buckets,
            fallback: Quota::per_window(10, 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_quotas() {
        let config = RateLimitConfig::default();
        assert_eq!(config.quota("webauthn"), Quota::per_window(10, 60));
        assert_eq!(config.quota("oauth"), Quota::per_window(20, 60));
        assert_eq!(config.quota("credentials"), Quota::per_window(30, 60));
        assert_eq!(config.quota("metrics"), Quota::per_window(100, 60));
        assert_eq!(config.quota("global"), Quota::per_window(200, 60));
        assert_eq!(config.quota("something-else"), Quota::per_window(10, 60));
    }

    #[test]
    fn test_issuer_trailing_slash_is_trimmed() {
        let config = IdpConfig::new("https://id.example.com/");
        assert_eq!(config.issuer, "https://id.example.com");
    }

    #[test]
    fn test_passkey_config_builder() {
        let config = PasskeyConfig::default()
            .with_rp_id("example.com")
            .with_rp_name("Example")
            .with_discoverable_login(true)
            .with_session_duration(Duration::minutes(30));

        assert_eq!(config.rp_id.as_deref(), Some("example.com"));
        assert_eq!(config.rp_name, "Example");
        assert!(config.discoverable_login);
        assert_eq!(config.session_duration, Duration::minutes(30));
        assert_eq!(config.challenge_ttl, Duration::minutes(5));
        assert_eq!(config.timeout_ms, 60_000);
    }

    #[test]
    fn test_oauth_config_defaults() {
        let config = OAuthConfig::default()
            .with_client(OAuthClient::new("demo", vec!["https://app/cb".into()]));
        assert_eq!(config.clients.len(), 1);
        assert_eq!(config.code_ttl, Duration::minutes(5));
        assert_eq!(config.refresh_token_ttl, Duration::seconds(1_209_600));
        assert_eq!(config.access_token_ttl, Duration::seconds(3600));
        assert_eq!(config.previous_key_limit, 2);
    }
}
