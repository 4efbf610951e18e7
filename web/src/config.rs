//! Server configuration from the environment.
//!
//! Values come from process environment variables, optionally seeded from a
//! `.env` file by the binary. Everything except the signing key has a
//! development default.

use crate::extractors::TrustedProxies;
use anyhow::{Context, Result};
use chrono::Duration;
use passkey_idp_auth::config::{IdpConfig, OAuthClient, OAuthConfig, PasskeyConfig};
use passkey_idp_auth::oauth::SigningKey;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Runtime environment, from `APP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    /// Local development (default).
    Development,
    /// Test runs.
    Test,
    /// Production: error details are withheld from clients.
    Production,
}

impl AppEnv {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => anyhow::bail!("APP_ENV must be development, test or production, got {other:?}"),
        }
    }
}

/// Everything the binary needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (`BIND_ADDR`).
    pub bind_addr: SocketAddr,
    /// Redis connection URL (`REDIS_URL`).
    pub redis_url: String,
    /// PEM file holding the RSA signing key (`JWK_PRIVATE_PEM_PATH`).
    pub signing_key_path: Option<PathBuf>,
    /// Key id published for the signing key (`ACTIVE_KID`).
    pub active_kid: String,
    /// Retired keys still accepted, newest first (`JWK_PREVIOUS_KEYS`,
    /// comma-separated `kid=path` pairs).
    pub previous_keys: Vec<(String, PathBuf)>,
    /// Proxies whose `X-Forwarded-For` is believed (`TRUSTED_PROXIES`).
    pub trusted_proxies: TrustedProxies,
    /// Write audit events (`ENABLE_AUDIT_LOGGING`).
    pub audit_enabled: bool,
    /// Runtime environment (`APP_ENV`).
    pub env: AppEnv,
    /// Identity provider settings.
    pub idp: IdpConfig,
}

impl ServerConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is present but malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is present but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let seconds = |key: &str, default: i64| -> Result<Duration> {
            match var(key) {
                Some(raw) => {
                    let secs: i64 = raw.trim().parse().with_context(|| format!("{key} must be an integer"))?;
                    anyhow::ensure!(secs > 0, "{key} must be positive");
                    Ok(Duration::seconds(secs))
                }
                None => Ok(Duration::seconds(default)),
            }
        };

        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .context("BIND_ADDR must be host:port")?;
        let env = var("APP_ENV").map_or(Ok(AppEnv::Development), |v| AppEnv::parse(&v))?;
        let audit_enabled = var("ENABLE_AUDIT_LOGGING").is_none_or(|v| v.trim() != "false");

        let mut passkey = PasskeyConfig::default()
            .with_session_duration(seconds("SESSION_TTL_SEC", 3600)?);
        if let Some(rp_id) = var("RP_ID") {
            passkey = passkey.with_rp_id(rp_id);
        }
        if let Some(rp_name) = var("RP_NAME") {
            passkey = passkey.with_rp_name(rp_name);
        }

        let client_id = var("OAUTH_CLIENT_ID").unwrap_or_else(|| "demo-client".to_string());
        let redirect_uris = list(var("OAUTH_REDIRECT_URIS")).collect();

        let oauth = OAuthConfig::default()
            .with_client(OAuthClient::new(client_id, redirect_uris))
            .with_access_token_ttl(seconds("ACCESS_TOKEN_TTL_SEC", 3600)?)
            .with_id_token_ttl(seconds("ID_TOKEN_TTL_SEC", 3600)?)
            .with_refresh_token_ttl(seconds("REFRESH_TOKEN_TTL_SEC", 14 * 24 * 3600)?);

        let issuer = var("ISSUER").unwrap_or_else(|| "http://localhost:3000".to_string());

        let previous_keys = list(var("JWK_PREVIOUS_KEYS"))
            .map(|entry| {
                let (kid, path) = entry
                    .split_once('=')
                    .filter(|(kid, path)| !kid.trim().is_empty() && !path.trim().is_empty())
                    .with_context(|| format!("JWK_PREVIOUS_KEYS entry {entry:?} must be kid=path"))?;
                Ok((kid.trim().to_string(), PathBuf::from(path.trim())))
            })
            .collect::<Result<Vec<_>>>()?;

        let trusted_proxies = list(var("TRUSTED_PROXIES"))
            .map(|entry| {
                entry
                    .parse::<IpAddr>()
                    .with_context(|| format!("TRUSTED_PROXIES entry {entry:?} is not an IP address"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            bind_addr,
            redis_url: var("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
            signing_key_path: var("JWK_PRIVATE_PEM_PATH").map(PathBuf::from),
            active_kid: var("ACTIVE_KID").unwrap_or_else(|| "kid-1".to_string()),
            previous_keys,
            trusted_proxies: TrustedProxies::new(trusted_proxies),
            audit_enabled,
            env,
            idp: IdpConfig::new(issuer).with_passkey(passkey).with_oauth(oauth),
        })
    }

    /// Whether client-facing errors omit internal detail.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.env == AppEnv::Production
    }

    /// Load the token signing key.
    ///
    /// Without `JWK_PRIVATE_PEM_PATH` an ephemeral key is generated, except in
    /// production. Tokens signed with an ephemeral key stop verifying on restart.
    ///
    /// # Errors
    ///
    /// Returns error if the file is unreadable or not an RSA key, or if
    /// production runs without a key file.
    pub fn load_signing_key(&self) -> Result<SigningKey> {
        match &self.signing_key_path {
            Some(path) => {
                let pem = std::fs::read_to_string(path)
                    .with_context(|| format!("reading signing key {}", path.display()))?;
                let key = SigningKey::from_pem(self.active_kid.clone(), &pem)
                    .with_context(|| format!("parsing signing key {}", path.display()))?;
                tracing::info!(kid = %self.active_kid, path = %path.display(), "Signing key loaded");
                Ok(key)
            }
            None => {
                anyhow::ensure!(!self.is_production(), "JWK_PRIVATE_PEM_PATH is required in production");
                tracing::warn!(kid = %self.active_kid, "No signing key configured, generating an ephemeral one");
                Ok(SigningKey::generate(self.active_kid.clone())?)
            }
        }
    }

    /// Load the retired keys listed in `JWK_PREVIOUS_KEYS`, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if a file is unreadable or not an RSA key.
    pub fn load_previous_keys(&self) -> Result<Vec<SigningKey>> {
        self.previous_keys
            .iter()
            .map(|(kid, path)| {
                let pem = std::fs::read_to_string(path)
                    .with_context(|| format!("reading previous key {}", path.display()))?;
                SigningKey::from_pem(kid.clone(), &pem)
                    .with_context(|| format!("parsing previous key {}", path.display()))
            })
            .collect()
    }
}

/// Non-empty trimmed entries of a comma-separated variable.
fn list(raw: Option<String>) -> impl Iterator<Item = String> {
    raw.into_iter()
        .flat_map(|raw| raw.split(',').map(str::trim).map(str::to_string).collect::<Vec<_>>())
        .filter(|entry| !entry.is_empty())
}
