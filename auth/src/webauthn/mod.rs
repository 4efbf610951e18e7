//! WebAuthn/Passkey ceremonies.
//!
//! # Flow
//!
//! 1. `begin(email)`: pick register or authenticate, store a fresh challenge,
//!    return browser options
//! 2. Browser runs `navigator.credentials.create()` / `.get()`
//! 3. `verify_registration` / `verify_authentication`: consume the challenge,
//!    validate the payload, ask the [`WebAuthnVerifier`](crate::providers::WebAuthnVerifier),
//!    persist the credential, create a session
//!
//! # Security
//!
//! - A challenge is consumed by the first verify attempt, successful or not
//! - Origin and RP ID are derived from the request, never from the payload
//! - Signature counters never decrease; regressions are audited
//! - A user who already has a passkey can only add another from a live
//!   session of their own

pub mod ceremony;
pub mod options;
pub mod response;
pub mod verifier;

pub use ceremony::{CeremonyOrchestrator, CeremonyOutcome};
pub use options::{
    AuthenticationOptions, BeginCeremony, CeremonyOptions, CredentialDescriptor,
    RegistrationOptions, RpEntity, UserEntity,
};
pub use response::{AuthenticationResponse, ClientData, RegistrationResponse};
pub use verifier::PasskeyVerifier;

use crate::config::PasskeyConfig;
use std::net::IpAddr;

/// The Relying Party a request is served as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelyingParty {
    /// RP ID (host without port, unless pinned in config).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Expected origin, `scheme://host[:port]`.
    pub origin: String,
}

impl RelyingParty {
    /// Derive the RP from the request's effective host and scheme.
    ///
    /// # Examples
    ///
    /// ```
    /// use passkey_idp_auth::config::PasskeyConfig;
    /// use passkey_idp_auth::webauthn::RelyingParty;
    ///
    /// let rp = RelyingParty::from_request("localhost:3000", "http", &PasskeyConfig::default());
    /// assert_eq!(rp.id, "localhost");
    /// assert_eq!(rp.origin, "http://localhost:3000");
    /// ```
    #[must_use]
    pub fn from_request(host: &str, scheme: &str, config: &PasskeyConfig) -> Self {
        Self {
            id: config
                .rp_id
                .clone()
                .unwrap_or_else(|| strip_port(host).to_string()),
            name: config.rp_name.clone(),
            origin: format!("{scheme}://{host}"),
        }
    }
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port))
            if !port.is_empty()
                && port.bytes().all(|b| b.is_ascii_digit())
                && (name.ends_with(']') || !name.contains(':')) =>
        {
            name
        }
        _ => host,
    }
}

/// Per-request inputs to a ceremony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CeremonyContext {
    /// Relying Party for this request.
    pub rp: RelyingParty,
    /// Client address, for audit.
    pub client_ip: Option<IpAddr>,
    /// Session cookie presented with the request, if any.
    pub session_id: Option<String>,
}

impl CeremonyContext {
    /// Build a context for a caller without a session.
    #[must_use]
    pub const fn new(rp: RelyingParty, client_ip: Option<IpAddr>) -> Self {
        Self {
            rp,
            client_ip,
            session_id: None,
        }
    }

    /// Attach the caller's session cookie.
    #[must_use]
    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }
}
