//! Domain records persisted by the identity provider.
//!
//! Everything here is serialized as JSON into the key-value store, so field
//! names are part of the storage format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Unique identifier for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub uuid::Uuid);

impl UserId {
    /// Generate a new random `UserId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse a `UserId` from its hyphenated string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        uuid::Uuid::parse_str(value).ok().map(Self)
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque session identifier carried in the session cookie.
///
/// 256 bits of randomness, base64url encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new cryptographically secure random `SessionId`.
    #[must_use]
    pub fn new() -> Self {
        Self(crate::utils::random_token(32))
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Users and Credentials
// ═══════════════════════════════════════════════════════════════════════

/// A user and every passkey registered to them.
///
/// Read and replaced as a whole aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Stable user id (also the WebAuthn user handle).
    pub user_id: UserId,

    /// Normalized email, the natural key.
    pub email: String,

    /// Registered passkeys.
    #[serde(default)]
    pub credentials: Vec<Credential>,

    /// Account creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a user with no credentials.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(),
            email: email.into(),
            credentials: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Find a credential by its base64url id.
    #[must_use]
    pub fn credential(&self, cred_id: &str) -> Option<&Credential> {
        self.credentials.iter().find(|c| c.cred_id == cred_id)
    }

    /// Mutable lookup by credential id.
    pub fn credential_mut(&mut self, cred_id: &str) -> Option<&mut Credential> {
        self.credentials.iter_mut().find(|c| c.cred_id == cred_id)
    }

    /// Whether a credential with this id is already registered.
    #[must_use]
    pub fn has_credential(&self, cred_id: &str) -> bool {
        self.credential(cred_id).is_some()
    }
}

/// Authenticator storage class reported at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceType {
    /// Bound to one authenticator.
    SingleDevice,

    /// Synced passkey (may be restored on other devices).
    MultiDevice,
}

/// A registered passkey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Credential id (base64url).
    pub cred_id: String,

    /// Public key material as returned by the verifier (base64url).
    pub public_key: String,

    /// Signature counter. Never decreases.
    pub counter: u32,

    /// Transport hints (`usb`, `internal`, `hybrid`, ...).
    #[serde(default)]
    pub transports: Vec<String>,

    /// Single-device or synced.
    pub device_type: DeviceType,

    /// Backup state at registration.
    pub backed_up: bool,

    /// Authenticator model identifier, when the verifier extracts one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aaguid: Option<String>,

    /// Display label, `Passkey N`.
    pub friendly_name: String,

    /// Registration timestamp.
    pub created_at: DateTime<Utc>,

    /// Last successful authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

// ═══════════════════════════════════════════════════════════════════════
// Sessions and Challenges
// ═══════════════════════════════════════════════════════════════════════

/// Which WebAuthn ceremony a challenge belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CeremonyMode {
    /// `navigator.credentials.create()`
    Register,

    /// `navigator.credentials.get()`
    Authenticate,
}

impl CeremonyMode {
    /// Lowercase name used in storage keys and responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Authenticate => "authenticate",
        }
    }
}

impl fmt::Display for CeremonyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending single-use challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeRecord {
    /// base64url nonce.
    pub challenge: String,

    /// Verifier ceremony state bound to this challenge, if the verifier keeps any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Expiry (double-checked on pop).
    pub expires_at: DateTime<Utc>,
}

/// User session.
///
/// Sessions are ephemeral (stored with a TTL that mirrors `expires_at`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub session_id: SessionId,

    /// Owner.
    pub user_id: UserId,

    /// Owner's email (cached).
    pub email: String,

    /// Session creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Session expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Check if the session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// OAuth Records
// ═══════════════════════════════════════════════════════════════════════

/// A PKCE-bound authorization code awaiting redemption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// The code itself (base64url, 32 random bytes).
    pub code: String,

    /// Client the code was issued to.
    pub client_id: String,

    /// Redirect URI the code was issued for.
    pub redirect_uri: String,

    /// `base64url(SHA256(code_verifier))`.
    pub code_challenge: String,

    /// Always `S256`.
    pub method: String,

    /// Authenticated user.
    pub user_id: UserId,

    /// Authenticated user's email.
    pub email: String,

    /// Issue timestamp.
    pub created_at: DateTime<Utc>,

    /// Expiry.
    pub expires_at: DateTime<Utc>,
}

/// A live refresh token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// Bearer value (UUID v4).
    pub token_id: String,

    /// Owner.
    pub user_id: UserId,

    /// Client the token was issued to.
    pub client_id: String,

    /// Owner's email, so refreshed ID tokens keep the claim.
    pub email: String,

    /// Shared by every token in one rotation chain.
    pub rotation_id: String,

    /// Token this one replaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_id: Option<String>,

    /// Issue timestamp.
    pub created_at: DateTime<Utc>,

    /// Expiry.
    pub expires_at: DateTime<Utc>,
}
