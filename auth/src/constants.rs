//! Identity provider constants.
//!
//! Key layouts, cookie names and protocol values shared between the core
//! and the HTTP layer.

/// Key-value store key layout.
pub mod keys {
    use crate::state::{CeremonyMode, UserId};

    /// `user:<email>` → user aggregate.
    #[must_use]
    pub fn user(email: &str) -> String {
        format!("user:{email}")
    }

    /// `user:id:<user_id>` → email.
    #[must_use]
    pub fn user_by_id(user_id: &UserId) -> String {
        format!("user:id:{user_id}")
    }

    /// `challenge:<mode>:<email>` → pending challenge.
    #[must_use]
    pub fn challenge(mode: CeremonyMode, email: &str) -> String {
        format!("challenge:{mode}:{email}")
    }

    /// `session:<session_id>` → session.
    #[must_use]
    pub fn session(session_id: &str) -> String {
        format!("session:{session_id}")
    }

    /// `auth_code:<code>` → authorization code.
    #[must_use]
    pub fn auth_code(code: &str) -> String {
        format!("auth_code:{code}")
    }

    /// `refresh:<token_id>` → refresh token record.
    #[must_use]
    pub fn refresh(token_id: &str) -> String {
        format!("refresh:{token_id}")
    }

    /// `refresh:rotated:<token_id>` → tombstone for a rotated-away token.
    #[must_use]
    pub fn refresh_rotated(token_id: &str) -> String {
        format!("refresh:rotated:{token_id}")
    }

    /// `refresh:chain:<rotation_id>` → live token id of the chain.
    #[must_use]
    pub fn refresh_chain(rotation_id: &str) -> String {
        format!("refresh:chain:{rotation_id}")
    }

    /// `refresh:revoked:<rotation_id>` → marker for a chain revoked on reuse.
    #[must_use]
    pub fn refresh_revoked(rotation_id: &str) -> String {
        format!("refresh:revoked:{rotation_id}")
    }
}

/// OAuth / OIDC protocol values.
pub mod oauth {
    /// The only supported PKCE method.
    pub const PKCE_METHOD_S256: &str = "S256";

    /// Scope granted to access tokens.
    pub const DEFAULT_SCOPE: &str = "openid email profile";

    /// `grant_type` for code redemption.
    pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";

    /// `grant_type` for refresh.
    pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

    /// Signing algorithm advertised in JWKS and discovery.
    pub const SIGNING_ALG: &str = "RS256";
}

/// WebAuthn protocol values.
pub mod webauthn {
    /// ES256, RS256 (the algorithms `webauthn-rs` accepts for passkeys).
    pub const SUPPORTED_ALGORITHMS: [i64; 2] = [-7, -257];

    /// Credential type for every descriptor and response.
    pub const PUBLIC_KEY: &str = "public-key";

    /// `clientDataJSON.type` for registration.
    pub const CLIENT_DATA_CREATE: &str = "webauthn.create";

    /// `clientDataJSON.type` for authentication.
    pub const CLIENT_DATA_GET: &str = "webauthn.get";

    /// Prefix of generated friendly names.
    pub const FRIENDLY_NAME_PREFIX: &str = "Passkey";
}

/// Session cookie name. The `__Host-` prefix pins it to the exact host, `Secure` and `Path=/`.
pub const SESSION_COOKIE: &str = "__Host-session";
