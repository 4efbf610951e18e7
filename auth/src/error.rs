//! Error types for ceremonies, OAuth flows and the stores behind them.

use thiserror::Error;

/// Result type alias for identity provider operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Error taxonomy for the identity provider.
///
/// Every variant has a stable internal [`code`](AuthError::code) (what the audit
/// log sees), a [`client_code`](AuthError::client_code) (what the caller sees)
/// and an HTTP [`status`](AuthError::status). Several internal codes collapse
/// into one client code so that callers cannot tell which accounts or
/// credentials exist.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    // ═══════════════════════════════════════════════════════════
    // Request Validation
    // ═══════════════════════════════════════════════════════════

    /// Email missing or not an address.
    #[error("Invalid email address")]
    InvalidEmail,

    /// Malformed request or ceremony payload.
    #[error("Invalid request: {reason}")]
    InvalidRequest {
        /// What was wrong with the request
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // WebAuthn Ceremonies
    // ═══════════════════════════════════════════════════════════

    /// No pending challenge for this mode and email (expired or already used).
    #[error("WebAuthn challenge has expired")]
    ChallengeExpired,

    /// Verifier rejected the attestation or assertion.
    #[error("Passkey verification failed: {reason}")]
    VerificationFailed {
        /// Reason for failure
        reason: String,
    },

    /// No user registered under this email.
    #[error("User not found")]
    UserNotFound,

    /// The user has no credential with the presented id.
    #[error("Credential not found")]
    CredentialNotFound,

    // ═══════════════════════════════════════════════════════════
    // OAuth Authorization
    // ═══════════════════════════════════════════════════════════

    /// Unknown client or redirect URI outside the client's allow-list.
    #[error("Unknown client or redirect URI")]
    InvalidClientOrRedirect,

    /// Missing code challenge or a method other than `S256`.
    #[error("Invalid PKCE parameters")]
    InvalidPkce,

    /// No live session for the authorize request.
    #[error("Login required")]
    LoginRequired,

    /// Authorization code unknown, expired or already redeemed.
    #[error("Invalid authorization code")]
    InvalidCode,

    /// Client id does not match the one the code was issued to.
    #[error("Client mismatch")]
    InvalidClient,

    /// Redirect URI does not match the one the code was issued for.
    #[error("Redirect URI mismatch")]
    InvalidRedirectUri,

    /// Code verifier does not hash to the stored challenge.
    #[error("PKCE verification failed")]
    PkceMismatch,

    /// Grant type other than `authorization_code` or `refresh_token`.
    #[error("Unsupported grant type")]
    UnsupportedGrantType,

    // ═══════════════════════════════════════════════════════════
    // Tokens
    // ═══════════════════════════════════════════════════════════

    /// Refresh token unknown or expired.
    #[error("Invalid refresh token")]
    InvalidRefresh,

    /// A refresh token that was already rotated away was presented again.
    #[error("Refresh token reuse detected")]
    RefreshReused,

    /// Access token failed signature, issuer or expiry checks.
    #[error("Invalid access token")]
    InvalidToken,

    // ═══════════════════════════════════════════════════════════
    // Rate Limiting
    // ═══════════════════════════════════════════════════════════

    /// Too many requests in the current window.
    #[error("Too many attempts, please retry after {retry_after:?}")]
    TooManyAttempts {
        /// Duration to wait before retrying
        retry_after: std::time::Duration,
    },

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Key-value store operation failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Key material could not be loaded or a token could not be signed.
    #[error("Signing error: {0}")]
    SigningError(String),

    /// Internal server error (should not be exposed to users).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    /// Stable snake_case identifier used in audit events and logs.
    ///
    /// # Examples
    ///
    /// ```
    /// # use passkey_idp_auth::AuthError;
    /// assert_eq!(AuthError::PkceMismatch.code(), "pkce_mismatch");
    /// assert_eq!(AuthError::UserNotFound.code(), "user_not_found");
    /// ```
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidEmail => "invalid_email",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::ChallengeExpired => "challenge_expired",
            Self::VerificationFailed { .. } => "verification_failed",
            Self::UserNotFound => "user_not_found",
            Self::CredentialNotFound => "credential_not_found",
            Self::InvalidClientOrRedirect => "invalid_client_or_redirect",
            Self::InvalidPkce => "invalid_pkce",
            Self::LoginRequired => "login_required",
            Self::InvalidCode => "invalid_code",
            Self::InvalidClient => "invalid_client",
            Self::InvalidRedirectUri => "invalid_redirect_uri",
            Self::PkceMismatch => "pkce_mismatch",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidRefresh => "invalid_refresh",
            Self::RefreshReused => "refresh_reused",
            Self::InvalidToken => "invalid_token",
            Self::TooManyAttempts { .. } => "rate_limited",
            Self::StorageError(_) => "storage_error",
            Self::SerializationError(_) => "serialization_error",
            Self::SigningError(_) => "signing_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Identifier returned to the caller.
    ///
    /// Account and credential lookups collapse into `verification_failed`,
    /// refresh reuse into `invalid_refresh`, system failures into
    /// `internal_error`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use passkey_idp_auth::AuthError;
    /// assert_eq!(AuthError::CredentialNotFound.client_code(), "verification_failed");
    /// assert_eq!(AuthError::RefreshReused.client_code(), "invalid_refresh");
    /// assert_eq!(AuthError::StorageError("down".into()).client_code(), "internal_error");
    /// ```
    #[must_use]
    pub const fn client_code(&self) -> &'static str {
        match self {
            Self::UserNotFound | Self::CredentialNotFound | Self::VerificationFailed { .. } => {
                "verification_failed"
            }
            Self::RefreshReused => "invalid_refresh",
            Self::StorageError(_)
            | Self::SerializationError(_)
            | Self::SigningError(_)
            | Self::InternalError(_) => "internal_error",
            other => other.code(),
        }
    }

    /// HTTP status code for this error.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::LoginRequired | Self::InvalidToken => 401,
            Self::TooManyAttempts { .. } => 429,
            Self::StorageError(_)
            | Self::SerializationError(_)
            | Self::SigningError(_)
            | Self::InternalError(_) => 500,
            _ => 400,
        }
    }

    /// Returns `true` if this error is due to a fault on our side rather than the caller's.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        self.status() >= 500
    }

    /// Returns `true` if this error indicates a security issue worth alerting on.
    ///
    /// # Examples
    ///
    /// ```
    /// # use passkey_idp_auth::AuthError;
    /// assert!(AuthError::RefreshReused.is_security_issue());
    /// assert!(!AuthError::InvalidEmail.is_security_issue());
    /// ```
    #[must_use]
    pub const fn is_security_issue(&self) -> bool {
        matches!(
            self,
            Self::RefreshReused
                | Self::PkceMismatch
                | Self::InvalidClient
                | Self::InvalidRedirectUri
                | Self::TooManyAttempts { .. }
        )
    }
}
