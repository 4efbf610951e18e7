//! WebAuthn/Passkey verification trait.
//!
//! Signature and attestation verification is delegated: the orchestrator owns
//! challenges, credentials and sessions, and asks a [`WebAuthnVerifier`] only
//! whether a response is genuine for the expected challenge, origin and RP ID.
//!
//! Verifiers that keep their own ceremony state (such as `webauthn-rs`) issue
//! the challenge themselves through the `start_*` hooks; the orchestrator
//! stores that state with the challenge and hands it back at verify time.

use crate::error::Result;
use crate::state::{Credential, DeviceType, User};
use crate::webauthn::{AuthenticationResponse, RegistrationResponse, RelyingParty};

/// A challenge issued by the verifier, with the state it is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CeremonyStart {
    /// Challenge the authenticator must sign (base64url).
    pub challenge: String,

    /// Opaque serialized verifier state.
    pub state: String,
}

/// What a ceremony response must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CeremonyExpectation {
    /// The challenge popped from the store (base64url).
    pub challenge: String,

    /// Expected origin (`scheme://host[:port]`).
    pub origin: String,

    /// Expected Relying Party ID.
    pub rp_id: String,

    /// Whether the UV flag must be set.
    pub require_user_verification: bool,

    /// Verifier state stored with the challenge at `begin`.
    pub state: Option<String>,
}

/// Verified registration output.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedRegistration {
    /// Credential id (base64url).
    pub credential_id: String,

    /// Credential public key (base64url).
    pub public_key: String,

    /// Initial signature counter.
    pub counter: u32,

    /// Single-device or synced.
    pub device_type: DeviceType,

    /// Backup state flag.
    pub backed_up: bool,

    /// Authenticator model, when available.
    pub aaguid: Option<String>,
}

/// Verified authentication output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedAuthentication {
    /// Counter reported by the authenticator.
    pub new_counter: u32,
}

/// WebAuthn verification capability.
///
/// # Implementation Notes
///
/// - Check `clientDataJSON` type, challenge and origin
/// - Check the RP ID hash and flags in `authenticatorData`
/// - Verify the attestation (registration) or signature (authentication)
pub trait WebAuthnVerifier: Send + Sync {
    /// Issue a registration challenge for `user`.
    ///
    /// `None` lets the orchestrator generate a random challenge.
    ///
    /// # Errors
    ///
    /// Returns error if the verifier cannot start a ceremony for this RP.
    fn start_registration(&self, _user: &User, _rp: &RelyingParty) -> Result<Option<CeremonyStart>> {
        Ok(None)
    }

    /// Issue an authentication challenge for `user`'s credentials.
    ///
    /// `None` lets the orchestrator generate a random challenge.
    ///
    /// # Errors
    ///
    /// Returns error if the verifier cannot start a ceremony for this RP.
    fn start_authentication(&self, _user: &User, _rp: &RelyingParty) -> Result<Option<CeremonyStart>> {
        Ok(None)
    }

    /// Verify a registration (attestation) response.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::VerificationFailed` if the response does not match
    /// the expectation or the attestation is invalid.
    fn verify_registration(
        &self,
        response: &RegistrationResponse,
        expected: &CeremonyExpectation,
    ) -> impl std::future::Future<Output = Result<VerifiedRegistration>> + Send;

    /// Verify an authentication (assertion) response against a stored credential.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::VerificationFailed` if the response does not match
    /// the expectation or the signature is invalid.
    fn verify_authentication(
        &self,
        response: &AuthenticationResponse,
        credential: &Credential,
        expected: &CeremonyExpectation,
    ) -> impl std::future::Future<Output = Result<VerifiedAuthentication>> + Send;
}
