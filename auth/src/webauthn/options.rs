//! Ceremony options sent to the browser.
//!
//! Serialized in the `PublicKeyCredentialCreationOptionsJSON` /
//! `PublicKeyCredentialRequestOptionsJSON` shapes.

use crate::constants::webauthn::{PUBLIC_KEY, SUPPORTED_ALGORITHMS};
use crate::state::{CeremonyMode, Credential};
use serde::{Deserialize, Serialize};

/// Relying Party entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpEntity {
    /// RP ID (a registrable domain).
    pub id: String,
    /// Display name.
    pub name: String,
}

/// User entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// base64url user handle.
    pub id: String,
    /// Account name (the email).
    pub name: String,
    /// Display name (email local part).
    pub display_name: String,
}

/// Accepted credential algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PubKeyCredParam {
    /// Always `public-key`.
    #[serde(rename = "type")]
    pub credential_type: &'static str,
    /// COSE algorithm identifier.
    pub alg: i64,
}

/// Reference to an existing credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    /// Always `public-key`.
    #[serde(rename = "type")]
    pub credential_type: String,
    /// base64url credential id.
    pub id: String,
    /// Transport hints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<String>,
}

impl From<&Credential> for CredentialDescriptor {
    fn from(credential: &Credential) -> Self {
        Self {
            credential_type: PUBLIC_KEY.to_string(),
            id: credential.cred_id.clone(),
            transports: credential.transports.clone(),
        }
    }
}

/// Authenticator requirements for registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    /// `preferred`: create a discoverable credential when possible.
    pub resident_key: String,
    /// `required`: the authenticator must verify the user.
    pub user_verification: String,
}

/// Options for `navigator.credentials.create()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptions {
    /// Relying party.
    pub rp: RpEntity,
    /// Account being registered.
    pub user: UserEntity,
    /// base64url challenge.
    pub challenge: String,
    /// Accepted algorithms (ES256, RS256).
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    /// Client timeout in milliseconds.
    pub timeout: u32,
    /// Attestation conveyance (`none`).
    pub attestation: String,
    /// Credentials the authenticator must not re-register.
    pub exclude_credentials: Vec<CredentialDescriptor>,
    /// Authenticator requirements.
    pub authenticator_selection: AuthenticatorSelection,
}

impl RegistrationOptions {
    /// Build registration options.
    #[must_use]
    pub fn new(
        rp: RpEntity,
        user: UserEntity,
        challenge: String,
        timeout: u32,
        existing: &[Credential],
    ) -> Self {
        Self {
            rp,
            user,
            challenge,
            pub_key_cred_params: SUPPORTED_ALGORITHMS
                .iter()
                .map(|&alg| PubKeyCredParam {
                    credential_type: PUBLIC_KEY,
                    alg,
                })
                .collect(),
            timeout,
            attestation: "none".to_string(),
            exclude_credentials: existing.iter().map(CredentialDescriptor::from).collect(),
            authenticator_selection: AuthenticatorSelection {
                resident_key: "preferred".to_string(),
                user_verification: "required".to_string(),
            },
        }
    }
}

/// Options for `navigator.credentials.get()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOptions {
    /// base64url challenge.
    pub challenge: String,
    /// RP ID the assertion is scoped to.
    pub rp_id: String,
    /// Client timeout in milliseconds.
    pub timeout: u32,
    /// `required`.
    pub user_verification: String,
    /// Credentials the browser may use; omitted for discoverable login.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_credentials: Option<Vec<CredentialDescriptor>>,
}

/// Either option set, serialized without a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CeremonyOptions {
    /// Registration options.
    Registration(RegistrationOptions),
    /// Authentication options.
    Authentication(AuthenticationOptions),
}

impl CeremonyOptions {
    /// The challenge embedded in the options.
    #[must_use]
    pub fn challenge(&self) -> &str {
        match self {
            Self::Registration(o) => &o.challenge,
            Self::Authentication(o) => &o.challenge,
        }
    }
}

/// Output of `begin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BeginCeremony {
    /// Ceremony the browser should run.
    pub mode: CeremonyMode,
    /// Options for that ceremony.
    pub options: CeremonyOptions,
}
