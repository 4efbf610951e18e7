//! Passkey verification backed by `webauthn-rs`.
//!
//! [`PasskeyVerifier`] lets `webauthn-rs` issue each challenge and keeps the
//! library's ceremony state next to it in the challenge store. On verify the
//! state is restored and the library checks client data, the RP ID hash, the
//! UV flag, the attestation (registration) and the assertion signature
//! (authentication).
//!
//! A credential's `public_key` holds the serialized `webauthn-rs` `Passkey`.
//! Counters are tracked by the orchestrator, not written back into the stored
//! `Passkey`, so the library never rejects a synced passkey's stale counter.

use crate::constants::webauthn::{CLIENT_DATA_CREATE, CLIENT_DATA_GET, PUBLIC_KEY};
use crate::error::{AuthError, Result};
use crate::providers::{
    CeremonyExpectation, CeremonyStart, VerifiedAuthentication, VerifiedRegistration, WebAuthnVerifier,
};
use crate::state::{Credential, DeviceType, User};
use crate::utils::{b64url_decode, b64url_encode, local_part};
use crate::webauthn::{AuthenticationResponse, ClientData, RegistrationResponse, RelyingParty};
use constant_time_eq::constant_time_eq;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use webauthn_rs::prelude::{
    CredentialID, Passkey, PasskeyAuthentication, PasskeyRegistration, PublicKeyCredential,
    RegisterPublicKeyCredential, Url, Webauthn, WebauthnBuilder,
};

fn failed(reason: impl Into<String>) -> AuthError {
    AuthError::VerificationFailed {
        reason: reason.into(),
    }
}

/// Check `clientDataJSON` against the expectation.
///
/// # Errors
///
/// Returns `AuthError::VerificationFailed` on type, challenge or origin mismatch.
pub fn check_client_data(
    client_data_json: &str,
    ceremony_type: &str,
    expected: &CeremonyExpectation,
) -> Result<ClientData> {
    let client_data =
        ClientData::decode(client_data_json).map_err(|_| failed("clientDataJSON unreadable"))?;

    if client_data.ceremony_type != ceremony_type {
        return Err(failed("unexpected clientDataJSON type"));
    }
    if !constant_time_eq(client_data.challenge.as_bytes(), expected.challenge.as_bytes()) {
        return Err(failed("challenge mismatch"));
    }
    if client_data.origin != expected.origin {
        return Err(failed("origin mismatch"));
    }

    Ok(client_data)
}

/// Cryptographic verifier built on `webauthn-rs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasskeyVerifier;

impl PasskeyVerifier {
    /// Create a verifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// `webauthn-rs` instance for one RP ID and origin.
    fn webauthn(rp_id: &str, rp_name: &str, origin: &str) -> Result<Webauthn> {
        let url = Url::parse(origin).map_err(|e| AuthError::InvalidRequest {
            reason: format!("origin {origin:?}: {e}"),
        })?;

        WebauthnBuilder::new(rp_id, &url)
            .and_then(|builder| builder.rp_name(rp_name).build())
            .map_err(|e| AuthError::InvalidRequest {
                reason: format!("relying party {rp_id:?} for {origin:?}: {e}"),
            })
    }
}

/// Challenge embedded in `webauthn-rs` browser options (`publicKey.challenge`).
fn challenge_of(options: &impl serde::Serialize) -> Result<String> {
    let value = serde_json::to_value(options).map_err(|e| AuthError::SerializationError(e.to_string()))?;
    value
        .get("publicKey")
        .and_then(|pk| pk.get("challenge"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AuthError::InternalError("ceremony options carry no challenge".into()))
}

fn save_state(state: &impl serde::Serialize) -> Result<String> {
    serde_json::to_string(state).map_err(|e| AuthError::SerializationError(e.to_string()))
}

fn restore_state<T: DeserializeOwned>(expected: &CeremonyExpectation) -> Result<T> {
    let raw = expected
        .state
        .as_deref()
        .ok_or_else(|| failed("no ceremony state for this challenge"))?;
    serde_json::from_str(raw).map_err(|e| failed(format!("ceremony state unreadable: {e}")))
}

fn parse_as<T: DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|e| failed(format!("{what}: {e}")))
}

impl WebAuthnVerifier for PasskeyVerifier {
    fn start_registration(&self, user: &User, rp: &RelyingParty) -> Result<Option<CeremonyStart>> {
        let webauthn = Self::webauthn(&rp.id, &rp.name, &rp.origin)?;
        let exclude: Vec<CredentialID> = user
            .credentials
            .iter()
            .filter_map(|c| b64url_decode(&c.cred_id))
            .map(CredentialID::from)
            .collect();

        let (options, state) = webauthn
            .start_passkey_registration(user.user_id.0, &user.email, local_part(&user.email), Some(exclude))
            .map_err(|e| AuthError::InternalError(format!("starting registration: {e}")))?;

        Ok(Some(CeremonyStart {
            challenge: challenge_of(&options)?,
            state: save_state(&state)?,
        }))
    }

    fn start_authentication(&self, user: &User, rp: &RelyingParty) -> Result<Option<CeremonyStart>> {
        let webauthn = Self::webauthn(&rp.id, &rp.name, &rp.origin)?;
        let passkeys: Vec<Passkey> = user
            .credentials
            .iter()
            .filter_map(|c| match serde_json::from_str(&c.public_key) {
                Ok(passkey) => Some(passkey),
                Err(e) => {
                    tracing::warn!(user_id = %user.user_id, error = %e, "Stored credential is not a passkey");
                    None
                }
            })
            .collect();
        if passkeys.is_empty() {
            return Err(AuthError::InternalError("user has no usable passkey".into()));
        }

        let (options, state) = webauthn
            .start_passkey_authentication(&passkeys)
            .map_err(|e| AuthError::InternalError(format!("starting authentication: {e}")))?;

        Ok(Some(CeremonyStart {
            challenge: challenge_of(&options)?,
            state: save_state(&state)?,
        }))
    }

    async fn verify_registration(
        &self,
        response: &RegistrationResponse,
        expected: &CeremonyExpectation,
    ) -> Result<VerifiedRegistration> {
        let state: PasskeyRegistration = restore_state(expected)?;
        check_client_data(&response.response.client_data_json, CLIENT_DATA_CREATE, expected)?;

        let credential: RegisterPublicKeyCredential = parse_as(
            json!({
                "id": response.id,
                "rawId": response.raw_id.as_deref().unwrap_or(&response.id),
                "type": PUBLIC_KEY,
                "response": {
                    "attestationObject": response.response.attestation_object,
                    "clientDataJSON": response.response.client_data_json,
                },
                "extensions": {},
            }),
            "registration response",
        )?;

        let passkey = Self::webauthn(&expected.rp_id, &expected.rp_id, &expected.origin)?
            .finish_passkey_registration(&credential, &state)
            .map_err(|e| failed(e.to_string()))?;

        let stored = serde_json::to_value(&passkey).map_err(|e| AuthError::SerializationError(e.to_string()))?;
        let cred = stored.get("cred");
        let flag = |name: &str| cred.and_then(|c| c.get(name)).and_then(Value::as_bool).unwrap_or(false);
        let counter = cred
            .and_then(|c| c.get("counter"))
            .and_then(Value::as_u64)
            .and_then(|c| u32::try_from(c).ok())
            .unwrap_or(0);

        Ok(VerifiedRegistration {
            credential_id: b64url_encode(passkey.cred_id().as_slice()),
            public_key: stored.to_string(),
            counter,
            device_type: if flag("backup_eligible") { DeviceType::MultiDevice } else { DeviceType::SingleDevice },
            backed_up: flag("backup_state"),
            aaguid: None,
        })
    }

    async fn verify_authentication(
        &self,
        response: &AuthenticationResponse,
        credential: &Credential,
        expected: &CeremonyExpectation,
    ) -> Result<VerifiedAuthentication> {
        let state: PasskeyAuthentication = restore_state(expected)?;
        check_client_data(&response.response.client_data_json, CLIENT_DATA_GET, expected)?;

        let assertion: PublicKeyCredential = parse_as(
            json!({
                "id": response.id,
                "rawId": response.raw_id.as_deref().unwrap_or(&response.id),
                "type": PUBLIC_KEY,
                "response": {
                    "authenticatorData": response.response.authenticator_data,
                    "clientDataJSON": response.response.client_data_json,
                    "signature": response.response.signature,
                    "userHandle": response.response.user_handle,
                },
                "extensions": {},
            }),
            "authentication response",
        )?;

        let result = Self::webauthn(&expected.rp_id, &expected.rp_id, &expected.origin)?
            .finish_passkey_authentication(&assertion, &state)
            .map_err(|e| failed(e.to_string()))?;

        let expected_id = b64url_decode(&credential.cred_id).unwrap_or_default();
        if !constant_time_eq(result.cred_id().as_slice(), &expected_id) {
            return Err(failed("credential id mismatch"));
        }

        Ok(VerifiedAuthentication {
            new_counter: result.counter(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use crate::config::PasskeyConfig;
    use crate::webauthn::response::AttestationResponse;

    const ORIGIN: &str = "https://id.example.com";

    fn rp() -> RelyingParty {
        RelyingParty::from_request("id.example.com", "https", &PasskeyConfig::default())
    }

    fn expectation(challenge: &str, state: Option<String>) -> CeremonyExpectation {
        CeremonyExpectation {
            challenge: challenge.into(),
            origin: ORIGIN.into(),
            rp_id: "id.example.com".into(),
            require_user_verification: true,
            state,
        }
    }

    fn client_data(kind: &str, challenge: &str, origin: &str) -> String {
        b64url_encode(json!({"type": kind, "challenge": challenge, "origin": origin}).to_string())
    }

    fn registration(challenge: &str) -> RegistrationResponse {
        RegistrationResponse {
            id: "bmV3".into(),
            raw_id: None,
            credential_type: PUBLIC_KEY.into(),
            response: AttestationResponse {
                client_data_json: client_data(CLIENT_DATA_CREATE, challenge, ORIGIN),
                attestation_object: b64url_encode("not-cbor"),
                authenticator_data: None,
                public_key: None,
                transports: vec![],
            },
            authenticator_attachment: None,
        }
    }

    #[test]
    fn test_client_data_checks() {
        let expected = expectation("the-challenge", None);

        let ok = client_data(CLIENT_DATA_GET, "the-challenge", ORIGIN);
        assert!(check_client_data(&ok, CLIENT_DATA_GET, &expected).is_ok());

        for bad in [
            client_data(CLIENT_DATA_CREATE, "the-challenge", ORIGIN),
            client_data(CLIENT_DATA_GET, "other", ORIGIN),
            client_data(CLIENT_DATA_GET, "the-challenge", "https://evil.example"),
            "!!".to_string(),
        ] {
            assert!(matches!(
                check_client_data(&bad, CLIENT_DATA_GET, &expected),
                Err(AuthError::VerificationFailed { .. })
            ));
        }
    }

    #[test]
    fn test_registration_challenge_comes_with_state() {
        let start = PasskeyVerifier::new()
            .start_registration(&User::new("alice@example.com"), &rp())
            .unwrap()
            .unwrap();

        assert!(b64url_decode(&start.challenge).is_some_and(|bytes| bytes.len() >= 16));
        assert!(serde_json::from_str::<Value>(&start.state).is_ok());
    }

    #[test]
    fn test_origin_outside_rp_id_rejected() {
        let config = PasskeyConfig::default().with_rp_id("example.com");
        let foreign = RelyingParty::from_request("evil.example", "https", &config);

        let result = PasskeyVerifier::new().start_registration(&User::new("alice@example.com"), &foreign);
        assert!(matches!(result, Err(AuthError::InvalidRequest { .. })));
    }

    #[test]
    fn test_authentication_needs_a_stored_passkey() {
        let mut user = User::new("alice@example.com");
        user.credentials.push(Credential {
            cred_id: "Y3JlZA".into(),
            public_key: "not a passkey".into(),
            counter: 0,
            transports: vec![],
            device_type: DeviceType::SingleDevice,
            backed_up: false,
            aaguid: None,
            friendly_name: "Passkey 1".into(),
            created_at: chrono::Utc::now(),
            last_used_at: None,
        });

        let result = PasskeyVerifier::new().start_authentication(&user, &rp());
        assert!(matches!(result, Err(AuthError::InternalError(_))));
    }

    #[tokio::test]
    async fn test_registration_without_state_rejected() {
        let result = PasskeyVerifier::new()
            .verify_registration(&registration("abc"), &expectation("abc", None))
            .await;
        assert!(matches!(result, Err(AuthError::VerificationFailed { .. })));
    }

    #[tokio::test]
    async fn test_forged_attestation_rejected() {
        let verifier = PasskeyVerifier::new();
        let start = verifier
            .start_registration(&User::new("alice@example.com"), &rp())
            .unwrap()
            .unwrap();

        // Client data is right; the attestation object is not a real one
        let result = verifier
            .verify_registration(&registration(&start.challenge), &expectation(&start.challenge, Some(start.state)))
            .await;
        assert!(matches!(result, Err(AuthError::VerificationFailed { .. })));
    }
}
