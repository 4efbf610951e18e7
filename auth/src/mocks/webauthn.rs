//! Mock `WebAuthn` verifier for testing.

use crate::constants::webauthn::{CLIENT_DATA_CREATE, CLIENT_DATA_GET};
use crate::error::{AuthError, Result};
use crate::providers::{
    CeremonyExpectation, VerifiedAuthentication, VerifiedRegistration, WebAuthnVerifier,
};
use crate::state::{Credential, DeviceType};
use crate::webauthn::verifier::check_client_data;
use crate::webauthn::{AuthenticationResponse, RegistrationResponse};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Mock `WebAuthn` verifier.
///
/// Checks `clientDataJSON` like the real verifier but skips authenticator
/// data, so tests only need to echo the challenge and origin. The counter it
/// reports, the backup state and outright failure are all scriptable.
#[derive(Debug, Clone, Default)]
pub struct MockWebAuthnVerifier {
    reported_counter: Arc<Mutex<Option<u32>>>,
    synced: Arc<AtomicBool>,
    fail: Arc<AtomicBool>,
}

impl MockWebAuthnVerifier {
    /// Create a new mock verifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report this counter on authentication instead of `stored + 1`.
    pub fn set_reported_counter(&self, counter: Option<u32>) {
        if let Ok(mut slot) = self.reported_counter.lock() {
            *slot = counter;
        }
    }

    /// Register credentials as synced (`multiDevice`, backed up).
    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::SeqCst);
    }

    /// Fail every verification.
    pub fn set_fail_verification(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn ensure_passing(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuthError::VerificationFailed {
                reason: "mock verifier configured to fail".into(),
            });
        }
        Ok(())
    }
}

impl WebAuthnVerifier for MockWebAuthnVerifier {
    async fn verify_registration(
        &self,
        response: &RegistrationResponse,
        expected: &CeremonyExpectation,
    ) -> Result<VerifiedRegistration> {
        self.ensure_passing()?;
        check_client_data(&response.response.client_data_json, CLIENT_DATA_CREATE, expected)?;

        let synced = self.synced.load(Ordering::SeqCst);
        Ok(VerifiedRegistration {
            credential_id: response.id.clone(),
            public_key: response.response.attestation_object.clone(),
            counter: 0,
            device_type: if synced { DeviceType::MultiDevice } else { DeviceType::SingleDevice },
            backed_up: synced,
            aaguid: None,
        })
    }

    async fn verify_authentication(
        &self,
        response: &AuthenticationResponse,
        credential: &Credential,
        expected: &CeremonyExpectation,
    ) -> Result<VerifiedAuthentication> {
        self.ensure_passing()?;
        check_client_data(&response.response.client_data_json, CLIENT_DATA_GET, expected)?;

        let scripted = self.reported_counter.lock().ok().and_then(|slot| *slot);
        Ok(VerifiedAuthentication {
            new_counter: scripted.unwrap_or_else(|| credential.counter.saturating_add(1)),
        })
    }
}

/// Registration payload the mock verifier accepts for this challenge.
#[must_use]
pub fn registration_payload(cred_id: &str, challenge: &str, origin: &str) -> serde_json::Value {
    serde_json::json!({
        "id": cred_id,
        "rawId": cred_id,
        "type": crate::constants::webauthn::PUBLIC_KEY,
        "response": {
            "clientDataJSON": client_data(CLIENT_DATA_CREATE, challenge, origin),
            "attestationObject": crate::utils::b64url_encode(format!("attestation-{cred_id}")),
            "transports": ["internal"]
        }
    })
}

/// Authentication payload the mock verifier accepts for this challenge.
#[must_use]
pub fn authentication_payload(cred_id: &str, challenge: &str, origin: &str) -> serde_json::Value {
    serde_json::json!({
        "id": cred_id,
        "rawId": cred_id,
        "type": crate::constants::webauthn::PUBLIC_KEY,
        "response": {
            "clientDataJSON": client_data(CLIENT_DATA_GET, challenge, origin),
            "authenticatorData": crate::utils::b64url_encode([0u8; 37]),
            "signature": crate::utils::b64url_encode("signature")
        }
    })
}

fn client_data(ceremony_type: &str, challenge: &str, origin: &str) -> String {
    crate::utils::b64url_encode(
        serde_json::json!({"type": ceremony_type, "challenge": challenge, "origin": origin}).to_string(),
    )
}
