//! Typed ceremony responses (`PublicKeyCredential` JSON from the browser).
//!
//! Field names follow the WebAuthn JSON serialization
//! (`PublicKeyCredential.toJSON()`), so browsers and common client libraries
//! can post their output unchanged.

use crate::constants::webauthn::PUBLIC_KEY;
use crate::error::{AuthError, Result};
use crate::utils::b64url_decode;
use serde::{Deserialize, Serialize};

/// Result of `navigator.credentials.create()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    /// Credential id (base64url).
    pub id: String,

    /// Credential id (base64url), must equal `id`.
    #[serde(default)]
    pub raw_id: Option<String>,

    /// Always `public-key`.
    #[serde(rename = "type")]
    pub credential_type: String,

    /// Attestation payload.
    pub response: AttestationResponse,

    /// `platform` or `cross-platform`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
}

/// `AuthenticatorAttestationResponse`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponse {
    /// base64url `clientDataJSON`.
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,

    /// base64url CBOR attestation object.
    pub attestation_object: String,

    /// base64url authenticator data, when the client extracts it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_data: Option<String>,

    /// base64url SubjectPublicKeyInfo, when the client extracts it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Transport hints.
    #[serde(default)]
    pub transports: Vec<String>,
}

/// Result of `navigator.credentials.get()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    /// Credential id (base64url).
    pub id: String,

    /// Credential id (base64url), must equal `id`.
    #[serde(default)]
    pub raw_id: Option<String>,

    /// Always `public-key`.
    #[serde(rename = "type")]
    pub credential_type: String,

    /// Assertion payload.
    pub response: AssertionResponse,
}

/// `AuthenticatorAssertionResponse`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResponse {
    /// base64url `clientDataJSON`.
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,

    /// base64url authenticator data.
    pub authenticator_data: String,

    /// base64url signature.
    pub signature: String,

    /// base64url user handle (present for discoverable credentials).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

/// Decoded `clientDataJSON`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientData {
    /// `webauthn.create` or `webauthn.get`.
    #[serde(rename = "type")]
    pub ceremony_type: String,

    /// base64url challenge echoed by the browser.
    pub challenge: String,

    /// Origin of the calling page.
    pub origin: String,

    /// Set when the call came from a cross-origin iframe.
    #[serde(default, rename = "crossOrigin")]
    pub cross_origin: bool,
}

impl ClientData {
    /// Decode base64url `clientDataJSON`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` if the value is not base64url JSON
    /// of the expected shape.
    pub fn decode(client_data_json: &str) -> Result<Self> {
        let bytes = b64url_decode(client_data_json).ok_or_else(|| invalid("clientDataJSON is not base64url"))?;
        serde_json::from_slice(&bytes).map_err(|e| invalid(&format!("clientDataJSON: {e}")))
    }
}

fn invalid(reason: &str) -> AuthError {
    AuthError::InvalidRequest {
        reason: reason.to_string(),
    }
}

fn require_b64url(field: &str, value: &str) -> Result<()> {
    if value.is_empty() || b64url_decode(value).is_none() {
        return Err(invalid(&format!("{field} must be non-empty base64url")));
    }
    Ok(())
}

fn check_envelope(id: &str, raw_id: Option<&str>, credential_type: &str) -> Result<()> {
    require_b64url("id", id)?;
    if let Some(raw_id) = raw_id {
        if raw_id != id {
            return Err(invalid("rawId does not match id"));
        }
    }
    if credential_type != PUBLIC_KEY {
        return Err(invalid("type must be public-key"));
    }
    Ok(())
}

impl RegistrationResponse {
    /// Parse and structurally validate a registration payload.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` on any shape or encoding problem.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let response: Self =
            serde_json::from_value(value.clone()).map_err(|e| invalid(&format!("registration response: {e}")))?;
        response.validate()?;
        Ok(response)
    }

    /// Structural checks only; no cryptography.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` on the first failed check.
    pub fn validate(&self) -> Result<()> {
        check_envelope(&self.id, self.raw_id.as_deref(), &self.credential_type)?;
        require_b64url("clientDataJSON", &self.response.client_data_json)?;
        require_b64url("attestationObject", &self.response.attestation_object)?;
        if let Some(data) = &self.response.authenticator_data {
            require_b64url("authenticatorData", data)?;
        }
        Ok(())
    }
}

impl AuthenticationResponse {
    /// Parse and structurally validate an authentication payload.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` on any shape or encoding problem.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let response: Self =
            serde_json::from_value(value.clone()).map_err(|e| invalid(&format!("authentication response: {e}")))?;
        response.validate()?;
        Ok(response)
    }

    /// Structural checks only; no cryptography.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` on the first failed check.
    pub fn validate(&self) -> Result<()> {
        check_envelope(&self.id, self.raw_id.as_deref(), &self.credential_type)?;
        require_b64url("clientDataJSON", &self.response.client_data_json)?;
        require_b64url("authenticatorData", &self.response.authenticator_data)?;
        require_b64url("signature", &self.response.signature)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::b64url_encode;
    use serde_json::json;

    fn client_data(kind: &str) -> String {
        b64url_encode(
            json!({"type": kind, "challenge": "abc", "origin": "https://id.example.com"}).to_string(),
        )
    }

    #[test]
    fn test_registration_payload_accepted() {
        let value = json!({
            "id": "Y3JlZA",
            "rawId": "Y3JlZA",
            "type": "public-key",
            "response": {
                "clientDataJSON": client_data("webauthn.create"),
                "attestationObject": "o2NmbXRkbm9uZQ",
                "transports": ["internal"]
            }
        });

        let parsed = RegistrationResponse::from_json(&value);
        assert!(parsed.is_ok(), "{parsed:?}");
        assert_eq!(parsed.map(|r| r.response.transports).unwrap_or_default(), vec!["internal"]);
    }

    #[test]
    fn test_wrong_type_rejected() {
        let value = json!({
            "id": "Y3JlZA",
            "type": "password",
            "response": {"clientDataJSON": client_data("webauthn.create"), "attestationObject": "AA"}
        });
        assert!(matches!(
            RegistrationResponse::from_json(&value),
            Err(AuthError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_empty_id_rejected() {
        let value = json!({
            "id": "",
            "type": "public-key",
            "response": {
                "clientDataJSON": client_data("webauthn.get"),
                "authenticatorData": "AA",
                "signature": "AA"
            }
        });
        assert!(matches!(
            AuthenticationResponse::from_json(&value),
            Err(AuthError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_missing_signature_rejected() {
        let value = json!({
            "id": "Y3JlZA",
            "type": "public-key",
            "response": {"clientDataJSON": client_data("webauthn.get"), "authenticatorData": "AA"}
        });
        assert!(AuthenticationResponse::from_json(&value).is_err());
    }

    #[test]
    fn test_raw_id_mismatch_rejected() {
        let value = json!({
            "id": "Y3JlZA",
            "rawId": "b3RoZXI",
            "type": "public-key",
            "response": {
                "clientDataJSON": client_data("webauthn.get"),
                "authenticatorData": "AA",
                "signature": "AA"
            }
        });
        assert!(AuthenticationResponse::from_json(&value).is_err());
    }

    #[test]
    fn test_client_data_decode() {
        let decoded = ClientData::decode(&client_data("webauthn.get"));
        assert_eq!(decoded.map(|c| c.challenge).ok().as_deref(), Some("abc"));
        assert!(ClientData::decode("!!").is_err());
    }
}
