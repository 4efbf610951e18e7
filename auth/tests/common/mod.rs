//! Shared fixtures for integration tests.

#![allow(dead_code)]
#![allow(clippy::expect_used)]

use passkey_idp_auth::config::{IdpConfig, OAuthClient, OAuthConfig, PasskeyConfig};
use passkey_idp_auth::mocks::webauthn::{authentication_payload, registration_payload};
use passkey_idp_auth::mocks::{MockAuditSink, MockKeyValueStore, MockRateLimiter, MockWebAuthnVerifier};
use passkey_idp_auth::oauth::SigningKey;
use passkey_idp_auth::state::CeremonyMode;
use passkey_idp_auth::utils::b64url_encode;
use passkey_idp_auth::webauthn::{CeremonyContext, CeremonyOutcome, RelyingParty};
use passkey_idp_auth::IdentityProvider;

pub const ORIGIN: &str = "https://id.example.com";
pub const CLIENT_ID: &str = "demo-client";
pub const REDIRECT_URI: &str = "https://app.example.com/callback";
pub const PKCS8: &str = include_str!("../fixtures/signing_key_pkcs8.pem");

pub type TestProvider =
    IdentityProvider<MockKeyValueStore, MockWebAuthnVerifier, MockAuditSink, MockRateLimiter>;

/// Provider plus handles on its mocks.
pub struct Fixture {
    pub idp: TestProvider,
    pub kv: MockKeyValueStore,
    pub verifier: MockWebAuthnVerifier,
    pub audit: MockAuditSink,
    pub limiter: MockRateLimiter,
    pub ctx: CeremonyContext,
}

pub fn config() -> IdpConfig {
    IdpConfig::new(ORIGIN).with_oauth(
        OAuthConfig::default().with_client(OAuthClient::new(CLIENT_ID, vec![REDIRECT_URI.to_string()])),
    )
}

pub fn fixture() -> Fixture {
    fixture_with(config())
}

pub fn fixture_with(config: IdpConfig) -> Fixture {
    let kv = MockKeyValueStore::new();
    let verifier = MockWebAuthnVerifier::new();
    let audit = MockAuditSink::new();
    let limiter = MockRateLimiter::new();
    let ctx = CeremonyContext::new(
        RelyingParty::from_request("id.example.com", "https", &PasskeyConfig::default()),
        Some("198.51.100.20".parse().expect("valid IP")),
    );

    let idp = IdentityProvider::new(
        kv.clone(),
        verifier.clone(),
        audit.clone(),
        Some(limiter.clone()),
        SigningKey::from_pem("test-kid", PKCS8).expect("fixture key"),
        config,
    );

    Fixture {
        idp,
        kv,
        verifier,
        audit,
        limiter,
        ctx,
    }
}

pub fn cred_id(name: &str) -> String {
    b64url_encode(name)
}

/// begin + verify_registration for a new passkey.
pub async fn register(f: &Fixture, email: &str, cred: &str) -> CeremonyOutcome {
    let begin = f
        .idp
        .ceremonies
        .begin(email, Some(CeremonyMode::Register), &f.ctx)
        .await
        .expect("begin registration");
    let payload = registration_payload(cred, begin.options.challenge(), ORIGIN);
    f.idp
        .ceremonies
        .verify_registration(email, &payload, &f.ctx)
        .await
        .expect("verify registration")
}

/// begin + verify_registration for another passkey, signed in as `owner`.
pub async fn add_passkey(f: &Fixture, email: &str, cred: &str, owner: &CeremonyOutcome) -> CeremonyOutcome {
    let ctx = f.ctx.clone().with_session(Some(owner.session.session_id.as_str().to_string()));
    let begin = f
        .idp
        .ceremonies
        .begin(email, Some(CeremonyMode::Register), &ctx)
        .await
        .expect("begin registration");
    let payload = registration_payload(cred, begin.options.challenge(), ORIGIN);
    f.idp
        .ceremonies
        .verify_registration(email, &payload, &ctx)
        .await
        .expect("verify registration")
}

/// begin + verify_authentication with an existing passkey.
pub async fn sign_in(f: &Fixture, email: &str, cred: &str) -> CeremonyOutcome {
    let begin = f.idp.ceremonies.begin(email, None, &f.ctx).await.expect("begin authentication");
    assert_eq!(begin.mode, CeremonyMode::Authenticate);
    let payload = authentication_payload(cred, begin.options.challenge(), ORIGIN);
    f.idp
        .ceremonies
        .verify_authentication(email, &payload, &f.ctx)
        .await
        .expect("verify authentication")
}

/// Extract the `code` query parameter from an authorize redirect.
pub fn code_from(location: &str) -> String {
    location
        .split(['?', '&'])
        .find_map(|pair| pair.strip_prefix("code="))
        .expect("code in redirect")
        .to_string()
}
