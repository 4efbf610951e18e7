//! Integration tests for passkey ceremonies.
//!
//! Drives begin/verify through the assembled `IdentityProvider`, with the
//! mock verifier standing in for the browser's authenticator.

#![allow(clippy::expect_used)]

mod common;

use common::{add_passkey, cred_id, fixture, register, sign_in, ORIGIN};
use passkey_idp_auth::mocks::webauthn::{authentication_payload, registration_payload};
use passkey_idp_auth::providers::AuditEventKind;
use passkey_idp_auth::state::CeremonyMode;
use passkey_idp_auth::webauthn::CeremonyOptions;
use passkey_idp_auth::AuthError;

#[tokio::test]
async fn test_sign_up_then_sign_in() {
    let f = fixture();

    // New email: registration
    let begin = f.idp.ceremonies.begin("carol@example.com", None, &f.ctx).await.expect("begin");
    assert_eq!(begin.mode, CeremonyMode::Register);
    let payload = registration_payload(&cred_id("carol-laptop"), begin.options.challenge(), ORIGIN);
    let registered = f
        .idp
        .ceremonies
        .verify_registration("carol@example.com", &payload, &f.ctx)
        .await
        .expect("registration");

    let session = f
        .idp
        .current_session(registered.session.session_id.as_str())
        .await
        .expect("session lookup")
        .expect("session exists");
    assert_eq!(session.email, "carol@example.com");

    // Known email: authentication, same user
    let signed_in = sign_in(&f, "carol@example.com", &cred_id("carol-laptop")).await;
    assert_eq!(signed_in.user_id, registered.user_id);
    assert_ne!(signed_in.session.session_id, registered.session.session_id);

    assert!(f.audit.contains(AuditEventKind::RegistrationSucceeded));
    assert!(f.audit.contains(AuditEventKind::AuthenticationSucceeded));
}

#[tokio::test]
async fn test_email_is_normalized_across_ceremonies() {
    let f = fixture();
    let first = register(&f, "  Dave@Example.COM", &cred_id("dave-key")).await;
    let second = sign_in(&f, "dave@example.com", &cred_id("dave-key")).await;

    assert_eq!(first.user_id, second.user_id);
}

#[tokio::test]
async fn test_adding_a_second_passkey() {
    let f = fixture();
    let phone = register(&f, "erin@example.com", &cred_id("erin-phone")).await;
    add_passkey(&f, "erin@example.com", &cred_id("erin-laptop"), &phone).await;

    let begin = f.idp.ceremonies.begin("erin@example.com", None, &f.ctx).await.expect("begin");
    let CeremonyOptions::Authentication(options) = begin.options else {
        unreachable!("user with passkeys authenticates");
    };
    let allowed: Vec<_> = options
        .allow_credentials
        .expect("allow list")
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(allowed, vec![cred_id("erin-phone"), cred_id("erin-laptop")]);

    sign_in(&f, "erin@example.com", &cred_id("erin-laptop")).await;
}

#[tokio::test]
async fn test_stranger_cannot_add_passkey_to_existing_account() {
    let f = fixture();
    register(&f, "grace@example.com", &cred_id("grace-key")).await;

    let begin = f
        .idp
        .ceremonies
        .begin("grace@example.com", Some(CeremonyMode::Register), &f.ctx)
        .await;
    assert_eq!(begin.unwrap_err(), AuthError::LoginRequired);

    // Signed in as a different account
    let mallory = register(&f, "mallory@example.com", &cred_id("mallory-key")).await;
    let as_mallory = f.ctx.clone().with_session(Some(mallory.session.session_id.as_str().to_string()));
    let begin = f
        .idp
        .ceremonies
        .begin("grace@example.com", Some(CeremonyMode::Register), &as_mallory)
        .await;
    assert_eq!(begin.unwrap_err(), AuthError::LoginRequired);

    // The stranger's passkey cannot sign in to the account
    let begin = f.idp.ceremonies.begin("grace@example.com", None, &f.ctx).await.expect("begin");
    let payload = authentication_payload(&cred_id("mallory-key"), begin.options.challenge(), ORIGIN);
    let result = f.idp.ceremonies.verify_authentication("grace@example.com", &payload, &f.ctx).await;
    assert_eq!(result.unwrap_err(), AuthError::CredentialNotFound);
}

#[tokio::test]
async fn test_challenges_are_scoped_by_mode_and_email() {
    let f = fixture();
    register(&f, "frank@example.com", &cred_id("frank-key")).await;

    // Authentication challenge pending for frank
    let begin = f.idp.ceremonies.begin("frank@example.com", None, &f.ctx).await.expect("begin");
    let challenge = begin.options.challenge().to_string();

    // Not usable for another email
    let other = authentication_payload(&cred_id("frank-key"), &challenge, ORIGIN);
    let result = f.idp.ceremonies.verify_authentication("grace@example.com", &other, &f.ctx).await;
    assert_eq!(result.expect_err("no challenge for grace"), AuthError::ChallengeExpired);

    // Not usable for registration
    let as_registration = registration_payload(&cred_id("frank-key-2"), &challenge, ORIGIN);
    let result = f
        .idp
        .ceremonies
        .verify_registration("frank@example.com", &as_registration, &f.ctx)
        .await;
    assert_eq!(result.expect_err("no registration challenge"), AuthError::ChallengeExpired);

    // Still usable for what it was issued for
    let payload = authentication_payload(&cred_id("frank-key"), &challenge, ORIGIN);
    assert!(f.idp.ceremonies.verify_authentication("frank@example.com", &payload, &f.ctx).await.is_ok());
}

#[tokio::test]
async fn test_new_begin_replaces_pending_challenge() {
    let f = fixture();
    let first = f.idp.ceremonies.begin("heidi@example.com", None, &f.ctx).await.expect("begin");
    let second = f.idp.ceremonies.begin("heidi@example.com", None, &f.ctx).await.expect("begin");

    let stale = registration_payload(&cred_id("heidi-key"), first.options.challenge(), ORIGIN);
    let result = f.idp.ceremonies.verify_registration("heidi@example.com", &stale, &f.ctx).await;
    assert!(matches!(result, Err(AuthError::VerificationFailed { .. })));

    // The failed attempt consumed the replacement too
    let fresh = registration_payload(&cred_id("heidi-key"), second.options.challenge(), ORIGIN);
    let result = f.idp.ceremonies.verify_registration("heidi@example.com", &fresh, &f.ctx).await;
    assert_eq!(result.expect_err("consumed"), AuthError::ChallengeExpired);
}

#[tokio::test]
async fn test_verifier_rejection_is_generic_to_clients() {
    let f = fixture();
    register(&f, "ivan@example.com", &cred_id("ivan-key")).await;

    let begin = f.idp.ceremonies.begin("ivan@example.com", None, &f.ctx).await.expect("begin");
    f.verifier.set_fail_verification(true);
    let payload = authentication_payload(&cred_id("ivan-key"), begin.options.challenge(), ORIGIN);
    let err = f
        .idp
        .ceremonies
        .verify_authentication("ivan@example.com", &payload, &f.ctx)
        .await
        .expect_err("verifier rejects");

    assert_eq!(err.client_code(), "verification_failed");
    let failures = f.audit.events_of(AuditEventKind::AuthenticationFailed);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].ip, f.ctx.client_ip);
}

#[tokio::test]
async fn test_storage_outage_surfaces_as_internal_error() {
    let f = fixture();
    f.kv.set_unavailable(true);

    let err = f
        .idp
        .ceremonies
        .begin("judy@example.com", None, &f.ctx)
        .await
        .expect_err("store down");
    assert!(err.is_internal());
    assert_eq!(err.client_code(), "internal_error");
}
