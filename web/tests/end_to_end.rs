//! End-to-end HTTP tests against the full router with in-memory backends.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum_test::{TestResponse, TestServer};
use http::{header, HeaderName, HeaderValue, StatusCode};
use passkey_idp_auth::config::{IdpConfig, OAuthClient, OAuthConfig, Quota, RateLimitConfig};
use passkey_idp_auth::mocks::webauthn::{authentication_payload, registration_payload};
use passkey_idp_auth::mocks::{MockAuditSink, MockKeyValueStore, MockRateLimiter, MockWebAuthnVerifier};
use passkey_idp_auth::oauth::pkce::{compute_s256_challenge, generate_verifier};
use passkey_idp_auth::oauth::SigningKey;
use passkey_idp_auth::providers::AuditEventKind;
use passkey_idp_auth::utils::b64url_encode;
use passkey_idp_auth::IdentityProvider;
use passkey_idp_web::{build_router, AppState, Backend};
use serde_json::{json, Value};
use std::net::SocketAddr;

const HOST: &str = "idp.test";
const ORIGIN: &str = "https://idp.test";
const CLIENT_ID: &str = "demo-client";
const REDIRECT_URI: &str = "https://app.example.com/callback";
const REDIRECT_URI_ENCODED: &str = "https%3A%2F%2Fapp.example.com%2Fcallback";
const PKCS8: &str = include_str!("../../auth/tests/fixtures/signing_key_pkcs8.pem");

struct MockBackend;

impl Backend for MockBackend {
    type Kv = MockKeyValueStore;
    type Verifier = MockWebAuthnVerifier;
    type Audit = MockAuditSink;
    type Limiter = MockRateLimiter;
}

struct Harness {
    server: TestServer,
    audit: MockAuditSink,
}

fn config() -> IdpConfig {
    IdpConfig::new(ORIGIN).with_oauth(
        OAuthConfig::default().with_client(OAuthClient::new(CLIENT_ID, vec![REDIRECT_URI.to_string()])),
    )
}

fn harness_with(config: IdpConfig, production: bool) -> Harness {
    let audit = MockAuditSink::new();
    let idp = IdentityProvider::new(
        MockKeyValueStore::new(),
        MockWebAuthnVerifier::new(),
        audit.clone(),
        Some(MockRateLimiter::new()),
        SigningKey::from_pem("e2e-kid", PKCS8).expect("fixture key"),
        config,
    );
    let app = build_router::<MockBackend>(AppState::new(idp), production);

    Harness {
        server: TestServer::new(app.into_make_service_with_connect_info::<SocketAddr>()).expect("test server"),
        audit,
    }
}

fn harness() -> Harness {
    harness_with(config(), false)
}

fn host() -> (HeaderName, HeaderValue) {
    (header::HOST, HeaderValue::from_static(HOST))
}

fn cookie_header(session_id: &str) -> (HeaderName, HeaderValue) {
    (
        header::COOKIE,
        HeaderValue::from_str(&format!("__Host-session={session_id}")).unwrap(),
    )
}

/// Session id from a `Set-Cookie` response header.
fn session_from(response: &TestResponse) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("Set-Cookie present")
        .to_str()
        .unwrap();
    set_cookie
        .strip_prefix("__Host-session=")
        .and_then(|rest| rest.split(';').next())
        .expect("session cookie")
        .to_string()
}

fn query_param(location: &str, name: &str) -> Option<String> {
    location
        .split(['?', '&'])
        .find_map(|pair| pair.strip_prefix(&format!("{name}=")))
        .map(str::to_string)
}

async fn begin(h: &Harness, email: &str) -> Value {
    let (name, value) = host();
    let response = h
        .server
        .post("/webauthn/begin")
        .add_header(name, value)
        .json(&json!({ "email": email }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response.json::<Value>()
}

/// Register a passkey over HTTP and return the session id.
async fn sign_up(h: &Harness, email: &str) -> String {
    let begun = begin(h, email).await;
    assert_eq!(begun["mode"], "register");
    let challenge = begun["options"]["challenge"].as_str().unwrap();

    let (name, value) = host();
    let response = h
        .server
        .post("/webauthn/register/verify")
        .add_header(name, value)
        .json(&json!({
            "email": email,
            "response": registration_payload(&b64url_encode(email), challenge, ORIGIN),
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!({ "success": true }));
    session_from(&response)
}

async fn authorize(h: &Harness, session_id: &str, challenge: &str) -> TestResponse {
    let (name, value) = cookie_header(session_id);
    h.server
        .get(&format!(
            "/oauth/authorize?client_id={CLIENT_ID}&redirect_uri={REDIRECT_URI_ENCODED}&state=xyz&code_challenge={challenge}&code_challenge_method=S256"
        ))
        .add_header(name, value)
        .await
}

async fn token(h: &Harness, params: Vec<(&str, &str)>) -> TestResponse {
    h.server.post("/oauth/token").form(&params).await
}

/// Sign up, authorize and redeem the code.
async fn tokens_for(h: &Harness, email: &str) -> Value {
    let session_id = sign_up(h, email).await;
    let verifier = generate_verifier();

    let response = authorize(h, &session_id, &compute_s256_challenge(&verifier)).await;
    assert_eq!(response.status_code(), StatusCode::FOUND);
    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap().to_string();
    let code = query_param(&location, "code").unwrap();

    let response = token(
        h,
        vec![
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", CLIENT_ID),
            ("code_verifier", &verifier),
        ],
    )
    .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response.json::<Value>()
}

#[tokio::test]
async fn test_register_authorize_token_refresh() {
    let h = harness();
    let session_id = sign_up(&h, "alice@example.com").await;

    // Session is live
    let (name, value) = cookie_header(&session_id);
    let session = h.server.get("/session").add_header(name, value).await.json::<Value>();
    assert_eq!(session["authenticated"], true);
    assert_eq!(session["email"], "alice@example.com");

    // Authorize redirects with code and state
    let verifier = generate_verifier();
    let response = authorize(&h, &session_id, &compute_s256_challenge(&verifier)).await;
    assert_eq!(response.status_code(), StatusCode::FOUND);
    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap().to_string();
    assert!(location.starts_with(REDIRECT_URI));
    assert_eq!(query_param(&location, "state").as_deref(), Some("xyz"));
    let code = query_param(&location, "code").unwrap();

    // Code exchange
    let response = token(
        &h,
        vec![
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", CLIENT_ID),
            ("code_verifier", &verifier),
        ],
    )
    .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");
    let tokens = response.json::<Value>();
    assert_eq!(tokens["token_type"], "Bearer");
    assert_eq!(tokens["expires_in"], 3600);

    // Userinfo
    let bearer = format!("Bearer {}", tokens["access_token"].as_str().unwrap());
    let info = h
        .server
        .get("/oidc/userinfo")
        .add_header(header::AUTHORIZATION, HeaderValue::from_str(&bearer).unwrap())
        .await;
    assert_eq!(info.status_code(), StatusCode::OK);
    assert_eq!(info.json::<Value>()["email"], "alice@example.com");

    // Refresh once
    let original = tokens["refresh_token"].as_str().unwrap().to_string();
    let response = token(&h, vec![("grant_type", "refresh_token"), ("refresh_token", &original)]).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_ne!(response.json::<Value>()["refresh_token"], original.as_str());

    // The original now fails
    let replay = token(&h, vec![("grant_type", "refresh_token"), ("refresh_token", &original)]).await;
    assert_eq!(replay.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(replay.json::<Value>()["error"], "invalid_refresh");
    assert!(h.audit.contains(AuditEventKind::RefreshReuseDetected));

    // Code is single-use
    let again = token(
        &h,
        vec![
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", CLIENT_ID),
            ("code_verifier", &verifier),
        ],
    )
    .await;
    assert_eq!(again.json::<Value>()["error"], "invalid_code");
}

#[tokio::test]
async fn test_sign_in_with_existing_passkey() {
    let h = harness();
    sign_up(&h, "bob@example.com").await;

    let begun = begin(&h, "bob@example.com").await;
    assert_eq!(begun["mode"], "authenticate");
    let challenge = begun["options"]["challenge"].as_str().unwrap();

    let (name, value) = host();
    let response = h
        .server
        .post("/webauthn/auth/verify")
        .add_header(name, value)
        .json(&json!({
            "email": "bob@example.com",
            "response": authentication_payload(&b64url_encode("bob@example.com"), challenge, ORIGIN),
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap().to_string();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Secure"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Max-Age=3600"));
}

#[tokio::test]
async fn test_wrong_origin_rejected() {
    let h = harness();
    let begun = begin(&h, "carol@example.com").await;
    let challenge = begun["options"]["challenge"].as_str().unwrap();

    let (name, value) = host();
    let response = h
        .server
        .post("/webauthn/register/verify")
        .add_header(name, value)
        .json(&json!({
            "email": "carol@example.com",
            "response": registration_payload(&b64url_encode("carol"), challenge, "https://evil.test"),
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "verification_failed");
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_authorize_requires_session() {
    let h = harness();
    let challenge = compute_s256_challenge(&generate_verifier());

    let response = h
        .server
        .get(&format!(
            "/oauth/authorize?client_id={CLIENT_ID}&redirect_uri={REDIRECT_URI_ENCODED}&code_challenge={challenge}"
        ))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"], "login_required");
}

#[tokio::test]
async fn test_authorize_rejects_unknown_redirect() {
    let h = harness();
    let session_id = sign_up(&h, "dave@example.com").await;
    let challenge = compute_s256_challenge(&generate_verifier());

    let (name, value) = cookie_header(&session_id);
    let response = h
        .server
        .get(&format!(
            "/oauth/authorize?client_id={CLIENT_ID}&redirect_uri=https%3A%2F%2Fevil.test%2Fcb&code_challenge={challenge}"
        ))
        .add_header(name, value)
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "invalid_client_or_redirect");
    assert!(response.headers().get(header::LOCATION).is_none());
}

#[tokio::test]
async fn test_logout_clears_session() {
    let h = harness();
    let session_id = sign_up(&h, "erin@example.com").await;

    let (name, value) = cookie_header(&session_id);
    let response = h.server.post("/logout").add_header(name, value).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let cleared = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap().to_string();
    assert!(cleared.contains("Max-Age=0"));

    let (name, value) = cookie_header(&session_id);
    let session = h.server.get("/session").add_header(name, value).await.json::<Value>();
    assert_eq!(session, json!({ "authenticated": false }));
    assert!(h.audit.contains(AuditEventKind::Logout));
}

#[tokio::test]
async fn test_revoke_accepts_json_and_form() {
    let h = harness();
    let tokens = tokens_for(&h, "frank@example.com").await;
    let refresh = tokens["refresh_token"].as_str().unwrap();

    let response = h.server.post("/oauth/revoke").json(&json!({ "token": refresh })).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!({ "revoked": true }));

    // Unknown or already revoked tokens still succeed
    let response = h.server.post("/oauth/revoke").form(&vec![("token", refresh)]).await;
    assert_eq!(response.json::<Value>(), json!({ "revoked": true }));

    let rotated = token(&h, vec![("grant_type", "refresh_token"), ("refresh_token", refresh)]).await;
    assert_eq!(rotated.json::<Value>()["error"], "invalid_refresh");

    let missing = h.server.post("/oauth/revoke").json(&json!({})).await;
    assert_eq!(missing.json::<Value>()["error"], "invalid_request");
}

#[tokio::test]
async fn test_unsupported_grant_type() {
    let h = harness();
    let response = token(&h, vec![("grant_type", "password")]).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn test_userinfo_requires_bearer() {
    let h = harness();

    let response = h.server.get("/oidc/userinfo").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"], "invalid_token");
    assert!(response.headers().get(header::WWW_AUTHENTICATE).is_some());

    let response = h
        .server
        .get("/oidc/userinfo")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer not.a.jwt"))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_jwks_and_discovery() {
    let h = harness();

    let jwks = h.server.get("/jwks").await.json::<Value>();
    assert_eq!(jwks["keys"][0]["kid"], "e2e-kid");
    assert_eq!(jwks["keys"][0]["kty"], "RSA");
    assert_eq!(jwks["keys"][0]["alg"], "RS256");

    let discovery = h.server.get("/.well-known/openid-configuration").await.json::<Value>();
    assert_eq!(discovery["issuer"], ORIGIN);
    assert_eq!(discovery["jwks_uri"], format!("{ORIGIN}/jwks"));
    assert_eq!(discovery["code_challenge_methods_supported"], json!(["S256"]));
}

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let h = harness_with(
        config().with_rate_limits(RateLimitConfig::default().with_bucket("webauthn", Quota::per_window(2, 60))),
        false,
    );

    for _ in 0..2 {
        begin(&h, "gina@example.com").await;
    }

    let (name, value) = host();
    let response = h
        .server
        .post("/webauthn/begin")
        .add_header(name, value)
        .json(&json!({ "email": "gina@example.com" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "60");
    assert_eq!(response.json::<Value>()["error"], "rate_limited");
    assert!(h.audit.contains(AuditEventKind::RateLimited));

    // Other route families are unaffected
    assert_eq!(h.server.get("/jwks").await.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_forwarded_for_cannot_dodge_rate_limit() {
    let h = harness_with(
        config().with_rate_limits(RateLimitConfig::default().with_bucket("webauthn", Quota::per_window(2, 60))),
        false,
    );

    let mut statuses = Vec::new();
    for n in 0..4 {
        let (name, value) = host();
        let response = h
            .server
            .post("/webauthn/begin")
            .add_header(name, value)
            .add_header(
                HeaderName::from_static("x-forwarded-for"),
                HeaderValue::from_str(&format!("203.0.113.{n}")).unwrap(),
            )
            .json(&json!({ "email": "hank@example.com" }))
            .await;
        statuses.push(response.status_code());
    }

    assert_eq!(
        statuses,
        vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS, StatusCode::TOO_MANY_REQUESTS]
    );
    let limited = h.audit.events_of(AuditEventKind::RateLimited);
    assert_eq!(limited[0].ip.map(|ip| ip.to_string()).as_deref(), Some("127.0.0.1"));
}

#[tokio::test]
async fn test_adding_passkey_needs_the_accounts_cookie() {
    let h = harness();
    let session_id = sign_up(&h, "ida@example.com").await;

    let (name, value) = host();
    let response = h
        .server
        .post("/webauthn/begin")
        .add_header(name, value)
        .json(&json!({ "email": "ida@example.com", "forceMode": "register" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"], "login_required");

    let (name, value) = host();
    let (cookie, session) = cookie_header(&session_id);
    let response = h
        .server
        .post("/webauthn/begin")
        .add_header(name, value)
        .add_header(cookie, session)
        .json(&json!({ "email": "ida@example.com", "forceMode": "register" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let begun = response.json::<Value>();
    assert_eq!(begun["mode"], "register");
    let challenge = begun["options"]["challenge"].as_str().unwrap();

    let (name, value) = host();
    let (cookie, session) = cookie_header(&session_id);
    let response = h
        .server
        .post("/webauthn/register/verify")
        .add_header(name, value)
        .add_header(cookie, session)
        .json(&json!({
            "email": "ida@example.com",
            "response": registration_payload(&b64url_encode("ida-laptop"), challenge, ORIGIN),
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_body_is_invalid_request() {
    let h = harness();
    let (name, value) = host();

    let response = h
        .server
        .post("/webauthn/begin")
        .add_header(name, value)
        .add_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .bytes("{not json".into())
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "invalid_request");
}

#[tokio::test]
async fn test_error_detail_only_outside_production() {
    let dev = harness();
    let body = dev.server.post("/webauthn/begin").json(&json!({ "email": "nope" })).await.json::<Value>();
    assert_eq!(body["error"], "invalid_email");
    assert!(body["detail"].is_string());

    let prod = harness_with(config(), true);
    let body = prod.server.post("/webauthn/begin").json(&json!({ "email": "nope" })).await.json::<Value>();
    assert_eq!(body["error"], "invalid_email");
    assert!(body.get("detail").is_none());
}

#[tokio::test]
async fn test_correlation_id_echoed() {
    let h = harness();
    let response = h.server.get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.headers().get("X-Correlation-ID").is_some());
}
