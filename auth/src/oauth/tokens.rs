//! JWT signing and the public key set.
//!
//! Tokens are RS256 JWTs whose header carries the signing key's `kid`. The
//! issuer keeps a key ring: the current private key plus a bounded list of
//! retired keys whose public halves stay in the JWKS (and stay accepted for
//! verification) until they fall off the end.

use crate::constants::oauth::SIGNING_ALG;
use crate::error::{AuthError, Result};
use crate::state::UserId;
use crate::utils::b64url_encode;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::RwLock;

/// Public RSA key in JWK form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    /// `RSA`.
    pub kty: String,
    /// `RS256`.
    pub alg: String,
    /// `sig`.
    #[serde(rename = "use")]
    pub key_use: String,
    /// Key id.
    pub kid: String,
    /// Modulus, base64url.
    pub n: String,
    /// Exponent, base64url.
    pub e: String,
}

/// JSON Web Key Set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwks {
    /// Current key first, then retired keys, newest first.
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Find a key by `kid`.
    #[must_use]
    pub fn find_by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

/// JWT claims for access and ID tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Issuer URL.
    pub iss: String,
    /// Audience (client id).
    pub aud: String,
    /// Subject (user id).
    pub sub: String,
    /// Issued at, seconds since epoch.
    pub iat: i64,
    /// Expiry, seconds since epoch.
    pub exp: i64,
    /// Granted scope. Present on access tokens only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Subject's email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// An RSA signing key with its derived public forms.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
    jwk: Jwk,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey").field("kid", &self.kid).finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Load from an RSA private key PEM (PKCS#8 or PKCS#1).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SigningError` if the PEM is not an RSA private key.
    pub fn from_pem(kid: impl Into<String>, pem: &str) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| AuthError::SigningError(format!("unreadable RSA private key: {e}")))?;
        Self::from_rsa(kid.into(), &private)
    }

    /// Generate a fresh 2048-bit key. For development only: the key dies
    /// with the process, invalidating every token it signed.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SigningError` if generation fails.
    pub fn generate(kid: impl Into<String>) -> Result<Self> {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 2048)
            .map_err(|e| AuthError::SigningError(format!("key generation failed: {e}")))?;
        Self::from_rsa(kid.into(), &private)
    }

    fn from_rsa(kid: String, private: &RsaPrivateKey) -> Result<Self> {
        let der = private
            .to_pkcs1_der()
            .map_err(|e| AuthError::SigningError(format!("key encoding failed: {e}")))?;
        let encoding = EncodingKey::from_rsa_der(der.as_bytes());

        let n = b64url_encode(private.n().to_bytes_be());
        let e = b64url_encode(private.e().to_bytes_be());
        let decoding = DecodingKey::from_rsa_components(&n, &e)
            .map_err(|e| AuthError::SigningError(format!("public key unusable: {e}")))?;

        Ok(Self {
            jwk: Jwk {
                kty: "RSA".to_string(),
                alg: SIGNING_ALG.to_string(),
                key_use: "sig".to_string(),
                kid: kid.clone(),
                n,
                e,
            },
            kid,
            encoding,
            decoding,
        })
    }

    /// Key id.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Public key as a JWK.
    #[must_use]
    pub const fn jwk(&self) -> &Jwk {
        &self.jwk
    }
}

struct KeyRing {
    current: SigningKey,
    previous: VecDeque<SigningKey>,
    max_previous: usize,
}

/// Signs and verifies the provider's JWTs.
pub struct TokenIssuer {
    issuer: String,
    keys: RwLock<KeyRing>,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer").field("issuer", &self.issuer).finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Create an issuer keeping up to `max_previous` retired keys.
    #[must_use]
    pub fn new(issuer: impl Into<String>, current: SigningKey, max_previous: usize) -> Self {
        Self {
            issuer: issuer.into(),
            keys: RwLock::new(KeyRing {
                current,
                previous: VecDeque::new(),
                max_previous,
            }),
        }
    }

    /// Issuer URL (`iss`).
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    fn with_keys<T>(&self, f: impl FnOnce(&KeyRing) -> T) -> Result<T> {
        let ring = self
            .keys
            .read()
            .map_err(|_| AuthError::InternalError("key ring lock poisoned".into()))?;
        Ok(f(&ring))
    }

    fn sign(&self, claims: &Claims) -> Result<String> {
        self.with_keys(|ring| {
            let mut header = Header::new(Algorithm::RS256);
            header.kid = Some(ring.current.kid.clone());
            jsonwebtoken::encode(&header, claims, &ring.current.encoding)
                .map_err(|e| AuthError::SigningError(e.to_string()))
        })?
    }

    fn claims(&self, sub: UserId, audience: &str, ttl: Duration) -> Claims {
        let now = Utc::now();
        Claims {
            iss: self.issuer.clone(),
            aud: audience.to_string(),
            sub: sub.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            scope: None,
            email: None,
        }
    }

    /// Sign an access token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SigningError` if signing fails.
    pub fn sign_access_token(
        &self,
        sub: UserId,
        email: &str,
        scope: &str,
        audience: &str,
        ttl: Duration,
    ) -> Result<String> {
        let mut claims = self.claims(sub, audience, ttl);
        claims.scope = Some(scope.to_string());
        claims.email = Some(email.to_string());
        self.sign(&claims)
    }

    /// Sign an ID token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SigningError` if signing fails.
    pub fn sign_id_token(
        &self,
        sub: UserId,
        email: Option<&str>,
        audience: &str,
        ttl: Duration,
    ) -> Result<String> {
        let mut claims = self.claims(sub, audience, ttl);
        claims.email = email.map(str::to_string);
        self.sign(&claims)
    }

    /// Verify an access token: signature (by `kid`), issuer, expiry, and the
    /// presence of `scope` (ID tokens are not accepted as bearer tokens).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` on any failure.
    pub fn verify_access_token(&self, token: &str) -> Result<Claims> {
        let kid = jsonwebtoken::decode_header(token)
            .ok()
            .and_then(|header| header.kid)
            .ok_or(AuthError::InvalidToken)?;

        let decoding = self
            .with_keys(|ring| {
                std::iter::once(&ring.current)
                    .chain(ring.previous.iter())
                    .find(|key| key.kid == kid)
                    .map(|key| key.decoding.clone())
            })?
            .ok_or(AuthError::InvalidToken)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.validate_aud = false;

        let claims = jsonwebtoken::decode::<Claims>(token, &decoding, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Access token rejected");
                AuthError::InvalidToken
            })?
            .claims;

        if claims.scope.is_none() {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// Public keys: current first, then retired keys, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InternalError` if the key ring lock is poisoned.
    pub fn public_key_set(&self) -> Result<Jwks> {
        self.with_keys(|ring| Jwks {
            keys: std::iter::once(&ring.current)
                .chain(ring.previous.iter())
                .map(|key| key.jwk.clone())
                .collect(),
        })
    }

    /// Make `next` the signing key; the old current key is retired.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InternalError` if the key ring lock is poisoned.
    pub fn rotate(&self, next: SigningKey) -> Result<()> {
        let mut ring = self
            .keys
            .write()
            .map_err(|_| AuthError::InternalError("key ring lock poisoned".into()))?;

        let retired = std::mem::replace(&mut ring.current, next);
        tracing::info!(retired = %retired.kid, current = %ring.current.kid, "Signing key rotated");

        ring.previous.push_front(retired);
        let limit = ring.max_previous;
        ring.previous.truncate(limit);
        Ok(())
    }

    /// Keep verifying tokens signed by `key` without signing with it.
    ///
    /// Call oldest-last, after construction, to restore the ring a previous
    /// process published. A key whose `kid` is already on the ring, or that
    /// would exceed the previous-key limit, is skipped.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InternalError` if the key ring lock is poisoned.
    pub fn retire(&self, key: SigningKey) -> Result<bool> {
        let mut ring = self
            .keys
            .write()
            .map_err(|_| AuthError::InternalError("key ring lock poisoned".into()))?;

        let known = std::iter::once(&ring.current)
            .chain(ring.previous.iter())
            .any(|k| k.kid == key.kid);
        if known || ring.previous.len() >= ring.max_previous {
            tracing::warn!(kid = %key.kid, duplicate = known, "Previous signing key skipped");
            return Ok(false);
        }

        tracing::info!(kid = %key.kid, "Previous signing key loaded");
        ring.previous.push_back(key);
        Ok(true)
    }
}
