//! Passkey ceremony orchestration.
//!
//! Owns challenges, credentials and sessions; delegates the cryptographic
//! question ("is this response genuine?") to a [`WebAuthnVerifier`].
//!
//! Every failed verify is audited with its internal code before the error
//! is returned. Callers map `user_not_found`, `credential_not_found` and
//! `verification_failed` to the same client-facing code.

use super::options::{
    AuthenticationOptions, BeginCeremony, CeremonyOptions, CredentialDescriptor,
    RegistrationOptions, RpEntity, UserEntity,
};
use super::response::{AuthenticationResponse, RegistrationResponse};
use super::CeremonyContext;
use crate::config::PasskeyConfig;
use crate::constants::webauthn::FRIENDLY_NAME_PREFIX;
use crate::error::{AuthError, Result};
use crate::providers::{
    AuditEvent, AuditEventKind, AuditSink, CeremonyExpectation, KeyValueStore, WebAuthnVerifier,
};
use crate::state::{CeremonyMode, ChallengeRecord, Credential, Session, User, UserId};
use crate::stores::{ChallengeStore, CredentialRepository, SessionStore};
use crate::utils::{b64url_encode, is_valid_email, local_part, normalize_email, random_token};
use chrono::Utc;

/// Result of a successful verify.
#[derive(Debug, Clone, PartialEq)]
pub struct CeremonyOutcome {
    /// Authenticated user.
    pub user_id: UserId,
    /// Session created for them.
    pub session: Session,
}

/// Drives the begin/verify ceremonies.
#[derive(Clone)]
pub struct CeremonyOrchestrator<K, W, A> {
    users: CredentialRepository<K>,
    challenges: ChallengeStore<K>,
    sessions: SessionStore<K>,
    verifier: W,
    audit: A,
    config: PasskeyConfig,
}

impl<K, W, A> CeremonyOrchestrator<K, W, A>
where
    K: KeyValueStore + Clone,
    W: WebAuthnVerifier,
    A: AuditSink,
{
    /// Create an orchestrator over one key-value store.
    #[must_use]
    pub fn new(kv: K, verifier: W, audit: A, config: PasskeyConfig) -> Self {
        Self {
            users: CredentialRepository::new(kv.clone()),
            challenges: ChallengeStore::new(kv.clone(), config.challenge_ttl),
            sessions: SessionStore::new(kv, config.session_duration),
            verifier,
            audit,
            config,
        }
    }

    /// User and credential repository.
    #[must_use]
    pub const fn users(&self) -> &CredentialRepository<K> {
        &self.users
    }

    /// Start a ceremony.
    ///
    /// Users with at least one passkey authenticate unless `force_mode` asks
    /// for registration (adding another passkey), which needs a live session
    /// of that same user in `ctx`. The user record is created here so the
    /// handle in the registration options stays stable.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidEmail` if the email is malformed
    /// - `AuthError::LoginRequired` if another passkey is requested without
    ///   the account's session
    /// - Storage errors from the backend
    pub async fn begin(
        &self,
        email: &str,
        force_mode: Option<CeremonyMode>,
        ctx: &CeremonyContext,
    ) -> Result<BeginCeremony> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }

        let user = self.users.get_or_create_user(&email).await?;
        let mode = if user.credentials.is_empty() {
            CeremonyMode::Register
        } else if force_mode == Some(CeremonyMode::Register) {
            self.require_owner(&user, ctx).await?;
            CeremonyMode::Register
        } else {
            CeremonyMode::Authenticate
        };

        let started = match mode {
            CeremonyMode::Register => self.verifier.start_registration(&user, &ctx.rp)?,
            CeremonyMode::Authenticate => self.verifier.start_authentication(&user, &ctx.rp)?,
        };
        let (challenge, state) = match started {
            Some(start) => (start.challenge, Some(start.state)),
            None => (random_token(32), None),
        };
        self.challenges.set_challenge(mode, &email, &challenge, state).await?;

        tracing::info!(
            user_id = %user.user_id,
            mode = %mode,
            credentials = user.credentials.len(),
            "Ceremony started"
        );

        let options = match mode {
            CeremonyMode::Register => CeremonyOptions::Registration(RegistrationOptions::new(
                RpEntity {
                    id: ctx.rp.id.clone(),
                    name: ctx.rp.name.clone(),
                },
                UserEntity {
                    id: b64url_encode(user.user_id.to_string()),
                    name: email.clone(),
                    display_name: local_part(&email).to_string(),
                },
                challenge,
                self.config.timeout_ms,
                &user.credentials,
            )),
            CeremonyMode::Authenticate => CeremonyOptions::Authentication(AuthenticationOptions {
                challenge,
                rp_id: ctx.rp.id.clone(),
                timeout: self.config.timeout_ms,
                user_verification: "required".to_string(),
                allow_credentials: (!self.config.discoverable_login)
                    .then(|| user.credentials.iter().map(CredentialDescriptor::from).collect()),
            }),
        };

        Ok(BeginCeremony { mode, options })
    }

    /// Complete a registration ceremony.
    ///
    /// # Errors
    ///
    /// - `AuthError::ChallengeExpired` if no challenge is pending
    /// - `AuthError::InvalidRequest` if the payload is malformed
    /// - `AuthError::LoginRequired` if the user already has a passkey and
    ///   `ctx` carries no session of theirs
    /// - `AuthError::VerificationFailed` if the verifier rejects it
    pub async fn verify_registration(
        &self,
        email: &str,
        payload: &serde_json::Value,
        ctx: &CeremonyContext,
    ) -> Result<CeremonyOutcome> {
        let email = normalize_email(email);
        let result = self.register(&email, payload, ctx).await;

        let event = match &result {
            Ok(outcome) => AuditEvent::new(AuditEventKind::RegistrationSucceeded).with_user(outcome.user_id),
            Err(e) => {
                tracing::warn!(error = %e, "Passkey registration failed");
                AuditEvent::new(AuditEventKind::RegistrationFailed).with_reason(e)
            }
        };
        self.audit
            .record(event.with_ip(ctx.client_ip).with("email", email.as_str()))
            .await;

        result
    }

    /// Complete an authentication ceremony.
    ///
    /// # Errors
    ///
    /// - `AuthError::ChallengeExpired` if no challenge is pending
    /// - `AuthError::InvalidRequest` if the payload is malformed
    /// - `AuthError::UserNotFound` / `AuthError::CredentialNotFound`
    /// - `AuthError::VerificationFailed` if the verifier rejects it
    pub async fn verify_authentication(
        &self,
        email: &str,
        payload: &serde_json::Value,
        ctx: &CeremonyContext,
    ) -> Result<CeremonyOutcome> {
        let email = normalize_email(email);
        let result = self.authenticate(&email, payload, ctx).await;

        let event = match &result {
            Ok(outcome) => AuditEvent::new(AuditEventKind::AuthenticationSucceeded).with_user(outcome.user_id),
            Err(e) => {
                tracing::warn!(error = %e, "Passkey authentication failed");
                AuditEvent::new(AuditEventKind::AuthenticationFailed).with_reason(e)
            }
        };
        self.audit
            .record(event.with_ip(ctx.client_ip).with("email", email.as_str()))
            .await;

        result
    }

    async fn register(
        &self,
        email: &str,
        payload: &serde_json::Value,
        ctx: &CeremonyContext,
    ) -> Result<CeremonyOutcome> {
        let challenge = self
            .challenges
            .pop_challenge(CeremonyMode::Register, email)
            .await?
            .ok_or(AuthError::ChallengeExpired)?;

        let response = RegistrationResponse::from_json(payload)?;

        // Checked again here: a first passkey may have landed since `begin`
        let mut user = self.users.get_or_create_user(email).await?;
        if !user.credentials.is_empty() {
            self.require_owner(&user, ctx).await?;
        }

        let verified = self
            .verifier
            .verify_registration(&response, &expectation(challenge, ctx))
            .await?;

        if user.has_credential(&verified.credential_id) {
            tracing::debug!(user_id = %user.user_id, "Credential already registered");
        } else {
            let friendly_name = format!("{FRIENDLY_NAME_PREFIX} {}", user.credentials.len() + 1);
            user.credentials.push(Credential {
                cred_id: verified.credential_id,
                public_key: verified.public_key,
                counter: verified.counter,
                transports: response.response.transports,
                device_type: verified.device_type,
                backed_up: verified.backed_up,
                aaguid: verified.aaguid,
                friendly_name,
                created_at: Utc::now(),
                last_used_at: None,
            });
            self.users.update_user(&user).await?;

            tracing::info!(
                user_id = %user.user_id,
                credentials = user.credentials.len(),
                "Passkey registered"
            );
        }

        self.finish(&user).await
    }

    async fn authenticate(
        &self,
        email: &str,
        payload: &serde_json::Value,
        ctx: &CeremonyContext,
    ) -> Result<CeremonyOutcome> {
        let challenge = self
            .challenges
            .pop_challenge(CeremonyMode::Authenticate, email)
            .await?
            .ok_or(AuthError::ChallengeExpired)?;

        let response = AuthenticationResponse::from_json(payload)?;
        let mut user = self.users.get_user(email).await?.ok_or(AuthError::UserNotFound)?;
        let credential = user
            .credential(&response.id)
            .cloned()
            .ok_or(AuthError::CredentialNotFound)?;

        let verified = self
            .verifier
            .verify_authentication(&response, &credential, &expectation(challenge, ctx))
            .await?;

        let stored = credential.counter;
        let reported = verified.new_counter;
        if reported <= stored && (reported != 0 || stored != 0) {
            self.report_counter_regression(&user, &credential, reported, ctx).await;
        }

        if let Some(entry) = user.credential_mut(&response.id) {
            entry.counter = stored.max(reported);
            entry.last_used_at = Some(Utc::now());
        }
        self.users.update_user(&user).await?;

        self.finish(&user).await
    }

    /// Fail unless `ctx` carries a live session belonging to `user`.
    async fn require_owner(&self, user: &User, ctx: &CeremonyContext) -> Result<()> {
        let session = match ctx.session_id.as_deref() {
            Some(id) => self.sessions.get_session(id).await?,
            None => None,
        };

        if session.is_some_and(|s| s.user_id == user.user_id) {
            return Ok(());
        }

        tracing::warn!(
            user_id = %user.user_id,
            has_session = ctx.session_id.is_some(),
            "Passkey addition refused without the account's session"
        );
        Err(AuthError::LoginRequired)
    }

    async fn report_counter_regression(
        &self,
        user: &User,
        credential: &Credential,
        reported: u32,
        ctx: &CeremonyContext,
    ) {
        // Synced passkeys legitimately report 0 or stale counters.
        if credential.backed_up {
            tracing::info!(
                user_id = %user.user_id,
                stored = credential.counter,
                reported,
                "Counter did not advance for synced passkey"
            );
        } else {
            tracing::warn!(
                user_id = %user.user_id,
                stored = credential.counter,
                reported,
                "Counter regression on single-device passkey, possible cloned authenticator"
            );
        }

        self.audit
            .record(
                AuditEvent::new(AuditEventKind::CounterRegression)
                    .with_user(user.user_id)
                    .with_ip(ctx.client_ip)
                    .with("credential_id", credential.cred_id.as_str())
                    .with("stored", credential.counter)
                    .with("reported", reported)
                    .with("backed_up", credential.backed_up),
            )
            .await;
    }

    async fn finish(&self, user: &User) -> Result<CeremonyOutcome> {
        let session = self.sessions.create_session(user.user_id, &user.email).await?;
        Ok(CeremonyOutcome {
            user_id: user.user_id,
            session,
        })
    }
}

fn expectation(pending: ChallengeRecord, ctx: &CeremonyContext) -> CeremonyExpectation {
    CeremonyExpectation {
        challenge: pending.challenge,
        origin: ctx.rp.origin.clone(),
        rp_id: ctx.rp.id.clone(),
        require_user_verification: true,
        state: pending.state,
    }
}
