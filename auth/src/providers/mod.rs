//! External capabilities the identity provider depends on.
//!
//! This module defines traits for every dependency that crosses a process or
//! trust boundary: the key-value store, the shared rate limiter, the WebAuthn
//! signature verifier and the audit sink. Ceremony and OAuth logic depend only
//! on these traits, so they can be driven by Redis in production and by the
//! in-memory mocks (`test-utils` feature) in tests.

pub mod audit;
pub mod kv;
pub mod rate_limiter;
pub mod webauthn;

// Re-export provider traits
pub use audit::{AuditEvent, AuditEventKind, AuditSink};
pub use kv::KeyValueStore;
pub use rate_limiter::RateLimiter;
pub use webauthn::{
    CeremonyExpectation, CeremonyStart, VerifiedAuthentication, VerifiedRegistration,
    WebAuthnVerifier,
};
