//! Mock provider implementations for testing.
//!
//! This module provides simple, in-memory implementations of all provider traits
//! for use in unit and integration tests.

pub mod audit;
pub mod kv;
pub mod rate_limiter;
pub mod webauthn;

pub use audit::MockAuditSink;
pub use kv::MockKeyValueStore;
pub use rate_limiter::MockRateLimiter;
pub use webauthn::MockWebAuthnVerifier;
