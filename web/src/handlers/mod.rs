//! HTTP handlers.
//!
//! Each handler extracts its inputs, calls the identity provider and maps
//! the result to a response. No handler holds state of its own.

pub mod discovery;
pub mod health;
pub mod oauth;
pub mod session;
pub mod webauthn;

use crate::error::AppError;
use axum::extract::rejection::JsonRejection;
use axum::Json;

/// Unwrap a JSON body, mapping parse failures to `invalid_request`.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::invalid_request(rejection.body_text()))
}
