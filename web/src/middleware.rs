//! Axum middleware for request tracking, rate limiting and error rendering.
//!
//! - **Correlation ID tracking**: extract or generate a correlation ID, open a
//!   tracing span with it and echo it back in the response
//! - **Rate limiting**: per-client admission for the `webauthn` and `oauth`
//!   route families
//! - **Error detail**: outside production, copy the internal error message
//!   into error bodies
//!
//! # Layer Order
//!
//! ```text
//! TraceLayer → correlation ID → error detail → rate limit → handler
//! ```

use crate::error::{AppError, ErrorBody, ErrorDetail};
use crate::extractors::ClientIp;
use crate::state::{AppState, Backend};
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use passkey_idp_auth::providers::{AuditEvent, AuditEventKind, AuditSink};
use passkey_idp_auth::AuthError;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Create a layer that adds correlation ID tracking to all requests.
#[must_use]
pub const fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// Layer for correlation ID tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdMiddleware { inner }
    }
}

/// Middleware service for correlation ID tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdMiddleware<S> {
    inner: S,
}

impl<S> Service<Request> for CorrelationIdMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let correlation_id = req
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        req.extensions_mut().insert(correlation_id);

        // The query string is left out: authorize requests carry PKCE data
        let span = tracing::info_span!(
            "http_request",
            correlation_id = %correlation_id,
            method = %req.method(),
            path = %req.uri().path(),
        );

        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut response = fut.instrument(span).await?;

            if let Ok(header_value) = HeaderValue::from_str(&correlation_id.to_string()) {
                response
                    .headers_mut()
                    .insert(CORRELATION_ID_HEADER, header_value);
            }

            Ok(response)
        })
    }
}

/// Rate-limit bucket for a request path, if the path is limited.
#[must_use]
pub fn bucket_for(path: &str) -> Option<&'static str> {
    if path.starts_with("/webauthn/") {
        Some("webauthn")
    } else if path.starts_with("/oauth/") || path.starts_with("/oidc/") || path == "/jwks" {
        Some("oauth")
    } else {
        None
    }
}

/// Admit or reject a request by client IP before it reaches the handler.
///
/// Rejections are audited and answered with 429 and `Retry-After`.
pub async fn rate_limit<B: Backend>(
    State(state): State<AppState<B>>,
    ClientIp(ip): ClientIp,
    request: Request,
    next: Next,
) -> Response {
    let Some(bucket) = bucket_for(request.uri().path()) else {
        return next.run(request).await;
    };

    if state.idp.rate_limiter.admit(bucket, &ip.to_string()).await {
        return next.run(request).await;
    }

    let quota = state.idp.rate_limiter.quota(bucket);
    tracing::warn!(bucket = %bucket, ip = %ip, "Rate limit exceeded");
    state
        .idp
        .audit
        .record(
            AuditEvent::new(AuditEventKind::RateLimited)
                .with_ip(Some(ip))
                .with("bucket", bucket)
                .with("path", request.uri().path()),
        )
        .await;

    AppError::from(AuthError::TooManyAttempts {
        retry_after: quota.window,
    })
    .into_response()
}

/// Rewrite error bodies to include `detail`.
///
/// Installed only outside production.
pub async fn expose_error_detail(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    let Some(detail) = response.extensions_mut().remove::<ErrorDetail>() else {
        return response;
    };

    let body = ErrorBody {
        error: detail.code,
        detail: Some(detail.message),
    };
    let (mut parts, _) = response.into_parts();
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    Response::from_parts(parts, Json(body).into_response().into_body())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_correlation_id_generated_if_missing() {
        let app = Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(correlation_id_layer());

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        let correlation_id = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .expect("Correlation ID header should be present");
        assert!(Uuid::parse_str(correlation_id.to_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_correlation_id_preserved_from_request() {
        let app = Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(correlation_id_layer());

        let request_uuid = Uuid::new_v4();
        let request = Request::builder()
            .uri("/test")
            .header(CORRELATION_ID_HEADER, request_uuid.to_string())
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        let response_id = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .expect("Correlation ID header should be present")
            .to_str()
            .unwrap();
        assert_eq!(response_id, request_uuid.to_string());
    }

    #[tokio::test]
    async fn test_invalid_uuid_generates_new() {
        let app = Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(correlation_id_layer());

        let request = Request::builder()
            .uri("/test")
            .header(CORRELATION_ID_HEADER, "not-a-uuid")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        let uuid_str = response.headers().get(CORRELATION_ID_HEADER).unwrap().to_str().unwrap();
        assert!(Uuid::parse_str(uuid_str).is_ok());
    }

    #[test]
    fn test_buckets() {
        assert_eq!(bucket_for("/webauthn/begin"), Some("webauthn"));
        assert_eq!(bucket_for("/webauthn/auth/verify"), Some("webauthn"));
        assert_eq!(bucket_for("/oauth/token"), Some("oauth"));
        assert_eq!(bucket_for("/oidc/userinfo"), Some("oauth"));
        assert_eq!(bucket_for("/jwks"), Some("oauth"));
        assert_eq!(bucket_for("/health"), None);
        assert_eq!(bucket_for("/session"), None);
    }

    #[tokio::test]
    async fn test_error_detail_exposed() {
        async fn failing() -> Result<&'static str, AppError> {
            Err(AuthError::StorageError("connection refused".into()).into())
        }

        let app = Router::new()
            .route("/fail", get(failing))
            .layer(axum::middleware::from_fn(expose_error_detail));

        let request = Request::builder().uri("/fail").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), 500);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "internal_error");
        assert!(json["detail"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_error_detail_hidden_without_layer() {
        async fn failing() -> Result<&'static str, AppError> {
            Err(AuthError::StorageError("connection refused".into()).into())
        }

        let app = Router::new().route("/fail", get(failing));

        let request = Request::builder().uri("/fail").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "internal_error");
        assert!(json.get("detail").is_none());
    }
}
