//! Session cookie headers.
//!
//! The `__Host-` prefix makes browsers reject the cookie unless it is
//! `Secure`, has `Path=/` and no `Domain`, which pins it to this exact host.

use axum::http::header::InvalidHeaderValue;
use axum::http::HeaderValue;

/// Name of the session cookie.
pub const SESSION_COOKIE_NAME: &str = "__Host-session";

/// `Set-Cookie` value carrying a new session.
///
/// # Errors
///
/// Returns error if `session_id` contains characters invalid in a header.
pub fn session_cookie(session_id: &str, max_age_secs: i64) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE_NAME}={session_id}; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age={max_age_secs}"
    ))
}

/// `Set-Cookie` value that expires the session cookie.
#[must_use]
pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("__Host-session=; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age=0")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("abc", 3600).unwrap();
        let cookie = cookie.to_str().unwrap();

        assert!(cookie.starts_with("__Host-session=abc;"));
        for attr in ["Path=/", "HttpOnly", "Secure", "SameSite=Strict", "Max-Age=3600"] {
            assert!(cookie.contains(attr), "missing {attr}");
        }
        assert!(!cookie.contains("Domain"));
    }

    #[test]
    fn test_clear_cookie_expires() {
        let cookie = clear_session_cookie();
        let cookie = cookie.to_str().unwrap();

        assert!(cookie.starts_with(&format!("{SESSION_COOKIE_NAME}=;")));
        assert!(cookie.ends_with("Max-Age=0"));
    }

    #[test]
    fn test_rejects_header_injection() {
        assert!(session_cookie("abc\r\nSet-Cookie: evil=1", 3600).is_err());
    }
}
