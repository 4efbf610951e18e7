//! PKCE (Proof Key for Code Exchange), RFC 7636, S256 only.

use crate::utils::{b64url_encode, random_token};
use constant_time_eq::constant_time_eq;
use sha2::{Digest, Sha256};

/// Computes the S256 code challenge from a code verifier.
///
/// S256: BASE64URL(SHA256(code_verifier))
#[must_use]
pub fn compute_s256_challenge(code_verifier: &str) -> String {
    b64url_encode(Sha256::digest(code_verifier.as_bytes()))
}

/// Whether `code_verifier` hashes to `code_challenge`, compared in constant time.
#[must_use]
pub fn verify_s256(code_verifier: &str, code_challenge: &str) -> bool {
    constant_time_eq(
        compute_s256_challenge(code_verifier).as_bytes(),
        code_challenge.as_bytes(),
    )
}

/// Generates a random code verifier (43 characters).
#[must_use]
pub fn generate_verifier() -> String {
    random_token(32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7636_appendix_b() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let expected = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

        assert_eq!(compute_s256_challenge(verifier), expected);
        assert!(verify_s256(verifier, expected));
    }

    #[test]
    fn test_mismatch() {
        let verifier = generate_verifier();
        assert_eq!(verifier.len(), 43);
        assert!(!verify_s256(&verifier, &compute_s256_challenge("something-else")));
        assert!(!verify_s256(&verifier, ""));
    }
}
