//! PKCE (Proof Key for Code Exchange) primitives for the OAuth2 Authorization Code Flow
//!
//! RFC 7636. The verifier is generated client-side in theory, but the server
//! exposes the same primitives for first-party clients and for validation of
//! incoming token requests.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Minimum length for code_verifier as per RFC 7636
pub const CODE_VERIFIER_MIN_LENGTH: usize = 43;

/// Maximum length for code_verifier as per RFC 7636
pub const CODE_VERIFIER_MAX_LENGTH: usize = 128;

/// Supported PKCE methods
pub const PKCE_METHOD_S256: &str = "S256";
pub const PKCE_METHOD_PLAIN: &str = "plain";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PkceError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Generate a cryptographically random code_verifier of `length` characters.
///
/// The output is URL-safe base64 without padding, truncated to exactly
/// `length` characters. Lengths outside the RFC 7636 range 43..=128 are
/// rejected.
#[allow(dead_code)]
pub fn generate_verifier(length: usize) -> Result<String, PkceError> {
    if !(CODE_VERIFIER_MIN_LENGTH..=CODE_VERIFIER_MAX_LENGTH).contains(&length) {
        return Err(PkceError::InvalidArgument(format!(
            "code_verifier length must be between {} and {}, got {}",
            CODE_VERIFIER_MIN_LENGTH, CODE_VERIFIER_MAX_LENGTH, length
        )));
    }

    // Encode enough random bytes to cover `length` characters, then truncate.
    let mut random_bytes = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut random_bytes);

    let mut verifier = URL_SAFE_NO_PAD.encode(&random_bytes);
    verifier.truncate(length);

    Ok(verifier)
}

/// Compute code_challenge from a code_verifier.
///
/// S256: `BASE64URL(SHA256(ASCII(code_verifier)))` (43 characters).
/// plain: the verifier itself. Any other method is rejected.
pub fn generate_challenge(code_verifier: &str, method: &str) -> Result<String, PkceError> {
    if code_verifier.is_empty() {
        return Err(PkceError::InvalidArgument(
            "code_verifier cannot be empty".to_string(),
        ));
    }

    match method {
        PKCE_METHOD_S256 => {
            let mut hasher = Sha256::new();
            hasher.update(code_verifier.as_bytes());
            Ok(URL_SAFE_NO_PAD.encode(hasher.finalize()))
        }
        PKCE_METHOD_PLAIN => Ok(code_verifier.to_string()),
        other => Err(PkceError::InvalidArgument(format!(
            "Invalid code_challenge_method: {} (must be 'S256' or 'plain')",
            other
        ))),
    }
}

/// Validate a stored code_challenge against a received code_verifier.
///
/// Recomputes the challenge and compares in constant time. Empty inputs and
/// unknown methods return `false` rather than erroring; the caller surfaces
/// a uniform `invalid_grant`.
pub fn validate(stored_challenge: &str, received_verifier: &str, method: &str) -> bool {
    if stored_challenge.is_empty() || received_verifier.is_empty() {
        return false;
    }

    match generate_challenge(received_verifier, method) {
        Ok(computed) => constant_time_eq(&computed, stored_challenge),
        Err(_) => false,
    }
}

/// Validate code_verifier format according to RFC 7636.
///
/// 43..=128 characters from the unreserved set
/// `[A-Z] / [a-z] / [0-9] / "-" / "." / "_" / "~"`.
pub fn validate_code_verifier(verifier: &str) -> bool {
    let len = verifier.len();
    if !(CODE_VERIFIER_MIN_LENGTH..=CODE_VERIFIER_MAX_LENGTH).contains(&len) {
        return false;
    }

    verifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '~')
}

/// Validate code_challenge format for a given method.
///
/// An S256 challenge is exactly 43 base64url characters (SHA-256 output).
/// A plain challenge has verifier format.
pub fn validate_code_challenge(challenge: &str, method: &str) -> bool {
    match method {
        PKCE_METHOD_S256 => {
            challenge.len() == 43
                && challenge
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        }
        PKCE_METHOD_PLAIN => validate_code_verifier(challenge),
        _ => false,
    }
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // Known test vector from RFC 7636 Appendix B
    const RFC_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const RFC_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_generate_challenge_s256_rfc_vector() {
        let challenge = generate_challenge(RFC_VERIFIER, "S256").unwrap();
        assert_eq!(challenge, RFC_CHALLENGE);
    }

    #[test]
    fn test_validate_s256_valid() {
        assert!(validate(RFC_CHALLENGE, RFC_VERIFIER, "S256"));
    }

    #[test]
    fn test_validate_s256_wrong_verifier() {
        let wrong = "wrong_verifier_that_is_long_enough_to_pass_length_check";
        assert!(!validate(RFC_CHALLENGE, wrong, "S256"));
    }

    #[test]
    fn test_validate_plain() {
        let verifier = "my_plain_code_verifier_that_is_at_least_43_chars";
        assert!(validate(verifier, verifier, "plain"));
        assert!(!validate(
            "different_challenge_value_that_is_also_long_enough",
            verifier,
            "plain"
        ));
    }

    #[test]
    fn test_validate_unsupported_method() {
        assert!(!validate(RFC_CHALLENGE, RFC_VERIFIER, "S512"));
    }

    #[test]
    fn test_validate_empty_inputs() {
        assert!(!validate("", RFC_VERIFIER, "S256"));
        assert!(!validate(RFC_CHALLENGE, "", "S256"));
    }

    #[test]
    fn test_generate_challenge_unknown_method() {
        assert!(matches!(
            generate_challenge(RFC_VERIFIER, "md5"),
            Err(PkceError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_generate_verifier_length_boundaries() {
        assert!(generate_verifier(42).is_err());
        assert_eq!(generate_verifier(43).unwrap().len(), 43);
        assert_eq!(generate_verifier(64).unwrap().len(), 64);
        assert_eq!(generate_verifier(128).unwrap().len(), 128);
        assert!(generate_verifier(129).is_err());
    }

    #[test]
    fn test_generate_verifier_charset() {
        let verifier = generate_verifier(64).unwrap();
        assert!(validate_code_verifier(&verifier));
    }

    #[test]
    fn test_generate_verifier_uniqueness() {
        assert_ne!(generate_verifier(64).unwrap(), generate_verifier(64).unwrap());
    }

    #[test]
    fn test_validate_code_verifier_length() {
        assert!(!validate_code_verifier(&"a".repeat(42)));
        assert!(validate_code_verifier(&"a".repeat(43)));
        assert!(validate_code_verifier(&"a".repeat(128)));
        assert!(!validate_code_verifier(&"a".repeat(129)));
    }

    #[test]
    fn test_validate_code_verifier_invalid_chars() {
        assert!(!validate_code_verifier(
            "abcdefghijklmnopqrstuvwxyz0123456789 abcdef"
        ));
        assert!(!validate_code_verifier(
            "abcdefghijklmnopqrstuvwxyz0123456789+abcdef"
        ));
        assert!(!validate_code_verifier(
            "abcdefghijklmnopqrstuvwxyz0123456789=abcdef"
        ));
    }

    #[test]
    fn test_validate_code_challenge_s256_length() {
        assert!(validate_code_challenge(RFC_CHALLENGE, "S256"));
        assert!(!validate_code_challenge(&RFC_CHALLENGE[..42], "S256"));
        let long = format!("{}x", RFC_CHALLENGE);
        assert!(!validate_code_challenge(&long, "S256"));
    }

    #[test]
    fn test_validate_code_challenge_invalid_chars() {
        assert!(!validate_code_challenge(
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw+cM",
            "S256"
        ));
    }

    proptest! {
        #[test]
        fn prop_roundtrip_s256(len in 43usize..=128) {
            let verifier = generate_verifier(len).unwrap();
            let challenge = generate_challenge(&verifier, "S256").unwrap();
            prop_assert!(validate(&challenge, &verifier, "S256"));
        }

        #[test]
        fn prop_distinct_verifiers_fail(len in 43usize..=128) {
            let v1 = generate_verifier(len).unwrap();
            let v2 = generate_verifier(len).unwrap();
            prop_assume!(v1 != v2);
            let challenge = generate_challenge(&v1, "S256").unwrap();
            prop_assert!(!validate(&challenge, &v2, "S256"));
        }

        #[test]
        fn prop_s256_challenge_is_43_chars(len in 43usize..=128) {
            let verifier = generate_verifier(len).unwrap();
            let challenge = generate_challenge(&verifier, "S256").unwrap();
            prop_assert_eq!(challenge.len(), 43);
        }
    }
}
