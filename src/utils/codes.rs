//! Random token and verification-code generation.
//!
//! Three shapes of secret material are minted here: 6-digit email codes,
//! 32-character hex opaque tokens (verification / reset / login), and
//! 43-character URL-safe authorization codes and state values.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{Rng, RngCore};
use subtle::ConstantTimeEq;

/// Length of opaque tokens handed to clients (hex-encoded 16 random bytes)
pub const OPAQUE_TOKEN_LENGTH: usize = 32;

/// Length of authorization codes and state values (base64url of 32 bytes)
pub const AUTHORIZATION_CODE_LENGTH: usize = 43;

/// Generate a 6-digit verification code for email delivery
pub fn generate_verification_code() -> String {
    let code: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
    code.to_string()
}

/// Generate a 32-character hex opaque token from a CSPRNG.
///
/// Used as the client-facing handle for verification, password-reset and
/// login codes so user ids never appear in those flows.
pub fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a single-use authorization code: 32 random bytes, base64url
/// without padding (43 characters).
pub fn generate_authorization_code() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a CSRF state value with the same shape as an authorization code
#[allow(dead_code)]
pub fn generate_state() -> String {
    generate_authorization_code()
}

/// Constant-time string equality.
///
/// Length is checked first; equal-length inputs are compared byte-wise
/// without early exit.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_code_is_six_digits() {
        for _ in 0..32 {
            let code = generate_verification_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert!(!code.starts_with('0') || code.parse::<u32>().unwrap() >= 100_000);
        }
    }

    #[test]
    fn test_opaque_token_shape() {
        let token = generate_opaque_token();
        assert_eq!(token.len(), OPAQUE_TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_opaque_token_uniqueness() {
        assert_ne!(generate_opaque_token(), generate_opaque_token());
    }

    #[test]
    fn test_authorization_code_shape() {
        let code = generate_authorization_code();
        assert_eq!(code.len(), AUTHORIZATION_CODE_LENGTH);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_state_shape() {
        assert_eq!(generate_state().len(), AUTHORIZATION_CODE_LENGTH);
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("123456", "123456"));
        assert!(!constant_time_compare("123456", "123457"));
        assert!(!constant_time_compare("123456", "12345"));
        assert!(constant_time_compare("", ""));
    }
}
