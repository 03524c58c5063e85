//! Email address validation and normalization.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::AuthError;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$"
    ).expect("Invalid email regex pattern")
});

/// Fold an email address to its canonical form.
///
/// Every write and every lookup goes through this; addresses differing only
/// in case are the same account.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate an email address format (RFC 5321 length limits, practical
/// character rules). Input is expected to be normalized already.
pub fn validate_email(email: &str) -> Result<(), AuthError> {
    if email.is_empty() || email.len() > 254 {
        return Err(AuthError::InvalidEmailFormat);
    }

    if let Some(at_pos) = email.find('@') {
        let local_part = &email[..at_pos];
        if local_part.len() > 64
            || local_part.starts_with('.')
            || local_part.ends_with('.')
            || local_part.contains("..")
        {
            return Err(AuthError::InvalidEmailFormat);
        }
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err(AuthError::InvalidEmailFormat);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        for email in [
            "test@example.com",
            "user.name@domain.org",
            "user+tag@example.co.uk",
            "1234567890@example.com",
            "email@subdomain.domain.com",
        ] {
            assert!(validate_email(email).is_ok(), "expected '{}' valid", email);
        }
    }

    #[test]
    fn test_invalid_emails() {
        for email in [
            "",
            "plainaddress",
            "@no-local-part.com",
            "no-domain@",
            "spaces in@email.com",
            ".leading@domain.com",
            "trailing.@domain.com",
            "double..dot@domain.com",
        ] {
            assert!(validate_email(email).is_err(), "expected '{}' invalid", email);
        }
    }

    #[test]
    fn test_length_limits() {
        let long_local = "a".repeat(65);
        assert!(validate_email(&format!("{}@example.com", long_local)).is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  User@Example.COM "), "user@example.com");
        assert_eq!(normalize_email("a@x.io"), "a@x.io");
    }
}
