//! Email address syntax validation.

use regex::Regex;
use std::sync::LazyLock;

// Simple but solid pattern covering most real-world addresses. Intentionally
// stricter than RFC 5322: we would rather skip an exotic address than send a
// malformed query to a membership API.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+$")
        .expect("EMAIL_RE is a valid regex pattern")
});

/// Returned when an email address fails syntax validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid email address: {0}")]
pub struct EmailError(pub String);

/// Validate the syntax of an email address.
///
/// # Errors
///
/// Returns [`EmailError`] when the address does not match the accepted
/// local@domain shape.
pub fn validate_email(email: &str) -> Result<(), EmailError> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(EmailError(email.to_string()))
    }
}

/// Non-failing form of [`validate_email`].
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_addresses() {
        for email in [
            "user@example.com",
            "first.last@sub.example.org",
            "user+tag@msu.edu",
            "a_b-c@x-y.co",
        ] {
            assert!(validate_email(email).is_ok(), "{email} should validate");
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        for email in ["", "plain", "@nodomain.com", "user@", "user@nodot", "a b@x.com"] {
            assert!(validate_email(email).is_err(), "{email} should fail");
        }
    }
}
