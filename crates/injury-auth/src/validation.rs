//! Input normalization and validation.

use crate::{AuthError, AuthResult};

/// Minimum accepted password length for sign-up and password changes.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Trim, lowercase and sanity-check an email address.
pub fn normalize_email(input: &str) -> AuthResult<String> {
    let email = input.trim().to_lowercase();
    if email.is_empty() {
        return Err(AuthError::Validation("Email is required.".to_string()));
    }

    let invalid = || AuthError::Validation("Please enter a valid email address.".to_string());

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels_ok = domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty());
    if !labels_ok {
        return Err(invalid());
    }

    Ok(email)
}

/// Password checks for sign-in: present, nothing more.
pub fn require_password(password: &str) -> AuthResult<()> {
    if password.is_empty() {
        return Err(AuthError::Validation("Password is required.".to_string()));
    }
    Ok(())
}

/// Password checks for new passwords.
pub fn validate_new_password(password: &str) -> AuthResult<()> {
    require_password(password)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {} characters.",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Trimmed value of a required text field.
pub fn required(label: &str, value: &str) -> AuthResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AuthError::Validation(format!("{} is required.", label)));
    }
    Ok(trimmed.to_string())
}

/// Trimmed value of an optional text field; blank becomes `None`.
pub fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  User@Example.com ").unwrap(),
            "user@example.com"
        );
        assert_eq!(
            normalize_email("first.last+tag@sub.example.org").unwrap(),
            "first.last+tag@sub.example.org"
        );
    }

    #[test]
    fn test_rejects_malformed_email() {
        for input in [
            "",
            "   ",
            "no-at-sign",
            "@example.com",
            "user@",
            "user@localhost",
            "user@@example.com",
            "us er@example.com",
            "user@example..com",
            "user@.example.com",
        ] {
            assert!(
                matches!(normalize_email(input), Err(AuthError::Validation(_))),
                "accepted {:?}",
                input
            );
        }
    }

    #[test]
    fn test_password_rules() {
        assert!(require_password("x").is_ok());
        assert!(require_password("").is_err());
        assert!(validate_new_password("12345").is_err());
        assert!(validate_new_password("123456").is_ok());
        // Counted in characters, not bytes.
        assert!(validate_new_password("ääääää").is_ok());
        assert!(validate_new_password("äää").is_err());
    }

    #[test]
    fn test_required_and_optional() {
        assert_eq!(required("Name", "  Ana ").unwrap(), "Ana");
        let err = required("Name", "  ").unwrap_err();
        assert_eq!(err.to_string(), "Name is required.");

        assert_eq!(optional(Some(" 555 ")), Some("555".to_string()));
        assert_eq!(optional(Some("   ")), None);
        assert_eq!(optional(None), None);
    }
}
