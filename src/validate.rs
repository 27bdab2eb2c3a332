//! Operator input checks.
//!
//! The passphrase policy is the one enforced on the access point key. The
//! username and SSID checks keep obviously broken values out of the sudoers
//! drop-in and the hotspot profile.

use thiserror::Error;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_SSID_BYTES: usize = 32;
pub const MAX_USERNAME_LEN: usize = 32;

/// A violated passphrase rule.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordError {
    #[error("Password must be at least 8 characters.")]
    TooShort,

    #[error("Password must include at least one uppercase letter.")]
    MissingUppercase,

    #[error("Password must include at least one digit.")]
    MissingDigit,
}

/// Every rule the passphrase violates, in rule order.
pub fn password_violations(password: &str) -> Vec<PasswordError> {
    let mut violations = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LEN {
        violations.push(PasswordError::TooShort);
    }
    if !password.chars().any(char::is_uppercase) {
        violations.push(PasswordError::MissingUppercase);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        violations.push(PasswordError::MissingDigit);
    }
    violations
}

/// Check the passphrase, reporting the first violated rule.
pub fn validate_password(password: &str) -> Result<(), PasswordError> {
    match password_violations(password).first() {
        Some(err) => Err(*err),
        None => Ok(()),
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsernameError {
    #[error("Username must not be empty.")]
    Empty,

    #[error("Username must be at most 32 characters.")]
    TooLong,

    #[error("Username must start with a lowercase letter or underscore and contain only lowercase letters, digits, '_' or '-'.")]
    InvalidCharacters,
}

/// Check a Linux account name before it is written into a sudoers rule.
pub fn validate_username(username: &str) -> Result<(), UsernameError> {
    if username.is_empty() {
        return Err(UsernameError::Empty);
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(UsernameError::TooLong);
    }

    let body = username.strip_suffix('$').unwrap_or(username);
    let mut chars = body.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let rest_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');

    if first_ok && rest_ok {
        Ok(())
    } else {
        Err(UsernameError::InvalidCharacters)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SsidError {
    #[error("SSID must not be empty.")]
    Empty,

    #[error("SSID must be at most 32 bytes.")]
    TooLong,
}

pub fn validate_ssid(ssid: &str) -> Result<(), SsidError> {
    if ssid.is_empty() {
        Err(SsidError::Empty)
    } else if ssid.len() > MAX_SSID_BYTES {
        Err(SsidError::TooLong)
    } else {
        Ok(())
    }
}
