//! User field validation rules
//!
//! Every function here is pure. Failures carry a message that names the offending
//! field so callers can surface it directly as a bad-request reason.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::entity::{Sex, UserStatus};
use crate::domain::DomainError;

/// Errors that can occur during user validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UserValidationError {
    #[error("User ID cannot be empty")]
    EmptyId,

    #[error("User ID exceeds maximum length of {0} characters")]
    IdTooLong(usize),

    #[error("User ID cannot contain whitespace")]
    IdContainsWhitespace,

    #[error("User ID list cannot be empty")]
    EmptyIdList,

    #[error("Account cannot be empty")]
    EmptyAccount,

    #[error("Account is too short. Minimum length is {0} characters")]
    AccountTooShort(usize),

    #[error("Account exceeds maximum length of {0} characters")]
    AccountTooLong(usize),

    #[error("Account contains invalid character: '{0}'. Only letters, digits, '_', '-' and '.' are allowed")]
    InvalidAccountCharacter(char),

    #[error("Password cannot be empty")]
    EmptyPassword,

    #[error("Password is too short. Minimum length is {0} characters")]
    PasswordTooShort(usize),

    #[error("Password exceeds maximum length of {0} characters")]
    PasswordTooLong(usize),

    #[error("Password must contain at least one letter and one digit")]
    WeakPassword,

    #[error("Nickname exceeds maximum length of {0} characters")]
    NicknameTooLong(usize),

    #[error("Remark exceeds maximum length of {0} characters")]
    RemarkTooLong(usize),

    #[error("Email exceeds maximum length of {0} characters")]
    EmailTooLong(usize),

    #[error("Email '{0}' is not a valid address")]
    InvalidEmail(String),

    #[error("Mobile '{0}' is not a valid mobile number")]
    InvalidMobile(String),

    #[error("Sex must be 0 (female) or 1 (male), got {0}")]
    InvalidSex(i8),

    #[error("Status must be 0 (disabled) or 1 (enabled), got {0}")]
    InvalidStatus(i8),
}

impl From<UserValidationError> for DomainError {
    fn from(error: UserValidationError) -> Self {
        DomainError::bad_request(error.to_string())
    }
}

pub const MAX_USER_ID_LENGTH: usize = 64;
pub const MIN_ACCOUNT_LENGTH: usize = 3;
pub const MAX_ACCOUNT_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 3;
pub const MAX_PASSWORD_LENGTH: usize = 128;
pub const MAX_NICKNAME_LENGTH: usize = 30;
pub const MAX_REMARK_LENGTH: usize = 500;
pub const MAX_EMAIL_LENGTH: usize = 254;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
});

static MOBILE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^1[3-9]\d{9}$").unwrap());

/// Validate a user ID
///
/// IDs come from the identifier generator, so only the shape is checked:
/// non-empty, at most 64 characters, no whitespace.
pub fn validate_user_id(id: &str) -> Result<(), UserValidationError> {
    if id.is_empty() {
        return Err(UserValidationError::EmptyId);
    }

    if id.chars().count() > MAX_USER_ID_LENGTH {
        return Err(UserValidationError::IdTooLong(MAX_USER_ID_LENGTH));
    }

    if id.chars().any(char::is_whitespace) {
        return Err(UserValidationError::IdContainsWhitespace);
    }

    Ok(())
}

/// Validate the shape of a batch request.
///
/// Only an empty list is rejected; malformed entries are reported per item by the batch itself.
pub fn validate_id_list<S: AsRef<str>>(ids: &[S]) -> Result<(), UserValidationError> {
    if ids.is_empty() {
        return Err(UserValidationError::EmptyIdList);
    }

    Ok(())
}

/// Validate an account name
///
/// Rules:
/// - Cannot be empty
/// - 3 to 50 characters
/// - Only ASCII letters, digits, `_`, `-` and `.`
pub fn validate_account(account: &str) -> Result<(), UserValidationError> {
    if account.is_empty() {
        return Err(UserValidationError::EmptyAccount);
    }

    let length = account.chars().count();

    if length < MIN_ACCOUNT_LENGTH {
        return Err(UserValidationError::AccountTooShort(MIN_ACCOUNT_LENGTH));
    }

    if length > MAX_ACCOUNT_LENGTH {
        return Err(UserValidationError::AccountTooLong(MAX_ACCOUNT_LENGTH));
    }

    for c in account.chars() {
        if !c.is_ascii_alphanumeric() && !matches!(c, '_' | '-' | '.') {
            return Err(UserValidationError::InvalidAccountCharacter(c));
        }
    }

    Ok(())
}

/// Validate a plaintext password against the strength policy
///
/// Rules:
/// - 3 to 128 characters
/// - At least one letter and at least one digit
pub fn validate_password(password: &str) -> Result<(), UserValidationError> {
    if password.is_empty() {
        return Err(UserValidationError::EmptyPassword);
    }

    let length = password.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        return Err(UserValidationError::PasswordTooShort(MIN_PASSWORD_LENGTH));
    }

    if length > MAX_PASSWORD_LENGTH {
        return Err(UserValidationError::PasswordTooLong(MAX_PASSWORD_LENGTH));
    }

    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !has_letter || !has_digit {
        return Err(UserValidationError::WeakPassword);
    }

    Ok(())
}

pub fn validate_nickname(nickname: &str) -> Result<(), UserValidationError> {
    if nickname.chars().count() > MAX_NICKNAME_LENGTH {
        return Err(UserValidationError::NicknameTooLong(MAX_NICKNAME_LENGTH));
    }

    Ok(())
}

pub fn validate_remark(remark: &str) -> Result<(), UserValidationError> {
    if remark.chars().count() > MAX_REMARK_LENGTH {
        return Err(UserValidationError::RemarkTooLong(MAX_REMARK_LENGTH));
    }

    Ok(())
}

/// Validate an email address; the empty string means "not supplied" and passes
pub fn validate_email(email: &str) -> Result<(), UserValidationError> {
    if email.is_empty() {
        return Ok(());
    }

    if email.len() > MAX_EMAIL_LENGTH {
        return Err(UserValidationError::EmailTooLong(MAX_EMAIL_LENGTH));
    }

    if !EMAIL_PATTERN.is_match(email) {
        return Err(UserValidationError::InvalidEmail(email.to_string()));
    }

    Ok(())
}

/// Validate a mobile number; the empty string means "not supplied" and passes
pub fn validate_mobile(mobile: &str) -> Result<(), UserValidationError> {
    if mobile.is_empty() {
        return Ok(());
    }

    if !MOBILE_PATTERN.is_match(mobile) {
        return Err(UserValidationError::InvalidMobile(mobile.to_string()));
    }

    Ok(())
}

pub fn parse_sex(value: i8) -> Result<Sex, UserValidationError> {
    match value {
        0 => Ok(Sex::Female),
        1 => Ok(Sex::Male),
        other => Err(UserValidationError::InvalidSex(other)),
    }
}

pub fn parse_status(value: i8) -> Result<UserStatus, UserValidationError> {
    match value {
        0 => Ok(UserStatus::Disabled),
        1 => Ok(UserStatus::Enabled),
        other => Err(UserValidationError::InvalidStatus(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_user_ids() {
        assert!(validate_user_id("a").is_ok());
        assert!(validate_user_id("0f8b2c8e1c9d4a43a4f7f6f3d6b1c2e9").is_ok());
        assert!(validate_user_id("548812372391").is_ok());
    }

    #[test]
    fn test_invalid_user_ids() {
        assert_eq!(validate_user_id(""), Err(UserValidationError::EmptyId));
        assert_eq!(
            validate_user_id(&"a".repeat(65)),
            Err(UserValidationError::IdTooLong(64))
        );
        assert_eq!(
            validate_user_id("user 1"),
            Err(UserValidationError::IdContainsWhitespace)
        );
    }

    #[test]
    fn test_user_id_list() {
        let empty: [&str; 0] = [];
        assert_eq!(validate_id_list(&empty), Err(UserValidationError::EmptyIdList));
        assert!(validate_id_list(&["a", "b"]).is_ok());
        assert!(validate_id_list(&["a", ""]).is_ok());
    }

    #[test]
    fn test_valid_accounts() {
        assert!(validate_account("alice").is_ok());
        assert!(validate_account("bob_smith").is_ok());
        assert!(validate_account("ops-team.01").is_ok());
        assert!(validate_account(&"a".repeat(50)).is_ok());
    }

    #[test]
    fn test_account_length_bounds() {
        assert_eq!(validate_account(""), Err(UserValidationError::EmptyAccount));
        assert_eq!(
            validate_account("ab"),
            Err(UserValidationError::AccountTooShort(3))
        );
        assert_eq!(
            validate_account(&"a".repeat(51)),
            Err(UserValidationError::AccountTooLong(50))
        );
    }

    #[test]
    fn test_account_invalid_character() {
        assert_eq!(
            validate_account("alice smith"),
            Err(UserValidationError::InvalidAccountCharacter(' '))
        );
    }

    #[test]
    fn test_password_policy() {
        assert!(validate_password("pw1").is_ok());
        assert!(validate_password("password123").is_ok());
        assert_eq!(validate_password(""), Err(UserValidationError::EmptyPassword));
        assert_eq!(
            validate_password("a1"),
            Err(UserValidationError::PasswordTooShort(3))
        );
        assert_eq!(
            validate_password(&format!("{}1", "a".repeat(128))),
            Err(UserValidationError::PasswordTooLong(128))
        );
        assert_eq!(
            validate_password("password"),
            Err(UserValidationError::WeakPassword)
        );
        assert_eq!(
            validate_password("12345678"),
            Err(UserValidationError::WeakPassword)
        );
    }

    #[test]
    fn test_nickname_and_remark_bounds() {
        assert!(validate_nickname("Test User").is_ok());
        assert!(validate_nickname(&"名".repeat(30)).is_ok());
        assert_eq!(
            validate_nickname(&"名".repeat(31)),
            Err(UserValidationError::NicknameTooLong(30))
        );
        assert!(validate_remark("").is_ok());
        assert_eq!(
            validate_remark(&"r".repeat(501)),
            Err(UserValidationError::RemarkTooLong(500))
        );
    }

    #[test]
    fn test_email_grammar() {
        assert!(validate_email("test@example.com").is_ok());
        assert!(validate_email("first.last+tag@sub.example.org").is_ok());
        assert!(validate_email("").is_ok());
        assert!(matches!(
            validate_email("not-an-email"),
            Err(UserValidationError::InvalidEmail(_))
        ));
        assert!(matches!(
            validate_email("a@b"),
            Err(UserValidationError::InvalidEmail(_))
        ));
    }

    #[test]
    fn test_mobile_grammar() {
        assert!(validate_mobile("13800138000").is_ok());
        assert!(validate_mobile("19912345678").is_ok());
        assert!(validate_mobile("").is_ok());
        assert!(matches!(
            validate_mobile("12800138000"),
            Err(UserValidationError::InvalidMobile(_))
        ));
        assert!(matches!(
            validate_mobile("1380013800"),
            Err(UserValidationError::InvalidMobile(_))
        ));
    }

    #[test]
    fn test_enumerations() {
        assert_eq!(parse_sex(0), Ok(Sex::Female));
        assert_eq!(parse_sex(1), Ok(Sex::Male));
        assert_eq!(parse_sex(2), Err(UserValidationError::InvalidSex(2)));
        assert_eq!(parse_status(0), Ok(UserStatus::Disabled));
        assert_eq!(parse_status(1), Ok(UserStatus::Enabled));
        assert_eq!(parse_status(-1), Err(UserValidationError::InvalidStatus(-1)));
    }

    #[test]
    fn test_conversion_to_domain_error() {
        let error: DomainError = UserValidationError::AccountTooShort(3).into();
        assert!(error.is_bad_request());
        assert!(error.to_string().contains("Account is too short"));
    }
}
