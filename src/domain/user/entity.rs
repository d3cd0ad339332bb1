//! User entity and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::{parse_sex, parse_status, validate_user_id, UserValidationError};

/// User identifier assigned once by the identifier generator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Create a new UserId after validation
    pub fn new(id: impl Into<String>) -> Result<Self, UserValidationError> {
        let id = id.into();
        validate_user_id(&id)?;
        Ok(Self(id))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = UserValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Account is disabled (0)
    Disabled,
    /// Account is enabled (1)
    #[default]
    Enabled,
}

impl UserStatus {
    pub fn as_i8(&self) -> i8 {
        match self {
            Self::Disabled => 0,
            Self::Enabled => 1,
        }
    }
}

impl TryFrom<i8> for UserStatus {
    type Error = UserValidationError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        parse_status(value)
    }
}

/// Recorded sex of the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    /// Encoded as 0
    Female,
    /// Encoded as 1
    Male,
}

impl Sex {
    pub fn as_i8(&self) -> i8 {
        match self {
            Self::Female => 0,
            Self::Male => 1,
        }
    }
}

impl TryFrom<i8> for Sex {
    type Error = UserValidationError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        parse_sex(value)
    }
}

/// A persisted system user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub account: String,
    /// Argon2 PHC string - never exposed in serialization
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub nickname: Option<String>,
    pub remark: Option<String>,
    pub dept_id: Option<String>,
    pub post_ids: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub sex: Option<Sex>,
    pub avatar: Option<String>,
    pub status: UserStatus,
    pub login_ip: Option<String>,
    pub login_date: Option<DateTime<Utc>>,
    pub tenant_id: Option<String>,
    pub create_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub update_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Materialize a freshly saved record
    pub fn from_new(id: UserId, new_user: NewUser, now: DateTime<Utc>) -> Self {
        Self {
            id,
            account: new_user.account,
            password_hash: new_user.password_hash,
            nickname: new_user.nickname,
            remark: new_user.remark,
            dept_id: new_user.dept_id,
            post_ids: new_user.post_ids,
            email: new_user.email,
            mobile: new_user.mobile,
            sex: new_user.sex,
            avatar: new_user.avatar,
            status: new_user.status,
            login_ip: new_user.login_ip,
            login_date: new_user.login_date,
            tenant_id: new_user.tenant_id,
            create_by: new_user.create_by,
            created_at: now,
            update_by: None,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.status == UserStatus::Enabled
    }
}

/// A validated user ready to be persisted; id and timestamps are assigned by storage
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewUser {
    pub account: String,
    pub password_hash: Option<String>,
    pub nickname: Option<String>,
    pub remark: Option<String>,
    pub dept_id: Option<String>,
    pub post_ids: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub sex: Option<Sex>,
    pub avatar: Option<String>,
    pub status: UserStatus,
    pub login_ip: Option<String>,
    pub login_date: Option<DateTime<Utc>>,
    pub tenant_id: Option<String>,
    pub create_by: Option<String>,
}

/// A partial update: `None` leaves the stored value untouched, `Some` overwrites it
/// (including `Some(String::new())`, which stores an empty string).
#[derive(Debug, Clone, PartialEq)]
pub struct UserPatch {
    pub id: UserId,
    pub password_hash: Option<String>,
    pub nickname: Option<String>,
    pub remark: Option<String>,
    pub dept_id: Option<String>,
    pub post_ids: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub sex: Option<Sex>,
    pub avatar: Option<String>,
    pub status: Option<UserStatus>,
    pub login_ip: Option<String>,
    pub login_date: Option<DateTime<Utc>>,
    pub update_by: Option<String>,
}

impl UserPatch {
    /// A patch that changes nothing yet
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            password_hash: None,
            nickname: None,
            remark: None,
            dept_id: None,
            post_ids: None,
            email: None,
            mobile: None,
            sex: None,
            avatar: None,
            status: None,
            login_ip: None,
            login_date: None,
            update_by: None,
        }
    }

    /// Copy every supplied field onto `user` and stamp the update time
    pub fn apply_to(&self, user: &mut User, now: DateTime<Utc>) {
        fn set<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *target = Some(v.clone());
            }
        }

        set(&mut user.password_hash, &self.password_hash);
        set(&mut user.nickname, &self.nickname);
        set(&mut user.remark, &self.remark);
        set(&mut user.dept_id, &self.dept_id);
        set(&mut user.post_ids, &self.post_ids);
        set(&mut user.email, &self.email);
        set(&mut user.mobile, &self.mobile);
        set(&mut user.sex, &self.sex);
        set(&mut user.avatar, &self.avatar);
        set(&mut user.login_ip, &self.login_ip);
        set(&mut user.login_date, &self.login_date);
        set(&mut user.update_by, &self.update_by);

        if let Some(status) = self.status {
            user.status = status;
        }

        user.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, hour, 0, 0).unwrap()
    }

    fn create_test_user() -> User {
        let new_user = NewUser {
            account: "alice".to_string(),
            password_hash: Some("$argon2id$v=19$hash".to_string()),
            nickname: Some("Alice".to_string()),
            email: Some("alice@example.com".to_string()),
            ..Default::default()
        };
        User::from_new(UserId::new("u-1").unwrap(), new_user, at(9))
    }

    #[test]
    fn test_user_id_rejects_empty() {
        assert!(UserId::new("").is_err());
        assert_eq!(UserId::new("u-1").unwrap().as_str(), "u-1");
    }

    #[test]
    fn test_status_and_sex_codes() {
        assert_eq!(UserStatus::default(), UserStatus::Enabled);
        assert_eq!(UserStatus::Disabled.as_i8(), 0);
        assert_eq!(UserStatus::try_from(1).unwrap(), UserStatus::Enabled);
        assert!(UserStatus::try_from(3).is_err());
        assert_eq!(Sex::try_from(0).unwrap(), Sex::Female);
        assert_eq!(Sex::Male.as_i8(), 1);
    }

    #[test]
    fn test_from_new_sets_timestamps() {
        let user = create_test_user();
        assert_eq!(user.created_at, at(9));
        assert_eq!(user.updated_at, at(9));
        assert!(!user.is_deleted());
        assert!(user.is_enabled());
    }

    #[test]
    fn test_patch_leaves_absent_fields_untouched() {
        let mut user = create_test_user();
        let mut patch = UserPatch::new(user.id.clone());
        patch.remark = Some(String::new());
        patch.status = Some(UserStatus::Disabled);

        patch.apply_to(&mut user, at(10));

        assert_eq!(user.nickname.as_deref(), Some("Alice"));
        assert_eq!(user.email.as_deref(), Some("alice@example.com"));
        assert_eq!(user.remark.as_deref(), Some(""));
        assert_eq!(user.status, UserStatus::Disabled);
        assert_eq!(user.updated_at, at(10));
        assert_eq!(user.created_at, at(9));
    }

    #[test]
    fn test_user_serialization_excludes_password() {
        let user = create_test_user();

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("deleted_at"));
    }
}
