//! User domain
//!
//! Entities, field validation rules, query value types and the repository trait for
//! managing system user accounts.

mod entity;
mod query;
mod repository;
mod validation;

pub use entity::{NewUser, Sex, User, UserId, UserPatch, UserStatus};
pub use query::{
    BatchDeleteResult, DeletedScope, RegistrationWindows, UserFilter, UserPage, UserQuery,
    UserStats,
};
pub use repository::UserRepository;
pub use validation::{
    parse_sex, parse_status, validate_account, validate_email, validate_id_list, validate_mobile,
    validate_nickname, validate_password, validate_remark, validate_user_id, UserValidationError,
};

#[cfg(test)]
pub use repository::MockUserRepository;
