//! Domain layer - Core business rules and entities

pub mod clock;
pub mod error;
pub mod id;
pub mod user;

pub use clock::{Clock, SystemClock};
pub use error::{DomainError, UniqueField};
pub use id::IdGenerator;
pub use user::{
    BatchDeleteResult, NewUser, Sex, User, UserFilter, UserId, UserPage, UserPatch, UserQuery,
    UserRepository, UserStats, UserStatus,
};
