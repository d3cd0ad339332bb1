//! User infrastructure module
//!
//! Password hashing with Argon2, in-memory and PostgreSQL repositories,
//! statistics aggregation and the user service that ties them together.

mod password;
mod postgres_repository;
mod repository;
mod service;
mod stats;

pub use password::{Argon2Hasher, PasswordHasher};
pub use postgres_repository::PostgresUserRepository;
pub use repository::InMemoryUserRepository;
pub use service::{
    creation_range, normalize_paging, CreateUserRequest, ListUsersRequest, UpdateUserRequest,
    UserService, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
pub use stats::UserStatsAggregator;
