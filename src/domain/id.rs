//! Identifier generation

use std::fmt::Debug;

use super::user::UserId;
use super::DomainError;

/// Produces globally unique user identifiers on demand
pub trait IdGenerator: Send + Sync + Debug {
    fn next_id(&self) -> Result<UserId, DomainError>;
}
