//! UUID-backed identifier generation

use uuid::Uuid;

use crate::domain::user::UserId;
use crate::domain::{DomainError, IdGenerator};

/// Generates random UUID v4 identifiers in their 32-character simple form
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self) -> Result<UserId, DomainError> {
        UserId::new(Uuid::new_v4().simple().to_string()).map_err(|e| {
            DomainError::internal(format!("Generated identifier was rejected: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_hyphenless() {
        let generator = UuidIdGenerator;

        let first = generator.next_id().unwrap();
        let second = generator.next_id().unwrap();

        assert_ne!(first, second);
        assert_eq!(first.as_str().len(), 32);
        assert!(!first.as_str().contains('-'));
    }
}
