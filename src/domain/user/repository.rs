//! User repository trait

use async_trait::async_trait;
use tracing::warn;

use super::entity::{NewUser, User, UserId, UserPatch, UserStatus};
use super::query::{BatchDeleteResult, RegistrationWindows, UserFilter, UserPage, UserQuery, UserStats};
use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Soft-delete aware storage for system users.
///
/// Every lookup, listing and count ignores rows whose `deleted_at` is set, except
/// [`find_by_id_including_deleted`](UserRepository::find_by_id_including_deleted).
/// A miss is `Ok(None)`, never an error; callers decide whether absence is exceptional.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Persist a new user, assigning its id and timestamps.
    ///
    /// Fails with `AlreadyExists` when a live user already holds the account, or the
    /// (non-empty) email or mobile.
    async fn save(&self, user: NewUser) -> Result<User, DomainError>;

    /// Apply a partial update to a live user. `Ok(None)` when no live row matched.
    async fn update(&self, patch: &UserPatch) -> Result<Option<User>, DomainError>;

    /// Soft-delete a live user; returns whether a row was affected
    async fn delete(&self, id: &UserId) -> Result<bool, DomainError>;

    /// Soft-delete each id independently, continuing past failures
    async fn batch_delete(&self, ids: &[String]) -> Result<BatchDeleteResult, DomainError> {
        let mut result = BatchDeleteResult::default();

        for raw_id in ids {
            let outcome = match UserId::new(raw_id.as_str()) {
                Ok(id) => self.delete(&id).await,
                Err(e) => Err(e.into()),
            };

            match outcome {
                Ok(true) => result.record_success(),
                Ok(false) => {
                    warn!(user_id = %raw_id, "Batch delete skipped missing user");
                    result.record_failure(raw_id.as_str());
                }
                Err(e) => {
                    warn!(user_id = %raw_id, error = %e, "Batch delete failed for user");
                    result.record_failure(raw_id.as_str());
                }
            }
        }

        Ok(result)
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, DomainError>;

    /// Look up a user by id whether or not it has been soft-deleted
    async fn find_by_id_including_deleted(&self, id: &UserId)
        -> Result<Option<User>, DomainError>;

    async fn find_by_account(&self, account: &str) -> Result<Option<User>, DomainError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DomainError>;

    async fn find_by_mobile(&self, mobile: &str) -> Result<Option<User>, DomainError>;

    /// Filtered page ordered by creation time, newest first.
    /// `total` counts the whole filtered set before paging.
    async fn list(&self, query: &UserQuery) -> Result<UserPage, DomainError>;

    async fn count(&self, filter: &UserFilter) -> Result<u64, DomainError>;

    /// Set the status of a live user; returns whether a row was affected
    async fn change_status(
        &self,
        id: &UserId,
        status: UserStatus,
        update_by: Option<String>,
    ) -> Result<bool, DomainError>;

    /// Aggregate counts over the live users matching `scope`
    async fn user_stats(
        &self,
        scope: &UserFilter,
        windows: &RegistrationWindows,
    ) -> Result<UserStats, DomainError> {
        let total_users = self.count(scope).await?;
        let active_users = self
            .count(&scope.clone().with_status(UserStatus::Enabled))
            .await?;
        let inactive_users = self
            .count(&scope.clone().with_status(UserStatus::Disabled))
            .await?;
        let today_registered = self.count(&scope.clone().created_since(windows.today)).await?;
        let this_week_registered = self
            .count(&scope.clone().created_since(windows.this_week))
            .await?;
        let this_month_registered = self
            .count(&scope.clone().created_since(windows.this_month))
            .await?;

        Ok(UserStats {
            total_users,
            active_users,
            inactive_users,
            today_registered,
            this_week_registered,
            this_month_registered,
        })
    }
}
