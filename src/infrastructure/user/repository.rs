//! In-memory user repository implementation

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::user::{
    DeletedScope, NewUser, User, UserFilter, UserId, UserPage, UserPatch, UserQuery,
    UserRepository, UserStatus,
};
use crate::domain::{Clock, DomainError, IdGenerator, SystemClock, UniqueField};
use crate::infrastructure::id_generator::UuidIdGenerator;

/// In-memory implementation of UserRepository.
///
/// Soft-deleted users stay in the map with `deleted_at` set. Uniqueness of live
/// accounts, emails and mobiles is enforced while holding the write lock.
#[derive(Debug)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<String, User>>>,
    id_generator: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl InMemoryUserRepository {
    /// Create a new empty repository
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            id_generator: Arc::new(UuidIdGenerator),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }

    async fn find_live<F>(&self, predicate: F) -> Option<User>
    where
        F: Fn(&User) -> bool,
    {
        let users = self.users.read().await;
        users
            .values()
            .find(|u| DeletedScope::ExcludeDeleted.admits(u.deleted_at) && predicate(u))
            .cloned()
    }

    fn live_matching<'a>(
        users: &'a HashMap<String, User>,
        filter: &'a UserFilter,
    ) -> impl Iterator<Item = &'a User> + 'a {
        users
            .values()
            .filter(move |u| DeletedScope::ExcludeDeleted.admits(u.deleted_at) && filter.matches(u))
    }
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

/// First live user other than `exclude` that already holds one of the candidate values
fn unique_conflict(
    users: &HashMap<String, User>,
    exclude: Option<&UserId>,
    account: Option<&str>,
    email: Option<&str>,
    mobile: Option<&str>,
) -> Option<DomainError> {
    let others = || {
        users
            .values()
            .filter(move |u| !u.is_deleted() && Some(&u.id) != exclude)
    };

    if let Some(account) = account {
        if others().any(|u| u.account == account) {
            return Some(DomainError::already_exists(UniqueField::Account, account));
        }
    }

    if let Some(email) = email {
        if others().any(|u| u.email.as_deref() == Some(email)) {
            return Some(DomainError::already_exists(UniqueField::Email, email));
        }
    }

    if let Some(mobile) = mobile {
        if others().any(|u| u.mobile.as_deref() == Some(mobile)) {
            return Some(DomainError::already_exists(UniqueField::Mobile, mobile));
        }
    }

    None
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn save(&self, new_user: NewUser) -> Result<User, DomainError> {
        let mut users = self.users.write().await;

        if let Some(conflict) = unique_conflict(
            &users,
            None,
            Some(new_user.account.as_str()),
            non_empty(new_user.email.as_ref()),
            non_empty(new_user.mobile.as_ref()),
        ) {
            return Err(conflict);
        }

        let id = self.id_generator.next_id()?;

        if users.contains_key(id.as_str()) {
            return Err(DomainError::internal(format!(
                "Generated user ID '{}' is already taken",
                id
            )));
        }

        let user = User::from_new(id, new_user, self.clock.now());
        users.insert(user.id.as_str().to_string(), user.clone());

        Ok(user)
    }

    async fn update(&self, patch: &UserPatch) -> Result<Option<User>, DomainError> {
        let mut users = self.users.write().await;

        let is_live = users
            .get(patch.id.as_str())
            .is_some_and(|u| !u.is_deleted());

        if !is_live {
            return Ok(None);
        }

        if let Some(conflict) = unique_conflict(
            &users,
            Some(&patch.id),
            None,
            non_empty(patch.email.as_ref()),
            non_empty(patch.mobile.as_ref()),
        ) {
            return Err(conflict);
        }

        let now = self.clock.now();

        Ok(users.get_mut(patch.id.as_str()).map(|user| {
            patch.apply_to(user, now);
            user.clone()
        }))
    }

    async fn delete(&self, id: &UserId) -> Result<bool, DomainError> {
        let mut users = self.users.write().await;

        match users.get_mut(id.as_str()) {
            Some(user) if !user.is_deleted() => {
                user.deleted_at = Some(self.clock.now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, DomainError> {
        let users = self.users.read().await;
        Ok(users
            .get(id.as_str())
            .filter(|u| DeletedScope::ExcludeDeleted.admits(u.deleted_at))
            .cloned())
    }

    async fn find_by_id_including_deleted(
        &self,
        id: &UserId,
    ) -> Result<Option<User>, DomainError> {
        let users = self.users.read().await;
        Ok(users
            .get(id.as_str())
            .filter(|u| DeletedScope::IncludeDeleted.admits(u.deleted_at))
            .cloned())
    }

    async fn find_by_account(&self, account: &str) -> Result<Option<User>, DomainError> {
        Ok(self.find_live(|u| u.account == account).await)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DomainError> {
        Ok(self.find_live(|u| u.email.as_deref() == Some(email)).await)
    }

    async fn find_by_mobile(&self, mobile: &str) -> Result<Option<User>, DomainError> {
        Ok(self.find_live(|u| u.mobile.as_deref() == Some(mobile)).await)
    }

    async fn list(&self, query: &UserQuery) -> Result<UserPage, DomainError> {
        let users = self.users.read().await;

        let mut matching: Vec<&User> = Self::live_matching(&users, &query.filter).collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.as_str().cmp(a.id.as_str()))
        });

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .cloned()
            .collect();

        Ok(UserPage {
            users: page,
            total,
            page: query.page,
            page_size: query.page_size,
        })
    }

    async fn count(&self, filter: &UserFilter) -> Result<u64, DomainError> {
        let users = self.users.read().await;
        Ok(Self::live_matching(&users, filter).count() as u64)
    }

    async fn change_status(
        &self,
        id: &UserId,
        status: UserStatus,
        update_by: Option<String>,
    ) -> Result<bool, DomainError> {
        let mut users = self.users.write().await;

        match users.get_mut(id.as_str()) {
            Some(user) if !user.is_deleted() => {
                user.status = status;
                if update_by.is_some() {
                    user.update_by = update_by;
                }
                user.updated_at = self.clock.now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
