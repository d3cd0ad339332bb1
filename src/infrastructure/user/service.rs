//! User service for account lifecycle management

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::clock::local_midnight;
use crate::domain::user::{
    parse_sex, parse_status, validate_account, validate_email, validate_id_list,
    validate_mobile, validate_nickname, validate_password, validate_remark, BatchDeleteResult,
    NewUser, User, UserFilter, UserId, UserPage, UserPatch, UserQuery, UserRepository, UserStats,
};
use crate::domain::{Clock, DomainError, UniqueField};

use super::password::PasswordHasher;
use super::stats::UserStatsAggregator;

/// Page size used when the caller asks for none
pub const DEFAULT_PAGE_SIZE: u32 = 15;
/// Upper bound on the page size of a listing
pub const MAX_PAGE_SIZE: u32 = 100;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Request for creating a new user
#[derive(Debug, Clone, Default)]
pub struct CreateUserRequest {
    pub account: String,
    pub password: String,
    pub nickname: Option<String>,
    pub remark: Option<String>,
    pub dept_id: Option<String>,
    pub post_ids: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    /// 0 = female, 1 = male
    pub sex: Option<i8>,
    pub avatar: Option<String>,
    /// 0 = disabled, 1 = enabled; enabled when absent
    pub status: Option<i8>,
    pub tenant_id: Option<String>,
    pub create_by: Option<String>,
}

/// Request for updating a user; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct UpdateUserRequest {
    pub id: String,
    pub nickname: Option<String>,
    pub remark: Option<String>,
    pub dept_id: Option<String>,
    pub post_ids: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub sex: Option<i8>,
    pub avatar: Option<String>,
    pub status: Option<i8>,
    pub update_by: Option<String>,
}

/// Filtered, paginated listing request
#[derive(Debug, Clone, Default)]
pub struct ListUsersRequest {
    /// 1-based; values below 1 select the first page
    pub page: i64,
    /// Values below 1 select the default size, values above the maximum are capped
    pub page_size: i64,
    pub account: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub status: Option<i8>,
    pub dept_id: Option<String>,
    pub tenant_id: Option<String>,
    /// Inclusive `YYYY-MM-DD` lower bound on the creation date
    pub start_date: Option<String>,
    /// Inclusive `YYYY-MM-DD` upper bound on the creation date
    pub end_date: Option<String>,
}

/// Clamp raw paging input into `(page, page_size)`
pub fn normalize_paging(page: i64, page_size: i64) -> (u32, u32) {
    let page = u32::try_from(page.max(1)).unwrap_or(u32::MAX);

    let page_size = if page_size <= 0 {
        DEFAULT_PAGE_SIZE
    } else {
        u32::try_from(page_size)
            .unwrap_or(MAX_PAGE_SIZE)
            .min(MAX_PAGE_SIZE)
    };

    (page, page_size)
}

fn parse_date(value: &str, label: &str) -> Result<NaiveDate, DomainError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| {
        DomainError::bad_request(format!(
            "Invalid {} '{}', expected YYYY-MM-DD",
            label, value
        ))
    })
}

/// Convert an inclusive local date range into a half-open UTC instant range
pub fn creation_range(
    start_date: Option<&str>,
    end_date: Option<&str>,
    offset: FixedOffset,
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), DomainError> {
    let start = start_date
        .filter(|s| !s.is_empty())
        .map(|s| parse_date(s, "start date"))
        .transpose()?;
    let end = end_date
        .filter(|s| !s.is_empty())
        .map(|s| parse_date(s, "end date"))
        .transpose()?;

    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(DomainError::bad_request(format!(
                "Start date {} is after end date {}",
                start, end
            )));
        }
    }

    Ok((
        start.map(|d| local_midnight(d, offset)),
        end.map(|d| local_midnight(d + Duration::days(1), offset)),
    ))
}

fn supplied(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn not_found(id: &UserId) -> DomainError {
    DomainError::not_found(format!("User '{}' not found", id))
}

fn parse_id(id: &str) -> Result<UserId, DomainError> {
    Ok(UserId::new(id)?)
}

/// Orchestrates validation, uniqueness checks and password hashing in front of a
/// [`UserRepository`].
///
/// Uniqueness checks here give early, specific feedback; the repository's own
/// constraint remains the final guard against concurrent writers.
#[derive(Debug)]
pub struct UserService<R: UserRepository, H: PasswordHasher> {
    repository: Arc<R>,
    hasher: Arc<H>,
    stats: UserStatsAggregator<R>,
}

impl<R: UserRepository, H: PasswordHasher> UserService<R, H> {
    /// Create a new user service
    pub fn new(repository: Arc<R>, hasher: Arc<H>) -> Self {
        let stats = UserStatsAggregator::new(repository.clone());
        Self {
            repository,
            hasher,
            stats,
        }
    }

    /// Use `clock` as the source of "now" for statistics buckets
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.stats = self.stats.with_clock(clock);
        self
    }

    /// Interpret calendar dates and buckets at this fixed UTC offset
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.stats = self.stats.with_offset(offset);
        self
    }

    fn validate_create(request: &CreateUserRequest) -> Result<(), DomainError> {
        validate_account(&request.account)?;
        validate_password(&request.password)?;
        Self::validate_optional_fields(
            request.nickname.as_deref(),
            request.remark.as_deref(),
            request.email.as_deref(),
            request.mobile.as_deref(),
        )
    }

    fn validate_optional_fields(
        nickname: Option<&str>,
        remark: Option<&str>,
        email: Option<&str>,
        mobile: Option<&str>,
    ) -> Result<(), DomainError> {
        if let Some(nickname) = nickname {
            validate_nickname(nickname)?;
        }
        if let Some(remark) = remark {
            validate_remark(remark)?;
        }
        if let Some(email) = email {
            validate_email(email)?;
        }
        if let Some(mobile) = mobile {
            validate_mobile(mobile)?;
        }
        Ok(())
    }

    /// Fail when a live user other than `owner` already holds `email`
    async fn ensure_email_free(&self, email: &str, owner: Option<&UserId>) -> Result<(), DomainError> {
        match self.repository.find_by_email(email).await? {
            Some(existing) if Some(&existing.id) != owner => {
                Err(DomainError::already_exists(UniqueField::Email, email))
            }
            _ => Ok(()),
        }
    }

    /// Fail when a live user other than `owner` already holds `mobile`
    async fn ensure_mobile_free(
        &self,
        mobile: &str,
        owner: Option<&UserId>,
    ) -> Result<(), DomainError> {
        match self.repository.find_by_mobile(mobile).await? {
            Some(existing) if Some(&existing.id) != owner => {
                Err(DomainError::already_exists(UniqueField::Mobile, mobile))
            }
            _ => Ok(()),
        }
    }

    async fn require_live(&self, id: &UserId) -> Result<User, DomainError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Create a new user
    pub async fn create_user(&self, request: CreateUserRequest) -> Result<User, DomainError> {
        info!(account = %request.account, "Creating user");

        Self::validate_create(&request)?;
        let sex = request.sex.map(parse_sex).transpose()?;
        let status = request
            .status
            .map(parse_status)
            .transpose()?
            .unwrap_or_default();

        if self
            .repository
            .find_by_account(&request.account)
            .await?
            .is_some()
        {
            return Err(DomainError::already_exists(
                UniqueField::Account,
                request.account,
            ));
        }

        let email = supplied(request.email);
        if let Some(email) = &email {
            self.ensure_email_free(email, None).await?;
        }

        let mobile = supplied(request.mobile);
        if let Some(mobile) = &mobile {
            self.ensure_mobile_free(mobile, None).await?;
        }

        let password_hash = self.hasher.hash(&request.password)?;

        let user = self
            .repository
            .save(NewUser {
                account: request.account,
                password_hash: Some(password_hash),
                nickname: request.nickname,
                remark: request.remark,
                dept_id: request.dept_id,
                post_ids: request.post_ids,
                email,
                mobile,
                sex,
                avatar: request.avatar,
                status,
                login_ip: None,
                login_date: None,
                tenant_id: request.tenant_id,
                create_by: request.create_by,
            })
            .await?;

        info!(id = %user.id, account = %user.account, "User created");
        Ok(user)
    }

    /// Get a live user by ID
    pub async fn get_user(&self, id: &str) -> Result<User, DomainError> {
        debug!(id = %id, "Getting user");

        let user_id = parse_id(id)?;
        self.require_live(&user_id).await
    }

    /// Update the supplied fields of a user. Passwords change only through
    /// [`reset_password`](Self::reset_password).
    pub async fn update_user(&self, request: UpdateUserRequest) -> Result<User, DomainError> {
        info!(id = %request.id, "Updating user");

        let user_id = parse_id(&request.id)?;
        Self::validate_optional_fields(
            request.nickname.as_deref(),
            request.remark.as_deref(),
            request.email.as_deref(),
            request.mobile.as_deref(),
        )?;
        let sex = request.sex.map(parse_sex).transpose()?;
        let status = request.status.map(parse_status).transpose()?;

        let current = self.require_live(&user_id).await?;

        if let Some(email) = request.email.as_deref() {
            if !email.is_empty() && current.email.as_deref() != Some(email) {
                self.ensure_email_free(email, Some(&current.id)).await?;
            }
        }

        if let Some(mobile) = request.mobile.as_deref() {
            if !mobile.is_empty() && current.mobile.as_deref() != Some(mobile) {
                self.ensure_mobile_free(mobile, Some(&current.id)).await?;
            }
        }

        let patch = UserPatch {
            nickname: request.nickname,
            remark: request.remark,
            dept_id: request.dept_id,
            post_ids: request.post_ids,
            email: request.email,
            mobile: request.mobile,
            sex,
            avatar: request.avatar,
            status,
            update_by: request.update_by,
            ..UserPatch::new(user_id.clone())
        };

        self.repository
            .update(&patch)
            .await?
            .ok_or_else(|| not_found(&user_id))
    }

    /// Soft-delete a user
    pub async fn delete_user(&self, id: &str) -> Result<(), DomainError> {
        info!(id = %id, "Deleting user");

        let user_id = parse_id(id)?;

        if !self.repository.delete(&user_id).await? {
            return Err(not_found(&user_id));
        }

        Ok(())
    }

    /// Soft-delete every id independently; individual failures are reported, not raised
    pub async fn batch_delete_users(
        &self,
        ids: &[String],
    ) -> Result<BatchDeleteResult, DomainError> {
        info!(count = ids.len(), "Batch deleting users");

        validate_id_list(ids)?;

        let result = self.repository.batch_delete(ids).await?;

        info!(
            success_count = result.success_count,
            failed_count = result.failed_count,
            "Batch delete finished"
        );
        Ok(result)
    }

    /// Enable or disable a user
    pub async fn change_user_status(
        &self,
        id: &str,
        status: i8,
        update_by: Option<String>,
    ) -> Result<(), DomainError> {
        info!(id = %id, status = status, "Changing user status");

        let user_id = parse_id(id)?;
        let status = parse_status(status)?;

        self.require_live(&user_id).await?;

        if !self
            .repository
            .change_status(&user_id, status, update_by)
            .await?
        {
            return Err(not_found(&user_id));
        }

        Ok(())
    }

    /// Replace a user's password with the digest of `new_password`
    pub async fn reset_password(
        &self,
        id: &str,
        new_password: &str,
        update_by: Option<String>,
    ) -> Result<(), DomainError> {
        info!(id = %id, "Resetting user password");

        let user_id = parse_id(id)?;
        validate_password(new_password)?;

        self.require_live(&user_id).await?;

        let patch = UserPatch {
            password_hash: Some(self.hasher.hash(new_password)?),
            update_by,
            ..UserPatch::new(user_id.clone())
        };

        self.repository
            .update(&patch)
            .await?
            .ok_or_else(|| not_found(&user_id))?;

        Ok(())
    }

    /// Whether a live user holds `account`
    pub async fn check_account_exists(&self, account: &str) -> Result<bool, DomainError> {
        info!(account = %account, "Checking account existence");

        validate_account(account)?;

        Ok(self.repository.find_by_account(account).await?.is_some())
    }

    /// Population and registration counts, optionally for one tenant
    pub async fn get_user_stats(&self, tenant_id: Option<&str>) -> Result<UserStats, DomainError> {
        let tenant_id = tenant_id.filter(|t| !t.is_empty());
        info!(tenant_id = tenant_id.unwrap_or("*"), "Getting user statistics");

        self.stats.collect(tenant_id).await
    }

    /// Filtered page of live users, newest first
    pub async fn list_users(&self, request: ListUsersRequest) -> Result<UserPage, DomainError> {
        let (page, page_size) = normalize_paging(request.page, request.page_size);
        info!(page = page, page_size = page_size, "Listing users");

        let status = request.status.map(parse_status).transpose()?;
        let (created_from, created_before) = creation_range(
            request.start_date.as_deref(),
            request.end_date.as_deref(),
            self.stats.offset(),
        )?;

        let query = UserQuery {
            filter: UserFilter {
                account: supplied(request.account),
                email: supplied(request.email),
                mobile: supplied(request.mobile),
                status,
                dept_id: supplied(request.dept_id),
                tenant_id: supplied(request.tenant_id),
                created_from,
                created_before,
            },
            page,
            page_size,
        };

        self.repository.list(&query).await
    }

    /// Return the live, enabled user holding `account` if `password` matches.
    /// Every failure is reported as `Unauthorized` without saying which check failed.
    pub async fn verify_credentials(
        &self,
        account: &str,
        password: &str,
    ) -> Result<User, DomainError> {
        info!(account = %account, "Verifying credentials");

        let rejected = || DomainError::unauthorized("Invalid account or password");

        if validate_account(account).is_err() {
            return Err(rejected());
        }

        let user = self
            .repository
            .find_by_account(account)
            .await?
            .ok_or_else(rejected)?;

        let matches = user
            .password_hash
            .as_deref()
            .is_some_and(|hash| self.hasher.verify(password, hash));

        if !matches || !user.is_enabled() {
            return Err(rejected());
        }

        Ok(user)
    }
}
