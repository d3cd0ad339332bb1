//! Query, filter and aggregate value types for user storage

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use super::entity::{User, UserStatus};
use crate::domain::clock::{start_of_day, start_of_month, start_of_week};

/// Whether soft-deleted rows are visible to a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletedScope {
    /// Only rows with a null `deleted_at` (the standard view)
    #[default]
    ExcludeDeleted,
    /// Every row, including soft-deleted ones
    IncludeDeleted,
}

impl DeletedScope {
    pub fn admits(&self, deleted_at: Option<DateTime<Utc>>) -> bool {
        match self {
            Self::ExcludeDeleted => deleted_at.is_none(),
            Self::IncludeDeleted => true,
        }
    }
}

/// Attribute filter shared by listing and counting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFilter {
    /// Substring of the account
    pub account: Option<String>,
    /// Substring of the email
    pub email: Option<String>,
    /// Substring of the mobile number
    pub mobile: Option<String>,
    pub status: Option<UserStatus>,
    pub dept_id: Option<String>,
    pub tenant_id: Option<String>,
    /// Inclusive lower bound on `created_at`
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`
    pub created_before: Option<DateTime<Utc>>,
}

impl UserFilter {
    /// Filter scoped to one tenant, or to all users when `tenant_id` is `None`
    pub fn for_tenant(tenant_id: Option<&str>) -> Self {
        Self {
            tenant_id: tenant_id.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: UserStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn created_since(mut self, from: DateTime<Utc>) -> Self {
        self.created_from = Some(from);
        self
    }

    /// Evaluate the attribute predicates against an in-memory record
    pub fn matches(&self, user: &User) -> bool {
        fn contains(value: &Option<String>, needle: &Option<String>) -> bool {
            match needle {
                Some(n) => value.as_deref().is_some_and(|v| v.contains(n.as_str())),
                None => true,
            }
        }

        fn equals(value: &Option<String>, expected: &Option<String>) -> bool {
            match expected {
                Some(e) => value.as_deref() == Some(e.as_str()),
                None => true,
            }
        }

        if let Some(needle) = &self.account {
            if !user.account.contains(needle.as_str()) {
                return false;
            }
        }

        if let Some(status) = self.status {
            if user.status != status {
                return false;
            }
        }

        if let Some(from) = self.created_from {
            if user.created_at < from {
                return false;
            }
        }

        if let Some(before) = self.created_before {
            if user.created_at >= before {
                return false;
            }
        }

        contains(&user.email, &self.email)
            && contains(&user.mobile, &self.mobile)
            && equals(&user.dept_id, &self.dept_id)
            && equals(&user.tenant_id, &self.tenant_id)
    }
}

/// A filtered page request with already-normalised paging
#[derive(Debug, Clone, PartialEq)]
pub struct UserQuery {
    pub filter: UserFilter,
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
}

impl UserQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }
}

/// Start instants of the registration buckets used by statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationWindows {
    pub today: DateTime<Utc>,
    pub this_week: DateTime<Utc>,
    pub this_month: DateTime<Utc>,
}

impl RegistrationWindows {
    /// Compute bucket starts for `now` in the given local offset.
    ///
    /// The week bucket never starts before the month bucket, so the counts stay
    /// nested (today ≤ this week ≤ this month) even when a week straddles two months.
    pub fn at(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let this_month = start_of_month(now, offset);
        let this_week = start_of_week(now, offset).max(this_month);

        Self {
            today: start_of_day(now, offset),
            this_week,
            this_month,
        }
    }
}

/// Aggregate user counts over the live (optionally tenant-scoped) set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub total_users: u64,
    pub active_users: u64,
    pub inactive_users: u64,
    /// Registered since local midnight
    pub today_registered: u64,
    /// Registered since Monday 00:00 local, or since the 1st of the month when the
    /// week began in the previous month
    pub this_week_registered: u64,
    /// Registered since the 1st of the month, 00:00 local
    pub this_month_registered: u64,
}

/// Outcome of a batch soft-delete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchDeleteResult {
    pub success_count: u32,
    pub failed_count: u32,
    pub failed_ids: Vec<String>,
}

impl BatchDeleteResult {
    pub fn record_success(&mut self) {
        self.success_count += 1;
    }

    pub fn record_failure(&mut self, id: impl Into<String>) {
        self.failed_count += 1;
        self.failed_ids.push(id.into());
    }
}

/// A page of users plus the unpaged total
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::entity::{NewUser, UserId};
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn user(account: &str, created_at: DateTime<Utc>) -> User {
        let new_user = NewUser {
            account: account.to_string(),
            email: Some(format!("{}@example.com", account)),
            mobile: Some("13800138000".to_string()),
            dept_id: Some("d-1".to_string()),
            tenant_id: Some("t-1".to_string()),
            ..Default::default()
        };
        User::from_new(UserId::new(account).unwrap(), new_user, created_at)
    }

    #[test]
    fn test_deleted_scope() {
        let now = utc(2026, 10, 14, 9);
        assert!(DeletedScope::ExcludeDeleted.admits(None));
        assert!(!DeletedScope::ExcludeDeleted.admits(Some(now)));
        assert!(DeletedScope::IncludeDeleted.admits(Some(now)));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(UserFilter::default().matches(&user("alice", utc(2026, 10, 14, 9))));
    }

    #[test]
    fn test_substring_and_exact_predicates() {
        let alice = user("alice", utc(2026, 10, 14, 9));

        let filter = UserFilter {
            account: Some("lic".to_string()),
            email: Some("@example".to_string()),
            mobile: Some("0013".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&alice));

        let wrong_dept = UserFilter {
            dept_id: Some("d".to_string()),
            ..Default::default()
        };
        assert!(!wrong_dept.matches(&alice));

        assert!(UserFilter::for_tenant(Some("t-1")).matches(&alice));
        assert!(!UserFilter::for_tenant(Some("t-2")).matches(&alice));
        assert!(!UserFilter::default()
            .with_status(UserStatus::Disabled)
            .matches(&alice));
    }

    #[test]
    fn test_missing_optional_value_fails_substring() {
        let mut alice = user("alice", utc(2026, 10, 14, 9));
        alice.email = None;

        let filter = UserFilter {
            email: Some("example".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(&alice));
    }

    #[test]
    fn test_created_range_is_half_open() {
        let filter = UserFilter {
            created_from: Some(utc(2026, 10, 14, 0)),
            created_before: Some(utc(2026, 10, 15, 0)),
            ..Default::default()
        };

        assert!(filter.matches(&user("first", utc(2026, 10, 14, 0))));
        assert!(filter.matches(&user("last", utc(2026, 10, 14, 23))));
        assert!(!filter.matches(&user("next", utc(2026, 10, 15, 0))));
        assert!(!filter.matches(&user("prev", utc(2026, 10, 13, 23))));
    }

    #[test]
    fn test_query_offset() {
        let query = UserQuery {
            filter: UserFilter::default(),
            page: 3,
            page_size: 15,
        };
        assert_eq!(query.offset(), 30);
        assert_eq!(query.limit(), 15);
    }

    #[test]
    fn test_registration_windows_are_nested() {
        let offset = FixedOffset::east_opt(0).unwrap();

        let mid_month = RegistrationWindows::at(utc(2026, 10, 14, 9), offset);
        assert_eq!(mid_month.today, utc(2026, 10, 14, 0));
        assert_eq!(mid_month.this_week, utc(2026, 10, 12, 0));
        assert_eq!(mid_month.this_month, utc(2026, 10, 1, 0));

        // The week of 2026-10-01 began in September; it is clamped to the month start
        let month_start = RegistrationWindows::at(utc(2026, 10, 1, 9), offset);
        assert_eq!(month_start.this_week, utc(2026, 10, 1, 0));
        assert!(month_start.today >= month_start.this_week);
    }

    #[test]
    fn test_batch_delete_tally() {
        let mut result = BatchDeleteResult::default();
        result.record_success();
        result.record_failure("b");
        result.record_success();

        assert_eq!(result.success_count, 2);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.failed_ids, vec!["b".to_string()]);
    }
}
