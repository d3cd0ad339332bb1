//! User statistics aggregation

use chrono::FixedOffset;
use std::sync::Arc;
use tracing::debug;

use crate::domain::clock::host_offset;
use crate::domain::user::{RegistrationWindows, UserFilter, UserRepository, UserStats};
use crate::domain::{Clock, DomainError, SystemClock};

/// Derives population and registration counts from the repository.
///
/// Registration buckets (today, this week, this month) are computed in the
/// configured local offset and always nest inside each other.
#[derive(Debug)]
pub struct UserStatsAggregator<R: UserRepository> {
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl<R: UserRepository> UserStatsAggregator<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            clock: Arc::new(SystemClock),
            offset: host_offset(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Bucket boundaries for the current instant
    pub fn windows(&self) -> RegistrationWindows {
        RegistrationWindows::at(self.clock.now(), self.offset)
    }

    /// Counts over all live users, or only those of `tenant_id`
    pub async fn collect(&self, tenant_id: Option<&str>) -> Result<UserStats, DomainError> {
        let windows = self.windows();
        debug!(
            tenant_id = tenant_id.unwrap_or("*"),
            today = %windows.today,
            this_week = %windows.this_week,
            this_month = %windows.this_month,
            "Collecting user statistics"
        );

        self.repository
            .user_stats(&UserFilter::for_tenant(tenant_id), &windows)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::FixedClock;
    use crate::domain::user::MockUserRepository;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_collect_scopes_by_tenant_and_passes_windows() {
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap();
        let mut repository = MockUserRepository::new();

        repository
            .expect_user_stats()
            .withf(move |scope, windows| {
                scope.tenant_id.as_deref() == Some("t-1")
                    && windows.today == Utc.with_ymd_and_hms(2026, 10, 14, 0, 0, 0).unwrap()
                    && windows.this_week == Utc.with_ymd_and_hms(2026, 10, 12, 0, 0, 0).unwrap()
            })
            .times(1)
            .returning(|_, _| {
                Ok(UserStats {
                    total_users: 3,
                    active_users: 2,
                    inactive_users: 1,
                    today_registered: 1,
                    this_week_registered: 2,
                    this_month_registered: 3,
                })
            });

        let aggregator = UserStatsAggregator::new(Arc::new(repository))
            .with_clock(Arc::new(FixedClock::new(now)))
            .with_offset(FixedOffset::east_opt(0).unwrap());

        let stats = aggregator.collect(Some("t-1")).await.unwrap();
        assert_eq!(stats.total_users, 3);
    }

    #[tokio::test]
    async fn test_collect_without_tenant_is_unscoped() {
        let mut repository = MockUserRepository::new();

        repository
            .expect_user_stats()
            .withf(|scope, _| scope == &UserFilter::default())
            .returning(|_, _| Ok(UserStats::default()));

        let aggregator = UserStatsAggregator::new(Arc::new(repository));

        assert_eq!(aggregator.collect(None).await.unwrap(), UserStats::default());
    }

    #[test]
    fn test_windows_follow_offset() {
        // 2026-10-13 20:00 UTC is 2026-10-14 04:00 at UTC+8
        let now = Utc.with_ymd_and_hms(2026, 10, 13, 20, 0, 0).unwrap();
        let aggregator = UserStatsAggregator::new(Arc::new(MockUserRepository::new()))
            .with_clock(Arc::new(FixedClock::new(now)))
            .with_offset(FixedOffset::east_opt(8 * 3600).unwrap());

        let windows = aggregator.windows();
        assert_eq!(windows.today, Utc.with_ymd_and_hms(2026, 10, 13, 16, 0, 0).unwrap());
    }
}
