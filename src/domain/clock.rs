//! Time source and local-calendar boundaries
//!
//! All timestamps are stored in UTC. "Local" calendar boundaries (start of day, week,
//! month) are computed against a fixed UTC offset so results do not depend on the
//! host's timezone database.

use std::fmt::Debug;

use chrono::{DateTime, Datelike, Duration, FixedOffset, Local, NaiveDate, NaiveTime, Utc};

/// Source of the current instant
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Offset of the host's local timezone right now
pub fn host_offset() -> FixedOffset {
    *Local::now().offset()
}

/// Build an offset from a number of minutes east of UTC
pub fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(minutes.checked_mul(60)?)
}

/// UTC instant of local midnight at the start of `date`
pub fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let local = date.and_time(NaiveTime::MIN);
    (local - Duration::seconds(i64::from(offset.local_minus_utc()))).and_utc()
}

/// Local calendar date that contains `instant`
pub fn local_date(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

/// Start of the local day containing `now`
pub fn start_of_day(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    local_midnight(local_date(now, offset), offset)
}

/// Start of the local week (Monday) containing `now`
pub fn start_of_week(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let today = local_date(now, offset);
    let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    local_midnight(monday, offset)
}

/// Start of the local calendar month containing `now`
pub fn start_of_month(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let today = local_date(now, offset);
    let first = today - Duration::days(i64::from(today.day0()));
    local_midnight(first, offset)
}
