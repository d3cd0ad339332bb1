//! PostgreSQL user repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::sync::Arc;

use crate::domain::user::{
    DeletedScope, NewUser, RegistrationWindows, Sex, User, UserFilter, UserId, UserPage,
    UserPatch, UserQuery, UserRepository, UserStats, UserStatus,
};
use crate::domain::{Clock, DomainError, IdGenerator, SystemClock, UniqueField};
use crate::infrastructure::id_generator::UuidIdGenerator;
use crate::infrastructure::storage::migrations::{
    ACCOUNT_UNIQUE_INDEX, EMAIL_UNIQUE_INDEX, MOBILE_UNIQUE_INDEX,
};

const USER_COLUMNS: &str = "id, account, password_hash, nickname, remark, dept_id, post_ids, \
     email, mobile, sex, avatar, status, login_ip, login_date, tenant_id, create_by, created_at, \
     update_by, updated_at, deleted_at";

/// PostgreSQL implementation of UserRepository backed by the `system_users` table
#[derive(Debug, Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
    id_generator: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl PostgresUserRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            id_generator: Arc::new(UuidIdGenerator),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn find_one(
        &self,
        column: &'static str,
        value: &str,
        scope: DeletedScope,
    ) -> Result<Option<User>, DomainError> {
        let mut qb = select_users(scope);
        qb.push(" AND ").push(column).push(" = ").push_bind(value.to_string());
        qb.push(" LIMIT 1");

        let row = qb
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get user by {}: {}", column, e)))?;

        row.as_ref().map(row_to_user).transpose()
    }
}

/// Append the soft-delete predicate. This is the only place that decides row visibility.
fn push_live_filter(qb: &mut QueryBuilder<'_, Postgres>, scope: DeletedScope) {
    match scope {
        DeletedScope::ExcludeDeleted => qb.push("deleted_at IS NULL"),
        DeletedScope::IncludeDeleted => qb.push("TRUE"),
    };
}

fn select_users(scope: DeletedScope) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT ");
    qb.push(USER_COLUMNS).push(" FROM system_users WHERE ");
    push_live_filter(&mut qb, scope);
    qb
}

/// Escape `LIKE` metacharacters so user input only ever matches literally
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Append `AND ...` predicates for every populated filter field
fn push_user_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    let substrings = [
        ("account", &filter.account),
        ("email", &filter.email),
        ("mobile", &filter.mobile),
    ];
    for (column, needle) in substrings {
        if let Some(needle) = needle {
            qb.push(" AND ")
                .push(column)
                .push(" LIKE ")
                .push_bind(like_pattern(needle));
        }
    }

    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(i16::from(status.as_i8()));
    }

    let exact = [("dept_id", &filter.dept_id), ("tenant_id", &filter.tenant_id)];
    for (column, expected) in exact {
        if let Some(expected) = expected {
            qb.push(" AND ").push(column).push(" = ").push_bind(expected.clone());
        }
    }

    if let Some(from) = filter.created_from {
        qb.push(" AND created_at >= ").push_bind(from);
    }

    if let Some(before) = filter.created_before {
        qb.push(" AND created_at < ").push_bind(before);
    }
}

/// `SET` clause of a partial update; only supplied fields are written
fn push_patch_assignments(
    qb: &mut QueryBuilder<'_, Postgres>,
    patch: &UserPatch,
    now: DateTime<Utc>,
) {
    qb.push("updated_at = ").push_bind(now);

    let text_fields = [
        ("password_hash", &patch.password_hash),
        ("nickname", &patch.nickname),
        ("remark", &patch.remark),
        ("dept_id", &patch.dept_id),
        ("post_ids", &patch.post_ids),
        ("email", &patch.email),
        ("mobile", &patch.mobile),
        ("avatar", &patch.avatar),
        ("login_ip", &patch.login_ip),
        ("update_by", &patch.update_by),
    ];
    for (column, value) in text_fields {
        if let Some(value) = value {
            qb.push(", ").push(column).push(" = ").push_bind(value.clone());
        }
    }

    if let Some(sex) = patch.sex {
        qb.push(", sex = ").push_bind(i16::from(sex.as_i8()));
    }

    if let Some(status) = patch.status {
        qb.push(", status = ").push_bind(i16::from(status.as_i8()));
    }

    if let Some(login_date) = patch.login_date {
        qb.push(", login_date = ").push_bind(login_date);
    }
}

/// Values a write could collide on, used to report which one conflicted
#[derive(Debug, Default)]
struct UniqueCandidates<'a> {
    account: Option<&'a str>,
    email: Option<&'a str>,
    mobile: Option<&'a str>,
}

impl UniqueCandidates<'_> {
    fn value(&self, field: UniqueField) -> &str {
        match field {
            UniqueField::Account => self.account,
            UniqueField::Email => self.email,
            UniqueField::Mobile => self.mobile,
        }
        .unwrap_or_default()
    }
}

fn unique_field_for_constraint(constraint: &str) -> Option<UniqueField> {
    match constraint {
        ACCOUNT_UNIQUE_INDEX => Some(UniqueField::Account),
        EMAIL_UNIQUE_INDEX => Some(UniqueField::Email),
        MOBILE_UNIQUE_INDEX => Some(UniqueField::Mobile),
        _ => None,
    }
}

/// Translate unique-index violations into `AlreadyExists`; everything else is a storage failure
fn map_write_error(
    error: sqlx::Error,
    action: &str,
    candidates: &UniqueCandidates<'_>,
) -> DomainError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.is_unique_violation() {
            if let Some(field) = db_error.constraint().and_then(unique_field_for_constraint) {
                return DomainError::already_exists(field, candidates.value(field));
            }
        }
    }

    DomainError::storage(format!("Failed to {}: {}", action, error))
}

fn storage_error(action: &str) -> impl Fn(sqlx::Error) -> DomainError + '_ {
    move |e| DomainError::storage(format!("Failed to {}: {}", action, e))
}

fn non_negative(count: i64) -> u64 {
    u64::try_from(count).unwrap_or_default()
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn save(&self, user: NewUser) -> Result<User, DomainError> {
        let id = self.id_generator.next_id()?;
        let now = self.clock.now();

        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "INSERT INTO system_users (id, account, password_hash, nickname, remark, dept_id, \
             post_ids, email, mobile, sex, avatar, status, login_ip, login_date, tenant_id, \
             create_by, created_at, updated_at) ",
        );
        qb.push_values(std::iter::once(&user), |mut row, user| {
            row.push_bind(id.as_str().to_string())
                .push_bind(user.account.clone())
                .push_bind(user.password_hash.clone())
                .push_bind(user.nickname.clone())
                .push_bind(user.remark.clone())
                .push_bind(user.dept_id.clone())
                .push_bind(user.post_ids.clone())
                .push_bind(user.email.clone())
                .push_bind(user.mobile.clone())
                .push_bind(user.sex.map(|s| i16::from(s.as_i8())))
                .push_bind(user.avatar.clone())
                .push_bind(i16::from(user.status.as_i8()))
                .push_bind(user.login_ip.clone())
                .push_bind(user.login_date)
                .push_bind(user.tenant_id.clone())
                .push_bind(user.create_by.clone())
                .push_bind(now)
                .push_bind(now);
        });
        qb.push(" RETURNING ").push(USER_COLUMNS);

        let candidates = UniqueCandidates {
            account: Some(user.account.as_str()),
            email: user.email.as_deref(),
            mobile: user.mobile.as_deref(),
        };

        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "create user", &candidates))?;

        row_to_user(&row)
    }

    async fn update(&self, patch: &UserPatch) -> Result<Option<User>, DomainError> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("UPDATE system_users SET ");
        push_patch_assignments(&mut qb, patch, self.clock.now());
        qb.push(" WHERE id = ")
            .push_bind(patch.id.as_str().to_string())
            .push(" AND ");
        push_live_filter(&mut qb, DeletedScope::ExcludeDeleted);
        qb.push(" RETURNING ").push(USER_COLUMNS);

        let candidates = UniqueCandidates {
            account: None,
            email: patch.email.as_deref(),
            mobile: patch.mobile.as_deref(),
        };

        let row = qb
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "update user", &candidates))?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn delete(&self, id: &UserId) -> Result<bool, DomainError> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("UPDATE system_users SET deleted_at = ");
        qb.push_bind(self.clock.now())
            .push(" WHERE id = ")
            .push_bind(id.as_str().to_string())
            .push(" AND ");
        push_live_filter(&mut qb, DeletedScope::ExcludeDeleted);

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(storage_error("delete user"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, DomainError> {
        self.find_one("id", id.as_str(), DeletedScope::ExcludeDeleted)
            .await
    }

    async fn find_by_id_including_deleted(
        &self,
        id: &UserId,
    ) -> Result<Option<User>, DomainError> {
        self.find_one("id", id.as_str(), DeletedScope::IncludeDeleted)
            .await
    }

    async fn find_by_account(&self, account: &str) -> Result<Option<User>, DomainError> {
        self.find_one("account", account, DeletedScope::ExcludeDeleted)
            .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DomainError> {
        self.find_one("email", email, DeletedScope::ExcludeDeleted)
            .await
    }

    async fn find_by_mobile(&self, mobile: &str) -> Result<Option<User>, DomainError> {
        self.find_one("mobile", mobile, DeletedScope::ExcludeDeleted)
            .await
    }

    async fn list(&self, query: &UserQuery) -> Result<UserPage, DomainError> {
        let total = self.count(&query.filter).await?;

        let mut qb = select_users(DeletedScope::ExcludeDeleted);
        push_user_filter(&mut qb, &query.filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::try_from(query.limit()).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error("list users"))?;

        let users = rows.iter().map(row_to_user).collect::<Result<Vec<_>, _>>()?;

        Ok(UserPage {
            users,
            total,
            page: query.page,
            page_size: query.page_size,
        })
    }

    async fn count(&self, filter: &UserFilter) -> Result<u64, DomainError> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM system_users WHERE ");
        push_live_filter(&mut qb, DeletedScope::ExcludeDeleted);
        push_user_filter(&mut qb, filter);

        let count = qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error("count users"))?;

        Ok(non_negative(count))
    }

    async fn change_status(
        &self,
        id: &UserId,
        status: UserStatus,
        update_by: Option<String>,
    ) -> Result<bool, DomainError> {
        let mut patch = UserPatch::new(id.clone());
        patch.status = Some(status);
        patch.update_by = update_by;

        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("UPDATE system_users SET ");
        push_patch_assignments(&mut qb, &patch, self.clock.now());
        qb.push(" WHERE id = ")
            .push_bind(id.as_str().to_string())
            .push(" AND ");
        push_live_filter(&mut qb, DeletedScope::ExcludeDeleted);

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(storage_error("change user status"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn user_stats(
        &self,
        scope: &UserFilter,
        windows: &RegistrationWindows,
    ) -> Result<UserStats, DomainError> {
        let mut qb = stats_query(scope, windows);

        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error("compute user statistics"))?;

        let column = |name: &str| -> Result<u64, DomainError> {
            row.try_get::<i64, _>(name)
                .map(non_negative)
                .map_err(|e| DomainError::storage(format!("Failed to read {}: {}", name, e)))
        };

        Ok(UserStats {
            total_users: column("total_users")?,
            active_users: column("active_users")?,
            inactive_users: column("inactive_users")?,
            today_registered: column("today_registered")?,
            this_week_registered: column("this_week_registered")?,
            this_month_registered: column("this_month_registered")?,
        })
    }
}

/// Single-pass aggregate over the live rows in `scope`
fn stats_query(
    scope: &UserFilter,
    windows: &RegistrationWindows,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(
        "SELECT COUNT(*) AS total_users, \
         COUNT(*) FILTER (WHERE status = 1) AS active_users, \
         COUNT(*) FILTER (WHERE status = 0) AS inactive_users, \
         COUNT(*) FILTER (WHERE created_at >= ",
    );
    qb.push_bind(windows.today)
        .push(") AS today_registered, COUNT(*) FILTER (WHERE created_at >= ")
        .push_bind(windows.this_week)
        .push(") AS this_week_registered, COUNT(*) FILTER (WHERE created_at >= ")
        .push_bind(windows.this_month)
        .push(") AS this_month_registered FROM system_users WHERE ");
    push_live_filter(&mut qb, DeletedScope::ExcludeDeleted);
    push_user_filter(&mut qb, scope);
    qb
}

fn row_to_user(row: &PgRow) -> Result<User, DomainError> {
    fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, DomainError>
    where
        T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
    {
        row.try_get(column)
            .map_err(|e| DomainError::storage(format!("Failed to read column {}: {}", column, e)))
    }

    fn small_int(value: i16) -> Result<i8, DomainError> {
        i8::try_from(value)
            .map_err(|_| DomainError::storage(format!("Out of range code in database: {}", value)))
    }

    let id: String = get(row, "id")?;
    let id = UserId::new(id)
        .map_err(|e| DomainError::storage(format!("Invalid user ID in database: {}", e)))?;

    let sex = get::<Option<i16>>(row, "sex")?
        .map(|code| small_int(code).and_then(|c| Sex::try_from(c).map_err(DomainError::from)))
        .transpose()
        .map_err(|e| DomainError::storage(format!("Invalid sex in database: {}", e)))?;

    let status = small_int(get(row, "status")?)
        .and_then(|c| UserStatus::try_from(c).map_err(DomainError::from))
        .map_err(|e| DomainError::storage(format!("Invalid status in database: {}", e)))?;

    Ok(User {
        id,
        account: get(row, "account")?,
        password_hash: get(row, "password_hash")?,
        nickname: get(row, "nickname")?,
        remark: get(row, "remark")?,
        dept_id: get(row, "dept_id")?,
        post_ids: get(row, "post_ids")?,
        email: get(row, "email")?,
        mobile: get(row, "mobile")?,
        sex,
        avatar: get(row, "avatar")?,
        status,
        login_ip: get(row, "login_ip")?,
        login_date: get(row, "login_date")?,
        tenant_id: get(row, "tenant_id")?,
        create_by: get(row, "create_by")?,
        created_at: get(row, "created_at")?,
        update_by: get(row, "update_by")?,
        updated_at: get(row, "updated_at")?,
        deleted_at: get(row, "deleted_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn test_live_filter_is_the_default_scope() {
        let qb = select_users(DeletedScope::ExcludeDeleted);
        assert!(qb.sql().ends_with("FROM system_users WHERE deleted_at IS NULL"));

        let qb = select_users(DeletedScope::IncludeDeleted);
        assert!(qb.sql().ends_with("FROM system_users WHERE TRUE"));
        assert!(!qb.sql().contains("deleted_at IS NULL"));
    }

    #[test]
    fn test_empty_filter_adds_no_predicates() {
        let mut qb = select_users(DeletedScope::ExcludeDeleted);
        push_user_filter(&mut qb, &UserFilter::default());

        assert!(!qb.sql().contains(" AND "));
    }

    #[test]
    fn test_filter_predicates_are_bound() {
        let filter = UserFilter {
            account: Some("ali".to_string()),
            mobile: Some("138".to_string()),
            status: Some(UserStatus::Disabled),
            tenant_id: Some("t-1".to_string()),
            created_from: Some(Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap()),
            created_before: Some(Utc.with_ymd_and_hms(2026, 10, 15, 0, 0, 0).unwrap()),
            ..Default::default()
        };

        let mut qb = select_users(DeletedScope::ExcludeDeleted);
        push_user_filter(&mut qb, &filter);
        let sql = qb.sql();

        assert!(sql.contains("deleted_at IS NULL AND account LIKE $1 AND mobile LIKE $2"));
        assert!(sql.contains("AND status = $3 AND tenant_id = $4"));
        assert!(sql.contains("AND created_at >= $5 AND created_at < $6"));
        assert!(!sql.contains("email LIKE"));
        assert!(!sql.contains("ali"));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("alice"), "%alice%");
        assert_eq!(like_pattern("a_b%c"), "%a\\_b\\%c%");
        assert_eq!(like_pattern("back\\slash"), "%back\\\\slash%");
    }

    #[test]
    fn test_patch_only_sets_supplied_fields() {
        let mut patch = UserPatch::new(UserId::new("u-1").unwrap());
        patch.nickname = Some("Alice".to_string());
        patch.remark = Some(String::new());
        patch.status = Some(UserStatus::Enabled);

        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("UPDATE system_users SET ");
        push_patch_assignments(&mut qb, &patch, Utc::now());
        let sql = qb.sql();

        assert_eq!(
            sql,
            "UPDATE system_users SET updated_at = $1, nickname = $2, remark = $3, status = $4"
        );
    }

    #[test]
    fn test_password_reset_patch_touches_only_password() {
        let mut patch = UserPatch::new(UserId::new("u-1").unwrap());
        patch.password_hash = Some("$argon2id$v=19$digest".to_string());

        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("UPDATE system_users SET ");
        push_patch_assignments(&mut qb, &patch, Utc::now());

        assert_eq!(
            qb.sql(),
            "UPDATE system_users SET updated_at = $1, password_hash = $2"
        );
    }

    #[test]
    fn test_stats_query_is_single_aggregate() {
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap();
        let windows = RegistrationWindows::at(now, FixedOffset::east_opt(0).unwrap());

        let qb = stats_query(&UserFilter::for_tenant(Some("t-1")), &windows);
        let sql = qb.sql();

        assert_eq!(sql.matches("COUNT(*)").count(), 6);
        assert!(sql.contains("FILTER (WHERE status = 1) AS active_users"));
        assert!(sql.contains("FILTER (WHERE created_at >= $3) AS this_month_registered"));
        assert!(sql.ends_with("WHERE deleted_at IS NULL AND tenant_id = $4"));
    }

    #[test]
    fn test_constraint_names_map_to_fields() {
        assert_eq!(
            unique_field_for_constraint(ACCOUNT_UNIQUE_INDEX),
            Some(UniqueField::Account)
        );
        assert_eq!(
            unique_field_for_constraint(EMAIL_UNIQUE_INDEX),
            Some(UniqueField::Email)
        );
        assert_eq!(
            unique_field_for_constraint(MOBILE_UNIQUE_INDEX),
            Some(UniqueField::Mobile)
        );
        assert_eq!(unique_field_for_constraint("system_users_pkey"), None);
    }

    #[test]
    fn test_non_database_errors_are_storage_failures() {
        let err = map_write_error(
            sqlx::Error::RowNotFound,
            "create user",
            &UniqueCandidates::default(),
        );

        assert!(matches!(err, DomainError::Storage { .. }));
        assert!(err.to_string().contains("create user"));
    }
}
