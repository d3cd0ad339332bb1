//! Versioned schema migrations for the account store

use sqlx::postgres::PgPool;
use tracing::info;

use crate::domain::DomainError;

/// Name of the partial unique index guarding live accounts
pub const ACCOUNT_UNIQUE_INDEX: &str = "uq_system_users_account_live";
/// Name of the partial unique index guarding live, non-empty emails
pub const EMAIL_UNIQUE_INDEX: &str = "uq_system_users_email_live";
/// Name of the partial unique index guarding live, non-empty mobiles
pub const MOBILE_UNIQUE_INDEX: &str = "uq_system_users_mobile_live";

/// Represents a database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version, applied in ascending order
    pub version: i64,
    /// Human-readable description
    pub description: String,
    /// SQL to run when applying the migration
    pub up: String,
    /// SQL to run when reverting the migration
    pub down: String,
}

impl Migration {
    pub fn new(
        version: i64,
        description: impl Into<String>,
        up: impl Into<String>,
        down: impl Into<String>,
    ) -> Self {
        Self {
            version,
            description: description.into(),
            up: up.into(),
            down: down.into(),
        }
    }
}

/// Applies and reverts [`Migration`]s, tracking them in a `_migrations` table.
/// Each migration runs in its own transaction together with its bookkeeping row.
#[derive(Debug)]
pub struct PostgresMigrator {
    pool: PgPool,
    migrations: Vec<Migration>,
}

impl PostgresMigrator {
    /// Migrator over the account store schema
    pub fn new(pool: PgPool) -> Self {
        Self::with_migrations(pool, user_migrations())
    }

    pub fn with_migrations(pool: PgPool, mut migrations: Vec<Migration>) -> Self {
        migrations.sort_by_key(|m| m.version);
        Self { pool, migrations }
    }

    async fn ensure_migrations_table(&self) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to create migrations table: {}", e)))?;

        Ok(())
    }

    /// Applies every migration newer than the current version.
    /// Returns the versions that were applied.
    pub async fn run_pending(&self) -> Result<Vec<i64>, DomainError> {
        let applied = self.applied_versions().await?;
        let mut newly_applied = Vec::new();

        for migration in self
            .migrations
            .iter()
            .filter(|m| !applied.contains(&m.version))
        {
            self.apply(migration).await?;
            newly_applied.push(migration.version);
        }

        Ok(newly_applied)
    }

    /// Reverts the most recently applied migration, if any
    pub async fn revert_last(&self) -> Result<Option<i64>, DomainError> {
        let Some(current) = self.current_version().await? else {
            return Ok(None);
        };

        let migration = self
            .migrations
            .iter()
            .find(|m| m.version == current)
            .ok_or_else(|| {
                DomainError::storage(format!("Applied migration {} is unknown", current))
            })?;

        let mut tx = self.pool.begin().await.map_err(|e| {
            DomainError::storage(format!("Failed to start migration transaction: {}", e))
        })?;

        sqlx::raw_sql(&migration.down)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to revert migration {}: {}",
                    migration.version, e
                ))
            })?;

        sqlx::query("DELETE FROM _migrations WHERE version = $1")
            .bind(migration.version)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to remove migration record {}: {}",
                    migration.version, e
                ))
            })?;

        tx.commit().await.map_err(|e| {
            DomainError::storage(format!("Failed to commit migration {}: {}", migration.version, e))
        })?;

        info!(version = migration.version, description = %migration.description, "Reverted migration");
        Ok(Some(migration.version))
    }

    async fn apply(&self, migration: &Migration) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            DomainError::storage(format!("Failed to start migration transaction: {}", e))
        })?;

        sqlx::raw_sql(&migration.up)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to run migration {}: {}",
                    migration.version, e
                ))
            })?;

        sqlx::query("INSERT INTO _migrations (version, description) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(&migration.description)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to record migration {}: {}",
                    migration.version, e
                ))
            })?;

        tx.commit().await.map_err(|e| {
            DomainError::storage(format!("Failed to commit migration {}: {}", migration.version, e))
        })?;

        info!(version = migration.version, description = %migration.description, "Applied migration");
        Ok(())
    }

    /// Returns the latest applied migration version
    pub async fn current_version(&self) -> Result<Option<i64>, DomainError> {
        Ok(self.applied_versions().await?.last().copied())
    }

    /// Returns all applied migration versions in ascending order
    pub async fn applied_versions(&self) -> Result<Vec<i64>, DomainError> {
        self.ensure_migrations_table().await?;

        sqlx::query_scalar("SELECT version FROM _migrations ORDER BY version")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get applied migrations: {}", e)))
    }
}

/// Schema of the `system_users` table
pub fn user_migrations() -> Vec<Migration> {
    vec![
        Migration::new(
            1,
            "Create system_users table",
            r#"
            CREATE TABLE IF NOT EXISTS system_users (
                id VARCHAR(64) PRIMARY KEY,
                account VARCHAR(50) NOT NULL,
                password_hash TEXT,
                nickname VARCHAR(30),
                remark VARCHAR(500),
                dept_id TEXT,
                post_ids TEXT,
                email VARCHAR(254),
                mobile VARCHAR(20),
                sex SMALLINT CHECK (sex IN (0, 1)),
                avatar TEXT,
                status SMALLINT NOT NULL DEFAULT 1 CHECK (status IN (0, 1)),
                login_ip TEXT,
                login_date TIMESTAMPTZ,
                tenant_id TEXT,
                create_by TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                update_by TEXT,
                updated_at TIMESTAMPTZ NOT NULL,
                deleted_at TIMESTAMPTZ
            );
            CREATE INDEX IF NOT EXISTS idx_system_users_created_at
                ON system_users (created_at DESC) WHERE deleted_at IS NULL;
            CREATE INDEX IF NOT EXISTS idx_system_users_tenant
                ON system_users (tenant_id) WHERE deleted_at IS NULL;
            "#,
            r#"
            DROP TABLE IF EXISTS system_users;
            "#,
        ),
        Migration::new(
            2,
            "Enforce uniqueness of live account, email and mobile",
            format!(
                r#"
                CREATE UNIQUE INDEX IF NOT EXISTS {account}
                    ON system_users (account) WHERE deleted_at IS NULL;
                CREATE UNIQUE INDEX IF NOT EXISTS {email}
                    ON system_users (email) WHERE deleted_at IS NULL AND email <> '';
                CREATE UNIQUE INDEX IF NOT EXISTS {mobile}
                    ON system_users (mobile) WHERE deleted_at IS NULL AND mobile <> '';
                "#,
                account = ACCOUNT_UNIQUE_INDEX,
                email = EMAIL_UNIQUE_INDEX,
                mobile = MOBILE_UNIQUE_INDEX,
            ),
            format!(
                r#"
                DROP INDEX IF EXISTS {};
                DROP INDEX IF EXISTS {};
                DROP INDEX IF EXISTS {};
                "#,
                ACCOUNT_UNIQUE_INDEX, EMAIL_UNIQUE_INDEX, MOBILE_UNIQUE_INDEX,
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creation() {
        let migration = Migration::new(1, "Test migration", "CREATE TABLE test", "DROP TABLE test");

        assert_eq!(migration.version, 1);
        assert_eq!(migration.description, "Test migration");
        assert_eq!(migration.up, "CREATE TABLE test");
        assert_eq!(migration.down, "DROP TABLE test");
    }

    #[test]
    fn test_user_migrations_order() {
        let migrations = user_migrations();

        for pair in migrations.windows(2) {
            assert!(pair[1].version > pair[0].version);
        }
    }

    #[test]
    fn test_unique_indexes_are_partial_on_live_rows() {
        let migrations = user_migrations();
        let unique = &migrations[1].up;

        assert!(unique.contains(ACCOUNT_UNIQUE_INDEX));
        assert!(unique.contains("(account) WHERE deleted_at IS NULL;"));
        assert!(unique.contains("(email) WHERE deleted_at IS NULL AND email <> ''"));
        assert!(unique.contains("(mobile) WHERE deleted_at IS NULL AND mobile <> ''"));
        assert!(migrations[1].down.contains(MOBILE_UNIQUE_INDEX));
    }

    #[test]
    fn test_schema_has_soft_delete_column() {
        let table = &user_migrations()[0].up;

        assert!(table.contains("deleted_at TIMESTAMPTZ"));
        assert!(table.contains("status SMALLINT NOT NULL DEFAULT 1"));
    }

    #[test]
    fn test_unvalidated_columns_are_unbounded() {
        let table = &user_migrations()[0].up;

        for column in ["dept_id", "login_ip", "tenant_id", "create_by", "update_by"] {
            assert!(
                table.contains(&format!("{} TEXT,", column)),
                "{} should be TEXT",
                column
            );
        }
    }
}
