//! CLI module for account administration
//!
//! Every command loads configuration, initialises logging, connects to
//! PostgreSQL and prints its result as pretty JSON on stdout:
//! - `migrate`: apply (or revert) schema migrations
//! - user commands: the account lifecycle operations

pub mod migrate;
pub mod users;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::AppConfig;
use crate::infrastructure::logging;
use crate::infrastructure::storage::{self, PostgresMigrator};
use crate::infrastructure::user::{Argon2Hasher, PostgresUserRepository, UserService};

/// Account administration for the system user store
#[derive(Parser)]
#[command(name = "account-admin")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply pending schema migrations
    Migrate(migrate::MigrateArgs),

    #[command(flatten)]
    Users(users::UserCommand),
}

fn bootstrap() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    logging::init_logging(&config.logging)?;

    Ok(config)
}

/// Run a parsed command line to completion
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = bootstrap()?;
    let pool = storage::connect(&config.database).await?;

    let output = match cli.command {
        Command::Migrate(args) => migrate::run(&PostgresMigrator::new(pool.clone()), args).await?,
        Command::Users(command) => {
            let repository = Arc::new(PostgresUserRepository::new(pool.clone()));
            let service = UserService::new(repository, Arc::new(Argon2Hasher::new()))
                .with_utc_offset(config.users.utc_offset()?);

            users::execute(&service, command).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    pool.close().await;
    info!("Command finished");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_migrate() {
        let cli = Cli::try_parse_from(["account-admin", "migrate", "--revert-last"]).unwrap();

        assert!(matches!(
            cli.command,
            Command::Migrate(migrate::MigrateArgs { revert_last: true })
        ));
    }

    #[test]
    fn test_parse_user_command() {
        let cli = Cli::try_parse_from([
            "account-admin",
            "create-user",
            "--account",
            "alice",
            "--password",
            "pw1",
            "--email",
            "test@example.com",
        ])
        .unwrap();

        match cli.command {
            Command::Users(users::UserCommand::CreateUser(args)) => {
                assert_eq!(args.account, "alice");
                assert_eq!(args.email.as_deref(), Some("test@example.com"));
                assert!(args.mobile.is_none());
            }
            _ => panic!("expected create-user"),
        }
    }

    #[test]
    fn test_batch_delete_requires_ids() {
        assert!(Cli::try_parse_from(["account-admin", "batch-delete"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;

        Cli::command().debug_assert();
    }
}
