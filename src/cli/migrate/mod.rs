//! Migrate command - applies or reverts the account store schema

use clap::Args;
use serde_json::{json, Value};
use tracing::info;

use crate::domain::DomainError;
use crate::infrastructure::storage::PostgresMigrator;

/// Arguments for the migrate command
#[derive(Args, Clone, Debug)]
pub struct MigrateArgs {
    /// Revert the most recently applied migration instead of applying pending ones
    #[arg(long)]
    pub revert_last: bool,
}

pub async fn run(migrator: &PostgresMigrator, args: MigrateArgs) -> Result<Value, DomainError> {
    if args.revert_last {
        let reverted = migrator.revert_last().await?;
        info!(version = ?reverted, "Revert finished");

        return Ok(json!({ "reverted": reverted }));
    }

    let applied = migrator.run_pending().await?;
    info!(count = applied.len(), "Migrations applied");

    Ok(json!({
        "applied": applied,
        "current_version": migrator.current_version().await?,
    }))
}
