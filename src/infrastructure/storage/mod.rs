//! Storage infrastructure - PostgreSQL pool and schema

pub mod migrations;
mod postgres;

pub use migrations::{Migration, PostgresMigrator};
pub use postgres::{connect, PostgresConfig};
