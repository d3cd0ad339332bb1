use chrono::FixedOffset;
use serde::Deserialize;

use crate::domain::clock::{host_offset, offset_from_minutes};
use crate::domain::DomainError;
use crate::infrastructure::storage::PostgresConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub database: PostgresConfig,
    pub users: UsersConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Settings for the user lifecycle service
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UsersConfig {
    /// Minutes east of UTC used as local time for date filters and statistics.
    /// The host offset is used when unset.
    pub utc_offset_minutes: Option<i32>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl UsersConfig {
    pub fn utc_offset(&self) -> Result<FixedOffset, DomainError> {
        match self.utc_offset_minutes {
            None => Ok(host_offset()),
            Some(minutes) => offset_from_minutes(minutes).ok_or_else(|| {
                DomainError::configuration(format!(
                    "users.utc_offset_minutes {} is out of range",
                    minutes
                ))
            }),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Ok(url) = std::env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", url)?;
        }

        builder.build()?.try_deserialize()
    }
}
