//! Process configuration, read from the environment (and `.env` when present).

use std::net::SocketAddr;

use anyhow::{anyhow, Context};
use chrono::{FixedOffset, Offset, Utc};
use tracing_subscriber::{fmt, EnvFilter};

use crate::aggregate::GenderPolicy;
use crate::intake::IntakeConfig;

/// Asia/Tehran, which has had no daylight saving since 2022.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 210;

pub fn default_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_UTC_OFFSET_MINUTES * 60).unwrap_or_else(|| Utc.fix())
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl LoggingConfig {
    /// `RUST_LOG` takes precedence over the configured level.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format.as_str() {
            "json" => fmt().json().with_env_filter(filter).init(),
            _ => fmt().with_env_filter(filter).init(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub user_service_addr: SocketAddr,
    pub report_service_addr: SocketAddr,
    pub utc_offset: FixedOffset,
    pub gender: GenderPolicy,
    pub max_field_length: usize,
    pub cors_allowed_origins: Vec<String>,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url = value("DATABASE_URL")
            .context("DATABASE_URL must be set to a Postgres connection string")?;

        let offset_minutes: i32 = parse_or(
            value("LOCAL_UTC_OFFSET_MINUTES"),
            "LOCAL_UTC_OFFSET_MINUTES",
            DEFAULT_UTC_OFFSET_MINUTES,
        )?;
        let utc_offset = FixedOffset::east_opt(offset_minutes * 60)
            .ok_or_else(|| anyhow!("LOCAL_UTC_OFFSET_MINUTES {offset_minutes} is out of range"))?;

        let defaults = GenderPolicy::default();
        let gender = GenderPolicy {
            male_token: value("GENDER_MALE_TOKEN").unwrap_or(defaults.male_token),
            female_token: value("GENDER_FEMALE_TOKEN").unwrap_or(defaults.female_token),
        };

        let cors_allowed_origins = value("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let logging = LoggingConfig::default();

        Ok(Self {
            database_url,
            max_connections: parse_or(
                value("DATABASE_MAX_CONNECTIONS"),
                "DATABASE_MAX_CONNECTIONS",
                5,
            )?,
            user_service_addr: parse_or(
                value("USER_SERVICE_ADDR"),
                "USER_SERVICE_ADDR",
                SocketAddr::from(([0, 0, 0, 0], 8081)),
            )?,
            report_service_addr: parse_or(
                value("REPORT_SERVICE_ADDR"),
                "REPORT_SERVICE_ADDR",
                SocketAddr::from(([0, 0, 0, 0], 8082)),
            )?,
            utc_offset,
            gender,
            max_field_length: parse_or(value("MAX_FIELD_LENGTH"), "MAX_FIELD_LENGTH", 100)?,
            cors_allowed_origins,
            logging: LoggingConfig {
                level: value("LOG_LEVEL").unwrap_or(logging.level),
                format: value("LOG_FORMAT").unwrap_or(logging.format),
            },
        })
    }

    pub fn intake(&self) -> IntakeConfig {
        IntakeConfig {
            max_field_length: self.max_field_length,
            offset: self.utc_offset,
        }
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err| anyhow!("{key} has invalid value {raw:?}: {err}")),
        None => Ok(default),
    }
}
