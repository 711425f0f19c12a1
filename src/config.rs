use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};

use crate::database::idgen;
use crate::ledger::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_address: String,
    pub database_url: String,
    pub provider_secret: Vec<u8>,
    pub pool_size: u32,
    pub lock_timeout: Duration,
    pub retry: RetryPolicy,
    pub currencies: Vec<String>,
    pub disabled_owners: Vec<String>,
    pub instance_id: Option<u16>,
}

impl Settings {
    // reads the process environment, call dotenvy::dotenv() first to pick up .env
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| lookup(key).filter(|v| !v.is_empty()).ok_or_else(|| anyhow!("{key} must be set"));
        let list = |key: &str, default: &str| -> Vec<String> {
            lookup(key)
                .unwrap_or_else(|| default.to_string())
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect()
        };

        Ok(Self {
            bind_address: required("BIND_ADDRESS")?,
            database_url: required("DATABASE_URL")?,
            provider_secret: required("PROVIDER_SECRET")?.into_bytes(),
            pool_size: parse_or(&lookup, "DB_POOL_SIZE", 10)?,
            lock_timeout: Duration::from_millis(parse_or(&lookup, "LOCK_TIMEOUT_MS", 2000)?),
            retry: RetryPolicy {
                attempts: parse_or(&lookup, "LOCK_RETRY_ATTEMPTS", 3)?,
                backoff: Duration::from_millis(parse_or(&lookup, "LOCK_RETRY_BACKOFF_MS", 25)?),
            },
            currencies: list("SUPPORTED_CURRENCIES", "EUR,USD"),
            disabled_owners: list("DISABLED_OWNERS", ""),
            instance_id: match lookup("SNOWFLAKE_INSTANCE_ID") {
                Some(value) if !value.trim().is_empty() => {
                    let id: u16 = value.trim().parse().context("SNOWFLAKE_INSTANCE_ID must be a number")?;
                    if id > idgen::MAX_INSTANCE_ID {
                        return Err(anyhow!("SNOWFLAKE_INSTANCE_ID must be at most {}", idgen::MAX_INSTANCE_ID));
                    }
                    Some(id)
                }
                _ => None,
            },
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value `{value}`")),
        _ => Ok(default),
    }
}
