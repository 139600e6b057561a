use std::{env, fmt::Display, net::SocketAddr, path::PathBuf, str::FromStr};

use chrono::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::invitations::DEFAULT_INVITE_TTL_HOURS;

pub const DEFAULT_DB_PATH: &str = "travel_tagger.db";
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_SITE_URL: &str = "http://localhost:3000";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub bind: SocketAddr,
    pub site_url: String,
    pub invite_ttl_hours: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; missing keys fall back to defaults,
    /// malformed ones are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let invite_ttl_hours: i64 = load(
            &lookup,
            "TAGGER_INVITE_TTL_HOURS",
            &DEFAULT_INVITE_TTL_HOURS.to_string(),
        )?;
        if invite_ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                key: "TAGGER_INVITE_TTL_HOURS",
                value: invite_ttl_hours.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(Self {
            db_path: load(&lookup, "TAGGER_DB_PATH", DEFAULT_DB_PATH)?,
            bind: load(&lookup, "TAGGER_BIND", DEFAULT_BIND)?,
            site_url: load::<String, _>(&lookup, "TAGGER_SITE_URL", DEFAULT_SITE_URL)?
                .trim_end_matches('/')
                .to_string(),
            invite_ttl_hours,
        })
    }

    pub fn invite_ttl(&self) -> Duration {
        Duration::hours(self.invite_ttl_hours)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            site_url: DEFAULT_SITE_URL.to_string(),
            invite_ttl_hours: DEFAULT_INVITE_TTL_HOURS,
        }
    }
}

fn load<T, F>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }
    })
}
