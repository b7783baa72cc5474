use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::session::DEFAULT_SESSION_TTL;

pub const DATABASE_FILE: &str = "party-finder.db";

#[derive(Clone)]
pub struct Config {
    pub webhook_secret: String,
    pub port: u16,
    /// Directory holding the SQLite database.
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    /// How long an untouched draft survives.
    pub session_ttl: Duration,
    pub session_sweep_interval: Duration,
    /// Chat relay for outbound messages. Without it deliveries are only logged.
    pub relay_url: Option<String>,
    pub relay_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        let webhook_secret = get("PARTY_WEBHOOK_SECRET")
            .context("PARTY_WEBHOOK_SECRET environment variable is required")?;

        let port = get("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .trim()
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = get("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let session_ttl = match get("SESSION_TTL_SECS") {
            Some(value) => {
                let secs = value
                    .trim()
                    .parse::<u64>()
                    .context("SESSION_TTL_SECS must be a whole number of seconds")?;
                if secs == 0 {
                    anyhow::bail!("SESSION_TTL_SECS must be greater than zero");
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_SESSION_TTL,
        };

        let sweep_secs = get("SESSION_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|| "60".to_string())
            .trim()
            .parse::<u64>()
            .context("SESSION_SWEEP_INTERVAL_SECS must be a whole number of seconds")?;
        if sweep_secs == 0 {
            anyhow::bail!("SESSION_SWEEP_INTERVAL_SECS must be greater than zero");
        }

        Ok(Config {
            webhook_secret,
            port,
            state_dir,
            session_ttl,
            session_sweep_interval: Duration::from_secs(sweep_secs),
            relay_url: get("NOTIFY_RELAY_URL"),
            relay_token: get("NOTIFY_RELAY_TOKEN"),
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.state_dir.join(DATABASE_FILE)
    }
}
