use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::constants::{
    DEFAULT_CONVERTER_BIN, DEFAULT_HARVEST_HORIZON_DAYS, DEFAULT_LISTEN_ADDR,
    DEFAULT_POLL_INTERVAL_SECONDS, DEFAULT_REQUEST_TIMEOUT_SECONDS, DEFAULT_STORAGE_DIR,
    GFS_FILTER_URL,
};

const MAX_HARVEST_HORIZON_DAYS: u64 = 36_500;

#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: String,
    pub storage_dir: PathBuf,
    pub upstream_url: String,
    pub converter_bin: PathBuf,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub harvest_horizon_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = env_string("WIND_LISTEN_ADDR", DEFAULT_LISTEN_ADDR);
        let storage_dir = PathBuf::from(env_string("WIND_STORAGE_DIR", DEFAULT_STORAGE_DIR));
        let upstream_url = env_string("WIND_UPSTREAM_URL", GFS_FILTER_URL)
            .trim()
            .to_string();
        let converter_bin = PathBuf::from(env_string("WIND_CONVERTER_BIN", DEFAULT_CONVERTER_BIN));
        let request_timeout = Duration::from_secs(env_u64(
            "WIND_REQUEST_TIMEOUT_SECONDS",
            DEFAULT_REQUEST_TIMEOUT_SECONDS,
        )?);
        let poll_interval = Duration::from_secs(env_u64(
            "WIND_POLL_INTERVAL_SECONDS",
            DEFAULT_POLL_INTERVAL_SECONDS,
        )?);
        let harvest_horizon_days =
            env_u64("WIND_HARVEST_HORIZON_DAYS", DEFAULT_HARVEST_HORIZON_DAYS)?;

        if poll_interval.is_zero() {
            bail!("WIND_POLL_INTERVAL_SECONDS must be greater than zero");
        }
        if harvest_horizon_days > MAX_HARVEST_HORIZON_DAYS {
            bail!("WIND_HARVEST_HORIZON_DAYS must be at most {MAX_HARVEST_HORIZON_DAYS}");
        }
        let harvest_horizon_days = i64::try_from(harvest_horizon_days)
            .context("WIND_HARVEST_HORIZON_DAYS is out of range")?;

        Ok(Self {
            listen_addr,
            storage_dir,
            upstream_url,
            converter_bin,
            request_timeout,
            poll_interval,
            harvest_horizon_days,
        })
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u64(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("Failed to parse {}={} as u64", name, value)),
        Err(_) => Ok(default),
    }
}
