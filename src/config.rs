//! Configuration for recap paths and playback settings.
//!
//! Sources (highest priority first):
//! 1. Environment variables (RECAP_HOME, RECAP_INTERVAL_SECS, RECAP_FEED_URL)
//! 2. Config file (~/.recap/config.yaml)
//! 3. Defaults (~/.recap, 15 second interval)

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::scheduler::DEFAULT_INTERVAL;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// Data directory override
    pub home: Option<String>,

    /// Seconds between item displays
    pub interval_secs: Option<u64>,

    /// Default catalog feed URL for `recap fetch`
    pub feed_url: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory holding the database
    pub home: PathBuf,

    /// Path to the playback database
    pub db_path: PathBuf,

    /// Interval between item displays
    pub interval: Duration,

    /// Default catalog feed URL, if configured
    pub feed_url: Option<String>,
}

impl Config {
    /// Resolve configuration from env, config file, and defaults
    pub fn load() -> Result<Self> {
        let default_home = default_home()?;
        let file = read_config_file(&default_home)?;

        let home = std::env::var("RECAP_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| file.home.as_ref().map(PathBuf::from))
            .unwrap_or(default_home);

        let interval_secs = match std::env::var("RECAP_INTERVAL_SECS") {
            Ok(raw) => Some(
                raw.parse::<u64>()
                    .context("RECAP_INTERVAL_SECS must be a positive integer")?,
            ),
            Err(_) => file.interval_secs,
        };
        let interval = interval_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_INTERVAL);

        let feed_url = std::env::var("RECAP_FEED_URL").ok().or(file.feed_url);

        let db_path = home.join("recap.redb");

        Ok(Self {
            home,
            db_path,
            interval,
            feed_url,
        })
    }

    /// Ensure the data directory exists
    pub fn ensure_home(&self) -> Result<()> {
        std::fs::create_dir_all(&self.home)
            .with_context(|| format!("failed to create data directory: {}", self.home.display()))
    }
}

fn default_home() -> Result<PathBuf> {
    let home = dirs::home_dir().context("failed to determine home directory")?;
    Ok(home.join(".recap"))
}

fn read_config_file(home: &Path) -> Result<ConfigFile> {
    let path = home.join("config.yaml");
    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse config file: {}", path.display()))
}
