//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section has defaults, so a config only needs the event ids.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::engine::reconciler::{MembershipPolicy, ReconcileSettings};
use crate::types::{LedgerError, TeamTags};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub store: StoreConfig,
    pub reconcile: ReconcileConfig,
    pub events: EventsConfig,
    /// Display name → short tag, applied when a record is first created.
    pub teams: TeamTags,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScraperConfig {
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.vlr.gg".to_string(),
            timeout_secs: 20,
            user_agent: "oddsledger/0.1.0".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding one `<key>.tsv` per event plus `collected.tsv`.
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from(".") }
    }
}

/// Longest accepted grace period: one year.
pub const MAX_GRACE_PERIOD_HOURS: u64 = 24 * 365;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReconcileConfig {
    /// How long after its start time a match is expected to have a result.
    pub grace_period_hours: u64,
    pub membership: MembershipPolicy,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            grace_period_hours: 24,
            membership: MembershipPolicy::Retain,
        }
    }
}

impl ReconcileConfig {
    pub fn settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            grace_period: chrono::Duration::hours(self.grace_period_hours as i64),
            membership: self.membership,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct EventsConfig {
    /// Event ids in processing order.
    pub ids: Vec<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), LedgerError> {
        if self.events.ids.is_empty() {
            return Err(LedgerError::Config("events.ids is empty".into()));
        }
        if let Some(bad) = self.events.ids.iter().find(|id| id.trim().is_empty()) {
            return Err(LedgerError::Config(format!("blank event id: {bad:?}")));
        }
        if self.reconcile.grace_period_hours > MAX_GRACE_PERIOD_HOURS {
            return Err(LedgerError::Config(format!(
                "reconcile.grace_period_hours must be at most {MAX_GRACE_PERIOD_HOURS}, got {}",
                self.reconcile.grace_period_hours
            )));
        }
        if self.scraper.timeout_secs == 0 {
            return Err(LedgerError::Config("scraper.timeout_secs must be > 0".into()));
        }
        Ok(())
    }
}
