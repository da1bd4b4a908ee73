//! Persistence layer.
//!
//! Each event's records live in a tab-delimited file `<key>.tsv`, one row
//! per match under a fixed header. The combined export uses the same
//! schema under the key [`COLLECTED_KEY`]. Writes replace the whole file
//! through a temporary sibling and a rename.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::types::{LedgerError, MatchRecord, Prediction, Side};

/// Store key for the filtered cross-event export.
pub const COLLECTED_KEY: &str = "collected";

/// Column order of every table.
pub const HEADER: [&str; 11] = [
    "url",
    "team_a_name",
    "team_a_odds",
    "team_b_name",
    "team_b_odds",
    "recorded_date",
    "pred",
    "winner",
    "bet",
    "winnings",
    "date",
];

/// Timestamp format for `recorded_date` and `date`.
const DATE_FORMAT: &str = "%m/%d/%Y, %H:%M:%S";

/// Keyed store of match records. A missing key reads as empty.
#[cfg_attr(test, mockall::automock)]
pub trait RecordStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Vec<MatchRecord>>;

    /// Replace everything stored under `key`.
    fn save(&self, key: &str, records: &[MatchRecord]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct Row {
    url: String,
    team_a_name: String,
    team_a_odds: Decimal,
    team_b_name: String,
    team_b_odds: Decimal,
    recorded_date: String,
    pred: String,
    winner: String,
    // Derived; written for readers, recomputed on load.
    bet: String,
    winnings: String,
    date: String,
}

impl Row {
    fn from_record(r: &MatchRecord) -> Self {
        Row {
            url: r.url.clone(),
            team_a_name: r.team_a_name.clone(),
            team_a_odds: r.team_a_odds,
            team_b_name: r.team_b_name.clone(),
            team_b_odds: r.team_b_odds,
            recorded_date: format_date(r.recorded_at),
            pred: r.prediction().code().to_string(),
            winner: r.winner().to_string(),
            bet: r.stake().to_string(),
            winnings: r.payout().to_string(),
            date: format_date(r.scheduled_at),
        }
    }

    fn into_record(self) -> Result<MatchRecord, LedgerError> {
        Ok(MatchRecord::restore(
            self.url,
            self.team_a_name,
            self.team_a_odds,
            self.team_b_name,
            self.team_b_odds,
            parse_date(&self.recorded_date)?,
            parse_date(&self.date)?,
            self.pred.parse::<Prediction>()?,
            self.winner.parse::<Side>()?,
        ))
    }
}

fn format_date(at: DateTime<Utc>) -> String {
    at.format(DATE_FORMAT).to_string()
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, LedgerError> {
    NaiveDateTime::parse_from_str(raw.trim(), DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| LedgerError::Storage(format!("bad date {raw:?}: {e}")))
}

// ---------------------------------------------------------------------------
// TSV files
// ---------------------------------------------------------------------------

/// Tab-delimited files in a single directory.
#[derive(Debug, Clone)]
pub struct TsvStore {
    dir: PathBuf,
}

impl TsvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf, LedgerError> {
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(LedgerError::Storage(format!("invalid store key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.tsv")))
    }
}

impl RecordStore for TsvStore {
    fn load(&self, key: &str) -> Result<Vec<MatchRecord>> {
        let path = self.path_for(key)?;

        if !path.exists() {
            info!(path = %path.display(), "No saved records, starting fresh");
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let mut records = Vec::new();
        for (i, row) in reader.deserialize::<Row>().enumerate() {
            // Line 1 is the header.
            let line = i + 2;
            let row = row.with_context(|| format!("Bad row at {}:{line}", path.display()))?;
            let record = row
                .into_record()
                .with_context(|| format!("Bad row at {}:{line}", path.display()))?;
            records.push(record);
        }

        debug!(path = %path.display(), count = records.len(), "Records loaded");
        Ok(records)
    }

    fn save(&self, key: &str, records: &[MatchRecord]) -> Result<()> {
        let path = self.path_for(key)?;
        ensure_dir(&self.dir)?;

        // Written beside the target and renamed over it, so a failed write
        // leaves the previous table in place.
        let tmp = path.with_extension("tsv.tmp");
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_path(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;

        writer.write_record(HEADER)?;
        for record in records {
            writer.serialize(Row::from_record(record))?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        drop(writer);

        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        debug!(path = %path.display(), count = records.len(), "Records saved");
        Ok(())
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.as_os_str().is_empty() && !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create store directory {}", dir.display()))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Store backed by a map, for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<MatchRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, records: Vec<MatchRecord>) {
        self.lock().insert(key.to_string(), records);
    }

    pub fn get(&self, key: &str) -> Option<Vec<MatchRecord>> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<MatchRecord>>> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RecordStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Vec<MatchRecord>> {
        Ok(self.get(key).unwrap_or_default())
    }

    fn save(&self, key: &str, records: &[MatchRecord]) -> Result<()> {
        self.insert(key, records.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
