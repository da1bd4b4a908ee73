//! Shared types for the odds ledger.
//!
//! The match record and its enumerations form the data model used by the
//! fetcher, storage, and engine modules. Derived values (stake, payout)
//! are private to `MatchRecord` and only ever produced by `recompute`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Stake tiers
// ---------------------------------------------------------------------------

/// Fixed stake for a normal (non-guaranteed) prediction.
pub const NORMAL_STAKE: Decimal = dec!(100);

/// Fixed stake for a prediction placed under the guaranteed tier.
pub const GUARANTEE_STAKE: Decimal = dec!(500);

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// One of the two competing teams, or an unresolved state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
    Unknown,
}

impl Side {
    /// The other team. `Unknown` stays `Unknown`.
    pub fn opposite(&self) -> Self {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
            Side::Unknown => Side::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Side::Unknown)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => write!(f, "A"),
            Side::B => write!(f, "B"),
            Side::Unknown => write!(f, "Unknown"),
        }
    }
}

impl FromStr for Side {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" => Ok(Side::A),
            "B" => Ok(Side::B),
            "Unknown" | "" => Ok(Side::Unknown),
            other => Err(LedgerError::Storage(format!("Unknown winner code: {other}"))),
        }
    }
}

/// A stance taken on a match before its outcome is known.
///
/// Stored as the short codes `A|B|AG|BG|Split|Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prediction {
    A,
    B,
    AGuaranteed,
    BGuaranteed,
    Split,
    Unknown,
}

impl Prediction {
    pub const ALL: &'static [Prediction] = &[
        Prediction::A,
        Prediction::B,
        Prediction::AGuaranteed,
        Prediction::BGuaranteed,
        Prediction::Split,
        Prediction::Unknown,
    ];

    pub fn is_guaranteed(&self) -> bool {
        matches!(self, Prediction::AGuaranteed | Prediction::BGuaranteed)
    }

    /// Whether this prediction backs the given side.
    pub fn matches_side(&self, side: Side) -> bool {
        match (self, side) {
            (Prediction::A | Prediction::AGuaranteed, Side::A) => true,
            (Prediction::B | Prediction::BGuaranteed, Side::B) => true,
            _ => false,
        }
    }

    /// A concrete stance on one team (not split, not unknown).
    pub fn is_concrete(&self) -> bool {
        !matches!(self, Prediction::Split | Prediction::Unknown)
    }

    /// Stake for this prediction's tier.
    pub fn stake(&self) -> Decimal {
        if !self.is_concrete() {
            Decimal::ZERO
        } else if self.is_guaranteed() {
            GUARANTEE_STAKE
        } else {
            NORMAL_STAKE
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Prediction::A => "A",
            Prediction::B => "B",
            Prediction::AGuaranteed => "AG",
            Prediction::BGuaranteed => "BG",
            Prediction::Split => "Split",
            Prediction::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Prediction {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" => Ok(Prediction::A),
            "B" => Ok(Prediction::B),
            "AG" => Ok(Prediction::AGuaranteed),
            "BG" => Ok(Prediction::BGuaranteed),
            "Split" => Ok(Prediction::Split),
            "Unknown" | "" => Ok(Prediction::Unknown),
            other => Err(LedgerError::Storage(format!("Unknown prediction code: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Fetch results
// ---------------------------------------------------------------------------

/// Result marker shown next to a team's score on a concluded match page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Winner,
    Loser,
}

/// Winner/loser markers found on a match page, in header order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConclusionMarkers {
    pub team_a: Option<Marker>,
    pub team_b: Option<Marker>,
}

/// Odds as observed on a match page, before canonicalization.
#[derive(Debug, Clone, PartialEq)]
pub struct OddsSnapshot {
    pub url: String,
    pub team_a_name: String,
    pub team_a_odds: Decimal,
    pub team_b_name: String,
    pub team_b_odds: Decimal,
    pub recorded_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Team name canonicalization
// ---------------------------------------------------------------------------

/// Display name → short tag lookup, e.g. "Paper Rex" → "PRX".
///
/// Names missing from the table pass through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct TeamTags(HashMap<String, String>);

impl TeamTags {
    pub fn new(tags: HashMap<String, String>) -> Self {
        Self(tags)
    }

    pub fn canonical(&self, name: &str) -> String {
        let name = name.trim();
        self.0
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[(&str, &str); N]> for TeamTags {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// MatchRecord
// ---------------------------------------------------------------------------

/// A single match's odds and bookkeeping, keyed by its page url.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub url: String,
    pub team_a_name: String,
    pub team_a_odds: Decimal,
    pub team_b_name: String,
    pub team_b_odds: Decimal,
    /// When the odds were captured.
    pub recorded_at: DateTime<Utc>,
    /// Match start time (UTC).
    pub scheduled_at: DateTime<Utc>,
    prediction: Prediction,
    winner: Side,
    stake: Decimal,
    payout: Decimal,
}

impl fmt::Display for MatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.2}) vs {} ({:.2}) | pred={} winner={} | bet={} won={} [{}]",
            self.team_a_name,
            self.team_a_odds,
            self.team_b_name,
            self.team_b_odds,
            self.prediction,
            self.winner,
            self.stake,
            self.payout,
            self.url,
        )
    }
}

impl MatchRecord {
    /// Build a fresh record from observed odds.
    ///
    /// Prediction and winner start `Unknown`; team names go through `tags`
    /// exactly once here.
    pub fn create(snapshot: OddsSnapshot, tags: &TeamTags) -> Result<Self, LedgerError> {
        let OddsSnapshot {
            url,
            team_a_name,
            team_a_odds,
            team_b_name,
            team_b_odds,
            recorded_at,
            scheduled_at,
        } = snapshot;

        if team_a_name.trim().is_empty() || team_b_name.trim().is_empty() {
            return Err(LedgerError::Validation(format!("empty team name for {url}")));
        }
        if team_a_odds <= Decimal::ZERO || team_b_odds <= Decimal::ZERO {
            return Err(LedgerError::Validation(format!(
                "non-positive odds {team_a_odds}/{team_b_odds} for {url}"
            )));
        }

        Ok(Self::restore(
            url,
            tags.canonical(&team_a_name),
            team_a_odds,
            tags.canonical(&team_b_name),
            team_b_odds,
            recorded_at,
            scheduled_at,
            Prediction::Unknown,
            Side::Unknown,
        ))
    }

    /// Rebuild a record from persisted fields. Names are taken verbatim;
    /// stake and payout are recomputed.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        url: String,
        team_a_name: String,
        team_a_odds: Decimal,
        team_b_name: String,
        team_b_odds: Decimal,
        recorded_at: DateTime<Utc>,
        scheduled_at: DateTime<Utc>,
        prediction: Prediction,
        winner: Side,
    ) -> Self {
        let mut record = Self {
            url,
            team_a_name,
            team_a_odds,
            team_b_name,
            team_b_odds,
            recorded_at,
            scheduled_at,
            prediction,
            winner,
            stake: Decimal::ZERO,
            payout: Decimal::ZERO,
        };
        record.recompute();
        record
    }

    pub fn prediction(&self) -> Prediction {
        self.prediction
    }

    pub fn winner(&self) -> Side {
        self.winner
    }

    pub fn stake(&self) -> Decimal {
        self.stake
    }

    pub fn payout(&self) -> Decimal {
        self.payout
    }

    /// Decimal odds for a side. Zero for `Unknown`.
    pub fn odds_of(&self, side: Side) -> Decimal {
        match side {
            Side::A => self.team_a_odds,
            Side::B => self.team_b_odds,
            Side::Unknown => Decimal::ZERO,
        }
    }

    /// Record the concluded match's winner. `Unknown` is rejected.
    pub fn set_winner(&mut self, side: Side) -> Result<(), LedgerError> {
        if !side.is_known() {
            return Err(LedgerError::Validation(format!(
                "winner for {} must be A or B",
                self.url
            )));
        }
        self.winner = side;
        self.recompute();
        Ok(())
    }

    pub fn set_prediction(&mut self, prediction: Prediction) {
        self.prediction = prediction;
        self.recompute();
    }

    /// Re-derive stake and payout from prediction and winner. Idempotent.
    pub fn recompute(&mut self) {
        self.stake = self.prediction.stake();
        self.payout = if self.winner.is_known() && self.prediction.matches_side(self.winner) {
            self.stake * self.odds_of(self.winner)
        } else {
            Decimal::ZERO
        };
    }

    /// Concrete prediction and concrete winner: eligible for the combined export.
    pub fn is_settled(&self) -> bool {
        self.prediction.is_concrete() && self.winner.is_known()
    }

    /// Winner still unknown and the match started more than `grace` ago.
    /// A due time past the calendar's range never arrives.
    pub fn awaiting_result(&self, now: DateTime<Utc>, grace: chrono::Duration) -> bool {
        !self.winner.is_known()
            && self
                .scheduled_at
                .checked_add_signed(grace)
                .is_some_and(|due| due < now)
    }

    /// Helper to build a test record with fixed timestamps.
    #[cfg(test)]
    pub fn sample(url: &str, team_a_odds: Decimal, team_b_odds: Decimal) -> Self {
        use chrono::TimeZone;
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 17, 0, 0).unwrap();
        Self::restore(
            url.to_string(),
            "PRX".to_string(),
            team_a_odds,
            "DRX".to_string(),
            team_b_odds,
            at - chrono::Duration::hours(6),
            at,
            Prediction::Unknown,
            Side::Unknown,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the ledger.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Ambiguous outcome for {url}: {reason}")]
    AmbiguousOutcome { url: String, reason: String },

    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
