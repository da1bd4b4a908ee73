//! Event reconciler — merges an event's live match list with its stored
//! records.
//!
//! Known urls keep their stored record, except that a record still waiting
//! on a result past the grace period gets one resolution attempt. Unknown
//! urls get one odds fetch; matches without odds are never recorded.
//! Per-match problems become warnings and never abort the event.

use anyhow::{Context, Result};
use chrono::Duration;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

use super::resolver::resolve_winner;
use crate::clock::Clock;
use crate::fetcher::PageFetcher;
use crate::types::{LedgerError, MatchRecord, TeamTags};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// What happens to stored records whose url is no longer listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipPolicy {
    /// Keep them, after the listed matches, in their stored order.
    Retain,
    /// Drop them; the live list decides membership.
    LiveOnly,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcileSettings {
    pub grace_period: Duration,
    pub membership: MembershipPolicy,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            grace_period: Duration::days(1),
            membership: MembershipPolicy::Retain,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Odds page could not be fetched or parsed; retried next run.
    OddsFetch,
    /// Odds were malformed (empty name, non-positive odds).
    Invalid,
    /// Result page had zero or two winner markers.
    Ambiguous,
    /// Result page could not be fetched; retried next run.
    ResultFetch,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::OddsFetch => write!(f, "odds fetch failed"),
            WarningKind::Invalid => write!(f, "invalid odds"),
            WarningKind::Ambiguous => write!(f, "ambiguous outcome"),
            WarningKind::ResultFetch => write!(f, "result fetch failed"),
        }
    }
}

/// A match skipped or left unchanged this run, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordWarning {
    pub url: String,
    pub kind: WarningKind,
    pub message: String,
}

impl fmt::Display for RecordWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.url, self.kind, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub records: Vec<MatchRecord>,
    /// Urls recorded for the first time.
    pub added: Vec<String>,
    /// Urls whose winner was set this run.
    pub resolved: Vec<String>,
    /// Urls seen with no published odds.
    pub no_odds: Vec<String>,
    /// Stored urls missing from the live list.
    pub unlisted: Vec<String>,
    pub warnings: Vec<RecordWarning>,
}

impl ReconcileOutcome {
    fn warn(&mut self, url: &str, kind: WarningKind, err: impl fmt::Display) {
        let warning = RecordWarning {
            url: url.to_string(),
            kind,
            message: err.to_string(),
        };
        warn!(url, kind = %kind, reason = %warning.message, "Match skipped");
        self.warnings.push(warning);
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler<'a, F: ?Sized, C: ?Sized> {
    fetcher: &'a F,
    clock: &'a C,
    tags: &'a TeamTags,
    settings: ReconcileSettings,
}

impl<'a, F, C> Reconciler<'a, F, C>
where
    F: PageFetcher + ?Sized,
    C: Clock + ?Sized,
{
    pub fn new(fetcher: &'a F, clock: &'a C, tags: &'a TeamTags, settings: ReconcileSettings) -> Self {
        Self {
            fetcher,
            clock,
            tags,
            settings,
        }
    }

    /// List the event's matches, then reconcile against `existing`.
    ///
    /// A failed listing fails the whole event.
    pub async fn sync_event(&self, event_id: &str, existing: Vec<MatchRecord>) -> Result<ReconcileOutcome> {
        let discovered = self
            .fetcher
            .fetch_match_list(event_id)
            .await
            .with_context(|| format!("Failed to list matches for event {event_id}"))?;

        info!(event_id, listed = discovered.len(), stored = existing.len(), "Match list fetched");
        Ok(self.reconcile(event_id, existing, &discovered).await)
    }

    /// Merge `discovered` urls (in listing order) with `existing` records.
    pub async fn reconcile(
        &self,
        event_id: &str,
        existing: Vec<MatchRecord>,
        discovered: &[String],
    ) -> ReconcileOutcome {
        let now = self.clock.now();
        let mut outcome = ReconcileOutcome::default();

        let stored_order: Vec<String> = existing.iter().map(|r| r.url.clone()).collect();
        let mut stored: HashMap<String, MatchRecord> =
            existing.into_iter().map(|r| (r.url.clone(), r)).collect();
        let mut seen: HashSet<&str> = HashSet::new();

        for url in discovered {
            if !seen.insert(url.as_str()) {
                continue;
            }

            match stored.remove(url) {
                Some(mut record) => {
                    if record.awaiting_result(now, self.settings.grace_period) {
                        self.try_resolve(&mut record, &mut outcome).await;
                    } else {
                        debug!(url = %url, "Already recorded, skipping");
                    }
                    outcome.records.push(record);
                }
                None => {
                    if let Some(record) = self.record_new(url, &mut outcome).await {
                        outcome.added.push(url.clone());
                        outcome.records.push(record);
                    }
                }
            }
        }

        // Whatever is left in `stored` was not listed this time.
        for url in stored_order {
            if let Some(record) = stored.remove(&url) {
                outcome.unlisted.push(url);
                if self.settings.membership == MembershipPolicy::Retain {
                    outcome.records.push(record);
                }
            }
        }

        if !outcome.unlisted.is_empty() {
            info!(
                event_id,
                count = outcome.unlisted.len(),
                policy = ?self.settings.membership,
                "Stored matches no longer listed"
            );
        }

        info!(
            event_id,
            total = outcome.records.len(),
            added = outcome.added.len(),
            resolved = outcome.resolved.len(),
            no_odds = outcome.no_odds.len(),
            warnings = outcome.warnings.len(),
            "Event reconciled"
        );

        outcome
    }

    async fn try_resolve(&self, record: &mut MatchRecord, outcome: &mut ReconcileOutcome) {
        match resolve_winner(&record.url, self.fetcher).await {
            Ok(side) => match record.set_winner(side) {
                Ok(()) => {
                    info!(url = %record.url, winner = %side, payout = %record.payout(), "Winner recorded");
                    outcome.resolved.push(record.url.clone());
                }
                Err(e) => outcome.warn(&record.url, WarningKind::Ambiguous, e),
            },
            Err(e @ LedgerError::AmbiguousOutcome { .. }) => {
                outcome.warn(&record.url, WarningKind::Ambiguous, e)
            }
            Err(e) => outcome.warn(&record.url, WarningKind::ResultFetch, e),
        }
    }

    async fn record_new(&self, url: &str, outcome: &mut ReconcileOutcome) -> Option<MatchRecord> {
        let snapshot = match self.fetcher.fetch_odds(url).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(url, "No odds found or match concluded, skipping");
                outcome.no_odds.push(url.to_string());
                return None;
            }
            Err(e) => {
                outcome.warn(url, WarningKind::OddsFetch, format!("{e:#}"));
                return None;
            }
        };

        match MatchRecord::create(snapshot, self.tags) {
            Ok(record) => {
                debug!(url, record = %record, "Odds recorded");
                Some(record)
            }
            Err(e) => {
                outcome.warn(url, WarningKind::Invalid, e);
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
