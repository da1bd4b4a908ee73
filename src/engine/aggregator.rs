//! Aggregator — runs every configured event in order and writes the
//! combined export of settled predictions.

use anyhow::{Context, Result};
use tracing::{error, info};

use super::reconciler::{ReconcileOutcome, ReconcileSettings, Reconciler, RecordWarning};
use crate::clock::Clock;
use crate::fetcher::PageFetcher;
use crate::storage::{RecordStore, COLLECTED_KEY};
use crate::types::{MatchRecord, TeamTags};

/// Per-event result of an aggregation run.
#[derive(Debug, Clone)]
pub struct EventReport {
    pub event_id: String,
    pub total: usize,
    pub added: usize,
    pub resolved: usize,
    pub warnings: Vec<RecordWarning>,
    /// Set when the event was aborted; its stored table was left as is.
    pub error: Option<String>,
}

impl EventReport {
    fn succeeded(event_id: &str, outcome: &ReconcileOutcome) -> Self {
        Self {
            event_id: event_id.to_string(),
            total: outcome.records.len(),
            added: outcome.added.len(),
            resolved: outcome.resolved.len(),
            warnings: outcome.warnings.clone(),
            error: None,
        }
    }

    fn failed(event_id: &str, total: usize, err: &anyhow::Error) -> Self {
        Self {
            event_id: event_id.to_string(),
            total,
            added: 0,
            resolved: 0,
            warnings: Vec::new(),
            error: Some(format!("{err:#}")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AggregateReport {
    pub events: Vec<EventReport>,
    /// The records written under the collected key.
    pub collected: Vec<MatchRecord>,
}

impl AggregateReport {
    pub fn failed_events(&self) -> impl Iterator<Item = &EventReport> {
        self.events.iter().filter(|e| e.error.is_some())
    }

    pub fn warning_count(&self) -> usize {
        self.events.iter().map(|e| e.warnings.len()).sum()
    }
}

/// Keep only records with a concrete prediction and a known winner.
pub fn collect_settled(records: &[MatchRecord]) -> Vec<MatchRecord> {
    records.iter().filter(|r| r.is_settled()).cloned().collect()
}

pub struct Aggregator<'a, F: ?Sized, S: ?Sized, C: ?Sized> {
    fetcher: &'a F,
    store: &'a S,
    clock: &'a C,
    tags: &'a TeamTags,
    settings: ReconcileSettings,
}

impl<'a, F, S, C> Aggregator<'a, F, S, C>
where
    F: PageFetcher + ?Sized,
    S: RecordStore + ?Sized,
    C: Clock + ?Sized,
{
    pub fn new(
        fetcher: &'a F,
        store: &'a S,
        clock: &'a C,
        tags: &'a TeamTags,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            fetcher,
            store,
            clock,
            tags,
            settings,
        }
    }

    /// Reconcile and persist each event in order, then write the export.
    ///
    /// A failed event keeps its stored table and contributes those stored
    /// records to the export; only a failed export write is an error.
    pub async fn aggregate(&self, event_ids: &[String]) -> Result<AggregateReport> {
        let reconciler = Reconciler::new(self.fetcher, self.clock, self.tags, self.settings);
        let mut report = AggregateReport::default();
        let mut combined: Vec<MatchRecord> = Vec::new();

        for event_id in event_ids {
            let existing = match self.store.load(event_id) {
                Ok(records) => records,
                Err(e) => {
                    error!(event_id = %event_id, error = %format!("{e:#}"), "Failed to load event records, skipping event");
                    report.events.push(EventReport::failed(event_id, 0, &e));
                    continue;
                }
            };

            match self.run_event(&reconciler, event_id, existing.clone()).await {
                Ok(outcome) => {
                    report.events.push(EventReport::succeeded(event_id, &outcome));
                    combined.extend(outcome.records);
                }
                Err(e) => {
                    error!(event_id = %event_id, error = %format!("{e:#}"), "Event aborted, stored records kept");
                    report.events.push(EventReport::failed(event_id, existing.len(), &e));
                    combined.extend(existing);
                }
            }
        }

        report.collected = collect_settled(&combined);
        self.store
            .save(COLLECTED_KEY, &report.collected)
            .context("Failed to write collected export")?;

        info!(
            events = report.events.len(),
            failed = report.failed_events().count(),
            warnings = report.warning_count(),
            combined = combined.len(),
            collected = report.collected.len(),
            "Aggregation complete"
        );

        Ok(report)
    }

    async fn run_event(
        &self,
        reconciler: &Reconciler<'a, F, C>,
        event_id: &str,
        existing: Vec<MatchRecord>,
    ) -> Result<ReconcileOutcome> {
        let outcome = reconciler.sync_event(event_id, existing).await?;
        self.store
            .save(event_id, &outcome.records)
            .with_context(|| format!("Failed to save records for event {event_id}"))?;
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
