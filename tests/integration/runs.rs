use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;

use oddsledger::clock::FixedClock;
use oddsledger::engine::aggregator::Aggregator;
use oddsledger::engine::reconciler::{MembershipPolicy, ReconcileSettings, WarningKind};
use oddsledger::storage::{RecordStore, TsvStore, COLLECTED_KEY};
use oddsledger::types::{Marker, MatchRecord, Prediction, Side, TeamTags};

use crate::mock_fetcher::{kickoff, match_url, MockFetcher};

const EVENT: &str = "2500";

/// Fresh store directory, removed when the guard drops.
struct ScratchDir(PathBuf);

impl ScratchDir {
    fn new() -> Self {
        let mut p = std::env::temp_dir();
        p.push(format!("oddsledger_it_{}", uuid::Uuid::new_v4()));
        Self(p)
    }

    fn store(&self) -> TsvStore {
        TsvStore::new(self.0.clone())
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn tags() -> TeamTags {
    TeamTags::from([("Paper Rex", "PRX"), ("Gen.G", "GEN")])
}

fn urls(records: &[MatchRecord]) -> Vec<String> {
    records.iter().map(|r| r.url.clone()).collect()
}

/// Stand-in for someone editing the `pred` column between runs.
fn predict(store: &TsvStore, key: &str, picks: &[(u32, Prediction)]) {
    let mut records = store.load(key).unwrap();
    for (n, pred) in picks {
        let url = match_url(*n);
        let r = records.iter_mut().find(|r| r.url == url).unwrap();
        r.set_prediction(*pred);
    }
    store.save(key, &records).unwrap();
}

async fn run(fetcher: &MockFetcher, store: &TsvStore, clock: &FixedClock, events: &[&str]) -> oddsledger::engine::aggregator::AggregateReport {
    let tags = tags();
    let ids: Vec<String> = events.iter().map(|s| s.to_string()).collect();
    Aggregator::new(fetcher, store, clock, &tags, ReconcileSettings::default())
        .aggregate(&ids)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_incremental_runs_track_predictions_to_payouts() {
    let dir = ScratchDir::new();
    let store = dir.store();
    let fetcher = MockFetcher::new();
    fetcher.list(EVENT, &[match_url(1), match_url(2), match_url(3)]);
    fetcher.publish_odds(&match_url(1), "Paper Rex", dec!(1.50), "DRX", dec!(2.60));
    fetcher.publish_odds(&match_url(2), "Gen.G", dec!(1.20), "T1", dec!(4.10));
    // Match 3 never shows odds.

    // Run 1: before any match starts.
    let before = FixedClock(kickoff() - Duration::hours(6));
    let report = run(&fetcher, &store, &before, &[EVENT]).await;

    let stored = store.load(EVENT).unwrap();
    assert_eq!(urls(&stored), vec![match_url(1), match_url(2)]);
    assert_eq!(stored[0].team_a_name, "PRX");
    assert_eq!(stored[1].team_a_name, "GEN");
    assert!(stored.iter().all(|r| r.winner() == Side::Unknown && r.stake() == Decimal::ZERO));
    assert!(report.collected.is_empty());
    assert!(store.load(COLLECTED_KEY).unwrap().is_empty());

    predict(&store, EVENT, &[(1, Prediction::A), (2, Prediction::AGuaranteed)]);

    // Run 2: two days later, a new match is listed, match 1 has a result,
    // match 2's page shows no winner yet.
    fetcher.list(EVENT, &[match_url(1), match_url(2), match_url(3), match_url(4)]);
    fetcher.publish_odds(&match_url(4), "Sentinels", dec!(1.85), "LOUD", dec!(1.95));
    fetcher.conclude(&match_url(1), Some(Marker::Winner), Some(Marker::Loser));
    fetcher.clear_requests();

    let after = FixedClock(kickoff() + Duration::days(2));
    let report = run(&fetcher, &store, &after, &[EVENT]).await;

    // Only unseen urls are asked for odds.
    assert_eq!(fetcher.odds_requests(), vec![match_url(3), match_url(4)]);

    let stored = store.load(EVENT).unwrap();
    assert_eq!(urls(&stored), vec![match_url(1), match_url(2), match_url(4)]);
    assert_eq!(stored[0].winner(), Side::A);
    assert_eq!(stored[0].payout(), dec!(150));
    assert_eq!(stored[1].winner(), Side::Unknown);
    assert_eq!(stored[1].stake(), dec!(500));

    let event = &report.events[0];
    assert_eq!(event.added, 1);
    assert_eq!(event.resolved, 1);
    assert_eq!(event.warnings.len(), 1);
    assert_eq!(event.warnings[0].url, match_url(2));
    assert_eq!(event.warnings[0].kind, WarningKind::Ambiguous);

    assert_eq!(urls(&report.collected), vec![match_url(1)]);
    assert_eq!(store.load(COLLECTED_KEY).unwrap(), report.collected);

    // Run 3: matches 2 and 4 now have results.
    fetcher.conclude(&match_url(2), Some(Marker::Winner), Some(Marker::Loser));
    fetcher.conclude(&match_url(4), Some(Marker::Loser), Some(Marker::Winner));
    let report = run(&fetcher, &store, &after, &[EVENT]).await;

    assert_eq!(urls(&report.collected), vec![match_url(1), match_url(2)]);
    assert_eq!(report.collected[1].payout(), dec!(600));
    assert!(report.events[0].warnings.is_empty());
    assert_eq!(store.load(EVENT).unwrap()[2].winner(), Side::B);
}

#[tokio::test]
async fn test_repeat_run_is_noop() {
    let dir = ScratchDir::new();
    let store = dir.store();
    let fetcher = MockFetcher::new();
    fetcher.list(EVENT, &[match_url(1), match_url(2)]);
    fetcher.publish_odds(&match_url(1), "Paper Rex", dec!(1.50), "DRX", dec!(2.60));
    fetcher.publish_odds(&match_url(2), "Gen.G", dec!(1.20), "T1", dec!(4.10));

    let clock = FixedClock(kickoff() - Duration::hours(1));
    run(&fetcher, &store, &clock, &[EVENT]).await;
    let first = store.load(EVENT).unwrap();

    fetcher.clear_requests();
    run(&fetcher, &store, &clock, &[EVENT]).await;

    assert_eq!(store.load(EVENT).unwrap(), first);
    assert!(fetcher.odds_requests().is_empty());
}

#[tokio::test]
async fn test_failed_odds_fetch_retried_next_run() {
    let dir = ScratchDir::new();
    let store = dir.store();
    let fetcher = MockFetcher::new();
    fetcher.list(EVENT, &[match_url(1), match_url(2)]);
    fetcher.publish_odds(&match_url(1), "Paper Rex", dec!(1.50), "DRX", dec!(2.60));
    fetcher.publish_odds(&match_url(2), "Gen.G", dec!(1.20), "T1", dec!(4.10));
    fetcher.fail(&match_url(1));

    let clock = FixedClock(kickoff() - Duration::hours(1));
    let report = run(&fetcher, &store, &clock, &[EVENT]).await;
    assert_eq!(urls(&store.load(EVENT).unwrap()), vec![match_url(2)]);
    assert_eq!(report.events[0].warnings[0].kind, WarningKind::OddsFetch);

    fetcher.recover(&match_url(1));
    run(&fetcher, &store, &clock, &[EVENT]).await;
    assert_eq!(urls(&store.load(EVENT).unwrap()), vec![match_url(1), match_url(2)]);
}

#[tokio::test]
async fn test_failed_event_leaves_other_events_and_table_intact() {
    let dir = ScratchDir::new();
    let store = dir.store();
    let fetcher = MockFetcher::new();
    fetcher.list("2500", &[match_url(1)]);
    fetcher.list("2501", &[match_url(2)]);
    fetcher.publish_odds(&match_url(1), "Paper Rex", dec!(1.50), "DRX", dec!(2.60));
    fetcher.publish_odds(&match_url(2), "Sentinels", dec!(1.85), "LOUD", dec!(1.95));

    let clock = FixedClock(kickoff() - Duration::hours(1));
    run(&fetcher, &store, &clock, &["2500", "2501"]).await;
    predict(&store, "2500", &[(1, Prediction::B)]);
    fetcher.conclude(&match_url(1), Some(Marker::Loser), Some(Marker::Winner));

    fetcher.fail("2501");
    let after = FixedClock(kickoff() + Duration::days(2));
    let report = run(&fetcher, &store, &after, &["2500", "2501"]).await;

    assert!(report.events[0].error.is_none());
    assert!(report.events[1].error.is_some());
    assert_eq!(store.load("2501").unwrap().len(), 1);
    assert_eq!(urls(&report.collected), vec![match_url(1)]);
    assert_eq!(report.collected[0].payout(), dec!(260));
}

#[tokio::test]
async fn test_live_only_membership_drops_unlisted() {
    let dir = ScratchDir::new();
    let store = dir.store();
    let fetcher = MockFetcher::new();
    fetcher.list(EVENT, &[match_url(1), match_url(2)]);
    fetcher.publish_odds(&match_url(1), "Paper Rex", dec!(1.50), "DRX", dec!(2.60));
    fetcher.publish_odds(&match_url(2), "Gen.G", dec!(1.20), "T1", dec!(4.10));

    let clock = FixedClock(kickoff() - Duration::hours(1));
    run(&fetcher, &store, &clock, &[EVENT]).await;

    fetcher.list(EVENT, &[match_url(2)]);
    let tags = tags();
    let settings = ReconcileSettings {
        membership: MembershipPolicy::LiveOnly,
        ..ReconcileSettings::default()
    };
    Aggregator::new(&fetcher, &store, &clock, &tags, settings)
        .aggregate(&[EVENT.to_string()])
        .await
        .unwrap();

    assert_eq!(urls(&store.load(EVENT).unwrap()), vec![match_url(2)]);

    // Default policy keeps what the page no longer lists.
    fetcher.list(EVENT, &[]);
    run(&fetcher, &store, &clock, &[EVENT]).await;
    assert_eq!(urls(&store.load(EVENT).unwrap()), vec![match_url(2)]);
}

#[tokio::test]
async fn test_stored_names_are_not_canonicalized_again() {
    let dir = ScratchDir::new();
    let store = dir.store();
    let stored = MatchRecord::restore(
        match_url(1),
        "Paper Rex".to_string(),
        dec!(1.50),
        "Gen.G".to_string(),
        dec!(2.60),
        kickoff() - Duration::hours(6),
        kickoff(),
        Prediction::A,
        Side::Unknown,
    );
    store.save(EVENT, &[stored]).unwrap();

    let fetcher = MockFetcher::new();
    fetcher.list(EVENT, &[match_url(1)]);
    fetcher.conclude(&match_url(1), Some(Marker::Winner), Some(Marker::Loser));

    let after = FixedClock(kickoff() + Duration::days(2));
    let report = run(&fetcher, &store, &after, &[EVENT]).await;

    // Resolution rewrote the row, but the names stay as they were stored.
    let loaded = store.load(EVENT).unwrap();
    assert_eq!(loaded[0].winner(), Side::A);
    assert_eq!(loaded[0].team_a_name, "Paper Rex");
    assert_eq!(loaded[0].team_b_name, "Gen.G");
    assert_eq!(report.collected[0].team_a_name, "Paper Rex");
    assert!(fetcher.odds_requests().is_empty());
}
