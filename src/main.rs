//! oddsledger — esports match odds and prediction ledger.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! reconciles every configured event against its stored table, and
//! writes the collected export. One pass per invocation.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

use oddsledger::clock::{Clock, SystemClock};
use oddsledger::config::AppConfig;
use oddsledger::engine::aggregator::{AggregateReport, Aggregator};
use oddsledger::fetcher::vlr::VlrClient;
use oddsledger::storage::TsvStore;

const DEFAULT_CONFIG: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ODDSLEDGER_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let cfg = AppConfig::load(&config_path)?;

    info!(
        config = %config_path,
        events = ?cfg.events.ids,
        store = %cfg.store.dir.display(),
        team_tags = cfg.teams.len(),
        membership = ?cfg.reconcile.membership,
        "oddsledger starting"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let fetcher = VlrClient::new(&cfg.scraper, clock.clone())?;
    let store = TsvStore::new(&cfg.store.dir);

    let aggregator = Aggregator::new(
        &fetcher,
        &store,
        clock.as_ref(),
        &cfg.teams,
        cfg.reconcile.settings(),
    );

    let report = aggregator.aggregate(&cfg.events.ids).await?;
    log_report(&report);

    Ok(())
}

/// Log a human-readable run summary.
fn log_report(report: &AggregateReport) {
    for event in &report.events {
        match &event.error {
            Some(err) => error!(event_id = %event.event_id, error = %err, "Event failed"),
            None => info!(
                event_id = %event.event_id,
                total = event.total,
                added = event.added,
                resolved = event.resolved,
                warnings = event.warnings.len(),
                "Event done"
            ),
        }
        for w in &event.warnings {
            warn!(event_id = %event.event_id, "{w}");
        }
    }

    let staked: rust_decimal::Decimal = report.collected.iter().map(|r| r.stake()).sum();
    let won: rust_decimal::Decimal = report.collected.iter().map(|r| r.payout()).sum();
    info!(
        collected = report.collected.len(),
        staked = %staked,
        won = %won,
        net = %(won - staked),
        "Run complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("oddsledger=info"));

    let json_logging = std::env::var("ODDSLEDGER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
