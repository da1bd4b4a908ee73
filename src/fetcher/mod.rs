//! Page fetching.
//!
//! Defines the `PageFetcher` trait, the engine's only view of the event
//! site, and the vlr.gg implementation.

pub mod vlr;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{ConclusionMarkers, OddsSnapshot};

/// Abstraction over the event-listing site.
///
/// Every call is a network round-trip; errors are fetch failures and the
/// caller decides whether they are fatal.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Match page urls for an event, in listing order.
    async fn fetch_match_list(&self, event_id: &str) -> Result<Vec<String>>;

    /// Current odds for a match, or `None` when no odds are published
    /// (or the match concluded without ever showing any).
    async fn fetch_odds(&self, url: &str) -> Result<Option<OddsSnapshot>>;

    /// Winner/loser markers from a concluded match page.
    async fn fetch_conclusion(&self, url: &str) -> Result<ConclusionMarkers>;
}
