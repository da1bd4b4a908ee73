//! vlr.gg page fetcher.
//!
//! Scrapes the public event match list and individual match pages.
//!
//! Event list: `{base}/event/matches/{event_id}/`, one `a.match-item` per match.
//! Match page: odds in `a.match-bet-item`, start time in the header's
//! `data-utc-ts`, result in the `match-header-vs-score-{winner,loser}` spans.
//! No auth. Pages are plain server-rendered HTML.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::PageFetcher;
use crate::clock::Clock;
use crate::config::ScraperConfig;
use crate::types::{ConclusionMarkers, Marker, OddsSnapshot};

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

const MATCH_ITEM: &str = "a.match-item";
const PENDING: &str = "div.mod-pending";
const BET_ITEM: &str = "a.match-bet-item";
const BET_TEAM: &str = "span.match-bet-item-team";
const BET_ODDS: &str = "span.match-bet-item-odds";
const SCHEDULED: &str = ".match-header-date [data-utc-ts]";
const SCORE_BLOCK: &str = ".match-header-vs-score .js-spoiler";
const SCORE_SPAN: &str = "span:not(.match-header-vs-score-colon)";
const WINNER_CLASS: &str = "match-header-vs-score-winner";
const LOSER_CLASS: &str = "match-header-vs-score-loser";

/// Format of the `data-utc-ts` attribute.
const UTC_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {css}: {e}"))
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Absolute match urls from an event's match list page, in page order.
pub fn parse_match_list(html: &str, base_url: &str) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let base = base_url.trim_end_matches('/');

    let urls = document
        .select(&selector(MATCH_ITEM)?)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| format!("{base}/{}", href.trim_start_matches('/')))
        .collect();

    Ok(urls)
}

/// Odds from a match page. `Ok(None)` when no odds are shown or the
/// match is pending settlement.
pub fn parse_odds(html: &str, url: &str, recorded_at: DateTime<Utc>) -> Result<Option<OddsSnapshot>> {
    let document = Html::parse_document(html);

    if document.select(&selector(PENDING)?).next().is_some() {
        debug!(url, "Match pending, no odds to record");
        return Ok(None);
    }

    let bets: Vec<ElementRef<'_>> = document.select(&selector(BET_ITEM)?).collect();
    let bet = match bets.as_slice() {
        [] => {
            debug!(url, "No odds published");
            return Ok(None);
        }
        [bet] => *bet,
        many => bail!("{} odds blocks on {url}, expected one", many.len()),
    };

    let teams: Vec<String> = bet.select(&selector(BET_TEAM)?).map(text_of).collect();
    let odds: Vec<String> = bet.select(&selector(BET_ODDS)?).map(text_of).collect();

    let [team_a_name, team_b_name] = <[String; 2]>::try_from(teams)
        .map_err(|t| anyhow!("expected 2 teams on {url}, found {}", t.len()))?;
    let [odds_a, odds_b] = <[String; 2]>::try_from(odds)
        .map_err(|o| anyhow!("expected 2 odds on {url}, found {}", o.len()))?;

    let team_a_odds = Decimal::from_str(&odds_a).with_context(|| format!("Bad odds value: {odds_a}"))?;
    let team_b_odds = Decimal::from_str(&odds_b).with_context(|| format!("Bad odds value: {odds_b}"))?;

    Ok(Some(OddsSnapshot {
        url: url.to_string(),
        team_a_name,
        team_a_odds,
        team_b_name,
        team_b_odds,
        recorded_at,
        scheduled_at: parse_scheduled(&document)?,
    }))
}

fn parse_scheduled(document: &Html) -> Result<DateTime<Utc>> {
    let raw = document
        .select(&selector(SCHEDULED)?)
        .find_map(|el| el.value().attr("data-utc-ts"))
        .context("Match page has no start time")?;

    let naive = NaiveDateTime::parse_from_str(raw.trim(), UTC_TS_FORMAT)
        .with_context(|| format!("Bad start time: {raw}"))?;

    Ok(naive.and_utc())
}

/// Winner/loser markers from a match page header.
///
/// The first score span is team A's and the second team B's, whether or
/// not either carries a marker class.
pub fn parse_conclusion(html: &str) -> Result<ConclusionMarkers> {
    let document = Html::parse_document(html);
    let block_sel = selector(SCORE_BLOCK)?;
    let span_sel = selector(SCORE_SPAN)?;

    let Some(block) = document.select(&block_sel).next() else {
        return Ok(ConclusionMarkers::default());
    };

    let mut spans = block.select(&span_sel).map(marker_of);

    Ok(ConclusionMarkers {
        team_a: spans.next().flatten(),
        team_b: spans.next().flatten(),
    })
}

fn marker_of(span: ElementRef<'_>) -> Option<Marker> {
    let has = |class: &str| span.value().classes().any(|c| c == class);
    if has(WINNER_CLASS) {
        Some(Marker::Winner)
    } else if has(LOSER_CLASS) {
        Some(Marker::Loser)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct VlrClient {
    http: Client,
    base_url: String,
    clock: Arc<dyn Clock>,
}

impl VlrClient {
    /// Create a new vlr.gg client.
    ///
    /// Every request is bounded by `timeout_secs`; a timeout surfaces as an
    /// ordinary fetch failure.
    pub fn new(config: &ScraperConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .context("Failed to build HTTP client for vlr.gg")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            clock,
        })
    }

    async fn get_html(&self, url: &str) -> Result<String> {
        debug!(url, "Fetching page");

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            bail!("{url} returned {status}");
        }

        resp.text()
            .await
            .with_context(|| format!("Failed to read body of {url}"))
    }
}

#[async_trait]
impl PageFetcher for VlrClient {
    async fn fetch_match_list(&self, event_id: &str) -> Result<Vec<String>> {
        let url = format!("{}/event/matches/{event_id}/", self.base_url);
        let html = self.get_html(&url).await?;
        parse_match_list(&html, &self.base_url)
    }

    async fn fetch_odds(&self, url: &str) -> Result<Option<OddsSnapshot>> {
        let recorded_at = self.clock.now();
        let html = self.get_html(url).await?;
        parse_odds(&html, url, recorded_at)
    }

    async fn fetch_conclusion(&self, url: &str) -> Result<ConclusionMarkers> {
        let html = self.get_html(url).await?;
        parse_conclusion(&html)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
