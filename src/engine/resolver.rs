//! Outcome resolver — which team won a concluded match.

use tracing::debug;

use crate::fetcher::PageFetcher;
use crate::types::{ConclusionMarkers, LedgerError, Marker, Side};

/// Fetch a match page and decide the winning side.
///
/// Exactly one team must carry the winner marker; anything else is an
/// `AmbiguousOutcome` and the caller keeps the record as it was.
pub async fn resolve_winner<F>(url: &str, fetcher: &F) -> Result<Side, LedgerError>
where
    F: PageFetcher + ?Sized,
{
    let markers = fetcher
        .fetch_conclusion(url)
        .await
        .map_err(|e| LedgerError::Fetch {
            url: url.to_string(),
            message: format!("{e:#}"),
        })?;

    let side = winner_from_markers(url, markers)?;
    debug!(url, winner = %side, "Outcome resolved");
    Ok(side)
}

fn winner_from_markers(url: &str, markers: ConclusionMarkers) -> Result<Side, LedgerError> {
    let won = |m: Option<Marker>| m == Some(Marker::Winner);

    match (won(markers.team_a), won(markers.team_b)) {
        (true, false) => Ok(Side::A),
        (false, true) => Ok(Side::B),
        (true, true) => Err(LedgerError::AmbiguousOutcome {
            url: url.to_string(),
            reason: "both teams marked as winner".to_string(),
        }),
        (false, false) => Err(LedgerError::AmbiguousOutcome {
            url: url.to_string(),
            reason: "no winner marker".to_string(),
        }),
    }
}
