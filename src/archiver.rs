use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::board::BoardService;
use crate::error::DeliveryError;
use crate::model::BoardCard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSettings {
    /// Cards closed concurrently per batch.
    pub batch_size: usize,
    /// Pause between consecutive batches.
    pub pause: Duration,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            pause: Duration::from_millis(1000),
        }
    }
}

/// Result of one archive sweep: `closed` of `stale` cards, in `batches` rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    pub stale: usize,
    pub closed: usize,
    pub batches: usize,
}

/// Open cards whose last activity is older than `now - retention`.
pub fn select_stale(
    cards: Vec<BoardCard>,
    retention: chrono::Duration,
    now: DateTime<Utc>,
) -> Vec<BoardCard> {
    let cutoff = now - retention;
    cards
        .into_iter()
        .filter(|card| !card.closed && card.last_activity < cutoff)
        .collect()
}

/// Close stale board cards in paced, bounded batches.
///
/// Only listing the cards can fail the sweep; a card that fails to close is
/// logged and counted as not closed.
#[instrument(skip_all)]
pub async fn archive_stale(
    board: &dyn BoardService,
    retention: chrono::Duration,
    now: DateTime<Utc>,
    settings: ArchiveSettings,
) -> Result<ArchiveReport, DeliveryError> {
    let stale = select_stale(board.list_cards().await?, retention, now);
    if stale.is_empty() {
        info!("no cards to archive");
        return Ok(ArchiveReport::default());
    }
    info!(count = stale.len(), "found cards to archive");

    let mut report = ArchiveReport {
        stale: stale.len(),
        ..ArchiveReport::default()
    };
    for (i, batch) in stale.chunks(settings.batch_size.max(1)).enumerate() {
        if i > 0 {
            tokio::time::sleep(settings.pause).await;
        }
        let results = join_all(batch.iter().map(|card| async move {
            match board.close_card(card).await {
                Ok(()) => {
                    info!(card = %card.name, "archived card");
                    true
                }
                Err(err) => {
                    warn!(?err, card = %card.name, "failed to archive card");
                    false
                }
            }
        }))
        .await;
        report.closed += results.into_iter().filter(|ok| *ok).count();
        report.batches += 1;
    }

    info!("closed {} of {} stale cards", report.closed, report.stale);
    Ok(report)
}
