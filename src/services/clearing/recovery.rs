// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use crate::infrastructure::data::db::Database;
use crate::infrastructure::network::ledger::LedgerClient;
use crate::services::clearing::stats::EngineStats;
use std::sync::Arc;

/// Replays BidPlaced events the engine missed while it was down, and doubles
/// as the live tail: every loop iteration runs the same scan over whatever
/// blocks arrived since the checkpoint, so historical and live ingestion
/// share one insert-if-absent path and one dedup guarantee.
pub struct RecoveryManager {
    ledger: LedgerClient,
    db: Database,
    stats: Arc<EngineStats>,
    chunk_blocks: u64,
    deploy_block: u64,
}

impl RecoveryManager {
    pub fn new(
        ledger: LedgerClient,
        db: Database,
        stats: Arc<EngineStats>,
        chunk_blocks: u64,
        deploy_block: u64,
    ) -> Self {
        Self {
            ledger,
            db,
            stats,
            chunk_blocks: chunk_blocks.max(1),
            deploy_block,
        }
    }

    /// Scan from the persisted checkpoint to the chain head and insert any
    /// bids not already present. The checkpoint only advances after a chunk's
    /// inserts have landed; a crash mid-scan repeats a safe idempotent range.
    pub async fn catch_up(&self) -> Result<u64, AppError> {
        let latest = self.ledger.latest_block().await?;
        let start = match self.db.checkpoint().await? {
            Some(checkpoint) => checkpoint.saturating_add(1),
            None => self.deploy_block,
        };
        if start > latest {
            return Ok(latest);
        }

        let mut recovered = 0u64;
        for (from, to) in chunk_spans(start, latest, self.chunk_blocks) {
            let events = self.ledger.bid_events(from, to).await?;
            let scanned = events.len();
            for event in events {
                if self.db.insert_bid_if_absent(&event.into_bid()).await? {
                    recovered += 1;
                }
            }
            self.db.set_checkpoint(to).await?;
            tracing::debug!(
                target: "recovery",
                from,
                to,
                scanned,
                "Scanned BidPlaced range"
            );
        }

        if recovered > 0 {
            self.stats.add_bids_recovered(recovered);
            tracing::info!(
                target: "recovery",
                recovered,
                checkpoint = latest,
                "Recovered bids into the store"
            );
        }
        Ok(latest)
    }
}

/// Inclusive block ranges of at most `width` blocks covering [from, to].
pub fn chunk_spans(from: u64, to: u64, width: u64) -> Vec<(u64, u64)> {
    let width = width.max(1);
    let mut spans = Vec::new();
    let mut cursor = from;
    while cursor <= to {
        let end = cursor.saturating_add(width - 1).min(to);
        spans.push((cursor, end));
        if end == u64::MAX {
            break;
        }
        cursor = end + 1;
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_span_when_range_fits() {
        assert_eq!(chunk_spans(100, 150, 1000), vec![(100, 150)]);
    }

    #[test]
    fn splits_ranges_wider_than_the_chunk() {
        assert_eq!(
            chunk_spans(0, 10, 4),
            vec![(0, 3), (4, 7), (8, 10)]
        );
    }

    #[test]
    fn single_block_window_is_one_span() {
        assert_eq!(chunk_spans(42, 42, 5000), vec![(42, 42)]);
    }

    #[test]
    fn empty_when_start_is_past_the_head() {
        assert!(chunk_spans(100, 99, 10).is_empty());
    }
}
