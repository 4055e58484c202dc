// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::data_path::ensure_parent_dir;
use crate::domain::auction::{Bid, BidStatus};
use crate::domain::error::AppError;
use crate::infrastructure::data::schema::{BidRecord, RoundRecord};
use sqlx::{
    Pool, Row, Sqlite,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::path::Path;
use std::str::FromStr;

const CHECKPOINT_KEY: &str = "last_processed_block";

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, AppError> {
        if let Some(file) = sqlite_file_path(database_url) {
            ensure_parent_dir(Path::new(&file))
                .map_err(|e| AppError::Initialization(format!("DB directory failed: {}", e)))?;
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::Initialization(format!("DB Connect failed: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Initialization(format!("DB Connect failed: {}", e)))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Initialization(format!("DB Migration failed: {}", e)))?;

        Ok(Self { pool })
    }

    /// Insert a bid unless one with the same (round, source tx) already
    /// exists. Returns true only when the row is new, so replayed event
    /// ranges are free of duplicates.
    pub async fn insert_bid_if_absent(&self, bid: &Bid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO bids
                (round_id, user_address, amount_quote, limit_price, submitted_at, source_tx_id, status)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(bid.round_id as i64)
        .bind(format!("{:#x}", bid.user))
        .bind(bid.amount.to_string())
        .bind(bid.limit_price.to_string())
        .bind(bid.submitted_at as i64)
        .bind(&bid.source_tx_id)
        .bind(bid.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Store(format!("Bid insert failed: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    /// Pending bids for one round, ordered for the clearing walk:
    /// price priority first, first-come within a price level.
    pub async fn bids_for_round(&self, round_id: u64) -> Result<Vec<Bid>, AppError> {
        let rows = sqlx::query_as::<_, BidRecord>(
            r#"
            SELECT * FROM bids
            WHERE round_id = ? AND status != 'CLEARED'
            ORDER BY CAST(limit_price AS REAL) DESC, submitted_at ASC, id ASC
            "#,
        )
        .bind(round_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Store(format!("Bid query failed: {}", e)))?;

        rows.into_iter().map(BidRecord::into_bid).collect()
    }

    /// Flip every bid in the round to CLEARED. Called only after the
    /// settlement transaction is confirmed on the ledger.
    pub async fn mark_round_cleared(&self, round_id: u64) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE bids SET status = ? WHERE round_id = ? AND status = ?")
            .bind(BidStatus::Cleared.as_str())
            .bind(round_id as i64)
            .bind(BidStatus::Pending.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Store(format!("Mark cleared failed: {}", e)))?;
        Ok(result.rows_affected())
    }

    /// Record how many units a single bid received at settlement.
    pub async fn record_bid_allocation(
        &self,
        round_id: u64,
        source_tx_id: &str,
        units_allocated: f64,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE bids SET units_allocated = ? WHERE round_id = ? AND source_tx_id = ?")
            .bind(units_allocated.to_string())
            .bind(round_id as i64)
            .bind(source_tx_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Store(format!("Allocation update failed: {}", e)))?;
        Ok(())
    }

    pub async fn record_round(
        &self,
        round_id: u64,
        clearing_price: f64,
        total_raised: f64,
        winners: u64,
        settlement_tx: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO rounds (round_id, clearing_price, total_raised, winners, settlement_tx)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(round_id) DO UPDATE SET
                clearing_price = excluded.clearing_price,
                total_raised = excluded.total_raised,
                winners = excluded.winners,
                settlement_tx = excluded.settlement_tx,
                cleared_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(round_id as i64)
        .bind(clearing_price.to_string())
        .bind(total_raised.to_string())
        .bind(winners as i64)
        .bind(settlement_tx)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Store(format!("Round insert failed: {}", e)))?;
        Ok(())
    }

    pub async fn recent_rounds(&self, limit: i64) -> Result<Vec<RoundRecord>, AppError> {
        let recs = sqlx::query_as::<_, RoundRecord>(
            "SELECT * FROM rounds ORDER BY round_id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Store(format!("Round query failed: {}", e)))?;
        Ok(recs)
    }

    pub async fn checkpoint(&self) -> Result<Option<u64>, AppError> {
        let row = sqlx::query("SELECT value FROM metadata WHERE key = ?")
            .bind(CHECKPOINT_KEY)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Store(format!("Checkpoint load failed: {}", e)))?;

        match row {
            Some(row) => {
                let raw: String = row.get("value");
                let block = raw.parse::<u64>().map_err(|_| {
                    AppError::Store(format!("Checkpoint value is not a block number: {raw}"))
                })?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    pub async fn set_checkpoint(&self, block: u64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO metadata (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(CHECKPOINT_KEY)
        .bind(block.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Store(format!("Checkpoint save failed: {}", e)))?;
        Ok(())
    }
}

fn sqlite_file_path(database_url: &str) -> Option<String> {
    let rest = database_url.strip_prefix("sqlite://")?;
    let file = rest.split('?').next().unwrap_or(rest);
    if file.is_empty() || file == ":memory:" {
        return None;
    }
    Some(file.to_string())
}
