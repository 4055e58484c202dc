// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::auction::{Bid, BidStatus};
use crate::domain::error::AppError;
use alloy::primitives::Address;
use chrono::NaiveDateTime;
use sqlx::FromRow;
use std::str::FromStr;

/// Raw bids row. Monetary columns are TEXT so SQLite never rounds them;
/// parsing to f64 happens once, at the row boundary.
#[derive(Debug, FromRow)]
pub struct BidRecord {
    pub id: i64,
    pub round_id: i64,
    pub user_address: String,
    pub amount_quote: String,
    pub limit_price: String,
    pub submitted_at: i64,
    pub source_tx_id: String,
    pub status: String,
    pub units_allocated: String,
    pub created_at: NaiveDateTime,
}

impl BidRecord {
    pub fn into_bid(self) -> Result<Bid, AppError> {
        let user = Address::from_str(&self.user_address).map_err(|e| AppError::Store(format!(
            "Bid {} has invalid user address {}: {}",
            self.id, self.user_address, e
        )))?;
        let amount: f64 = self.amount_quote.parse().map_err(|_| bad_decimal(self.id, "amount_quote", &self.amount_quote))?;
        let limit_price: f64 = self.limit_price.parse().map_err(|_| bad_decimal(self.id, "limit_price", &self.limit_price))?;
        if self.round_id < 0 || self.submitted_at < 0 {
            return Err(AppError::Store(format!(
                "Bid {} contains negative value(s): round_id={} submitted_at={}",
                self.id, self.round_id, self.submitted_at
            )));
        }
        let status = BidStatus::parse(&self.status).ok_or_else(|| {
            AppError::Store(format!("Bid {} has unknown status {}", self.id, self.status))
        })?;
        Ok(Bid {
            round_id: self.round_id as u64,
            user,
            amount,
            limit_price,
            submitted_at: self.submitted_at as u64,
            source_tx_id: self.source_tx_id,
            status,
        })
    }
}

fn bad_decimal(id: i64, column: &str, raw: &str) -> AppError {
    AppError::Store(format!("Bid {id} column {column} is not a decimal: {raw}"))
}

/// Per-round clearing summary kept for audit.
#[derive(Debug, FromRow)]
pub struct RoundRecord {
    pub round_id: i64,
    pub clearing_price: String,
    pub total_raised: String,
    pub winners: i64,
    pub settlement_tx: Option<String>,
    pub cleared_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> BidRecord {
        BidRecord {
            id: 1,
            round_id: 7,
            user_address: format!("{:#x}", Address::from([0x11; 20])),
            amount_quote: "1000".into(),
            limit_price: "10".into(),
            submitted_at: 1_700_000_000,
            source_tx_id: "0xdead".into(),
            status: "PENDING".into(),
            units_allocated: "0".into(),
            created_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn row_converts_to_domain_bid() {
        let bid = record().into_bid().expect("convert");
        assert_eq!(bid.round_id, 7);
        assert_eq!(bid.amount, 1000.0);
        assert_eq!(bid.limit_price, 10.0);
        assert_eq!(bid.status, BidStatus::Pending);
    }

    #[test]
    fn row_conversion_rejects_garbage_decimals() {
        let mut rec = record();
        rec.limit_price = "ten".into();
        let err = rec.into_bid().expect_err("should fail");
        assert!(format!("{err}").contains("limit_price"));
    }

    #[test]
    fn row_conversion_rejects_negative_round() {
        let mut rec = record();
        rec.round_id = -1;
        assert!(rec.into_bid().is_err());
    }
}
