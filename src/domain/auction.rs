// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use alloy::primitives::Address;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BidStatus {
    Pending,
    Cleared,
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BidStatus::Pending => "PENDING",
            BidStatus::Cleared => "CLEARED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(BidStatus::Pending),
            "CLEARED" => Some(BidStatus::Cleared),
            _ => None,
        }
    }
}

/// One user's limit order for a round. `amount` is quote-currency notional;
/// `limit_price` is the max price per unit the user will pay.
#[derive(Clone, Debug, PartialEq)]
pub struct Bid {
    pub round_id: u64,
    pub user: Address,
    pub amount: f64,
    pub limit_price: f64,
    pub submitted_at: u64,
    pub source_tx_id: String,
    pub status: BidStatus,
}

impl Bid {
    /// Intake validity: the solver excludes anything non-positive before
    /// sorting so demand accumulation never divides by zero.
    pub fn is_valid(&self) -> bool {
        self.amount > 0.0 && self.limit_price > 0.0
    }

    /// Units demanded at the bid's own limit price.
    pub fn demand_units(&self) -> f64 {
        self.amount / self.limit_price
    }
}

/// Solver output for one bid snapshot. Recomputed deterministically per
/// clearing attempt, never persisted.
#[derive(Clone, Debug)]
pub struct ClearingResult {
    pub clearing_price: f64,
    /// True when the computed price had to be forced into the policy band.
    pub clamped: bool,
    pub total_demand_units: f64,
    /// Valid bids sorted by (limit_price desc, submitted_at asc).
    pub bids: Vec<Bid>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationReason {
    Ok,
    InsufficientBalance,
    UserCapReached,
    SupplyExhausted,
}

impl AllocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationReason::Ok => "ok",
            AllocationReason::InsufficientBalance => "insufficient_balance",
            AllocationReason::UserCapReached => "user_cap_reached",
            AllocationReason::SupplyExhausted => "supply_exhausted",
        }
    }
}

/// One settlement line item. Carries the source bid's tx id so a confirmed
/// settlement can be written back to the originating store row.
#[derive(Clone, Debug)]
pub struct Allocation {
    pub user: Address,
    pub source_tx_id: String,
    pub units_allocated: f64,
    pub cost_owed: f64,
    pub eligible: bool,
    pub reason: AllocationReason,
}

/// Strongly-typed decode of the ledger's BidPlaced log. The rest of the
/// engine never touches raw event shapes.
#[derive(Clone, Debug)]
pub struct BidPlacedEvent {
    pub round_id: u64,
    pub user: Address,
    pub amount: f64,
    pub limit_price: f64,
    pub tx_id: String,
    pub block_number: u64,
    pub block_timestamp: u64,
}

impl BidPlacedEvent {
    pub fn into_bid(self) -> Bid {
        // Block timestamps are the ledger's clock; fall back to the block
        // number as a coarse monotone stand-in when the node omits them.
        let submitted_at = if self.block_timestamp > 0 {
            self.block_timestamp
        } else {
            self.block_number
        };
        Bid {
            round_id: self.round_id,
            user: self.user,
            amount: self.amount,
            limit_price: self.limit_price,
            submitted_at,
            source_tx_id: self.tx_id,
            status: BidStatus::Pending,
        }
    }
}

/// Snapshot of the ledger's round machine as seen by one poll.
#[derive(Clone, Copy, Debug)]
pub struct RoundState {
    pub round_id: u64,
    pub is_active: bool,
    /// Negative once the round window has elapsed on the ledger clock.
    pub seconds_remaining: i64,
}

/// Explicit loop state threaded through engine iterations. Persisted only at
/// commit points (checkpoint advance, settlement confirmation).
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineState {
    pub round_id: u64,
    pub checkpoint: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bid_validity_rejects_non_positive_terms() {
        let mut bid = Bid {
            round_id: 1,
            user: Address::ZERO,
            amount: 100.0,
            limit_price: 2.0,
            submitted_at: 0,
            source_tx_id: "0xabc".into(),
            status: BidStatus::Pending,
        };
        assert!(bid.is_valid());
        assert_eq!(bid.demand_units(), 50.0);

        bid.limit_price = 0.0;
        assert!(!bid.is_valid());
        bid.limit_price = 2.0;
        bid.amount = -1.0;
        assert!(!bid.is_valid());
    }

    #[test]
    fn event_falls_back_to_block_number_for_ordering() {
        let event = BidPlacedEvent {
            round_id: 3,
            user: Address::ZERO,
            amount: 10.0,
            limit_price: 1.0,
            tx_id: "0x1".into(),
            block_number: 42,
            block_timestamp: 0,
        };
        assert_eq!(event.into_bid().submitted_at, 42);
    }
}
