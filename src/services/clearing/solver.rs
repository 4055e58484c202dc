// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::auction::{Bid, ClearingResult};
use std::cmp::Ordering;

/// Policy band for the computed clearing price. A clamp is an anomaly worth
/// reporting, not a matching rule; the floor doubles as the empty-round
/// settlement price.
#[derive(Clone, Copy, Debug)]
pub struct PriceBand {
    pub min: f64,
    pub max: f64,
}

/// Uniform-price batch auction over one bid snapshot.
///
/// Bids sort by limit price descending, first-come within a price level.
/// Demand accumulates as `amount / limit_price`; the first bid at which
/// cumulative demand reaches supply is marginal and its price clears the
/// round. Undersubscribed rounds clear at the lowest submitted price, empty
/// rounds at the policy floor.
///
/// Pure: the same snapshot always produces the same result, so a failed
/// settlement attempt can simply re-run it.
pub fn solve(bids: &[Bid], supply: f64, band: PriceBand) -> ClearingResult {
    let mut valid: Vec<Bid> = bids
        .iter()
        .filter(|b| b.is_valid() && b.amount.is_finite() && b.limit_price.is_finite())
        .cloned()
        .collect();
    valid.sort_by(|a, b| {
        b.limit_price
            .partial_cmp(&a.limit_price)
            .unwrap_or(Ordering::Equal)
            .then(a.submitted_at.cmp(&b.submitted_at))
    });

    let total_demand_units: f64 = valid.iter().map(Bid::demand_units).sum();

    let computed = if valid.is_empty() {
        band.min
    } else {
        let mut accumulated = 0.0;
        let mut marginal = None;
        for bid in &valid {
            accumulated += bid.demand_units();
            if accumulated >= supply {
                marginal = Some(bid.limit_price);
                break;
            }
        }
        // Undersubscribed: everyone clears at the weakest accepted bid.
        marginal.unwrap_or_else(|| valid[valid.len() - 1].limit_price)
    };

    let clearing_price = computed.clamp(band.min, band.max);
    let clamped = clearing_price != computed;
    if clamped {
        tracing::warn!(
            target: "solver",
            computed,
            clearing_price,
            band_min = band.min,
            band_max = band.max,
            "Computed clearing price outside policy band, clamped"
        );
    }

    ClearingResult {
        clearing_price,
        clamped,
        total_demand_units,
        bids: valid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::auction::BidStatus;
    use alloy::primitives::Address;

    fn band() -> PriceBand {
        PriceBand {
            min: 0.01,
            max: 1000.0,
        }
    }

    fn bid(user: u8, amount: f64, limit_price: f64, submitted_at: u64) -> Bid {
        Bid {
            round_id: 1,
            user: Address::from([user; 20]),
            amount,
            limit_price,
            submitted_at,
            source_tx_id: format!("0x{user:02x}{submitted_at}"),
            status: BidStatus::Pending,
        }
    }

    #[test]
    fn marginal_bid_sets_the_clearing_price() {
        // A 100 units, B 250 units, C's 600 push cumulative demand past 500.
        let bids = vec![
            bid(1, 1000.0, 10.0, 1),
            bid(2, 2000.0, 8.0, 2),
            bid(3, 3000.0, 5.0, 3),
        ];
        let result = solve(&bids, 500.0, band());
        assert_eq!(result.clearing_price, 5.0);
        assert!(!result.clamped);
        assert!((result.total_demand_units - 950.0).abs() < 1e-9);
    }

    #[test]
    fn undersubscribed_round_clears_at_lowest_price() {
        let bids = vec![bid(1, 100.0, 2.0, 1)];
        let result = solve(&bids, 500.0, band());
        assert_eq!(result.clearing_price, 2.0);
        assert!(!result.clamped);
        assert!((result.total_demand_units - 50.0).abs() < 1e-9);
    }

    #[test]
    fn empty_round_settles_at_the_policy_floor() {
        let result = solve(&[], 500.0, band());
        assert_eq!(result.clearing_price, 0.01);
        assert!(result.bids.is_empty());
        // The floor is a policy choice, not a clamp of a computed price.
        assert!(!result.clamped);
        assert_eq!(result.total_demand_units, 0.0);
    }

    #[test]
    fn malformed_bids_are_excluded_before_sorting() {
        let bids = vec![
            bid(1, 1000.0, 10.0, 1),
            bid(2, 500.0, 0.0, 2),
            bid(3, -5.0, 3.0, 3),
            bid(4, 500.0, f64::NAN, 4),
        ];
        let result = solve(&bids, 500.0, band());
        assert_eq!(result.bids.len(), 1);
        assert_eq!(result.clearing_price, 10.0);
    }

    #[test]
    fn equal_prices_break_ties_by_submission_time() {
        let bids = vec![bid(2, 100.0, 5.0, 200), bid(1, 100.0, 5.0, 100)];
        let result = solve(&bids, 500.0, band());
        assert_eq!(result.bids[0].submitted_at, 100);
        assert_eq!(result.bids[1].submitted_at, 200);
    }

    #[test]
    fn dust_bid_below_floor_is_clamped_and_flagged() {
        let bids = vec![bid(1, 1.0, 0.001, 1)];
        let result = solve(&bids, 500.0, band());
        assert_eq!(result.clearing_price, 0.01);
        assert!(result.clamped);
    }

    #[test]
    fn computed_price_within_band_stands_unclamped() {
        // Fully subscribed by bids well above the floor: the band must not
        // touch the computed price.
        let bids = vec![bid(1, 2500.0, 5.0, 1), bid(2, 2000.0, 4.0, 2)];
        let result = solve(&bids, 500.0, band());
        assert_eq!(result.clearing_price, 5.0);
        assert!(!result.clamped);
    }

    #[test]
    fn solver_is_deterministic_over_identical_snapshots() {
        let bids = vec![
            bid(1, 1000.0, 10.0, 1),
            bid(2, 2000.0, 8.0, 2),
            bid(3, 3000.0, 5.0, 3),
        ];
        let a = solve(&bids, 500.0, band());
        let b = solve(&bids, 500.0, band());
        assert_eq!(a.clearing_price, b.clearing_price);
        assert_eq!(a.bids, b.bids);
    }

    #[test]
    fn raising_one_limit_price_never_lowers_the_clearing_price() {
        let base = vec![
            bid(1, 1000.0, 10.0, 1),
            bid(2, 2000.0, 8.0, 2),
            bid(3, 3000.0, 5.0, 3),
        ];
        let baseline = solve(&base, 500.0, band()).clearing_price;
        for bump in [6.0, 8.0, 9.0, 12.0] {
            let mut bids = base.clone();
            bids[2].limit_price = bump;
            let price = solve(&bids, 500.0, band()).clearing_price;
            assert!(
                price >= baseline,
                "bump to {bump} lowered price: {price} < {baseline}"
            );
        }
    }
}
