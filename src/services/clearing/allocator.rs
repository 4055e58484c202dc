// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::auction::{Allocation, AllocationReason, ClearingResult};
use alloy::primitives::Address;
use std::collections::HashMap;

/// Float residue guard for "supply left" / "headroom left" checks.
const EPSILON: f64 = 1e-9;

/// Greedy single pass over the solver's priority order, restricted to bids
/// priced at or above the clearing price.
///
/// Per bid: `want = amount / clearing_price`, then the grant is the minimum
/// of want, the user's remaining cap headroom, and remaining supply. The cap
/// check runs before the supply check, so a capped user reads
/// `UserCapReached` even in an exhausted round. A failed solvency check
/// never consumes supply; the units stay available to the next bidder in
/// priority order.
///
/// Post-conditions, exact by construction: allocated units never exceed
/// supply, and no user exceeds `supply * per_user_cap_ratio`.
pub fn allocate(
    result: &ClearingResult,
    supply: f64,
    per_user_cap_ratio: f64,
    mut balance_of: impl FnMut(Address) -> f64,
) -> Vec<Allocation> {
    let clearing_price = result.clearing_price;
    let user_cap = supply * per_user_cap_ratio;
    let mut remaining_supply = supply;
    let mut allocated_per_user: HashMap<Address, f64> = HashMap::new();
    let mut allocations = Vec::new();

    for bid in result.bids.iter().filter(|b| b.limit_price >= clearing_price) {
        let want = bid.amount / clearing_price;
        let granted_so_far = allocated_per_user.get(&bid.user).copied().unwrap_or(0.0);
        let user_headroom = user_cap - granted_so_far;

        if user_headroom <= EPSILON {
            allocations.push(rejected(bid.user, &bid.source_tx_id, AllocationReason::UserCapReached));
            continue;
        }

        let grant = want.min(user_headroom).min(remaining_supply);
        if grant <= EPSILON {
            allocations.push(rejected(bid.user, &bid.source_tx_id, AllocationReason::SupplyExhausted));
            continue;
        }

        let cost = grant * clearing_price;
        if balance_of(bid.user) < cost {
            allocations.push(rejected(
                bid.user,
                &bid.source_tx_id,
                AllocationReason::InsufficientBalance,
            ));
            continue;
        }

        *allocated_per_user.entry(bid.user).or_insert(0.0) += grant;
        remaining_supply -= grant;
        allocations.push(Allocation {
            user: bid.user,
            source_tx_id: bid.source_tx_id.clone(),
            units_allocated: grant,
            cost_owed: cost,
            eligible: true,
            reason: AllocationReason::Ok,
        });
    }

    allocations
}

fn rejected(user: Address, source_tx_id: &str, reason: AllocationReason) -> Allocation {
    Allocation {
        user,
        source_tx_id: source_tx_id.to_string(),
        units_allocated: 0.0,
        cost_owed: 0.0,
        eligible: false,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::auction::{Bid, BidStatus};
    use crate::services::clearing::solver::{PriceBand, solve};

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

    fn rich(_user: Address) -> f64 {
        f64::MAX
    }

    #[test]
    fn grants_follow_priority_until_supply_runs_out() {
        let bids = vec![
            bid(1, 1000.0, 10.0, 1),
            bid(2, 2000.0, 8.0, 2),
            bid(3, 3000.0, 5.0, 3),
        ];
        let result = solve(&bids, 500.0, band());
        assert_eq!(result.clearing_price, 5.0);

        let allocations = allocate(&result, 500.0, 1.0, rich);
        assert_eq!(allocations.len(), 3);
        // At the $5 clearing price A affords 200 units and B 400; B is
        // capped by remaining supply, not by its own want.
        assert!((allocations[0].units_allocated - 200.0).abs() < 1e-9);
        assert!((allocations[1].units_allocated - 300.0).abs() < 1e-9);
        assert_eq!(allocations[2].reason, AllocationReason::SupplyExhausted);
        assert!(!allocations[2].eligible);

        let total: f64 = allocations.iter().map(|a| a.units_allocated).sum();
        assert!(total <= 500.0 + 1e-9);
    }

    #[test]
    fn cost_owed_is_units_times_clearing_price() {
        let bids = vec![bid(1, 100.0, 2.0, 1)];
        let result = solve(&bids, 500.0, band());
        let allocations = allocate(&result, 500.0, 1.0, rich);
        assert!((allocations[0].units_allocated - 50.0).abs() < 1e-9);
        assert!((allocations[0].cost_owed - 100.0).abs() < 1e-9);
    }

    #[test]
    fn per_user_cap_binds_across_multiple_bids() {
        // U's two bids would take 400 units at the clearing price; with a
        // 0.25 cap on 500 supply U stops at 125 regardless of bid order.
        let u = 9u8;
        let bids = vec![
            bid(u, 400.0, 2.0, 1),
            bid(u, 400.0, 2.0, 2),
            bid(3, 600.0, 2.0, 3),
        ];
        let result = ClearingResult {
            clearing_price: 2.0,
            clamped: false,
            total_demand_units: 700.0,
            bids,
        };
        let allocations = allocate(&result, 500.0, 0.25, rich);

        let u_total: f64 = allocations
            .iter()
            .filter(|a| a.user == Address::from([u; 20]))
            .map(|a| a.units_allocated)
            .sum();
        assert!((u_total - 125.0).abs() < 1e-9);
        assert_eq!(allocations[1].reason, AllocationReason::UserCapReached);
        // The freed supply stays available; the other bidder draws on it up
        // to its own cap.
        assert!((allocations[2].units_allocated - 125.0).abs() < 1e-9);

        let total: f64 = allocations.iter().map(|a| a.units_allocated).sum();
        assert!(total <= 500.0 * 0.25 * 2.0 + 1e-9);
    }

    #[test]
    fn failed_solvency_check_does_not_consume_supply() {
        let broke_user = Address::from([1u8; 20]);
        let bids = vec![bid(1, 2500.0, 5.0, 1), bid(2, 2500.0, 5.0, 2)];
        let result = solve(&bids, 500.0, band());

        let allocations = allocate(&result, 500.0, 1.0, |user| {
            if user == broke_user { 0.0 } else { f64::MAX }
        });

        assert_eq!(allocations[0].reason, AllocationReason::InsufficientBalance);
        assert!(!allocations[0].eligible);
        assert_eq!(allocations[0].units_allocated, 0.0);
        // The second bidder inherits the full supply the first could not pay for.
        assert!((allocations[1].units_allocated - 500.0).abs() < 1e-9);
    }

    #[test]
    fn capped_user_reads_cap_reason_even_after_exhaustion() {
        // Cap 0.25 on 500 supply = 125 units per user. Four users fill the
        // round exactly; then user 1 bids again (at cap) and a fifth user
        // arrives (supply gone). The cap check runs first, so user 1 reads
        // its cap while the fresh user reads exhaustion.
        let mut bids: Vec<Bid> = (1u8..=4).map(|u| bid(u, 250.0, 2.0, u as u64)).collect();
        bids.push(bid(1, 250.0, 2.0, 5));
        bids.push(bid(5, 250.0, 2.0, 6));
        let result = ClearingResult {
            clearing_price: 2.0,
            clamped: false,
            total_demand_units: 750.0,
            bids,
        };

        let allocations = allocate(&result, 500.0, 0.25, rich);
        for a in &allocations[..4] {
            assert!(a.eligible);
            assert!((a.units_allocated - 125.0).abs() < 1e-9);
        }
        assert_eq!(allocations[4].reason, AllocationReason::UserCapReached);
        assert_eq!(allocations[5].reason, AllocationReason::SupplyExhausted);
    }

    #[test]
    fn bids_below_the_clearing_price_get_no_line_item() {
        let bids = vec![
            bid(1, 1000.0, 5.0, 1),
            bid(2, 2000.0, 4.0, 2),
            bid(3, 100.0, 1.0, 3),
        ];
        let result = solve(&bids, 500.0, band());
        assert_eq!(result.clearing_price, 4.0);

        let allocations = allocate(&result, 500.0, 1.0, rich);
        assert_eq!(allocations.len(), 2);
        assert!(allocations.iter().all(|a| a.user != Address::from([3u8; 20])));
    }

    #[test]
    fn allocation_is_deterministic_over_identical_snapshots() {
        let bids = vec![
            bid(1, 1000.0, 10.0, 1),
            bid(2, 2000.0, 8.0, 2),
            bid(3, 3000.0, 5.0, 3),
        ];
        let result = solve(&bids, 500.0, band());
        let a = allocate(&result, 500.0, 1.0, rich);
        let b = allocate(&result, 500.0, 1.0, rich);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.user, y.user);
            assert_eq!(x.units_allocated, y.units_allocated);
            assert_eq!(x.reason, y.reason);
        }
    }
}
