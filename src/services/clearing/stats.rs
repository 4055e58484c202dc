// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use std::sync::atomic::{AtomicU64, Ordering};

/// Engine counters surfaced on the metrics endpoint. A stuck auction shows
/// up here as loop errors without rounds cleared, not as a crash.
#[derive(Default)]
pub struct EngineStats {
    bids_recovered: AtomicU64,
    rounds_cleared: AtomicU64,
    settlements_failed: AtomicU64,
    settlements_fallback: AtomicU64,
    price_clamps: AtomicU64,
    loop_errors: AtomicU64,
}

impl EngineStats {
    pub fn add_bids_recovered(&self, n: u64) {
        self.bids_recovered.fetch_add(n, Ordering::Relaxed);
    }
    pub fn inc_rounds_cleared(&self) {
        self.rounds_cleared.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_settlements_failed(&self) {
        self.settlements_failed.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_settlements_fallback(&self) {
        self.settlements_fallback.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_price_clamps(&self) {
        self.price_clamps.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_loop_errors(&self) {
        self.loop_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bids_recovered(&self) -> u64 {
        self.bids_recovered.load(Ordering::Relaxed)
    }
    pub fn rounds_cleared(&self) -> u64 {
        self.rounds_cleared.load(Ordering::Relaxed)
    }
    pub fn settlements_failed(&self) -> u64 {
        self.settlements_failed.load(Ordering::Relaxed)
    }
    pub fn settlements_fallback(&self) -> u64 {
        self.settlements_fallback.load(Ordering::Relaxed)
    }
    pub fn price_clamps(&self) -> u64 {
        self.price_clamps.load(Ordering::Relaxed)
    }
    pub fn loop_errors(&self) -> u64 {
        self.loop_errors.load(Ordering::Relaxed)
    }
}
