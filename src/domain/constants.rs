// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

// =============================================================================
// AUCTION PROTOCOL CONSTANTS
// =============================================================================

/// Fallback round length if the on-chain ROUND_DURATION read fails at startup.
pub const DEFAULT_ROUND_DURATION_SECS: u64 = 300;

/// Grace period past round end before clearing is attempted, so the last
/// accepted bid has propagated into the store.
pub const DEFAULT_SETTLEMENT_BUFFER_SECS: u64 = 15;

pub const DEFAULT_SUPPLY_PER_ROUND: f64 = 500.0;

/// Policy band for the computed clearing price. The floor doubles as the
/// empty-round settlement price.
pub const DEFAULT_MIN_CLEARING_PRICE: f64 = 0.01;
pub const DEFAULT_MAX_CLEARING_PRICE: f64 = 1000.0;

/// Cap on any single user's share of a round's supply. 1.0 disables the cap.
pub const DEFAULT_PER_USER_CAP_RATIO: f64 = 1.0;

// =============================================================================
// LOOP & RETRY TIMING
// =============================================================================

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_POST_CLEARING_DELAY_MS: u64 = 5_000;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_RETRY_MAX_ATTEMPTS: usize = 3;

/// Block-range width for one BidPlaced back-scan request.
pub const DEFAULT_CATCHUP_CHUNK_BLOCKS: u64 = 5_000;

// =============================================================================
// LOGGING DEFAULTS
// =============================================================================

pub const DEFAULT_LOG_LEVEL: &str = "info";
