// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::app::config::GlobalSettings;
use crate::common::retry::RetryPolicy;
use crate::domain::auction::EngineState;
use crate::domain::error::AppError;
use crate::infrastructure::data::db::Database;
use crate::infrastructure::network::ledger::{LedgerClient, TxStatus};
use crate::services::clearing::allocator::allocate;
use crate::services::clearing::lifecycle::RoundTracker;
use crate::services::clearing::recovery::RecoveryManager;
use crate::services::clearing::settlement::{SettlementOutcome, SettlementSubmitter};
use crate::services::clearing::solver::{PriceBand, solve};
use crate::services::clearing::stats::EngineStats;
use alloy::primitives::Address;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// The clearing loop. Single task, no internal parallelism: batch auctions
/// clear at most once per round, so one iteration reads round state, runs
/// the solve -> allocate -> submit pipeline when the window (plus buffer)
/// has elapsed, and sleeps. Round N+1 is never started before round N's
/// settlement is resolved; the loop structure itself enforces that order.
pub struct Engine {
    ledger: LedgerClient,
    db: Database,
    submitter: SettlementSubmitter,
    recovery: RecoveryManager,
    stats: Arc<EngineStats>,
    shutdown: CancellationToken,
    supply_per_round: f64,
    per_user_cap_ratio: f64,
    band: PriceBand,
    settlement_buffer_secs: u64,
    round_duration_fallback_secs: u64,
    poll_interval: Duration,
    post_clearing_delay: Duration,
    retry_base_delay: Duration,
    retry_max_attempts: usize,
    dry_run: bool,
    once: bool,
}

impl Engine {
    pub fn new(
        ledger: LedgerClient,
        db: Database,
        stats: Arc<EngineStats>,
        settings: &GlobalSettings,
        shutdown: CancellationToken,
        dry_run: bool,
        once: bool,
    ) -> Self {
        let submitter = SettlementSubmitter::new(ledger.clone(), db.clone());
        let recovery = RecoveryManager::new(
            ledger.clone(),
            db.clone(),
            stats.clone(),
            settings.catchup_chunk_blocks,
            settings.deploy_block,
        );
        Self {
            ledger,
            db,
            submitter,
            recovery,
            stats,
            shutdown,
            supply_per_round: settings.supply_per_round,
            per_user_cap_ratio: settings.per_user_cap_ratio,
            band: PriceBand {
                min: settings.min_clearing_price,
                max: settings.max_clearing_price,
            },
            settlement_buffer_secs: settings.settlement_buffer_secs,
            round_duration_fallback_secs: settings.round_duration_secs,
            poll_interval: settings.poll_interval(),
            post_clearing_delay: settings.post_clearing_delay(),
            retry_base_delay: settings.retry_base_delay(),
            retry_max_attempts: settings.retry_max_attempts,
            dry_run,
            once,
        }
    }

    pub async fn run(self) -> Result<(), AppError> {
        let duration = match self.ledger.round_duration_secs().await {
            Ok(duration) if duration > 0 => duration,
            Ok(_) | Err(_) => {
                tracing::warn!(
                    target: "engine",
                    fallback = self.round_duration_fallback_secs,
                    "ROUND_DURATION unavailable, using configured fallback"
                );
                self.round_duration_fallback_secs
            }
        };
        // Both policies are short: overall unboundedness comes from the loop
        // itself re-entering every tick until the round moves.
        let tracker = RoundTracker::new(
            self.ledger.clone(),
            duration,
            RetryPolicy::bounded(self.retry_max_attempts, self.retry_base_delay),
            RetryPolicy::bounded(self.retry_max_attempts, self.retry_base_delay),
        );
        tracing::info!(
            target: "engine",
            auction = %self.ledger.auction_address(),
            round_duration_secs = duration,
            supply_per_round = self.supply_per_round,
            dry_run = self.dry_run,
            "Clearing engine starting"
        );
        if let Ok(rounds) = self.db.recent_rounds(1).await
            && let Some(last) = rounds.first()
        {
            tracing::info!(
                target: "engine",
                last_round = last.round_id,
                clearing_price = %last.clearing_price,
                "Resuming with existing round history"
            );
        }

        let mut state = EngineState::default();
        loop {
            if self.shutdown.is_cancelled() {
                tracing::info!(target: "engine", "Shutdown requested, stopping engine");
                return Ok(());
            }

            let pause = match self.iteration(&tracker, &mut state).await {
                Ok(true) => self.post_clearing_delay,
                Ok(false) => self.poll_interval,
                Err(e) => {
                    // Loop-boundary policy: every ledger/store error becomes
                    // a logged backoff, never a crash.
                    self.stats.inc_loop_errors();
                    tracing::error!(
                        target: "engine",
                        round_id = state.round_id,
                        checkpoint = state.checkpoint,
                        error = %e,
                        "Iteration failed, backing off"
                    );
                    self.retry_base_delay
                }
            };

            if self.once {
                tracing::info!(target: "engine", "Single-shot mode, exiting after one iteration");
                return Ok(());
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!(target: "engine", "Shutdown requested during idle");
                    return Ok(());
                }
                _ = sleep(pause) => {}
            }
        }
    }

    /// One loop turn. Returns true when a round was settled, so the caller
    /// can apply the longer post-clearing pause.
    async fn iteration(
        &self,
        tracker: &RoundTracker,
        state: &mut EngineState,
    ) -> Result<bool, AppError> {
        // Live tail and crash recovery are the same scan.
        state.checkpoint = self.recovery.catch_up().await?;

        let round = tracker.poll_state().await?;
        state.round_id = round.round_id;

        if !round.is_active {
            tracker.force_advance().await?;
            return Ok(false);
        }

        let buffer = self.settlement_buffer_secs as i64;
        if round.seconds_remaining > -buffer {
            tracing::debug!(
                target: "engine",
                round_id = round.round_id,
                seconds_remaining = round.seconds_remaining,
                "Round still open"
            );
            return Ok(false);
        }

        // Final sweep so the snapshot includes every bid placed inside the
        // window; nothing inserted after this point joins the round.
        state.checkpoint = self.recovery.catch_up().await?;
        self.clear_round(round.round_id).await
    }

    async fn clear_round(&self, round_id: u64) -> Result<bool, AppError> {
        let bids = self.db.bids_for_round(round_id).await?;
        tracing::info!(target: "engine", round_id, bids = bids.len(), "Round closed, clearing");

        let result = solve(&bids, self.supply_per_round, self.band);
        if result.clamped {
            self.stats.inc_price_clamps();
        }

        // Pre-fetch balances for the candidate set so the allocation pass
        // stays synchronous and deterministic over the snapshot.
        let mut balances: HashMap<Address, f64> = HashMap::new();
        for bid in result
            .bids
            .iter()
            .filter(|b| b.limit_price >= result.clearing_price)
        {
            if !balances.contains_key(&bid.user) {
                let balance = self.ledger.user_balance(bid.user).await?;
                balances.insert(bid.user, balance);
            }
        }

        let allocations = allocate(
            &result,
            self.supply_per_round,
            self.per_user_cap_ratio,
            |user| balances.get(&user).copied().unwrap_or(0.0),
        );
        for skipped in allocations.iter().filter(|a| !a.eligible) {
            tracing::debug!(
                target: "engine",
                round_id,
                user = %skipped.user,
                reason = skipped.reason.as_str(),
                "Bid not settled"
            );
        }
        let winners = allocations.iter().filter(|a| a.eligible).count();
        tracing::info!(
            target: "engine",
            round_id,
            clearing_price = result.clearing_price,
            total_demand_units = result.total_demand_units,
            winners,
            "Clearing computed"
        );

        if self.dry_run {
            tracing::info!(target: "engine", round_id, "Dry-run: settlement skipped");
            return Ok(false);
        }

        match self
            .submitter
            .submit(round_id, self.supply_per_round, result.clearing_price, &allocations)
            .await
        {
            Ok(SettlementOutcome::Confirmed { .. }) => {
                self.stats.inc_rounds_cleared();
                self.start_next_round(round_id).await;
                Ok(true)
            }
            Ok(SettlementOutcome::FallbackConfirmed { .. }) => {
                self.stats.inc_settlements_fallback();
                self.start_next_round(round_id).await;
                Ok(true)
            }
            Ok(SettlementOutcome::Failed) => {
                self.stats.inc_settlements_failed();
                Ok(false)
            }
            Err(AppError::InsufficientInventory {
                required,
                available,
            }) => {
                tracing::warn!(
                    target: "engine",
                    round_id,
                    required,
                    available,
                    "Deliverable inventory short, retrying next tick"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn start_next_round(&self, round_id: u64) {
        let result = self.ledger.advance_round().await;
        match result.status {
            TxStatus::Confirmed => {
                tracing::info!(target: "engine", next_round = round_id + 1, "Next round started");
            }
            status => {
                // Not fatal: the next poll sees an inactive round and the
                // stuck-state path forces the advance through.
                tracing::warn!(
                    target: "engine",
                    round_id,
                    ?status,
                    "Round advance not confirmed, stuck-state remediation will retry"
                );
            }
        }
    }
}
