// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::retry::RetryPolicy;
use crate::domain::auction::RoundState;
use crate::domain::error::AppError;
use crate::infrastructure::network::ledger::{LedgerClient, TxStatus};

/// Polls the ledger's round machine. Round-end decisions key off the
/// ledger's block clock; the local wall clock never participates, so clock
/// skew cannot trigger an early clearing the contract would reject.
pub struct RoundTracker {
    ledger: LedgerClient,
    duration_secs: u64,
    poll_retry: RetryPolicy,
    advance_retry: RetryPolicy,
}

impl RoundTracker {
    pub fn new(
        ledger: LedgerClient,
        duration_secs: u64,
        poll_retry: RetryPolicy,
        advance_retry: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            duration_secs,
            poll_retry,
            advance_retry,
        }
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    /// A transient read error surfaces only after the bounded retries are
    /// spent; the loop boundary then backs off instead of crashing.
    pub async fn poll_state(&self) -> Result<RoundState, AppError> {
        let ledger = self.ledger.clone();
        let duration_secs = self.duration_secs;
        self.poll_retry
            .run(move |_| {
                let ledger = ledger.clone();
                async move {
                    let round_id = ledger.current_round_id().await?;
                    let is_active = ledger.is_round_active().await?;
                    let last_clearing = ledger.last_clearing_time().await?;
                    let ledger_now = ledger.ledger_now().await?;
                    Ok(RoundState {
                        round_id,
                        is_active,
                        seconds_remaining: remaining_seconds(
                            ledger_now,
                            last_clearing,
                            duration_secs,
                        ),
                    })
                }
            })
            .await
    }

    /// Stuck-state remediation: the ledger reports no active round outside a
    /// clearing transition (typically after a restart mid-settlement), so
    /// force the next round open. The retry here is short on purpose; the
    /// engine loop re-enters every tick, which is what makes remediation
    /// unbounded overall without livelocking on a round someone else already
    /// advanced.
    pub async fn force_advance(&self) -> Result<(), AppError> {
        let ledger = self.ledger.clone();
        self.advance_retry
            .run(move |attempt| {
                let ledger = ledger.clone();
                async move {
                    tracing::warn!(
                        target: "lifecycle",
                        attempt,
                        "Round inactive outside clearing transition, forcing advance"
                    );
                    let result = ledger.advance_round().await;
                    match result.status {
                        TxStatus::Confirmed => Ok(()),
                        status => Err(AppError::Ledger {
                            call: "startNextRound".into(),
                            reason: format!("forced advance not confirmed: {status:?}"),
                        }),
                    }
                }
            })
            .await
    }
}

/// `duration - (ledger_now - last_clearing)`, negative once the window has
/// elapsed. A last-clearing timestamp in the "future" (reorg, lagging node)
/// conservatively reads as a full window.
pub fn remaining_seconds(ledger_now: u64, last_clearing: u64, duration_secs: u64) -> i64 {
    duration_secs as i64 - ledger_now.saturating_sub(last_clearing) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_within_the_window() {
        assert_eq!(remaining_seconds(1_000_120, 1_000_000, 300), 180);
    }

    #[test]
    fn goes_negative_once_the_window_elapses() {
        assert_eq!(remaining_seconds(1_000_350, 1_000_000, 300), -50);
    }

    #[test]
    fn future_last_clearing_reads_as_full_window() {
        assert_eq!(remaining_seconds(1_000_000, 1_000_060, 300), 300);
    }
}
