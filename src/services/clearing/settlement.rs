// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::auction::Allocation;
use crate::domain::error::AppError;
use crate::infrastructure::data::db::Database;
use crate::infrastructure::network::ledger::{LedgerClient, TxStatus, to_wei};
use alloy::primitives::{Address, B256, U256};

#[derive(Debug)]
pub enum SettlementOutcome {
    /// Full settlement confirmed; bids are marked cleared.
    Confirmed { tx: B256 },
    /// Full call reverted; the simplified price-only fallback confirmed.
    /// Bids stay pending for out-of-band reconciliation.
    FallbackConfirmed { tx: B256 },
    /// Nothing landed. The round is retried from scratch next tick.
    Failed,
}

/// Wire-ready settlement lists: eligible allocations only, as the three
/// parallel arrays the contract consumes, plus the audit totals.
pub struct SettlementLists {
    pub users: Vec<Address>,
    pub unit_amounts: Vec<U256>,
    pub cost_amounts: Vec<U256>,
    pub total_raised: f64,
    pub winners: u64,
}

pub fn build_settlement_lists(allocations: &[Allocation]) -> Result<SettlementLists, AppError> {
    let mut users = Vec::new();
    let mut unit_amounts = Vec::new();
    let mut cost_amounts = Vec::new();
    let mut total_raised = 0.0;
    for allocation in allocations.iter().filter(|a| a.eligible) {
        users.push(allocation.user);
        unit_amounts.push(to_wei(allocation.units_allocated)?);
        cost_amounts.push(to_wei(allocation.cost_owed)?);
        total_raised += allocation.cost_owed;
    }
    let winners = users.len() as u64;
    Ok(SettlementLists {
        users,
        unit_amounts,
        cost_amounts,
        total_raised,
        winners,
    })
}

pub struct SettlementSubmitter {
    ledger: LedgerClient,
    db: Database,
}

impl SettlementSubmitter {
    pub fn new(ledger: LedgerClient, db: Database) -> Self {
        Self { ledger, db }
    }

    /// One atomic settlement attempt for the round. The inventory
    /// precondition is re-verified immediately before sending so a call
    /// guaranteed to revert never spends fees; a shortfall surfaces as a
    /// retryable error and no transaction goes out.
    pub async fn submit(
        &self,
        round_id: u64,
        supply: f64,
        clearing_price: f64,
        allocations: &[Allocation],
    ) -> Result<SettlementOutcome, AppError> {
        let inventory = self.ledger.deliverable_inventory().await?;
        if inventory < supply {
            return Err(AppError::InsufficientInventory {
                required: supply,
                available: inventory,
            });
        }

        let SettlementLists {
            users,
            unit_amounts,
            cost_amounts,
            total_raised,
            winners,
        } = build_settlement_lists(allocations)?;
        let price_wei = to_wei(clearing_price)?;
        tracing::info!(
            target: "settlement",
            round_id,
            clearing_price,
            winners,
            total_raised,
            "Submitting settlement"
        );

        let result = self
            .ledger
            .submit_settlement(price_wei, users, unit_amounts, cost_amounts)
            .await;

        match result.status {
            TxStatus::Confirmed => {
                let tx = result.hash.ok_or_else(|| AppError::Settlement {
                    round_id,
                    reason: "confirmed without a tx hash".into(),
                })?;
                self.commit_round(round_id, clearing_price, allocations, total_raised, winners, tx)
                    .await?;
                Ok(SettlementOutcome::Confirmed { tx })
            }
            TxStatus::TimedOut => {
                // The transaction may still land; resending anything now
                // (including the fallback) could double-settle. Leave the
                // round pending and let the next tick observe the outcome.
                tracing::warn!(target: "settlement", round_id, "Receipt timed out, round left pending");
                Ok(SettlementOutcome::Failed)
            }
            TxStatus::Reverted => {
                tracing::warn!(
                    target: "settlement",
                    round_id,
                    "Full settlement reverted, attempting simplified fallback"
                );
                let fallback = self.ledger.submit_settlement_simplified(price_wei).await;
                match (fallback.status, fallback.hash) {
                    (TxStatus::Confirmed, Some(tx)) => {
                        self.db
                            .record_round(
                                round_id,
                                clearing_price,
                                0.0,
                                0,
                                Some(&format!("{tx:#x}")),
                            )
                            .await?;
                        Ok(SettlementOutcome::FallbackConfirmed { tx })
                    }
                    _ => Ok(SettlementOutcome::Failed),
                }
            }
        }
    }

    /// Store-side commit after on-chain confirmation: per-bid allocation
    /// write-back, status flip, round history row.
    async fn commit_round(
        &self,
        round_id: u64,
        clearing_price: f64,
        allocations: &[Allocation],
        total_raised: f64,
        winners: u64,
        tx: B256,
    ) -> Result<(), AppError> {
        for allocation in allocations.iter().filter(|a| a.eligible) {
            self.db
                .record_bid_allocation(round_id, &allocation.source_tx_id, allocation.units_allocated)
                .await?;
        }
        let flipped = self.db.mark_round_cleared(round_id).await?;
        self.db
            .record_round(
                round_id,
                clearing_price,
                total_raised,
                winners,
                Some(&format!("{tx:#x}")),
            )
            .await?;
        tracing::info!(
            target: "settlement",
            round_id,
            tx = %tx,
            bids_cleared = flipped,
            "Round settled and store committed"
        );
        Ok(())
    }
}
