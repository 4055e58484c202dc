// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::auction::BidPlacedEvent;
use crate::domain::error::AppError;
use crate::infrastructure::network::provider::LedgerProvider;
use alloy::network::Ethereum;
use alloy::primitives::{Address, B256, U256};
use alloy::primitives::utils::{format_ether, parse_ether};
use alloy::providers::{PendingTransactionBuilder, Provider};
use alloy::rpc::types::{BlockNumberOrTag, Filter};
use alloy::sol;
use alloy::sol_types::SolEvent;
use std::time::Duration;

sol! {
    #[sol(rpc)]
    interface BatchAuction {
        function currentRoundId() external view returns (uint256);
        function isRoundActive() external view returns (bool);
        function lastClearingTime() external view returns (uint256);
        function ROUND_DURATION() external view returns (uint256);
        function userBalances(address user) external view returns (uint256);

        function executeClearing(
            uint256 clearingPrice,
            address[] calldata users,
            uint256[] calldata tokenAmounts,
            uint256[] calldata costAmounts
        ) external;

        function executeClearingSimplified(uint256 clearingPrice) external;

        function startNextRound() external;

        event BidPlaced(
            uint256 indexed roundId,
            address indexed user,
            uint256 amount,
            uint256 limitPrice
        );
    }

    #[sol(rpc)]
    interface ERC20 {
        function balanceOf(address owner) external view returns (uint256);
    }
}

const RECEIPT_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Confirmed,
    Reverted,
    TimedOut,
}

#[derive(Clone, Copy, Debug)]
pub struct TxResult {
    pub status: TxStatus,
    pub hash: Option<B256>,
}

/// Convert a quote/unit decimal into its 18-decimal wire representation.
/// Only the settlement boundary talks wei; everything upstream is f64.
pub fn to_wei(value: f64) -> Result<U256, AppError> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::Validation {
            field: "wei_amount".into(),
            message: format!("not representable on the wire: {value}"),
        });
    }
    parse_ether(&format!("{value:.18}")).map_err(|e| AppError::Validation {
        field: "wei_amount".into(),
        message: e.to_string(),
    })
}

pub fn from_wei(value: U256) -> f64 {
    format_ether(value).parse().unwrap_or(0.0)
}

/// Typed interface to the settlement ledger. The auction contract owns round
/// identity and the final clearing price; this client only reads state and
/// submits the calls the engine decides on.
#[derive(Clone)]
pub struct LedgerClient {
    provider: LedgerProvider,
    auction: Address,
    token: Address,
}

impl LedgerClient {
    pub fn new(provider: LedgerProvider, auction: Address, token: Address) -> Self {
        Self {
            provider,
            auction,
            token,
        }
    }

    pub fn auction_address(&self) -> Address {
        self.auction
    }

    fn contract(&self) -> BatchAuction::BatchAuctionInstance<LedgerProvider> {
        BatchAuction::new(self.auction, self.provider.clone())
    }

    pub async fn current_round_id(&self) -> Result<u64, AppError> {
        let id = self
            .contract()
            .currentRoundId()
            .call()
            .await
            .map_err(|e| ledger_err("currentRoundId", e))?;
        u64::try_from(id).map_err(|_| AppError::Ledger {
            call: "currentRoundId".into(),
            reason: format!("round id out of range: {id}"),
        })
    }

    pub async fn is_round_active(&self) -> Result<bool, AppError> {
        self.contract()
            .isRoundActive()
            .call()
            .await
            .map_err(|e| ledger_err("isRoundActive", e))
    }

    pub async fn last_clearing_time(&self) -> Result<u64, AppError> {
        let ts = self
            .contract()
            .lastClearingTime()
            .call()
            .await
            .map_err(|e| ledger_err("lastClearingTime", e))?;
        u64::try_from(ts).map_err(|_| AppError::Ledger {
            call: "lastClearingTime".into(),
            reason: format!("timestamp out of range: {ts}"),
        })
    }

    /// Protocol constant; read once at startup and cached by the caller.
    pub async fn round_duration_secs(&self) -> Result<u64, AppError> {
        let duration = self
            .contract()
            .ROUND_DURATION()
            .call()
            .await
            .map_err(|e| ledger_err("ROUND_DURATION", e))?;
        u64::try_from(duration).map_err(|_| AppError::Ledger {
            call: "ROUND_DURATION".into(),
            reason: format!("duration out of range: {duration}"),
        })
    }

    /// The ledger's own clock. Round-end decisions never use the local wall
    /// clock; block time is what the contract checks against.
    pub async fn ledger_now(&self) -> Result<u64, AppError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(|e| ledger_err("getBlock(latest)", e))?
            .ok_or_else(|| AppError::Ledger {
                call: "getBlock(latest)".into(),
                reason: "node returned no latest block".into(),
            })?;
        Ok(block.header.inner.timestamp)
    }

    pub async fn latest_block(&self) -> Result<u64, AppError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ledger_err("blockNumber", e))
    }

    /// Pre-deposited spendable balance used for solvency checks.
    pub async fn user_balance(&self, user: Address) -> Result<f64, AppError> {
        let balance = self
            .contract()
            .userBalances(user)
            .call()
            .await
            .map_err(|e| ledger_err("userBalances", e))?;
        Ok(from_wei(balance))
    }

    /// Auction tokens the contract can actually deliver this round.
    pub async fn deliverable_inventory(&self) -> Result<f64, AppError> {
        let token = ERC20::new(self.token, self.provider.clone());
        let balance = token
            .balanceOf(self.auction)
            .call()
            .await
            .map_err(|e| ledger_err("token.balanceOf", e))?;
        Ok(from_wei(balance))
    }

    /// One atomic settlement call for the whole round. Reverts as a whole on
    /// any internal constraint violation; partial settlement never happens.
    pub async fn submit_settlement(
        &self,
        clearing_price: U256,
        users: Vec<Address>,
        unit_amounts: Vec<U256>,
        cost_amounts: Vec<U256>,
    ) -> TxResult {
        let sent = self
            .contract()
            .executeClearing(clearing_price, users, unit_amounts, cost_amounts)
            .send()
            .await;
        confirm("executeClearing", sent).await
    }

    /// Degraded fallback: set only the clearing price with an empty
    /// allocation so the round machine still advances.
    pub async fn submit_settlement_simplified(&self, clearing_price: U256) -> TxResult {
        let sent = self
            .contract()
            .executeClearingSimplified(clearing_price)
            .send()
            .await;
        confirm("executeClearingSimplified", sent).await
    }

    pub async fn advance_round(&self) -> TxResult {
        let sent = self.contract().startNextRound().send().await;
        confirm("startNextRound", sent).await
    }

    /// BidPlaced logs for a block range, decoded at this boundary into the
    /// one strongly-typed event the rest of the engine consumes.
    pub async fn bid_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<BidPlacedEvent>, AppError> {
        let filter = Filter::new()
            .address(self.auction)
            .event_signature(BatchAuction::BidPlaced::SIGNATURE_HASH)
            .from_block(from_block)
            .to_block(to_block);
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| ledger_err("getLogs(BidPlaced)", e))?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            let decoded = match log.log_decode::<BatchAuction::BidPlaced>() {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::warn!(target: "recovery", error = %e, "Undecodable BidPlaced log, skipping");
                    continue;
                }
            };
            let Some(tx_hash) = log.transaction_hash else {
                tracing::warn!(target: "recovery", "BidPlaced log without tx hash, skipping");
                continue;
            };
            let data = decoded.inner.data;
            let round_id = match u64::try_from(data.roundId) {
                Ok(id) => id,
                Err(_) => {
                    tracing::warn!(target: "recovery", round = %data.roundId, "BidPlaced round id out of range, skipping");
                    continue;
                }
            };
            events.push(BidPlacedEvent {
                round_id,
                user: data.user,
                amount: from_wei(data.amount),
                limit_price: from_wei(data.limitPrice),
                tx_id: format!("{tx_hash:#x}"),
                block_number: log.block_number.unwrap_or(from_block),
                block_timestamp: log.block_timestamp.unwrap_or(0),
            });
        }
        Ok(events)
    }
}

fn ledger_err(call: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Ledger {
        call: call.to_string(),
        reason: e.to_string(),
    }
}

async fn confirm(
    call: &str,
    sent: Result<PendingTransactionBuilder<Ethereum>, alloy::contract::Error>,
) -> TxResult {
    let pending = match sent {
        Ok(pending) => pending,
        Err(e) => {
            tracing::warn!(target: "ledger", call, error = %e, "Transaction rejected on send");
            return TxResult {
                status: TxStatus::Reverted,
                hash: None,
            };
        }
    };
    let hash = *pending.tx_hash();
    match pending
        .with_timeout(Some(RECEIPT_TIMEOUT))
        .get_receipt()
        .await
    {
        Ok(receipt) if receipt.status() => TxResult {
            status: TxStatus::Confirmed,
            hash: Some(hash),
        },
        Ok(_) => {
            tracing::warn!(target: "ledger", call, tx = %hash, "Transaction reverted on-chain");
            TxResult {
                status: TxStatus::Reverted,
                hash: Some(hash),
            }
        }
        Err(e) => {
            tracing::warn!(target: "ledger", call, tx = %hash, error = %e, "Receipt wait gave up");
            TxResult {
                status: TxStatus::TimedOut,
                hash: Some(hash),
            }
        }
    }
}
