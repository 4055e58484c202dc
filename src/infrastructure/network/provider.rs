// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::error::AppError;
use alloy::network::{Ethereum, EthereumWallet};
use alloy::providers::{DynProvider, Provider, ProviderBuilder, RootProvider};
use alloy::signers::local::PrivateKeySigner;
use url::Url;

pub type HttpProvider = RootProvider<Ethereum>;
pub type LedgerProvider = DynProvider<Ethereum>;

pub struct ConnectionFactory;

impl ConnectionFactory {
    pub fn http(rpc_url: &str) -> Result<HttpProvider, AppError> {
        let url =
            Url::parse(rpc_url).map_err(|e| AppError::Config(format!("Invalid RPC URL: {}", e)))?;

        let provider = RootProvider::new_http(url);
        Ok(provider)
    }

    /// Provider with a local wallet filler attached, so settlement and
    /// round-advance calls are signed before submission. Signing itself is
    /// the signer collaborator's concern.
    pub fn http_with_signer(
        rpc_url: &str,
        signer: PrivateKeySigner,
    ) -> Result<LedgerProvider, AppError> {
        let url =
            Url::parse(rpc_url).map_err(|e| AppError::Config(format!("Invalid RPC URL: {}", e)))?;

        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new().wallet(wallet).connect_http(url);
        Ok(provider.erased())
    }
}
