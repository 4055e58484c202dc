// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::data_path::resolve_data_path;
use crate::domain::constants;
use crate::domain::error::AppError;
use alloy::primitives::Address;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct GlobalSettings {
    // General
    #[serde(default = "default_debug")]
    pub debug: bool,
    pub database_url: Option<String>,
    pub data_dir: Option<String>,

    // Connectivity
    pub http_provider: String,

    // Identity
    pub wallet_key: String,

    // Contracts
    pub auction_address: Address,
    pub auction_token_address: Address,
    /// Block the auction contract was deployed at; first-boot recovery scans
    /// forward from here when no checkpoint exists yet.
    #[serde(default)]
    pub deploy_block: u64,

    // Auction parameters
    #[serde(default = "default_round_duration_secs")]
    pub round_duration_secs: u64,
    #[serde(default = "default_settlement_buffer_secs")]
    pub settlement_buffer_secs: u64,
    #[serde(default = "default_supply_per_round")]
    pub supply_per_round: f64,
    #[serde(default = "default_per_user_cap_ratio")]
    pub per_user_cap_ratio: f64,
    #[serde(default = "default_min_clearing_price")]
    pub min_clearing_price: f64,
    #[serde(default = "default_max_clearing_price")]
    pub max_clearing_price: f64,

    // Loop timing
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_post_clearing_delay_ms")]
    pub post_clearing_delay_ms: u64,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: usize,

    // Recovery
    #[serde(default = "default_catchup_chunk_blocks")]
    pub catchup_chunk_blocks: u64,

    // Metrics
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

// Defaults
fn default_debug() -> bool {
    false
}
fn default_round_duration_secs() -> u64 {
    constants::DEFAULT_ROUND_DURATION_SECS
}
fn default_settlement_buffer_secs() -> u64 {
    constants::DEFAULT_SETTLEMENT_BUFFER_SECS
}
fn default_supply_per_round() -> f64 {
    constants::DEFAULT_SUPPLY_PER_ROUND
}
fn default_per_user_cap_ratio() -> f64 {
    constants::DEFAULT_PER_USER_CAP_RATIO
}
fn default_min_clearing_price() -> f64 {
    constants::DEFAULT_MIN_CLEARING_PRICE
}
fn default_max_clearing_price() -> f64 {
    constants::DEFAULT_MAX_CLEARING_PRICE
}
fn default_poll_interval_ms() -> u64 {
    constants::DEFAULT_POLL_INTERVAL_MS
}
fn default_post_clearing_delay_ms() -> u64 {
    constants::DEFAULT_POST_CLEARING_DELAY_MS
}
fn default_retry_base_delay_ms() -> u64 {
    constants::DEFAULT_RETRY_BASE_DELAY_MS
}
fn default_retry_max_attempts() -> usize {
    constants::DEFAULT_RETRY_MAX_ATTEMPTS
}
fn default_catchup_chunk_blocks() -> u64 {
    constants::DEFAULT_CATCHUP_CHUNK_BLOCKS
}
fn default_metrics_port() -> u16 {
    9100
}

impl GlobalSettings {
    pub fn load_with_path(path: Option<&str>) -> Result<Self, AppError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        if let Some(selected_path) = path {
            builder = builder.add_source(File::from(Path::new(selected_path)).required(true));
        } else {
            builder = builder.add_source(File::with_name("config").required(false));
        }
        // Deterministic precedence: CLI (in main) > env/.env > config file.
        builder = builder.add_source(Environment::default());

        let settings: GlobalSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load() -> Result<Self, AppError> {
        Self::load_with_path(None)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.wallet_key.trim().is_empty() {
            return Err(AppError::Config("WALLET_KEY is missing".to_string()));
        }
        if self.http_provider.trim().is_empty() {
            return Err(AppError::Config("HTTP_PROVIDER is missing".to_string()));
        }
        if self.supply_per_round <= 0.0 {
            return Err(AppError::Validation {
                field: "supply_per_round".into(),
                message: "must be positive".into(),
            });
        }
        if !(self.per_user_cap_ratio > 0.0 && self.per_user_cap_ratio <= 1.0) {
            return Err(AppError::Validation {
                field: "per_user_cap_ratio".into(),
                message: "must be in (0, 1]".into(),
            });
        }
        if self.min_clearing_price <= 0.0 || self.max_clearing_price < self.min_clearing_price {
            return Err(AppError::Validation {
                field: "min_clearing_price/max_clearing_price".into(),
                message: "band must be positive and ordered".into(),
            });
        }
        Ok(())
    }

    fn data_dir_value(&self) -> Option<String> {
        std::env::var("DATA_DIR")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                self.data_dir
                    .as_ref()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            })
    }

    /// SQLite connection URL. A bare `database_url` is taken as-is; otherwise
    /// the default orders database is resolved under the data directory.
    pub fn database_url(&self) -> String {
        if let Some(url) = self
            .database_url
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
        {
            return url;
        }
        let path = resolve_data_path("orders.db", self.data_dir_value().as_deref());
        format!("sqlite://{}?mode=rwc", path.display())
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    pub fn post_clearing_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.post_clearing_delay_ms)
    }

    pub fn retry_base_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retry_base_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_settings() -> GlobalSettings {
        GlobalSettings {
            debug: default_debug(),
            database_url: None,
            data_dir: None,
            http_provider: "http://localhost:8545".to_string(),
            wallet_key: "0x01".to_string(),
            auction_address: Address::ZERO,
            auction_token_address: Address::ZERO,
            deploy_block: 0,
            round_duration_secs: default_round_duration_secs(),
            settlement_buffer_secs: default_settlement_buffer_secs(),
            supply_per_round: default_supply_per_round(),
            per_user_cap_ratio: default_per_user_cap_ratio(),
            min_clearing_price: default_min_clearing_price(),
            max_clearing_price: default_max_clearing_price(),
            poll_interval_ms: default_poll_interval_ms(),
            post_clearing_delay_ms: default_post_clearing_delay_ms(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_attempts: default_retry_max_attempts(),
            catchup_chunk_blocks: default_catchup_chunk_blocks(),
            metrics_port: default_metrics_port(),
        }
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(base_settings().validate().is_ok());
    }

    #[test]
    fn validate_rejects_cap_ratio_out_of_range() {
        let mut settings = base_settings();
        settings.per_user_cap_ratio = 0.0;
        assert!(settings.validate().is_err());
        settings.per_user_cap_ratio = 1.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_price_band() {
        let mut settings = base_settings();
        settings.min_clearing_price = 10.0;
        settings.max_clearing_price = 1.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn explicit_database_url_wins_over_data_dir() {
        let mut settings = base_settings();
        settings.database_url = Some("sqlite::memory:".to_string());
        settings.data_dir = Some("/var/lib/dabanc".to_string());
        assert_eq!(settings.database_url(), "sqlite::memory:");
    }
}
