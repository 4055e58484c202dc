// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use alloy::signers::local::PrivateKeySigner;
use clap::Parser;
use dabanc_clearing::app::config::GlobalSettings;
use dabanc_clearing::app::logging::setup_logging;
use dabanc_clearing::common::metrics::spawn_metrics_server;
use dabanc_clearing::domain::error::AppError;
use dabanc_clearing::infrastructure::data::db::Database;
use dabanc_clearing::infrastructure::network::ledger::LedgerClient;
use dabanc_clearing::infrastructure::network::provider::ConnectionFactory;
use dabanc_clearing::services::clearing::engine::Engine;
use dabanc_clearing::services::clearing::stats::EngineStats;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about = "dabanc batch-auction clearing engine")]
struct Cli {
    /// Path to config file (default: config.{toml,yaml,...})
    #[arg(long)]
    config: Option<String>,

    /// Compute and log clearings without sending transactions
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Run a single poll/clear iteration and exit
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Metrics port (overrides config/env)
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let settings = GlobalSettings::load_with_path(cli.config.as_deref())?;
    setup_logging(if settings.debug { "debug" } else { "info" }, false);

    let database_url = settings.database_url();
    let db = Database::new(&database_url).await?;

    let signer = PrivateKeySigner::from_str(settings.wallet_key.trim())
        .map_err(|e| AppError::Config(format!("Invalid wallet key: {}", e)))?;
    tracing::info!(target: "config", operator = %signer.address(), "Operator wallet loaded");

    let provider = ConnectionFactory::http_with_signer(&settings.http_provider, signer)?;
    let ledger = LedgerClient::new(
        provider,
        settings.auction_address,
        settings.auction_token_address,
    );

    let stats = Arc::new(EngineStats::default());
    let metrics_port = cli.metrics_port.unwrap_or(settings.metrics_port);
    let _metrics_addr = spawn_metrics_server(metrics_port, stats.clone()).await;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received, requesting shutdown");
                shutdown.cancel();
            }
        });
    }

    let engine = Engine::new(
        ledger,
        db,
        stats,
        &settings,
        shutdown,
        cli.dry_run,
        cli.once,
    );
    engine.run().await
}
