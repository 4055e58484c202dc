// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>


use crate::services::clearing::stats::EngineStats;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

pub async fn spawn_metrics_server(port: u16, stats: Arc<EngineStats>) -> Option<SocketAddr> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::warn!("Metrics server failed to bind: {}", e);
            return None;
        }
    };

    let local = listener.local_addr().ok();
    if let Some(addr) = local {
        tracing::info!("Metrics server listening on {}", addr);
    }

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let body = render_metrics(&stats);
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                }
                Err(e) => {
                    tracing::warn!("Metrics accept error: {}", e);
                    continue;
                }
            }
        }
    });

    local
}

fn render_metrics(stats: &Arc<EngineStats>) -> String {
    format!(
        concat!(
            "# TYPE auction_bids_recovered counter\nauction_bids_recovered {}\n",
            "# TYPE auction_rounds_cleared counter\nauction_rounds_cleared {}\n",
            "# TYPE auction_settlements_failed counter\nauction_settlements_failed {}\n",
            "# TYPE auction_settlements_fallback counter\nauction_settlements_fallback {}\n",
            "# TYPE auction_price_clamps counter\nauction_price_clamps {}\n",
            "# TYPE auction_loop_errors counter\nauction_loop_errors {}\n"
        ),
        stats.bids_recovered(),
        stats.rounds_cleared(),
        stats.settlements_failed(),
        stats.settlements_fallback(),
        stats.price_clamps(),
        stats.loop_errors(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn metrics_endpoint_serves() {
        let stats = Arc::new(EngineStats::default());
        stats.inc_rounds_cleared();

        let addr = spawn_metrics_server(0, stats.clone())
            .await
            .expect("bind metrics");

        let body = reqwest::get(format!("http://{}", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(body.contains("auction_rounds_cleared 1"));
    }
}
