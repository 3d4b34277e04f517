//! fdw-server — friendly direction warning coordinator.
//!
//! Body-worn nodes stream orientation (and optionally position) telemetry
//! over UDP. The coordinator fuses that with a synthetic world simulation,
//! evaluates every player's forward warning cone against every other player,
//! answers nodes with alert datagrams, and streams full world state to
//! operator dashboards over WebSocket.

mod config;
mod coordinator;
mod handlers;
mod logic;
mod state;
mod world_sim;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::info;

use config::CoordinatorConfig;
use coordinator::{
    alert_loop, broadcast_loop, now_ms, simulation_loop, udp_recv_loop, CoreState,
    EVENT_CHANNEL_CAPACITY,
};
use handlers::AppState;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "fdw-server", about = "Friendly direction warning coordinator")]
struct Args {
    /// Bind host for both HTTP and UDP
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// HTTP and WebSocket port
    #[arg(long, default_value = "8080")]
    http_port: u16,
    /// UDP telemetry port
    #[arg(long, default_value = "9999")]
    udp_port: u16,
    /// Log level (trace/debug/info/warn/error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "fdw_server={},tower_http=warn",
                    args.log_level
                ))
            }),
        )
        .init();

    info!(
        "🎯 FDW coordinator v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    // Socket-bind failure is the only fatal error in the design.
    let udp_addr = format!("{}:{}", args.host, args.udp_port);
    let socket = Arc::new(
        UdpSocket::bind(&udp_addr)
            .await
            .with_context(|| format!("binding UDP telemetry socket on {udp_addr}"))?,
    );
    info!("📡 UDP telemetry on {udp_addr}");

    let core: coordinator::SharedCore =
        Arc::new(RwLock::new(CoreState::new(CoordinatorConfig::default())));
    let (events_tx, _) = broadcast::channel::<String>(EVENT_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let tasks = vec![
        tokio::spawn(simulation_loop(core.clone(), shutdown_rx.clone())),
        tokio::spawn(alert_loop(core.clone(), socket.clone(), shutdown_rx.clone())),
        tokio::spawn(broadcast_loop(
            core.clone(),
            events_tx.clone(),
            shutdown_rx.clone(),
        )),
        tokio::spawn(udp_recv_loop(core.clone(), socket.clone(), shutdown_rx)),
    ];

    let app = handlers::build_router(AppState {
        core,
        events: events_tx,
        started_ms: now_ms(),
    });

    let http_addr = format!("{}:{}", args.host, args.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("binding HTTP listener on {http_addr}"))?;
    info!("🚀 Dashboard on http://{http_addr} (ws at /ws)");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("HTTP server")?;

    // Stop the periodic loops and wait for them to finish their tick.
    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }
    info!("coordinator stopped");

    Ok(())
}
