//! fdw-sim-node — synthetic body-worn node(s).
//!
//! Emits telemetry frames toward the coordinator at a fixed rate with a
//! sinusoidal pose sweep per player, and logs alert ON/OFF transitions
//! decoded from the datagrams the coordinator sends back. With `--send-pos`
//! the node also reports a slow circular walk as its real position; with
//! `--gps` it attaches a fixed GPS fix, which upgrades the frames to v2.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tokio::net::UdpSocket;
use tracing::{info, warn};

use fdw_proto::{decode_alert, encode_telemetry, PacketError, TelemetryPacket};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "fdw-sim-node", about = "Simulate friendly direction warning node(s)")]
struct Args {
    /// Comma-separated player ids
    #[arg(long, default_value = "1,2")]
    player_ids: String,
    /// Coordinator UDP address
    #[arg(long, default_value = "127.0.0.1:9999")]
    server: String,
    /// Base local UDP port; node i binds base + i
    #[arg(long, default_value = "12000")]
    local_port_base: u16,
    /// Telemetry send rate
    #[arg(long, default_value = "20.0")]
    rate_hz: f64,
    /// Report synthetic circular positions (pos_quality 80)
    #[arg(long)]
    send_pos: bool,
    /// Attach a fixed GPS fix (forces v2 frames)
    #[arg(long)]
    gps: bool,
    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

// ── Node ──────────────────────────────────────────────────────────────────────

struct SimNode {
    player_id: u8,
    server: String,
    send_pos: bool,
    gps: bool,
    rate_hz: f64,
    yaw_phase: f64,
}

impl SimNode {
    fn new(player_id: u8, args: &Args) -> Self {
        Self {
            player_id,
            server: args.server.clone(),
            send_pos: args.send_pos,
            gps: args.gps,
            rate_hz: args.rate_hz,
            yaw_phase: (player_id % 7) as f64 * 0.4,
        }
    }

    fn pose(&self, t: f64) -> (f64, f64, f64) {
        let yaw = 80.0 * (0.35 * t + self.yaw_phase).sin();
        let pitch = 6.0 * (0.21 * t + self.yaw_phase + 0.3).sin();
        let roll = 4.0 * (0.27 * t + self.yaw_phase + 0.6).cos();
        (yaw, pitch, roll)
    }

    fn position_cm(&self, t: f64) -> (i32, i32, u8) {
        if !self.send_pos {
            return (0, 0, 0);
        }
        let id = self.player_id as f64;
        let center_x = 12.0 + (id - 1.0) * 8.0;
        let center_y = 8.0 + (id - 1.0) * 4.0;
        let radius = 3.0 + (self.player_id % 3) as f64;
        let omega = 0.08 + 0.01 * (self.player_id % 5) as f64;
        let x = center_x + radius * (omega * t).cos();
        let y = center_y + radius * (omega * t).sin();
        (
            (x * 100.0).round() as i32,
            (y * 100.0).round() as i32,
            80,
        )
    }

    fn telemetry(&self, t: f64, seq: u16) -> TelemetryPacket {
        let (yaw, pitch, roll) = self.pose(t);
        let (pos_x_cm, pos_y_cm, pos_quality) = self.position_cm(t);
        let mut pkt = TelemetryPacket {
            player_id: self.player_id,
            seq,
            timestamp_ms: (t * 1000.0) as u32,
            yaw_deg: yaw,
            pitch_deg: pitch,
            roll_deg: roll,
            quality: 85,
            pos_x_cm,
            pos_y_cm,
            pos_quality,
            battery_mv: 3700,
            flags: 0,
            ..TelemetryPacket::default()
        };
        if self.gps {
            pkt.gps_lat_deg = Some(52.3702 + self.player_id as f64 * 1e-5);
            pkt.gps_lon_deg = Some(4.8952);
            pkt.gps_alt_m = Some(2.0);
            pkt.gps_quality = 60;
        }
        pkt
    }

    async fn run(self, socket: Arc<UdpSocket>) {
        let mut seq: u16 = 0;
        let mut last_alert_on = false;
        let mut recv_buf = [0u8; 64];
        let started = Instant::now();
        let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / self.rate_hz));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let t = started.elapsed().as_secs_f64();
                    let frame = encode_telemetry(&self.telemetry(t, seq));
                    if let Err(err) = socket.send_to(&frame, self.server.as_str()).await {
                        warn!("P{} send failed: {err}", self.player_id);
                    }
                    seq = seq.wrapping_add(1);
                }
                result = socket.recv_from(&mut recv_buf) => {
                    let Ok((len, _)) = result else { continue };
                    match decode_alert(&recv_buf[..len]) {
                        Ok(alert) if alert.player_id == self.player_id => {
                            if alert.alert_on != last_alert_on {
                                info!(
                                    "P{} alert {} intensity={} hold_ms={}",
                                    self.player_id,
                                    if alert.alert_on { "ON" } else { "OFF" },
                                    alert.intensity,
                                    alert.hold_ms,
                                );
                                last_alert_on = alert.alert_on;
                            }
                        }
                        Ok(_) => {}
                        Err(PacketError::BadType { .. }) => {}
                        Err(err) => warn!("P{} bad alert frame: {err}", self.player_id),
                    }
                }
            }
        }
    }
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!("fdw_sim_node={}", args.log_level))
            }),
        )
        .init();

    let player_ids: Vec<u8> = args
        .player_ids
        .split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect();
    anyhow::ensure!(!player_ids.is_empty(), "no valid player ids in --player-ids");

    info!("starting sim nodes for players {player_ids:?} -> {}", args.server);

    let mut tasks = Vec::new();
    for (idx, &player_id) in player_ids.iter().enumerate() {
        let local_port = args.local_port_base + idx as u16;
        let socket = UdpSocket::bind(("0.0.0.0", local_port))
            .await
            .with_context(|| format!("binding local UDP port {local_port}"))?;
        info!("P{player_id} local UDP ready on port {local_port}");
        let node = SimNode::new(player_id, &args);
        tasks.push(tokio::spawn(node.run(Arc::new(socket))));
    }

    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}
