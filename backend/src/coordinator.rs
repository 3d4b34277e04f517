//! Match coordinator: owns the config, registry, and world simulator behind
//! one shared lock and runs the periodic machinery around them.
//!
//! Three decoupled loops plus the UDP receive path:
//!   1. Simulation loop: advances the random walk at world_update_hz and
//!      refreshes liveness flags
//!   2. Alert loop: evaluates every source's forward cone at tick_hz, drives
//!      the hysteresis latches, answers each peer with an alert datagram
//!   3. Broadcast loop: serializes one world snapshot at ws_hz and fans it
//!      out to dashboard sessions
//!
//! Each loop measures its own work time and sleeps the remainder of the
//! period, so a slow tick does not accumulate late wake-ups. All loops watch
//! a shutdown signal; state mutations happen synchronously under the lock,
//! so cancellation between ticks cannot leave the registry half-updated.
//! Outbound UDP is fire-and-forget and datagram sends happen after the lock
//! is released.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::{debug, info, warn};

use fdw_proto::{decode_telemetry, encode_alert, AlertPacket};

use crate::config::CoordinatorConfig;
use crate::logic::evaluate_targets;
use crate::state::PlayerRegistry;
use crate::world_sim::WorldSimulator;

// ── Shared state ──────────────────────────────────────────────────────────────

pub type SharedCore = Arc<RwLock<CoreState>>;

/// Capacity of the dashboard fan-out channel; slow sessions that lag past
/// this many frames get dropped by their own forwarding task.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Clone, Default)]
pub struct RecordingState {
    pub active: bool,
    pub session_id: Option<String>,
}

impl RecordingState {
    /// Synthetic file listing for the stub recording endpoints. No I/O
    /// happens anywhere near these paths.
    pub fn session_files(session_id: &str) -> Vec<String> {
        vec![
            format!("/tmp/aar/{session_id}/world_state.jsonl"),
            format!("/tmp/aar/{session_id}/events.jsonl"),
        ]
    }
}

pub struct CoreState {
    pub config: CoordinatorConfig,
    pub world: WorldSimulator,
    pub registry: PlayerRegistry,
    pub recording: RecordingState,
}

impl CoreState {
    pub fn new(config: CoordinatorConfig) -> Self {
        let mut world = WorldSimulator::new(&config);
        let mut registry = PlayerRegistry::new();
        for &player_id in &config.default_player_ids {
            registry.ensure_player(&mut world, player_id);
        }
        Self {
            config,
            world,
            registry,
            recording: RecordingState::default(),
        }
    }

    // ── UDP ingest ────────────────────────────────────────────────────────────

    /// Decode and fuse one inbound datagram. Malformed frames are logged
    /// with the peer address and dropped; they never propagate.
    pub fn ingest_datagram(&mut self, data: &[u8], addr: SocketAddr, now_ms: u64) {
        let pkt = match decode_telemetry(data) {
            Ok(pkt) => pkt,
            Err(err) => {
                warn!("drop packet from {addr}: {err}");
                return;
            }
        };
        self.registry
            .ingest_telemetry(&mut self.world, &pkt, addr, now_ms);
    }

    // ── Simulation tick ───────────────────────────────────────────────────────

    pub fn run_simulation_tick(&mut self, dt_s: f64, now_ms: u64) {
        self.world.configure(&self.config);
        self.world.set_paused(self.config.sim_paused);
        self.world.step(dt_s);
        self.registry.update_online_flags(&self.config, now_ms);
    }

    // ── Alert tick ────────────────────────────────────────────────────────────

    /// Evaluate every source against every other player, advance the
    /// hysteresis latches, and return the alert datagrams to transmit.
    pub fn run_alert_tick(&mut self, now_ms: u64) -> Vec<(SocketAddr, Vec<u8>)> {
        let logic_players = self
            .registry
            .build_logic_players(&self.config, &mut self.world);
        let hold_ms = self.config.alert_hold_ms.min(u16::MAX as u64) as u16;
        let mut outbound = Vec::new();

        for src in &logic_players {
            let eligible = src.position.is_some()
                && src.online
                && src.quality >= self.config.quality_threshold;

            let (inside_on, inside_off, intensity) = if eligible {
                let src_pos = src.position.unwrap_or_default();
                let targets: Vec<(f64, f64)> = logic_players
                    .iter()
                    .filter(|other| other.player_id != src.player_id)
                    .filter_map(|other| other.position)
                    .collect();
                let eval = evaluate_targets(
                    src_pos,
                    src.yaw_deg,
                    &targets,
                    self.config.max_range_m,
                    self.config.cone_half_angle_deg,
                );
                (eval.inside_on, eval.inside_off, eval.best_intensity)
            } else {
                // Ineligible sources still tick so the latch relaxes.
                (false, false, 0)
            };

            let changed = self.registry.update_alert_hysteresis(
                &self.config,
                src.player_id,
                now_ms,
                inside_on,
                inside_off,
                intensity,
            );

            let Some(player) = self.registry.player(src.player_id) else {
                continue;
            };
            if changed {
                debug!(
                    "P{} alert {} intensity={}",
                    player.player_id,
                    if player.alert_on { "ON" } else { "OFF" },
                    player.alert_intensity,
                );
            }
            if let Some(addr) = player.addr {
                let frame = encode_alert(&AlertPacket {
                    player_id: player.player_id,
                    alert_on: player.alert_on,
                    intensity: player.alert_intensity,
                    hold_ms,
                });
                outbound.push((addr, frame));
            }
        }

        outbound
    }

    // ── Control plane ─────────────────────────────────────────────────────────

    pub fn config_message(&self) -> Value {
        json!({
            "type": "config",
            "config": serde_json::to_value(&self.config).unwrap_or(Value::Null),
        })
    }

    pub fn world_state_message(&mut self, now_ms: u64) -> Value {
        self.registry
            .world_state_message(&self.config, &mut self.world, now_ms)
    }

    pub fn apply_set_config(&mut self, values: &Value) {
        self.config.apply_updates(values);
        self.world.configure(&self.config);
    }

    /// Run one named dashboard action. Returns false for unknown names.
    pub fn apply_action(&mut self, name: &str, now_ms: u64) -> bool {
        match name {
            "randomize_positions" => self.world.randomize_positions(),
            "reset_world" => self.world.reset(),
            "pause_sim" => {
                self.config.sim_paused = true;
                self.world.set_paused(true);
            }
            "resume_sim" => {
                self.config.sim_paused = false;
                self.world.set_paused(false);
            }
            "add_sim_player" => match self.registry.add_sim_player(&mut self.world) {
                Some(player_id) => info!("added sim player {player_id}"),
                None => warn!("no free player id to add"),
            },
            "remove_sim_player" => match self.registry.remove_sim_player(&mut self.world) {
                Some(player_id) => info!("removed sim player {player_id}"),
                None => warn!("no removable sim player"),
            },
            "start_recording" => {
                let session_id = format!("REC-{now_ms}");
                info!("recording started: {session_id} (stub, no I/O)");
                self.recording.active = true;
                self.recording.session_id = Some(session_id);
            }
            "stop_recording" => {
                info!("recording stopped");
                self.recording.active = false;
            }
            _ => return false,
        }
        true
    }
}

// ── Control message dispatch ──────────────────────────────────────────────────

/// Handle one JSON text frame from a dashboard session. Config changes
/// rebroadcast the config; actions rebroadcast config and world state once.
pub async fn handle_control_message(
    core: &SharedCore,
    events: &broadcast::Sender<String>,
    raw: &str,
) {
    let payload: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => {
            warn!("bad control JSON payload");
            return;
        }
    };

    match payload.get("type").and_then(Value::as_str) {
        Some("set_config") => {
            let values = payload.get("values").cloned().unwrap_or(json!({}));
            let config_msg = {
                let mut core = core.write().await;
                core.apply_set_config(&values);
                core.config_message()
            };
            let _ = events.send(config_msg.to_string());
        }
        Some("action") => {
            let name = payload.get("name").and_then(Value::as_str).unwrap_or("");
            let (config_msg, world_msg) = {
                let mut core = core.write().await;
                if !core.apply_action(name, now_ms()) {
                    warn!("unknown action: {name}");
                }
                (core.config_message(), core.world_state_message(now_ms()))
            };
            let _ = events.send(config_msg.to_string());
            let _ = events.send(world_msg.to_string());
        }
        other => warn!("unknown control message: {other:?}"),
    }
}

// ── Periodic loops ────────────────────────────────────────────────────────────

fn remaining(period_s: f64, elapsed: Duration) -> Duration {
    Duration::from_secs_f64((period_s - elapsed.as_secs_f64()).max(0.0))
}

pub async fn simulation_loop(core: SharedCore, mut shutdown: watch::Receiver<bool>) {
    let mut last = Instant::now();
    loop {
        let started = Instant::now();
        let dt_s = started.duration_since(last).as_secs_f64();
        last = started;

        let period_s = {
            let mut core = core.write().await;
            core.run_simulation_tick(dt_s, now_ms());
            1.0 / core.config.world_update_hz
        };

        tokio::select! {
            _ = tokio::time::sleep(remaining(period_s, started.elapsed())) => {}
            _ = shutdown.changed() => break,
        }
    }
    debug!("simulation loop stopped");
}

pub async fn alert_loop(
    core: SharedCore,
    socket: Arc<UdpSocket>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let started = Instant::now();

        let (outbound, period_s) = {
            let mut core = core.write().await;
            (core.run_alert_tick(now_ms()), 1.0 / core.config.tick_hz)
        };
        for (addr, frame) in outbound {
            let _ = socket.send_to(&frame, addr).await;
        }

        tokio::select! {
            _ = tokio::time::sleep(remaining(period_s, started.elapsed())) => {}
            _ = shutdown.changed() => break,
        }
    }
    debug!("alert loop stopped");
}

pub async fn broadcast_loop(
    core: SharedCore,
    events: broadcast::Sender<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let started = Instant::now();

        let period_s = {
            if events.receiver_count() > 0 {
                let mut core = core.write().await;
                let msg = core.world_state_message(now_ms());
                let _ = events.send(msg.to_string());
                1.0 / core.config.ws_hz
            } else {
                1.0 / core.read().await.config.ws_hz
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(remaining(period_s, started.elapsed())) => {}
            _ = shutdown.changed() => break,
        }
    }
    debug!("broadcast loop stopped");
}

pub async fn udp_recv_loop(
    core: SharedCore,
    socket: Arc<UdpSocket>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; 2048];
    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, addr)) => {
                        let mut core = core.write().await;
                        core.ingest_datagram(&buf[..len], addr, now_ms());
                    }
                    Err(err) => {
                        // Transient recv errors never take the server down.
                        warn!("UDP recv error: {err}");
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("UDP receive loop stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use fdw_proto::{decode_alert, encode_telemetry, TelemetryPacket};

    fn core_with_real_players() -> CoreState {
        let config = CoordinatorConfig {
            default_player_ids: vec![],
            ..CoordinatorConfig::default()
        };
        CoreState::new(config)
    }

    fn peer(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn pose_packet(player_id: u8, seq: u16, x_m: f64, y_m: f64, yaw_deg: f64) -> Vec<u8> {
        encode_telemetry(&TelemetryPacket {
            player_id,
            seq,
            yaw_deg,
            quality: 90,
            pos_x_cm: (x_m * 100.0).round() as i32,
            pos_y_cm: (y_m * 100.0).round() as i32,
            pos_quality: 80,
            battery_mv: 3700,
            ..TelemetryPacket::default()
        })
    }

    fn alert_for(outbound: &[(SocketAddr, Vec<u8>)], addr: SocketAddr) -> fdw_proto::AlertPacket {
        let frame = &outbound.iter().find(|(a, _)| *a == addr).unwrap().1;
        decode_alert(frame).unwrap()
    }

    #[test]
    fn facing_players_both_alert() {
        let mut core = core_with_real_players();
        core.ingest_datagram(&pose_packet(1, 1, 0.0, 0.0, 0.0), peer(1001), 1_000);
        core.ingest_datagram(&pose_packet(2, 1, 5.0, 0.0, 180.0), peer(1002), 1_000);

        let outbound = core.run_alert_tick(1_000);
        assert_eq!(outbound.len(), 2);

        let a1 = alert_for(&outbound, peer(1001));
        let a2 = alert_for(&outbound, peer(1002));
        assert!(a1.alert_on && a2.alert_on);
        assert!(a1.intensity >= 40 && a2.intensity >= 40);
        assert_eq!(a1.hold_ms, 250);
    }

    #[test]
    fn leaving_off_margin_releases_despite_hold() {
        let mut core = core_with_real_players();
        core.ingest_datagram(&pose_packet(1, 1, 0.0, 0.0, 0.0), peer(1001), 1_000);
        core.ingest_datagram(&pose_packet(2, 1, 5.0, 0.0, 180.0), peer(1002), 1_000);
        core.run_alert_tick(1_000);
        assert!(core.registry.player(1).unwrap().alert_on);

        // Target jumps far away.
        core.ingest_datagram(&pose_packet(2, 2, 100.0, 0.0, 180.0), peer(1002), 1_020);

        // Out of the off margin entirely -> released immediately despite the
        // hold window.
        let outbound = core.run_alert_tick(1_050);
        let a1 = alert_for(&outbound, peer(1001));
        assert!(!a1.alert_on);
        assert_eq!(a1.intensity, 0);
    }

    #[test]
    fn hold_latches_inside_off_margin() {
        let mut core = core_with_real_players();
        core.ingest_datagram(&pose_packet(1, 1, 0.0, 0.0, 0.0), peer(1001), 1_000);
        core.ingest_datagram(&pose_packet(2, 1, 5.0, 0.0, 180.0), peer(1002), 1_000);
        core.run_alert_tick(1_000);

        // Target slides just past max range but stays inside the 1.2x
        // margin: held at >= 64 until the hold expires.
        core.ingest_datagram(&pose_packet(2, 2, 16.0, 0.0, 180.0), peer(1002), 1_020);

        let outbound = core.run_alert_tick(1_100);
        let a1 = alert_for(&outbound, peer(1001));
        assert!(a1.alert_on);
        assert!(a1.intensity >= 64);

        let outbound = core.run_alert_tick(1_400);
        let a1 = alert_for(&outbound, peer(1001));
        assert!(!a1.alert_on);
    }

    #[test]
    fn low_quality_source_never_alerts_but_still_receives() {
        let mut core = core_with_real_players();
        let mut frame = TelemetryPacket {
            player_id: 1,
            seq: 1,
            quality: 10, // below quality_threshold = 35
            pos_x_cm: 0,
            pos_y_cm: 0,
            pos_quality: 80,
            ..TelemetryPacket::default()
        };
        core.ingest_datagram(&encode_telemetry(&frame), peer(1001), 1_000);
        frame.player_id = 2;
        frame.quality = 90;
        frame.pos_x_cm = 500;
        core.ingest_datagram(&encode_telemetry(&frame), peer(1002), 1_000);

        let outbound = core.run_alert_tick(1_000);
        let a1 = alert_for(&outbound, peer(1001));
        assert!(!a1.alert_on);
    }

    #[test]
    fn synthetic_players_produce_no_datagrams() {
        let mut core = core_with_real_players();
        core.registry.add_sim_player(&mut core.world);
        core.registry.add_sim_player(&mut core.world);
        let outbound = core.run_alert_tick(1_000);
        assert!(outbound.is_empty());
    }

    #[test]
    fn malformed_datagrams_are_dropped() {
        let mut core = core_with_real_players();
        core.ingest_datagram(b"garbage", peer(1001), 1_000);
        core.ingest_datagram(&[], peer(1001), 1_000);
        assert!(core.registry.players().is_empty());
    }

    #[test]
    fn recording_actions_toggle_the_stub() {
        let mut core = core_with_real_players();
        assert!(core.apply_action("start_recording", 42_000));
        assert!(core.recording.active);
        assert_eq!(core.recording.session_id.as_deref(), Some("REC-42000"));
        assert!(core.apply_action("stop_recording", 43_000));
        assert!(!core.recording.active);
        // Session id survives for the stop response.
        assert!(core.recording.session_id.is_some());
    }

    #[test]
    fn unknown_action_reports_false() {
        let mut core = core_with_real_players();
        assert!(!core.apply_action("self_destruct", 1_000));
    }

    #[test]
    fn default_players_exist_in_registry_and_world() {
        let core = CoreState::new(CoordinatorConfig::default());
        assert!(core.registry.player(1).is_some());
        assert!(core.registry.player(2).is_some());
        assert!(core.world.players().contains_key(&1));
        assert!(core.world.players().contains_key(&2));
    }
}
