//! Player registry: the authoritative fused view of every known player.
//!
//! Integrates UDP telemetry (pose, quality, battery, GPS), synthetic
//! simulator positions, liveness timeouts, packet-rate and sequence-loss
//! statistics, and the per-player alert hysteresis latch. The coordinator
//! owns both the registry and the world simulator; registry operations that
//! need simulator slots borrow it explicitly, so there are no back-pointers.

use std::collections::HashMap;
use std::net::SocketAddr;

use serde_json::{json, Value};

use fdw_proto::TelemetryPacket;

use crate::config::CoordinatorConfig;
use crate::world_sim::WorldSimulator;

// ── Player state ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PlayerState {
    pub player_id: u8,
    pub seq: u16,
    pub timestamp_ms: u32,
    pub yaw_deg: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
    pub quality: u8,
    pub battery_mv: u16,
    pub flags: u8,

    /// Last wire-reported position, set whenever `pos_quality > 0`
    pub real_x_m: Option<f64>,
    pub real_y_m: Option<f64>,
    pub pos_quality: u8,
    pub gps_lat_deg: Option<f64>,
    pub gps_lon_deg: Option<f64>,
    pub gps_alt_m: Option<f64>,
    pub gps_quality: u8,

    pub last_seen_ms: Option<u64>,
    pub online: bool,
    pub connected_since_ms: Option<u64>,
    /// UDP peer of the last datagram; purely synthetic players have none
    pub addr: Option<SocketAddr>,
    pub packet_rate_hz: f64,
    pub seq_drop_count: u64,

    pub alert_on: bool,
    pub alert_intensity: u8,
    pub alert_hold_until_ms: u64,
}

impl PlayerState {
    fn new(player_id: u8) -> Self {
        Self {
            player_id,
            seq: 0,
            timestamp_ms: 0,
            yaw_deg: 0.0,
            pitch_deg: 0.0,
            roll_deg: 0.0,
            quality: 0,
            battery_mv: 0,
            flags: 0,
            real_x_m: None,
            real_y_m: None,
            pos_quality: 0,
            gps_lat_deg: None,
            gps_lon_deg: None,
            gps_alt_m: None,
            gps_quality: 0,
            last_seen_ms: None,
            online: false,
            connected_since_ms: None,
            addr: None,
            packet_rate_hz: 0.0,
            seq_drop_count: 0,
            alert_on: false,
            alert_intensity: 0,
            alert_hold_until_ms: 0,
        }
    }
}

/// Flattened per-player view consumed by the alert tick.
#[derive(Debug, Clone)]
pub struct LogicPlayer {
    pub player_id: u8,
    pub yaw_deg: f64,
    pub quality: u8,
    pub online: bool,
    /// Trusted real position, simulator fallback, or none at all
    pub position: Option<(f64, f64)>,
    pub addr: Option<SocketAddr>,
}

// ── Registry ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct PlayerRegistry {
    players: HashMap<u8, PlayerState>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn players(&self) -> &HashMap<u8, PlayerState> {
        &self.players
    }

    pub fn player(&self, player_id: u8) -> Option<&PlayerState> {
        self.players.get(&player_id)
    }

    pub fn online_count(&self) -> usize {
        self.players.values().filter(|p| p.online).count()
    }

    pub fn ensure_player(&mut self, world: &mut WorldSimulator, player_id: u8) -> &mut PlayerState {
        world.ensure_player(player_id);
        self.players
            .entry(player_id)
            .or_insert_with(|| PlayerState::new(player_id))
    }

    pub fn next_available_player_id(&self) -> Option<u8> {
        (1..=255).find(|id| !self.players.contains_key(id))
    }

    /// Register a synthetic player under the smallest unused id.
    pub fn add_sim_player(&mut self, world: &mut WorldSimulator) -> Option<u8> {
        let player_id = self.next_available_player_id()?;
        self.ensure_player(world, player_id);
        Some(player_id)
    }

    /// Drop the highest-id player that has no UDP peer. Players that have
    /// ever sent a datagram are never evicted this way.
    pub fn remove_sim_player(&mut self, world: &mut WorldSimulator) -> Option<u8> {
        let player_id = self
            .players
            .values()
            .filter(|p| p.addr.is_none())
            .map(|p| p.player_id)
            .max()?;
        self.players.remove(&player_id);
        world.remove_player(player_id);
        Some(player_id)
    }

    // ── Telemetry ingest ──────────────────────────────────────────────────────

    pub fn ingest_telemetry(
        &mut self,
        world: &mut WorldSimulator,
        pkt: &TelemetryPacket,
        addr: SocketAddr,
        now_ms: u64,
    ) {
        let player = self.ensure_player(world, pkt.player_id);
        let prev_seq = player.seq;
        let prev_seen_ms = player.last_seen_ms;
        let was_online = player.online;

        // Packet-rate EMA: first sample locks to the instant rate, after
        // that an 0.8/0.2 blend.
        if let Some(prev) = prev_seen_ms {
            let dt_ms = now_ms.saturating_sub(prev);
            if dt_ms > 0 {
                let instant_rate_hz = 1000.0 / dt_ms as f64;
                if player.packet_rate_hz <= 0.0 {
                    player.packet_rate_hz = instant_rate_hz;
                } else {
                    player.packet_rate_hz =
                        player.packet_rate_hz * 0.8 + instant_rate_hz * 0.2;
                }
            }
        }

        // Sequence-loss accounting on the wrapping u16 counter. Deltas in
        // the upper half are reorders or wrap artifacts, not losses.
        if prev_seen_ms.is_some() {
            let seq_delta = pkt.seq.wrapping_sub(prev_seq);
            if seq_delta > 1 && seq_delta < 0x8000 {
                player.seq_drop_count += (seq_delta - 1) as u64;
            }
        }

        player.seq = pkt.seq;
        player.timestamp_ms = pkt.timestamp_ms;
        player.yaw_deg = pkt.yaw_deg;
        player.pitch_deg = pkt.pitch_deg;
        player.roll_deg = pkt.roll_deg;
        player.quality = pkt.quality;
        player.battery_mv = pkt.battery_mv;
        player.flags = pkt.flags;
        player.pos_quality = pkt.pos_quality;
        player.gps_lat_deg = pkt.gps_lat_deg;
        player.gps_lon_deg = pkt.gps_lon_deg;
        player.gps_alt_m = pkt.gps_alt_m;
        player.gps_quality = pkt.gps_quality;
        player.last_seen_ms = Some(now_ms);
        player.online = true;
        if player.connected_since_ms.is_none() || !was_online {
            player.connected_since_ms = Some(now_ms);
        }
        player.addr = Some(addr);

        if pkt.pos_quality > 0 {
            player.real_x_m = Some(pkt.pos_x_cm as f64 / 100.0);
            player.real_y_m = Some(pkt.pos_y_cm as f64 / 100.0);
        }
    }

    // ── Liveness ──────────────────────────────────────────────────────────────

    pub fn update_online_flags(&mut self, config: &CoordinatorConfig, now_ms: u64) {
        let timeout = config.offline_timeout_ms;
        for player in self.players.values_mut() {
            let was_online = player.online;

            // Optional demo mode: addr-less players behave like a live node
            // reporting at the world update rate.
            if config.sim_players_emulate_real && player.addr.is_none() {
                player.last_seen_ms = Some(now_ms);
                player.online = true;
                if player.connected_since_ms.is_none() || !was_online {
                    player.connected_since_ms = Some(now_ms);
                }
                if config.world_update_hz > 0.0 {
                    player.packet_rate_hz = config.world_update_hz;
                }
                continue;
            }

            let Some(last_seen) = player.last_seen_ms else {
                player.online = false;
                player.connected_since_ms = None;
                continue;
            };
            player.online = now_ms.saturating_sub(last_seen) <= timeout;
            if was_online && !player.online {
                player.connected_since_ms = None;
            }
        }
    }

    // ── Position selection ────────────────────────────────────────────────────

    fn trusted_real_position(
        config: &CoordinatorConfig,
        player: &PlayerState,
    ) -> Option<(f64, f64)> {
        match (player.real_x_m, player.real_y_m) {
            (Some(x), Some(y)) if player.pos_quality >= config.pos_quality_threshold => {
                Some((x, y))
            }
            _ => None,
        }
    }

    /// Position surfaced to dashboards, tagged with its origin.
    pub fn display_position(
        &self,
        config: &CoordinatorConfig,
        world: &mut WorldSimulator,
        player_id: u8,
    ) -> ((f64, f64), &'static str) {
        if let Some(player) = self.players.get(&player_id) {
            if let Some(pos) = Self::trusted_real_position(config, player) {
                return (pos, "real");
            }
        }
        let sim = world.ensure_player(player_id);
        ((sim.x_m, sim.y_m), "sim")
    }

    /// Position fed to the alert geometry. `None` excludes the player from
    /// both the source and target lists.
    pub fn logic_position(
        &self,
        config: &CoordinatorConfig,
        world: &mut WorldSimulator,
        player_id: u8,
    ) -> Option<(f64, f64)> {
        let player = self.players.get(&player_id)?;
        if let Some(pos) = Self::trusted_real_position(config, player) {
            return Some(pos);
        }
        if config.use_sim_positions {
            let sim = world.ensure_player(player_id);
            return Some((sim.x_m, sim.y_m));
        }
        None
    }

    pub fn build_logic_players(
        &self,
        config: &CoordinatorConfig,
        world: &mut WorldSimulator,
    ) -> Vec<LogicPlayer> {
        let mut ids: Vec<u8> = self.players.keys().copied().collect();
        ids.sort_unstable();
        ids.iter()
            .map(|&player_id| {
                let player = &self.players[&player_id];
                LogicPlayer {
                    player_id,
                    yaw_deg: player.yaw_deg,
                    quality: player.quality,
                    online: player.online,
                    position: self.logic_position(config, world, player_id),
                    addr: player.addr,
                }
            })
            .collect()
    }

    // ── Alert hysteresis ──────────────────────────────────────────────────────

    /// Schmitt-style latch with a hold window. Entry requires `inside_on`;
    /// while latched, `inside_on` re-arms the hold, leaving the off-margin
    /// (or the hold expiring) releases, and a target lingering in the
    /// off-margin keeps the latch alive at intensity >= 64.
    /// Returns whether (on, intensity) changed.
    pub fn update_alert_hysteresis(
        &mut self,
        config: &CoordinatorConfig,
        player_id: u8,
        now_ms: u64,
        inside_on: bool,
        inside_off: bool,
        intensity: u8,
    ) -> bool {
        let Some(player) = self.players.get_mut(&player_id) else {
            return false;
        };
        let prev = (player.alert_on, player.alert_intensity);

        if player.alert_on {
            if inside_on {
                player.alert_hold_until_ms = now_ms + config.alert_hold_ms;
                player.alert_intensity = intensity;
            } else if !inside_off || now_ms >= player.alert_hold_until_ms {
                player.alert_on = false;
                player.alert_intensity = 0;
            } else {
                player.alert_intensity = player.alert_intensity.max(64);
            }
        } else if inside_on {
            player.alert_on = true;
            player.alert_intensity = intensity;
            player.alert_hold_until_ms = now_ms + config.alert_hold_ms;
        } else {
            player.alert_intensity = 0;
        }

        prev != (player.alert_on, player.alert_intensity)
    }

    // ── World snapshot ────────────────────────────────────────────────────────

    /// Full dashboard snapshot. Players are emitted in ascending id order;
    /// floats are rounded to stable precisions so the payload stays compact.
    pub fn world_state_message(
        &self,
        config: &CoordinatorConfig,
        world: &mut WorldSimulator,
        now_ms: u64,
    ) -> Value {
        let mut ids: Vec<u8> = self.players.keys().copied().collect();
        ids.sort_unstable();

        let mut players_payload = Vec::with_capacity(ids.len());
        for player_id in ids {
            let ((x_m, y_m), pos_source) = self.display_position(config, world, player_id);
            let player = &self.players[&player_id];
            let trail: Vec<Value> = world
                .ensure_player(player_id)
                .trail
                .iter()
                .map(|&(px, py)| json!([round3(px), round3(py)]))
                .collect();
            let last_seen_ms_ago = player.last_seen_ms.map(|t| now_ms.saturating_sub(t));
            let battery_v = if player.battery_mv > 0 {
                Some(round2(player.battery_mv as f64 / 1000.0))
            } else {
                None
            };

            players_payload.push(json!({
                "id": player_id,
                "x_m": round3(x_m),
                "y_m": round3(y_m),
                "yaw_deg": round2(player.yaw_deg),
                "pitch_deg": round2(player.pitch_deg),
                "roll_deg": round2(player.roll_deg),
                "quality": player.quality,
                "online": player.online,
                "alert": player.alert_on,
                "alert_intensity": player.alert_intensity,
                "pos_source": pos_source,
                "pos_quality": player.pos_quality,
                "gps_lat_deg": player.gps_lat_deg.map(round7),
                "gps_lon_deg": player.gps_lon_deg.map(round7),
                "gps_alt_m": player.gps_alt_m.map(round2),
                "gps_quality": player.gps_quality,
                "battery_mv": player.battery_mv,
                "battery_v": battery_v,
                "packet_rate_hz": round2(player.packet_rate_hz),
                "seq_drop_count": player.seq_drop_count,
                "connected_since_ms": player.connected_since_ms,
                "addr": player.addr.map(|a| a.to_string()),
                "trail": trail,
                "last_seen_ms_ago": last_seen_ms_ago,
            }));
        }

        json!({
            "type": "world_state",
            "ts_ms": now_ms,
            "server_version": env!("CARGO_PKG_VERSION"),
            "players": players_payload,
            "config": serde_json::to_value(config).unwrap_or(Value::Null),
            "arena": {
                "width_m": world.arena_width_m,
                "height_m": world.arena_height_m,
            },
        })
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

fn round7(v: f64) -> f64 {
    (v * 1e7).round() / 1e7
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CoordinatorConfig {
        CoordinatorConfig {
            default_player_ids: vec![],
            ..CoordinatorConfig::default()
        }
    }

    fn test_world(config: &CoordinatorConfig) -> WorldSimulator {
        WorldSimulator::seeded(config, 1234)
    }

    fn peer(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn telemetry(player_id: u8, seq: u16) -> TelemetryPacket {
        TelemetryPacket {
            player_id,
            seq,
            quality: 90,
            battery_mv: 3700,
            ..TelemetryPacket::default()
        }
    }

    #[test]
    fn liveness_timeout_and_reconnect_stamp() {
        let config = test_config();
        let mut world = test_world(&config);
        let mut registry = PlayerRegistry::new();

        registry.ingest_telemetry(&mut world, &telemetry(7, 1), peer(12007), 1_000);
        assert!(registry.player(7).unwrap().online);
        assert_eq!(registry.player(7).unwrap().connected_since_ms, Some(1_000));

        registry.update_online_flags(&config, 2_500);
        assert!(registry.player(7).unwrap().online);

        registry.update_online_flags(&config, 3_500);
        let player = registry.player(7).unwrap();
        assert!(!player.online);
        assert_eq!(player.connected_since_ms, None);

        // Next packet marks a fresh connection.
        registry.ingest_telemetry(&mut world, &telemetry(7, 2), peer(12007), 9_000);
        assert_eq!(registry.player(7).unwrap().connected_since_ms, Some(9_000));
    }

    #[test]
    fn sim_players_stay_offline_without_emulation() {
        let config = test_config();
        let mut world = test_world(&config);
        let mut registry = PlayerRegistry::new();

        let player_id = registry.add_sim_player(&mut world).unwrap();
        registry.update_online_flags(&config, 10_000);

        let player = registry.player(player_id).unwrap();
        assert!(!player.online);
        assert_eq!(player.last_seen_ms, None);
        assert_eq!(player.connected_since_ms, None);
    }

    #[test]
    fn emulated_sim_players_heartbeat() {
        let config = CoordinatorConfig {
            sim_players_emulate_real: true,
            world_update_hz: 12.5,
            ..test_config()
        };
        let mut world = test_world(&config);
        let mut registry = PlayerRegistry::new();

        let player_id = registry.add_sim_player(&mut world).unwrap();
        registry.update_online_flags(&config, 5_000);

        let player = registry.player(player_id).unwrap();
        assert!(player.online);
        assert_eq!(player.last_seen_ms, Some(5_000));
        assert_eq!(player.connected_since_ms, Some(5_000));
        assert_eq!(player.packet_rate_hz, 12.5);

        registry.update_online_flags(&config, 6_500);
        let player = registry.player(player_id).unwrap();
        assert_eq!(player.last_seen_ms, Some(6_500));
        assert_eq!(player.connected_since_ms, Some(5_000));
    }

    #[test]
    fn real_players_still_time_out_with_emulation_on() {
        let config = CoordinatorConfig {
            sim_players_emulate_real: true,
            ..test_config()
        };
        let mut world = test_world(&config);
        let mut registry = PlayerRegistry::new();

        registry.ingest_telemetry(&mut world, &telemetry(7, 1), peer(12007), 1_000);
        registry.update_online_flags(&config, 3_500);
        assert!(!registry.player(7).unwrap().online);
    }

    #[test]
    fn packet_rate_ema_converges() {
        let config = test_config();
        let mut world = test_world(&config);
        let mut registry = PlayerRegistry::new();

        registry.ingest_telemetry(&mut world, &telemetry(1, 1), peer(1), 1_000);
        assert_eq!(registry.player(1).unwrap().packet_rate_hz, 0.0);

        registry.ingest_telemetry(&mut world, &telemetry(1, 2), peer(1), 1_100);
        assert!((registry.player(1).unwrap().packet_rate_hz - 10.0).abs() < 1e-9);

        registry.ingest_telemetry(&mut world, &telemetry(1, 3), peer(1), 1_300);
        // 0.8 * 10 + 0.2 * 5
        assert!((registry.player(1).unwrap().packet_rate_hz - 9.0).abs() < 1e-9);
    }

    #[test]
    fn sequence_gaps_count_drops_but_reorders_do_not() {
        let config = test_config();
        let mut world = test_world(&config);
        let mut registry = PlayerRegistry::new();

        registry.ingest_telemetry(&mut world, &telemetry(1, 10), peer(1), 1_000);
        registry.ingest_telemetry(&mut world, &telemetry(1, 14), peer(1), 1_050);
        assert_eq!(registry.player(1).unwrap().seq_drop_count, 3);

        // Reorder: delta lands in the upper half, ignored.
        registry.ingest_telemetry(&mut world, &telemetry(1, 12), peer(1), 1_100);
        assert_eq!(registry.player(1).unwrap().seq_drop_count, 3);

        // Clean wrap: 65535 -> 0 is delta 1.
        registry.ingest_telemetry(&mut world, &telemetry(1, 65_535), peer(1), 1_150);
        registry.ingest_telemetry(&mut world, &telemetry(1, 0), peer(1), 1_200);
        assert_eq!(registry.player(1).unwrap().seq_drop_count, 3);
    }

    #[test]
    fn alert_hysteresis_latch_hold_and_release() {
        let config = test_config(); // alert_hold_ms = 250
        let mut world = test_world(&config);
        let mut registry = PlayerRegistry::new();
        registry.ensure_player(&mut world, 1);

        // OFF + inside_on -> ON at evaluator intensity.
        let changed = registry.update_alert_hysteresis(&config, 1, 1_000, true, true, 180);
        assert!(changed);
        let p = registry.player(1).unwrap();
        assert!(p.alert_on);
        assert_eq!(p.alert_intensity, 180);

        // Still inside: hold re-armed, intensity tracks the evaluator.
        registry.update_alert_hysteresis(&config, 1, 1_050, true, true, 120);
        assert_eq!(registry.player(1).unwrap().alert_intensity, 120);

        // Left the on-cone but still in the off margin, inside the hold
        // window: latched at >= 64.
        registry.update_alert_hysteresis(&config, 1, 1_100, false, true, 0);
        let p = registry.player(1).unwrap();
        assert!(p.alert_on);
        assert!(p.alert_intensity >= 64);

        // Hold expired: released.
        registry.update_alert_hysteresis(&config, 1, 1_400, false, true, 0);
        let p = registry.player(1).unwrap();
        assert!(!p.alert_on);
        assert_eq!(p.alert_intensity, 0);
    }

    #[test]
    fn leaving_off_margin_releases_immediately() {
        let config = test_config();
        let mut world = test_world(&config);
        let mut registry = PlayerRegistry::new();
        registry.ensure_player(&mut world, 1);

        registry.update_alert_hysteresis(&config, 1, 1_000, true, true, 200);
        // inside_off = false overrides the hold window.
        registry.update_alert_hysteresis(&config, 1, 1_010, false, false, 0);
        let p = registry.player(1).unwrap();
        assert!(!p.alert_on);
        assert_eq!(p.alert_intensity, 0);
    }

    #[test]
    fn add_sim_player_takes_smallest_free_id() {
        let config = test_config();
        let mut world = test_world(&config);
        let mut registry = PlayerRegistry::new();

        registry.ensure_player(&mut world, 1);
        registry.ensure_player(&mut world, 3);
        assert_eq!(registry.add_sim_player(&mut world), Some(2));
        assert_eq!(registry.add_sim_player(&mut world), Some(4));
    }

    #[test]
    fn remove_sim_player_never_evicts_a_real_peer() {
        let config = test_config();
        let mut world = test_world(&config);
        let mut registry = PlayerRegistry::new();

        registry.ingest_telemetry(&mut world, &telemetry(9, 1), peer(12009), 1_000);
        registry.ensure_player(&mut world, 2);
        registry.ensure_player(&mut world, 5);

        // Highest addr-less id goes first.
        assert_eq!(registry.remove_sim_player(&mut world), Some(5));
        assert_eq!(registry.remove_sim_player(&mut world), Some(2));
        // Only the real peer is left.
        assert_eq!(registry.remove_sim_player(&mut world), None);
        assert!(registry.player(9).is_some());
    }

    #[test]
    fn position_source_follows_pos_quality_threshold() {
        let config = test_config(); // pos_quality_threshold = 50
        let mut world = test_world(&config);
        let mut registry = PlayerRegistry::new();

        let mut pkt = telemetry(1, 1);
        pkt.pos_x_cm = 1_200;
        pkt.pos_y_cm = 800;
        pkt.pos_quality = 10;
        registry.ingest_telemetry(&mut world, &pkt, peer(1), 1_000);

        let (_, source) = registry.display_position(&config, &mut world, 1);
        assert_eq!(source, "sim");

        pkt.seq = 2;
        pkt.pos_quality = 60;
        registry.ingest_telemetry(&mut world, &pkt, peer(1), 1_100);
        let ((x, y), source) = registry.display_position(&config, &mut world, 1);
        assert_eq!(source, "real");
        assert_eq!((x, y), (12.0, 8.0));
    }

    #[test]
    fn logic_position_absent_without_sim_fallback() {
        let config = CoordinatorConfig {
            use_sim_positions: false,
            ..test_config()
        };
        let mut world = test_world(&config);
        let mut registry = PlayerRegistry::new();

        registry.ingest_telemetry(&mut world, &telemetry(1, 1), peer(1), 1_000);
        assert_eq!(registry.logic_position(&config, &mut world, 1), None);

        let mut pkt = telemetry(1, 2);
        pkt.pos_x_cm = 500;
        pkt.pos_y_cm = 0;
        pkt.pos_quality = 80;
        registry.ingest_telemetry(&mut world, &pkt, peer(1), 1_100);
        assert_eq!(
            registry.logic_position(&config, &mut world, 1),
            Some((5.0, 0.0))
        );
    }

    #[test]
    fn snapshot_orders_players_and_shapes_fields() {
        let config = test_config();
        let mut world = test_world(&config);
        let mut registry = PlayerRegistry::new();

        registry.ensure_player(&mut world, 9);
        registry.ensure_player(&mut world, 2);
        registry.ingest_telemetry(&mut world, &telemetry(5, 1), peer(12005), 1_000);

        let msg = registry.world_state_message(&config, &mut world, 1_250);
        assert_eq!(msg["type"], "world_state");
        assert_eq!(msg["ts_ms"], 1_250);
        assert_eq!(msg["arena"]["width_m"], 50.0);

        let players = msg["players"].as_array().unwrap();
        let ids: Vec<u64> = players.iter().map(|p| p["id"].as_u64().unwrap()).collect();
        assert_eq!(ids, vec![2, 5, 9]);

        let p5 = &players[1];
        assert_eq!(p5["addr"], "127.0.0.1:12005");
        assert_eq!(p5["battery_v"], 3.7);
        assert_eq!(p5["last_seen_ms_ago"], 250);
        assert_eq!(p5["pos_source"], "sim");
        assert_eq!(p5["gps_lat_deg"], Value::Null);

        // Synthetic players have no addr, battery, or last-seen.
        let p2 = &players[0];
        assert_eq!(p2["addr"], Value::Null);
        assert_eq!(p2["battery_v"], Value::Null);
        assert_eq!(p2["last_seen_ms_ago"], Value::Null);
        assert!(p2["trail"].as_array().is_some());
    }
}
