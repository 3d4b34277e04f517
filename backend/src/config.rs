//! Coordinator configuration: the full set of live-tunable options.
//!
//! Dashboards patch any subset of fields through `set_config` control
//! messages; every value is clamped to its documented range on the way in,
//! unknown keys and wrongly-typed values are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Boundary behavior ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryBehavior {
    Bounce,
    Wrap,
}

// ── Config record ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub arena_width_m: f64,
    pub arena_height_m: f64,

    /// Alert evaluation rate
    pub tick_hz: f64,
    /// Dashboard broadcast rate
    pub ws_hz: f64,
    /// World simulation rate
    pub world_update_hz: f64,

    pub max_range_m: f64,
    pub cone_half_angle_deg: f64,
    /// Minimum orientation quality for a player to act as an alert source
    pub quality_threshold: u8,
    /// Minimum pos_quality for a reported position to be trusted over the sim
    pub pos_quality_threshold: u8,
    pub offline_timeout_ms: u64,

    pub alert_hold_ms: u64,

    pub use_sim_positions: bool,
    pub sim_speed_mps: f64,
    pub boundary_behavior: BoundaryBehavior,
    pub sim_noise: f64,
    pub sim_paused: bool,
    /// Keep addr-less players online with a synthetic packet rate
    pub sim_players_emulate_real: bool,

    pub default_player_ids: Vec<u8>,
    pub trail_seconds: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            arena_width_m: 50.0,
            arena_height_m: 30.0,
            tick_hz: 20.0,
            ws_hz: 10.0,
            world_update_hz: 10.0,
            max_range_m: 15.0,
            cone_half_angle_deg: 6.0,
            quality_threshold: 35,
            pos_quality_threshold: 50,
            offline_timeout_ms: 2000,
            alert_hold_ms: 250,
            use_sim_positions: true,
            sim_speed_mps: 0.4,
            boundary_behavior: BoundaryBehavior::Bounce,
            sim_noise: 0.35,
            sim_paused: false,
            sim_players_emulate_real: false,
            default_player_ids: vec![1, 2],
            trail_seconds: 8.0,
        }
    }
}

impl CoordinatorConfig {
    /// Apply a `set_config` values object. Recognized keys are clamped to
    /// their ranges; everything else is silently ignored.
    pub fn apply_updates(&mut self, values: &Value) {
        let Some(map) = values.as_object() else {
            return;
        };

        if let Some(v) = map.get("arena_width_m").and_then(Value::as_f64) {
            self.arena_width_m = v.clamp(5.0, 1000.0);
        }
        if let Some(v) = map.get("arena_height_m").and_then(Value::as_f64) {
            self.arena_height_m = v.clamp(5.0, 1000.0);
        }
        if let Some(v) = map.get("tick_hz").and_then(Value::as_f64) {
            if v > 0.0 {
                self.tick_hz = v;
            }
        }
        if let Some(v) = map.get("ws_hz").and_then(Value::as_f64) {
            if v > 0.0 {
                self.ws_hz = v;
            }
        }
        if let Some(v) = map.get("world_update_hz").and_then(Value::as_f64) {
            if v > 0.1 {
                self.world_update_hz = v;
            }
        }
        if let Some(v) = map.get("max_range_m").and_then(Value::as_f64) {
            self.max_range_m = v.clamp(1.0, 200.0);
        }
        if let Some(v) = map.get("cone_half_angle_deg").and_then(Value::as_f64) {
            self.cone_half_angle_deg = v.clamp(1.0, 90.0);
        }
        if let Some(v) = map.get("quality_threshold").and_then(Value::as_f64) {
            self.quality_threshold = v.clamp(0.0, 100.0) as u8;
        }
        if let Some(v) = map.get("pos_quality_threshold").and_then(Value::as_f64) {
            self.pos_quality_threshold = v.clamp(0.0, 100.0) as u8;
        }
        if let Some(v) = map.get("offline_timeout_ms").and_then(Value::as_f64) {
            self.offline_timeout_ms = v.max(0.0) as u64;
        }
        if let Some(v) = map.get("alert_hold_ms").and_then(Value::as_f64) {
            self.alert_hold_ms = v.max(0.0) as u64;
        }
        if let Some(v) = map.get("use_sim_positions").and_then(Value::as_bool) {
            self.use_sim_positions = v;
        }
        if let Some(v) = map.get("sim_speed_mps").and_then(Value::as_f64) {
            self.sim_speed_mps = v.clamp(0.0, 5.0);
        }
        if let Some(v) = map.get("boundary_behavior").and_then(Value::as_str) {
            match v {
                "bounce" => self.boundary_behavior = BoundaryBehavior::Bounce,
                "wrap" => self.boundary_behavior = BoundaryBehavior::Wrap,
                _ => {}
            }
        }
        if let Some(v) = map.get("sim_noise").and_then(Value::as_f64) {
            self.sim_noise = v.max(0.0);
        }
        if let Some(v) = map.get("sim_paused").and_then(Value::as_bool) {
            self.sim_paused = v;
        }
        if let Some(v) = map.get("sim_players_emulate_real").and_then(Value::as_bool) {
            self.sim_players_emulate_real = v;
        }
        if let Some(arr) = map.get("default_player_ids").and_then(Value::as_array) {
            self.default_player_ids = arr
                .iter()
                .filter_map(Value::as_u64)
                .filter(|&id| (1..=255).contains(&id))
                .map(|id| id as u8)
                .collect();
        }
        if let Some(v) = map.get("trail_seconds").and_then(Value::as_f64) {
            self.trail_seconds = v.max(0.0);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
