//! Synthetic world: a bounded 2-D random walk for every registered player.
//!
//! Used whenever a node reports no position (or one below the trust
//! threshold) so the dashboard and the alert geometry always have something
//! to work with. Each player wanders with Gaussian heading noise, first-order
//! velocity smoothing, and either bouncing or wrapping at the arena edge.
//!
//! The simulator owns its RNG; construct it with a seed for reproducible
//! tests.

use std::collections::{HashMap, VecDeque};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::config::{BoundaryBehavior, CoordinatorConfig};

// ── Per-player state ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SimPlayer {
    pub player_id: u8,
    pub x_m: f64,
    pub y_m: f64,
    pub heading_rad: f64,
    pub vx_mps: f64,
    pub vy_mps: f64,
    /// Recent positions, oldest first, capped at
    /// `max(10, round(update_hz * trail_seconds))`
    pub trail: VecDeque<(f64, f64)>,
}

// ── Simulator ─────────────────────────────────────────────────────────────────

pub struct WorldSimulator {
    pub arena_width_m: f64,
    pub arena_height_m: f64,
    speed_mps: f64,
    update_hz: f64,
    boundary_behavior: BoundaryBehavior,
    steering_noise: f64,
    trail_seconds: f64,
    paused: bool,
    players: HashMap<u8, SimPlayer>,
    rng: StdRng,
}

impl WorldSimulator {
    pub fn new(config: &CoordinatorConfig) -> Self {
        Self::build(config, StdRng::from_entropy())
    }

    /// Deterministic variant for tests.
    pub fn seeded(config: &CoordinatorConfig, seed: u64) -> Self {
        Self::build(config, StdRng::seed_from_u64(seed))
    }

    fn build(config: &CoordinatorConfig, rng: StdRng) -> Self {
        Self {
            arena_width_m: config.arena_width_m,
            arena_height_m: config.arena_height_m,
            speed_mps: config.sim_speed_mps,
            update_hz: config.world_update_hz,
            boundary_behavior: config.boundary_behavior,
            steering_noise: config.sim_noise,
            trail_seconds: config.trail_seconds,
            paused: config.sim_paused,
            players: HashMap::new(),
            rng,
        }
    }

    /// Pull the live-tunable knobs out of the config. `world_update_hz`
    /// is only accepted above 0.1 Hz.
    pub fn configure(&mut self, config: &CoordinatorConfig) {
        self.arena_width_m = config.arena_width_m;
        self.arena_height_m = config.arena_height_m;
        self.speed_mps = config.sim_speed_mps.max(0.0);
        if config.world_update_hz > 0.1 {
            self.update_hz = config.world_update_hz;
        }
        self.boundary_behavior = config.boundary_behavior;
        self.steering_noise = config.sim_noise.max(0.0);
        self.trail_seconds = config.trail_seconds.max(0.0);
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn players(&self) -> &HashMap<u8, SimPlayer> {
        &self.players
    }

    fn trail_cap(&self) -> usize {
        ((self.update_hz * self.trail_seconds).round() as usize).max(10)
    }

    /// Create the slot if missing (uniform position, uniform heading, velocity
    /// along the heading) and return it. Idempotent.
    pub fn ensure_player(&mut self, player_id: u8) -> &SimPlayer {
        if !self.players.contains_key(&player_id) {
            let x = self.rng.gen_range(0.0..self.arena_width_m);
            let y = self.rng.gen_range(0.0..self.arena_height_m);
            let heading = self.rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI);
            let mut trail = VecDeque::new();
            trail.push_back((x, y));
            self.players.insert(
                player_id,
                SimPlayer {
                    player_id,
                    x_m: x,
                    y_m: y,
                    heading_rad: heading,
                    vx_mps: heading.cos() * self.speed_mps,
                    vy_mps: heading.sin() * self.speed_mps,
                    trail,
                },
            );
        }
        &self.players[&player_id]
    }

    pub fn remove_player(&mut self, player_id: u8) -> bool {
        self.players.remove(&player_id).is_some()
    }

    /// Re-sample position, heading, and velocity for every existing slot.
    pub fn randomize_positions(&mut self) {
        let (width, height, speed) = (self.arena_width_m, self.arena_height_m, self.speed_mps);
        let rng = &mut self.rng;
        for player in self.players.values_mut() {
            player.x_m = rng.gen_range(0.0..width);
            player.y_m = rng.gen_range(0.0..height);
            player.heading_rad = rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI);
            player.vx_mps = player.heading_rad.cos() * speed;
            player.vy_mps = player.heading_rad.sin() * speed;
            player.trail.clear();
            player.trail.push_back((player.x_m, player.y_m));
        }
    }

    /// Remove-then-recreate every known slot.
    pub fn reset(&mut self) {
        let ids: Vec<u8> = self.players.keys().copied().collect();
        self.players.clear();
        for player_id in ids {
            self.ensure_player(player_id);
        }
    }

    /// Advance the walk by `dt` seconds. No-op when paused or `dt <= 0`.
    pub fn step(&mut self, dt_s: f64) {
        if self.paused || dt_s <= 0.0 {
            return;
        }

        let noise = Normal::new(0.0, self.steering_noise).ok();
        let cap = self.trail_cap();
        let speed = self.speed_mps;
        let (width, height) = (self.arena_width_m, self.arena_height_m);
        let behavior = self.boundary_behavior;
        let rng = &mut self.rng;

        for player in self.players.values_mut() {
            let heading_noise = match noise {
                Some(n) => n.sample(rng) * dt_s.sqrt(),
                None => 0.0,
            };
            player.heading_rad = wrap_pi(player.heading_rad + heading_noise);

            let target_vx = player.heading_rad.cos() * speed;
            let target_vy = player.heading_rad.sin() * speed;

            let alpha = (2.5 * dt_s).min(1.0);
            player.vx_mps += (target_vx - player.vx_mps) * alpha;
            player.vy_mps += (target_vy - player.vy_mps) * alpha;

            player.x_m += player.vx_mps * dt_s;
            player.y_m += player.vy_mps * dt_s;

            match behavior {
                BoundaryBehavior::Wrap => {
                    player.x_m = player.x_m.rem_euclid(width);
                    player.y_m = player.y_m.rem_euclid(height);
                }
                BoundaryBehavior::Bounce => bounce(player, width, height),
            }

            player.trail.push_back((player.x_m, player.y_m));
            while player.trail.len() > cap {
                player.trail.pop_front();
            }
        }
    }
}

/// Clamp to the arena edge, flip the offending velocity component inward,
/// and re-derive the heading from the resulting velocity.
fn bounce(player: &mut SimPlayer, width: f64, height: f64) {
    if player.x_m < 0.0 {
        player.x_m = 0.0;
        player.vx_mps = player.vx_mps.abs();
    } else if player.x_m > width {
        player.x_m = width;
        player.vx_mps = -player.vx_mps.abs();
    }

    if player.y_m < 0.0 {
        player.y_m = 0.0;
        player.vy_mps = player.vy_mps.abs();
    } else if player.y_m > height {
        player.y_m = height;
        player.vy_mps = -player.vy_mps.abs();
    }

    player.heading_rad = player.vy_mps.atan2(player.vx_mps);
}

fn wrap_pi(mut angle: f64) -> f64 {
    while angle > std::f64::consts::PI {
        angle -= 2.0 * std::f64::consts::PI;
    }
    while angle < -std::f64::consts::PI {
        angle += 2.0 * std::f64::consts::PI;
    }
    angle
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sim_with(behavior: BoundaryBehavior, seed: u64) -> WorldSimulator {
        let config = CoordinatorConfig {
            arena_width_m: 20.0,
            arena_height_m: 12.0,
            sim_speed_mps: 2.0,
            boundary_behavior: behavior,
            ..CoordinatorConfig::default()
        };
        WorldSimulator::seeded(&config, seed)
    }

    #[test]
    fn ensure_is_idempotent() {
        let mut sim = sim_with(BoundaryBehavior::Bounce, 7);
        let first = {
            let p = sim.ensure_player(3);
            (p.x_m, p.y_m, p.heading_rad)
        };
        let second = {
            let p = sim.ensure_player(3);
            (p.x_m, p.y_m, p.heading_rad)
        };
        assert_eq!(first, second);
        assert_eq!(sim.players().len(), 1);
    }

    #[test]
    fn bounce_keeps_players_inside_closed_arena() {
        let mut sim = sim_with(BoundaryBehavior::Bounce, 42);
        for id in 1..=4 {
            sim.ensure_player(id);
        }
        for _ in 0..2000 {
            sim.step(0.1);
        }
        for player in sim.players().values() {
            assert!((0.0..=20.0).contains(&player.x_m), "x={}", player.x_m);
            assert!((0.0..=12.0).contains(&player.y_m), "y={}", player.y_m);
        }
    }

    #[test]
    fn wrap_keeps_players_inside_half_open_arena() {
        let mut sim = sim_with(BoundaryBehavior::Wrap, 42);
        for id in 1..=4 {
            sim.ensure_player(id);
        }
        for _ in 0..2000 {
            sim.step(0.1);
        }
        for player in sim.players().values() {
            assert!((0.0..20.0).contains(&player.x_m), "x={}", player.x_m);
            assert!((0.0..12.0).contains(&player.y_m), "y={}", player.y_m);
        }
    }

    #[test]
    fn paused_and_zero_dt_do_not_move() {
        let mut sim = sim_with(BoundaryBehavior::Bounce, 9);
        sim.ensure_player(1);
        let before = {
            let p = &sim.players()[&1];
            (p.x_m, p.y_m)
        };

        sim.step(0.0);
        sim.step(-1.0);
        sim.set_paused(true);
        sim.step(0.1);

        let p = &sim.players()[&1];
        assert_eq!((p.x_m, p.y_m), before);
    }

    #[test]
    fn trail_is_bounded() {
        let mut sim = sim_with(BoundaryBehavior::Bounce, 11);
        sim.ensure_player(1);
        for _ in 0..500 {
            sim.step(0.1);
        }
        // default config: 10 Hz * 8 s
        assert_eq!(sim.players()[&1].trail.len(), 80);
    }

    #[test]
    fn randomize_clears_trails_and_moves_players() {
        let mut sim = sim_with(BoundaryBehavior::Bounce, 13);
        sim.ensure_player(1);
        sim.ensure_player(2);
        for _ in 0..50 {
            sim.step(0.1);
        }
        sim.randomize_positions();
        for player in sim.players().values() {
            assert_eq!(player.trail.len(), 1);
        }
    }

    #[test]
    fn reset_recreates_all_ids() {
        let mut sim = sim_with(BoundaryBehavior::Bounce, 17);
        sim.ensure_player(1);
        sim.ensure_player(5);
        sim.reset();
        assert_eq!(sim.players().len(), 2);
        assert!(sim.players().contains_key(&1));
        assert!(sim.players().contains_key(&5));
    }

    #[test]
    fn remove_player_drops_the_slot() {
        let mut sim = sim_with(BoundaryBehavior::Bounce, 19);
        sim.ensure_player(1);
        assert!(sim.remove_player(1));
        assert!(!sim.remove_player(1));
        assert!(sim.players().is_empty());
    }
}
