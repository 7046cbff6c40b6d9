//! Client Movement Simulation
//!
//! Each client moves its own avatar at a fixed 60 Hz tick. Per tick:
//!
//! 1. Resolve the zone multiplier at the current position
//! 2. Scale the normalized intent by base, hunger and zone speed
//! 3. Clamp to the map, then to the water line
//! 4. Drop the whole step if the new box overlaps an obstacle
//!
//! The result is what the [`PositionReporter`](super::reporter::PositionReporter)
//! sends to the server.

use std::sync::Arc;

use crate::client::input::InputIntent;
use crate::config::{MovementConfig, WorldConfig};
use crate::core::vec2::Vec2;
use crate::game::collision::ObstacleSet;
use crate::game::zone::ZoneIndex;

/// Static world data a client moves through.
#[derive(Clone, Debug)]
pub struct Terrain {
    /// World config
    pub config: Arc<WorldConfig>,
    /// Zone lookup
    pub zones: ZoneIndex,
    /// Buildings and trees
    pub obstacles: ObstacleSet,
}

impl Terrain {
    /// Build zones and obstacles from the config.
    pub fn from_config(config: Arc<WorldConfig>) -> Self {
        let zones = ZoneIndex::new(&config.zones, &config.map);
        let obstacles = ObstacleSet::from_config(&config);
        Self { config, zones, obstacles }
    }

    /// Explicit parts.
    pub fn new(config: Arc<WorldConfig>, zones: ZoneIndex, obstacles: ObstacleSet) -> Self {
        Self { config, zones, obstacles }
    }
}

/// Speed factor from hunger: linear from `starving_multiplier` at 0 up to 1.0
/// at the slow threshold, flat above.
pub fn hunger_multiplier(hunger: u8, config: &MovementConfig) -> f32 {
    let threshold = config.hunger_slow_threshold;
    if threshold == 0 || hunger >= threshold {
        return 1.0;
    }
    let t = hunger as f32 / threshold as f32;
    config.starving_multiplier + (1.0 - config.starving_multiplier) * t
}

/// Units per tick after every multiplier, floored at `min_speed`.
pub fn effective_speed(hunger: u8, zone_multiplier: f32, config: &MovementConfig) -> f32 {
    let speed = config.base_speed * hunger_multiplier(hunger, config) * zone_multiplier;
    speed.max(config.min_speed)
}

/// Whether the avatar moved last tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MotionState {
    /// No net direction held.
    #[default]
    Idle,
    /// Moving.
    Moving,
}

/// Outcome of one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepResult {
    /// Position after the tick
    pub position: Vec2,
    /// Speed used (units per tick), zero when idle
    pub speed: f32,
    /// The step hit an obstacle and was dropped
    pub blocked: bool,
}

/// One avatar's local movement.
#[derive(Clone, Debug)]
pub struct MovementSimulator {
    terrain: Arc<Terrain>,
    position: Vec2,
    state: MotionState,
    tick: u64,
}

impl MovementSimulator {
    /// Start at a position.
    pub fn new(terrain: Arc<Terrain>, start: Vec2) -> Self {
        Self {
            terrain,
            position: start,
            state: MotionState::Idle,
            tick: 0,
        }
    }

    /// Current position.
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Idle or moving.
    pub fn state(&self) -> MotionState {
        self.state
    }

    /// Ticks simulated so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Move without simulating (server correction, respawn).
    pub fn teleport(&mut self, to: Vec2) {
        self.position = to;
        self.state = MotionState::Idle;
    }

    /// Advance one tick.
    pub fn step(&mut self, intent: InputIntent, hunger: u8) -> StepResult {
        self.tick += 1;
        let direction = intent.direction();
        if direction == Vec2::ZERO {
            self.state = MotionState::Idle;
            return StepResult { position: self.position, speed: 0.0, blocked: false };
        }
        self.state = MotionState::Moving;

        let config = &self.terrain.config;
        let zone_multiplier = self.terrain.zones.speed_multiplier(self.position);
        let speed = effective_speed(hunger, zone_multiplier, &config.movement);

        let mut target = config.map.clamp(self.position + direction * speed);
        target.y = target.y.min(config.map.water_line_y);

        let blocked = self
            .terrain
            .obstacles
            .blocks(target, config.movement.player_half_extent);
        if !blocked {
            self.position = target;
        }
        StepResult { position: self.position, speed, blocked }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZoneConfig;
    use crate::game::zone::{Shape, Zone, ZoneId, ZoneRegion, ZoneTheme};
    use proptest::prelude::*;

    fn open_terrain(config: WorldConfig) -> Arc<Terrain> {
        let zones = ZoneIndex::new(&config.zones, &config.map);
        Arc::new(Terrain::new(Arc::new(config), zones, ObstacleSet::default()))
    }

    fn two_zone_config() -> WorldConfig {
        let zone = |id, name: &str, speed_multiplier| Zone {
            id,
            name: name.to_string(),
            speed_multiplier,
            has_roads: false,
            theme: ZoneTheme::Grass,
        };
        let mut config = WorldConfig::default();
        config.zones = ZoneConfig {
            zones: vec![zone(ZoneId(1), "Fast", 1.0), zone(ZoneId(2), "Slow", 0.5)],
            regions: vec![ZoneRegion {
                zone: ZoneId(2),
                shape: Shape::Rect { min: Vec2::new(100.0, 0.0), max: Vec2::new(4000.0, 3000.0) },
            }],
            default_zone: ZoneId(1),
        };
        config
    }

    #[test]
    fn test_hunger_ramp() {
        let cfg = MovementConfig::default();
        assert_eq!(hunger_multiplier(100, &cfg), 1.0);
        assert_eq!(hunger_multiplier(30, &cfg), 1.0);
        assert_eq!(hunger_multiplier(0, &cfg), 0.5);
        assert!((hunger_multiplier(15, &cfg) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_speed_floor() {
        let cfg = MovementConfig::default();
        // 3.0 * 0.5 * 0.5 = 0.75, floored to 1.0
        assert_eq!(effective_speed(0, 0.5, &cfg), 1.0);
        assert!((effective_speed(100, 1.2, &cfg) - 3.6).abs() < 1e-5);
    }

    #[test]
    fn test_idle_without_intent() {
        let terrain = open_terrain(WorldConfig::default());
        let mut sim = MovementSimulator::new(terrain, Vec2::new(500.0, 500.0));
        let result = sim.step(InputIntent::none(), 100);
        assert_eq!(result.position, Vec2::new(500.0, 500.0));
        assert_eq!(sim.state(), MotionState::Idle);

        sim.step(InputIntent::from_bits(InputIntent::RIGHT), 100);
        assert_eq!(sim.state(), MotionState::Moving);
        sim.step(InputIntent::none(), 100);
        assert_eq!(sim.state(), MotionState::Idle);
    }

    #[test]
    fn test_zone_crossing_uses_new_multiplier_next_tick() {
        let terrain = open_terrain(two_zone_config());
        let mut sim = MovementSimulator::new(terrain, Vec2::new(99.0, 500.0));
        let right = InputIntent::from_bits(InputIntent::RIGHT);

        // Starts in the fast zone, ends inside the slow one
        let first = sim.step(right, 100);
        assert_eq!(first.speed, 3.0);
        assert_eq!(first.position, Vec2::new(102.0, 500.0));

        let second = sim.step(right, 100);
        assert_eq!(second.speed, 1.5);
        assert_eq!(second.position, Vec2::new(103.5, 500.0));
    }

    #[test]
    fn test_clamped_to_map_and_shore() {
        let config = WorldConfig::default();
        let water = config.map.water_line_y;
        let terrain = open_terrain(config);

        let mut sim = MovementSimulator::new(terrain.clone(), Vec2::new(1.0, 500.0));
        sim.step(InputIntent::from_bits(InputIntent::LEFT), 100);
        assert_eq!(sim.position().x, 0.0);

        let mut sim = MovementSimulator::new(terrain, Vec2::new(500.0, water - 1.0));
        for _ in 0..10 {
            sim.step(InputIntent::from_bits(InputIntent::DOWN), 100);
        }
        assert_eq!(sim.position().y, water);
    }

    #[test]
    fn test_obstacle_drops_whole_step() {
        let config = Arc::new(WorldConfig::default());
        let terrain = Arc::new(Terrain::from_config(config.clone()));
        let diner = &config.market.properties[1];
        let half = config.movement.player_half_extent;

        // Just left of the diner's west wall
        let start = Vec2::new(diner.position.x - half - 1.0, diner.position.y + 10.0);
        let mut sim = MovementSimulator::new(terrain, start);
        let result = sim.step(InputIntent::from_bits(InputIntent::RIGHT), 100);
        assert!(result.blocked);
        assert_eq!(sim.position(), start);

        // Moving away is fine
        let result = sim.step(InputIntent::from_bits(InputIntent::LEFT), 100);
        assert!(!result.blocked);
    }

    proptest! {
        #[test]
        fn prop_diagonal_matches_axis(hunger in 0u8..=100, dx in prop::bool::ANY, dy in prop::bool::ANY) {
            let terrain = open_terrain(WorldConfig::default());
            let start = Vec2::new(1500.0, 1100.0);

            let mut axis = MovementSimulator::new(terrain.clone(), start);
            let a = axis.step(InputIntent::from_bits(InputIntent::RIGHT), hunger);

            let diagonal_keys = InputIntent::from_keys(!dy, dy, !dx, dx);
            let mut diag = MovementSimulator::new(terrain, start);
            let d = diag.step(diagonal_keys, hunger);

            let axis_len = a.position.distance(start);
            let diag_len = d.position.distance(start);
            prop_assert!((axis_len - diag_len).abs() < 1e-3);
        }
    }
}
