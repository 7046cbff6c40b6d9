//! Remote Player Smoothing
//!
//! Other players arrive as snapshot positions a few times a second. Rendered
//! positions chase the latest one exponentially and snap once close enough.

use std::collections::BTreeMap;

use crate::config::MovementConfig;
use crate::core::vec2::Vec2;
use crate::game::state::{PlayerId, WorldSnapshot};

/// Exponential chase toward an authoritative position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Smoother {
    current: Vec2,
    target: Vec2,
}

impl Smoother {
    /// Start at rest.
    pub fn new(at: Vec2) -> Self {
        Self { current: at, target: at }
    }

    /// Set a new authoritative position.
    pub fn set_target(&mut self, target: Vec2) {
        self.target = target;
    }

    /// Advance one frame. Returns the rendered position.
    pub fn update(&mut self, factor: f32, snap_epsilon: f32) -> Vec2 {
        if self.current.within(self.target, snap_epsilon) {
            self.current = self.target;
        } else {
            self.current = self.current.lerp(self.target, factor.clamp(0.0, 1.0));
        }
        self.current
    }

    /// Rendered position.
    pub fn current(&self) -> Vec2 {
        self.current
    }

    /// Authoritative position being chased.
    pub fn target(&self) -> Vec2 {
        self.target
    }
}

/// Smoothed positions of everyone but the local player.
#[derive(Clone, Debug, Default)]
pub struct RemotePlayers {
    local: Option<PlayerId>,
    players: BTreeMap<PlayerId, Smoother>,
}

impl RemotePlayers {
    /// Track everyone except `local`.
    pub fn new(local: PlayerId) -> Self {
        Self { local: Some(local), players: BTreeMap::new() }
    }

    /// Retarget from a snapshot. New players appear in place; players missing
    /// from the snapshot are dropped.
    pub fn apply_snapshot(&mut self, snapshot: &WorldSnapshot) {
        let local = self.local;
        self.players
            .retain(|id, _| snapshot.players.iter().any(|p| p.id == *id));

        for player in snapshot.players.iter().filter(|p| Some(p.id) != local) {
            self.players
                .entry(player.id)
                .and_modify(|s| s.set_target(player.position))
                .or_insert_with(|| Smoother::new(player.position));
        }
    }

    /// Advance every smoother one frame.
    pub fn update(&mut self, config: &MovementConfig) {
        for smoother in self.players.values_mut() {
            smoother.update(config.smoothing_factor, config.snap_epsilon);
        }
    }

    /// Rendered position of a player.
    pub fn position(&self, id: PlayerId) -> Option<Vec2> {
        self.players.get(&id).map(Smoother::current)
    }

    /// Number of tracked players.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Nobody else around.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::game::state::Player;
    use chrono::Utc;

    #[test]
    fn test_smoother_converges_and_snaps() {
        let mut s = Smoother::new(Vec2::ZERO);
        s.set_target(Vec2::new(100.0, 0.0));

        let first = s.update(0.2, 0.5);
        assert!((first.x - 20.0).abs() < 1e-4);

        for _ in 0..200 {
            s.update(0.2, 0.5);
        }
        assert_eq!(s.current(), s.target());
    }

    #[test]
    fn test_snapshot_tracking() {
        let config = WorldConfig::default();
        let now = Utc::now();
        let me = PlayerId::new([1; 16]);
        let other = PlayerId::new([2; 16]);

        let mut snapshot = WorldSnapshot::default();
        snapshot.players.push(Player::new(me, "me".into(), &config, now));
        snapshot.players.push(Player::new(other, "other".into(), &config, now));

        let mut remotes = RemotePlayers::new(me);
        remotes.apply_snapshot(&snapshot);
        assert_eq!(remotes.len(), 1);
        assert_eq!(remotes.position(other), Some(config.players.spawn_point));
        assert_eq!(remotes.position(me), None);

        snapshot.players[1].position = config.players.spawn_point + Vec2::new(50.0, 0.0);
        remotes.apply_snapshot(&snapshot);
        remotes.update(&config.movement);
        let rendered = remotes.position(other).unwrap();
        assert!(rendered.x > config.players.spawn_point.x);

        snapshot.players.truncate(1);
        remotes.apply_snapshot(&snapshot);
        assert!(remotes.is_empty());
    }
}
