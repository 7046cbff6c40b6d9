//! Position Sink
//!
//! Clients simulate their own movement and report where they ended up. The
//! [`TrustPolicy`] decides what the server does with those reports: record
//! them as-is (the default), or reject displacements faster than a player
//! could plausibly move.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::config::WorldConfig;
use crate::core::vec2::Vec2;
use crate::game::state::{PlayerId, WorldState};

/// How the server treats reported coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum TrustPolicy {
    /// Store whatever the client reports (clamped to the map).
    /// Clients can teleport; there is no authority on movement.
    #[default]
    ClientAuthoritative,
    /// Reject reports that moved farther than `max_speed` (units per second)
    /// allows since the previous accepted report, plus `slack` units.
    ServerValidated {
        /// Highest plausible speed in units per second
        max_speed: f32,
        /// Fixed allowance for jitter and clock skew
        slack: f32,
    },
}

/// Position report rejections.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PositionError {
    /// Unknown player.
    #[error("Player has not joined")]
    NotJoined,

    /// NaN or infinite coordinates.
    #[error("Position is not a finite coordinate")]
    NonFinite,

    /// Moved too far for the elapsed time.
    #[error("Moved {distance:.1} units, at most {allowed:.1} allowed")]
    Implausible {
        /// Distance reported
        distance: f32,
        /// Distance permitted
        allowed: f32,
    },
}

/// Record a reported position. Returns the stored (clamped) position.
pub fn report_position(
    state: &mut WorldState,
    config: &WorldConfig,
    player_id: PlayerId,
    reported: Vec2,
    now: DateTime<Utc>,
) -> Result<Vec2, PositionError> {
    if !reported.is_finite() {
        return Err(PositionError::NonFinite);
    }
    let player = state.players.get_mut(&player_id).ok_or(PositionError::NotJoined)?;

    let mut position = config.map.clamp(reported);
    position.y = position.y.min(config.map.water_line_y);

    if let TrustPolicy::ServerValidated { max_speed, slack } = config.trust {
        let since = player.last_position_at.unwrap_or(player.last_active);
        let elapsed = ((now - since).num_milliseconds().max(0) as f32) / 1000.0;
        let allowed = max_speed * elapsed + slack;
        let distance = player.position.distance(position);
        if distance > allowed {
            return Err(PositionError::Implausible { distance, allowed });
        }
    }

    player.position = position;
    player.last_position_at = Some(now);
    player.touch(now);
    Ok(position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Player;
    use crate::game::zone::ZoneIndex;
    use chrono::Duration;

    fn setup(trust: TrustPolicy) -> (WorldConfig, WorldState, PlayerId, DateTime<Utc>) {
        let config = WorldConfig { trust, ..WorldConfig::default() };
        let zones = ZoneIndex::new(&config.zones, &config.map);
        let now = Utc::now();
        let mut state = WorldState::new(&config, &zones, now);
        let pid = PlayerId::new([1; 16]);
        state.players.insert(pid, Player::new(pid, "Ada".into(), &config, now));
        (config, state, pid, now)
    }

    #[test]
    fn test_client_authoritative_accepts_teleport() {
        let (config, mut state, pid, now) = setup(TrustPolicy::ClientAuthoritative);
        let stored = report_position(&mut state, &config, pid, Vec2::new(100.0, 100.0), now).unwrap();
        assert_eq!(stored, Vec2::new(100.0, 100.0));
        assert_eq!(state.players[&pid].last_position_at, Some(now));
    }

    #[test]
    fn test_clamps_to_map_and_shore() {
        let (config, mut state, pid, now) = setup(TrustPolicy::ClientAuthoritative);
        let stored = report_position(&mut state, &config, pid, Vec2::new(-50.0, 2950.0), now).unwrap();
        assert_eq!(stored, Vec2::new(0.0, config.map.water_line_y));
    }

    #[test]
    fn test_rejects_nan() {
        let (config, mut state, pid, now) = setup(TrustPolicy::ClientAuthoritative);
        let before = state.players[&pid].position;
        let err = report_position(&mut state, &config, pid, Vec2::new(f32::NAN, 1.0), now).unwrap_err();
        assert_eq!(err, PositionError::NonFinite);
        assert_eq!(state.players[&pid].position, before);
    }

    #[test]
    fn test_unknown_player() {
        let (config, mut state, _, now) = setup(TrustPolicy::ClientAuthoritative);
        let err = report_position(&mut state, &config, PlayerId::new([9; 16]), Vec2::ZERO, now);
        assert_eq!(err, Err(PositionError::NotJoined));
    }

    #[test]
    fn test_server_validated_limits_speed() {
        let trust = TrustPolicy::ServerValidated { max_speed: 200.0, slack: 10.0 };
        let (config, mut state, pid, now) = setup(trust);
        let start = state.players[&pid].position;

        // Half a second allows 110 units
        let later = now + Duration::milliseconds(500);
        let near = start + Vec2::new(100.0, 0.0);
        assert!(report_position(&mut state, &config, pid, near, later).is_ok());

        let later = later + Duration::milliseconds(500);
        let far = near + Vec2::new(300.0, 0.0);
        let err = report_position(&mut state, &config, pid, far, later).unwrap_err();
        assert!(matches!(err, PositionError::Implausible { .. }));
        assert_eq!(state.players[&pid].position, near);
    }
}
