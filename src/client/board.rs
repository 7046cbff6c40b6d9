//! Job Board Watcher
//!
//! Clients ask the server for a refill when the board they see runs thin.
//! The server dedups concurrent requests; this just keeps one client from
//! asking on every snapshot.

use std::time::{Duration, Instant};

use crate::config::JobConfig;
use crate::game::state::{JobStatus, WorldSnapshot};

/// Client-side refill request throttle.
#[derive(Clone, Debug)]
pub struct BoardWatcher {
    min_available: usize,
    cooldown: Duration,
    last_request: Option<Instant>,
}

impl BoardWatcher {
    /// Use the board thresholds from the job config.
    pub fn new(config: &JobConfig) -> Self {
        Self {
            min_available: config.min_available,
            cooldown: Duration::from_millis(config.refill_cooldown_ms.max(0) as u64),
            last_request: None,
        }
    }

    /// Whether to send a refill request after seeing `snapshot`.
    pub fn should_request(&mut self, snapshot: &WorldSnapshot, now: Instant) -> bool {
        let available = snapshot
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Available)
            .count();
        if available >= self.min_available {
            return false;
        }
        if self
            .last_request
            .is_some_and(|at| now.duration_since(at) < self.cooldown)
        {
            return false;
        }
        self.last_request = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::game::world::World;

    #[tokio::test]
    async fn test_requests_when_thin_then_cools_down() {
        let world = World::new(WorldConfig::default()).unwrap();
        let mut watcher = BoardWatcher::new(&world.config().jobs);
        let t0 = Instant::now();

        let empty = world.snapshot_now().await;
        assert!(watcher.should_request(&empty, t0));
        assert!(!watcher.should_request(&empty, t0 + Duration::from_secs(1)));
        assert!(watcher.should_request(&empty, t0 + Duration::from_secs(11)));

        world.run_maintenance().await;
        let full = world.snapshot_now().await;
        assert!(!watcher.should_request(&full, t0 + Duration::from_secs(60)));
    }
}
