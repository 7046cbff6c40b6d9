//! Position Reporting
//!
//! Decides when a client sends its simulated position: never more often than
//! the report interval, and only when the position moved since the last send.

use std::time::{Duration, Instant};

use crate::core::vec2::Vec2;

/// Throttles outgoing position reports.
#[derive(Clone, Debug)]
pub struct PositionReporter {
    interval: Duration,
    last_sent: Option<(Instant, Vec2)>,
}

impl PositionReporter {
    /// Create a reporter with a minimum gap between reports.
    pub fn new(interval: Duration) -> Self {
        Self { interval, last_sent: None }
    }

    /// From the movement config's `report_interval_ms`.
    pub fn from_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    /// Returns the position to send, if a report is due.
    pub fn poll(&mut self, position: Vec2, now: Instant) -> Option<Vec2> {
        if let Some((at, sent)) = self.last_sent {
            if sent == position || now.duration_since(at) < self.interval {
                return None;
            }
        }
        self.last_sent = Some((now, position));
        Some(position)
    }

    /// Last position sent.
    pub fn last_sent(&self) -> Option<Vec2> {
        self.last_sent.map(|(_, p)| p)
    }

    /// Forget the last report so the next poll always sends (after a reconnect).
    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}
