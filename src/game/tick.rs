//! World Maintenance Tick
//!
//! The periodic sweep the server runs on a fixed interval. One call is one
//! store transaction; each step works on whatever the previous one left.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::config::WorldConfig;
use crate::game::jobs::{refill_board, reclaim_stale_jobs, retire_completed_jobs};
use crate::game::resource::{expire_stale_tickets, regrow_trees};
use crate::game::state::{RefillSource, WorldState};
use crate::game::zone::ZoneIndex;

/// What a maintenance pass changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Trees whose stored stage advanced
    pub trees_grown: usize,
    /// Harvest tickets dropped
    pub tickets_expired: usize,
    /// Jobs taken back from idle holders
    pub jobs_reclaimed: usize,
    /// Jobs posted by the refill
    pub jobs_posted: usize,
    /// Completed jobs removed
    pub jobs_retired: usize,
    /// Players whose hunger dropped
    pub players_hungrier: usize,
}

impl MaintenanceReport {
    /// Whether the pass changed anything.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Run one maintenance pass.
pub fn run_maintenance(
    state: &mut WorldState,
    config: &WorldConfig,
    zones: &ZoneIndex,
    now: DateTime<Utc>,
) -> MaintenanceReport {
    let mut report = MaintenanceReport::default();

    // 1. Re-derive tree stages
    report.trees_grown = regrow_trees(state, &config.growth, now).len();

    // 2. Drop harvest tickets for trees that moved on
    report.tickets_expired = expire_stale_tickets(state);

    // 3. Reclaim jobs from inactive holders
    report.jobs_reclaimed = reclaim_stale_jobs(state, config, now).len();

    // 4. Top the board up
    report.jobs_posted = refill_board(state, config, zones, RefillSource::Scheduler, now);

    // 5. Hunger decay
    report.players_hungrier = decay_hunger(state, config, now);

    // 6. Retire delivered jobs
    report.jobs_retired = retire_completed_jobs(state, config, now).len();

    if !report.is_empty() {
        debug!(?report, "maintenance pass");
    }
    report
}

/// Apply hunger decay in whole elapsed minutes. Partial minutes carry over.
fn decay_hunger(state: &mut WorldState, config: &WorldConfig, now: DateTime<Utc>) -> usize {
    let per_minute = config.players.hunger_decay_per_minute as i64;
    let mut changed = 0;

    for player in state.players.values_mut() {
        let minutes = (now - player.hunger_updated_at).num_minutes();
        if minutes < 0 {
            warn!(player = %player.id.short(), "hunger clock ahead of now, resetting");
            player.hunger_updated_at = now;
            continue;
        }
        if minutes == 0 {
            continue;
        }

        player.hunger_updated_at += Duration::minutes(minutes);
        let loss = (minutes * per_minute).min(u8::MAX as i64) as u8;
        let hunger = player.hunger.saturating_sub(loss);
        if hunger != player.hunger {
            player.hunger = hunger;
            changed += 1;
        }
    }
    changed
}
