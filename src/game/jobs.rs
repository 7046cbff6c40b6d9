//! Delivery Jobs
//!
//! Job lifecycle:
//!
//! ```text
//! available --accept--> accepted --pickup--> picked_up --deliver--> completed
//!     ^                    |                     |
//!     +------cancel / stale reclaim -------------+
//! ```
//!
//! A player holds at most one active job. Pickup and delivery require standing
//! within the interact radius. Cancelled and reclaimed jobs go back on the
//! board with their assignment cleared; completed jobs are retired after a
//! retention window.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::config::WorldConfig;
use crate::core::vec2::Vec2;
use crate::game::events::WorldEventData;
use crate::game::state::{Job, JobId, JobStatus, PlayerId, RefillSource, WorldState};
use crate::game::zone::ZoneIndex;

/// Job rejections.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobError {
    /// Unknown player.
    #[error("Player has not joined")]
    NotJoined,

    /// Unknown job.
    #[error("Job {0:?} not found")]
    JobNotFound(JobId),

    /// Job is not in the status the transition starts from.
    #[error("Job is {actual:?}, expected {expected:?}")]
    WrongStatus {
        /// Required status
        expected: JobStatus,
        /// Current status
        actual: JobStatus,
    },

    /// Player already holds another job.
    #[error("Already holding job {0:?}")]
    AlreadyHoldingJob(JobId),

    /// Job belongs to someone else.
    #[error("Job is assigned to another player")]
    NotAssignee,

    /// Player outside the interact radius.
    #[error("Too far from {place} ({distance:.0} units)")]
    TooFar {
        /// Target place name
        place: String,
        /// Distance to it
        distance: f32,
    },
}

fn active_job_checked(
    state: &WorldState,
    player_id: PlayerId,
    job_id: JobId,
    expected: JobStatus,
) -> Result<(Vec2, &Job), JobError> {
    let player = state.players.get(&player_id).ok_or(JobError::NotJoined)?;
    let job = state.jobs.get(&job_id).ok_or(JobError::JobNotFound(job_id))?;
    if job.status != expected {
        return Err(JobError::WrongStatus { expected, actual: job.status });
    }
    if job.player_id != Some(player_id) {
        return Err(JobError::NotAssignee);
    }
    Ok((player.position, job))
}

fn require_near(position: Vec2, target: Vec2, place: &str, radius: f32) -> Result<(), JobError> {
    let distance = position.distance(target);
    if distance > radius {
        return Err(JobError::TooFar { place: place.to_string(), distance });
    }
    Ok(())
}

fn touch(state: &mut WorldState, player_id: PlayerId, now: DateTime<Utc>) {
    if let Some(player) = state.players.get_mut(&player_id) {
        player.touch(now);
    }
}

/// Take an available job.
pub fn accept_job(
    state: &mut WorldState,
    player_id: PlayerId,
    job_id: JobId,
    now: DateTime<Utc>,
) -> Result<(), JobError> {
    if !state.players.contains_key(&player_id) {
        return Err(JobError::NotJoined);
    }
    let job = state.jobs.get(&job_id).ok_or(JobError::JobNotFound(job_id))?;
    if job.status != JobStatus::Available {
        return Err(JobError::WrongStatus { expected: JobStatus::Available, actual: job.status });
    }
    if let Some(held) = state.active_job_for(player_id) {
        return Err(JobError::AlreadyHoldingJob(held.id));
    }

    if let Some(job) = state.jobs.get_mut(&job_id) {
        job.status = JobStatus::Accepted;
        job.player_id = Some(player_id);
        job.accepted_at = Some(now);
    }
    touch(state, player_id, now);
    state.push_event(now, WorldEventData::JobAccepted { job_id, player_id });
    Ok(())
}

/// Collect the parcel at the pickup point.
pub fn pickup_parcel(
    state: &mut WorldState,
    config: &WorldConfig,
    player_id: PlayerId,
    job_id: JobId,
    now: DateTime<Utc>,
) -> Result<(), JobError> {
    let (position, job) = active_job_checked(state, player_id, job_id, JobStatus::Accepted)?;
    require_near(position, job.pickup, &job.pickup_name, config.players.interact_radius)?;

    if let Some(job) = state.jobs.get_mut(&job_id) {
        job.status = JobStatus::PickedUp;
        job.picked_up_at = Some(now);
    }
    touch(state, player_id, now);
    state.push_event(now, WorldEventData::ParcelPickedUp { job_id, player_id });
    Ok(())
}

/// Reward for a job including any cross-zone bonus.
pub fn payout(job: &Job, config: &WorldConfig) -> u64 {
    if job.is_cross_zone() {
        job.reward + job.reward * config.jobs.cross_zone_bonus_percent / 100
    } else {
        job.reward
    }
}

/// Hand over the parcel at the dropoff point. Returns the cash paid.
pub fn deliver_parcel(
    state: &mut WorldState,
    config: &WorldConfig,
    player_id: PlayerId,
    job_id: JobId,
    now: DateTime<Utc>,
) -> Result<u64, JobError> {
    let (position, job) = active_job_checked(state, player_id, job_id, JobStatus::PickedUp)?;
    require_near(position, job.dropoff, &job.dropoff_name, config.players.interact_radius)?;
    let paid = payout(job, config);

    if let Some(job) = state.jobs.get_mut(&job_id) {
        job.status = JobStatus::Completed;
        job.player_id = None;
        job.completed_at = Some(now);
    }
    if let Some(player) = state.players.get_mut(&player_id) {
        player.cash = player.cash.saturating_add(paid);
        player.touch(now);
    }
    state.push_event(now, WorldEventData::JobDelivered { job_id, player_id, payout: paid });
    Ok(paid)
}

/// Give a held job back to the board.
pub fn cancel_job(
    state: &mut WorldState,
    player_id: PlayerId,
    job_id: JobId,
    now: DateTime<Utc>,
) -> Result<(), JobError> {
    if !state.players.contains_key(&player_id) {
        return Err(JobError::NotJoined);
    }
    let job = state.jobs.get(&job_id).ok_or(JobError::JobNotFound(job_id))?;
    if !job.status.is_active() {
        return Err(JobError::WrongStatus { expected: JobStatus::Accepted, actual: job.status });
    }
    if job.player_id != Some(player_id) {
        return Err(JobError::NotAssignee);
    }

    if let Some(job) = state.jobs.get_mut(&job_id) {
        job.release();
    }
    touch(state, player_id, now);
    state.push_event(now, WorldEventData::JobCancelled { job_id, player_id });
    Ok(())
}

// =============================================================================
// BOARD MAINTENANCE
// =============================================================================

/// Post one job between two distinct configured locations.
pub fn generate_job(
    state: &mut WorldState,
    config: &WorldConfig,
    zones: &ZoneIndex,
    now: DateTime<Utc>,
) -> Option<JobId> {
    let locations = &config.jobs.locations;
    let (a, b) = state.rng.choose_pair(locations.len())?;
    let (pickup, dropoff) = (&locations[a], &locations[b]);

    let distance = pickup.position.distance(dropoff.position);
    let reward = config.jobs.base_reward + (distance * config.jobs.reward_per_unit).floor() as u64;

    let id = state.allocate_job_id();
    state.jobs.insert(
        id,
        Job {
            id,
            status: JobStatus::Available,
            player_id: None,
            pickup: pickup.position,
            pickup_name: pickup.name.clone(),
            pickup_zone: zones.resolve(pickup.position.x, pickup.position.y),
            dropoff: dropoff.position,
            dropoff_name: dropoff.name.clone(),
            dropoff_zone: zones.resolve(dropoff.position.x, dropoff.position.y),
            reward,
            created_at: now,
            accepted_at: None,
            picked_up_at: None,
            completed_at: None,
        },
    );
    state.push_event(now, WorldEventData::JobPosted { job_id: id, reward });
    Some(id)
}

/// Top the board up to the refill target when it is below the minimum.
///
/// The deficit is computed against the live board, so concurrent triggers
/// serialized by the store never overshoot. Each source is additionally held
/// to a cooldown. Returns the number of jobs posted.
pub fn refill_board(
    state: &mut WorldState,
    config: &WorldConfig,
    zones: &ZoneIndex,
    source: RefillSource,
    now: DateTime<Utc>,
) -> usize {
    let jobs = &config.jobs;
    if let Some(&last) = state.refill_marks.get(&source) {
        if now - last < Duration::milliseconds(jobs.refill_cooldown_ms) {
            debug!(?source, "refill cooling down");
            return 0;
        }
    }

    let available = state.available_job_count();
    if available >= jobs.min_available {
        return 0;
    }

    state.refill_marks.insert(source, now);
    let wanted = jobs.refill_target.saturating_sub(available);
    let mut posted = 0;
    for _ in 0..wanted {
        match generate_job(state, config, zones, now) {
            Some(_) => posted += 1,
            None => {
                warn!("job generation needs at least two locations");
                break;
            }
        }
    }
    posted
}

/// Reclaim active jobs whose holder went quiet or that ran past the timeout.
pub fn reclaim_stale_jobs(state: &mut WorldState, config: &WorldConfig, now: DateTime<Utc>) -> Vec<JobId> {
    let timeout = Duration::seconds(config.jobs.active_timeout_secs);
    let inactive_after = config.players.inactive_after_secs;

    let mut reclaimed = Vec::new();
    for job in state.jobs.values_mut().filter(|j| j.status.is_active()) {
        let holder = match job.player_id {
            Some(id) => id,
            None => {
                warn!(job = job.id.0, "active job without a holder, releasing");
                job.release();
                continue;
            }
        };
        let holder_gone = state
            .players
            .get(&holder)
            .map_or(true, |p| p.is_inactive(now, inactive_after));
        let expired = job.accepted_at.map_or(true, |at| now - at > timeout);

        if holder_gone || expired {
            job.release();
            reclaimed.push((job.id, holder));
        }
    }

    for &(job_id, player_id) in &reclaimed {
        state.push_event(now, WorldEventData::JobReclaimed { job_id, player_id });
    }
    reclaimed.into_iter().map(|(id, _)| id).collect()
}

/// Remove completed jobs older than the retention window.
pub fn retire_completed_jobs(state: &mut WorldState, config: &WorldConfig, now: DateTime<Utc>) -> Vec<JobId> {
    let retention = Duration::seconds(config.jobs.retention_secs);
    let retired: Vec<JobId> = state
        .jobs
        .values()
        .filter(|j| j.status == JobStatus::Completed)
        .filter(|j| j.completed_at.map_or(true, |at| now - at > retention))
        .map(|j| j.id)
        .collect();

    for id in &retired {
        state.jobs.remove(id);
        state.push_event(now, WorldEventData::JobRetired { job_id: *id });
    }
    retired
}
