//! Client Harvest Sessions
//!
//! A harvest runs locally as a progress bar advanced in fixed poll steps.
//! Every poll rechecks that the tree still exists and the actor is still in
//! range; the completing call fires once, when progress reaches 100%.
//! The server independently re-validates the completion against the ticket
//! it issued at begin.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::debug;

use crate::config::GrowthConfig;
use crate::core::vec2::Vec2;
use crate::game::resource::{current_stage, stage_duration_ms, stage_yield};
use crate::game::state::{GrowthStage, Tree, TreeId};

/// Why a session ended without completing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CancelReason {
    /// Actor walked out of the interact radius.
    #[error("moved out of range")]
    OutOfRange,
    /// The tree is gone.
    #[error("tree no longer exists")]
    TreeMissing,
    /// Actor selected another tree.
    #[error("switched to another tree")]
    Switched,
    /// Explicit cancel signal.
    #[error("cancelled")]
    Stopped,
}

/// Why a session could not start.
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum StartError {
    /// Already harvesting this tree.
    #[error("already harvesting this tree")]
    AlreadyHarvesting,
    /// Too far from the tree.
    #[error("too far from the tree ({distance:.0} units)")]
    OutOfRange {
        /// Distance to the trunk
        distance: f32,
    },
    /// Stage yields nothing.
    #[error("tree is not ready to harvest")]
    NotHarvestable,
}

/// What the session sees each poll.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Probe {
    /// Actor position
    pub actor: Vec2,
    /// Tree trunk position, None if the tree is gone
    pub tree: Option<Vec2>,
}

/// Result of one poll step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PollResult {
    /// Still going, progress in [0, 1).
    InProgress(f32),
    /// Progress reached 100%.
    Done,
    /// Session ended early.
    Cancelled(CancelReason),
}

/// One in-flight harvest.
#[derive(Clone, Debug, PartialEq)]
pub struct HarvestSession {
    tree_id: TreeId,
    stage: GrowthStage,
    wood: u32,
    duration: Duration,
    elapsed: Duration,
    interact_radius: f32,
    finished: bool,
}

impl HarvestSession {
    /// Validate and start a session.
    pub fn start(
        tree: &Tree,
        actor: Vec2,
        growth: &GrowthConfig,
        interact_radius: f32,
        now: DateTime<Utc>,
    ) -> Result<Self, StartError> {
        let distance = actor.distance(tree.position);
        if distance > interact_radius {
            return Err(StartError::OutOfRange { distance });
        }
        let stage = current_stage(tree, growth, now);
        let wood = stage_yield(growth, stage);
        if wood == 0 {
            return Err(StartError::NotHarvestable);
        }
        Ok(Self {
            tree_id: tree.id,
            stage,
            wood,
            duration: Duration::from_millis(stage_duration_ms(growth, stage)),
            elapsed: Duration::ZERO,
            interact_radius,
            finished: false,
        })
    }

    /// Target tree.
    pub fn tree_id(&self) -> TreeId {
        self.tree_id
    }

    /// Stage read at start.
    pub fn stage(&self) -> GrowthStage {
        self.stage
    }

    /// Wood expected on completion.
    pub fn expected_wood(&self) -> u32 {
        self.wood
    }

    /// Fraction done, in [0, 1].
    pub fn progress(&self) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
    }

    /// Advance by one poll step.
    pub fn poll(&mut self, step: Duration, probe: Probe) -> PollResult {
        if self.finished {
            return PollResult::Cancelled(CancelReason::Stopped);
        }
        let Some(tree) = probe.tree else {
            self.finished = true;
            return PollResult::Cancelled(CancelReason::TreeMissing);
        };
        if probe.actor.distance(tree) > self.interact_radius {
            self.finished = true;
            return PollResult::Cancelled(CancelReason::OutOfRange);
        }

        self.elapsed += step;
        if self.elapsed >= self.duration {
            self.finished = true;
            return PollResult::Done;
        }
        PollResult::InProgress(self.progress())
    }
}

/// Holds the actor's current session, at most one.
#[derive(Clone, Debug, Default)]
pub struct Harvester {
    active: Option<HarvestSession>,
}

impl Harvester {
    /// Nothing in progress.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session.
    pub fn active(&self) -> Option<&HarvestSession> {
        self.active.as_ref()
    }

    /// Start harvesting `tree`. Selecting a different tree cancels the current
    /// session first; selecting the same one again is rejected.
    ///
    /// Returns the reason the previous session ended, if one was replaced.
    pub fn select(
        &mut self,
        tree: &Tree,
        actor: Vec2,
        growth: &GrowthConfig,
        interact_radius: f32,
        now: DateTime<Utc>,
    ) -> Result<Option<CancelReason>, StartError> {
        if self.active.as_ref().is_some_and(|s| s.tree_id == tree.id) {
            return Err(StartError::AlreadyHarvesting);
        }
        let session = HarvestSession::start(tree, actor, growth, interact_radius, now)?;
        let replaced = self.active.replace(session).map(|_| CancelReason::Switched);
        Ok(replaced)
    }

    /// Drop the current session.
    pub fn cancel(&mut self) -> Option<TreeId> {
        self.active.take().map(|s| s.tree_id)
    }

    /// Advance the current session. Finished sessions are cleared, so `Done`
    /// is reported exactly once.
    pub fn poll(&mut self, step: Duration, probe: Probe) -> Option<(TreeId, PollResult)> {
        let session = self.active.as_mut()?;
        let tree_id = session.tree_id;
        let result = session.poll(step, probe);
        if !matches!(result, PollResult::InProgress(_)) {
            self.active = None;
        }
        Some((tree_id, result))
    }
}

/// Drive a session on a timer until it completes or is cancelled.
///
/// `probe` is sampled every `step`. On completion `complete` runs exactly
/// once and its output is returned. Setting the `cancel` channel to `true`
/// stops the session at the next wakeup.
pub async fn run_session<P, C, Fut, T>(
    mut session: HarvestSession,
    step: Duration,
    mut probe: P,
    mut cancel: watch::Receiver<bool>,
    complete: C,
) -> Result<T, CancelReason>
where
    P: FnMut() -> Probe,
    C: FnOnce(TreeId) -> Fut,
    Fut: Future<Output = T>,
{
    let mut ticker = tokio::time::interval(step);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately
    ticker.tick().await;
    let mut cancel_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match session.poll(step, probe()) {
                    PollResult::InProgress(progress) => {
                        debug!(tree = session.tree_id.0, progress, "harvest progress");
                    }
                    PollResult::Done => return Ok(complete(session.tree_id).await),
                    PollResult::Cancelled(reason) => return Err(reason),
                }
            }
            changed = cancel.changed(), if cancel_open => {
                match changed {
                    Ok(()) if *cancel.borrow() => return Err(CancelReason::Stopped),
                    Ok(()) => {}
                    // Nobody left to cancel us
                    Err(_) => cancel_open = false,
                }
            }
        }
    }
}
