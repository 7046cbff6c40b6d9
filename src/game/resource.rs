//! Tree Growth and Harvesting
//!
//! Trees grow Seedling → Sapling → Young → Mature as a pure function of time
//! since planting. A harvest is a begin/complete pair: `begin_harvest` issues
//! a ticket recording the tree's cycle and stage, `complete_harvest` pays out
//! only if the tree is still on that cycle at that stage or later, so two
//! racing harvesters can never both be paid for one growth cycle. A harvested
//! tree resets to Seedling in place.

use chrono::{DateTime, Utc};

use crate::config::{GrowthConfig, WorldConfig};
use crate::game::events::WorldEventData;
use crate::game::state::{GrowthStage, HarvestTicket, PlayerId, Tree, TreeId, WorldState};

/// Harvest rejections.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HarvestError {
    /// Unknown player.
    #[error("Player has not joined")]
    NotJoined,

    /// Unknown tree.
    #[error("Tree {0:?} not found")]
    TreeNotFound(TreeId),

    /// Player outside the interact radius.
    #[error("Too far from the tree ({distance:.0} units)")]
    TooFar {
        /// Distance to the trunk
        distance: f32,
    },

    /// Tree stage yields nothing.
    #[error("Tree is not ready to harvest")]
    NotHarvestable,

    /// No ticket for this player.
    #[error("No harvest in progress")]
    NoActiveHarvest,

    /// Ticket is for another tree.
    #[error("Harvest in progress on another tree")]
    TicketMismatch,

    /// Completion arrived before the harvest duration elapsed.
    #[error("Harvest not finished, {remaining_ms} ms remaining")]
    TooEarly {
        /// Time still to wait
        remaining_ms: i64,
    },

    /// Someone else harvested this cycle first.
    #[error("Tree was already harvested")]
    AlreadyHarvested,
}

/// Stage a tree has reached at `now`.
pub fn current_stage(tree: &Tree, growth: &GrowthConfig, now: DateTime<Utc>) -> GrowthStage {
    growth.stage_for_age((now - tree.planted_at).num_seconds())
}

/// Wood a stage yields.
pub fn stage_yield(growth: &GrowthConfig, stage: GrowthStage) -> u32 {
    growth.stage(stage).map_or(0, |s| s.wood_yield)
}

/// Harvest duration of a stage in ms.
pub fn stage_duration_ms(growth: &GrowthConfig, stage: GrowthStage) -> u64 {
    growth.stage(stage).map_or(0, |s| s.harvest_ms)
}

/// Start a harvest. Replaces any ticket the player already holds.
pub fn begin_harvest(
    state: &mut WorldState,
    config: &WorldConfig,
    player_id: PlayerId,
    tree_id: TreeId,
    now: DateTime<Utc>,
) -> Result<HarvestTicket, HarvestError> {
    let player = state.players.get(&player_id).ok_or(HarvestError::NotJoined)?;
    let tree = state.trees.get(&tree_id).ok_or(HarvestError::TreeNotFound(tree_id))?;

    let distance = player.position.distance(tree.position);
    if distance > config.players.interact_radius {
        return Err(HarvestError::TooFar { distance });
    }

    let stage = current_stage(tree, &config.growth, now);
    if stage_yield(&config.growth, stage) == 0 {
        return Err(HarvestError::NotHarvestable);
    }

    let ticket = HarvestTicket {
        player_id,
        tree_id,
        cycle: tree.cycle,
        stage,
        started_at: now,
    };
    state.harvests.insert(player_id, ticket.clone());
    if let Some(player) = state.players.get_mut(&player_id) {
        player.touch(now);
    }
    state.push_event(now, WorldEventData::HarvestStarted { player_id, tree_id });
    Ok(ticket)
}

/// Finish a harvest. Returns the wood credited.
pub fn complete_harvest(
    state: &mut WorldState,
    config: &WorldConfig,
    player_id: PlayerId,
    tree_id: TreeId,
    now: DateTime<Utc>,
) -> Result<u32, HarvestError> {
    let growth = &config.growth;
    let player = state.players.get(&player_id).ok_or(HarvestError::NotJoined)?;
    let ticket = state.harvests.get(&player_id).ok_or(HarvestError::NoActiveHarvest)?;
    if ticket.tree_id != tree_id {
        return Err(HarvestError::TicketMismatch);
    }
    let tree = state.trees.get(&tree_id).ok_or(HarvestError::TreeNotFound(tree_id))?;

    let distance = player.position.distance(tree.position);
    if distance > config.players.interact_radius {
        return Err(HarvestError::TooFar { distance });
    }

    let required = stage_duration_ms(growth, ticket.stage).saturating_sub(growth.harvest_tolerance_ms) as i64;
    let elapsed = (now - ticket.started_at).num_milliseconds();
    if elapsed < required {
        return Err(HarvestError::TooEarly { remaining_ms: required - elapsed });
    }

    if tree.cycle != ticket.cycle || current_stage(tree, growth, now) < ticket.stage {
        return Err(HarvestError::AlreadyHarvested);
    }

    let wood = stage_yield(growth, ticket.stage);

    // All checks passed
    state.harvests.remove(&player_id);
    let cycle = match state.trees.get_mut(&tree_id) {
        Some(tree) => {
            tree.planted_at = now;
            tree.stage = GrowthStage::Seedling;
            tree.cycle += 1;
            tree.cycle
        }
        None => return Err(HarvestError::TreeNotFound(tree_id)),
    };
    if let Some(player) = state.players.get_mut(&player_id) {
        player.inventory.add(&growth.wood_item, wood);
        player.touch(now);
    }
    state.push_event(now, WorldEventData::TreeHarvested { player_id, tree_id, wood, cycle });
    Ok(wood)
}

/// Drop the player's ticket. Returns whether one existed.
pub fn cancel_harvest(state: &mut WorldState, player_id: PlayerId) -> bool {
    state.harvests.remove(&player_id).is_some()
}

/// Re-derive stored stages. Returns trees that advanced.
pub fn regrow_trees(
    state: &mut WorldState,
    growth: &GrowthConfig,
    now: DateTime<Utc>,
) -> Vec<(TreeId, GrowthStage)> {
    let mut grown = Vec::new();
    for tree in state.trees.values_mut() {
        let stage = current_stage(tree, growth, now);
        if stage != tree.stage {
            tree.stage = stage;
            grown.push((tree.id, stage));
        }
    }
    for &(tree_id, stage) in &grown {
        state.push_event(now, WorldEventData::TreeGrew { tree_id, stage });
    }
    grown
}

/// Drop tickets whose tree vanished or moved on to a later cycle.
pub fn expire_stale_tickets(state: &mut WorldState) -> usize {
    let before = state.harvests.len();
    let trees = &state.trees;
    state
        .harvests
        .retain(|_, t| trees.get(&t.tree_id).is_some_and(|tree| tree.cycle == t.cycle));
    before - state.harvests.len()
}
