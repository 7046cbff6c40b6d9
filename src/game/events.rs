//! World Events
//!
//! Emitted by committed transactions and fanned out to connected clients.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::game::state::{GrowthStage, JobId, PlayerId, PropertyId, TreeId};

/// What happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorldEventData {
    /// A player entered the world for the first time.
    PlayerJoined { player_id: PlayerId, name: String },

    /// A harvest ticket was issued.
    HarvestStarted { player_id: PlayerId, tree_id: TreeId },

    /// A harvest completed and the tree reset.
    TreeHarvested {
        player_id: PlayerId,
        tree_id: TreeId,
        wood: u32,
        cycle: u32,
    },

    /// The regrowth sweep advanced a tree.
    TreeGrew { tree_id: TreeId, stage: GrowthStage },

    /// A new job was posted.
    JobPosted { job_id: JobId, reward: u64 },

    /// A job was taken.
    JobAccepted { job_id: JobId, player_id: PlayerId },

    /// A parcel was collected.
    ParcelPickedUp { job_id: JobId, player_id: PlayerId },

    /// A parcel was delivered and paid.
    JobDelivered {
        job_id: JobId,
        player_id: PlayerId,
        payout: u64,
    },

    /// The holder gave a job back.
    JobCancelled { job_id: JobId, player_id: PlayerId },

    /// The stale sweep took a job back.
    JobReclaimed { job_id: JobId, player_id: PlayerId },

    /// A completed job was removed.
    JobRetired { job_id: JobId },

    /// A property stake was bought.
    PropertyBought {
        property_id: PropertyId,
        player_id: PlayerId,
        price: u64,
    },

    /// A property stake was sold.
    PropertySold {
        property_id: PropertyId,
        player_id: PlayerId,
        credit: u64,
    },

    /// Property income was credited.
    IncomeCollected {
        player_id: PlayerId,
        total: u64,
        properties: u32,
    },

    /// Items bought from the shop.
    ItemBought {
        player_id: PlayerId,
        item: String,
        quantity: u32,
        cost: u64,
    },

    /// Items sold to the shop.
    ItemSold {
        player_id: PlayerId,
        item: String,
        quantity: u32,
        credit: u64,
    },

    /// A food item was eaten.
    ItemConsumed {
        player_id: PlayerId,
        item: String,
        hunger: u8,
    },

    /// A clothing item was put on.
    ItemEquipped {
        player_id: PlayerId,
        item: String,
        replaced: Option<String>,
    },
}

/// A world event with its commit time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldEvent {
    /// When the transaction ran
    pub at: DateTime<Utc>,
    /// Event data
    #[serde(flatten)]
    pub data: WorldEventData,
}

impl WorldEvent {
    /// Create a new event.
    pub fn new(at: DateTime<Utc>, data: WorldEventData) -> Self {
        Self { at, data }
    }

    /// Player the event concerns, if any.
    pub fn player_id(&self) -> Option<PlayerId> {
        use WorldEventData::*;
        match &self.data {
            PlayerJoined { player_id, .. }
            | HarvestStarted { player_id, .. }
            | TreeHarvested { player_id, .. }
            | JobAccepted { player_id, .. }
            | ParcelPickedUp { player_id, .. }
            | JobDelivered { player_id, .. }
            | JobCancelled { player_id, .. }
            | JobReclaimed { player_id, .. }
            | PropertyBought { player_id, .. }
            | PropertySold { player_id, .. }
            | IncomeCollected { player_id, .. }
            | ItemBought { player_id, .. }
            | ItemSold { player_id, .. }
            | ItemConsumed { player_id, .. }
            | ItemEquipped { player_id, .. } => Some(*player_id),
            TreeGrew { .. } | JobPosted { .. } | JobRetired { .. } => None,
        }
    }
}
