//! World State Definitions
//!
//! Everything the shared store holds: players, properties and their ownership
//! rows, trees, jobs and in-flight harvest tickets.
//! Uses BTreeMap so snapshots and sweeps iterate in a stable order.

use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::config::{PropertyTemplate, WorldConfig};
use crate::core::rng::DeterministicRng;
use crate::core::vec2::Vec2;
use crate::game::events::{WorldEvent, WorldEventData};
use crate::game::zone::{ZoneId, ZoneIndex};

// =============================================================================
// IDS
// =============================================================================

/// Unique player identifier.
///
/// Implements Ord for BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Fresh random id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Short hex prefix for logs.
    pub fn short(&self) -> String {
        hex::encode(&self.as_bytes()[..4])
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Property identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropertyId(pub u32);

/// Tree identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TreeId(pub u32);

/// Job identifier. Allocated from a monotonic counter, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub u64);

// =============================================================================
// ITEMS
// =============================================================================

/// Clothing slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipSlot {
    /// Head.
    Hat,
    /// Torso.
    Shirt,
    /// Legs.
    Pants,
    /// Feet.
    Shoes,
}

/// What an item does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemKind {
    /// Eaten to restore hunger.
    Food {
        /// Hunger points restored.
        hunger_restore: u8,
    },
    /// Worn in a slot.
    Clothing {
        /// Slot it occupies.
        slot: EquipSlot,
    },
    /// Raw resource.
    Material,
}

/// Item-key to quantity multiset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory(BTreeMap<String, u32>);

impl Inventory {
    /// Quantity held.
    pub fn count(&self, key: &str) -> u32 {
        self.0.get(key).copied().unwrap_or(0)
    }

    /// Add items.
    pub fn add(&mut self, key: &str, qty: u32) {
        if qty == 0 {
            return;
        }
        let entry = self.0.entry(key.to_string()).or_insert(0);
        *entry = entry.saturating_add(qty);
    }

    /// Remove items. Returns false and leaves the inventory untouched if short.
    pub fn remove(&mut self, key: &str, qty: u32) -> bool {
        let held = self.count(key);
        if held < qty {
            return false;
        }
        if held == qty {
            self.0.remove(key);
        } else {
            self.0.insert(key.to_string(), held - qty);
        }
        true
    }

    /// Iterate `(key, quantity)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Worn clothing, at most one item per slot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    /// Head.
    pub hat: Option<String>,
    /// Torso.
    pub shirt: Option<String>,
    /// Legs.
    pub pants: Option<String>,
    /// Feet.
    pub shoes: Option<String>,
}

impl Equipment {
    /// Item in a slot.
    pub fn get(&self, slot: EquipSlot) -> Option<&str> {
        self.slot_ref(slot).as_deref()
    }

    /// Put an item in a slot, returning what was there.
    pub fn replace(&mut self, slot: EquipSlot, item: Option<String>) -> Option<String> {
        std::mem::replace(self.slot_mut(slot), item)
    }

    fn slot_ref(&self, slot: EquipSlot) -> &Option<String> {
        match slot {
            EquipSlot::Hat => &self.hat,
            EquipSlot::Shirt => &self.shirt,
            EquipSlot::Pants => &self.pants,
            EquipSlot::Shoes => &self.shoes,
        }
    }

    fn slot_mut(&mut self, slot: EquipSlot) -> &mut Option<String> {
        match slot {
            EquipSlot::Hat => &mut self.hat,
            EquipSlot::Shirt => &mut self.shirt,
            EquipSlot::Pants => &mut self.pants,
            EquipSlot::Shoes => &mut self.shoes,
        }
    }
}

// =============================================================================
// PLAYER
// =============================================================================

/// Highest hunger value (fully fed).
pub const MAX_HUNGER: u8 = 100;

/// A player in the shared world. Never removed once created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Player {
    /// Unique player ID
    pub id: PlayerId,
    /// Display name
    pub name: String,
    /// Last recorded position
    pub position: Vec2,
    /// Cash on hand
    pub cash: u64,
    /// 0 (starving) to 100 (full)
    pub hunger: u8,
    /// Carried items
    pub inventory: Inventory,
    /// Worn clothing
    pub equipment: Equipment,
    /// When the player first joined
    pub created_at: DateTime<Utc>,
    /// Last action of any kind
    pub last_active: DateTime<Utc>,
    /// Last accepted position report
    pub last_position_at: Option<DateTime<Utc>>,
    /// Hunger decay is applied in whole minutes from here
    pub hunger_updated_at: DateTime<Utc>,
}

impl Player {
    /// Create a player at the spawn point with starting cash and hunger.
    pub fn new(id: PlayerId, name: String, config: &WorldConfig, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            position: config.players.spawn_point,
            cash: config.players.starting_cash,
            hunger: config.players.starting_hunger.min(MAX_HUNGER),
            inventory: Inventory::default(),
            equipment: Equipment::default(),
            created_at: now,
            last_active: now,
            last_position_at: None,
            hunger_updated_at: now,
        }
    }

    /// Record activity.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_active {
            self.last_active = now;
        }
    }

    /// Whether the player has been silent longer than `inactive_after_secs`.
    pub fn is_inactive(&self, now: DateTime<Utc>, inactive_after_secs: i64) -> bool {
        (now - self.last_active).num_seconds() > inactive_after_secs
    }
}

// =============================================================================
// PROPERTY
// =============================================================================

/// Property category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyCategory {
    /// Homes.
    Residential,
    /// Shops and restaurants.
    Commercial,
    /// Yards and plants.
    Industrial,
    /// Public services, never for sale.
    Service,
}

/// A property placed on the map.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Property {
    /// Identifier
    pub id: PropertyId,
    /// Static description
    pub template: PropertyTemplate,
    /// Zone of the footprint center
    pub zone: ZoneId,
}

/// One player's stake in one property.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ownership {
    /// Owner
    pub player_id: PlayerId,
    /// Owned property
    pub property_id: PropertyId,
    /// When bought
    pub purchased_at: DateTime<Utc>,
    /// Last income credit
    pub last_collected_at: DateTime<Utc>,
    /// Income credited so far
    pub total_earned: u64,
}

// =============================================================================
// TREES
// =============================================================================

/// Tree growth stage, ordered from youngest to oldest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthStage {
    /// Just planted, nothing to harvest.
    Seedling,
    /// Small yield.
    Sapling,
    /// Medium yield.
    Young,
    /// Full yield.
    Mature,
}

impl GrowthStage {
    /// All stages in growth order.
    pub const ALL: [GrowthStage; 4] = [
        GrowthStage::Seedling,
        GrowthStage::Sapling,
        GrowthStage::Young,
        GrowthStage::Mature,
    ];
}

/// A harvestable tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tree {
    /// Identifier
    pub id: TreeId,
    /// Trunk position (collision circle center)
    pub position: Vec2,
    /// Zone the tree stands in
    pub zone: ZoneId,
    /// Stored stage, re-derived by the regrowth sweep
    pub stage: GrowthStage,
    /// Growth clock start
    pub planted_at: DateTime<Utc>,
    /// Incremented on every harvest
    pub cycle: u32,
}

/// Server record of an accepted harvest start. At most one per player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HarvestTicket {
    /// Harvester
    pub player_id: PlayerId,
    /// Target
    pub tree_id: TreeId,
    /// Tree cycle read at begin
    pub cycle: u32,
    /// Tree stage read at begin
    pub stage: GrowthStage,
    /// When the harvest began
    pub started_at: DateTime<Utc>,
}

// =============================================================================
// JOBS
// =============================================================================

/// Delivery job status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// On the board.
    Available,
    /// Taken, parcel not yet collected.
    Accepted,
    /// Parcel in hand.
    PickedUp,
    /// Delivered. Terminal.
    Completed,
}

impl JobStatus {
    /// Accepted or picked up.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Accepted | JobStatus::PickedUp)
    }
}

/// A delivery job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    /// Identifier
    pub id: JobId,
    /// Current status
    pub status: JobStatus,
    /// Holder while accepted or picked up
    pub player_id: Option<PlayerId>,
    /// Where the parcel waits
    pub pickup: Vec2,
    /// Pickup place name
    pub pickup_name: String,
    /// Pickup zone
    pub pickup_zone: ZoneId,
    /// Where the parcel goes
    pub dropoff: Vec2,
    /// Dropoff place name
    pub dropoff_name: String,
    /// Dropoff zone
    pub dropoff_zone: ZoneId,
    /// Base reward (before cross-zone bonus)
    pub reward: u64,
    /// When posted
    pub created_at: DateTime<Utc>,
    /// When accepted
    pub accepted_at: Option<DateTime<Utc>>,
    /// When picked up
    pub picked_up_at: Option<DateTime<Utc>>,
    /// When delivered
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Put the job back on the board with assignment and timestamps cleared.
    pub fn release(&mut self) {
        self.status = JobStatus::Available;
        self.player_id = None;
        self.accepted_at = None;
        self.picked_up_at = None;
    }

    /// Pickup and dropoff lie in different zones.
    pub fn is_cross_zone(&self) -> bool {
        self.pickup_zone != self.dropoff_zone
    }
}

/// Who asked for a board refill. Cooldowns are tracked per source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "source", content = "player_id", rename_all = "snake_case")]
pub enum RefillSource {
    /// The maintenance loop.
    Scheduler,
    /// A client that saw a thin board.
    Player(PlayerId),
}

// =============================================================================
// WORLD STATE
// =============================================================================

/// The complete shared world.
#[derive(Clone, Debug)]
pub struct WorldState {
    /// All players ever seen
    pub players: BTreeMap<PlayerId, Player>,
    /// Map properties
    pub properties: BTreeMap<PropertyId, Property>,
    /// Ownership rows, keyed so one property's rows are contiguous
    pub ownerships: BTreeMap<(PropertyId, PlayerId), Ownership>,
    /// Trees
    pub trees: BTreeMap<TreeId, Tree>,
    /// Jobs, including completed ones awaiting retirement
    pub jobs: BTreeMap<JobId, Job>,
    /// In-flight harvests
    pub harvests: BTreeMap<PlayerId, HarvestTicket>,
    /// Last refill per trigger source
    pub refill_marks: BTreeMap<RefillSource, DateTime<Utc>>,
    /// Next job id
    pub next_job_id: u64,
    /// Job generation RNG
    pub rng: DeterministicRng,
    /// Bumped by every committed transaction
    pub version: u64,
    pending_events: Vec<WorldEvent>,
}

impl WorldState {
    /// Build the initial world: properties from templates, trees planted.
    pub fn new(config: &WorldConfig, zones: &ZoneIndex, now: DateTime<Utc>) -> Self {
        let properties = config
            .market
            .properties
            .iter()
            .map(|t| {
                let id = PropertyId(t.id);
                let zone = zones.resolve(t.center().x, t.center().y);
                (id, Property { id, template: t.clone(), zone })
            })
            .collect();

        let planted_at = if config.growth.start_mature {
            now - chrono::Duration::seconds(config.growth.mature_age_secs())
        } else {
            now
        };
        let trees = config
            .growth
            .trees
            .iter()
            .enumerate()
            .map(|(i, &position)| {
                let id = TreeId(i as u32 + 1);
                let tree = Tree {
                    id,
                    position,
                    zone: zones.resolve(position.x, position.y),
                    stage: config.growth.stage_for_age((now - planted_at).num_seconds()),
                    planted_at,
                    cycle: 0,
                };
                (id, tree)
            })
            .collect();

        Self {
            players: BTreeMap::new(),
            properties,
            ownerships: BTreeMap::new(),
            trees,
            jobs: BTreeMap::new(),
            harvests: BTreeMap::new(),
            refill_marks: BTreeMap::new(),
            next_job_id: 1,
            rng: DeterministicRng::new(config.seed),
            version: 0,
            pending_events: Vec::new(),
        }
    }

    /// Number of ownership rows for a property.
    pub fn owner_count(&self, property_id: PropertyId) -> usize {
        self.ownerships
            .range((property_id, PlayerId::new([0; 16]))..=(property_id, PlayerId::new([0xff; 16])))
            .count()
    }

    /// The job a player currently holds, if any.
    pub fn active_job_for(&self, player_id: PlayerId) -> Option<&Job> {
        self.jobs
            .values()
            .find(|j| j.status.is_active() && j.player_id == Some(player_id))
    }

    /// Jobs currently on the board.
    pub fn available_job_count(&self) -> usize {
        self.jobs
            .values()
            .filter(|j| j.status == JobStatus::Available)
            .count()
    }

    /// Allocate the next job id.
    pub fn allocate_job_id(&mut self) -> JobId {
        let id = JobId(self.next_job_id);
        self.next_job_id += 1;
        id
    }

    /// Queue an event for publication when the current transaction commits.
    pub fn push_event(&mut self, at: DateTime<Utc>, data: WorldEventData) {
        self.pending_events.push(WorldEvent::new(at, data));
    }

    /// Take queued events.
    pub fn take_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Drop queued events of an aborted transaction.
    pub fn discard_events(&mut self) {
        self.pending_events.clear();
    }

    /// Copy the state into an immutable snapshot.
    pub fn snapshot(&self, taken_at: DateTime<Utc>) -> WorldSnapshot {
        WorldSnapshot {
            version: self.version,
            taken_at,
            players: self.players.values().cloned().collect(),
            properties: self.properties.values().cloned().collect(),
            ownerships: self.ownerships.values().cloned().collect(),
            jobs: self.jobs.values().cloned().collect(),
            trees: self.trees.values().cloned().collect(),
        }
    }
}

/// Read-only copy of the world published to subscribers.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// State version the snapshot was taken at
    pub version: u64,
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
    /// Players
    pub players: Vec<Player>,
    /// Properties
    pub properties: Vec<Property>,
    /// Ownership rows
    pub ownerships: Vec<Ownership>,
    /// Jobs
    pub jobs: Vec<Job>,
    /// Trees
    pub trees: Vec<Tree>,
}

impl WorldSnapshot {
    /// Find a player.
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Find a tree.
    pub fn tree(&self, id: TreeId) -> Option<&Tree> {
        self.trees.iter().find(|t| t.id == id)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> (WorldConfig, WorldState) {
        let config = WorldConfig::default();
        let zones = ZoneIndex::new(&config.zones, &config.map);
        let state = WorldState::new(&config, &zones, Utc::now());
        (config, state)
    }

    #[test]
    fn test_initial_world() {
        let (config, state) = world();
        assert_eq!(state.properties.len(), config.market.properties.len());
        assert_eq!(state.trees.len(), config.growth.trees.len());
        assert!(state.trees.values().all(|t| t.stage == GrowthStage::Mature));
        assert!(state.jobs.is_empty());
    }

    #[test]
    fn test_property_zone_resolved() {
        let (_, state) = world();
        let sawmill = &state.properties[&PropertyId(6)];
        assert_eq!(sawmill.zone, ZoneId::FOREST);
    }

    #[test]
    fn test_owner_count_is_per_property() {
        let (_, mut state) = world();
        let now = Utc::now();
        for (prop, byte) in [(1, 1u8), (1, 2), (2, 3)] {
            let row = Ownership {
                player_id: PlayerId::new([byte; 16]),
                property_id: PropertyId(prop),
                purchased_at: now,
                last_collected_at: now,
                total_earned: 0,
            };
            state.ownerships.insert((row.property_id, row.player_id), row);
        }
        assert_eq!(state.owner_count(PropertyId(1)), 2);
        assert_eq!(state.owner_count(PropertyId(2)), 1);
        assert_eq!(state.owner_count(PropertyId(3)), 0);
    }

    #[test]
    fn test_inventory_remove_is_all_or_nothing() {
        let mut inv = Inventory::default();
        inv.add("wood", 3);
        assert!(!inv.remove("wood", 4));
        assert_eq!(inv.count("wood"), 3);
        assert!(inv.remove("wood", 3));
        assert_eq!(inv.count("wood"), 0);
        assert_eq!(inv.iter().count(), 0);
    }

    #[test]
    fn test_equipment_replace() {
        let mut eq = Equipment::default();
        assert_eq!(eq.replace(EquipSlot::Hat, Some("straw_hat".into())), None);
        assert_eq!(eq.get(EquipSlot::Hat), Some("straw_hat"));
        assert_eq!(eq.replace(EquipSlot::Hat, Some("cap".into())), Some("straw_hat".into()));
        assert_eq!(eq.get(EquipSlot::Shoes), None);
    }

    #[test]
    fn test_job_ids_are_monotonic() {
        let (_, mut state) = world();
        let a = state.allocate_job_id();
        let b = state.allocate_job_id();
        assert!(b > a);
    }

    #[test]
    fn test_player_id_string_roundtrip() {
        let id = PlayerId::random();
        assert_eq!(PlayerId::from_uuid_str(&id.to_string()), Some(id));
        assert_eq!(id.short().len(), 8);
    }

    #[test]
    fn test_events_are_discarded() {
        let (_, mut state) = world();
        state.push_event(Utc::now(), WorldEventData::JobRetired { job_id: JobId(1) });
        state.discard_events();
        assert!(state.take_events().is_empty());
    }
}
