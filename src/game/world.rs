//! World Facade
//!
//! The boundary every caller goes through: the network layer, the maintenance
//! loop and tests. Binds the immutable config, the zone index and obstacle set
//! derived from it, the shared store and the clock. Each operation is one
//! store transaction.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument};

use crate::config::{ConfigError, WorldConfig};
use crate::core::clock::{Clock, SystemClock};
use crate::core::vec2::Vec2;
use crate::game::collision::ObstacleSet;
use crate::game::events::{WorldEvent, WorldEventData};
use crate::game::jobs::{self, JobError};
use crate::game::market::{self, IncomeReport, MarketError};
use crate::game::position::{self, PositionError};
use crate::game::resource::{self, HarvestError};
use crate::game::state::{
    HarvestTicket, JobId, Player, PlayerId, PropertyId, RefillSource, TreeId, WorldSnapshot,
    WorldState,
};
use crate::game::store::WorldStore;
use crate::game::tick::{self, MaintenanceReport};
use crate::game::trade::{self, TradeError};
use crate::game::zone::{ZoneId, ZoneIndex};

/// Longest accepted display name.
pub const MAX_NAME_LEN: usize = 24;

/// Any rejection a world operation can produce.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// Display name empty or too long.
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Position report rejected.
    #[error(transparent)]
    Position(#[from] PositionError),

    /// Harvest rejected.
    #[error(transparent)]
    Harvest(#[from] HarvestError),

    /// Job operation rejected.
    #[error(transparent)]
    Job(#[from] JobError),

    /// Property trade rejected.
    #[error(transparent)]
    Market(#[from] MarketError),

    /// Item trade rejected.
    #[error(transparent)]
    Trade(#[from] TradeError),

    /// World config is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The shared world.
pub struct World {
    config: Arc<WorldConfig>,
    zones: ZoneIndex,
    obstacles: ObstacleSet,
    store: WorldStore,
    clock: Arc<dyn Clock>,
}

impl World {
    /// Create a world on the system clock.
    pub fn new(config: WorldConfig) -> Result<Self, WorldError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a world on an explicit clock.
    pub fn with_clock(config: WorldConfig, clock: Arc<dyn Clock>) -> Result<Self, WorldError> {
        config.validate()?;
        let zones = ZoneIndex::new(&config.zones, &config.map);
        let obstacles = ObstacleSet::from_config(&config);
        let now = clock.now();
        let state = WorldState::new(&config, &zones, now);

        info!(
            properties = state.properties.len(),
            trees = state.trees.len(),
            zones = zones.zones().count(),
            "World created"
        );

        Ok(Self {
            config: Arc::new(config),
            zones,
            obstacles,
            store: WorldStore::new(state, now),
            clock,
        })
    }

    /// The immutable config.
    pub fn config(&self) -> &Arc<WorldConfig> {
        &self.config
    }

    /// Zone lookup.
    pub fn zones(&self) -> &ZoneIndex {
        &self.zones
    }

    /// Static obstacles.
    pub fn obstacles(&self) -> &ObstacleSet {
        &self.obstacles
    }

    /// The underlying store.
    pub fn store(&self) -> &WorldStore {
        &self.store
    }

    /// Current time on the world clock.
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    // =========================================================================
    // PLAYERS & MOVEMENT
    // =========================================================================

    /// Enter the world. A known id resumes that player; anything else creates
    /// a fresh player at the spawn point.
    #[instrument(skip(self))]
    pub async fn join(&self, player_id: Option<PlayerId>, name: &str) -> Result<Player, WorldError> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(WorldError::InvalidName(name.to_string()));
        }
        let now = self.clock.now();
        let config = &self.config;

        self.store
            .transact(|state| {
                if let Some(player) = player_id.and_then(|id| state.players.get_mut(&id)) {
                    player.touch(now);
                    debug!(player = %player.id.short(), "Player resumed");
                    return Ok(player.clone());
                }
                let id = player_id.unwrap_or_else(PlayerId::random);
                let player = Player::new(id, name.to_string(), config, now);
                state.players.insert(id, player.clone());
                state.push_event(now, WorldEventData::PlayerJoined { player_id: id, name: name.to_string() });
                info!(player = %id.short(), name, "Player joined");
                Ok(player)
            })
            .await
    }

    /// Zone at a coordinate.
    pub fn resolve_zone(&self, x: f32, y: f32) -> ZoneId {
        self.zones.resolve(x, y)
    }

    /// Record a client-reported position.
    pub async fn report_position(&self, player_id: PlayerId, x: f32, y: f32) -> Result<Vec2, WorldError> {
        let now = self.clock.now();
        let config = &self.config;
        let stored = self
            .store
            .transact(|state| position::report_position(state, config, player_id, Vec2::new(x, y), now))
            .await?;
        Ok(stored)
    }

    // =========================================================================
    // HARVESTING
    // =========================================================================

    /// Start harvesting a tree.
    #[instrument(skip(self))]
    pub async fn begin_harvest(&self, player_id: PlayerId, tree_id: TreeId) -> Result<HarvestTicket, WorldError> {
        let now = self.clock.now();
        let config = &self.config;
        let ticket = self
            .store
            .transact(|state| resource::begin_harvest(state, config, player_id, tree_id, now))
            .await?;
        Ok(ticket)
    }

    /// Finish a harvest. Returns the wood gained.
    #[instrument(skip(self))]
    pub async fn complete_harvest(&self, player_id: PlayerId, tree_id: TreeId) -> Result<u32, WorldError> {
        let now = self.clock.now();
        let config = &self.config;
        let wood = self
            .store
            .transact(|state| resource::complete_harvest(state, config, player_id, tree_id, now))
            .await?;
        Ok(wood)
    }

    /// Abandon the current harvest. Returns whether one was in progress.
    pub async fn cancel_harvest(&self, player_id: PlayerId) -> bool {
        self.store
            .apply(|state| {
                let removed = resource::cancel_harvest(state, player_id);
                (removed, removed)
            })
            .await
    }

    // =========================================================================
    // JOBS
    // =========================================================================

    /// Take a job off the board.
    #[instrument(skip(self))]
    pub async fn accept_job(&self, player_id: PlayerId, job_id: JobId) -> Result<(), WorldError> {
        let now = self.clock.now();
        self.store
            .transact(|state| jobs::accept_job(state, player_id, job_id, now))
            .await?;
        Ok(())
    }

    /// Collect a job's parcel.
    #[instrument(skip(self))]
    pub async fn pickup_parcel(&self, player_id: PlayerId, job_id: JobId) -> Result<(), WorldError> {
        let now = self.clock.now();
        let config = &self.config;
        self.store
            .transact(|state| jobs::pickup_parcel(state, config, player_id, job_id, now))
            .await?;
        Ok(())
    }

    /// Deliver a job's parcel. Returns the payout.
    #[instrument(skip(self))]
    pub async fn deliver_parcel(&self, player_id: PlayerId, job_id: JobId) -> Result<u64, WorldError> {
        let now = self.clock.now();
        let config = &self.config;
        let paid = self
            .store
            .transact(|state| jobs::deliver_parcel(state, config, player_id, job_id, now))
            .await?;
        Ok(paid)
    }

    /// Hand a job back.
    #[instrument(skip(self))]
    pub async fn cancel_job(&self, player_id: PlayerId, job_id: JobId) -> Result<(), WorldError> {
        let now = self.clock.now();
        self.store
            .transact(|state| jobs::cancel_job(state, player_id, job_id, now))
            .await?;
        Ok(())
    }

    /// Ask for a board refill. Returns the number of jobs posted.
    pub async fn trigger_refill(&self, source: RefillSource) -> usize {
        let now = self.clock.now();
        let config = &self.config;
        let zones = &self.zones;
        self.store
            .apply(|state| {
                let posted = jobs::refill_board(state, config, zones, source, now);
                (posted, posted > 0)
            })
            .await
    }

    // =========================================================================
    // PROPERTY
    // =========================================================================

    /// Buy a property stake. Returns the price paid.
    #[instrument(skip(self))]
    pub async fn buy_property(&self, player_id: PlayerId, property_id: PropertyId) -> Result<u64, WorldError> {
        let now = self.clock.now();
        let config = &self.config;
        let price = self
            .store
            .transact(|state| market::buy_property(state, config, player_id, property_id, now))
            .await?;
        Ok(price)
    }

    /// Sell a property stake. Returns the credit.
    #[instrument(skip(self))]
    pub async fn sell_property(&self, player_id: PlayerId, property_id: PropertyId) -> Result<u64, WorldError> {
        let now = self.clock.now();
        let config = &self.config;
        let credit = self
            .store
            .transact(|state| market::sell_property(state, config, player_id, property_id, now))
            .await?;
        Ok(credit)
    }

    /// Collect income from every property whose cooldown passed.
    #[instrument(skip(self))]
    pub async fn collect_income(&self, player_id: PlayerId) -> Result<IncomeReport, WorldError> {
        let now = self.clock.now();
        let config = &self.config;
        let report = self
            .store
            .transact(|state| market::collect_income(state, config, player_id, now))
            .await?;
        Ok(report)
    }

    // =========================================================================
    // ITEMS
    // =========================================================================

    /// Buy items from the shop. Returns the cost.
    pub async fn buy_item(&self, player_id: PlayerId, item: &str, qty: u32) -> Result<u64, WorldError> {
        let now = self.clock.now();
        let config = &self.config;
        let cost = self
            .store
            .transact(|state| trade::buy_item(state, config, player_id, item, qty, now))
            .await?;
        Ok(cost)
    }

    /// Sell items to the shop. Returns the credit.
    pub async fn sell_item(&self, player_id: PlayerId, item: &str, qty: u32) -> Result<u64, WorldError> {
        let now = self.clock.now();
        let config = &self.config;
        let credit = self
            .store
            .transact(|state| trade::sell_item(state, config, player_id, item, qty, now))
            .await?;
        Ok(credit)
    }

    /// Eat a food item. Returns the new hunger.
    pub async fn consume_item(&self, player_id: PlayerId, item: &str) -> Result<u8, WorldError> {
        let now = self.clock.now();
        let config = &self.config;
        let hunger = self
            .store
            .transact(|state| trade::consume_item(state, config, player_id, item, now))
            .await?;
        Ok(hunger)
    }

    /// Wear a clothing item. Returns what it replaced.
    pub async fn equip_item(&self, player_id: PlayerId, item: &str) -> Result<Option<String>, WorldError> {
        let now = self.clock.now();
        let config = &self.config;
        let previous = self
            .store
            .transact(|state| trade::equip_item(state, config, player_id, item, now))
            .await?;
        Ok(previous)
    }

    // =========================================================================
    // MAINTENANCE & OBSERVATION
    // =========================================================================

    /// Run one maintenance pass.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let now = self.clock.now();
        let config = &self.config;
        let zones = &self.zones;
        self.store
            .apply(|state| {
                let report = tick::run_maintenance(state, config, zones, now);
                let changed = !report.is_empty();
                (report, changed)
            })
            .await
    }

    /// Publish a snapshot if the world changed.
    pub async fn publish(&self) -> bool {
        self.store.publish(self.clock.now()).await
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<WorldSnapshot> {
        self.store.latest()
    }

    /// Fresh snapshot of the live state, bypassing the publish cadence.
    pub async fn snapshot_now(&self) -> WorldSnapshot {
        let now = self.clock.now();
        self.store.read(|state| state.snapshot(now)).await
    }

    /// Subscribe to published snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Arc<WorldSnapshot>> {
        self.store.subscribe()
    }

    /// Subscribe to committed events.
    pub fn events(&self) -> broadcast::Receiver<WorldEvent> {
        self.store.events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::game::state::JobStatus;
    use chrono::{Duration, Utc};

    fn world() -> (Arc<World>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let world = World::with_clock(WorldConfig::default(), clock.clone()).unwrap();
        (Arc::new(world), clock)
    }

    async fn join(world: &World, name: &str) -> PlayerId {
        world.join(None, name).await.unwrap().id
    }

    #[tokio::test]
    async fn test_join_and_resume() {
        let (world, _) = world();
        let ada = world.join(None, "  Ada ").await.unwrap();
        assert_eq!(ada.name, "Ada");
        assert_eq!(ada.position, world.config().players.spawn_point);

        let again = world.join(Some(ada.id), "Someone Else").await.unwrap();
        assert_eq!(again.id, ada.id);
        assert_eq!(again.name, "Ada");

        assert!(matches!(world.join(None, "   ").await, Err(WorldError::InvalidName(_))));
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(world.join(None, &long).await, Err(WorldError::InvalidName(_))));
    }

    #[tokio::test]
    async fn test_snapshot_published_after_change() {
        let (world, _) = world();
        let mut rx = world.subscribe();
        let pid = join(&world, "Ada").await;

        assert!(world.publish().await);
        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert!(snapshot.player(pid).is_some());
        assert!(!world.publish().await);
    }

    #[tokio::test]
    async fn test_events_stream() {
        let (world, _) = world();
        let mut events = world.events();
        let pid = join(&world, "Ada").await;
        let event = events.recv().await.unwrap();
        assert_eq!(event.player_id(), Some(pid));
    }

    #[tokio::test]
    async fn test_harvest_through_facade() {
        let (world, clock) = world();
        let pid = join(&world, "Ada").await;
        let tree = world.snapshot_now().await.tree(TreeId(1)).cloned().unwrap();
        world.report_position(pid, tree.position.x + 20.0, tree.position.y).await.unwrap();

        world.begin_harvest(pid, tree.id).await.unwrap();
        assert!(matches!(
            world.complete_harvest(pid, tree.id).await,
            Err(WorldError::Harvest(HarvestError::TooEarly { .. }))
        ));
        clock.advance(Duration::seconds(5));
        let wood = world.complete_harvest(pid, tree.id).await.unwrap();
        assert_eq!(wood, 6);

        let snapshot = world.snapshot_now().await;
        assert_eq!(snapshot.player(pid).unwrap().inventory.count("wood"), 6);
        assert_eq!(snapshot.tree(tree.id).unwrap().cycle, 1);
    }

    #[tokio::test]
    async fn test_maintenance_posts_jobs() {
        let (world, _) = world();
        let report = world.run_maintenance().await;
        assert_eq!(report.jobs_posted, world.config().jobs.refill_target);
    }

    #[tokio::test]
    async fn test_noop_writes_keep_version() {
        let (world, _) = world();
        let pid = join(&world, "Ada").await;
        world.run_maintenance().await;
        assert!(world.publish().await);
        let version = world.store().read(|s| s.version).await;

        assert!(!world.cancel_harvest(pid).await);
        assert_eq!(world.trigger_refill(RefillSource::Player(pid)).await, 0);
        assert!(world.run_maintenance().await.is_empty());

        assert_eq!(world.store().read(|s| s.version).await, version);
        assert!(!world.publish().await);
    }

    // =========================================================================
    // RACES
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_buyers_respect_capacity() {
        let (world, _) = world();
        let fish_stall = PropertyId(3);
        let mut buyers = Vec::new();
        for i in 0..8 {
            buyers.push(join(&world, &format!("buyer{i}")).await);
        }

        let handles: Vec<_> = buyers
            .iter()
            .map(|&pid| {
                let world = world.clone();
                tokio::spawn(async move { world.buy_property(pid, fish_stall).await })
            })
            .collect();

        let mut wins = 0;
        let mut capacity_errors = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(WorldError::Market(MarketError::CapacityReached { .. })) => capacity_errors += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(capacity_errors, 7);
        assert_eq!(world.store().read(|s| s.owner_count(fish_stall)).await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_accept_single_holder() {
        let (world, _) = world();
        world.run_maintenance().await;
        let job_id = world.snapshot_now().await.jobs[0].id;
        let mut players = Vec::new();
        for i in 0..6 {
            players.push(join(&world, &format!("courier{i}")).await);
        }

        let handles: Vec<_> = players
            .iter()
            .map(|&pid| {
                let world = world.clone();
                tokio::spawn(async move { world.accept_job(pid, job_id).await })
            })
            .collect();

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => wins += 1,
                Err(WorldError::Job(JobError::WrongStatus { .. })) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(wins, 1);
        let job = world.snapshot_now().await.jobs.into_iter().find(|j| j.id == job_id).unwrap();
        assert_eq!(job.status, JobStatus::Accepted);
        assert!(job.player_id.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_harvest_pays_once() {
        let (world, clock) = world();
        let tree = world.snapshot_now().await.tree(TreeId(1)).cloned().unwrap();
        let mut players = Vec::new();
        for i in 0..4 {
            let pid = join(&world, &format!("logger{i}")).await;
            world.report_position(pid, tree.position.x, tree.position.y + 20.0).await.unwrap();
            world.begin_harvest(pid, tree.id).await.unwrap();
            players.push(pid);
        }
        clock.advance(Duration::seconds(5));

        let handles: Vec<_> = players
            .iter()
            .map(|&pid| {
                let world = world.clone();
                tokio::spawn(async move { world.complete_harvest(pid, tree.id).await })
            })
            .collect();

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(WorldError::Harvest(HarvestError::AlreadyHarvested)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_simultaneous_refills_post_one_batch() {
        let (world, _) = world();
        let a = join(&world, "Ada").await;
        let b = join(&world, "Bob").await;

        let (wa, wb) = (world.clone(), world.clone());
        let first = tokio::spawn(async move { wa.trigger_refill(RefillSource::Player(a)).await });
        let second = tokio::spawn(async move { wb.trigger_refill(RefillSource::Player(b)).await });
        let posted = first.await.unwrap() + second.await.unwrap();

        let target = world.config().jobs.refill_target;
        assert_eq!(posted, target);
        assert_eq!(world.store().read(|s| s.available_job_count()).await, target);
    }

    #[tokio::test]
    async fn test_refill_from_two_available() {
        let (world, _) = world();
        let pid = join(&world, "Ada").await;
        world.run_maintenance().await;

        // Leave exactly two jobs on the board
        world
            .store()
            .transact(|s| {
                let extra: Vec<JobId> = s.jobs.keys().copied().skip(2).collect();
                for id in extra {
                    s.jobs.remove(&id);
                }
                Ok::<_, WorldError>(())
            })
            .await
            .unwrap();

        assert_eq!(world.trigger_refill(RefillSource::Player(pid)).await, 3);
        assert_eq!(world.trigger_refill(RefillSource::Player(pid)).await, 0);
        assert_eq!(world.store().read(|s| s.available_job_count()).await, 5);
    }

    #[tokio::test]
    async fn test_delivery_flow() {
        let (world, _) = world();
        let pid = join(&world, "Ada").await;
        world.run_maintenance().await;
        let job = world.snapshot_now().await.jobs[0].clone();
        let cash = world.snapshot_now().await.player(pid).unwrap().cash;

        world.accept_job(pid, job.id).await.unwrap();
        assert!(matches!(
            world.pickup_parcel(pid, job.id).await,
            Err(WorldError::Job(JobError::TooFar { .. }))
        ));
        world.report_position(pid, job.pickup.x, job.pickup.y).await.unwrap();
        world.pickup_parcel(pid, job.id).await.unwrap();
        world.report_position(pid, job.dropoff.x, job.dropoff.y).await.unwrap();
        let paid = world.deliver_parcel(pid, job.id).await.unwrap();

        let after = world.snapshot_now().await;
        assert_eq!(after.player(pid).unwrap().cash, cash + paid);
    }
}
