//! Game Logic Module
//!
//! The shared world and every rule that mutates it.
//!
//! ## Module Structure
//!
//! - `zone`: Point-to-zone lookup and zone speed rules
//! - `state`: Players, properties, trees, jobs and the world state
//! - `store`: Transactional store, snapshot and event channels
//! - `world`: Facade binding config, store and clock
//! - `collision`: Static obstacles for movement
//! - `position`: Position sink and trust policy
//! - `resource`: Tree growth and harvesting
//! - `jobs`: Delivery job board and lifecycle
//! - `market`: Property buying, selling and income
//! - `trade`: Item shop
//! - `tick`: Periodic maintenance sweep
//! - `events`: World events for subscribers

pub mod zone;
pub mod state;
pub mod store;
pub mod world;
pub mod collision;
pub mod position;
pub mod resource;
pub mod jobs;
pub mod market;
pub mod trade;
pub mod tick;
pub mod events;

// Re-export key types
pub use zone::{Zone, ZoneId, ZoneIndex};
pub use state::{
    GrowthStage, Job, JobId, JobStatus, Player, PlayerId, PropertyId, RefillSource, TreeId,
    WorldSnapshot, WorldState,
};
pub use store::WorldStore;
pub use world::{World, WorldError};
pub use position::TrustPolicy;
pub use events::{WorldEvent, WorldEventData};
