//! Client-Side Simulation
//!
//! What each connected client runs locally: movement at the tick rate,
//! throttled position reports, smoothing of other players, harvest progress
//! timers and the job board watcher. Nothing here touches the shared store
//! directly.

pub mod input;
pub mod movement;
pub mod reporter;
pub mod interpolation;
pub mod harvest;
pub mod board;

pub use input::InputIntent;
pub use movement::{MotionState, MovementSimulator, Terrain};
pub use reporter::PositionReporter;
pub use interpolation::{RemotePlayers, Smoother};
pub use harvest::{CancelReason, Harvester, HarvestSession};
pub use board::BoardWatcher;
