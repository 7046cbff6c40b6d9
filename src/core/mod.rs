//! Core primitives.
//!
//! Vector math, the seeded RNG used for job generation, and the injected clock.

pub mod vec2;
pub mod rng;
pub mod clock;

// Re-export core types
pub use vec2::Vec2;
pub use rng::DeterministicRng;
pub use clock::{Clock, ManualClock, SystemClock};
