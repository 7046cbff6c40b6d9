//! # Harbortown World Server
//!
//! Persistent shared world for Harbortown: zones, client movement, tree
//! harvesting, a delivery job board, a property market and an item shop.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    HARBORTOWN SERVER                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │  core/               - Primitives                             │
//! │  ├── vec2.rs         - 2D float vector                        │
//! │  ├── rng.rs          - Seeded Xorshift128+ PRNG               │
//! │  └── clock.rs        - Injected wall clock                    │
//! │                                                               │
//! │  config.rs           - WorldConfig tables and validation      │
//! │                                                               │
//! │  game/               - Shared world (authoritative)           │
//! │  ├── zone.rs         - Point-to-zone lookup                   │
//! │  ├── state.rs        - Players, trees, jobs, properties       │
//! │  ├── store.rs        - Transactions, snapshots, events        │
//! │  ├── world.rs        - Facade over store, config and clock    │
//! │  ├── events.rs       - World events for subscribers           │
//! │  ├── collision.rs    - Static obstacles                       │
//! │  ├── position.rs     - Position sink and trust policy         │
//! │  ├── resource.rs     - Tree growth and harvest tickets        │
//! │  ├── jobs.rs         - Delivery job board                     │
//! │  ├── market.rs       - Property market and income             │
//! │  ├── trade.rs        - Item shop                              │
//! │  └── tick.rs         - Maintenance sweep                      │
//! │                                                               │
//! │  client/             - Per-client simulation                  │
//! │  ├── input.rs        - Directional intents                    │
//! │  ├── movement.rs     - Tick-rate movement with zone speeds    │
//! │  ├── reporter.rs     - Throttled position reports             │
//! │  ├── interpolation.rs - Remote player smoothing               │
//! │  ├── harvest.rs      - Local harvest progress timer           │
//! │  └── board.rs        - Job board refill requests              │
//! │                                                               │
//! │  network/            - Networking                             │
//! │  ├── server.rs       - WebSocket server                       │
//! │  ├── protocol.rs     - Message types                          │
//! │  └── session.rs      - Connection registry                    │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! Every operation that reads a precondition and then writes runs as one
//! transaction under the store's write lock. A rejected operation leaves
//! the world exactly as it found it.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod config;
pub mod game;
pub mod client;
pub mod network;

// Re-export commonly used types
pub use core::vec2::Vec2;
pub use core::clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, WorldConfig};
pub use game::state::{PlayerId, WorldSnapshot};
pub use game::world::{World, WorldError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Client movement tick rate (Hz)
pub const TICK_RATE: u32 = 60;
