//! Network Layer
//!
//! WebSocket server for the shared world.
//! This layer only routes; every rule lives in `game/`.

pub mod protocol;
pub mod session;
pub mod server;

pub use protocol::{
    ActionResult, ClientMessage, ErrorCode, JoinRequest, PositionReport, ServerError,
    ServerMessage, WelcomeInfo,
};
pub use session::{PlayerSession, SessionError, SessionId, SessionRegistry};
pub use server::{GameServer, GameServerError, ServerConfig};
