//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Text frames carry JSON messages tagged by `type`. Position reports, the
//! most frequent message, may also arrive as bincode binary frames.

use std::sync::Arc;
use serde::{Serialize, Deserialize};

use crate::game::events::WorldEvent;
use crate::game::jobs::JobError;
use crate::game::market::{IncomeReport, MarketError};
use crate::game::position::PositionError;
use crate::game::resource::HarvestError;
use crate::game::state::{HarvestTicket, JobId, Player, PlayerId, PropertyId, TreeId, WorldSnapshot};
use crate::game::trade::TradeError;
use crate::game::world::WorldError;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter the world, resuming `player_id` if given.
    Join(JoinRequest),

    /// Simulated position.
    ReportPosition(PositionReport),

    /// Start harvesting a tree.
    BeginHarvest { tree_id: TreeId },

    /// Finish the current harvest.
    CompleteHarvest { tree_id: TreeId },

    /// Abandon the current harvest.
    CancelHarvest,

    /// Take a job.
    AcceptJob { job_id: JobId },

    /// Collect a job's parcel.
    PickupParcel { job_id: JobId },

    /// Deliver a job's parcel.
    DeliverParcel { job_id: JobId },

    /// Give a job back.
    CancelJob { job_id: JobId },

    /// Ask for a board refill.
    RefillJobs,

    /// Buy a property stake.
    BuyProperty { property_id: PropertyId },

    /// Sell a property stake.
    SellProperty { property_id: PropertyId },

    /// Collect property income.
    CollectIncome,

    /// Buy from the item shop.
    BuyItem { item: String, quantity: u32 },

    /// Sell to the item shop.
    SellItem { item: String, quantity: u32 },

    /// Eat a food item.
    ConsumeItem { item: String },

    /// Wear a clothing item.
    EquipItem { item: String },

    /// Request the latest snapshot now.
    SyncRequest,

    /// Ping for latency measurement.
    Ping { timestamp: u64 },

    /// Player is leaving.
    Leave,
}

/// Join request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Returning player's id (UUID string).
    #[serde(default)]
    pub player_id: Option<String>,
    /// Display name.
    pub name: String,
    /// Client version for compatibility check.
    pub client_version: String,
}

impl JoinRequest {
    /// Parse the returning player id, if any and well-formed.
    pub fn parsed_player_id(&self) -> Option<PlayerId> {
        self.player_id.as_deref().and_then(PlayerId::from_uuid_str)
    }
}

/// Position report, also sent standalone as a binary frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    /// Client movement tick the position belongs to.
    pub tick: u64,
    /// World X.
    pub x: f32,
    /// World Y.
    pub y: f32,
}

impl PositionReport {
    /// Encode as a binary frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decode a binary frame.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join accepted.
    Welcome(WelcomeInfo),

    /// Full world snapshot.
    Snapshot(Arc<WorldSnapshot>),

    /// Something happened in the world.
    Event(WorldEvent),

    /// Outcome of an accepted request.
    Result(ActionResult),

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Request rejected.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Sent once after a successful join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeInfo {
    /// Session identifier.
    pub session_id: String,
    /// The joined player.
    pub player: Player,
    /// Server version.
    pub server_version: String,
    /// Client movement tick rate.
    pub tick_rate: u32,
}

/// Outcome of an accepted request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionResult {
    /// Position stored (possibly clamped).
    PositionAck { tick: u64, x: f32, y: f32 },
    /// Harvest ticket issued.
    HarvestStarted { ticket: HarvestTicket },
    /// Harvest paid out.
    HarvestCompleted { tree_id: TreeId, wood_gained: u32 },
    /// Harvest dropped.
    HarvestCancelled { was_active: bool },
    /// Job taken.
    JobAccepted { job_id: JobId },
    /// Parcel collected.
    ParcelPickedUp { job_id: JobId },
    /// Parcel delivered.
    JobDelivered { job_id: JobId, payout: u64 },
    /// Job given back.
    JobCancelled { job_id: JobId },
    /// Refill handled.
    JobsRefilled { posted: usize },
    /// Property bought.
    PropertyBought { property_id: PropertyId, price: u64 },
    /// Property sold.
    PropertySold { property_id: PropertyId, credit: u64 },
    /// Income credited.
    IncomeCollected(IncomeReport),
    /// Items bought.
    ItemBought { item: String, quantity: u32, cost: u64 },
    /// Items sold.
    ItemSold { item: String, quantity: u32, credit: u64 },
    /// Food eaten.
    ItemConsumed { item: String, hunger: u8 },
    /// Clothing worn.
    ItemEquipped { item: String, replaced: Option<String> },
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Create an error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl From<&WorldError> for ServerError {
    fn from(e: &WorldError) -> Self {
        Self::new(ErrorCode::from(e), e.to_string())
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Request before a successful join.
    NotJoined,
    /// Malformed message or argument.
    InvalidInput,
    /// Target does not exist.
    NotFound,
    /// Target is in the wrong state for this request.
    WrongState,
    /// Not the player's to act on.
    NotPermitted,
    /// Not enough cash or items.
    InsufficientFunds,
    /// Property has no free stake.
    CapacityReached,
    /// Outside the interact radius.
    TooFar,
    /// Action arrived too early.
    TooEarly,
    /// Someone else got there first.
    Conflict,
    /// Server overloaded.
    ServerOverloaded,
    /// Version mismatch.
    VersionMismatch,
    /// Internal error.
    InternalError,
}

impl From<&WorldError> for ErrorCode {
    fn from(e: &WorldError) -> Self {
        match e {
            WorldError::InvalidName(_) => ErrorCode::InvalidInput,
            WorldError::Config(_) => ErrorCode::InternalError,
            WorldError::Position(e) => match e {
                PositionError::NotJoined => ErrorCode::NotJoined,
                PositionError::NonFinite => ErrorCode::InvalidInput,
                PositionError::Implausible { .. } => ErrorCode::TooFar,
            },
            WorldError::Harvest(e) => match e {
                HarvestError::NotJoined => ErrorCode::NotJoined,
                HarvestError::TreeNotFound(_) => ErrorCode::NotFound,
                HarvestError::TooFar { .. } => ErrorCode::TooFar,
                HarvestError::NotHarvestable
                | HarvestError::NoActiveHarvest
                | HarvestError::TicketMismatch => ErrorCode::WrongState,
                HarvestError::TooEarly { .. } => ErrorCode::TooEarly,
                HarvestError::AlreadyHarvested => ErrorCode::Conflict,
            },
            WorldError::Job(e) => match e {
                JobError::NotJoined => ErrorCode::NotJoined,
                JobError::JobNotFound(_) => ErrorCode::NotFound,
                JobError::WrongStatus { .. } | JobError::AlreadyHoldingJob(_) => ErrorCode::WrongState,
                JobError::NotAssignee => ErrorCode::NotPermitted,
                JobError::TooFar { .. } => ErrorCode::TooFar,
            },
            WorldError::Market(e) => match e {
                MarketError::NotJoined => ErrorCode::NotJoined,
                MarketError::PropertyNotFound(_) => ErrorCode::NotFound,
                MarketError::PublicService | MarketError::NotOwned => ErrorCode::NotPermitted,
                MarketError::AlreadyOwned => ErrorCode::WrongState,
                MarketError::CapacityReached { .. } => ErrorCode::CapacityReached,
                MarketError::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
                MarketError::TooFar { .. } => ErrorCode::TooFar,
            },
            WorldError::Trade(e) => match e {
                TradeError::NotJoined => ErrorCode::NotJoined,
                TradeError::UnknownItem(_) => ErrorCode::NotFound,
                TradeError::NotForSale(_)
                | TradeError::NotBuyable(_)
                | TradeError::NotFood(_)
                | TradeError::NotClothing(_) => ErrorCode::NotPermitted,
                TradeError::InvalidQuantity => ErrorCode::InvalidInput,
                TradeError::InsufficientFunds { .. } | TradeError::NotEnoughItems { .. } => {
                    ErrorCode::InsufficientFunds
                }
            },
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Error message from a world rejection.
    pub fn rejected(e: &WorldError) -> Self {
        ServerMessage::Error(ServerError::from(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::events::WorldEventData;
    use chrono::Utc;

    #[test]
    fn test_client_message_tags() {
        let msg = ClientMessage::AcceptJob { job_id: JobId(7) };
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"accept_job""#));
        assert_eq!(ClientMessage::from_json(&json).unwrap(), msg);

        let parsed = ClientMessage::from_json(r#"{"type":"collect_income"}"#).unwrap();
        assert_eq!(parsed, ClientMessage::CollectIncome);
    }

    #[test]
    fn test_join_request_player_id() {
        let id = PlayerId::random();
        let msg = ClientMessage::from_json(&format!(
            r#"{{"type":"join","player_id":"{id}","name":"Ada","client_version":"0.1.0"}}"#
        ))
        .unwrap();
        match msg {
            ClientMessage::Join(join) => assert_eq!(join.parsed_player_id(), Some(id)),
            other => panic!("Wrong message type: {other:?}"),
        }

        let fresh = JoinRequest { player_id: Some("garbage".into()), name: "x".into(), client_version: "1".into() };
        assert_eq!(fresh.parsed_player_id(), None);
    }

    #[test]
    fn test_binary_position_report() {
        // Tagged enums do not survive bincode; position reports travel flat
        let report = PositionReport { tick: 42, x: 100.5, y: -3.0 };
        let bytes = report.to_bytes().unwrap();
        assert_eq!(PositionReport::from_bytes(&bytes).unwrap(), report);
    }

    #[test]
    fn test_snapshot_and_event_messages() {
        let snapshot = ServerMessage::Snapshot(Arc::new(WorldSnapshot::default()));
        let json = snapshot.to_json().unwrap();
        assert!(json.contains(r#""type":"snapshot""#));
        assert!(matches!(ServerMessage::from_json(&json).unwrap(), ServerMessage::Snapshot(_)));

        let event = ServerMessage::Event(WorldEvent::new(
            Utc::now(),
            WorldEventData::JobRetired { job_id: JobId(3) },
        ));
        let json = event.to_json().unwrap();
        assert!(json.contains(r#""event":"job_retired""#));
    }

    #[test]
    fn test_error_mapping() {
        let e = WorldError::Market(MarketError::CapacityReached { max_owners: 1 });
        let msg = ServerMessage::rejected(&e);
        let json = msg.to_json().unwrap();
        assert!(json.contains("capacity_reached"));

        let e = WorldError::Harvest(HarvestError::AlreadyHarvested);
        assert_eq!(ErrorCode::from(&e), ErrorCode::Conflict);
        let e = WorldError::Job(JobError::NotAssignee);
        assert_eq!(ErrorCode::from(&e), ErrorCode::NotPermitted);
    }

    #[test]
    fn test_action_result_shape() {
        let msg = ServerMessage::Result(ActionResult::IncomeCollected(IncomeReport {
            total_income: 45,
            properties_collected: 2,
        }));
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""action":"income_collected""#));
        assert!(json.contains(r#""total_income":45"#));
    }
}
