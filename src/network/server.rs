//! WebSocket World Server
//!
//! Async WebSocket server in front of the shared world.
//! Handles joins, routes player actions to the world facade, and fans out
//! snapshots and events to every joined connection.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::config::{ConfigError, WorldConfig};
use crate::game::state::{PlayerId, RefillSource};
use crate::game::world::{World, WorldError};
use crate::network::protocol::{
    ActionResult, ClientMessage, ErrorCode, JoinRequest, PositionReport, ServerError,
    ServerMessage, WelcomeInfo,
};
use crate::network::session::{SessionError, SessionId, SessionRegistry};
use crate::{TICK_RATE, VERSION};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Joined sessions silent for longer than this are dropped.
    pub idle_timeout: Duration,
    /// How often a changed world is published to clients.
    pub snapshot_interval: Duration,
    /// How often the maintenance sweep runs.
    pub maintenance_interval: Duration,
    /// How often idle sessions are swept.
    pub cleanup_interval: Duration,
    /// Optional world config file. Built-in defaults otherwise.
    pub world_config_path: Option<PathBuf>,
    /// Overrides the world config's seed.
    pub seed: Option<u64>,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            snapshot_interval: Duration::from_millis(100),
            maintenance_interval: Duration::from_secs(1),
            cleanup_interval: Duration::from_secs(60),
            world_config_path: None,
            seed: None,
            version: VERSION.to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `HARBORTOWN_*` environment variables.
    pub fn from_env() -> Result<Self, GameServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GameServerError> {
        fn parse<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, GameServerError> {
            value
                .parse()
                .map_err(|_| GameServerError::InvalidEnv { var, value })
        }

        let mut config = Self::default();
        if let Some(v) = lookup("HARBORTOWN_BIND_ADDR") {
            config.bind_addr = parse("HARBORTOWN_BIND_ADDR", v)?;
        }
        if let Some(v) = lookup("HARBORTOWN_MAX_CONNECTIONS") {
            config.max_connections = parse("HARBORTOWN_MAX_CONNECTIONS", v)?;
        }
        if let Some(v) = lookup("HARBORTOWN_WORLD_CONFIG") {
            config.world_config_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("HARBORTOWN_SEED") {
            config.seed = Some(parse("HARBORTOWN_SEED", v)?);
        }
        Ok(config)
    }

    /// Load the world config this server should run.
    pub fn load_world_config(&self) -> Result<WorldConfig, ConfigError> {
        let mut world = match &self.world_config_path {
            Some(path) => WorldConfig::from_json_file(path)?,
            None => WorldConfig::default(),
        };
        if let Some(seed) = self.seed {
            world.seed = seed;
        }
        world.validate()?;
        Ok(world)
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Bad environment override.
    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
    },

    /// World config failed to load.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// World failed to start.
    #[error("World error: {0}")]
    World(#[from] WorldError),
}

impl From<&SessionError> for ServerError {
    fn from(e: &SessionError) -> Self {
        let code = match e {
            SessionError::AlreadyConnected => ErrorCode::Conflict,
            SessionError::Full { .. } => ErrorCode::ServerOverloaded,
            SessionError::SessionNotFound => ErrorCode::NotJoined,
        };
        ServerError::new(code, e.to_string())
    }
}

/// Per-connection state owned by the connection task.
struct Connection {
    addr: SocketAddr,
    /// Set once the connection has joined.
    joined: Option<(SessionId, PlayerId)>,
    /// Client sent `leave`.
    leaving: bool,
    sender: mpsc::Sender<ServerMessage>,
}

impl Connection {
    fn new(addr: SocketAddr, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            addr,
            joined: None,
            leaving: false,
            sender,
        }
    }

    fn player_id(&self) -> Option<PlayerId> {
        self.joined.map(|(_, player_id)| player_id)
    }
}

/// The world server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// The shared world.
    world: Arc<World>,
    /// Joined connections.
    sessions: Arc<SessionRegistry>,
    /// Open sockets, joined or not.
    connections: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server running the world described by `config`.
    pub fn new(config: ServerConfig) -> Result<Self, GameServerError> {
        let world = World::new(config.load_world_config()?)?;
        Ok(Self::with_world(config, Arc::new(world)))
    }

    /// Create a server in front of an existing world.
    pub fn with_world(config: ServerConfig, world: Arc<World>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            sessions: Arc::new(SessionRegistry::new(config.max_connections)),
            config,
            world,
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Bind and run until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run on an already bound listener until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("World server listening on {}", listener.local_addr()?);

        let background = [
            tokio::spawn(Self::run_maintenance_loop(
                self.world.clone(),
                self.config.maintenance_interval,
            )),
            tokio::spawn(Self::run_snapshot_loop(
                self.world.clone(),
                self.sessions.clone(),
                self.config.snapshot_interval,
            )),
            tokio::spawn(Self::run_event_loop(self.world.clone(), self.sessions.clone())),
            tokio::spawn(Self::run_cleanup_loop(
                self.sessions.clone(),
                self.config.cleanup_interval,
                self.config.idle_timeout,
            )),
        ];

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connections.load(Ordering::Acquire) >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        for handle in background {
            handle.abort();
        }
        self.world.publish().await;

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let world = self.world.clone();
        let sessions = self.sessions.clone();
        let connections = self.connections.clone();
        let version = self.config.version.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        connections.fetch_add(1, Ordering::AcqRel);

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    connections.fetch_sub(1, Ordering::AcqRel);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            // Outgoing messages. A shutdown notice is the last thing sent.
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let closing = matches!(msg, ServerMessage::Shutdown { .. });
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() || closing {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            let mut conn = Connection::new(addr, msg_tx.clone());

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        let client_msg = match msg {
                            Some(Ok(Message::Text(text))) => match ClientMessage::from_json(&text) {
                                Ok(m) => m,
                                Err(e) => {
                                    debug!("Invalid message from {}: {}", addr, e);
                                    let _ = msg_tx.send(ServerMessage::Error(ServerError::new(
                                        ErrorCode::InvalidInput,
                                        "Invalid message format",
                                    ))).await;
                                    continue;
                                }
                            },
                            // Binary frames carry bare position reports.
                            Some(Ok(Message::Binary(data))) => match PositionReport::from_bytes(&data) {
                                Ok(report) => ClientMessage::ReportPosition(report),
                                Err(e) => {
                                    debug!("Invalid binary frame from {}: {}", addr, e);
                                    continue;
                                }
                            },
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => continue,
                        };

                        if let Some((session_id, _)) = conn.joined {
                            if sessions.touch(&session_id).await.is_err() {
                                // Swept as idle.
                                conn.joined = None;
                            }
                        }

                        if let Some(reply) = Self::handle_client_message(
                            &mut conn,
                            client_msg,
                            &world,
                            &sessions,
                            &version,
                        ).await {
                            if msg_tx.send(reply).await.is_err() {
                                break;
                            }
                        }

                        if conn.leaving {
                            break;
                        }
                    }
                    _ = msg_tx.closed() => {
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            if let Some((session_id, player_id)) = conn.joined.take() {
                sessions.unregister(&session_id).await;
                info!(player = %player_id.short(), "Player left");
            }
            drop(conn);
            drop(msg_tx);
            let _ = sender_task.await;
            connections.fetch_sub(1, Ordering::AcqRel);

            debug!("Client {} cleaned up", addr);
        });
    }

    /// Handle one client message. Returns the direct reply, if any.
    async fn handle_client_message(
        conn: &mut Connection,
        msg: ClientMessage,
        world: &World,
        sessions: &SessionRegistry,
        version: &str,
    ) -> Option<ServerMessage> {
        let player_id = match msg {
            ClientMessage::Join(req) => {
                return Self::handle_join(conn, req, world, sessions, version).await;
            }
            ClientMessage::Ping { timestamp } => {
                return Some(ServerMessage::Pong {
                    timestamp,
                    server_time: world.now().timestamp_millis().max(0) as u64,
                });
            }
            ClientMessage::Leave => {
                conn.leaving = true;
                return None;
            }
            _ => match conn.player_id() {
                Some(id) => id,
                None => {
                    return Some(ServerMessage::Error(ServerError::new(
                        ErrorCode::NotJoined,
                        "Must join first",
                    )));
                }
            },
        };

        let reply = match msg {
            ClientMessage::ReportPosition(report) => reply(
                world.report_position(player_id, report.x, report.y).await,
                |pos| ActionResult::PositionAck { tick: report.tick, x: pos.x, y: pos.y },
            ),
            ClientMessage::BeginHarvest { tree_id } => reply(
                world.begin_harvest(player_id, tree_id).await,
                |ticket| ActionResult::HarvestStarted { ticket },
            ),
            ClientMessage::CompleteHarvest { tree_id } => reply(
                world.complete_harvest(player_id, tree_id).await,
                |wood_gained| ActionResult::HarvestCompleted { tree_id, wood_gained },
            ),
            ClientMessage::CancelHarvest => {
                let was_active = world.cancel_harvest(player_id).await;
                ServerMessage::Result(ActionResult::HarvestCancelled { was_active })
            }
            ClientMessage::AcceptJob { job_id } => reply(
                world.accept_job(player_id, job_id).await,
                |()| ActionResult::JobAccepted { job_id },
            ),
            ClientMessage::PickupParcel { job_id } => reply(
                world.pickup_parcel(player_id, job_id).await,
                |()| ActionResult::ParcelPickedUp { job_id },
            ),
            ClientMessage::DeliverParcel { job_id } => reply(
                world.deliver_parcel(player_id, job_id).await,
                |payout| ActionResult::JobDelivered { job_id, payout },
            ),
            ClientMessage::CancelJob { job_id } => reply(
                world.cancel_job(player_id, job_id).await,
                |()| ActionResult::JobCancelled { job_id },
            ),
            ClientMessage::RefillJobs => {
                let posted = world.trigger_refill(RefillSource::Player(player_id)).await;
                ServerMessage::Result(ActionResult::JobsRefilled { posted })
            }
            ClientMessage::BuyProperty { property_id } => reply(
                world.buy_property(player_id, property_id).await,
                |price| ActionResult::PropertyBought { property_id, price },
            ),
            ClientMessage::SellProperty { property_id } => reply(
                world.sell_property(player_id, property_id).await,
                |credit| ActionResult::PropertySold { property_id, credit },
            ),
            ClientMessage::CollectIncome => reply(
                world.collect_income(player_id).await,
                ActionResult::IncomeCollected,
            ),
            ClientMessage::BuyItem { item, quantity } => {
                let result = world.buy_item(player_id, &item, quantity).await;
                reply(result, |cost| ActionResult::ItemBought { item, quantity, cost })
            }
            ClientMessage::SellItem { item, quantity } => {
                let result = world.sell_item(player_id, &item, quantity).await;
                reply(result, |credit| ActionResult::ItemSold { item, quantity, credit })
            }
            ClientMessage::ConsumeItem { item } => {
                let result = world.consume_item(player_id, &item).await;
                reply(result, |hunger| ActionResult::ItemConsumed { item, hunger })
            }
            ClientMessage::EquipItem { item } => {
                let result = world.equip_item(player_id, &item).await;
                reply(result, |replaced| ActionResult::ItemEquipped { item, replaced })
            }
            ClientMessage::SyncRequest => {
                ServerMessage::Snapshot(Arc::new(world.snapshot_now().await))
            }
            ClientMessage::Join(_) | ClientMessage::Ping { .. } | ClientMessage::Leave => {
                return None;
            }
        };

        if let ServerMessage::Error(e) = &reply {
            debug!(addr = %conn.addr, player = %player_id.short(), code = ?e.code, "Action rejected: {}", e.message);
        }
        Some(reply)
    }

    /// Handle a join. On success the welcome and then a full snapshot are
    /// queued directly and nothing is returned.
    async fn handle_join(
        conn: &mut Connection,
        req: JoinRequest,
        world: &World,
        sessions: &SessionRegistry,
        version: &str,
    ) -> Option<ServerMessage> {
        if conn.joined.is_some() {
            return Some(ServerMessage::Error(ServerError::new(ErrorCode::WrongState, "Already joined")));
        }
        if !versions_compatible(&req.client_version, version) {
            return Some(ServerMessage::Error(ServerError::new(
                ErrorCode::VersionMismatch,
                format!("Client {} is not compatible with server {}", req.client_version, version),
            )));
        }

        let player = match world.join(req.parsed_player_id(), &req.name).await {
            Ok(p) => p,
            Err(e) => return Some(ServerMessage::rejected(&e)),
        };

        let session_id = match sessions.register(player.id, conn.sender.clone()).await {
            Ok(id) => id,
            Err(e) => return Some(ServerMessage::Error(ServerError::from(&e))),
        };
        conn.joined = Some((session_id, player.id));

        info!(addr = %conn.addr, player = %player.id.short(), name = %player.name, "Player joined");

        let welcome = ServerMessage::Welcome(WelcomeInfo {
            session_id: hex::encode(session_id),
            player,
            server_version: version.to_string(),
            tick_rate: TICK_RATE,
        });
        // Welcome, then full state, then fan-out. The client knows its id
        // before any snapshot or event reaches it.
        if conn.sender.send(welcome).await.is_ok() {
            let snapshot = ServerMessage::Snapshot(Arc::new(world.snapshot_now().await));
            if conn.sender.send(snapshot).await.is_ok() {
                let _ = sessions.activate(&session_id).await;
            }
        }
        None
    }

    /// Run maintenance sweeps.
    async fn run_maintenance_loop(world: Arc<World>, period: Duration) {
        let mut interval = interval(period);

        loop {
            interval.tick().await;
            world.run_maintenance().await;
        }
    }

    /// Publish changed state and push it to every session.
    async fn run_snapshot_loop(world: Arc<World>, sessions: Arc<SessionRegistry>, period: Duration) {
        let mut interval = interval(period);

        loop {
            interval.tick().await;
            if world.publish().await {
                sessions.broadcast(&ServerMessage::Snapshot(world.snapshot())).await;
            }
        }
    }

    /// Forward committed events to every session.
    async fn run_event_loop(world: Arc<World>, sessions: Arc<SessionRegistry>) {
        let mut events = world.events();

        loop {
            match events.recv().await {
                Ok(event) => {
                    sessions.broadcast(&ServerMessage::Event(event)).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Drop idle and dead sessions.
    async fn run_cleanup_loop(sessions: Arc<SessionRegistry>, period: Duration, idle_timeout: Duration) {
        let mut interval = interval(period);

        loop {
            interval.tick().await;

            for session_id in sessions.idle_sessions(idle_timeout).await {
                if let Some(player_id) = sessions.player_for(&session_id).await {
                    let _ = sessions
                        .send_to(&player_id, ServerMessage::Shutdown { reason: "Idle timeout".to_string() })
                        .await;
                    sessions.unregister(&session_id).await;
                    info!(player = %player_id.short(), "Removed idle session");
                }
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// The world behind this server.
    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    /// Get open connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    /// Get joined session count.
    pub async fn session_count(&self) -> usize {
        self.sessions.session_count().await
    }
}

/// Wrap a world result as a direct reply.
fn reply<T>(result: Result<T, WorldError>, ok: impl FnOnce(T) -> ActionResult) -> ServerMessage {
    match result {
        Ok(value) => ServerMessage::Result(ok(value)),
        Err(e) => ServerMessage::rejected(&e),
    }
}

/// Same major version. An empty client version is accepted.
fn versions_compatible(client: &str, server: &str) -> bool {
    if client.is_empty() {
        return true;
    }
    let major = |v: &str| v.split('.').next().map(str::to_owned);
    major(client) == major(server)
}
