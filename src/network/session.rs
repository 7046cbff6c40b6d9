//! Connection Session Management
//!
//! Tracks which connection speaks for which player and routes outgoing
//! messages to them. World state itself lives in the store; a session only
//! holds the connection's channel and liveness.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::game::state::PlayerId;
use crate::network::protocol::ServerMessage;

/// Unique session identifier.
pub type SessionId = [u8; 16];

/// A joined connection.
#[derive(Debug)]
pub struct PlayerSession {
    /// Session identifier.
    pub id: SessionId,
    /// Player this connection speaks for.
    pub player_id: PlayerId,
    /// Message channel to the connection.
    pub sender: mpsc::Sender<ServerMessage>,
    /// When the session was created.
    pub connected_at: Instant,
    /// Last message received.
    pub last_seen: Instant,
    /// Welcome delivered. Fan-out skips sessions until then.
    pub active: bool,
}

impl PlayerSession {
    /// Idle for longer than `timeout`.
    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        now.duration_since(self.last_seen) > timeout
    }
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The player already has a live connection.
    #[error("Player is already connected")]
    AlreadyConnected,

    /// Connection limit reached.
    #[error("Server is full ({max} sessions)")]
    Full {
        /// Session limit
        max: usize,
    },

    /// Session not found.
    #[error("Session not found")]
    SessionNotFound,
}

// =============================================================================
// SESSION REGISTRY
// =============================================================================

/// All joined connections.
pub struct SessionRegistry {
    /// Sessions by id.
    sessions: RwLock<BTreeMap<SessionId, PlayerSession>>,
    /// Player to session mapping.
    player_sessions: RwLock<BTreeMap<PlayerId, SessionId>>,
    /// Session limit.
    max_sessions: usize,
}

impl SessionRegistry {
    /// Create a registry holding at most `max_sessions`.
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            player_sessions: RwLock::new(BTreeMap::new()),
            max_sessions,
        }
    }

    /// Register a joined connection. It receives no fan-out until
    /// [`activate`](Self::activate) is called.
    pub async fn register(
        &self,
        player_id: PlayerId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<SessionId, SessionError> {
        let mut sessions = self.sessions.write().await;
        let mut player_sessions = self.player_sessions.write().await;

        if player_sessions.contains_key(&player_id) {
            return Err(SessionError::AlreadyConnected);
        }
        if sessions.len() >= self.max_sessions {
            return Err(SessionError::Full { max: self.max_sessions });
        }

        let id = uuid::Uuid::new_v4().into_bytes();
        let now = Instant::now();
        sessions.insert(
            id,
            PlayerSession {
                id,
                player_id,
                sender,
                connected_at: now,
                last_seen: now,
                active: false,
            },
        );
        player_sessions.insert(player_id, id);
        debug!(session = %hex::encode(&id[..4]), player = %player_id.short(), "Session registered");
        Ok(id)
    }

    /// Remove a session. Returns its player.
    pub async fn unregister(&self, id: &SessionId) -> Option<PlayerId> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.remove(id)?;
        let mut player_sessions = self.player_sessions.write().await;
        player_sessions.remove(&session.player_id);
        Some(session.player_id)
    }

    /// Record activity on a session.
    pub async fn touch(&self, id: &SessionId) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id).ok_or(SessionError::SessionNotFound)?;
        session.last_seen = Instant::now();
        Ok(())
    }

    /// Start fan-out to a session.
    pub async fn activate(&self, id: &SessionId) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id).ok_or(SessionError::SessionNotFound)?;
        session.active = true;
        Ok(())
    }

    /// Player a session speaks for.
    pub async fn player_for(&self, id: &SessionId) -> Option<PlayerId> {
        let sessions = self.sessions.read().await;
        sessions.get(id).map(|s| s.player_id)
    }

    /// Whether a player has a live connection.
    pub async fn is_connected(&self, player_id: &PlayerId) -> bool {
        let player_sessions = self.player_sessions.read().await;
        player_sessions.contains_key(player_id)
    }

    /// Send to one player. Returns false if they are not connected or their
    /// queue is full.
    pub async fn send_to(&self, player_id: &PlayerId, message: ServerMessage) -> bool {
        let Some(session_id) = self.player_sessions.read().await.get(player_id).copied() else {
            return false;
        };
        let sessions = self.sessions.read().await;
        match sessions.get(&session_id) {
            Some(session) => session.sender.try_send(message).is_ok(),
            None => false,
        }
    }

    /// Send to every session. Slow connections with a full queue miss the
    /// message. Returns the number of sessions reached.
    pub async fn broadcast(&self, message: &ServerMessage) -> usize {
        let sessions = self.sessions.read().await;
        let mut reached = 0;
        for session in sessions.values().filter(|s| s.active) {
            match session.sender.try_send(message.clone()) {
                Ok(()) => reached += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(player = %session.player_id.short(), "Outgoing queue full, dropping message");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        reached
    }

    /// Sessions idle for longer than `timeout`.
    pub async fn idle_sessions(&self, timeout: Duration) -> Vec<SessionId> {
        let now = Instant::now();
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|s| s.is_idle(now, timeout) || s.sender.is_closed())
            .map(|s| s.id)
            .collect()
    }

    /// Live session count.
    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_unregister() {
        let registry = SessionRegistry::default();
        let player_id = PlayerId::new([1; 16]);
        let (tx, _rx) = mpsc::channel(10);

        let id = registry.register(player_id, tx).await.unwrap();
        registry.activate(&id).await.unwrap();
        assert_eq!(registry.session_count().await, 1);
        assert_eq!(registry.player_for(&id).await, Some(player_id));
        assert!(registry.is_connected(&player_id).await);

        assert_eq!(registry.unregister(&id).await, Some(player_id));
        assert_eq!(registry.session_count().await, 0);
        assert!(!registry.is_connected(&player_id).await);
    }

    #[tokio::test]
    async fn test_one_connection_per_player() {
        let registry = SessionRegistry::default();
        let player_id = PlayerId::new([1; 16]);
        let (tx1, _rx1) = mpsc::channel(10);
        let (tx2, _rx2) = mpsc::channel(10);

        registry.register(player_id, tx1).await.unwrap();
        assert_eq!(registry.register(player_id, tx2).await, Err(SessionError::AlreadyConnected));
    }

    #[tokio::test]
    async fn test_capacity() {
        let registry = SessionRegistry::new(2);
        let mut receivers = Vec::new();
        for i in 0..2 {
            let (tx, rx) = mpsc::channel(10);
            receivers.push(rx);
            registry.register(PlayerId::new([i; 16]), tx).await.unwrap();
        }
        let (tx, _rx) = mpsc::channel(10);
        assert_eq!(
            registry.register(PlayerId::new([9; 16]), tx).await,
            Err(SessionError::Full { max: 2 })
        );
    }

    #[tokio::test]
    async fn test_broadcast_and_send_to() {
        let registry = SessionRegistry::default();
        let a = PlayerId::new([1; 16]);
        let b = PlayerId::new([2; 16]);
        let (tx_a, mut rx_a) = mpsc::channel(10);
        let (tx_b, mut rx_b) = mpsc::channel(10);
        let id_a = registry.register(a, tx_a).await.unwrap();
        let id_b = registry.register(b, tx_b).await.unwrap();
        registry.activate(&id_a).await.unwrap();
        registry.activate(&id_b).await.unwrap();

        let reached = registry
            .broadcast(&ServerMessage::Shutdown { reason: "bye".into() })
            .await;
        assert_eq!(reached, 2);
        assert!(matches!(rx_a.recv().await, Some(ServerMessage::Shutdown { .. })));
        assert!(matches!(rx_b.recv().await, Some(ServerMessage::Shutdown { .. })));

        assert!(registry.send_to(&a, ServerMessage::Pong { timestamp: 1, server_time: 2 }).await);
        assert!(matches!(rx_a.recv().await, Some(ServerMessage::Pong { timestamp: 1, .. })));
        assert!(!registry.send_to(&PlayerId::new([3; 16]), ServerMessage::Pong { timestamp: 1, server_time: 2 }).await);
    }

    #[tokio::test]
    async fn test_closed_sessions_reported_idle() {
        let registry = SessionRegistry::default();
        let (tx, rx) = mpsc::channel(10);
        let id = registry.register(PlayerId::new([1; 16]), tx).await.unwrap();

        assert!(registry.idle_sessions(Duration::from_secs(300)).await.is_empty());
        drop(rx);
        assert_eq!(registry.idle_sessions(Duration::from_secs(300)).await, vec![id]);
        assert!(registry.touch(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_pending_session_skipped_by_broadcast() {
        let registry = SessionRegistry::default();
        let (tx, mut rx) = mpsc::channel(10);
        let id = registry.register(PlayerId::new([1; 16]), tx).await.unwrap();

        let shutdown = ServerMessage::Shutdown { reason: "bye".into() };
        assert_eq!(registry.broadcast(&shutdown).await, 0);
        assert!(rx.try_recv().is_err());

        registry.activate(&id).await.unwrap();
        assert_eq!(registry.broadcast(&shutdown).await, 1);
        assert!(matches!(rx.recv().await, Some(ServerMessage::Shutdown { .. })));
        assert_eq!(registry.activate(&[0; 16]).await, Err(SessionError::SessionNotFound));
    }
}
