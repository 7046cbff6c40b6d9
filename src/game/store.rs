//! World Store
//!
//! The single authoritative copy of [`WorldState`]. Writes go through
//! [`WorldStore::transact`], which runs the whole check-then-write closure
//! under the store's write lock, so two actors can never both act on the
//! same stale precondition. Reads come from published snapshots (`watch`)
//! and the event stream (`broadcast`).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch, RwLock};
use tracing::trace;

use crate::game::events::WorldEvent;
use crate::game::state::{WorldSnapshot, WorldState};

/// Event channel depth. Slow subscribers see `Lagged` and resync from a snapshot.
const EVENT_CAPACITY: usize = 1024;

/// Shared, transactional world store.
pub struct WorldStore {
    state: RwLock<WorldState>,
    snapshot_tx: watch::Sender<Arc<WorldSnapshot>>,
    event_tx: broadcast::Sender<WorldEvent>,
    published_version: AtomicU64,
}

impl WorldStore {
    /// Wrap an initial state and publish its first snapshot.
    pub fn new(state: WorldState, now: DateTime<Utc>) -> Self {
        let first = Arc::new(state.snapshot(now));
        let published_version = AtomicU64::new(state.version);
        let (snapshot_tx, _) = watch::channel(first);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            state: RwLock::new(state),
            snapshot_tx,
            event_tx,
            published_version,
        }
    }

    /// Run `f` atomically against the state.
    ///
    /// On `Ok` the state version is bumped and queued events are broadcast.
    /// On `Err` queued events are dropped; `f` must not have written anything
    /// before deciding to fail.
    pub async fn transact<T, E>(
        &self,
        f: impl FnOnce(&mut WorldState) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut state = self.state.write().await;
        match f(&mut state) {
            Ok(value) => {
                state.version += 1;
                let events = state.take_events();
                trace!(version = state.version, events = events.len(), "transaction committed");
                for event in events {
                    // No receivers is fine
                    let _ = self.event_tx.send(event);
                }
                Ok(value)
            }
            Err(e) => {
                state.discard_events();
                Err(e)
            }
        }
    }

    /// Run a read-only closure against the live state.
    pub async fn read<R>(&self, f: impl FnOnce(&WorldState) -> R) -> R {
        let state = self.state.read().await;
        f(&state)
    }

    /// Infallible write. The version only moves, and a snapshot only goes
    /// out, when `f` reports a visible change. Queued events are broadcast
    /// either way.
    pub async fn apply<T>(&self, f: impl FnOnce(&mut WorldState) -> (T, bool)) -> T {
        let mut state = self.state.write().await;
        let (value, changed) = f(&mut state);
        if changed {
            state.version += 1;
        }
        for event in state.take_events() {
            let _ = self.event_tx.send(event);
        }
        value
    }

    /// Publish a fresh snapshot if anything changed since the last one.
    /// Returns true when a snapshot was sent.
    pub async fn publish(&self, now: DateTime<Utc>) -> bool {
        // Writers are excluded until the send, so snapshots go out in version order
        let state = self.state.read().await;
        let previous = self.published_version.fetch_max(state.version, Ordering::AcqRel);
        if previous >= state.version {
            return false;
        }
        self.snapshot_tx.send_replace(Arc::new(state.snapshot(now)));
        true
    }

    /// Latest published snapshot.
    pub fn latest(&self) -> Arc<WorldSnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    /// Subscribe to published snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Arc<WorldSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Subscribe to committed events.
    pub fn events(&self) -> broadcast::Receiver<WorldEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::game::events::WorldEventData;
    use crate::game::state::{JobId, PlayerId};
    use crate::game::zone::ZoneIndex;

    fn store() -> WorldStore {
        let config = WorldConfig::default();
        let zones = ZoneIndex::new(&config.zones, &config.map);
        let now = Utc::now();
        WorldStore::new(WorldState::new(&config, &zones, now), now)
    }

    #[tokio::test]
    async fn test_commit_bumps_version_and_emits() {
        let store = store();
        let mut events = store.events();

        let out: Result<u32, ()> = store
            .transact(|s| {
                s.next_job_id = 10;
                s.push_event(Utc::now(), WorldEventData::JobRetired { job_id: JobId(9) });
                Ok(5)
            })
            .await;
        assert_eq!(out, Ok(5));
        assert_eq!(store.read(|s| s.version).await, 1);

        let event = events.recv().await.unwrap();
        assert_eq!(event.data, WorldEventData::JobRetired { job_id: JobId(9) });
    }

    #[tokio::test]
    async fn test_rejection_emits_nothing() {
        let store = store();
        let mut events = store.events();

        let out: Result<(), &str> = store
            .transact(|s| {
                s.push_event(Utc::now(), WorldEventData::JobRetired { job_id: JobId(1) });
                Err("nope")
            })
            .await;
        assert_eq!(out, Err("nope"));
        assert_eq!(store.read(|s| s.version).await, 0);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_only_on_change() {
        let store = store();
        let mut rx = store.subscribe();
        assert!(!store.publish(Utc::now()).await);

        let _: Result<(), ()> = store.transact(|s| { s.next_job_id += 1; Ok(()) }).await;
        assert!(store.publish(Utc::now()).await);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().version, 1);
        assert_eq!(store.latest().version, 1);
        assert!(!store.publish(Utc::now()).await);
    }

    #[tokio::test]
    async fn test_apply_without_change_keeps_version() {
        let store = store();
        let removed = store.apply(|s| (s.harvests.remove(&PlayerId::new([1; 16])).is_some(), false)).await;
        assert!(!removed);
        assert_eq!(store.read(|s| s.version).await, 0);
        assert!(!store.publish(Utc::now()).await);

        store.apply(|s| { s.next_job_id += 1; ((), true) }).await;
        assert_eq!(store.read(|s| s.version).await, 1);
        assert!(store.publish(Utc::now()).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publishers_leave_latest_current() {
        let store = Arc::new(store());
        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..50 {
                    if i % 2 == 0 {
                        let _: Result<(), ()> = store.transact(|s| { s.next_job_id += 1; Ok(()) }).await;
                    }
                    store.publish(Utc::now()).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        store.publish(Utc::now()).await;
        let version = store.read(|s| s.version).await;
        assert_eq!(version, 200);
        assert_eq!(store.latest().version, version);
    }
}
