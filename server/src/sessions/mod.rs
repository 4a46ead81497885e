//! Session registry and lifecycle.
//!
//! [`SessionRegistry`] maps a canonical container ID to its [`Session`]. It
//! only creates, looks up and removes entries; starting bridges is the
//! [`supervisor::Supervisor`]'s job and reclaiming idle ones is
//! [`SessionRegistry::sweep_idle`]'s.
//!
//! ## Concurrency
//!
//! The map sits behind an `RwLock`. Lookups take a read lock, inserts and
//! removals a write lock, and neither is held across process I/O. A session
//! lock may be held while taking the registry lock (failure cleanup, reaping),
//! never the reverse.

pub mod session;
pub mod supervisor;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::SessionsConfig;
pub use session::{Session, SessionState};

/// Concurrency-safe map of live sessions.
///
/// Cloneable — all clones share the same inner `Arc<RwLock<...>>`.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
    socket_dir: PathBuf,
    socket_suffix: String,
}

impl SessionRegistry {
    pub fn new(config: &SessionsConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            socket_dir: PathBuf::from(&config.socket_dir),
            socket_suffix: config.socket_suffix.clone(),
        }
    }

    /// Socket path for a canonical container ID.
    pub fn socket_path(&self, container_id: &str) -> PathBuf {
        self.socket_dir
            .join(format!("{container_id}{}", self.socket_suffix))
    }

    /// Return the session for `container_id`, inserting a process-less one if
    /// absent. A concurrent insert for the same ID is reused, never replaced.
    pub async fn get_or_create(&self, container_id: &str) -> Arc<Session> {
        if let Some(session) = self.sessions.read().await.get(container_id) {
            return Arc::clone(session);
        }

        let mut sessions = self.sessions.write().await;
        let total = sessions.len();
        let session = sessions.entry(container_id.to_string()).or_insert_with(|| {
            info!("Session {container_id} created, total: {}", total + 1);
            Arc::new(Session::new(
                container_id.to_string(),
                self.socket_path(container_id),
            ))
        });
        Arc::clone(session)
    }

    /// Look up without creating.
    pub async fn get(&self, container_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(container_id).cloned()
    }

    /// Remove `container_id` if it still maps to `session`. A newer session
    /// registered under the same ID is left alone. Returns true if removed.
    pub async fn remove(&self, container_id: &str, session: &Arc<Session>) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(container_id) {
            Some(current) if Arc::ptr_eq(current, session) => {
                sessions.remove(container_id);
                info!(
                    "Session {container_id} removed, remaining: {}",
                    sessions.len()
                );
                true
            }
            _ => false,
        }
    }

    /// Stable copy of the current entries. No lock is held once this returns.
    pub async fn snapshot(&self) -> Vec<(String, Arc<Session>)> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(id, session)| (id.clone(), Arc::clone(session)))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Tear down every session idle for at least `threshold`.
    ///
    /// Works on a snapshot so new sessions are never blocked behind slow
    /// terminations. Staleness is re-checked under each session's lock, since
    /// a request may have touched it after the snapshot. Returns the evicted
    /// container IDs.
    pub async fn sweep_idle(&self, threshold: Duration) -> Vec<String> {
        let mut evicted = Vec::new();
        for (id, session) in self.snapshot().await {
            if session.idle_for() < threshold {
                continue;
            }
            let mut lifecycle = session.lock().await;
            if session.idle_for() < threshold || lifecycle.state == SessionState::Terminated {
                continue;
            }
            info!(
                "Session {id} idle for {}s ({}), reaping",
                session.idle_for().as_secs(),
                lifecycle.state.as_str()
            );
            session.teardown_locked(&mut lifecycle, SessionState::Terminated);
            self.remove(&id, &session).await;
            evicted.push(id);
        }
        if !evicted.is_empty() {
            debug!("Idle sweep evicted {} session(s)", evicted.len());
        }
        evicted
    }

    /// Tear down all sessions concurrently (used during shutdown).
    pub async fn terminate_all(&self) {
        let sessions = self.snapshot().await;
        let count = sessions.len();
        if count == 0 {
            return;
        }
        let teardowns = sessions.iter().map(|(id, session)| async move {
            session.teardown().await;
            self.remove(id, session).await;
        });
        futures::future::join_all(teardowns).await;
        info!("Shut down {count} session(s)");
    }
}
