//! One container's terminal bridge.
//!
//! A [`Session`] owns at most one [`BridgeProcess`] for its whole life. The
//! process is set once by the supervisor and released exactly once through
//! [`Session::teardown_locked`], whether by the reaper, by failed startup
//! cleanup or at shutdown.
//!
//! ## Locks
//!
//! - `lifecycle` (async) guards `state` and `process`. Held across the whole
//!   startup so concurrent first requests for the same container serialize.
//! - `last_accessed` (sync, never held across `.await`) is touched by every
//!   proxied request without contending on `lifecycle`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::bridge::BridgeProcess;

/// Session lifecycle.
///
/// `Empty → Starting → Ready` on success. `Starting → Failed` is a dead end:
/// the session is dropped from the registry and the next request builds a new
/// one. `Terminated` is set by teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Starting,
    Ready,
    Failed,
    Terminated,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Terminated => "terminated",
        }
    }
}

/// State guarded by the per-session lock.
pub struct Lifecycle {
    pub state: SessionState,
    pub process: Option<Box<dyn BridgeProcess>>,
}

pub struct Session {
    container_id: String,
    socket_path: PathBuf,
    lifecycle: Mutex<Lifecycle>,
    last_accessed: StdMutex<Instant>,
}

impl Session {
    pub fn new(container_id: String, socket_path: PathBuf) -> Self {
        Self {
            container_id,
            socket_path,
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Empty,
                process: None,
            }),
            last_accessed: StdMutex::new(Instant::now()),
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Acquire the per-session lock.
    pub async fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().await
    }

    /// Current state. Waits if a startup is in progress.
    pub async fn state(&self) -> SessionState {
        self.lifecycle.lock().await.state
    }

    pub fn last_accessed(&self) -> Instant {
        *self
            .last_accessed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a successfully proxied request. Strictly increasing even when
    /// two touches land on the same clock reading.
    pub fn touch(&self) -> Instant {
        let mut last = self
            .last_accessed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        *last = if now > *last {
            now
        } else {
            *last + Duration::from_nanos(1)
        };
        *last
    }

    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_accessed())
    }

    /// Terminate the process (if any), delete the socket file and settle in
    /// `final_state`. The caller holds the session lock.
    pub fn teardown_locked(&self, lifecycle: &mut Lifecycle, final_state: SessionState) {
        if let Some(process) = lifecycle.process.take() {
            let pid = process.pid();
            process.terminate();
            info!("Session {}: bridge (pid {pid:?}) terminated", self.container_id);
        }
        remove_socket_file(&self.socket_path);
        lifecycle.state = final_state;
    }

    /// Lock, then tear down into [`SessionState::Terminated`].
    pub async fn teardown(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        self.teardown_locked(&mut lifecycle, SessionState::Terminated);
    }
}

/// Delete a socket file, ignoring a file that is already gone.
pub fn remove_socket_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove socket {}: {e}", path.display()),
    }
}
