//! Bridge startup: guarantees a live socket before any traffic is forwarded.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::session::{remove_socket_file, Session, SessionState};
use super::SessionRegistry;
use crate::bridge::Bridge;
use crate::config::SessionsConfig;
use crate::error::ShellError;
use crate::runtime::ContainerRuntime;

/// How long to wait for a freshly spawned bridge to create its socket.
#[derive(Debug, Clone, Copy)]
pub struct Readiness {
    pub attempts: u32,
    pub interval: Duration,
}

impl From<&SessionsConfig> for Readiness {
    fn from(config: &SessionsConfig) -> Self {
        Self {
            attempts: config.readiness_attempts,
            interval: config.readiness_interval(),
        }
    }
}

pub struct Supervisor {
    registry: SessionRegistry,
    runtime: Arc<dyn ContainerRuntime>,
    bridge: Arc<dyn Bridge>,
    self_id: String,
    readiness: Readiness,
}

impl Supervisor {
    pub fn new(
        registry: SessionRegistry,
        runtime: Arc<dyn ContainerRuntime>,
        bridge: Arc<dyn Bridge>,
        self_id: String,
        readiness: Readiness,
    ) -> Self {
        Self {
            registry,
            runtime,
            bridge,
            self_id,
            readiness,
        }
    }

    /// Make sure `session` has a bridge whose socket exists.
    ///
    /// Runs under the session lock, so a second caller for the same session
    /// waits here and then finds it `Ready`. Only the first caller on an
    /// `Empty` session spawns a process.
    ///
    /// On spawn failure or readiness timeout the session is marked `Failed` and
    /// dropped from the registry so the next request starts clean.
    pub async fn ensure_ready(&self, session: &Arc<Session>) -> Result<(), ShellError> {
        let container_id = session.container_id();
        let mut lifecycle = session.lock().await;

        match lifecycle.state {
            SessionState::Ready => return Ok(()),
            // Eviction after a failure may have been cut short by a cancelled
            // request; finish it so the next lookup starts clean.
            SessionState::Failed => {
                self.registry.remove(container_id, session).await;
                return Err(ShellError::Starvation(container_id.to_string()));
            }
            SessionState::Terminated => {
                return Err(ShellError::SessionClosed(container_id.to_string()))
            }
            // A previous starter was cancelled after spawning; keep waiting on
            // the process it left behind.
            SessionState::Starting => {}
            SessionState::Empty => {
                if container_id == self.self_id {
                    warn!("Refused shell into the manager's own container {container_id}");
                    return Err(ShellError::Forbidden);
                }
                if !self.runtime.is_running(container_id).await? {
                    info!("Container {container_id} is not running, no bridge started");
                    return Err(ShellError::NotRunning(container_id.to_string()));
                }

                remove_socket_file(session.socket_path());
                match self.bridge.start(container_id, session.socket_path()).await {
                    Ok(process) => {
                        lifecycle.process = Some(process);
                        lifecycle.state = SessionState::Starting;
                    }
                    Err(e) => {
                        warn!("Session {container_id}: bridge failed to start: {e}");
                        lifecycle.state = SessionState::Failed;
                        self.registry.remove(container_id, session).await;
                        return Err(e);
                    }
                }
            }
        }

        if self.wait_for_socket(session).await {
            lifecycle.state = SessionState::Ready;
            info!(
                "Session {container_id} ready (socket {})",
                session.socket_path().display()
            );
            Ok(())
        } else {
            warn!(
                "Session {container_id}: no socket after {} attempt(s), giving up",
                self.readiness.attempts
            );
            session.teardown_locked(&mut lifecycle, SessionState::Failed);
            self.registry.remove(container_id, session).await;
            Err(ShellError::Starvation(container_id.to_string()))
        }
    }

    /// Poll for the socket file, sleeping between attempts.
    async fn wait_for_socket(&self, session: &Session) -> bool {
        for attempt in 0..self.readiness.attempts {
            if self.bridge.is_ready(session.socket_path()) {
                debug!(
                    "Session {}: socket ready after {attempt} poll(s)",
                    session.container_id()
                );
                return true;
            }
            tokio::time::sleep(self.readiness.interval).await;
        }
        self.bridge.is_ready(session.socket_path())
    }
}
