//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;
use std::time::Instant;

use crate::bridge::Bridge;
use crate::config::Config;
use crate::runtime::ContainerRuntime;
use crate::sessions::supervisor::{Readiness, Supervisor};
use crate::sessions::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
    /// Live sessions keyed by canonical container ID.
    pub registry: SessionRegistry,
    pub supervisor: Arc<Supervisor>,
    pub runtime: Arc<dyn ContainerRuntime>,
    /// Canonical ID of the container this manager runs in.
    pub self_id: Arc<str>,
}

impl AppState {
    pub fn new(
        config: Config,
        runtime: Arc<dyn ContainerRuntime>,
        bridge: Arc<dyn Bridge>,
        self_id: String,
    ) -> Self {
        let registry = SessionRegistry::new(&config.sessions);
        let supervisor = Supervisor::new(
            registry.clone(),
            Arc::clone(&runtime),
            bridge,
            self_id.clone(),
            Readiness::from(&config.sessions),
        );
        Self {
            config: Arc::new(config),
            start_time: Instant::now(),
            registry,
            supervisor: Arc::new(supervisor),
            runtime,
            self_id: Arc::from(self_id),
        }
    }
}
