//! Container runtime inspection.
//!
//! The manager asks the runtime exactly one question: "what is the canonical
//! ID of this container, and is it running?". [`ContainerRuntime`] is the seam;
//! [`DockerRuntime`] answers it through the Docker Engine inspect endpoint.

use async_trait::async_trait;
use bollard::container::InspectContainerOptions;
use bollard::errors::Error as DockerError;
use bollard::{Docker, API_DEFAULT_VERSION};
use tracing::debug;

use crate::config::RuntimeConfig;
use crate::error::ShellError;

/// Seconds before a Docker API call is abandoned.
const DOCKER_TIMEOUT_SECS: u64 = 30;

/// What the runtime reports about one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Canonical (full) container ID.
    pub id: String,
    pub running: bool,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Inspect a container by name, short ID or full ID.
    ///
    /// Fails with [`ShellError::NotFound`] when the runtime does not know the
    /// container and [`ShellError::RuntimeUnavailable`] on transport errors.
    async fn inspect(&self, name_or_id: &str) -> Result<ContainerInfo, ShellError>;

    /// Resolve a user-supplied name or ID to the canonical container ID.
    async fn resolve(&self, name_or_id: &str) -> Result<String, ShellError> {
        Ok(self.inspect(name_or_id).await?.id)
    }

    async fn is_running(&self, container_id: &str) -> Result<bool, ShellError> {
        Ok(self.inspect(container_id).await?.running)
    }
}

/// [`ContainerRuntime`] backed by the Docker Engine API.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to `docker_host` if configured, otherwise to the local defaults
    /// (`DOCKER_HOST` or the standard unix socket).
    pub fn connect(config: &RuntimeConfig) -> Result<Self, ShellError> {
        let docker = match config.docker_host.as_deref() {
            Some(host) if host.starts_with("unix://") || host.starts_with('/') => {
                Docker::connect_with_unix(host, DOCKER_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            Some(host) => Docker::connect_with_http(host, DOCKER_TIMEOUT_SECS, API_DEFAULT_VERSION),
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| ShellError::RuntimeUnavailable(e.to_string()))?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn inspect(&self, name_or_id: &str) -> Result<ContainerInfo, ShellError> {
        match self
            .docker
            .inspect_container(name_or_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => {
                let id = info
                    .id
                    .ok_or_else(|| ShellError::NotFound(name_or_id.to_string()))?;
                let running = info.state.and_then(|s| s.running).unwrap_or(false);
                debug!("Inspected {name_or_id}: id={id}, running={running}");
                Ok(ContainerInfo { id, running })
            }
            Err(e) => Err(classify_docker_error(name_or_id, e)),
        }
    }
}

fn classify_docker_error(name_or_id: &str, err: DockerError) -> ShellError {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404, ..
        } => ShellError::NotFound(name_or_id.to_string()),
        other => ShellError::RuntimeUnavailable(other.to_string()),
    }
}

/// Resolve the canonical ID of the container this manager runs in.
///
/// Uses `hint` when configured, otherwise the hostname (Docker sets it to the
/// short container ID). Failure here is fatal at startup.
pub async fn identify_self(
    runtime: &dyn ContainerRuntime,
    hint: Option<&str>,
) -> Result<String, ShellError> {
    let name = match hint {
        Some(h) if !h.trim().is_empty() => h.trim().to_string(),
        _ => hostname().ok_or_else(|| ShellError::NotFound("<hostname>".to_string()))?,
    };
    runtime.resolve(&name).await
}

fn hostname() -> Option<String> {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}
