//! Terminal-bridging processes.
//!
//! A bridge exposes an interactive shell inside one container over HTTP on a
//! private Unix domain socket. The manager treats it as an opaque capability:
//!
//! - [`Bridge::start`] — launch for a container ID and socket path
//! - [`Bridge::is_ready`] — has the socket appeared yet?
//! - [`BridgeProcess::terminate`] — signal the process, do not wait
//!
//! [`shellinabox::ShellInABox`] is the production implementation.

use std::path::Path;

use async_trait::async_trait;

use crate::error::ShellError;

pub mod shellinabox;

#[async_trait]
pub trait Bridge: Send + Sync {
    /// Launch a bridge that will create its socket at `socket_path`.
    ///
    /// Returns as soon as the process is spawned; readiness is observed
    /// separately through [`Bridge::is_ready`].
    async fn start(
        &self,
        container_id: &str,
        socket_path: &Path,
    ) -> Result<Box<dyn BridgeProcess>, ShellError>;

    /// Readiness is the existence of the socket file.
    fn is_ready(&self, socket_path: &Path) -> bool {
        socket_path.exists()
    }
}

/// A running bridge owned by exactly one session.
pub trait BridgeProcess: Send + Sync {
    /// OS process ID, when known.
    fn pid(&self) -> Option<u32>;

    /// Send a graceful termination signal. Consumes the handle; the process is
    /// reaped in the background.
    fn terminate(self: Box<Self>);
}
