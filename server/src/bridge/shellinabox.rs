//! shellinabox-backed bridge.
//!
//! `shellinaboxd` is started in unix-domain-only mode so it never opens a TCP
//! port. Its single service runs the runtime CLI's `exec` into the target
//! container as `root`, preferring bash and falling back to sh.
//!
//! The daemon is spawned in its own process group (`setpgid(0, 0)` in
//! `pre_exec`) so termination reaches the whole tree, including the `exec`
//! client it forks per browser tab.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{Bridge, BridgeProcess};
use crate::config::BridgeConfig;
use crate::error::ShellError;

/// Prefer a full shell, fall back to a minimal one.
const SHELL_SELECTOR: &str = "if command -v bash >/dev/null 2>&1; then exec bash; else exec sh; fi";

/// Launches one `shellinaboxd` per container.
pub struct ShellInABox {
    config: BridgeConfig,
}

impl ShellInABox {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// Command-line arguments for a bridge into `container_id` listening on
    /// `socket_path`.
    pub fn args(&self, container_id: &str, socket_path: &Path) -> Vec<String> {
        let user = &self.config.user;
        let group = &self.config.group;
        let exec = format!(
            "{} exec -it -u root {container_id} /bin/sh -c '{SHELL_SELECTOR}'",
            self.config.runtime_cli
        );
        vec![
            "--localhost-only".to_string(),
            "--disable-ssl".to_string(),
            "--no-beep".to_string(),
            format!(
                "--unixdomain-only={}:{user}:{group}:0777",
                socket_path.display()
            ),
            format!("--service=/:{user}:{group}:/:{exec}"),
        ]
    }
}

#[async_trait]
impl Bridge for ShellInABox {
    async fn start(
        &self,
        container_id: &str,
        socket_path: &Path,
    ) -> Result<Box<dyn BridgeProcess>, ShellError> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(self.args(container_id, socket_path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        // SAFETY: setpgid is async-signal-safe per POSIX.
        unsafe {
            cmd.pre_exec(|| {
                libc::setpgid(0, 0);
                Ok(())
            });
        }
        let child = cmd
            .spawn()
            .map_err(|e| ShellError::Spawn(format!("{}: {e}", self.config.program)))?;

        info!(
            "Bridge for {container_id} spawned (pid {:?}, socket {})",
            child.id(),
            socket_path.display()
        );
        Ok(Box::new(BridgeChild {
            container_id: container_id.to_string(),
            child,
        }))
    }
}

/// A spawned `shellinaboxd`, leader of its own process group.
struct BridgeChild {
    container_id: String,
    child: Child,
}

impl BridgeProcess for BridgeChild {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn terminate(self: Box<Self>) {
        let BridgeChild {
            container_id,
            mut child,
        } = *self;

        if let Some(pid) = child.id() {
            #[allow(clippy::cast_possible_wrap)]
            let pgid = pid as i32;
            // kill(-pgid, SIGTERM) reaches every process in the group
            let ret = unsafe { libc::kill(-pgid, libc::SIGTERM) };
            if ret != 0 {
                warn!(
                    "Bridge for {container_id}: SIGTERM to pgid {pid} failed: {}",
                    std::io::Error::last_os_error()
                );
            }
        }

        // Reap in the background; the process group has been told to exit.
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!("Bridge for {container_id} exited: {status}"),
                Err(e) => warn!("Bridge for {container_id} wait error: {e}"),
            }
        });
    }
}
