//! In-process stand-ins for the container runtime and the bridge daemon.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::Barrier;
use tokio::task::JoinHandle;

use crate::bridge::{Bridge, BridgeProcess};
use crate::error::ShellError;
use crate::runtime::{ContainerInfo, ContainerRuntime};

struct FakeContainer {
    id: String,
    aliases: Vec<String>,
    running: bool,
}

/// Runtime answering from a fixed container table.
#[derive(Default)]
pub struct FakeRuntime {
    containers: Mutex<Vec<FakeContainer>>,
    unreachable: AtomicBool,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, id: &str, aliases: &[&str], running: bool) {
        self.containers.lock().unwrap().push(FakeContainer {
            id: id.to_string(),
            aliases: aliases.iter().map(ToString::to_string).collect(),
            running,
        });
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn inspect(&self, name_or_id: &str) -> Result<ContainerInfo, ShellError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ShellError::RuntimeUnavailable(
                "connection refused".to_string(),
            ));
        }
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == name_or_id || c.aliases.iter().any(|a| a == name_or_id))
            .map(|c| ContainerInfo {
                id: c.id.clone(),
                running: c.running,
            })
            .ok_or_else(|| ShellError::NotFound(name_or_id.to_string()))
    }
}

/// Bridge that binds the socket itself and answers every HTTP request with
/// `"<container_id> <request-target>"`.
pub struct FakeBridge {
    pub starts: AtomicUsize,
    pub terminations: Arc<AtomicUsize>,
    /// Request lines received across all sessions.
    pub requests: Arc<Mutex<Vec<String>>>,
    start_delay: Option<Duration>,
    barrier: Option<Arc<Barrier>>,
    ready: bool,
    fail: bool,
}

impl FakeBridge {
    pub fn new() -> Self {
        Self {
            starts: AtomicUsize::new(0),
            terminations: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            start_delay: None,
            barrier: None,
            ready: true,
            fail: false,
        }
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    /// Spawn succeeds but the socket never appears.
    pub fn never_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    /// Spawn itself fails.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl Bridge for FakeBridge {
    async fn start(
        &self,
        container_id: &str,
        socket_path: &Path,
    ) -> Result<Box<dyn BridgeProcess>, ShellError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ShellError::Spawn("no such program".to_string()));
        }
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }

        let server = if self.ready {
            let listener = UnixListener::bind(socket_path)
                .map_err(|e| ShellError::Spawn(e.to_string()))?;
            Some(tokio::spawn(serve(
                listener,
                container_id.to_string(),
                Arc::clone(&self.requests),
            )))
        } else {
            None
        };

        Ok(Box::new(FakeProcess {
            terminated: Arc::clone(&self.terminations),
            server,
        }))
    }
}

async fn serve(listener: UnixListener, container_id: String, requests: Arc<Mutex<Vec<String>>>) {
    while let Ok((mut stream, _)) = listener.accept().await {
        let container_id = container_id.clone();
        let requests = Arc::clone(&requests);
        tokio::spawn(async move {
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => head.extend_from_slice(&buf[..n]),
                }
            }
            let head = String::from_utf8_lossy(&head).into_owned();
            let request_line = head.lines().next().unwrap_or_default().to_string();
            let target = request_line
                .split_whitespace()
                .nth(1)
                .unwrap_or_default()
                .to_string();
            requests.lock().unwrap().push(request_line);

            let body = format!("{container_id} {target}");
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        });
    }
}

/// Process handle that only counts terminations.
pub struct FakeProcess {
    terminated: Arc<AtomicUsize>,
    server: Option<JoinHandle<()>>,
}

impl FakeProcess {
    pub fn new(terminated: Arc<AtomicUsize>) -> Self {
        Self {
            terminated,
            server: None,
        }
    }
}

impl BridgeProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn terminate(self: Box<Self>) {
        self.terminated.fetch_add(1, Ordering::SeqCst);
        if let Some(server) = self.server {
            server.abort();
        }
    }
}
