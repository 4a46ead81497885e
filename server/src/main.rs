#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # container-shell
//!
//! Interactive shells into running containers over plain HTTP.
//!
//! A request to `/shell/<container>/...` resolves the container through the
//! Docker API, lazily starts one `shellinaboxd` bridge for it on a private
//! Unix socket, and reverse-proxies the request onto that socket. Sessions
//! nobody touches for `staleness_threshold_minutes` are reaped.
//!
//! ## API surface
//!
//! | Method | Path                          | Description                         |
//! |--------|-------------------------------|-------------------------------------|
//! | GET    | `/api/health`                 | Liveness probe                      |
//! | ANY    | `/shell/{container}`          | 302 to `/shell/{container}/`        |
//! | ANY    | `/shell/{container}/{*path}`  | Proxied to the container's bridge   |
//!
//! ## Architecture
//!
//! ```text
//! main.rs          — entry point, clap subcommands, startup, graceful shutdown
//! config.rs        — TOML + env-var configuration
//! error.rs         — ShellError and its HTTP mapping
//! runtime.rs       — ContainerRuntime trait, Docker implementation
//! bridge/
//!   mod.rs         — Bridge / BridgeProcess capability
//!   shellinabox.rs — shellinaboxd launcher
//! sessions/
//!   mod.rs         — SessionRegistry (get_or_create, remove, sweep)
//!   session.rs     — Session, lifecycle state, teardown
//!   supervisor.rs  — ensure_ready: spawn once, poll for the socket
//! proxy.rs         — HTTP/1.1 over the session's Unix socket
//! reaper.rs        — periodic idle sweep task
//! routes/
//!   health.rs      — GET /api/health
//!   shell.rs       — path routing and the shell handler
//! ```

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};

use container_shell::bridge::shellinabox::ShellInABox;
use container_shell::runtime::{identify_self, ContainerRuntime, DockerRuntime};
use container_shell::{reaper, routes, AppState, Config};

/// Interactive shells into running containers over HTTP.
#[derive(Parser)]
#[command(name = "container-shell", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default when no subcommand given).
    Serve {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_path = match cli.command {
        Some(Commands::Serve { config }) => config,
        None => None,
    };
    run_server(config_path.as_deref()).await;
}

/// Log and exit before the listener is bound.
fn fatal(message: &str) -> ! {
    error!("{message}");
    std::process::exit(1);
}

async fn run_server(config_path: Option<&str>) {
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("container-shell v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}", config.server.listen);

    let runtime: Arc<dyn ContainerRuntime> = match DockerRuntime::connect(&config.runtime) {
        Ok(runtime) => Arc::new(runtime),
        Err(e) => fatal(&format!("Cannot connect to container runtime: {e}")),
    };

    let self_id = match identify_self(runtime.as_ref(), config.runtime.self_container.as_deref())
        .await
    {
        Ok(id) => id,
        Err(e) => fatal(&format!("Cannot resolve the manager's own container: {e}")),
    };
    info!("Manager container: {self_id}");

    if let Err(e) = tokio::fs::create_dir_all(&config.sessions.socket_dir).await {
        fatal(&format!(
            "Cannot create socket directory {}: {e}",
            config.sessions.socket_dir
        ));
    }

    let bridge = Arc::new(ShellInABox::new(config.bridge.clone()));
    let state = AppState::new(config, runtime, bridge, self_id);
    let app = routes::router(state.clone());

    let listener = match TcpListener::bind(&state.config.server.listen).await {
        Ok(listener) => listener,
        Err(e) => fatal(&format!("Failed to bind {}: {e}", state.config.server.listen)),
    };

    info!(
        "Server ready, shells under {}/<container>/",
        state.config.server.route_prefix
    );

    let reaper_task = reaper::spawn(
        state.registry.clone(),
        state.config.sessions.idle_check_interval(),
        state.config.sessions.staleness_threshold(),
    );

    // Graceful shutdown
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM");
            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("Received SIGINT");
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!("Server error: {e}");
    }

    // Cleanup
    info!("Shutting down...");
    reaper_task.abort();
    state.registry.terminate_all().await;
    info!("Goodbye");
}
