#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::unused_async)]

//! container-shell library — the building blocks behind the binary:
//!
//! - `runtime` — container inspection (canonical ID, running state)
//! - `bridge` — terminal-bridging processes (shellinabox)
//! - `sessions` — session registry, per-session lifecycle, startup supervisor
//! - `proxy` — HTTP/1.1 reverse proxy onto a session's Unix socket
//! - `reaper` — periodic idle sweep
//! - `routes` — HTTP handlers and router
//! - `config` — configuration loading

pub mod bridge;
pub mod config;
pub mod error;
pub mod proxy;
pub mod reaper;
pub mod routes;
pub mod runtime;
pub mod sessions;
pub mod state;

#[cfg(test)]
mod testing;

// Re-export key types at crate root for convenience.
pub use config::Config;
pub use error::ShellError;
pub use sessions::SessionRegistry;
pub use state::AppState;
