//! Error taxonomy for the shell-session manager.
//!
//! Every pre-proxy failure maps onto one HTTP status. Once a request reaches
//! the bridge, its status codes are passed through verbatim and this type only
//! describes transport failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    /// The request path carried no container identifier.
    #[error("Missing container identifier")]
    MissingIdentifier,

    /// The identifier resolves to the manager's own container.
    #[error("Shell access to the manager container is not allowed")]
    Forbidden,

    /// The runtime has no container with this name or ID.
    #[error("Container {0} not found")]
    NotFound(String),

    /// The container exists but is not running.
    #[error("Container {0} is not running")]
    NotRunning(String),

    /// The runtime could not be reached or returned an unexpected failure.
    #[error("Container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// The bridging process could not be spawned.
    #[error("Failed to start shell bridge: {0}")]
    Spawn(String),

    /// The bridging process never produced its socket.
    #[error("Shell bridge for {0} did not become ready")]
    Starvation(String),

    /// The session was torn down while the request waited on it.
    #[error("Shell session for {0} was closed")]
    SessionClosed(String),

    /// Forwarding to the bridge socket failed.
    #[error("Shell bridge unreachable: {0}")]
    Proxy(String),
}

impl ShellError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingIdentifier => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) | Self::NotRunning(_) => StatusCode::NOT_FOUND,
            Self::RuntimeUnavailable(_)
            | Self::Spawn(_)
            | Self::Starvation(_)
            | Self::SessionClosed(_)
            | Self::Proxy(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Stable machine-readable code included in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingIdentifier => "MISSING_IDENTIFIER",
            Self::Forbidden => "SELF_CONTAINER",
            Self::NotFound(_) => "CONTAINER_NOT_FOUND",
            Self::NotRunning(_) => "CONTAINER_NOT_RUNNING",
            Self::RuntimeUnavailable(_) => "RUNTIME_UNAVAILABLE",
            Self::Spawn(_) => "BRIDGE_SPAWN_FAILED",
            Self::Starvation(_) => "BRIDGE_NOT_READY",
            Self::SessionClosed(_) => "SESSION_CLOSED",
            Self::Proxy(_) => "PROXY_FAILED",
        }
    }
}

impl IntoResponse for ShellError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(json!({"error": self.to_string(), "code": self.code()})),
        )
            .into_response()
    }
}
