//! Shell entry point: `ANY <prefix>/<container>[/<subpath>]`.
//!
//! The container segment may be a name, short ID or full ID. It is resolved to
//! the canonical ID before any session is touched, so aliases of one container
//! share a single bridge.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::error::ShellError;
use crate::proxy;
use crate::AppState;

/// Trailing fragments browsers request on their own.
const BROWSER_NOISE: &[&str] = &["favicon.ico"];

/// What to do with an inbound path.
#[derive(Debug, PartialEq, Eq)]
pub enum Route {
    /// Not under the shell prefix.
    Outside,
    /// Browser noise; answer 200 with an empty body.
    Noop,
    MissingIdentifier,
    /// `<prefix>/<id>` → `<prefix>/<id>/`, so the terminal page's relative
    /// sub-resource URLs resolve under the session.
    Redirect(String),
    Forward { identifier: String, path: String },
}

/// Classify `path` relative to `prefix` (leading `/`, no trailing `/`).
pub fn route(prefix: &str, path: &str) -> Route {
    let Some(after_prefix) = path.strip_prefix(prefix) else {
        return Route::Outside;
    };
    let rest = match after_prefix.strip_prefix('/') {
        Some(rest) => rest,
        None if after_prefix.is_empty() => return Route::MissingIdentifier,
        None => return Route::Outside,
    };
    if rest.is_empty() {
        return Route::MissingIdentifier;
    }

    let (identifier, subpath) = match rest.split_once('/') {
        Some((identifier, subpath)) => (identifier, Some(subpath)),
        None => (rest, None),
    };

    if identifier.is_empty() {
        return if is_browser_noise(rest) {
            Route::Noop
        } else {
            Route::MissingIdentifier
        };
    }

    match subpath {
        // Exact match only: container names may contain dots.
        None if BROWSER_NOISE.contains(&identifier) => Route::Noop,
        None => Route::Redirect(format!("{prefix}/{identifier}/")),
        Some(subpath) => Route::Forward {
            identifier: identifier.to_string(),
            path: format!("/{subpath}"),
        },
    }
}

fn is_browser_noise(fragment: &str) -> bool {
    BROWSER_NOISE.iter().any(|noise| fragment.ends_with(noise))
}

/// Fallback handler for every non-API path.
pub async fn shell(State(state): State<AppState>, req: Request) -> Response {
    let path = req.uri().path().to_string();
    match route(&state.config.server.route_prefix, &path) {
        Route::Outside => StatusCode::NOT_FOUND.into_response(),
        Route::Noop => StatusCode::OK.into_response(),
        Route::MissingIdentifier => ShellError::MissingIdentifier.into_response(),
        Route::Redirect(mut location) => {
            if let Some(query) = req.uri().query() {
                location.push('?');
                location.push_str(query);
            }
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        }
        Route::Forward { identifier, path } => {
            match open_shell(&state, &identifier, &path, req).await {
                Ok(response) => response,
                Err(e) => {
                    match &e {
                        // Already logged (or deliberately not) by the proxy.
                        ShellError::Proxy(_) => {}
                        e if e.status().is_server_error() => {
                            warn!("Shell {identifier}: {e}");
                        }
                        e => debug!("Shell {identifier}: {e}"),
                    }
                    e.into_response()
                }
            }
        }
    }
}

/// Resolve → self check → session → readiness → forward → touch.
async fn open_shell(
    state: &AppState,
    identifier: &str,
    forward_path: &str,
    req: Request,
) -> Result<Response, ShellError> {
    let container_id = state.runtime.resolve(identifier).await?;
    if container_id == *state.self_id {
        warn!("Refused shell into the manager's own container (requested as {identifier})");
        return Err(ShellError::Forbidden);
    }

    // A session reaped between lookup and readiness is replaced once.
    let mut retried = false;
    let session = loop {
        let session = state.registry.get_or_create(&container_id).await;
        match state.supervisor.ensure_ready(&session).await {
            Ok(()) => break session,
            Err(ShellError::SessionClosed(_)) if !retried => retried = true,
            Err(e) => return Err(e),
        }
    };

    let response = proxy::forward(&session, req, forward_path).await?;
    session.touch();
    Ok(response)
}
