//! Reverse proxy onto a session's Unix socket.
//!
//! Each forwarded request dials the bridge socket, performs an HTTP/1.1
//! handshake and streams both bodies without buffering, so long polls and
//! chunked terminal output pass through untouched. There is no server-side
//! timeout: the terminal front-end bounds its own round-trips and the reaper
//! bounds the session.

use std::error::Error as StdError;
use std::io;

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, Response, Uri, Version},
};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tracing::{debug, warn};

use crate::error::ShellError;
use crate::sessions::Session;

/// Forward `req` to the session's bridge with its path replaced by
/// `forward_path`. The original query string is kept.
///
/// Failures are reported as [`ShellError::Proxy`] and leave the session alone;
/// a dead bridge is the reaper's business, not this request's.
pub async fn forward(
    session: &Session,
    req: Request<Body>,
    forward_path: &str,
) -> Result<Response<Body>, ShellError> {
    let container_id = session.container_id();
    let (mut parts, body) = req.into_parts();

    let path_and_query = match parts.uri.query() {
        Some(query) => format!("{forward_path}?{query}"),
        None => forward_path.to_string(),
    };
    parts.uri = Uri::builder()
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| ShellError::Proxy(format!("invalid forward path {forward_path}: {e}")))?;
    parts.version = Version::HTTP_11;
    parts
        .headers
        .insert(header::HOST, HeaderValue::from_static("localhost"));

    let stream = UnixStream::connect(session.socket_path())
        .await
        .map_err(|e| {
            warn!(
                "Session {container_id}: connect to {} failed: {e}",
                session.socket_path().display()
            );
            ShellError::Proxy(e.to_string())
        })?;

    let (mut sender, conn) = http1::handshake::<_, Body>(TokioIo::new(stream))
        .await
        .map_err(|e| {
            warn!("Session {container_id}: handshake failed: {e}");
            ShellError::Proxy(e.to_string())
        })?;

    let conn_id = container_id.to_string();
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            if is_client_cancellation(&e) {
                debug!("Session {conn_id}: connection closed by client: {e}");
            } else {
                warn!("Session {conn_id}: bridge connection error: {e}");
            }
        }
    });

    let response = sender
        .send_request(Request::from_parts(parts, body))
        .await
        .map_err(|e| {
            if is_client_cancellation(&e) {
                debug!("Session {container_id}: request abandoned by client: {e}");
            } else {
                warn!("Session {container_id}: proxy request failed: {e}");
            }
            ShellError::Proxy(e.to_string())
        })?;

    Ok(response.map(Body::new))
}

/// Whether `err` is the expected fallout of a client walking away (an
/// abandoned long poll, a closed tab) rather than a bridge failure.
pub fn is_client_cancellation(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(hyper_err) = e.downcast_ref::<hyper::Error>() {
            if hyper_err.is_canceled() || hyper_err.is_body_write_aborted() {
                return true;
            }
        }
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Bridge;
    use crate::testing::FakeBridge;
    use axum::http::StatusCode;
    use std::path::PathBuf;

    #[derive(Debug)]
    struct Wrapped(io::Error);

    impl std::fmt::Display for Wrapped {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "body stream failed")
        }
    }

    impl StdError for Wrapped {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_reset_and_broken_pipe_are_benign() {
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        assert!(is_client_cancellation(&reset));
        let wrapped = Wrapped(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert!(is_client_cancellation(&wrapped));
    }

    #[test]
    fn test_other_errors_are_not_benign() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert!(!is_client_cancellation(&refused));
        let wrapped = Wrapped(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(!is_client_cancellation(&wrapped));
    }

    #[tokio::test]
    async fn test_forward_rewrites_path_and_keeps_query() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("abc.sock");
        let bridge = FakeBridge::new();
        let _process = bridge.start("abc", &socket_path).await.unwrap();
        let session = Session::new("abc".to_string(), socket_path);

        let req = Request::builder()
            .uri("/shell/web/term/poll?session=42")
            .body(Body::empty())
            .unwrap();
        let response = forward(&session, req, "/term/poll").await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"abc /term/poll?session=42");
        assert_eq!(
            *bridge.requests.lock().unwrap(),
            vec!["GET /term/poll?session=42 HTTP/1.1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_forward_to_missing_socket_is_proxy_error() {
        let session = Session::new(
            "gone".to_string(),
            PathBuf::from("/nonexistent/dir/gone.sock"),
        );
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();

        let Err(err) = forward(&session, req, "/").await else {
            panic!("forward to a missing socket succeeded");
        };

        assert!(matches!(err, ShellError::Proxy(_)));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
