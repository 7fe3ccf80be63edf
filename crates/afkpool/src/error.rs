//! Unified error type for afkpool.

use afkpool_protocol::ProtocolError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use afkpool_session::SessionError;
use afkpool_transport::TransportError;

use crate::config::ConfigError;

/// Top-level error that wraps every layer's error type.
///
/// `#[from]` on each variant lets `?` convert layer errors directly.
#[derive(Debug, thiserror::Error)]
pub enum AfkpoolError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Building the stats HTTP client failed.
    #[error("stats client: {0}")]
    StatsClient(#[from] reqwest::Error),

    #[error("server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Control surface responses are plain text, matching the route replies
/// (`OK`, `Sent`, `Offline`).
impl IntoResponse for AfkpoolError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AfkpoolError::Session(SessionError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "Not Found".to_string())
            }
            AfkpoolError::Session(SessionError::SessionNotOnline(_)) => {
                (StatusCode::BAD_REQUEST, "Offline".to_string())
            }
            AfkpoolError::Session(SessionError::SendFailed { .. }) => {
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            AfkpoolError::Session(SessionError::Unavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            AfkpoolError::Protocol(ProtocolError::InvalidIdentity(_)) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use afkpool_protocol::Identity;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let top: AfkpoolError = err.into();
        assert!(matches!(top, AfkpoolError::Transport(_)));
        assert!(top.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = Identity::parse("").unwrap_err();
        let top: AfkpoolError = err.into();
        assert!(matches!(top, AfkpoolError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::NotFound(Identity::parse("a@example.com").unwrap());
        let top: AfkpoolError = err.into();
        assert!(matches!(top, AfkpoolError::Session(_)));
        assert_eq!(top.to_string(), "no session for a@example.com");
    }

    #[test]
    fn test_response_status_codes() {
        let who = Identity::parse("a@example.com").unwrap();
        let cases = [
            (AfkpoolError::from(SessionError::NotFound(who.clone())), StatusCode::NOT_FOUND),
            (
                AfkpoolError::from(SessionError::SessionNotOnline(who.clone())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AfkpoolError::from(Identity::parse("..").unwrap_err()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AfkpoolError::Server("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
