//! Error types for the session layer.

use afkpool_protocol::Identity;
use afkpool_transport::TransportError;

/// Errors a session command can report back to its caller.
///
/// None of these are fatal: they describe why one command was rejected,
/// and the session carries on.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session is registered for this identity.
    #[error("no session for {0}")]
    NotFound(Identity),

    /// The command needs an online session (chat, for example).
    #[error("session {0} is not online")]
    SessionNotOnline(Identity),

    /// The connection refused the outgoing message.
    #[error("delivery to {identity} failed: {source}")]
    SendFailed {
        identity: Identity,
        #[source]
        source: TransportError,
    },

    /// The session actor has shut down or its channel is closed.
    #[error("session {0} is unavailable")]
    Unavailable(Identity),

    /// Reading or writing persisted auth folders failed.
    #[error("auth storage error: {0}")]
    Storage(#[from] std::io::Error),
}
