//! Core types shared by every afkpool layer.
//!
//! Everything in here is plain data: who a session belongs to
//! ([`Identity`]), what state it is in ([`SessionState`]), what the
//! control surface reports about it ([`SessionSnapshot`]), and the
//! messages exchanged with the protocol gateway ([`GatewayRequest`],
//! [`ClientEvent`], [`TextPacket`]).

use serde::{Deserialize, Serialize};

use std::fmt;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The account key that owns one session.
///
/// Identities double as directory names under the auth root, so
/// construction goes through [`Identity::parse`], which rejects anything
/// that could escape that directory. Once built, an identity never
/// changes.
///
/// `#[serde(transparent)]` keeps the JSON form a bare string:
/// `"a@example.com"` rather than `{ "0": "a@example.com" }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Validates `raw` and wraps it.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidIdentity`] if the value is empty,
    /// is `.` or `..`, or contains a path separator or NUL byte.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ProtocolError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::InvalidIdentity("empty identity".into()));
        }
        if trimmed == "." || trimmed == ".." {
            return Err(ProtocolError::InvalidIdentity(format!(
                "reserved name {trimmed:?}"
            )));
        }
        if trimmed.contains(['/', '\\', '\0']) {
            return Err(ProtocolError::InvalidIdentity(format!(
                "{trimmed:?} contains a path separator"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deserializing runs the same validation as [`Identity::parse`], so an
/// identity that arrives over the wire is as trustworthy as one built in code.
impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Identity::parse(raw).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Display names
// ---------------------------------------------------------------------------

/// The leading character the remote server expects on every player name.
pub const NAME_MARKER: char = '.';

/// Returns `name` with exactly one leading [`NAME_MARKER`].
///
/// Names that already carry the marker come back unchanged, so this is
/// safe to apply more than once.
pub fn with_name_marker(name: &str) -> String {
    if name.starts_with(NAME_MARKER) {
        name.to_string()
    } else {
        format!("{NAME_MARKER}{name}")
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where a session is in its lifecycle.
///
/// ```text
///            start                auth challenge
///  Offline ────────→ Connecting ─────────────────→ Authenticating
///   ↑  ↑                 │  │                            │
///   │  │   error/close   │  │ spawn                spawn │
///   │  └─────────────────┘  ▼                            ▼
///   │                     Online ←───────────────────────┘
///   │    error/close        │
///   └───────────────────────┘
///
///  Connecting ──(construction failed)──→ Error ──(retry/start)──→ Connecting
/// ```
///
/// `Connecting`, `Authenticating` and `Online` are the *active* states:
/// a connection handle exists and a second start is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Offline,
    Connecting,
    Authenticating,
    Online,
    Error,
}

impl SessionState {
    /// Returns `true` while a connection attempt or live connection exists.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Authenticating | Self::Online)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => write!(f, "Offline"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Authenticating => write!(f, "Authenticating"),
            Self::Online => write!(f, "Online"),
            Self::Error => write!(f, "Error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Auth challenge and snapshots
// ---------------------------------------------------------------------------

/// A device-code challenge the account owner must complete in a browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAuth {
    /// The short code the user types in.
    pub code: String,
    /// Where the user types it.
    pub verification_url: String,
}

/// The public view of one session, as returned by the status command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub identity: Identity,
    pub state: SessionState,
    pub display_name: String,
    pub balance: String,
    pub proxy_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_auth: Option<PendingAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// The `text` packet the game server expects for a chat line.
///
/// Field names follow the server's packet schema, hence snake_case and
/// the `type` rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPacket {
    #[serde(rename = "type")]
    pub kind: String,
    pub needs_translation: bool,
    pub source_name: String,
    pub message: String,
    pub xuid: String,
    pub platform_chat_id: String,
    pub filtered_message: String,
}

impl TextPacket {
    /// Builds a plain chat line sent by `source_name`.
    pub fn chat(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: "chat".to_string(),
            needs_translation: false,
            source_name: source_name.into(),
            message: message.into(),
            xuid: String::new(),
            platform_chat_id: String::new(),
            filtered_message: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway messages
// ---------------------------------------------------------------------------

/// Lifecycle events a protocol client reports for one connection attempt.
///
/// Both the in-process connector seam and the gateway wire format use
/// this type; on the wire it is tagged by an `event` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// The auth flow needs the account owner to enter a device code.
    AuthChallenge(PendingAuth),
    /// Login and handshake completed; the player is in the world.
    Spawned { username: String },
    /// The connection failed.
    Error { reason: String },
    /// The connection closed.
    Closed {
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Requests sent from afkpool to the protocol gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GatewayRequest {
    /// Open a game connection for `identity`.
    Connect {
        identity: Identity,
        host: String,
        port: u16,
        /// Folder holding the identity's cached auth material.
        profiles_folder: String,
    },
    /// Queue a text packet on the open connection.
    Text(TextPacket),
    /// Close the game connection.
    Disconnect,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_parse_trims_whitespace() {
        let id = Identity::parse("  a@example.com ").unwrap();
        assert_eq!(id.as_str(), "a@example.com");
    }

    #[test]
    fn test_identity_parse_rejects_path_tricks() {
        for bad in ["", "   ", ".", "..", "a/b", "..\\up", "nul\0byte"] {
            assert!(
                matches!(Identity::parse(bad), Err(ProtocolError::InvalidIdentity(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_identity_deserialize_validates() {
        let ok: Identity = serde_json::from_str("\"a@example.com\"").unwrap();
        assert_eq!(ok.to_string(), "a@example.com");
        assert!(serde_json::from_str::<Identity>("\"../etc\"").is_err());
    }

    #[test]
    fn test_with_name_marker_is_idempotent() {
        assert_eq!(with_name_marker("playerOne"), ".playerOne");
        assert_eq!(with_name_marker(".playerOne"), ".playerOne");
        assert_eq!(with_name_marker(&with_name_marker("x")), ".x");
    }

    #[test]
    fn test_session_state_is_active() {
        assert!(!SessionState::Offline.is_active());
        assert!(SessionState::Connecting.is_active());
        assert!(SessionState::Authenticating.is_active());
        assert!(SessionState::Online.is_active());
        assert!(!SessionState::Error.is_active());
    }

    #[test]
    fn test_snapshot_serializes_camel_case_and_skips_empty_options() {
        let snap = SessionSnapshot {
            identity: Identity::parse("a@example.com").unwrap(),
            state: SessionState::Online,
            display_name: ".playerOne".into(),
            balance: "12".into(),
            proxy_label: "eu-1".into(),
            pending_auth: None,
            last_error: None,
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["displayName"], ".playerOne");
        assert_eq!(json["proxyLabel"], "eu-1");
        assert_eq!(json["state"], "Online");
        assert!(json.get("pendingAuth").is_none());
        assert!(json.get("lastError").is_none());
    }

    #[test]
    fn test_text_packet_matches_server_schema() {
        let packet = TextPacket::chat(".playerOne", "hi");
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["type"], "chat");
        assert_eq!(json["needs_translation"], false);
        assert_eq!(json["source_name"], ".playerOne");
        assert_eq!(json["filtered_message"], "");
    }

    #[test]
    fn test_client_event_wire_format() {
        let ev: ClientEvent = serde_json::from_str(
            r#"{"event":"auth_challenge","code":"ABCD","verificationUrl":"https://microsoft.com/link"}"#,
        )
        .unwrap();
        assert_eq!(
            ev,
            ClientEvent::AuthChallenge(PendingAuth {
                code: "ABCD".into(),
                verification_url: "https://microsoft.com/link".into(),
            })
        );

        let closed: ClientEvent = serde_json::from_str(r#"{"event":"closed"}"#).unwrap();
        assert_eq!(closed, ClientEvent::Closed { reason: None });
    }

    #[test]
    fn test_gateway_connect_request_is_tagged() {
        let req = GatewayRequest::Connect {
            identity: Identity::parse("a@example.com").unwrap(),
            host: "donutsmp.net".into(),
            port: 19132,
            profiles_folder: "auth/a@example.com".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["op"], "connect");
        assert_eq!(json["identity"], "a@example.com");
        assert_eq!(json["port"], 19132);
    }
}
