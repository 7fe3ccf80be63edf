//! Shared vocabulary for afkpool.
//!
//! This crate defines the types every other layer speaks:
//!
//! - **Types** ([`Identity`], [`SessionState`], [`SessionSnapshot`],
//!   [`ClientEvent`], [`GatewayRequest`], [`TextPacket`]): session
//!   bookkeeping and the messages exchanged with the protocol gateway.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how gateway messages
//!   become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (ClientEvent / GatewayRequest) → Session (state machine)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientEvent, GatewayRequest, Identity, NAME_MARKER, PendingAuth, SessionSnapshot,
    SessionState, TextPacket, with_name_marker,
};
