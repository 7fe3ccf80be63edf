//! The bookkeeping the control surface sees for each session.

use afkpool_protocol::{Identity, PendingAuth, SessionSnapshot, SessionState};
use afkpool_transport::ProxyEndpoint;

use crate::proxy::DIRECT_LABEL;
use crate::stats::DEFAULT_BALANCE;

/// One session's externally visible state.
///
/// Owned by the session actor and mutated only there. The live
/// connection handle is held next to it by the actor, not in here.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub identity: Identity,
    /// Registration number, used for proxy assignment and status order.
    pub index: usize,
    pub state: SessionState,
    /// The identity until the player has spawned, then the in-game name
    /// with the name marker.
    pub display_name: String,
    pub balance: String,
    pub proxy: Option<ProxyEndpoint>,
    pub pending_auth: Option<PendingAuth>,
    pub last_error: Option<String>,
}

impl SessionRecord {
    pub fn new(identity: Identity, index: usize, proxy: Option<ProxyEndpoint>) -> Self {
        Self {
            display_name: identity.to_string(),
            identity,
            index,
            state: SessionState::Offline,
            balance: DEFAULT_BALANCE.to_string(),
            proxy,
            pending_auth: None,
            last_error: None,
        }
    }

    pub fn proxy_label(&self) -> &str {
        self.proxy.as_ref().map_or(DIRECT_LABEL, |p| p.label())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            identity: self.identity.clone(),
            state: self.state,
            display_name: self.display_name.clone(),
            balance: self.balance.clone(),
            proxy_label: self.proxy_label().to_string(),
            pending_auth: self.pending_auth.clone(),
            last_error: self.last_error.clone(),
        }
    }
}
