//! Deterministic proxy assignment.
//!
//! Sessions are handed out to proxies in consecutive groups: with a group
//! size of 5, registration indices 0..=4 share the first proxy, 5..=9 the
//! second, and so on, wrapping around the pool. The index is the
//! session's registration number, so an assignment never changes while
//! the session is registered.

use afkpool_transport::ProxyEndpoint;

/// Label reported for sessions that connect without a proxy.
pub const DIRECT_LABEL: &str = "direct";

/// The configured egress proxies and how many sessions share each one.
#[derive(Debug, Clone)]
pub struct ProxyPool {
    endpoints: Vec<ProxyEndpoint>,
    group_size: usize,
}

impl ProxyPool {
    /// Creates a pool. A group size of zero is treated as one.
    pub fn new(endpoints: Vec<ProxyEndpoint>, group_size: usize) -> Self {
        if group_size == 0 {
            tracing::warn!("proxy group size 0 is invalid, using 1");
        }
        Self {
            endpoints,
            group_size: group_size.max(1),
        }
    }

    /// A pool with no proxies: every session connects directly.
    pub fn direct() -> Self {
        Self::new(Vec::new(), 1)
    }

    /// The proxy for the session registered at `index`, or `None` when the
    /// pool is empty.
    pub fn assign(&self, index: usize) -> Option<&ProxyEndpoint> {
        if self.endpoints.is_empty() {
            return None;
        }
        self.endpoints
            .get(slot(index, self.group_size, self.endpoints.len()))
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// `floor(index / group_size) mod pool_len`. Callers guarantee both
/// divisors are non-zero.
fn slot(index: usize, group_size: usize, pool_len: usize) -> usize {
    (index / group_size) % pool_len
}
