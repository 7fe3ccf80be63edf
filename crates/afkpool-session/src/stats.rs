//! Balance lookups.

use std::future::Future;

/// Balance reported when a lookup fails or the session has never been
/// looked up.
pub const DEFAULT_BALANCE: &str = "0";

/// Looks up a player's balance on the external stats service.
///
/// Lookups never fail from the caller's point of view: any network,
/// status, or parse problem yields [`DEFAULT_BALANCE`].
pub trait StatsLookup: Send + Sync + 'static {
    /// `display_name` already carries the name marker.
    fn fetch_balance(&self, display_name: &str) -> impl Future<Output = String> + Send;
}
