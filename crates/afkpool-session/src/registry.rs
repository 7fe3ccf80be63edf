//! Session registry: creates, tracks, and routes commands to session actors.

use std::collections::HashMap;
use std::sync::Arc;

use afkpool_protocol::{Identity, SessionSnapshot, SessionState, with_name_marker};
use afkpool_reconnect::{PendingReconnect, ReconnectScheduler};
use afkpool_transport::Connector;
use futures_util::future::join_all;
use tokio::sync::Mutex;

use crate::actor::{SessionContext, spawn_session};
use crate::{
    AuthStore, DIRECT_LABEL, ProxyPool, SessionConfig, SessionError, SessionHandle, StatsLookup,
};

struct Sessions<C: Connector> {
    by_identity: HashMap<Identity, SessionHandle<C>>,
    /// Next registration number. Never reused, so removing a session
    /// does not shift anyone else's proxy.
    next_index: usize,
}

/// Every registered session, keyed by identity.
///
/// This is the entry point for the control surface. All methods take
/// `&self`; the registry is meant to be shared behind an `Arc`.
pub struct SessionRegistry<C: Connector, S: StatsLookup> {
    ctx: Arc<SessionContext<C, S>>,
    pool: ProxyPool,
    config: SessionConfig,
    sessions: Mutex<Sessions<C>>,
}

impl<C: Connector, S: StatsLookup> SessionRegistry<C, S> {
    pub fn new(
        config: SessionConfig,
        pool: ProxyPool,
        store: AuthStore,
        connector: C,
        stats: S,
    ) -> Self {
        let scheduler = ReconnectScheduler::new(config.reconnect.clone());
        Self {
            ctx: Arc::new(SessionContext {
                connector,
                stats,
                scheduler,
                store,
            }),
            pool,
            config,
            sessions: Mutex::new(Sessions {
                by_identity: HashMap::new(),
                next_index: 0,
            }),
        }
    }

    pub fn store(&self) -> &AuthStore {
        &self.ctx.store
    }

    /// Registers an `Offline` session for every identity that has an auth
    /// folder. Returns the identities found, in folder-name order.
    pub async fn restore(&self) -> Result<Vec<Identity>, SessionError> {
        let identities = self.ctx.store.list_identities()?;
        for identity in &identities {
            self.register(identity.clone()).await;
        }
        tracing::info!(count = identities.len(), "restored sessions from auth folder");
        Ok(identities)
    }

    /// Returns the session for `identity`, creating an `Offline` one if it
    /// is not registered yet.
    pub async fn register(&self, identity: Identity) -> SessionHandle<C> {
        let mut sessions = self.sessions.lock().await;
        if let Some(handle) = sessions.by_identity.get(&identity) {
            return handle.clone();
        }

        let index = sessions.next_index;
        sessions.next_index += 1;
        let proxy = self.pool.assign(index).cloned();
        let label = proxy
            .as_ref()
            .map_or(DIRECT_LABEL, |p| p.label())
            .to_string();

        let handle = spawn_session(
            identity.clone(),
            index,
            proxy,
            Arc::clone(&self.ctx),
            self.config.command_buffer,
        );
        sessions.by_identity.insert(identity.clone(), handle.clone());
        tracing::info!(%identity, index, proxy = %label, "session registered");
        handle
    }

    /// Registers `identity` if needed and starts connecting. Starting an
    /// already active session is a no-op.
    pub async fn add(&self, identity: Identity) -> Result<(), SessionError> {
        self.register(identity).await.start().await
    }

    /// Starts a session. Behaves exactly like [`add`](Self::add): an
    /// unseen identity is registered first.
    pub async fn connect(&self, identity: Identity) -> Result<(), SessionError> {
        self.add(identity).await
    }

    /// Stops the session and cancels its pending reconnect. The record
    /// and auth folder stay.
    pub async fn disconnect(&self, identity: &Identity) -> Result<(), SessionError> {
        self.handle(identity).await?.stop(false).await
    }

    /// Stops the session, deletes its auth folder, and forgets it.
    ///
    /// The registry lock is held until the folder is gone, so a re-add of
    /// the same identity cannot race the deletion. If the folder cannot be
    /// deleted the session stays registered (stopped) and the storage
    /// error is returned.
    pub async fn remove(&self, identity: &Identity) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().await;
        let handle = sessions
            .by_identity
            .get(identity)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(identity.clone()))?;
        match handle.stop(true).await {
            Ok(()) => {}
            Err(e @ SessionError::Storage(_)) => return Err(e),
            // An actor that is already gone has nothing left to stop, but
            // its folder still has to go.
            Err(_) => {
                self.ctx.store.purge(identity).await?;
            }
        }
        sessions.by_identity.remove(identity);
        tracing::info!(%identity, "session removed");
        Ok(())
    }

    /// Sends a chat line from an online session.
    pub async fn chat(
        &self,
        identity: &Identity,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.handle(identity).await?.chat(text).await
    }

    /// Snapshots of every session, in registration order.
    pub async fn status(&self) -> Vec<SessionSnapshot> {
        let mut handles = self.handles().await;
        handles.sort_by_key(|h| h.index());
        join_all(handles.iter().map(|h| h.snapshot()))
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect()
    }

    /// Re-fetches one session's balance and caches it. Works in any
    /// state; the lookup uses the marked display name.
    pub async fn refresh_balance(&self, identity: &Identity) -> Result<String, SessionError> {
        let handle = self.handle(identity).await?;
        let snapshot = handle.snapshot().await?;
        let balance = self
            .ctx
            .stats
            .fetch_balance(&with_name_marker(&snapshot.display_name))
            .await;
        handle.set_balance(balance.clone()).await?;
        tracing::debug!(%identity, %balance, "balance refreshed");
        Ok(balance)
    }

    /// Refreshes every `Online` session concurrently. Returns how many were
    /// refreshed.
    pub async fn refresh_all_balances(&self) -> usize {
        let online: Vec<Identity> = self
            .status()
            .await
            .into_iter()
            .filter(|s| s.state == SessionState::Online)
            .map(|s| s.identity)
            .collect();

        let refreshed = join_all(online.iter().map(|id| self.refresh_balance(id)))
            .await
            .into_iter()
            .filter(Result::is_ok)
            .count();
        tracing::info!(refreshed, "balances refreshed");
        refreshed
    }

    /// The reconnect timer pending for `identity`, if any.
    pub fn pending_reconnect(&self, identity: &Identity) -> Option<PendingReconnect> {
        self.ctx.scheduler.pending(identity)
    }

    pub async fn contains(&self, identity: &Identity) -> bool {
        self.sessions.lock().await.by_identity.contains_key(identity)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.by_identity.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stops every session without deleting anything. Used on process
    /// shutdown; the sessions stay registered.
    pub async fn shutdown(&self) {
        let handles = self.handles().await;
        join_all(handles.iter().map(|h| h.stop(false))).await;
        let cancelled = self.ctx.scheduler.cancel_all();
        tracing::info!(sessions = handles.len(), cancelled, "all sessions stopped");
    }

    async fn handle(&self, identity: &Identity) -> Result<SessionHandle<C>, SessionError> {
        self.sessions
            .lock()
            .await
            .by_identity
            .get(identity)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(identity.clone()))
    }

    /// Cloned handles, so callers can await on sessions without holding
    /// the registry lock.
    async fn handles(&self) -> Vec<SessionHandle<C>> {
        self.sessions
            .lock()
            .await
            .by_identity
            .values()
            .cloned()
            .collect()
    }
}
