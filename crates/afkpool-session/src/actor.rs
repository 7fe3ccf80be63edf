//! Session actor: one Tokio task per identity.
//!
//! The actor exclusively owns the identity's [`SessionRecord`] and its
//! live connection. Everything that touches them arrives as a
//! [`SessionCommand`]: control requests from the registry, and internal
//! notifications from the tasks the actor spawns (connection
//! construction, the client's event stream, balance lookups, reconnect
//! timers).
//!
//! # Attempts
//!
//! Every start opens a new *attempt* with a fresh id. Internal
//! notifications carry the id of the attempt that produced them, and the
//! actor drops any whose attempt is no longer current. That is what keeps
//! a stopped or superseded connection from changing state: its late close
//! event, its late spawn, or its late construction result are all stale.
//!
//! Reconnect timers follow the same rule through [`TimerToken`]s: a
//! firing only restarts the session if its token is the one the actor
//! armed last.

use std::sync::Arc;

use afkpool_protocol::{
    ClientEvent, Identity, PendingAuth, SessionSnapshot, SessionState, TextPacket,
    with_name_marker,
};
use afkpool_reconnect::{ReconnectScheduler, ReconnectTier, TimerToken};
use afkpool_transport::{ConnectRequest, Connector, GameClient, ProxyEndpoint, TransportError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{AuthStore, SessionError, SessionRecord, StatsLookup};

// ---------------------------------------------------------------------------
// Shared context
// ---------------------------------------------------------------------------

/// Collaborators every session actor shares.
pub(crate) struct SessionContext<C, S> {
    pub(crate) connector: C,
    pub(crate) stats: S,
    pub(crate) scheduler: ReconnectScheduler<Identity>,
    pub(crate) store: AuthStore,
}

// ---------------------------------------------------------------------------
// Commands and handle
// ---------------------------------------------------------------------------

pub(crate) enum SessionCommand<C: Connector> {
    /// Open a connection unless one is already active.
    Start { reply: oneshot::Sender<()> },

    /// Tear down the connection and cancel any pending reconnect. With
    /// `purge`, also delete the auth folder and end the actor.
    Stop {
        purge: bool,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Send a chat line as the in-game player.
    Chat {
        text: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },

    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },

    SetBalance { balance: String },

    // Internal notifications. Each is tagged with the attempt (or timer)
    // that produced it.
    Constructed {
        attempt: u64,
        result: Result<C::Client, TransportError>,
    },
    Event {
        attempt: u64,
        event: ClientEvent,
    },
    Ready {
        attempt: u64,
        username: String,
        display_name: String,
        balance: String,
    },
    ReconnectDue { token: TimerToken },
}

/// Handle to a running session actor.
///
/// Cheap to clone: it wraps the actor's command sender.
pub struct SessionHandle<C: Connector> {
    identity: Identity,
    index: usize,
    sender: mpsc::Sender<SessionCommand<C>>,
}

impl<C: Connector> Clone for SessionHandle<C> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            index: self.index,
            sender: self.sender.clone(),
        }
    }
}

impl<C: Connector> SessionHandle<C> {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Registration number of this session.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Begins connecting. Returns once the actor has accepted the request,
    /// not when the session is online.
    pub async fn start(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Start { reply }).await?;
        rx.await.map_err(|_| self.unavailable())
    }

    /// Stops the session. With `purge` the auth folder is deleted and the
    /// actor exits; the handle is useless afterwards.
    pub async fn stop(&self, purge: bool) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Stop { purge, reply }).await?;
        rx.await.map_err(|_| self.unavailable())?
    }

    pub async fn chat(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Chat {
            text: text.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.unavailable())?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| self.unavailable())
    }

    /// Overwrites the cached balance (fire-and-forget).
    pub async fn set_balance(&self, balance: String) -> Result<(), SessionError> {
        self.send(SessionCommand::SetBalance { balance }).await
    }

    async fn send(&self, cmd: SessionCommand<C>) -> Result<(), SessionError> {
        self.sender.send(cmd).await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> SessionError {
        SessionError::Unavailable(self.identity.clone())
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// One connection attempt and everything spawned on its behalf.
struct Attempt<Cl> {
    id: u64,
    /// Set once construction succeeds.
    client: Option<Cl>,
    /// In-game name without the marker, once online.
    username: Option<String>,
    /// Spawn finished before construction reported back.
    early_ready: Option<(String, String, String)>,
    reached_online: bool,
    tasks: Vec<JoinHandle<()>>,
}

impl<Cl> Attempt<Cl> {
    /// Stops every task working for this attempt and hands back the
    /// client, if one was constructed.
    fn detach(self) -> Option<Cl> {
        for task in &self.tasks {
            task.abort();
        }
        self.client
    }
}

struct SessionActor<C: Connector, S> {
    record: SessionRecord,
    ctx: Arc<SessionContext<C, S>>,
    current: Option<Attempt<C::Client>>,
    next_attempt: u64,
    /// Token of the reconnect timer this actor is waiting on.
    armed: Option<TimerToken>,
    weak: mpsc::WeakSender<SessionCommand<C>>,
    receiver: mpsc::Receiver<SessionCommand<C>>,
}

impl<C: Connector, S: StatsLookup> SessionActor<C, S> {
    async fn run(mut self) {
        tracing::debug!(identity = %self.record.identity, "session actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                SessionCommand::Start { reply } => {
                    self.start();
                    let _ = reply.send(());
                }
                SessionCommand::Stop { purge, reply } => {
                    self.stop();
                    if !purge {
                        let _ = reply.send(Ok(()));
                    } else {
                        // A failed purge keeps the actor alive so the
                        // removal can be retried.
                        let purged = self.purge().await;
                        let done = purged.is_ok();
                        let _ = reply.send(purged);
                        if done {
                            break;
                        }
                    }
                }
                SessionCommand::Chat { text, reply } => {
                    let _ = reply.send(self.chat(text));
                }
                SessionCommand::Snapshot { reply } => {
                    let _ = reply.send(self.record.snapshot());
                }
                SessionCommand::SetBalance { balance } => {
                    self.record.balance = balance;
                }
                SessionCommand::Constructed { attempt, result } => {
                    self.on_constructed(attempt, result);
                }
                SessionCommand::Event { attempt, event } => {
                    self.on_event(attempt, event);
                }
                SessionCommand::Ready {
                    attempt,
                    username,
                    display_name,
                    balance,
                } => {
                    self.on_ready(attempt, username, display_name, balance);
                }
                SessionCommand::ReconnectDue { token } => {
                    self.on_reconnect_due(token);
                }
            }
        }

        // Every handle is gone (or the session was removed). Leave nothing
        // running behind.
        if let Some(attempt) = self.current.take() {
            if let Some(client) = attempt.detach() {
                client.disconnect();
            }
        }
        if self.armed.take().is_some() {
            self.ctx.scheduler.cancel(&self.record.identity);
        }
        tracing::debug!(identity = %self.record.identity, "session actor stopped");
    }

    // -- control ------------------------------------------------------------

    fn start(&mut self) {
        if self.record.state.is_active() {
            tracing::debug!(
                identity = %self.record.identity,
                state = %self.record.state,
                "already active, start ignored"
            );
            return;
        }
        // A manual start supersedes any pending reconnect.
        self.cancel_reconnect();

        let id = self.next_attempt;
        self.next_attempt += 1;

        self.record.state = SessionState::Connecting;
        self.record.pending_auth = None;

        let (events, mut events_rx) = mpsc::unbounded_channel();

        // Event pump: client events -> this actor, tagged with the attempt.
        let weak = self.weak.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                let Some(tx) = weak.upgrade() else { break };
                if tx
                    .send(SessionCommand::Event { attempt: id, event })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        let request = ConnectRequest {
            identity: self.record.identity.clone(),
            profile_dir: self.ctx.store.profile_dir(&self.record.identity),
            proxy: self.record.proxy.clone(),
            events,
        };
        let ctx = Arc::clone(&self.ctx);
        let weak = self.weak.clone();
        let construct = tokio::spawn(async move {
            let result = ctx.connector.connect(request).await;
            match weak.upgrade() {
                Some(tx) => {
                    let _ = tx
                        .send(SessionCommand::Constructed { attempt: id, result })
                        .await;
                }
                None => {
                    if let Ok(client) = result {
                        client.disconnect();
                    }
                }
            }
        });

        self.current = Some(Attempt {
            id,
            client: None,
            username: None,
            early_ready: None,
            reached_online: false,
            tasks: vec![pump, construct],
        });

        tracing::info!(
            identity = %self.record.identity,
            proxy = self.record.proxy_label(),
            attempt = id,
            "connecting"
        );
    }

    /// Cancels the reconnect timer, detaches the attempt, then disconnects.
    /// Nothing the old attempt does afterwards can reach this actor.
    fn stop(&mut self) {
        self.cancel_reconnect();
        if let Some(attempt) = self.current.take() {
            if let Some(client) = attempt.detach() {
                client.disconnect();
            }
        }
        self.record.state = SessionState::Offline;
        self.record.pending_auth = None;
        tracing::info!(identity = %self.record.identity, "session stopped");
    }

    async fn purge(&mut self) -> Result<(), SessionError> {
        match self.ctx.store.purge(&self.record.identity).await {
            Ok(true) => {
                tracing::info!(identity = %self.record.identity, "auth folder deleted");
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                tracing::warn!(
                    identity = %self.record.identity,
                    error = %e,
                    "failed to delete auth folder"
                );
                Err(e)
            }
        }
    }

    fn chat(&self, text: String) -> Result<(), SessionError> {
        let not_online = || SessionError::SessionNotOnline(self.record.identity.clone());
        if self.record.state != SessionState::Online {
            return Err(not_online());
        }
        let attempt = self.current.as_ref().ok_or_else(not_online)?;
        let client = attempt.client.as_ref().ok_or_else(not_online)?;
        let speaker = attempt
            .username
            .clone()
            .unwrap_or_else(|| self.record.display_name.clone());

        client
            .send_text(TextPacket::chat(speaker, text))
            .map_err(|source| SessionError::SendFailed {
                identity: self.record.identity.clone(),
                source,
            })
    }

    // -- attempt notifications ------------------------------------------------

    fn current_mut(&mut self, attempt: u64) -> Option<&mut Attempt<C::Client>> {
        self.current.as_mut().filter(|a| a.id == attempt)
    }

    fn on_constructed(&mut self, attempt: u64, result: Result<C::Client, TransportError>) {
        let identity = self.record.identity.clone();
        let Some(current) = self.current_mut(attempt) else {
            // Stopped or superseded while construction was in flight.
            if let Ok(client) = result {
                tracing::debug!(%identity, attempt, "discarding stale connection");
                client.disconnect();
            }
            return;
        };

        match result {
            Ok(client) => {
                current.client = Some(client);
                tracing::debug!(%identity, attempt, "connection constructed");
                if let Some((username, display_name, balance)) = current.early_ready.take() {
                    self.go_online(username, display_name, balance);
                }
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    fn on_event(&mut self, attempt: u64, event: ClientEvent) {
        if self.current_mut(attempt).is_none() {
            tracing::trace!(identity = %self.record.identity, attempt, ?event, "stale event dropped");
            return;
        }

        match event {
            ClientEvent::AuthChallenge(challenge) => self.on_auth_challenge(challenge),
            ClientEvent::Spawned { username } => self.on_spawned(attempt, username),
            ClientEvent::Error { reason } => self.fail(reason),
            ClientEvent::Closed { reason } => {
                self.fail(reason.unwrap_or_else(|| "connection closed".to_string()))
            }
        }
    }

    fn on_auth_challenge(&mut self, challenge: PendingAuth) {
        if !matches!(
            self.record.state,
            SessionState::Connecting | SessionState::Authenticating
        ) {
            return;
        }
        tracing::info!(
            identity = %self.record.identity,
            code = %challenge.code,
            url = %challenge.verification_url,
            "device code login required"
        );
        self.record.state = SessionState::Authenticating;
        self.record.pending_auth = Some(challenge);
    }

    /// Starts the balance lookup; the session goes online when it returns.
    fn on_spawned(&mut self, attempt: u64, username: String) {
        let display_name = with_name_marker(&username);
        tracing::debug!(identity = %self.record.identity, %display_name, "spawned, fetching balance");

        let ctx = Arc::clone(&self.ctx);
        let weak = self.weak.clone();
        let lookup = tokio::spawn(async move {
            let balance = ctx.stats.fetch_balance(&display_name).await;
            if let Some(tx) = weak.upgrade() {
                let _ = tx
                    .send(SessionCommand::Ready {
                        attempt,
                        username,
                        display_name,
                        balance,
                    })
                    .await;
            }
        });
        if let Some(current) = self.current_mut(attempt) {
            current.tasks.push(lookup);
        }
    }

    fn on_ready(&mut self, attempt: u64, username: String, display_name: String, balance: String) {
        let Some(current) = self.current_mut(attempt) else {
            return;
        };
        if current.client.is_none() {
            current.early_ready = Some((username, display_name, balance));
            return;
        }
        self.go_online(username, display_name, balance);
    }

    fn go_online(&mut self, username: String, display_name: String, balance: String) {
        if let Some(current) = self.current.as_mut() {
            current.reached_online = true;
            current.username = Some(username);
        }
        self.record.state = SessionState::Online;
        self.record.pending_auth = None;
        self.record.last_error = None;
        self.record.display_name = display_name;
        self.record.balance = balance;
        tracing::info!(
            identity = %self.record.identity,
            name = %self.record.display_name,
            balance = %self.record.balance,
            "session online"
        );
    }

    /// Ends the current attempt after an error, close, or failed
    /// construction, and arms a reconnect.
    fn fail(&mut self, reason: String) {
        let Some(attempt) = self.current.take() else {
            return;
        };
        let tier = if attempt.reached_online {
            ReconnectTier::Short
        } else {
            ReconnectTier::Long
        };
        let had_client = attempt.client.is_some();
        if let Some(client) = attempt.detach() {
            client.disconnect();
        }

        self.record.state = if had_client {
            SessionState::Offline
        } else {
            SessionState::Error
        };
        self.record.pending_auth = None;
        tracing::warn!(
            identity = %self.record.identity,
            %reason,
            %tier,
            "session lost, reconnect scheduled"
        );
        self.record.last_error = Some(reason);
        self.schedule_reconnect(tier);
    }

    // -- reconnect ------------------------------------------------------------

    fn schedule_reconnect(&mut self, tier: ReconnectTier) {
        let weak = self.weak.clone();
        let token = self
            .ctx
            .scheduler
            .schedule(&self.record.identity, tier, move |token| {
                if let Some(tx) = weak.upgrade() {
                    tokio::spawn(async move {
                        let _ = tx.send(SessionCommand::ReconnectDue { token }).await;
                    });
                }
            });
        if token.is_some() {
            self.armed = token;
        }
    }

    fn cancel_reconnect(&mut self) {
        self.ctx.scheduler.cancel(&self.record.identity);
        self.armed = None;
    }

    fn on_reconnect_due(&mut self, token: TimerToken) {
        if self.armed != Some(token) {
            tracing::trace!(identity = %self.record.identity, %token, "stale reconnect ignored");
            return;
        }
        self.armed = None;
        tracing::info!(identity = %self.record.identity, "reconnecting");
        self.start();
    }
}

/// Spawns a session actor in the `Offline` state and returns its handle.
///
/// `channel_size` bounds the command channel; senders wait when it is full.
pub(crate) fn spawn_session<C: Connector, S: StatsLookup>(
    identity: Identity,
    index: usize,
    proxy: Option<ProxyEndpoint>,
    ctx: Arc<SessionContext<C, S>>,
    channel_size: usize,
) -> SessionHandle<C> {
    let (tx, rx) = mpsc::channel(channel_size.max(1));

    let actor = SessionActor {
        record: SessionRecord::new(identity.clone(), index, proxy),
        ctx,
        current: None,
        next_attempt: 1,
        armed: None,
        weak: tx.downgrade(),
        receiver: rx,
    };
    tokio::spawn(actor.run());

    SessionHandle {
        identity,
        index,
        sender: tx,
    }
}
