//! `AfkpoolServer`: wires the registry to the control surface and runs it.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use afkpool_session::{AuthStore, SessionRegistry, StatsLookup};
use afkpool_transport::{Connector, GatewayConnector};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::control::{AppState, router};
use crate::{AfkpoolConfig, AfkpoolError, HttpStatsClient, LogBuffer};

/// A bound, ready-to-run afkpool process.
///
/// Construction restores sessions from the auth folder (and connects them
/// if `auto_connect` is set) and binds the control listener. [`run`]
/// serves until Ctrl-C, then stops every session.
///
/// [`run`]: Self::run
pub struct AfkpoolServer<C: Connector, S: StatsLookup> {
    listener: TcpListener,
    state: AppState<C, S>,
    balance_refresh: Option<Duration>,
}

impl AfkpoolServer<GatewayConnector, HttpStatsClient> {
    /// Builds a server with the bundled gateway connector and HTTP stats
    /// client.
    pub async fn from_config(config: &AfkpoolConfig, logs: LogBuffer) -> Result<Self, AfkpoolError> {
        let connector = GatewayConnector::new(config.gateway_config());
        let stats = HttpStatsClient::new(&config.stats)?;
        Self::bind(config, connector, stats, logs).await
    }
}

impl<C: Connector, S: StatsLookup> AfkpoolServer<C, S> {
    pub async fn bind(
        config: &AfkpoolConfig,
        connector: C,
        stats: S,
        logs: LogBuffer,
    ) -> Result<Self, AfkpoolError> {
        tokio::fs::create_dir_all(&config.auth_dir).await?;

        let registry = Arc::new(SessionRegistry::new(
            config.session_config(),
            config.proxy_pool(),
            AuthStore::new(&config.auth_dir),
            connector,
            stats,
        ));

        let restored = registry.restore().await?;
        if config.auto_connect {
            for identity in restored {
                registry.connect(identity).await?;
            }
        }

        let listener = TcpListener::bind(&config.bind)
            .await
            .map_err(|e| AfkpoolError::Server(format!("failed to bind to {}: {e}", config.bind)))?;

        Ok(Self {
            listener,
            state: AppState::new(registry, logs),
            balance_refresh: config.balance_refresh(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> &Arc<SessionRegistry<C, S>> {
        &self.state.registry
    }

    /// Serves until Ctrl-C.
    pub async fn run(self) -> Result<(), AfkpoolError> {
        self.run_until(shutdown_signal()).await
    }

    /// Serves until `shutdown` resolves, then stops every session
    /// (without deleting anything).
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), AfkpoolError> {
        let registry = Arc::clone(&self.state.registry);
        let refresher = self
            .balance_refresh
            .map(|period| spawn_balance_refresh(Arc::clone(&registry), period));

        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(%addr, "control surface listening");
        }

        let served = axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| AfkpoolError::Server(format!("server error: {e}")));

        if let Some(task) = refresher {
            task.abort();
        }
        registry.shutdown().await;
        served
    }
}

/// Refreshes every online balance each `period`, starting one period
/// from now.
fn spawn_balance_refresh<C: Connector, S: StatsLookup>(
    registry: Arc<SessionRegistry<C, S>>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            registry.refresh_all_balances().await;
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
