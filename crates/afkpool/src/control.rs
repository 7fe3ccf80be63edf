//! HTTP control surface.
//!
//! Every route is a `GET` with query parameters, so the whole pool can
//! be driven from a browser address bar:
//!
//! | Route                | Query              | Reply                         |
//! |----------------------|--------------------|-------------------------------|
//! | `/add`               | `email`            | `OK`                          |
//! | `/connect`           | `email`            | `OK`                          |
//! | `/disconnect`        | `email`            | `OK`, 404 if unknown          |
//! | `/remove`            | `email`            | `OK`, 404 if unknown          |
//! | `/chat`              | `email`, `message` | `Sent`, 400 `Offline`, 404    |
//! | `/status`            |                    | JSON list of snapshots        |
//! | `/update-shards`     | `email`            | `{"shards": ...}`, 404        |
//! | `/update-all-shards` |                    | `{"refreshed": n}`            |
//! | `/logs`              |                    | JSON list of recent log lines |
//! | `/health`            |                    | `OK`                          |

use std::sync::Arc;

use afkpool_protocol::{Identity, SessionSnapshot};
use afkpool_session::{SessionRegistry, StatsLookup};
use afkpool_transport::Connector;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::{AfkpoolError, LogBuffer};

/// Shared state handed to every handler.
pub struct AppState<C: Connector, S: StatsLookup> {
    pub registry: Arc<SessionRegistry<C, S>>,
    pub logs: LogBuffer,
}

impl<C: Connector, S: StatsLookup> Clone for AppState<C, S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            logs: self.logs.clone(),
        }
    }
}

impl<C: Connector, S: StatsLookup> AppState<C, S> {
    pub fn new(registry: Arc<SessionRegistry<C, S>>, logs: LogBuffer) -> Self {
        Self { registry, logs }
    }
}

#[derive(Debug, Deserialize)]
pub struct IdentityQuery {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    pub email: String,
    #[serde(default)]
    pub message: String,
}

/// Builds the router with every control route.
pub fn router<C: Connector, S: StatsLookup>(state: AppState<C, S>) -> Router {
    Router::new()
        .route("/add", get(add::<C, S>))
        .route("/connect", get(connect::<C, S>))
        .route("/disconnect", get(disconnect::<C, S>))
        .route("/remove", get(remove::<C, S>))
        .route("/chat", get(chat::<C, S>))
        .route("/status", get(status::<C, S>))
        .route("/update-shards", get(update_shards::<C, S>))
        .route("/update-all-shards", get(update_all_shards::<C, S>))
        .route("/logs", get(logs::<C, S>))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /add - register if unknown, then start.
async fn add<C: Connector, S: StatsLookup>(
    State(state): State<AppState<C, S>>,
    Query(query): Query<IdentityQuery>,
) -> Result<&'static str, AfkpoolError> {
    state.registry.add(Identity::parse(query.email)?).await?;
    Ok("OK")
}

/// GET /connect - same as /add.
async fn connect<C: Connector, S: StatsLookup>(
    State(state): State<AppState<C, S>>,
    Query(query): Query<IdentityQuery>,
) -> Result<&'static str, AfkpoolError> {
    state.registry.connect(Identity::parse(query.email)?).await?;
    Ok("OK")
}

/// GET /disconnect - stop, keeping the record and credentials.
async fn disconnect<C: Connector, S: StatsLookup>(
    State(state): State<AppState<C, S>>,
    Query(query): Query<IdentityQuery>,
) -> Result<&'static str, AfkpoolError> {
    state
        .registry
        .disconnect(&Identity::parse(query.email)?)
        .await?;
    Ok("OK")
}

/// GET /remove - stop, then forget the session and delete its credentials.
async fn remove<C: Connector, S: StatsLookup>(
    State(state): State<AppState<C, S>>,
    Query(query): Query<IdentityQuery>,
) -> Result<&'static str, AfkpoolError> {
    state.registry.remove(&Identity::parse(query.email)?).await?;
    Ok("OK")
}

async fn chat<C: Connector, S: StatsLookup>(
    State(state): State<AppState<C, S>>,
    Query(query): Query<ChatQuery>,
) -> Result<&'static str, AfkpoolError> {
    let identity = Identity::parse(query.email)?;
    state.registry.chat(&identity, query.message).await?;
    Ok("Sent")
}

async fn status<C: Connector, S: StatsLookup>(
    State(state): State<AppState<C, S>>,
) -> Json<Vec<SessionSnapshot>> {
    Json(state.registry.status().await)
}

async fn update_shards<C: Connector, S: StatsLookup>(
    State(state): State<AppState<C, S>>,
    Query(query): Query<IdentityQuery>,
) -> Result<Json<serde_json::Value>, AfkpoolError> {
    let identity = Identity::parse(query.email)?;
    let shards = state.registry.refresh_balance(&identity).await?;
    Ok(Json(serde_json::json!({ "shards": shards })))
}

async fn update_all_shards<C: Connector, S: StatsLookup>(
    State(state): State<AppState<C, S>>,
) -> Json<serde_json::Value> {
    let refreshed = state.registry.refresh_all_balances().await;
    Json(serde_json::json!({ "refreshed": refreshed }))
}

async fn logs<C: Connector, S: StatsLookup>(
    State(state): State<AppState<C, S>>,
) -> Json<Vec<String>> {
    Json(state.logs.lines())
}

async fn health() -> &'static str {
    "OK"
}
