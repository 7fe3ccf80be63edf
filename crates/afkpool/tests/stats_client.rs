//! Integration tests for the HTTP stats client against an in-process
//! fake of the stats API.

use std::sync::Arc;
use std::time::Duration;

use afkpool::HttpStatsClient;
use afkpool::config::StatsSettings;
use afkpool_session::StatsLookup;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use parking_lot::Mutex;
use tokio::net::TcpListener;

/// What the fake saw: (name path segment, Authorization header).
type Seen = Arc<Mutex<Vec<(String, Option<String>)>>>;

#[derive(Clone)]
struct Fake {
    status: StatusCode,
    body: &'static str,
    delay: Duration,
    seen: Seen,
}

async fn stats_handler(
    State(fake): State<Fake>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, &'static str) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    fake.seen.lock().push((name, auth));
    tokio::time::sleep(fake.delay).await;
    (fake.status, fake.body)
}

async fn serve_fake(status: StatusCode, body: &'static str, delay: Duration) -> (String, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route("/v1/stats/:name", get(stats_handler))
        .with_state(Fake {
            status,
            body,
            delay,
            seen: Arc::clone(&seen),
        });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), seen)
}

fn client(base_url: String, api_key: Option<&str>, timeout_secs: u64) -> HttpStatsClient {
    HttpStatsClient::new(&StatsSettings {
        base_url,
        api_key: api_key.map(str::to_string),
        timeout_secs,
    })
    .unwrap()
}

#[tokio::test]
async fn test_string_balance_and_request_shape() {
    let (url, seen) = serve_fake(StatusCode::OK, r#"{"result":{"shards":"1.2K"}}"#, Duration::ZERO).await;
    let stats = client(url, Some("secret-key"), 5);

    assert_eq!(stats.fetch_balance(".playerOne").await, "1.2K");

    let seen = seen.lock().clone();
    assert_eq!(seen, vec![(".playerOne".to_string(), Some("secret-key".to_string()))]);
}

#[tokio::test]
async fn test_numeric_balance_is_stringified() {
    let (url, _) = serve_fake(StatusCode::OK, r#"{"result":{"shards":4200}}"#, Duration::ZERO).await;
    assert_eq!(client(url, None, 5).fetch_balance(".p").await, "4200");
}

#[tokio::test]
async fn test_no_api_key_sends_no_authorization() {
    let (url, seen) = serve_fake(StatusCode::OK, r#"{"result":{"shards":"1"}}"#, Duration::ZERO).await;
    client(url, None, 5).fetch_balance(".p").await;
    assert_eq!(seen.lock()[0].1, None);
}

#[tokio::test]
async fn test_malformed_body_yields_zero() {
    let (url, _) = serve_fake(StatusCode::OK, "<html>oops</html>", Duration::ZERO).await;
    assert_eq!(client(url, None, 5).fetch_balance(".p").await, "0");
}

#[tokio::test]
async fn test_missing_field_yields_zero() {
    let (url, _) = serve_fake(StatusCode::OK, r#"{"result":{}}"#, Duration::ZERO).await;
    assert_eq!(client(url, None, 5).fetch_balance(".p").await, "0");
}

#[tokio::test]
async fn test_error_status_yields_zero() {
    let (url, _) = serve_fake(
        StatusCode::INTERNAL_SERVER_ERROR,
        r#"{"result":{"shards":"999"}}"#,
        Duration::ZERO,
    )
    .await;
    assert_eq!(client(url, None, 5).fetch_balance(".p").await, "0");
}

#[tokio::test]
async fn test_unreachable_server_yields_zero() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    assert_eq!(client(format!("http://{addr}"), None, 5).fetch_balance(".p").await, "0");
}

#[tokio::test]
async fn test_slow_server_times_out_to_zero() {
    let (url, _) = serve_fake(
        StatusCode::OK,
        r#"{"result":{"shards":"1"}}"#,
        Duration::from_secs(3),
    )
    .await;
    assert_eq!(client(url, None, 1).fetch_balance(".p").await, "0");
}
