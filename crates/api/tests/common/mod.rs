#![allow(dead_code)]

//! Shared test harness: an in-memory-store application with the same
//! middleware stack production uses, plus a stand-in for the platform auth
//! layer that reads test headers into an [`AuthUser`] extension.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use axum::{middleware as axum_middleware, Extension, Router};
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use vigil_api::config::ServerConfig;
use vigil_api::middleware::auth::AuthUser;
use vigil_api::routes;
use vigil_api::state::AppState;
use vigil_core::detection::DetectionConfig;
use vigil_db::store::memory::MemoryStore;
use vigil_db::store::SharedStore;
use vigil_events::MonitorBus;
use vigil_pipeline::{recorder, AnomalyDetector};

/// Default test actor. Requests built with [`admin_get`] / [`admin_post`]
/// authenticate as this actor with the `admin` role.
pub const TEST_ACTOR: i64 = 7;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        recorder_queue_capacity: 64,
        activity_retention_days: 90,
        detection: DetectionConfig::default(),
    }
}

/// A fully-wired application over an in-memory store.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub monitor: MonitorBus,
    pub cancel: CancellationToken,
}

/// Build the application with a fresh in-memory store.
pub fn build_test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let shared: SharedStore = store.clone();
    let (router, monitor, cancel) = build_router(shared);
    TestApp {
        router,
        store,
        monitor,
        cancel,
    }
}

/// Build the full application router over an arbitrary store backend.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack (recorder extension, CORS, request
/// ID, timeout, tracing, panic recovery) that production uses, with the
/// header-driven test auth layer standing in for the platform auth layer.
pub fn build_router(store: SharedStore) -> (Router, MonitorBus, CancellationToken) {
    let config = test_config();
    let monitor = MonitorBus::default();

    let detector = Arc::new(AnomalyDetector::new(
        store.clone(),
        Arc::new(config.detection.clone()),
        monitor.clone(),
    ));
    let cancel = CancellationToken::new();
    let (recorder_handle, _join) = recorder::spawn(
        store.clone(),
        detector,
        monitor.clone(),
        config.recorder_queue_capacity,
        cancel.clone(),
    );

    let state = AppState {
        store,
        config: Arc::new(config),
        monitor: monitor.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    let router = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(Extension(recorder_handle))
        .layer(axum_middleware::from_fn(test_auth))
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    (router, monitor, cancel)
}

/// Stand-in for the platform auth layer: requests carrying an `x-actor-id`
/// header get an [`AuthUser`] extension, everything else stays anonymous.
async fn test_auth(mut req: Request, next: Next) -> Response {
    let actor_id = req
        .headers()
        .get("x-actor-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok());

    if let Some(actor_id) = actor_id {
        let role = req
            .headers()
            .get("x-role")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("admin")
            .to_string();
        let session_id = req
            .headers()
            .get("x-session-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("session-test")
            .to_string();
        req.extensions_mut().insert(AuthUser {
            actor_id,
            session_id,
            role,
        });
    }

    next.run(req).await
}

// ---------------------------------------------------------------------------
// Request builders
// ---------------------------------------------------------------------------

/// GET as the default admin test actor.
pub fn admin_get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-actor-id", TEST_ACTOR.to_string())
        .body(Body::empty())
        .unwrap()
}

/// GET as a specific actor and role.
pub fn get_as(uri: &str, actor_id: i64, role: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-actor-id", actor_id.to_string())
        .header("x-role", role)
        .body(Body::empty())
        .unwrap()
}

/// POST a JSON body as the default admin test actor.
pub fn admin_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    let payload = body.to_string();
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("x-actor-id", TEST_ACTOR.to_string())
        .header(CONTENT_TYPE, "application/json")
        .header("content-length", payload.len().to_string())
        .body(Body::from(payload))
        .unwrap()
}

/// GET with no auth headers at all.
pub fn anon_get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Dispatch one request through a clone of the router.
pub async fn send(router: &Router, req: Request<Body>) -> Response {
    router.clone().oneshot(req).await.unwrap()
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// Collect a response body into parsed JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Collect a response body as text.
pub async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ---------------------------------------------------------------------------
// Pipeline synchronization
// ---------------------------------------------------------------------------

/// Wait (up to 2s) until `condition` holds; the recording pipeline is
/// asynchronous, so tests poll for its effects.
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

/// Wait until the store holds exactly `count` activity records.
pub async fn wait_for_records(store: &Arc<MemoryStore>, count: i64) {
    use vigil_db::models::ActivityQuery;
    use vigil_db::store::ActivityStore;

    let store = store.clone();
    wait_until(move || {
        let store = store.clone();
        async move { store.count(&ActivityQuery::default()).await.unwrap() == count }
    })
    .await;
}
