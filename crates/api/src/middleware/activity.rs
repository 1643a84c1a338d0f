//! Activity recorder middleware.
//!
//! Attach [`record`] (or [`record_with`]) as a `route_layer` on any
//! authenticated route. Request metadata is captured up front, the handler
//! runs, and the completed-request record is enqueued on the bounded
//! recording queue after the response is produced. Enqueueing is a
//! non-blocking `try_send`; persistence and detection happen on the worker,
//! so no write latency is ever visible to the caller.
//!
//! Requests without an [`AuthUser`] extension are not recorded at all.

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{CONTENT_LENGTH, USER_AGENT};
use axum::middleware::Next;
use axum::response::Response;
use vigil_core::activity::ActivityStatus;
use vigil_core::types::DbId;
use vigil_db::models::{ActivityDetail, CreateActivityRecord};
use vigil_pipeline::{RecordJob, RecorderHandle};

use crate::middleware::auth::AuthUser;

/// Bodies larger than this are not captured into the activity record.
pub const MAX_BODY_CAPTURE_BYTES: usize = 64 * 1024;

/// Resolves the id of the entity a route operates on from the request.
pub type TargetResolver = fn(&Request) -> Option<DbId>;

/// Extracts route-specific extras for the record's detail payload.
pub type ExtraExtractor = fn(&Request) -> serde_json::Map<String, serde_json::Value>;

/// Per-route recording options.
#[derive(Clone, Copy, Default)]
pub struct RecordOptions {
    /// Resolver for the record's `target_id`.
    pub target: Option<TargetResolver>,
    /// Detail-extractor callback for caller-supplied extras.
    pub extras: Option<ExtraExtractor>,
    /// Skip anomaly detection for this route (recording still happens).
    pub skip_detection: bool,
}

/// Recording middleware with default options.
///
/// ```ignore
/// Router::new()
///     .route("/", get(handler))
///     .route_layer(axum::middleware::from_fn(activity::record("flag_query")))
/// ```
pub fn record(
    action_type: &'static str,
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Clone {
    record_with(action_type, RecordOptions::default())
}

/// Recording middleware with a target resolver and/or extras callback.
pub fn record_with(
    action_type: &'static str,
    opts: RecordOptions,
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Clone {
    move |req, next| Box::pin(run(action_type, opts, req, next))
}

async fn run(action_type: &'static str, opts: RecordOptions, req: Request, next: Next) -> Response {
    // No authenticated actor: the request is not recorded at all.
    let Some(user) = req.extensions().get::<AuthUser>().cloned() else {
        return next.run(req).await;
    };
    // The enqueue handle is installed app-wide as an Extension layer.
    let Some(recorder) = req.extensions().get::<RecorderHandle>().cloned() else {
        tracing::warn!("Recorder handle missing from request extensions, request not recorded");
        return next.run(req).await;
    };

    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let ip_address = client_ip(&req);
    let target_id = opts.target.and_then(|resolve| resolve(&req));
    let extra = opts.extras.map(|extract| extract(&req)).unwrap_or_default();

    let (req, body) = capture_body(req).await;

    let started = Instant::now();
    let response = next.run(req).await;

    let status = ActivityStatus::from_status_code(response.status().as_u16());
    let detail = ActivityDetail {
        method,
        path,
        query,
        body,
        latency_ms: started.elapsed().as_millis() as i64,
        user_agent,
        extra,
    };
    recorder.try_enqueue(RecordJob {
        record: CreateActivityRecord {
            actor_id: user.actor_id,
            session_id: user.session_id,
            action_type: action_type.to_string(),
            target_id,
            ip_address,
            status: status.as_str().to_string(),
            detail_json: detail.to_value(),
        },
        detect: !opts.skip_detection,
    });

    response
}

/// Best-effort client IP: first `x-forwarded-for` hop, falling back to the
/// socket address when the server runs with `into_make_service_with_connect_info`.
fn client_ip(req: &Request) -> Option<String> {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    req.extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|info| info.0.ip().to_string())
}

/// Buffer and re-attach the request body so the record can carry an excerpt.
///
/// Only bodies with a declared `content-length` of at most
/// [`MAX_BODY_CAPTURE_BYTES`] are captured; anything else passes through
/// untouched. Non-UTF-8 bodies are re-attached but not excerpted.
async fn capture_body(req: Request) -> (Request, Option<String>) {
    let capturable = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .is_some_and(|len| len > 0 && len <= MAX_BODY_CAPTURE_BYTES);
    if !capturable {
        return (req, None);
    }

    let (parts, body) = req.into_parts();
    match axum::body::to_bytes(body, MAX_BODY_CAPTURE_BYTES).await {
        Ok(bytes) => {
            let excerpt = std::str::from_utf8(&bytes).ok().map(str::to_string);
            (Request::from_parts(parts, Body::from(bytes)), excerpt)
        }
        Err(e) => {
            // The body stream failed mid-read; the handler will see an empty
            // body, which is what a broken stream would have produced anyway.
            tracing::debug!(error = %e, "Failed to buffer request body for recording");
            (Request::from_parts(parts, Body::empty()), None)
        }
    }
}

/// Target resolver reading the first integer path segment.
///
/// Covers the common `/{id}` and `/{id}/action` route shapes.
pub fn target_from_path(req: &Request) -> Option<DbId> {
    req.uri()
        .path()
        .split('/')
        .find_map(|segment| segment.parse::<DbId>().ok())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn request_for(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn target_from_path_finds_the_id_segment() {
        assert_eq!(target_from_path(&request_for("/api/v1/admin/flags/42/assign")), Some(42));
        assert_eq!(target_from_path(&request_for("/api/v1/admin/flags/7")), Some(7));
        assert_eq!(target_from_path(&request_for("/api/v1/admin/flags")), None);
    }

    #[test]
    fn client_ip_prefers_first_forwarded_hop() {
        let req = Request::builder()
            .uri("/")
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req).as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn client_ip_is_none_without_forwarding_or_socket_info() {
        assert_eq!(client_ip(&request_for("/")), None);
    }

    #[tokio::test]
    async fn small_body_is_captured_and_reattached() {
        let req = Request::builder()
            .uri("/")
            .header(CONTENT_LENGTH, "11")
            .body(Body::from("hello world"))
            .unwrap();
        let (req, excerpt) = capture_body(req).await;
        assert_eq!(excerpt.as_deref(), Some("hello world"));

        let bytes = axum::body::to_bytes(req.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], b"hello world");
    }

    #[tokio::test]
    async fn body_without_content_length_is_not_captured() {
        let req = Request::builder().uri("/").body(Body::from("data")).unwrap();
        let (_req, excerpt) = capture_body(req).await;
        assert!(excerpt.is_none());
    }

    #[tokio::test]
    async fn oversized_body_is_not_captured() {
        let big = "x".repeat(MAX_BODY_CAPTURE_BYTES + 1);
        let req = Request::builder()
            .uri("/")
            .header(CONTENT_LENGTH, big.len().to_string())
            .body(Body::from(big))
            .unwrap();
        let (_req, excerpt) = capture_body(req).await;
        assert!(excerpt.is_none());
    }
}
