//! Axum route handlers for the gomibako HTTP API.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, OriginalUri, Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{any, get, post},
    Json, Router,
};
use gomibako_core::{BinKey, CapturedRequest, Headers};
use gomibako_hub::Registry;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{error::GatewayError, live::LiveTail, view::InspectView};

// ── Shared state ─────────────────────────────────────────────────────────────

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    /// Cancelled on server shutdown; ends open live tails.
    pub shutdown: CancellationToken,
}

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CreateBinResponse {
    pub key: BinKey,
    pub ingest_url: String,
    pub inspect_url: String,
    pub stream_url: String,
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Build the application router.
///
/// Request bodies above `max_body_bytes` are rejected with `413`.
pub fn create_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/g/-/new", post(create_bin))
        .route("/g/{key}", any(record_request))
        .route("/g/{key}/inspect", get(inspect_bin))
        .route("/g/{key}/stream", get(stream_bin))
        .route("/health", get(health))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// `GET /health`: liveness probe.
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

/// `POST /g/-/new`: mint a bin.
///
/// # Errors
/// Returns `503` if no key could be generated; the client may retry.
pub async fn create_bin(State(state): State<AppState>) -> Result<impl IntoResponse, GatewayError> {
    let key = state.registry.create().await?;
    let body = CreateBinResponse {
        ingest_url: format!("/g/{key}"),
        inspect_url: format!("/g/{key}/inspect"),
        stream_url: format!("/g/{key}/stream"),
        key,
    };
    Ok((StatusCode::CREATED, [(header::LOCATION, body.inspect_url.clone())], Json(body)))
}

/// `ANY /g/{key}`: record the request into the bin, stamped with the
/// registry's clock.
///
/// # Errors
/// Returns [`GatewayError::InvalidKey`] for a malformed key and `404` for an
/// unknown one. Oversized bodies are rejected by the body limit layer.
pub async fn record_request(
    State(state): State<AppState>,
    Path(raw_key): Path<String>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, GatewayError> {
    let key = BinKey::parse(&raw_key)?;
    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok());
    let captured_headers: Headers = headers
        .iter()
        .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes())))
        .collect();

    let request = CapturedRequest::new(key, method.as_str(), uri.to_string())
        .received_at(state.registry.now())
        .with_headers(captured_headers)
        .with_body(body)
        .with_content_length(content_length);
    state.registry.ingest(request).await?;

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "text/plain")], "ok\n"))
}

/// `GET /g/{key}/inspect`: the bin's history, newest first.
///
/// # Errors
/// Returns [`GatewayError::InvalidKey`] for a malformed key and `404` for an
/// unknown one.
pub async fn inspect_bin(
    State(state): State<AppState>,
    Path(raw_key): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let key = BinKey::parse(&raw_key)?;
    let history = state.registry.snapshot(&key).await?;
    Ok(Json(InspectView::from_history(key, &history)))
}

/// `GET /g/{key}/stream`: live tail as Server-Sent Events.
///
/// The stream ends when the bin expires or the server shuts down.
///
/// # Errors
/// Returns [`GatewayError::InvalidKey`] for a malformed key and `404` for an
/// unknown one.
pub async fn stream_bin(
    State(state): State<AppState>,
    Path(raw_key): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let key = BinKey::parse(&raw_key)?;
    let feed = state.registry.subscribe(&key).await?;
    let tail = LiveTail::new(Arc::clone(&state.registry), feed, state.shutdown.child_token());
    Ok(tail.into_sse())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use futures::StreamExt;
    use gomibako_core::RandomKeyGenerator;
    use gomibako_hub::{Hub, HubConfig, ManualClock};
    use tower::ServiceExt;

    fn test_app(hub: &Hub, max_body_bytes: usize) -> Router {
        let state = AppState { registry: hub.registry(), shutdown: CancellationToken::new() };
        create_router(state, max_body_bytes)
    }

    fn build(req: axum::http::request::Builder, body: Body) -> Request<Body> {
        match req.body(body) {
            Ok(r) => r,
            Err(e) => panic!("failed to build request: {e}"),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> axum::response::Response {
        match app.clone().oneshot(req).await {
            Ok(r) => r,
            Err(e) => panic!("handler error: {e}"),
        }
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = match axum::body::to_bytes(resp.into_body(), 1 << 20).await {
            Ok(b) => b,
            Err(e) => panic!("failed to read body: {e}"),
        };
        match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(e) => panic!("invalid JSON: {e}"),
        }
    }

    async fn create(app: &Router) -> String {
        let resp = send(app, build(Request::post("/g/-/new"), Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = json_body(resp).await;
        match body["key"].as_str() {
            Some(k) => k.to_owned(),
            None => panic!("create response has no key: {body}"),
        }
    }

    #[tokio::test]
    async fn health_response_format_returns_ok_with_status_field() {
        let hub = Hub::start(HubConfig::default());
        let app = test_app(&hub, 1024);
        let resp = send(&app, build(Request::get("/health"), Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["status"], "ok");
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn create_returns_key_and_location() {
        let hub = Hub::start(HubConfig::default());
        let app = test_app(&hub, 1024);
        let resp = send(&app, build(Request::post("/g/-/new"), Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let location = resp
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = json_body(resp).await;
        let Some(key) = body["key"].as_str() else { panic!("missing key: {body}") };
        assert_eq!(key.len(), 10);
        assert_eq!(location.as_deref(), Some(format!("/g/{key}/inspect").as_str()));
        assert_eq!(body["ingest_url"], format!("/g/{key}"));
        assert_eq!(body["stream_url"], format!("/g/{key}/stream"));
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn recorded_requests_are_inspected_newest_first() {
        let hub = Hub::start(HubConfig::default());
        let app = test_app(&hub, 1024);
        let key = create(&app).await;

        let first = Request::post(format!("/g/{key}?n=1"))
            .header("x-b", "2")
            .header("x-a", "1")
            .header(header::CONTENT_LENGTH, "5");
        let resp = send(&app, build(first, Body::from("first"))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = match axum::body::to_bytes(resp.into_body(), 64).await {
            Ok(b) => b,
            Err(e) => panic!("failed to read body: {e}"),
        };
        assert_eq!(&bytes[..], b"ok\n");

        let second = Request::get(format!("/g/{key}?n=2"));
        assert_eq!(send(&app, build(second, Body::empty())).await.status(), StatusCode::OK);

        let resp =
            send(&app, build(Request::get(format!("/g/{key}/inspect")), Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let view = json_body(resp).await;
        assert_eq!(view["key"], key.as_str());
        assert_eq!(view["requests"][0]["method"], "GET");
        assert_eq!(view["requests"][0]["url"], format!("/g/{key}?n=2"));
        assert_eq!(view["requests"][1]["method"], "POST");
        assert_eq!(view["requests"][1]["body"], "first");
        assert_eq!(view["requests"][1]["content_length"], 5);

        let headers = view["requests"][1]["headers"].as_array().cloned().unwrap_or_default();
        let names: Vec<&str> = headers.iter().filter_map(|h| h["name"].as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted, "headers must be sorted by name");
        assert!(names.contains(&"x-a") && names.contains(&"x-b"));
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn recorded_request_is_stamped_by_the_registry_clock() {
        let at = match chrono::DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z") {
            Ok(t) => t.with_timezone(&chrono::Utc),
            Err(e) => panic!("bad timestamp: {e}"),
        };
        let clock = Arc::new(ManualClock::new(at));
        let hub = Hub::start_with(
            HubConfig::default(),
            Arc::new(RandomKeyGenerator::default()),
            clock.clone(),
        );
        let app = test_app(&hub, 1024);
        let key = create(&app).await;

        clock.advance(std::time::Duration::from_secs(30));
        let ingest = Request::post(format!("/g/{key}"));
        assert_eq!(send(&app, build(ingest, Body::from("x"))).await.status(), StatusCode::OK);

        let resp =
            send(&app, build(Request::get(format!("/g/{key}/inspect")), Body::empty())).await;
        let view = json_body(resp).await;
        let expected = at + chrono::Duration::seconds(30);
        assert_eq!(view["requests"][0]["timestamp"], expected.to_rfc3339());
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_bin_returns_404_and_creates_nothing() {
        let hub = Hub::start(HubConfig::default());
        let app = test_app(&hub, 1024);
        let resp = send(&app, build(Request::post("/g/nosuchbin"), Body::from("x"))).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = send(&app, build(Request::get("/g/nosuchbin/inspect"), Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(hub.registry().inbox_count().await, 0);
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_key_returns_400() {
        let hub = Hub::start(HubConfig::default());
        let app = test_app(&hub, 1024);
        let resp = send(&app, build(Request::get("/g/bad%20key/inspect"), Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn oversized_body_returns_413() {
        let hub = Hub::start(HubConfig::default());
        let app = test_app(&hub, 16);
        let key = create(&app).await;
        let resp = send(&app, build(Request::post(format!("/g/{key}")), Body::from(vec![b'x'; 17])))
            .await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let Ok(history) = hub.registry().snapshot(&BinKey::new(key)).await else {
            panic!("bin should exist")
        };
        assert!(history.is_empty(), "rejected request must not be recorded");
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn stream_emits_request_events() {
        let hub = Hub::start(HubConfig::default());
        let app = test_app(&hub, 1024);
        let key = create(&app).await;

        let resp = send(&app, build(Request::get(format!("/g/{key}/stream")), Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        assert_eq!(content_type.as_deref(), Some("text/event-stream"));

        let ingest = Request::put(format!("/g/{key}"));
        assert_eq!(send(&app, build(ingest, Body::from("live!"))).await.status(), StatusCode::OK);

        let mut frames = resp.into_body().into_data_stream();
        let chunk = match tokio::time::timeout(Duration::from_secs(2), frames.next()).await {
            Ok(Some(Ok(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            other => panic!("no event received: {other:?}"),
        };
        assert!(chunk.contains("event: request"), "unexpected frame: {chunk}");
        assert!(chunk.contains("live!"), "event must carry the body: {chunk}");
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn stream_of_unknown_bin_returns_404() {
        let hub = Hub::start(HubConfig::default());
        let app = test_app(&hub, 1024);
        let resp = send(&app, build(Request::get("/g/nosuchbin/stream"), Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        hub.shutdown().await;
    }
}
