//! HTTP front for the request/response path.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::{Body, to_bytes},
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use rowpipe_shared::{Result, RowpipeError};
use serde_json::json;
use tracing::info;

use crate::api::{ApiRequest, ApiResponse, Payload, RecordService};

/// Largest request body read from the wire.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub records: Arc<RecordService>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/items", any(items))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| RowpipeError::Network(format!("cannot bind {bind}: {e}")))?;
    info!(bind, "HTTP server listening");

    axum::serve(
        listener,
        build_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
    })
    .await
    .map_err(|e| RowpipeError::Network(e.to_string()))
}

async fn items(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Body,
) -> ApiResponse {
    // Raw body: decoding is left to the record service, after the method check.
    let payload = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) if bytes.is_empty() => Payload::Empty,
        Ok(bytes) => Payload::Bytes(bytes.to_vec()),
        Err(e) => Payload::Unreadable(format!(
            "request body could not be read (limit {MAX_BODY_BYTES} bytes): {e}"
        )),
    };
    let mut request = ApiRequest::new(method.as_str(), payload);
    request.caller = caller(&headers, peer.map(|ConnectInfo(addr)| addr));
    state.records.handle(request).await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "rowpipe",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// First `X-Forwarded-For` hop, else the peer address.
fn caller(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.body)).into_response();
        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::test_support::{MapSource, RecordingNotifier, pipeline};
    use axum::http::Request;
    use rowpipe_storage::MemoryStore;
    use serde_json::Value;
    use tower::ServiceExt;

    fn router() -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let p = pipeline(
            store.clone(),
            Arc::new(MapSource::default()),
            Arc::new(RecordingNotifier::default()),
            Arc::new(FixedClock::new(1_700_000_000_000)),
        );
        (build_router(AppState { records: p.records }), store)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn post_items_creates_a_record() {
        let (app, store) = router();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/items")
                    .header("content-type", "application/json")
                    .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
                    .body(Body::from(r#"{"nome":"Widget","estoque":"4"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        let body = body_json(response).await;
        assert_eq!(body["data"]["stock"], 4);
        assert_eq!(body["data"]["source_detail"], "203.0.113.9");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn invalid_json_is_bad_request() {
        let (app, _) = router();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/items")
                    .body(Body::from("{oops"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Invalid JSON");
    }

    #[tokio::test]
    async fn options_preflight_returns_cors_headers() {
        let (app, _) = router();
        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/items")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-methods"],
            "OPTIONS,POST"
        );
    }

    #[tokio::test]
    async fn options_ignores_undecodable_body() {
        let (app, _) = router();
        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/items")
                    .body(Body::from(vec![0xff, 0xfe]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(body_json(response).await, serde_json::json!({}));
    }

    #[tokio::test]
    async fn non_utf8_post_is_invalid_json_with_cors() {
        let (app, store) = router();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/items")
                    .body(Body::from(b"{\xff}".to_vec()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(body_json(response).await["error"], "Invalid JSON");
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn oversized_bodies_follow_the_method_rules() {
        let oversized = vec![b' '; MAX_BODY_BYTES + 1];

        let (app, _) = router();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/items")
                    .body(Body::from(oversized.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(body_json(response).await["error"], "Invalid JSON");

        let (app, _) = router();
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/items")
                    .body(Body::from(oversized))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body_json(response).await["error"], "Method Not Allowed");
    }

    #[tokio::test]
    async fn get_items_is_method_not_allowed() {
        let (app, _) = router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/items")
                    .body(Body::from(vec![0xc3, 0x28]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(body_json(response).await["error"], "Method Not Allowed");
    }

    #[tokio::test]
    async fn health_reports_version() {
        let (app, _) = router();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn caller_prefers_forwarded_header() {
        let peer: SocketAddr = "192.0.2.1:5555".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(caller(&headers, Some(peer)).as_deref(), Some("192.0.2.1"));
        assert_eq!(caller(&headers, None), None);

        headers.insert("x-forwarded-for", HeaderValue::from_static(" 198.51.100.2 "));
        assert_eq!(caller(&headers, Some(peer)).as_deref(), Some("198.51.100.2"));
    }
}
