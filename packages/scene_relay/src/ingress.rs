//! HTTP ingress: status endpoints and the `POST /log` bridge into the producers.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::info;
use uuid::Uuid;

use crate::RelayState;
use crate::connection::Population;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

pub fn ingress_routes(state: RelayState) -> Router {
    Router::new()
        .route("/", get(status_handler))
        .route("/clients", get(clients_handler))
        // `/log` takes bodies of any size.
        .route("/log", post(log_handler).layer(DefaultBodyLimit::disable()))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Body of `POST /log`.
#[derive(Debug, Default, Deserialize)]
pub struct LogRequest {
    pub message: Option<String>,
}

impl LogRequest {
    /// Lenient parse: anything that is not a JSON object with an optional
    /// string `message` counts as a request without a message.
    pub fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    pub fn message_or(self, placeholder: &str) -> String {
        self.message.unwrap_or_else(|| placeholder.to_string())
    }
}

/// Response of `GET /clients`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientCounts {
    pub td: usize,
    pub browser: usize,
}

async fn status_handler() -> &'static str {
    "OK"
}

async fn clients_handler(State(state): State<RelayState>) -> Json<ClientCounts> {
    Json(ClientCounts {
        td: state.producers.size(),
        browser: state.consumers.size(),
    })
}

/// Forward the posted message to every open producer. Always 200: callers
/// cannot tell how many producers received it.
async fn log_handler(State(state): State<RelayState>, body: Bytes) -> StatusCode {
    let message = LogRequest::from_body(&body).message_or(&state.config.placeholder);
    state.metrics.ingress_message();

    let report = state
        .broadcast(Population::Producer, &message.as_str().into())
        .await;
    info!(
        bytes = message.len(),
        delivered = report.delivered,
        skipped = report.skipped,
        timed_out = report.timed_out,
        "http message relayed to td"
    );

    StatusCode::OK
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

async fn metrics_handler(State(state): State<RelayState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::connection::{ConnectionHandle, ConnectionState};
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    fn test_state() -> RelayState {
        RelayState::new(RelayConfig::ephemeral())
    }

    async fn body_bytes(resp: axum::response::Response) -> Bytes {
        axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap()
    }

    fn post_log(body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/log")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[test]
    fn test_log_request_parsing() {
        let with = LogRequest::from_body(br#"{"message":"hello"}"#);
        assert_eq!(with.message_or("(empty)"), "hello");

        let messageless: [&[u8]; 5] = [
            b"{}",
            b"",
            b"not json",
            br#"{"message":null}"#,
            br#"{"message":5}"#,
        ];
        for body in messageless {
            assert_eq!(LogRequest::from_body(body).message_or("(empty)"), "(empty)");
        }

        let blank = LogRequest::from_body(br#"{"message":""}"#);
        assert_eq!(blank.message_or("(empty)"), "");
    }

    #[tokio::test]
    async fn test_status_ok() {
        let app = ingress_routes(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(&body_bytes(resp).await[..], b"OK");
    }

    #[tokio::test]
    async fn test_clients_reports_both_registries() {
        let state = test_state();
        let (producer, _rx) = ConnectionHandle::new(Population::Producer, 4);
        state.producers.add(producer);

        let app = ingress_routes(state);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/clients")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let counts: ClientCounts = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(counts, ClientCounts { td: 1, browser: 0 });
    }

    #[tokio::test]
    async fn test_log_forwards_to_producers_only() {
        let state = test_state();
        let (producer, mut producer_rx) = ConnectionHandle::new(Population::Producer, 4);
        producer.transition(ConnectionState::Open);
        state.producers.add(producer);
        let (consumer, mut consumer_rx) = ConnectionHandle::new(Population::Consumer, 4);
        consumer.transition(ConnectionState::Open);
        state.consumers.add(consumer);

        let app = ingress_routes(state.clone());
        let resp = app.oneshot(post_log(r#"{"message":"hello"}"#)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_bytes(resp).await.is_empty());
        assert_eq!(producer_rx.recv().await.unwrap().as_str(), "hello");
        assert!(consumer_rx.try_recv().is_err());
        assert_eq!(state.metrics.snapshot().ingress_messages, 1);
    }

    #[tokio::test]
    async fn test_log_without_message_sends_placeholder() {
        let state = test_state();
        let (producer, mut producer_rx) = ConnectionHandle::new(Population::Producer, 4);
        producer.transition(ConnectionState::Open);
        state.producers.add(producer);

        let app = ingress_routes(state);
        let resp = app.oneshot(post_log("{}")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(producer_rx.recv().await.unwrap().as_str(), "(empty)");
    }

    #[tokio::test]
    async fn test_log_malformed_body_still_ok() {
        let app = ingress_routes(test_state());
        let resp = app.oneshot(post_log("{not json")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_log_accepts_body_over_default_limit() {
        let state = test_state();
        let (producer, mut producer_rx) = ConnectionHandle::new(Population::Producer, 4);
        producer.transition(ConnectionState::Open);
        state.producers.add(producer);

        let message = "a".repeat(3 * 1024 * 1024);
        let body = serde_json::json!({ "message": message }).to_string();
        let app = ingress_routes(state);
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/log")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(producer_rx.recv().await.unwrap().as_str().len(), message.len());
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let app = ingress_routes(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/log")
                    .header("origin", "http://example.com")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert!(
            resp.headers()
                .contains_key("access-control-allow-origin")
        );
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = ingress_routes(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(json["ingress_messages"], 0);
    }
}
