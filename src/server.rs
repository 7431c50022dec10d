//! HTTP surface: the WebSocket upgrade plus a few stateless endpoints.

use axum::{
    extract::{State, WebSocketUpgrade},
    http::{header, HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handler;
use crate::relay::Relay;

/// Body of `GET /`.
pub const GREETING: &str = "Hello world from socket server!";

/// Build the router with all routes and layers, bound to `relay`.
pub fn router(relay: Relay) -> Router {
    let cors = cors_layer(relay.config().cors_origin.as_deref());

    Router::new()
        .route("/", get(greeting_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(relay)
}

/// CORS policy. A configured origin is allowed with credentials; otherwise
/// any origin is allowed.
fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let methods = [Method::GET, Method::POST];

    match origin.map(|o| (o, HeaderValue::from_str(o))) {
        Some((_, Ok(origin))) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true),
        Some((raw, Err(e))) => {
            tracing::warn!(origin = raw, error = %e, "Ignoring invalid CORS origin");
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(methods)
                .allow_headers(Any)
        }
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any),
    }
}

// ── Route Handlers ────────────────────────────────────────────────────────────

async fn greeting_handler() -> &'static str {
    GREETING
}

/// WebSocket upgrade handler for client connections.
async fn ws_handler(ws: WebSocketUpgrade, State(relay): State<Relay>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handler::handle_websocket(socket, relay))
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Statistics endpoint.
async fn stats_handler(State(relay): State<Relay>) -> impl IntoResponse {
    Json(json!({
        "online_users": relay.online_count(),
        "connections": relay.gateway().connection_count(),
        "stored_messages": relay.store().len(),
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::protocol::SendMessage;
    use crate::relay::RelayConfig;

    async fn get_body(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_greeting() {
        let app = router(Relay::new(RelayConfig::default()));
        let (status, body) = get_body(app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, GREETING.as_bytes());
    }

    #[tokio::test]
    async fn test_health_json_structure() {
        let app = router(Relay::new(RelayConfig::default()));
        let (status, body) = get_body(app, "/health").await;
        assert_eq!(status, StatusCode::OK);

        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["service"], "presence-relay");
    }

    #[tokio::test]
    async fn test_stats_counts_stored_messages() {
        let relay = Relay::new(RelayConfig::default());
        relay.send_message(SendMessage {
            sender_id: "alice".to_string(),
            receiver_id: "bob".to_string(),
            text: Some("hi".to_string()),
            images: None,
        });

        let (_, body) = get_body(router(relay), "/stats").await;
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["online_users"], 0);
        assert_eq!(value["connections"], 0);
        assert_eq!(value["stored_messages"], 1);
    }

    #[tokio::test]
    async fn test_configured_cors_origin() {
        let relay = Relay::new(RelayConfig {
            cors_origin: Some("http://localhost:3000".to_string()),
            ..RelayConfig::default()
        });
        let response = router(relay)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn test_ws_route_requires_upgrade() {
        let app = router(Relay::new(RelayConfig::default()));
        let (status, _) = get_body(app, "/ws").await;
        assert!(status.is_client_error());
    }
}
