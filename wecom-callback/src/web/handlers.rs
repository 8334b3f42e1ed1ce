//! HTTP endpoint handlers.
//!
//! The handlers only move fields between axum and the [`CallbackHandler`];
//! signature and envelope logic lives in [`crate::crypto`].

use std::sync::Arc;

use axum::{
    extract::{RawQuery, State},
    http::{header, HeaderValue, Method},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::message::MessageHandler;
use crate::web::callback::CallbackHandler;
use crate::web::params::CallbackParams;
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub callback: Arc<CallbackHandler>,
}

impl AppState {
    pub fn new(config: Config, messages: Arc<dyn MessageHandler>) -> Self {
        let callback = CallbackHandler::new(
            config.credentials(),
            config.callback_mode,
            config.ack_format,
            messages,
        );

        Self {
            config: Arc::new(config),
            callback: Arc::new(callback),
        }
    }
}

/// Build the router serving the callback, status and health endpoints.
pub fn router(state: AppState) -> Router {
    let callback_path = state.config.callback_path.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let router = Router::new().route("/health", get(health));

    // The status page gives way when the callback itself is mounted at "/"
    let router = if callback_path == "/" {
        router.route("/", get(verify_url).post(receive_message))
    } else {
        router
            .route("/", get(status_page))
            .route(&callback_path, get(verify_url).post(receive_message))
    };

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Status page describing how to configure the callback in the admin console.
pub async fn status_page(State(state): State<AppState>) -> Html<String> {
    let config = &state.config;

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>WeCom callback server</title></head>
<body>
<h1>WeCom callback server</h1>
<p>Status: running</p>
<ul>
<li>Port: {port}</li>
<li>Callback URL: <code>http://YOUR_PUBLIC_HOST:{port}{path}</code></li>
<li>Mode: {mode}</li>
<li>Token configured: {token_set}</li>
<li>EncodingAESKey configured: {key_set}</li>
</ul>
</body>
</html>"#,
        port = config.port,
        path = config.callback_path,
        mode = state.callback.mode().as_str(),
        token_set = !config.token.is_empty(),
        key_set = !config.encoding_aes_key.is_empty(),
    ))
}

// =============================================================================
// Callback
// =============================================================================

/// URL verification handshake (GET).
pub async fn verify_url(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let params = CallbackParams::from_query(query.as_deref());

    info!(
        has_signature = params.signature.is_some(),
        has_echostr = params.echostr.is_some(),
        "callback_verification_received"
    );

    match state.callback.verify_url(&params) {
        Ok(echo) => (
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )],
            echo,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Message delivery (POST).
pub async fn receive_message(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    body: String,
) -> Response {
    let params = CallbackParams::from_query(query.as_deref());

    info!(
        has_signature = params.signature.is_some(),
        body_length = body.len(),
        "callback_message_received"
    );

    match state.callback.deliver(&params, &body) {
        Ok(delivery) => delivery.into_response(),
        Err(e) => e.into_response(),
    }
}
