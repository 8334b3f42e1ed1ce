//! WeCom callback server.
//!
//! This binary provides a small web server that:
//! - Answers the URL verification challenge (GET)
//! - Verifies, decrypts and dispatches delivered messages (POST)
//! - Serves a status page and a health check
//!
//! Secrets come from the environment and are never logged.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wecom_callback::crypto::AesKey;
use wecom_callback::web::{router, AppState};
use wecom_callback::{Config, LoggingMessageHandler, VerificationMode};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("callback_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        callback_path = %config.callback_path,
        callback_mode = config.callback_mode.as_str(),
        token_configured = !config.token.is_empty(),
        encoding_key_configured = !config.encoding_aes_key.is_empty(),
        corp_id_configured = !config.corp_id.is_empty(),
        "config_loaded"
    );

    if config.token.is_empty() {
        warn!("WECOM_TOKEN is empty; every signature check will fail");
    }

    if config.callback_mode == VerificationMode::Encrypted {
        if let Err(e) = AesKey::from_encoding_key(&config.encoding_aes_key) {
            warn!(error = %e, "encoding_key_invalid");
        }
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::new(config, Arc::new(LoggingMessageHandler));
    let app = router(state);

    // Bind to address
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "callback_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("callback_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("callback_server_shutting_down");
}
