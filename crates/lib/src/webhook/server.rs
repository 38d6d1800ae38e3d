//! Webhook HTTP server: `GET /` liveness and `POST /webhook` for LINE events.

use crate::channels::LineChannel;
use crate::config::{self, Config};
use crate::releases::DigestClient;
use crate::store::{DialogueStore, PoolOptions};
use crate::webhook::dispatcher::Dispatcher;
use crate::webhook::envelope::first_text_event;
use crate::webhook::signature::{self, SIGNATURE_HEADER};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use chrono::{FixedOffset, Offset, Utc};
use std::path::PathBuf;
use std::sync::Arc;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct WebhookState {
    /// Channel secret for signature verification.
    pub channel_secret: Arc<str>,
    pub dispatcher: Arc<Dispatcher>,
}

/// Routes served by the relay.
pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/webhook", post(webhook))
        .with_state(state)
}

/// UTC offset from config; out-of-range values fall back to UTC.
fn utc_offset(config: &Config) -> FixedOffset {
    let minutes = config.timestamp.utc_offset_minutes;
    FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| {
        log::warn!("timestamp.utcOffsetMinutes {} out of range, using UTC", minutes);
        Utc.fix()
    })
}

/// Build the store, reply client, digest client, and dispatcher from config.
pub fn build_state(config: &Config, config_path: &std::path::Path) -> Result<WebhookState> {
    let channel_secret = config::resolve_channel_secret(config).context(
        "channel secret not configured (set LINE_CHANNEL_SECRET or line.channelSecret)",
    )?;
    let access_token = config::resolve_channel_access_token(config);
    if access_token.is_none() {
        log::warn!("channel access token not configured; replies will fail");
    }

    let db_path = config::resolve_database_path(config, config_path);
    let store = DialogueStore::open(&db_path, PoolOptions::from(&config.database))
        .with_context(|| format!("opening dialogue database {}", db_path.display()))?;
    let line = LineChannel::new(&config.line, access_token).context("building reply client")?;
    let digests = DigestClient::new(&config.digest, &config.triggers.digest_command)
        .context("building digest client")?;

    let talking = config::resolve_default_talking(config);
    log::info!("talking enabled at start: {}", talking);
    let dispatcher = Dispatcher::new(
        Arc::new(store),
        Arc::new(line),
        Arc::new(digests),
        talking,
        config.triggers.clone(),
        utc_offset(config),
    );
    Ok(WebhookState {
        channel_secret: Arc::from(channel_secret.as_str()),
        dispatcher: Arc::new(dispatcher),
    })
}

/// Run the relay until SIGINT/SIGTERM.
pub async fn run_server(config: Config, config_path: PathBuf) -> Result<()> {
    let state = build_state(&config, &config_path)?;
    let app = router(state);

    let bind_addr = format!("{}:{}", config.server.bind.trim(), config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("webhook listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("webhook server exited")?;
    log::info!("webhook server stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining requests");
}

/// GET / liveness probe.
async fn home() -> &'static str {
    "Hello, World!"
}

/// POST /webhook: verify the signature, then answer 200 so the platform does not redeliver.
async fn webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if let Err(e) = signature::verify(state.channel_secret.as_bytes(), &body, provided) {
        log::warn!("webhook: rejected request: {}", e);
        return (StatusCode::BAD_REQUEST, "invalid signature");
    }
    log::debug!("webhook: request body: {}", String::from_utf8_lossy(&body));

    match first_text_event(&body) {
        Ok(Some(event)) => {
            let report = state.dispatcher.dispatch(event).await;
            log::debug!(
                "webhook: stored={:?} trigger={:?} delivered={}",
                report.stored,
                report.trigger,
                report.delivered
            );
        }
        Ok(None) => log::debug!("webhook: no text message in first event"),
        Err(e) => log::warn!("webhook: malformed payload: {}", e),
    }
    (StatusCode::OK, "OK")
}
