//! Gateway HTTP server: root redirect, `/info`, and the LINE webhook.

use crate::channels::{signature, LineChannel, LineWebhookBody, SIGNATURE_HEADER};
use crate::config::{self, Config, RelaySettings};
use crate::gateway::webhook::Relay;
use crate::llm::OpenAiClient;
use crate::prompts::PromptLog;
use crate::version::{self, VersionClient};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Shared state for the gateway.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Channel secret for `x-line-signature` verification.
    pub channel_secret: Arc<str>,
    pub relay: Relay,
    pub versions: VersionClient,
    pub prompt_log: PromptLog,
}

impl GatewayState {
    /// Build clients from config. Fails when a required credential is missing.
    pub fn from_config(config: Config) -> Result<Self> {
        let settings = config::require_relay_settings(&config)?;
        Ok(Self::with_settings(config, settings))
    }

    fn with_settings(config: Config, settings: RelaySettings) -> Self {
        let prompt_log = PromptLog::new();
        let completer = OpenAiClient::new(config.openai.base_url.clone(), settings.api_key);
        let sender = LineChannel::new(config.line.api_base.clone(), settings.channel_access_token);
        let relay = Relay {
            completer: Arc::new(completer),
            sender: Arc::new(sender),
            model: settings.model,
            max_tokens: config.openai.max_tokens,
            prompt_log: config.app.debug.then(|| prompt_log.clone()),
        };
        let versions = VersionClient::new(config.version.registry_url.clone());
        Self {
            config: Arc::new(config),
            channel_secret: Arc::from(settings.channel_secret),
            relay,
            versions,
            prompt_log,
        }
    }
}

/// Routes: `GET /`, `GET /info`, `POST <webhookPath>`.
pub fn router(state: GatewayState) -> Result<Router> {
    let webhook_path = config::normalized_webhook_path(&state.config);
    let app = if webhook_path == "/" {
        Router::new().route("/", get(root).post(line_webhook))
    } else if webhook_path == "/info" {
        anyhow::bail!("webhook path must not be /info");
    } else {
        Router::new()
            .route("/", get(root))
            .route(&webhook_path, post(line_webhook))
    };
    Ok(app.route("/info", get(info)).with_state(state))
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Requires LINE and OpenAI credentials. Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let webhook_path = config::normalized_webhook_path(&config);
    let debug = config.app.debug;
    let state = GatewayState::from_config(config)?;
    let app = router(state)?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {} (webhook {})", bind_addr, webhook_path);
    if debug {
        log::info!("debug enabled: prompts are printed after each webhook");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
    log::info!("shutdown signal received, draining connections");
}

/// GET / redirects to app.url when set.
async fn root(State(state): State<GatewayState>) -> Response {
    match state.config.app.url.as_deref() {
        Some(url) => (StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response(),
        None => StatusCode::OK.into_response(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub current_version: String,
    pub latest_version: String,
}

/// GET /info — always 200; latestVersion is "unknown" when the lookup fails.
async fn info(State(state): State<GatewayState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        current_version: version::current_version().to_string(),
        latest_version: state.versions.latest_or_unknown().await,
    })
}

/// POST <webhookPath> — verifies the signature over the raw body, then relays every
/// text message. 401 on bad signature, 400 on unparsable body, 500 if any event fails.
async fn line_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if !signature::validate(&body, provided, &state.channel_secret) {
        log::warn!("webhook: rejected request with missing or invalid signature");
        return StatusCode::UNAUTHORIZED;
    }
    let payload: LineWebhookBody = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("webhook: invalid body: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    let delivery = uuid::Uuid::new_v4();
    log::debug!(
        "webhook {}: {} event(s) for {}",
        delivery,
        payload.events.len(),
        payload.destination.as_deref().unwrap_or("unknown destination")
    );
    let status = match state.relay.handle_events(&payload.events).await {
        Ok(answered) => {
            log::info!("webhook {}: answered {} message(s)", delivery, answered);
            StatusCode::OK
        }
        Err(e) => {
            log::error!("webhook {}: {}", delivery, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    if state.config.app.debug {
        let prompt_log = state.prompt_log.clone();
        // Detached: the status is already decided and nothing here can change it.
        // The print may land before or after the response is written.
        tokio::spawn(async move {
            let _ = prompt_log.print().await;
        });
    }
    status
}
