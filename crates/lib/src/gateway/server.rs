//! Gateway HTTP server: health probe and the Zalo webhook.

use crate::channels::{parse_event, verify_signature};
use crate::config::{self, Config};
use crate::gateway::ack;
use crate::init;
use crate::pipeline::{AutoResponder, PipelineError, PipelineOutcome};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

/// Header carrying the webhook signature (`mac=<hex>`); Zalo sends it as `X-ZEvent-Signature`.
pub const SIGNATURE_HEADER: &str = "x-zevent-signature";

/// App id and OA secret used to check webhook signatures.
#[derive(Debug, Clone)]
pub struct WebhookSigning {
    pub app_id: String,
    pub secret: String,
}

/// Shared state for the gateway. Cloned per request; all fields are shared handles.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub responder: Arc<AutoResponder>,
    /// When Some, every webhook POST must carry a valid signature.
    pub signing: Option<Arc<WebhookSigning>>,
}

/// Routes: GET / (health) and the webhook path (any method; non-POST gets 405).
pub fn router(state: GatewayState) -> Router {
    let webhook_path = state.config.channels.zalo.webhook_path.clone();
    Router::new()
        .route("/", get(health_http))
        .route(&webhook_path, any(zalo_webhook))
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// When bind is not loopback, webhook signature verification must be configured or startup fails.
/// Blocks until shutdown (e.g. Ctrl+C).
/// Requires the configuration to be initialized (`hapi init`).
pub async fn run_gateway(config: Config, config_path: PathBuf) -> Result<()> {
    init::require_initialized(&config_path)?;
    config::validate(&config)
        .with_context(|| format!("invalid config {}", config_path.display()))?;

    let signing = config::resolve_webhook_signing(&config)
        .map(|(app_id, secret)| Arc::new(WebhookSigning { app_id, secret }));
    let bind = config.gateway.bind.trim().to_string();
    if signing.is_none() {
        if !config::is_loopback_bind(&bind) {
            anyhow::bail!(
                "refusing to bind gateway to {} without webhook verification (set channels.zalo.appId and channels.zalo.oaSecretKey or ZALO_OA_SECRET_KEY)",
                bind
            );
        }
        log::warn!("webhook signature verification disabled");
    }
    if config::resolve_zalo_access_token(&config).is_none() {
        log::warn!("zalo access token not configured; replies will not be delivered");
    }

    let responder = Arc::new(AutoResponder::from_config(&config).await);
    log::info!(
        "auto-responder ready (backend {}, topK {}, threshold {})",
        config.llm.backend.name(),
        config.retrieval.top_k,
        config.retrieval.threshold
    );
    let state = GatewayState {
        config: Arc::new(config.clone()),
        responder,
        signing,
    };
    let app = router(state);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!(
        "gateway listening on {} (webhook {})",
        bind_addr,
        config.channels.zalo.webhook_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// In-flight webhook calls are drained by axum before `serve` returns.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// Webhook entry point. Non-POST → 405 with no processing; POST → always 200 "OK" / "Error Handled".
async fn zalo_webhook(
    State(state): State<GatewayState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").into_response();
    }
    let invocation = uuid::Uuid::new_v4().simple().to_string();
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let work = handle_webhook(state, signature, body, invocation.clone());
    ack::contain(&invocation, work).await.into_response()
}

/// Parse, verify, classify, then hand the event to the pipeline.
async fn handle_webhook(
    state: GatewayState,
    signature: Option<String>,
    body: Bytes,
    invocation: String,
) -> Result<PipelineOutcome, PipelineError> {
    let event = parse_event(&body)?;
    if let Some(signing) = state.signing.as_deref() {
        let provided = signature.as_deref().unwrap_or("");
        let timestamp = event.timestamp_str();
        if !verify_signature(&signing.app_id, &signing.secret, &body, &timestamp, provided) {
            return Err(PipelineError::InvalidSignature);
        }
    }
    let msg_id = event.msg_id.clone().unwrap_or_default();
    let inbound = event.into_inbound()?;
    log::info!(
        "[{}] zalo event: {} (msg {})",
        invocation,
        inbound.event_kind.name(),
        msg_id
    );
    state.responder.handle(&inbound).await
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "backend": state.config.llm.backend.name(),
    }))
}
