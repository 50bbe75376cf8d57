//! HTTP messaging endpoint for RetrievalBot.
//!
//! The chat channel POSTs one activity per event to `/api/messages` and gets
//! the bot's replies back in the response body.

pub mod activity;

use activity::{Activity, ActivityBatch};
use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use retrievalbot_agent::{AgentError, TurnHandler};
use retrievalbot_config::AppConfig;
use retrievalbot_core::channel::OutboundMessage;
use retrievalbot_core::error::ChannelError;
use retrievalbot_core::event::EventBus;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub handler: Arc<TurnHandler>,
    /// Cancelled on shutdown; every in-flight turn gets a child token
    pub shutdown: CancellationToken,
}

type SharedState = Arc<GatewayState>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Agent setup failed: {0}")]
    Agent(#[from] AgentError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Channel(_) => StatusCode::BAD_REQUEST,
            Self::Agent(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/messages", post(messages_handler))
        .layer(DefaultBodyLimit::max(256 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server and run until Ctrl+C.
pub async fn start(config: AppConfig) -> Result<(), GatewayError> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let event_bus = Arc::new(EventBus::default());
    spawn_event_logger(&event_bus);

    let handler = Arc::new(TurnHandler::from_config(config, event_bus)?);
    let shutdown = CancellationToken::new();
    let state = Arc::new(GatewayState {
        handler,
        shutdown: shutdown.clone(),
    });

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Could not listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
            info!("Shutting down, cancelling in-flight turns");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

/// Log every domain event at debug level.
pub fn spawn_event_logger(event_bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => debug!(event = ?event, "Domain event"),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn messages_handler(
    State(state): State<SharedState>,
    Json(activity): Json<Activity>,
) -> Result<Json<ActivityBatch>, GatewayError> {
    let Some(turn) = activity.to_turn()? else {
        debug!(kind = %activity.kind, "Ignoring activity");
        return Ok(Json(ActivityBatch::default()));
    };

    info!(
        kind = %activity.kind,
        conversation_id = %turn.conversation_id(),
        "Activity received"
    );

    // The turn runs on its own task so a dropped connection cannot leave a
    // transcript half-written.
    let handler = state.handler.clone();
    let cancel = state.shutdown.child_token();
    let outbound = match tokio::spawn(async move { handler.handle(turn, &cancel).await }).await {
        Ok(outbound) => outbound,
        Err(e) => {
            error!(error = %e, "Turn task failed");
            vec![OutboundMessage::text(retrievalbot_agent::APOLOGY)]
        }
    };

    let activities = outbound.into_iter().map(|m| activity.reply(m)).collect();
    Ok(Json(ActivityBatch { activities }))
}
