//! HTTP server implementation using Axum.

use axum::{
    Router,
    routing::{get, post},
};
use referbot_core::traits::MessageTransport;
use referbot_core::{Clock, ReferBotConfig};
use referbot_db::ReferralDb;
use referbot_scheduler::FollowupEngine;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub config: ReferBotConfig,
    pub db: Arc<ReferralDb>,
    /// Outbound Messenger sends (fallback link, apologies, rewards).
    pub transport: Arc<dyn MessageTransport>,
    /// Follow-up engine; `None` when no template sheet is configured.
    pub engine: Option<Arc<FollowupEngine>>,
    pub clock: Arc<dyn Clock>,
    /// Reported as uptime by `/health`.
    pub start_time: std::time::Instant,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    build_router_from_arc(Arc::new(state))
}

pub fn build_router_from_arc(shared: Arc<AppState>) -> Router {
    Router::new()
        // Messenger webhook, GET for the subscription handshake
        .route(
            "/webhook",
            get(super::routes::webhook_verify).post(super::routes::webhook_event),
        )
        .route("/api/referrals", get(super::routes::list_referrals))
        .route("/api/send-reward", post(super::routes::send_reward))
        .route("/health", get(super::routes::health_check))
        .layer(
            CorsLayer::new()
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers(Any)
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server and run until `shutdown` resolves.
pub async fn start(
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.gateway.host, state.config.gateway.port);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Gateway server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
