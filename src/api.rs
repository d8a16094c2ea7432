use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Deserialize;
use tokio::{net::TcpListener, sync::watch};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    clients::health::HealthChecker,
    command::NotificationCommand,
    models::{error::NotificationError, health::HealthStatus, response::ApiResponse},
};

pub struct AppState {
    pub health_checker: HealthChecker,
    pub command: Arc<dyn NotificationCommand>,
}

#[derive(Debug, Deserialize)]
pub struct SendTicketQuery {
    #[serde(rename = "orderId")]
    pub order_id: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/api/notif/v1/send-ticket", get(send_ticket))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Error> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow!("Failed to bind {}: {}", addr, e))?;

    info!(address = %addr, "HTTP server started");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            info!("HTTP server shutting down");
        })
        .await
        .map_err(|e| anyhow!("HTTP server failed: {}", e))?;

    Ok(())
}

async fn liveness() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ApiResponse::success((), "alive".to_string())),
    )
}

async fn readiness(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn send_ticket(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SendTicketQuery>,
) -> Response {
    let order_id = match query.order_id.filter(|id| !id.is_empty()) {
        Some(order_id) => order_id,
        None => return NotificationError::bad_request("bad request").into_response(),
    };

    match state.command.send_ticket_email(&order_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(order_id, "ticket sent".to_string())),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}
