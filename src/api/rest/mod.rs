pub mod dashboard;
pub mod fleet;
pub mod notifications;
pub mod orders;
pub mod requests;
pub mod shipments;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::error::AppError;
use crate::state::AppState;
use crate::storage::degrade_unavailable;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(orders::router())
        .merge(requests::router())
        .merge(shipments::router())
        .merge(fleet::router())
        .merge(notifications::router())
        .merge(dashboard::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    orders: u64,
    requests: u64,
    shipments: u64,
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    let counts = degrade_unavailable(state.store.entity_counts().await)?;
    Ok(Json(HealthResponse {
        status: "ok",
        orders: counts.transport_orders,
        requests: counts.buyer_requests,
        shipments: counts.confirmed_orders,
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
