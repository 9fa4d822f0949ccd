use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::transition::{ConfirmOutcome, NewTransportOrder};
use crate::error::AppError;
use crate::models::order::TransportOrder;
use crate::state::AppState;
use crate::storage::degrade_unavailable;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", axum::routing::post(submit_order).get(list_orders))
        .route("/orders/:id", get(get_order).delete(withdraw_order))
        .route("/orders/:id/confirm", put(confirm_order))
        .route("/orders/:id/reject", put(reject_order))
}

#[derive(Deserialize)]
pub struct DecisionRequest {
    pub notes: String,
}

#[derive(Serialize)]
struct SubmittedResponse {
    order: TransportOrder,
    notified: bool,
}

#[derive(Serialize)]
struct DecidedResponse {
    order: TransportOrder,
    notified: bool,
}

async fn submit_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewTransportOrder>,
) -> Result<impl IntoResponse, AppError> {
    let (order, notified) = state.engine.submit_order(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmittedResponse { order, notified }),
    ))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TransportOrder>>, AppError> {
    let orders = degrade_unavailable(state.store.transport_orders().await)?;
    Ok(Json(orders))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransportOrder>, AppError> {
    let order = state
        .store
        .transport_order(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
    Ok(Json(order))
}

async fn confirm_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DecisionRequest>,
) -> Result<Json<ConfirmOutcome>, AppError> {
    let outcome = state.engine.confirm_order(id, &payload.notes).await?;
    Ok(Json(outcome))
}

async fn reject_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DecisionRequest>,
) -> Result<Json<DecidedResponse>, AppError> {
    let (order, notified) = state.engine.reject_order(id, &payload.notes).await?;
    Ok(Json(DecidedResponse { order, notified }))
}

async fn withdraw_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.engine.withdraw_order(id).await?;
    Ok(Json(serde_json::json!({ "withdrawn": true })))
}
