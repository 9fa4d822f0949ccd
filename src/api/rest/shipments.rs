use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::Json;
use axum::Router;
use serde::Serialize;
use uuid::Uuid;

use crate::engine::transition::AssignShipment;
use crate::error::AppError;
use crate::models::confirmed::ConfirmedOrder;
use crate::state::AppState;
use crate::storage::degrade_unavailable;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shipments", get(list_shipments))
        .route("/shipments/:id", get(get_shipment))
        .route("/shipments/:id/assign", put(assign_shipment))
        .route("/shipments/:id/advance", put(advance_shipment))
        .route("/shipments/:id/cancel", put(cancel_shipment))
}

#[derive(Serialize)]
struct ShipmentResponse {
    shipment: ConfirmedOrder,
    notified: bool,
}

async fn list_shipments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ConfirmedOrder>>, AppError> {
    let shipments = degrade_unavailable(state.store.confirmed_orders().await)?;
    Ok(Json(shipments))
}

async fn get_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConfirmedOrder>, AppError> {
    let shipment = state
        .store
        .confirmed_order(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("shipment {id} not found")))?;
    Ok(Json(shipment))
}

async fn assign_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignShipment>,
) -> Result<Json<ConfirmedOrder>, AppError> {
    let shipment = state.engine.assign_shipment(id, payload).await?;
    Ok(Json(shipment))
}

async fn advance_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ShipmentResponse>, AppError> {
    let (shipment, notified) = state.engine.advance_shipment(id).await?;
    Ok(Json(ShipmentResponse { shipment, notified }))
}

async fn cancel_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ShipmentResponse>, AppError> {
    let (shipment, notified) = state.engine.cancel_shipment(id).await?;
    Ok(Json(ShipmentResponse { shipment, notified }))
}
