use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::party::{Buyer, Driver, Supplier, Vehicle};
use crate::state::AppState;
use crate::storage::degrade_unavailable;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/suppliers", post(create_supplier).get(list_suppliers))
        .route("/buyers", post(create_buyer).get(list_buyers))
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id", delete(delete_driver))
        .route("/vehicles", post(create_vehicle).get(list_vehicles))
        .route("/vehicles/:id", delete(delete_vehicle))
}

#[derive(Deserialize)]
pub struct CreatePartyRequest {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub supplier_id: Uuid,
    pub name: String,
    pub licence_number: String,
}

#[derive(Deserialize)]
pub struct CreateVehicleRequest {
    pub supplier_id: Uuid,
    pub registration_number: String,
    pub body_type: String,
}

async fn create_supplier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreatePartyRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }

    let supplier = Supplier {
        id: Uuid::new_v4(),
        name: payload.name,
        phone: payload.phone,
        created_at: Utc::now(),
    };
    state.store.insert_supplier(&supplier).await?;
    Ok((StatusCode::CREATED, Json(supplier)))
}

async fn list_suppliers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Supplier>>, AppError> {
    Ok(Json(degrade_unavailable(state.store.suppliers().await)?))
}

async fn create_buyer(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreatePartyRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }

    let buyer = Buyer {
        id: Uuid::new_v4(),
        name: payload.name,
        phone: payload.phone,
        created_at: Utc::now(),
    };
    state.store.insert_buyer(&buyer).await?;
    Ok((StatusCode::CREATED, Json(buyer)))
}

async fn list_buyers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Buyer>>, AppError> {
    Ok(Json(degrade_unavailable(state.store.buyers().await)?))
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }

    state
        .store
        .supplier(payload.supplier_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("supplier {} not found", payload.supplier_id))
        })?;

    let driver = Driver {
        id: Uuid::new_v4(),
        supplier_id: payload.supplier_id,
        name: payload.name,
        licence_number: payload.licence_number,
        created_at: Utc::now(),
    };
    state.store.insert_driver(&driver).await?;
    Ok((StatusCode::CREATED, Json(driver)))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Driver>>, AppError> {
    Ok(Json(degrade_unavailable(state.store.drivers().await)?))
}

async fn delete_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.engine.delete_driver(id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn create_vehicle(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateVehicleRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.registration_number.trim().is_empty() {
        return Err(AppError::Validation(
            "registration number cannot be empty".to_string(),
        ));
    }

    state
        .store
        .supplier(payload.supplier_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("supplier {} not found", payload.supplier_id))
        })?;

    let vehicle = Vehicle {
        id: Uuid::new_v4(),
        supplier_id: payload.supplier_id,
        registration_number: payload.registration_number,
        body_type: payload.body_type,
        created_at: Utc::now(),
    };
    state.store.insert_vehicle(&vehicle).await?;
    Ok((StatusCode::CREATED, Json(vehicle)))
}

async fn list_vehicles(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Vehicle>>, AppError> {
    Ok(Json(degrade_unavailable(state.store.vehicles().await)?))
}

async fn delete_vehicle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.engine.delete_vehicle(id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
