use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::Serialize;
use uuid::Uuid;

use crate::api::rest::orders::DecisionRequest;
use crate::engine::transition::{NewBuyerRequest, RequestConfirmOutcome};
use crate::error::AppError;
use crate::models::request::BuyerRequest;
use crate::state::AppState;
use crate::storage::degrade_unavailable;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/requests", post(create_request).get(list_requests))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/submit", put(submit_request))
        .route("/requests/:id/confirm", put(confirm_request))
        .route("/requests/:id/reject", put(reject_request))
}

#[derive(Serialize)]
struct RequestResponse {
    request: BuyerRequest,
    notified: bool,
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewBuyerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let request = state.engine.create_request(payload).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn list_requests(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BuyerRequest>>, AppError> {
    let requests = degrade_unavailable(state.store.buyer_requests().await)?;
    Ok(Json(requests))
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BuyerRequest>, AppError> {
    let request = state
        .store
        .buyer_request(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?;
    Ok(Json(request))
}

async fn submit_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RequestResponse>, AppError> {
    let (request, notified) = state.engine.submit_request(id).await?;
    Ok(Json(RequestResponse { request, notified }))
}

async fn confirm_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DecisionRequest>,
) -> Result<Json<RequestConfirmOutcome>, AppError> {
    let outcome = state.engine.confirm_request(id, &payload.notes).await?;
    Ok(Json(outcome))
}

async fn reject_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DecisionRequest>,
) -> Result<Json<RequestResponse>, AppError> {
    let (request, notified) = state.engine.reject_request(id, &payload.notes).await?;
    Ok(Json(RequestResponse { request, notified }))
}
