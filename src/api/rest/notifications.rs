use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::notification::{Audience, Notification};
use crate::state::AppState;
use crate::storage::degrade_unavailable;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/notifications",
            get(list_notifications).delete(clear_notifications),
        )
        .route("/notifications/unread", get(unread_count))
        .route("/notifications/read-all", put(mark_all_read))
        .route("/notifications/:id/read", put(mark_read))
}

#[derive(Deserialize)]
pub struct ScopeQuery {
    pub scope: String,
}

fn parse_scope(raw: &str) -> Result<Audience, AppError> {
    raw.parse::<Audience>().map_err(AppError::Validation)
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let scope = parse_scope(&query.scope)?;
    let feed = degrade_unavailable(state.dispatcher.feed(&scope).await)?;
    Ok(Json(feed))
}

async fn unread_count(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let scope = parse_scope(&query.scope)?;
    let count = degrade_unavailable(state.dispatcher.unread_count(&scope).await)?;
    Ok(Json(json!({ "unread": count })))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let updated = state.dispatcher.mark_read(id).await?;
    if !updated {
        return Err(AppError::NotFound(format!("notification {id} not found")));
    }
    Ok(Json(json!({ "read": true })))
}

async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let scope = parse_scope(&query.scope)?;
    let updated = state.dispatcher.mark_all_read(&scope).await?;
    Ok(Json(json!({ "updated": updated })))
}

async fn clear_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let scope = parse_scope(&query.scope)?;
    let cleared = state.dispatcher.clear(&scope).await?;
    Ok(Json(json!({ "cleared": cleared })))
}
