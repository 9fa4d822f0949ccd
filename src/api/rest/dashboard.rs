use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Json;
use axum::Router;
use chrono::Utc;

use crate::error::AppError;
use crate::state::AppState;
use crate::stats::aggregator::DashboardSnapshot;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/dashboard/stats", get(dashboard_stats))
}

async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardSnapshot>, AppError> {
    let snapshot = state.stats.snapshot(Utc::now()).await?;
    Ok(Json(snapshot))
}
