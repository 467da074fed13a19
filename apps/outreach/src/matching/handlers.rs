use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::matching::MatchResultRow;
use crate::routes::TenantQuery;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct MatchListQuery {
    pub tenant_id: Uuid,
    pub min_score: Option<f64>,
}

/// GET /api/v1/cvs/:id/matches
pub async fn handle_list_matches(
    State(state): State<AppState>,
    Path(cv_id): Path<Uuid>,
    Query(q): Query<MatchListQuery>,
) -> Result<Json<Vec<MatchResultRow>>, AppError> {
    let rows = state.matching.list(cv_id, q.tenant_id, q.min_score).await?;
    Ok(Json(rows))
}

/// POST /api/v1/cvs/:id/matches/compute
pub async fn handle_compute_matches(
    State(state): State<AppState>,
    Path(cv_id): Path<Uuid>,
    Query(q): Query<TenantQuery>,
) -> Result<StatusCode, AppError> {
    state.matching.request_compute(cv_id, q.tenant_id).await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/cvs/:id/matches/recompute
pub async fn handle_recompute_matches(
    State(state): State<AppState>,
    Path(cv_id): Path<Uuid>,
    Query(q): Query<TenantQuery>,
) -> Result<StatusCode, AppError> {
    state.matching.recompute(cv_id, q.tenant_id).await?;
    Ok(StatusCode::ACCEPTED)
}
