use axum::{
    extract::{Query, State},
    Json,
};

use crate::errors::AppError;
use crate::mail::smtp_accounts::SmtpAccountRequest;
use crate::models::smtp::SmtpAccountRow;
use crate::routes::TenantQuery;
use crate::state::AppState;

/// PUT /api/v1/smtp
pub async fn handle_upsert_smtp(
    State(state): State<AppState>,
    Query(q): Query<TenantQuery>,
    Json(req): Json<SmtpAccountRequest>,
) -> Result<Json<SmtpAccountRow>, AppError> {
    let row = state.smtp.upsert(q.tenant_id, req).await?;
    Ok(Json(row))
}

/// GET /api/v1/smtp
pub async fn handle_get_smtp(
    State(state): State<AppState>,
    Query(q): Query<TenantQuery>,
) -> Result<Json<SmtpAccountRow>, AppError> {
    Ok(Json(state.smtp.get(q.tenant_id).await?))
}

/// POST /api/v1/smtp/deactivate
pub async fn handle_deactivate_smtp(
    State(state): State<AppState>,
    Query(q): Query<TenantQuery>,
) -> Result<Json<SmtpAccountRow>, AppError> {
    Ok(Json(state.smtp.deactivate(q.tenant_id).await?))
}
