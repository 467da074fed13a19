use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::campaign::service::CreateCampaignRequest;
use crate::errors::AppError;
use crate::models::campaign::{CampaignRow, EmailLogRow};
use crate::routes::TenantQuery;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ScheduleRequest {
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct UpdateLogRequest {
    pub body: String,
}

/// POST /api/v1/campaigns
pub async fn handle_create_campaign(
    State(state): State<AppState>,
    Query(q): Query<TenantQuery>,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<CampaignRow>), AppError> {
    let campaign = state.campaigns.create(q.tenant_id, req).await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

/// GET /api/v1/campaigns
pub async fn handle_list_campaigns(
    State(state): State<AppState>,
    Query(q): Query<TenantQuery>,
) -> Result<Json<Vec<CampaignRow>>, AppError> {
    Ok(Json(state.campaigns.list(q.tenant_id).await?))
}

/// GET /api/v1/campaigns/:id
pub async fn handle_get_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<TenantQuery>,
) -> Result<Json<CampaignRow>, AppError> {
    Ok(Json(state.campaigns.get(id, q.tenant_id).await?))
}

/// GET /api/v1/campaigns/:id/logs
pub async fn handle_campaign_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<TenantQuery>,
) -> Result<Json<Vec<EmailLogRow>>, AppError> {
    Ok(Json(state.campaigns.logs(id, q.tenant_id).await?))
}

/// POST /api/v1/campaigns/:id/schedule
pub async fn handle_schedule_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<TenantQuery>,
    Json(req): Json<ScheduleRequest>,
) -> Result<Json<CampaignRow>, AppError> {
    let campaign = state
        .campaigns
        .schedule(id, q.tenant_id, req.scheduled_at)
        .await?;
    Ok(Json(campaign))
}

/// POST /api/v1/campaigns/:id/execute
/// Accepted: the run continues in the background.
pub async fn handle_execute_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<TenantQuery>,
) -> Result<(StatusCode, Json<CampaignRow>), AppError> {
    let campaign = state.campaigns.request_execute(id, q.tenant_id).await?;
    Ok((StatusCode::ACCEPTED, Json(campaign)))
}

/// POST /api/v1/campaigns/:id/cancel
pub async fn handle_cancel_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<TenantQuery>,
) -> Result<Json<CampaignRow>, AppError> {
    Ok(Json(state.campaigns.cancel(id, q.tenant_id).await?))
}

/// DELETE /api/v1/campaigns/:id
pub async fn handle_delete_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<TenantQuery>,
) -> Result<StatusCode, AppError> {
    state.campaigns.delete(id, q.tenant_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/logs/:id
pub async fn handle_get_log(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<TenantQuery>,
) -> Result<Json<EmailLogRow>, AppError> {
    Ok(Json(state.campaigns.log(id, q.tenant_id).await?))
}

/// PUT /api/v1/logs/:id
pub async fn handle_update_log(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<TenantQuery>,
    Json(req): Json<UpdateLogRequest>,
) -> Result<Json<EmailLogRow>, AppError> {
    let log = state
        .campaigns
        .update_log_body(id, q.tenant_id, &req.body)
        .await?;
    Ok(Json(log))
}

/// POST /api/v1/logs/:id/regenerate
pub async fn handle_regenerate_log(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<TenantQuery>,
) -> Result<Json<EmailLogRow>, AppError> {
    Ok(Json(state.campaigns.regenerate_log(id, q.tenant_id).await?))
}

/// POST /api/v1/logs/:id/send
pub async fn handle_send_log(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<TenantQuery>,
) -> Result<Json<EmailLogRow>, AppError> {
    Ok(Json(state.campaigns.send_log(id, q.tenant_id).await?))
}
