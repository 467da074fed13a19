use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::cv::service::CvUpload;
use crate::errors::AppError;
use crate::models::cv::{CvKeywordRow, CvRow};
use crate::routes::TenantQuery;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UploadQuery {
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
}

/// POST /api/v1/cvs
/// Multipart form with a single `file` field. Parsing continues in the background.
pub async fn handle_upload_cv(
    State(state): State<AppState>,
    Query(q): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<CvRow>), AppError> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field.file_name().unwrap_or("cv").to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Could not read upload: {e}")))?;
        upload = Some(CvUpload {
            tenant_id: q.tenant_id,
            uploaded_by: q.user_id,
            original_name,
            mime_type,
            bytes: bytes.to_vec(),
        });
    }

    let upload =
        upload.ok_or_else(|| AppError::Validation("Missing 'file' field".to_string()))?;
    let cv = state.cvs.upload(upload).await?;
    Ok((StatusCode::CREATED, Json(cv)))
}

/// GET /api/v1/cvs
pub async fn handle_list_cvs(
    State(state): State<AppState>,
    Query(q): Query<TenantQuery>,
) -> Result<Json<Vec<CvRow>>, AppError> {
    Ok(Json(state.cvs.list(q.tenant_id).await?))
}

/// GET /api/v1/cvs/:id
pub async fn handle_get_cv(
    State(state): State<AppState>,
    Path(cv_id): Path<Uuid>,
    Query(q): Query<TenantQuery>,
) -> Result<Json<CvRow>, AppError> {
    Ok(Json(state.cvs.get(cv_id, q.tenant_id).await?))
}

/// GET /api/v1/cvs/:id/keywords
pub async fn handle_cv_keywords(
    State(state): State<AppState>,
    Path(cv_id): Path<Uuid>,
    Query(q): Query<TenantQuery>,
) -> Result<Json<Vec<CvKeywordRow>>, AppError> {
    Ok(Json(state.cvs.keywords(cv_id, q.tenant_id).await?))
}

/// POST /api/v1/cvs/:id/parse
pub async fn handle_parse_cv(
    State(state): State<AppState>,
    Path(cv_id): Path<Uuid>,
    Query(q): Query<TenantQuery>,
) -> Result<StatusCode, AppError> {
    state.cvs.request_parse(cv_id, q.tenant_id).await?;
    Ok(StatusCode::ACCEPTED)
}

/// DELETE /api/v1/cvs/:id
pub async fn handle_delete_cv(
    State(state): State<AppState>,
    Path(cv_id): Path<Uuid>,
    Query(q): Query<TenantQuery>,
) -> Result<StatusCode, AppError> {
    state.cvs.delete(cv_id, q.tenant_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
