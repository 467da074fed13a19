use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::text_enum;

text_enum!(
    /// PENDING → IN_PROGRESS → {COMPLETED, FAILED}; a re-parse goes back to IN_PROGRESS.
    ParsingStatus {
        Pending => "PENDING",
        InProgress => "IN_PROGRESS",
        Completed => "COMPLETED",
        Failed => "FAILED",
    }
);

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CvRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub uploaded_by: Option<Uuid>,
    pub original_name: String,
    pub stored_path: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub parsing_status: ParsingStatus,
    pub uploaded_at: DateTime<Utc>,
    pub parsed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CvKeywordRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub cv_id: Uuid,
    pub keyword: String,
    pub normalized: String,
    pub weight: f64,
    pub frequency: i32,
}

/// Insert payload for a freshly uploaded CV.
#[derive(Debug, Clone)]
pub struct NewCv {
    pub tenant_id: Uuid,
    pub uploaded_by: Option<Uuid>,
    pub original_name: String,
    pub stored_path: String,
    pub size_bytes: i64,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCvKeyword {
    pub keyword: String,
    pub normalized: String,
    pub weight: f64,
    pub frequency: i32,
}
