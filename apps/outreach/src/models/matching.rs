use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MatchResultRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub cv_id: Uuid,
    pub professor_id: Uuid,
    pub score: f64,
    pub matched_keywords: String,
    pub total_cv_keywords: i32,
    pub total_professor_keywords: i32,
    pub total_matched_keywords: i32,
    pub computed_at: DateTime<Utc>,
}

/// One scored (cv, professor) pair ready to be upserted.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMatch {
    pub professor_id: Uuid,
    pub score: f64,
    pub matched_keywords: String,
    pub total_cv_keywords: i32,
    pub total_professor_keywords: i32,
    pub total_matched_keywords: i32,
}
