use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::text_enum;

text_enum!(CampaignStatus {
    Draft => "DRAFT",
    Scheduled => "SCHEDULED",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
    Failed => "FAILED",
    Cancelled => "CANCELLED",
});

text_enum!(LogStatus {
    Pending => "PENDING",
    Sending => "SENDING",
    Sent => "SENT",
    Failed => "FAILED",
    Blacklisted => "BLACKLISTED",
});

text_enum!(
    /// Where the current body of a log came from.
    BodyOrigin {
        Template => "TEMPLATE",
        Ai => "AI",
        Manual => "MANUAL",
    }
);

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CampaignRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub cv_id: Uuid,
    pub smtp_account_id: Option<Uuid>,
    pub name: String,
    pub subject: String,
    pub body_template: String,
    pub min_match_score: f64,
    pub status: CampaignStatus,
    pub total_recipients: i32,
    pub sent_count: i32,
    pub failed_count: i32,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub tenant_id: Uuid,
    pub cv_id: Uuid,
    pub smtp_account_id: Option<Uuid>,
    pub name: String,
    pub subject: String,
    pub body_template: String,
    pub min_match_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmailLogRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub campaign_id: Uuid,
    pub professor_id: Uuid,
    pub match_result_id: Option<Uuid>,
    pub seq: i64,
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
    pub alternate_bodies: Option<String>,
    pub body_origin: BodyOrigin,
    pub status: LogStatus,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEmailLog {
    pub professor_id: Uuid,
    pub match_result_id: Option<Uuid>,
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
    pub body_origin: BodyOrigin,
}
