//! Persistence seam for the outreach pipeline.
//!
//! Services only talk to `Arc<dyn Store>`. `PgStore` backs production; the
//! in-memory store drives the pipeline tests. Every method that touches more
//! than one row runs as a single unit: either all of it is visible or none.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::campaign::{
    BodyOrigin, CampaignRow, CampaignStatus, EmailLogRow, LogStatus, NewCampaign, NewEmailLog,
};
use crate::models::cv::{CvKeywordRow, CvRow, NewCv, NewCvKeyword, ParsingStatus};
use crate::models::matching::{MatchResultRow, ScoredMatch};
use crate::models::professor::{ProfessorKeywordRow, ProfessorRow};
use crate::models::smtp::{NewSmtpAccount, SmtpAccountRow, SmtpStatus};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, sqlx::Error>;

#[async_trait]
pub trait Store: Send + Sync {
    // ── CVs ────────────────────────────────────────────────────────────────

    async fn insert_cv(&self, cv: NewCv) -> StoreResult<CvRow>;

    async fn get_cv(&self, cv_id: Uuid, tenant_id: Uuid) -> StoreResult<Option<CvRow>>;

    async fn list_cvs(&self, tenant_id: Uuid) -> StoreResult<Vec<CvRow>>;

    /// `parsed_at` must be `Some` exactly when `status` is COMPLETED.
    async fn set_cv_status(
        &self,
        cv_id: Uuid,
        status: ParsingStatus,
        parsed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    /// Any status but IN_PROGRESS → IN_PROGRESS, clearing `parsed_at`. False
    /// if a parse already holds the CV or it does not exist for this tenant.
    async fn try_begin_parse(&self, cv_id: Uuid, tenant_id: Uuid) -> StoreResult<bool>;

    /// Deletes every keyword of the CV and inserts `keywords` in order.
    async fn replace_cv_keywords(
        &self,
        cv_id: Uuid,
        tenant_id: Uuid,
        keywords: &[NewCvKeyword],
    ) -> StoreResult<()>;

    /// Keywords in the order they were inserted.
    async fn list_cv_keywords(&self, cv_id: Uuid) -> StoreResult<Vec<CvKeywordRow>>;

    /// Removes the CV with its keywords, matches, campaigns and logs.
    /// Returns false if the CV did not exist for this tenant.
    async fn delete_cv(&self, cv_id: Uuid, tenant_id: Uuid) -> StoreResult<bool>;

    // ── Professors (global catalog) ────────────────────────────────────────

    async fn list_active_professors(&self) -> StoreResult<Vec<ProfessorRow>>;

    async fn get_professor(&self, professor_id: Uuid) -> StoreResult<Option<ProfessorRow>>;

    async fn list_professor_keywords(
        &self,
        professor_ids: &[Uuid],
    ) -> StoreResult<Vec<ProfessorKeywordRow>>;

    // ── Match results ──────────────────────────────────────────────────────

    /// Insert-or-update on (cv, professor).
    async fn upsert_matches(
        &self,
        tenant_id: Uuid,
        cv_id: Uuid,
        matches: &[ScoredMatch],
        computed_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn delete_matches(&self, cv_id: Uuid) -> StoreResult<u64>;

    /// Matches with `score >= min_score`, best first (ties by professor id).
    async fn list_matches(
        &self,
        cv_id: Uuid,
        min_score: f64,
        limit: Option<i64>,
    ) -> StoreResult<Vec<MatchResultRow>>;

    async fn count_matches(&self, cv_id: Uuid, min_score: f64) -> StoreResult<i64>;

    async fn get_matches_by_ids(
        &self,
        tenant_id: Uuid,
        match_ids: &[Uuid],
    ) -> StoreResult<Vec<MatchResultRow>>;

    async fn get_match(&self, match_id: Uuid) -> StoreResult<Option<MatchResultRow>>;

    // ── Blacklist ──────────────────────────────────────────────────────────

    /// Case-sensitive on `email`; a row with no tenant applies to everyone.
    async fn is_blacklisted(&self, tenant_id: Uuid, email: &str) -> StoreResult<bool>;

    // ── SMTP accounts ──────────────────────────────────────────────────────

    /// Creates or updates the tenant's single account and marks it ACTIVE.
    async fn upsert_smtp_account(&self, account: NewSmtpAccount) -> StoreResult<SmtpAccountRow>;

    async fn get_smtp_account(&self, tenant_id: Uuid) -> StoreResult<Option<SmtpAccountRow>>;

    async fn set_smtp_status(
        &self,
        tenant_id: Uuid,
        status: SmtpStatus,
    ) -> StoreResult<Option<SmtpAccountRow>>;

    // ── Campaigns ──────────────────────────────────────────────────────────

    /// Inserts a DRAFT campaign together with its PENDING logs, with
    /// `total_recipients` set to the number of logs. Nothing is stored if
    /// any part fails.
    async fn create_campaign_with_logs(
        &self,
        campaign: NewCampaign,
        logs: &[NewEmailLog],
    ) -> StoreResult<(CampaignRow, Vec<Uuid>)>;

    async fn get_campaign(
        &self,
        campaign_id: Uuid,
        tenant_id: Uuid,
    ) -> StoreResult<Option<CampaignRow>>;

    async fn list_campaigns(&self, tenant_id: Uuid) -> StoreResult<Vec<CampaignRow>>;

    async fn list_campaigns_for_cv(&self, cv_id: Uuid) -> StoreResult<Vec<CampaignRow>>;

    /// DRAFT|SCHEDULED → IN_PROGRESS with `started_at`. True only for the
    /// caller whose update hit the row.
    async fn claim_campaign(
        &self,
        campaign_id: Uuid,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// DRAFT → SCHEDULED with `scheduled_at`.
    async fn schedule_campaign(
        &self,
        campaign_id: Uuid,
        tenant_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// SCHEDULED → CANCELLED.
    async fn cancel_campaign(&self, campaign_id: Uuid, tenant_id: Uuid) -> StoreResult<bool>;

    /// IN_PROGRESS → `status` (COMPLETED or FAILED) with `completed_at`,
    /// recounting the counters from the logs in the same update.
    async fn finish_campaign(
        &self,
        campaign_id: Uuid,
        status: CampaignStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// `sent_count` = SENT logs, `failed_count` = FAILED and BLACKLISTED logs.
    async fn refresh_campaign_counters(&self, campaign_id: Uuid) -> StoreResult<()>;

    /// SCHEDULED campaigns whose `scheduled_at` has passed.
    async fn due_campaigns(&self, now: DateTime<Utc>) -> StoreResult<Vec<CampaignRow>>;

    /// Deletes the campaign and its logs unless it is IN_PROGRESS.
    async fn delete_campaign(&self, campaign_id: Uuid, tenant_id: Uuid) -> StoreResult<bool>;

    // ── Email logs ─────────────────────────────────────────────────────────

    /// Inserts all logs in one unit, skipping professors that already have a
    /// log in this campaign, and resets `total_recipients` to the campaign's
    /// log count. Returns the new ids in insertion order.
    async fn insert_logs(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
        logs: &[NewEmailLog],
    ) -> StoreResult<Vec<Uuid>>;

    async fn campaign_professor_ids(&self, campaign_id: Uuid) -> StoreResult<HashSet<Uuid>>;

    /// Logs in insertion order.
    async fn list_logs(&self, campaign_id: Uuid, tenant_id: Uuid) -> StoreResult<Vec<EmailLogRow>>;

    async fn get_log(&self, log_id: Uuid, tenant_id: Uuid) -> StoreResult<Option<EmailLogRow>>;

    async fn count_logs(&self, campaign_id: Uuid) -> StoreResult<i64>;

    /// Replaces the body of a PENDING or FAILED log. False if the log has
    /// moved on (sending, sent, blacklisted).
    async fn update_log_body(
        &self,
        log_id: Uuid,
        body: &str,
        alternate_bodies: Option<&str>,
        origin: BodyOrigin,
    ) -> StoreResult<bool>;

    /// PENDING|FAILED → SENDING, returning the row as claimed. `None` if
    /// another sender got there first.
    async fn mark_log_sending(&self, log_id: Uuid) -> StoreResult<Option<EmailLogRow>>;

    async fn mark_log_sent(
        &self,
        log_id: Uuid,
        retry_count: i32,
        sent_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Terminal failure: `status` is FAILED or BLACKLISTED.
    async fn mark_log_failed(
        &self,
        log_id: Uuid,
        status: LogStatus,
        error_message: &str,
        retry_count: i32,
    ) -> StoreResult<()>;
}
