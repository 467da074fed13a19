use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::models::campaign::{
    BodyOrigin, CampaignRow, CampaignStatus, EmailLogRow, LogStatus, NewCampaign, NewEmailLog,
};
use crate::models::cv::{CvKeywordRow, CvRow, NewCv, NewCvKeyword, ParsingStatus};
use crate::models::matching::{MatchResultRow, ScoredMatch};
use crate::models::professor::{ProfessorKeywordRow, ProfessorRow};
use crate::models::smtp::{NewSmtpAccount, SmtpAccountRow, SmtpStatus};
use crate::store::{Store, StoreResult};

const CV_COLUMNS: &str = "id, tenant_id, uploaded_by, original_name, stored_path, size_bytes, \
                          mime_type, parsing_status, uploaded_at, parsed_at";

const PROFESSOR_SELECT: &str = r#"
    SELECT p.id, u.name AS university, p.email, p.first_name, p.last_name,
           p.department, p.research_area, p.publications, p.status
    FROM professors p
    LEFT JOIN universities u ON u.id = p.university_id
"#;

const MATCH_COLUMNS: &str = "id, tenant_id, cv_id, professor_id, score, matched_keywords, \
                             total_cv_keywords, total_professor_keywords, total_matched_keywords, \
                             computed_at";

const SMTP_COLUMNS: &str = "id, tenant_id, email, host, port, username, encrypted_password, \
                            use_tls, use_ssl, from_name, status, created_at, updated_at";

const CAMPAIGN_COLUMNS: &str = "id, tenant_id, cv_id, smtp_account_id, name, subject, \
                                body_template, min_match_score, status, total_recipients, \
                                sent_count, failed_count, scheduled_at, started_at, \
                                completed_at, created_at";

const LOG_COLUMNS: &str = "id, tenant_id, campaign_id, professor_id, match_result_id, seq, \
                           recipient_email, subject, body, alternate_bodies, body_origin, status, \
                           error_message, retry_count, sent_at, created_at";

const COUNTER_ASSIGNMENTS: &str = r#"
    sent_count = (SELECT COUNT(*) FROM email_logs l
                  WHERE l.campaign_id = email_campaigns.id AND l.status = 'SENT'),
    failed_count = (SELECT COUNT(*) FROM email_logs l
                    WHERE l.campaign_id = email_campaigns.id AND l.status IN ('FAILED', 'BLACKLISTED'))
"#;

/// PostgreSQL-backed store. Runtime-checked queries; multi-row operations
/// run inside one transaction each.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    // ── CVs ────────────────────────────────────────────────────────────────

    async fn insert_cv(&self, cv: NewCv) -> StoreResult<CvRow> {
        sqlx::query_as::<_, CvRow>(&format!(
            r#"
            INSERT INTO cvs (tenant_id, uploaded_by, original_name, stored_path, size_bytes, mime_type, parsing_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {CV_COLUMNS}
            "#
        ))
        .bind(cv.tenant_id)
        .bind(cv.uploaded_by)
        .bind(&cv.original_name)
        .bind(&cv.stored_path)
        .bind(cv.size_bytes)
        .bind(&cv.mime_type)
        .bind(ParsingStatus::Pending)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_cv(&self, cv_id: Uuid, tenant_id: Uuid) -> StoreResult<Option<CvRow>> {
        sqlx::query_as::<_, CvRow>(&format!(
            "SELECT {CV_COLUMNS} FROM cvs WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(cv_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_cvs(&self, tenant_id: Uuid) -> StoreResult<Vec<CvRow>> {
        sqlx::query_as::<_, CvRow>(&format!(
            "SELECT {CV_COLUMNS} FROM cvs WHERE tenant_id = $1 ORDER BY uploaded_at DESC"
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn set_cv_status(
        &self,
        cv_id: Uuid,
        status: ParsingStatus,
        parsed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE cvs SET parsing_status = $2, parsed_at = $3 WHERE id = $1")
            .bind(cv_id)
            .bind(status)
            .bind(parsed_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn try_begin_parse(&self, cv_id: Uuid, tenant_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE cvs SET parsing_status = 'IN_PROGRESS', parsed_at = NULL
            WHERE id = $1 AND tenant_id = $2 AND parsing_status <> 'IN_PROGRESS'
            "#,
        )
        .bind(cv_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn replace_cv_keywords(
        &self,
        cv_id: Uuid,
        tenant_id: Uuid,
        keywords: &[NewCvKeyword],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cv_keywords WHERE cv_id = $1")
            .bind(cv_id)
            .execute(&mut *tx)
            .await?;

        for (position, kw) in keywords.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO cv_keywords (tenant_id, cv_id, keyword, normalized, weight, frequency, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(tenant_id)
            .bind(cv_id)
            .bind(&kw.keyword)
            .bind(&kw.normalized)
            .bind(kw.weight)
            .bind(kw.frequency)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Replaced keywords for CV {cv_id}: {} rows", keywords.len());
        Ok(())
    }

    async fn list_cv_keywords(&self, cv_id: Uuid) -> StoreResult<Vec<CvKeywordRow>> {
        sqlx::query_as::<_, CvKeywordRow>(
            r#"
            SELECT id, tenant_id, cv_id, keyword, normalized, weight, frequency
            FROM cv_keywords
            WHERE cv_id = $1
            ORDER BY position
            "#,
        )
        .bind(cv_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn delete_cv(&self, cv_id: Uuid, tenant_id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM cvs WHERE id = $1 AND tenant_id = $2 FOR UPDATE")
                .bind(cv_id)
                .bind(tenant_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Ok(false);
        }

        sqlx::query(
            "DELETE FROM email_logs WHERE campaign_id IN (SELECT id FROM email_campaigns WHERE cv_id = $1)",
        )
        .bind(cv_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM email_campaigns WHERE cv_id = $1")
            .bind(cv_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM match_results WHERE cv_id = $1")
            .bind(cv_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM cv_keywords WHERE cv_id = $1")
            .bind(cv_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM cvs WHERE id = $1")
            .bind(cv_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    // ── Professors ─────────────────────────────────────────────────────────

    async fn list_active_professors(&self) -> StoreResult<Vec<ProfessorRow>> {
        sqlx::query_as::<_, ProfessorRow>(&format!(
            "{PROFESSOR_SELECT} WHERE p.status = 'ACTIVE' ORDER BY p.id"
        ))
        .fetch_all(&self.pool)
        .await
    }

    async fn get_professor(&self, professor_id: Uuid) -> StoreResult<Option<ProfessorRow>> {
        sqlx::query_as::<_, ProfessorRow>(&format!("{PROFESSOR_SELECT} WHERE p.id = $1"))
            .bind(professor_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list_professor_keywords(
        &self,
        professor_ids: &[Uuid],
    ) -> StoreResult<Vec<ProfessorKeywordRow>> {
        sqlx::query_as::<_, ProfessorKeywordRow>(
            r#"
            SELECT professor_id, keyword, normalized, weight, source
            FROM professor_keywords
            WHERE professor_id = ANY($1)
            "#,
        )
        .bind(professor_ids)
        .fetch_all(&self.pool)
        .await
    }

    // ── Match results ──────────────────────────────────────────────────────

    async fn upsert_matches(
        &self,
        tenant_id: Uuid,
        cv_id: Uuid,
        matches: &[ScoredMatch],
        computed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        // Pairs that no longer overlap are dropped so the table mirrors the
        // latest compute.
        let kept: Vec<Uuid> = matches.iter().map(|m| m.professor_id).collect();
        sqlx::query("DELETE FROM match_results WHERE cv_id = $1 AND NOT (professor_id = ANY($2))")
            .bind(cv_id)
            .bind(&kept)
            .execute(&mut *tx)
            .await?;

        for m in matches {
            sqlx::query(
                r#"
                INSERT INTO match_results
                    (tenant_id, cv_id, professor_id, score, matched_keywords,
                     total_cv_keywords, total_professor_keywords, total_matched_keywords, computed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (cv_id, professor_id) DO UPDATE SET
                    score = EXCLUDED.score,
                    matched_keywords = EXCLUDED.matched_keywords,
                    total_cv_keywords = EXCLUDED.total_cv_keywords,
                    total_professor_keywords = EXCLUDED.total_professor_keywords,
                    total_matched_keywords = EXCLUDED.total_matched_keywords,
                    computed_at = EXCLUDED.computed_at
                "#,
            )
            .bind(tenant_id)
            .bind(cv_id)
            .bind(m.professor_id)
            .bind(m.score)
            .bind(&m.matched_keywords)
            .bind(m.total_cv_keywords)
            .bind(m.total_professor_keywords)
            .bind(m.total_matched_keywords)
            .bind(computed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    }

    async fn delete_matches(&self, cv_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM match_results WHERE cv_id = $1")
            .bind(cv_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_matches(
        &self,
        cv_id: Uuid,
        min_score: f64,
        limit: Option<i64>,
    ) -> StoreResult<Vec<MatchResultRow>> {
        sqlx::query_as::<_, MatchResultRow>(&format!(
            r#"
            SELECT {MATCH_COLUMNS}
            FROM match_results
            WHERE cv_id = $1 AND score >= $2
            ORDER BY score DESC, professor_id
            LIMIT $3
            "#
        ))
        .bind(cv_id)
        .bind(min_score)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    async fn count_matches(&self, cv_id: Uuid, min_score: f64) -> StoreResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM match_results WHERE cv_id = $1 AND score >= $2")
            .bind(cv_id)
            .bind(min_score)
            .fetch_one(&self.pool)
            .await
    }

    async fn get_matches_by_ids(
        &self,
        tenant_id: Uuid,
        match_ids: &[Uuid],
    ) -> StoreResult<Vec<MatchResultRow>> {
        sqlx::query_as::<_, MatchResultRow>(&format!(
            r#"
            SELECT {MATCH_COLUMNS}
            FROM match_results
            WHERE tenant_id = $1 AND id = ANY($2)
            ORDER BY score DESC, professor_id
            "#
        ))
        .bind(tenant_id)
        .bind(match_ids)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_match(&self, match_id: Uuid) -> StoreResult<Option<MatchResultRow>> {
        sqlx::query_as::<_, MatchResultRow>(&format!(
            "SELECT {MATCH_COLUMNS} FROM match_results WHERE id = $1"
        ))
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await
    }

    // ── Blacklist ──────────────────────────────────────────────────────────

    async fn is_blacklisted(&self, tenant_id: Uuid, email: &str) -> StoreResult<bool> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM email_blacklist
                WHERE email = $1 AND (tenant_id = $2 OR tenant_id IS NULL)
            )
            "#,
        )
        .bind(email)
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await
    }

    // ── SMTP accounts ──────────────────────────────────────────────────────

    async fn upsert_smtp_account(&self, account: NewSmtpAccount) -> StoreResult<SmtpAccountRow> {
        sqlx::query_as::<_, SmtpAccountRow>(&format!(
            r#"
            INSERT INTO smtp_accounts
                (tenant_id, email, host, port, username, encrypted_password, use_tls, use_ssl, from_name, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'ACTIVE')
            ON CONFLICT (tenant_id) DO UPDATE SET
                email = EXCLUDED.email,
                host = EXCLUDED.host,
                port = EXCLUDED.port,
                username = EXCLUDED.username,
                encrypted_password = EXCLUDED.encrypted_password,
                use_tls = EXCLUDED.use_tls,
                use_ssl = EXCLUDED.use_ssl,
                from_name = EXCLUDED.from_name,
                status = 'ACTIVE',
                updated_at = NOW()
            RETURNING {SMTP_COLUMNS}
            "#
        ))
        .bind(account.tenant_id)
        .bind(&account.email)
        .bind(&account.host)
        .bind(account.port)
        .bind(&account.username)
        .bind(&account.encrypted_password)
        .bind(account.use_tls)
        .bind(account.use_ssl)
        .bind(&account.from_name)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_smtp_account(&self, tenant_id: Uuid) -> StoreResult<Option<SmtpAccountRow>> {
        sqlx::query_as::<_, SmtpAccountRow>(&format!(
            "SELECT {SMTP_COLUMNS} FROM smtp_accounts WHERE tenant_id = $1"
        ))
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn set_smtp_status(
        &self,
        tenant_id: Uuid,
        status: SmtpStatus,
    ) -> StoreResult<Option<SmtpAccountRow>> {
        sqlx::query_as::<_, SmtpAccountRow>(&format!(
            r#"
            UPDATE smtp_accounts SET status = $2, updated_at = NOW()
            WHERE tenant_id = $1
            RETURNING {SMTP_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
    }

    // ── Campaigns ──────────────────────────────────────────────────────────

    async fn create_campaign_with_logs(
        &self,
        campaign: NewCampaign,
        logs: &[NewEmailLog],
    ) -> StoreResult<(CampaignRow, Vec<Uuid>)> {
        let mut tx = self.pool.begin().await?;

        let campaign_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO email_campaigns
                (tenant_id, cv_id, smtp_account_id, name, subject, body_template,
                 min_match_score, status, total_recipients)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'DRAFT', 0)
            RETURNING id
            "#,
        )
        .bind(campaign.tenant_id)
        .bind(campaign.cv_id)
        .bind(campaign.smtp_account_id)
        .bind(&campaign.name)
        .bind(&campaign.subject)
        .bind(&campaign.body_template)
        .bind(campaign.min_match_score)
        .fetch_one(&mut *tx)
        .await?;

        let ids = insert_logs_tx(&mut tx, campaign.tenant_id, campaign_id, logs).await?;
        let row = set_total_recipients_tx(&mut tx, campaign_id).await?;

        tx.commit().await?;
        Ok((row, ids))
    }

    async fn get_campaign(
        &self,
        campaign_id: Uuid,
        tenant_id: Uuid,
    ) -> StoreResult<Option<CampaignRow>> {
        sqlx::query_as::<_, CampaignRow>(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM email_campaigns WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(campaign_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_campaigns(&self, tenant_id: Uuid) -> StoreResult<Vec<CampaignRow>> {
        sqlx::query_as::<_, CampaignRow>(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM email_campaigns WHERE tenant_id = $1 ORDER BY created_at DESC"
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn list_campaigns_for_cv(&self, cv_id: Uuid) -> StoreResult<Vec<CampaignRow>> {
        sqlx::query_as::<_, CampaignRow>(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM email_campaigns WHERE cv_id = $1 ORDER BY created_at DESC"
        ))
        .bind(cv_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn claim_campaign(
        &self,
        campaign_id: Uuid,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE email_campaigns SET status = 'IN_PROGRESS', started_at = $3
            WHERE id = $1 AND tenant_id = $2 AND status IN ('DRAFT', 'SCHEDULED')
            "#,
        )
        .bind(campaign_id)
        .bind(tenant_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn schedule_campaign(
        &self,
        campaign_id: Uuid,
        tenant_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE email_campaigns SET status = 'SCHEDULED', scheduled_at = $3
            WHERE id = $1 AND tenant_id = $2 AND status = 'DRAFT'
            "#,
        )
        .bind(campaign_id)
        .bind(tenant_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn cancel_campaign(&self, campaign_id: Uuid, tenant_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE email_campaigns SET status = 'CANCELLED'
            WHERE id = $1 AND tenant_id = $2 AND status = 'SCHEDULED'
            "#,
        )
        .bind(campaign_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn finish_campaign(
        &self,
        campaign_id: Uuid,
        status: CampaignStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE email_campaigns
            SET status = $2, {COUNTER_ASSIGNMENTS}, completed_at = $3
            WHERE id = $1 AND status = 'IN_PROGRESS'
            "#
        ))
        .bind(campaign_id)
        .bind(status)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn refresh_campaign_counters(&self, campaign_id: Uuid) -> StoreResult<()> {
        sqlx::query(&format!(
            "UPDATE email_campaigns SET {COUNTER_ASSIGNMENTS} WHERE id = $1"
        ))
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn due_campaigns(&self, now: DateTime<Utc>) -> StoreResult<Vec<CampaignRow>> {
        sqlx::query_as::<_, CampaignRow>(&format!(
            r#"
            SELECT {CAMPAIGN_COLUMNS}
            FROM email_campaigns
            WHERE status = 'SCHEDULED' AND scheduled_at <= $1
            ORDER BY scheduled_at
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
    }

    async fn delete_campaign(&self, campaign_id: Uuid, tenant_id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let status: Option<CampaignStatus> = sqlx::query_scalar(
            "SELECT status FROM email_campaigns WHERE id = $1 AND tenant_id = $2 FOR UPDATE",
        )
        .bind(campaign_id)
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await?;

        match status {
            None | Some(CampaignStatus::InProgress) => return Ok(false),
            Some(_) => {}
        }

        sqlx::query("DELETE FROM email_logs WHERE campaign_id = $1")
            .bind(campaign_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM email_campaigns WHERE id = $1")
            .bind(campaign_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    // ── Email logs ─────────────────────────────────────────────────────────

    async fn insert_logs(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
        logs: &[NewEmailLog],
    ) -> StoreResult<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;
        let ids = insert_logs_tx(&mut tx, tenant_id, campaign_id, logs).await?;
        set_total_recipients_tx(&mut tx, campaign_id).await?;
        tx.commit().await?;
        Ok(ids)
    }

    async fn campaign_professor_ids(&self, campaign_id: Uuid) -> StoreResult<HashSet<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT professor_id FROM email_logs WHERE campaign_id = $1")
                .bind(campaign_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().collect())
    }

    async fn list_logs(&self, campaign_id: Uuid, tenant_id: Uuid) -> StoreResult<Vec<EmailLogRow>> {
        sqlx::query_as::<_, EmailLogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM email_logs WHERE campaign_id = $1 AND tenant_id = $2 ORDER BY seq"
        ))
        .bind(campaign_id)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_log(&self, log_id: Uuid, tenant_id: Uuid) -> StoreResult<Option<EmailLogRow>> {
        sqlx::query_as::<_, EmailLogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM email_logs WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(log_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn count_logs(&self, campaign_id: Uuid) -> StoreResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM email_logs WHERE campaign_id = $1")
            .bind(campaign_id)
            .fetch_one(&self.pool)
            .await
    }

    async fn update_log_body(
        &self,
        log_id: Uuid,
        body: &str,
        alternate_bodies: Option<&str>,
        origin: BodyOrigin,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE email_logs SET body = $2, alternate_bodies = $3, body_origin = $4
            WHERE id = $1 AND status IN ('PENDING', 'FAILED')
            "#,
        )
        .bind(log_id)
        .bind(body)
        .bind(alternate_bodies)
        .bind(origin)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_log_sending(&self, log_id: Uuid) -> StoreResult<Option<EmailLogRow>> {
        sqlx::query_as::<_, EmailLogRow>(&format!(
            r#"
            UPDATE email_logs SET status = 'SENDING'
            WHERE id = $1 AND status IN ('PENDING', 'FAILED')
            RETURNING {LOG_COLUMNS}
            "#
        ))
        .bind(log_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn mark_log_sent(
        &self,
        log_id: Uuid,
        retry_count: i32,
        sent_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE email_logs
            SET status = 'SENT', sent_at = $3, retry_count = $2, error_message = NULL
            WHERE id = $1
            "#,
        )
        .bind(log_id)
        .bind(retry_count)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_log_failed(
        &self,
        log_id: Uuid,
        status: LogStatus,
        error_message: &str,
        retry_count: i32,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE email_logs SET status = $2, error_message = $3, retry_count = $4 WHERE id = $1",
        )
        .bind(log_id)
        .bind(status)
        .bind(error_message)
        .bind(retry_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn insert_logs_tx(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    campaign_id: Uuid,
    logs: &[NewEmailLog],
) -> StoreResult<Vec<Uuid>> {
    let mut ids = Vec::with_capacity(logs.len());
    for log in logs {
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO email_logs
                (tenant_id, campaign_id, professor_id, match_result_id, recipient_email,
                 subject, body, body_origin, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'PENDING')
            ON CONFLICT (campaign_id, professor_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .bind(campaign_id)
        .bind(log.professor_id)
        .bind(log.match_result_id)
        .bind(&log.recipient_email)
        .bind(&log.subject)
        .bind(&log.body)
        .bind(log.body_origin)
        .fetch_optional(&mut **tx)
        .await?;
        ids.extend(inserted);
    }
    Ok(ids)
}

async fn set_total_recipients_tx(
    tx: &mut Transaction<'_, Postgres>,
    campaign_id: Uuid,
) -> StoreResult<CampaignRow> {
    sqlx::query_as::<_, CampaignRow>(&format!(
        r#"
        UPDATE email_campaigns
        SET total_recipients = (SELECT COUNT(*) FROM email_logs WHERE campaign_id = $1)
        WHERE id = $1
        RETURNING {CAMPAIGN_COLUMNS}
        "#
    ))
    .bind(campaign_id)
    .fetch_one(&mut **tx)
    .await
}
