//! In-process `Store` used by the pipeline tests. Mirrors the Postgres
//! semantics that the services rely on: conditional status updates, unique
//! (campaign, professor) logs, insertion-ordered keywords and logs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::campaign::{
    BodyOrigin, CampaignRow, CampaignStatus, EmailLogRow, LogStatus, NewCampaign, NewEmailLog,
};
use crate::models::cv::{CvKeywordRow, CvRow, NewCv, NewCvKeyword, ParsingStatus};
use crate::models::matching::{MatchResultRow, ScoredMatch};
use crate::models::professor::{ProfessorKeywordRow, ProfessorRow, ProfessorStatus};
use crate::models::smtp::{NewSmtpAccount, SmtpAccountRow, SmtpStatus};
use crate::store::{Store, StoreResult};

#[derive(Default)]
struct Inner {
    cvs: HashMap<Uuid, CvRow>,
    cv_keywords: HashMap<Uuid, Vec<CvKeywordRow>>,
    professors: Vec<ProfessorRow>,
    professor_keywords: Vec<ProfessorKeywordRow>,
    matches: Vec<MatchResultRow>,
    blacklist: Vec<(Option<Uuid>, String)>,
    smtp: HashMap<Uuid, SmtpAccountRow>,
    campaigns: HashMap<Uuid, CampaignRow>,
    logs: Vec<EmailLogRow>,
    next_seq: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_next_write: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn add_professor(&self, professor: ProfessorRow) {
        self.lock().professors.push(professor);
    }

    pub fn add_professor_keyword(&self, keyword: ProfessorKeywordRow) {
        self.lock().professor_keywords.push(keyword);
    }

    pub fn add_blacklist(&self, tenant_id: Option<Uuid>, email: &str) {
        self.lock().blacklist.push((tenant_id, email.to_string()));
    }

    /// Seeds a CV row directly, bypassing intake.
    pub fn put_cv(&self, cv: CvRow) {
        self.lock().cvs.insert(cv.id, cv);
    }

    pub fn all_matches(&self) -> Vec<MatchResultRow> {
        self.lock().matches.clone()
    }

    pub fn all_logs(&self) -> Vec<EmailLogRow> {
        self.lock().logs.clone()
    }

    /// The next multi-row write fails before touching any row, the way a
    /// rolled-back transaction leaves the database.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    fn injected_failure(&self) -> StoreResult<()> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(sqlx::Error::Protocol("injected write failure".to_string()));
        }
        Ok(())
    }
}

impl Inner {
    fn insert_logs(&mut self, tenant_id: Uuid, campaign_id: Uuid, logs: &[NewEmailLog]) -> Vec<Uuid> {
        let mut ids = Vec::with_capacity(logs.len());
        for log in logs {
            let exists = self
                .logs
                .iter()
                .any(|l| l.campaign_id == campaign_id && l.professor_id == log.professor_id);
            if exists {
                continue;
            }
            self.next_seq += 1;
            let row = EmailLogRow {
                id: Uuid::new_v4(),
                tenant_id,
                campaign_id,
                professor_id: log.professor_id,
                match_result_id: log.match_result_id,
                seq: self.next_seq,
                recipient_email: log.recipient_email.clone(),
                subject: log.subject.clone(),
                body: log.body.clone(),
                alternate_bodies: None,
                body_origin: log.body_origin,
                status: LogStatus::Pending,
                error_message: None,
                retry_count: 0,
                sent_at: None,
                created_at: Utc::now(),
            };
            ids.push(row.id);
            self.logs.push(row);
        }
        let total = self.count_logs_where(campaign_id, |_| true);
        if let Some(c) = self.campaigns.get_mut(&campaign_id) {
            c.total_recipients = total;
        }
        ids
    }

    fn count_logs_where(&self, campaign_id: Uuid, pred: impl Fn(LogStatus) -> bool) -> i32 {
        self.logs
            .iter()
            .filter(|l| l.campaign_id == campaign_id && pred(l.status))
            .count() as i32
    }

    fn refresh_counters(&mut self, campaign_id: Uuid) {
        let sent = self.count_logs_where(campaign_id, |s| s == LogStatus::Sent);
        let failed = self.count_logs_where(campaign_id, |s| {
            matches!(s, LogStatus::Failed | LogStatus::Blacklisted)
        });
        if let Some(c) = self.campaigns.get_mut(&campaign_id) {
            c.sent_count = sent;
            c.failed_count = failed;
        }
    }
}

/// Builds an ACTIVE professor row for test fixtures.
pub fn professor(first: &str, last: &str, research_area: &str, department: &str) -> ProfessorRow {
    ProfessorRow {
        id: Uuid::new_v4(),
        university: Some("State University".to_string()),
        email: format!(
            "{}.{}@uni.example",
            first.to_lowercase(),
            last.to_lowercase()
        ),
        first_name: first.to_string(),
        last_name: last.to_string(),
        department: (!department.is_empty()).then(|| department.to_string()),
        research_area: (!research_area.is_empty()).then(|| research_area.to_string()),
        publications: None,
        status: ProfessorStatus::Active,
    }
}

fn sort_matches(rows: &mut [MatchResultRow]) {
    rows.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.professor_id.cmp(&b.professor_id))
    });
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_cv(&self, cv: NewCv) -> StoreResult<CvRow> {
        let row = CvRow {
            id: Uuid::new_v4(),
            tenant_id: cv.tenant_id,
            uploaded_by: cv.uploaded_by,
            original_name: cv.original_name,
            stored_path: cv.stored_path,
            size_bytes: cv.size_bytes,
            mime_type: cv.mime_type,
            parsing_status: ParsingStatus::Pending,
            uploaded_at: Utc::now(),
            parsed_at: None,
        };
        self.lock().cvs.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_cv(&self, cv_id: Uuid, tenant_id: Uuid) -> StoreResult<Option<CvRow>> {
        Ok(self
            .lock()
            .cvs
            .get(&cv_id)
            .filter(|cv| cv.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_cvs(&self, tenant_id: Uuid) -> StoreResult<Vec<CvRow>> {
        let mut rows: Vec<CvRow> = self
            .lock()
            .cvs
            .values()
            .filter(|cv| cv.tenant_id == tenant_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(rows)
    }

    async fn set_cv_status(
        &self,
        cv_id: Uuid,
        status: ParsingStatus,
        parsed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        if let Some(cv) = self.lock().cvs.get_mut(&cv_id) {
            cv.parsing_status = status;
            cv.parsed_at = parsed_at;
        }
        Ok(())
    }

    async fn try_begin_parse(&self, cv_id: Uuid, tenant_id: Uuid) -> StoreResult<bool> {
        let mut inner = self.lock();
        match inner.cvs.get_mut(&cv_id) {
            Some(cv) if cv.tenant_id == tenant_id && cv.parsing_status != ParsingStatus::InProgress => {
                cv.parsing_status = ParsingStatus::InProgress;
                cv.parsed_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn replace_cv_keywords(
        &self,
        cv_id: Uuid,
        tenant_id: Uuid,
        keywords: &[NewCvKeyword],
    ) -> StoreResult<()> {
        let rows = keywords
            .iter()
            .map(|kw| CvKeywordRow {
                id: Uuid::new_v4(),
                tenant_id,
                cv_id,
                keyword: kw.keyword.clone(),
                normalized: kw.normalized.clone(),
                weight: kw.weight,
                frequency: kw.frequency,
            })
            .collect();
        self.lock().cv_keywords.insert(cv_id, rows);
        Ok(())
    }

    async fn list_cv_keywords(&self, cv_id: Uuid) -> StoreResult<Vec<CvKeywordRow>> {
        Ok(self
            .lock()
            .cv_keywords
            .get(&cv_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_cv(&self, cv_id: Uuid, tenant_id: Uuid) -> StoreResult<bool> {
        let mut inner = self.lock();
        match inner.cvs.get(&cv_id) {
            Some(cv) if cv.tenant_id == tenant_id => {}
            _ => return Ok(false),
        }
        let campaign_ids: HashSet<Uuid> = inner
            .campaigns
            .values()
            .filter(|c| c.cv_id == cv_id)
            .map(|c| c.id)
            .collect();
        inner.logs.retain(|l| !campaign_ids.contains(&l.campaign_id));
        inner.campaigns.retain(|id, _| !campaign_ids.contains(id));
        inner.matches.retain(|m| m.cv_id != cv_id);
        inner.cv_keywords.remove(&cv_id);
        inner.cvs.remove(&cv_id);
        Ok(true)
    }

    async fn list_active_professors(&self) -> StoreResult<Vec<ProfessorRow>> {
        let mut rows: Vec<ProfessorRow> = self
            .lock()
            .professors
            .iter()
            .filter(|p| p.status == ProfessorStatus::Active)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.id);
        Ok(rows)
    }

    async fn get_professor(&self, professor_id: Uuid) -> StoreResult<Option<ProfessorRow>> {
        Ok(self
            .lock()
            .professors
            .iter()
            .find(|p| p.id == professor_id)
            .cloned())
    }

    async fn list_professor_keywords(
        &self,
        professor_ids: &[Uuid],
    ) -> StoreResult<Vec<ProfessorKeywordRow>> {
        Ok(self
            .lock()
            .professor_keywords
            .iter()
            .filter(|k| professor_ids.contains(&k.professor_id))
            .cloned()
            .collect())
    }

    async fn upsert_matches(
        &self,
        tenant_id: Uuid,
        cv_id: Uuid,
        matches: &[ScoredMatch],
        computed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut inner = self.lock();
        let kept: HashSet<Uuid> = matches.iter().map(|m| m.professor_id).collect();
        inner
            .matches
            .retain(|m| m.cv_id != cv_id || kept.contains(&m.professor_id));

        for m in matches {
            let existing = inner
                .matches
                .iter()
                .position(|row| row.cv_id == cv_id && row.professor_id == m.professor_id);
            match existing {
                Some(idx) => {
                    let row = &mut inner.matches[idx];
                    row.score = m.score;
                    row.matched_keywords = m.matched_keywords.clone();
                    row.total_cv_keywords = m.total_cv_keywords;
                    row.total_professor_keywords = m.total_professor_keywords;
                    row.total_matched_keywords = m.total_matched_keywords;
                    row.computed_at = computed_at;
                }
                None => inner.matches.push(MatchResultRow {
                    id: Uuid::new_v4(),
                    tenant_id,
                    cv_id,
                    professor_id: m.professor_id,
                    score: m.score,
                    matched_keywords: m.matched_keywords.clone(),
                    total_cv_keywords: m.total_cv_keywords,
                    total_professor_keywords: m.total_professor_keywords,
                    total_matched_keywords: m.total_matched_keywords,
                    computed_at,
                }),
            }
        }
        Ok(())
    }

    async fn delete_matches(&self, cv_id: Uuid) -> StoreResult<u64> {
        let mut inner = self.lock();
        let before = inner.matches.len();
        inner.matches.retain(|m| m.cv_id != cv_id);
        Ok((before - inner.matches.len()) as u64)
    }

    async fn list_matches(
        &self,
        cv_id: Uuid,
        min_score: f64,
        limit: Option<i64>,
    ) -> StoreResult<Vec<MatchResultRow>> {
        let mut rows: Vec<MatchResultRow> = self
            .lock()
            .matches
            .iter()
            .filter(|m| m.cv_id == cv_id && m.score >= min_score)
            .cloned()
            .collect();
        sort_matches(&mut rows);
        if let Some(limit) = limit {
            rows.truncate(limit.max(0) as usize);
        }
        Ok(rows)
    }

    async fn count_matches(&self, cv_id: Uuid, min_score: f64) -> StoreResult<i64> {
        Ok(self
            .lock()
            .matches
            .iter()
            .filter(|m| m.cv_id == cv_id && m.score >= min_score)
            .count() as i64)
    }

    async fn get_matches_by_ids(
        &self,
        tenant_id: Uuid,
        match_ids: &[Uuid],
    ) -> StoreResult<Vec<MatchResultRow>> {
        let mut rows: Vec<MatchResultRow> = self
            .lock()
            .matches
            .iter()
            .filter(|m| m.tenant_id == tenant_id && match_ids.contains(&m.id))
            .cloned()
            .collect();
        sort_matches(&mut rows);
        Ok(rows)
    }

    async fn get_match(&self, match_id: Uuid) -> StoreResult<Option<MatchResultRow>> {
        Ok(self
            .lock()
            .matches
            .iter()
            .find(|m| m.id == match_id)
            .cloned())
    }

    async fn is_blacklisted(&self, tenant_id: Uuid, email: &str) -> StoreResult<bool> {
        Ok(self
            .lock()
            .blacklist
            .iter()
            .any(|(tenant, e)| e == email && tenant.map_or(true, |t| t == tenant_id)))
    }

    async fn upsert_smtp_account(&self, account: NewSmtpAccount) -> StoreResult<SmtpAccountRow> {
        let mut inner = self.lock();
        let now = Utc::now();
        let (id, created_at) = inner
            .smtp
            .get(&account.tenant_id)
            .map(|row| (row.id, row.created_at))
            .unwrap_or_else(|| (Uuid::new_v4(), now));
        let row = SmtpAccountRow {
            id,
            tenant_id: account.tenant_id,
            email: account.email,
            host: account.host,
            port: account.port,
            username: account.username,
            encrypted_password: account.encrypted_password,
            use_tls: account.use_tls,
            use_ssl: account.use_ssl,
            from_name: account.from_name,
            status: SmtpStatus::Active,
            created_at,
            updated_at: now,
        };
        inner.smtp.insert(row.tenant_id, row.clone());
        Ok(row)
    }

    async fn get_smtp_account(&self, tenant_id: Uuid) -> StoreResult<Option<SmtpAccountRow>> {
        Ok(self.lock().smtp.get(&tenant_id).cloned())
    }

    async fn set_smtp_status(
        &self,
        tenant_id: Uuid,
        status: SmtpStatus,
    ) -> StoreResult<Option<SmtpAccountRow>> {
        Ok(self.lock().smtp.get_mut(&tenant_id).map(|row| {
            row.status = status;
            row.updated_at = Utc::now();
            row.clone()
        }))
    }

    async fn create_campaign_with_logs(
        &self,
        campaign: NewCampaign,
        logs: &[NewEmailLog],
    ) -> StoreResult<(CampaignRow, Vec<Uuid>)> {
        self.injected_failure()?;
        let row = CampaignRow {
            id: Uuid::new_v4(),
            tenant_id: campaign.tenant_id,
            cv_id: campaign.cv_id,
            smtp_account_id: campaign.smtp_account_id,
            name: campaign.name,
            subject: campaign.subject,
            body_template: campaign.body_template,
            min_match_score: campaign.min_match_score,
            status: CampaignStatus::Draft,
            total_recipients: 0,
            sent_count: 0,
            failed_count: 0,
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        };
        let mut inner = self.lock();
        let campaign_id = row.id;
        inner.campaigns.insert(campaign_id, row);
        let ids = inner.insert_logs(campaign.tenant_id, campaign_id, logs);
        let row = inner.campaigns[&campaign_id].clone();
        Ok((row, ids))
    }

    async fn get_campaign(
        &self,
        campaign_id: Uuid,
        tenant_id: Uuid,
    ) -> StoreResult<Option<CampaignRow>> {
        Ok(self
            .lock()
            .campaigns
            .get(&campaign_id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_campaigns(&self, tenant_id: Uuid) -> StoreResult<Vec<CampaignRow>> {
        let mut rows: Vec<CampaignRow> = self
            .lock()
            .campaigns
            .values()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn list_campaigns_for_cv(&self, cv_id: Uuid) -> StoreResult<Vec<CampaignRow>> {
        Ok(self
            .lock()
            .campaigns
            .values()
            .filter(|c| c.cv_id == cv_id)
            .cloned()
            .collect())
    }

    async fn claim_campaign(
        &self,
        campaign_id: Uuid,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut inner = self.lock();
        match inner.campaigns.get_mut(&campaign_id) {
            Some(c)
                if c.tenant_id == tenant_id
                    && matches!(c.status, CampaignStatus::Draft | CampaignStatus::Scheduled) =>
            {
                c.status = CampaignStatus::InProgress;
                c.started_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn schedule_campaign(
        &self,
        campaign_id: Uuid,
        tenant_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut inner = self.lock();
        match inner.campaigns.get_mut(&campaign_id) {
            Some(c) if c.tenant_id == tenant_id && c.status == CampaignStatus::Draft => {
                c.status = CampaignStatus::Scheduled;
                c.scheduled_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel_campaign(&self, campaign_id: Uuid, tenant_id: Uuid) -> StoreResult<bool> {
        let mut inner = self.lock();
        match inner.campaigns.get_mut(&campaign_id) {
            Some(c) if c.tenant_id == tenant_id && c.status == CampaignStatus::Scheduled => {
                c.status = CampaignStatus::Cancelled;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finish_campaign(
        &self,
        campaign_id: Uuid,
        status: CampaignStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut inner = self.lock();
        match inner.campaigns.get_mut(&campaign_id) {
            Some(c) if c.status == CampaignStatus::InProgress => {
                c.status = status;
                c.completed_at = Some(now);
            }
            _ => return Ok(false),
        }
        inner.refresh_counters(campaign_id);
        Ok(true)
    }

    async fn refresh_campaign_counters(&self, campaign_id: Uuid) -> StoreResult<()> {
        self.lock().refresh_counters(campaign_id);
        Ok(())
    }

    async fn due_campaigns(&self, now: DateTime<Utc>) -> StoreResult<Vec<CampaignRow>> {
        let mut rows: Vec<CampaignRow> = self
            .lock()
            .campaigns
            .values()
            .filter(|c| {
                c.status == CampaignStatus::Scheduled && c.scheduled_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.scheduled_at);
        Ok(rows)
    }

    async fn delete_campaign(&self, campaign_id: Uuid, tenant_id: Uuid) -> StoreResult<bool> {
        let mut inner = self.lock();
        match inner.campaigns.get(&campaign_id) {
            Some(c) if c.tenant_id == tenant_id && c.status != CampaignStatus::InProgress => {}
            _ => return Ok(false),
        }
        inner.logs.retain(|l| l.campaign_id != campaign_id);
        inner.campaigns.remove(&campaign_id);
        Ok(true)
    }

    async fn insert_logs(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
        logs: &[NewEmailLog],
    ) -> StoreResult<Vec<Uuid>> {
        self.injected_failure()?;
        Ok(self.lock().insert_logs(tenant_id, campaign_id, logs))
    }

    async fn campaign_professor_ids(&self, campaign_id: Uuid) -> StoreResult<HashSet<Uuid>> {
        Ok(self
            .lock()
            .logs
            .iter()
            .filter(|l| l.campaign_id == campaign_id)
            .map(|l| l.professor_id)
            .collect())
    }

    async fn list_logs(&self, campaign_id: Uuid, tenant_id: Uuid) -> StoreResult<Vec<EmailLogRow>> {
        let mut rows: Vec<EmailLogRow> = self
            .lock()
            .logs
            .iter()
            .filter(|l| l.campaign_id == campaign_id && l.tenant_id == tenant_id)
            .cloned()
            .collect();
        rows.sort_by_key(|l| l.seq);
        Ok(rows)
    }

    async fn get_log(&self, log_id: Uuid, tenant_id: Uuid) -> StoreResult<Option<EmailLogRow>> {
        Ok(self
            .lock()
            .logs
            .iter()
            .find(|l| l.id == log_id && l.tenant_id == tenant_id)
            .cloned())
    }

    async fn count_logs(&self, campaign_id: Uuid) -> StoreResult<i64> {
        Ok(self
            .lock()
            .logs
            .iter()
            .filter(|l| l.campaign_id == campaign_id)
            .count() as i64)
    }

    async fn update_log_body(
        &self,
        log_id: Uuid,
        body: &str,
        alternate_bodies: Option<&str>,
        origin: BodyOrigin,
    ) -> StoreResult<bool> {
        let mut inner = self.lock();
        match inner.logs.iter_mut().find(|l| l.id == log_id) {
            Some(log) if matches!(log.status, LogStatus::Pending | LogStatus::Failed) => {
                log.body = body.to_string();
                log.alternate_bodies = alternate_bodies.map(str::to_string);
                log.body_origin = origin;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_log_sending(&self, log_id: Uuid) -> StoreResult<Option<EmailLogRow>> {
        let mut inner = self.lock();
        match inner.logs.iter_mut().find(|l| l.id == log_id) {
            Some(log) if matches!(log.status, LogStatus::Pending | LogStatus::Failed) => {
                log.status = LogStatus::Sending;
                Ok(Some(log.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_log_sent(
        &self,
        log_id: Uuid,
        retry_count: i32,
        sent_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if let Some(log) = self.lock().logs.iter_mut().find(|l| l.id == log_id) {
            log.status = LogStatus::Sent;
            log.sent_at = Some(sent_at);
            log.retry_count = retry_count;
            log.error_message = None;
        }
        Ok(())
    }

    async fn mark_log_failed(
        &self,
        log_id: Uuid,
        status: LogStatus,
        error_message: &str,
        retry_count: i32,
    ) -> StoreResult<()> {
        if let Some(log) = self.lock().logs.iter_mut().find(|l| l.id == log_id) {
            log.status = status;
            log.error_message = Some(error_message.to_string());
            log.retry_count = retry_count;
        }
        Ok(())
    }
}
