use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::campaign::template::{self, AI_SENTINEL};
use crate::config::EmailSettings;
use crate::dispatch::{Dispatcher, ShutdownSignal};
use crate::errors::AppError;
use crate::llm_client::ChatModel;
use crate::mail::cache::MailSenderCache;
use crate::models::campaign::{
    BodyOrigin, CampaignRow, CampaignStatus, EmailLogRow, NewCampaign, NewEmailLog,
};
use crate::models::cv::CvRow;
use crate::models::matching::MatchResultRow;
use crate::models::professor::ProfessorStatus;
use crate::storage::BlobStore;
use crate::store::Store;

const AUTO_CAMPAIGN_LIMIT: i64 = 50;
const AUTO_CAMPAIGN_SUBJECT: &str = "Research Inquiry regarding interests matching your recent work";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCampaignRequest {
    pub cv_id: Uuid,
    pub name: String,
    pub subject: String,
    pub body_template: String,
    pub min_match_score: f64,
    /// Explicit recipients. When absent every match at or above
    /// `min_match_score` is targeted.
    #[serde(default)]
    pub match_ids: Option<Vec<Uuid>>,
}

/// Owns the campaign lifecycle: creation and log seeding, draft generation
/// (`drafts.rs`), execution (`executor.rs`) and the tenant-facing reads.
pub struct CampaignService {
    pub(super) store: Arc<dyn Store>,
    pub(super) llm: Arc<dyn ChatModel>,
    pub(super) blobs: Arc<dyn BlobStore>,
    pub(super) senders: Arc<MailSenderCache>,
    pub(super) dispatcher: Dispatcher,
    pub(super) email: EmailSettings,
    pub(super) shutdown: ShutdownSignal,
}

impl CampaignService {
    pub fn new(
        store: Arc<dyn Store>,
        llm: Arc<dyn ChatModel>,
        blobs: Arc<dyn BlobStore>,
        senders: Arc<MailSenderCache>,
        dispatcher: Dispatcher,
        email: EmailSettings,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            store,
            llm,
            blobs,
            senders,
            dispatcher,
            email,
            shutdown,
        }
    }

    // ── Creation ───────────────────────────────────────────────────────────

    /// Creates a DRAFT campaign and seeds one PENDING log per eligible
    /// recipient, in one store write. Drafting is queued once the logs are
    /// stored.
    pub async fn create(
        self: &Arc<Self>,
        tenant_id: Uuid,
        req: CreateCampaignRequest,
    ) -> Result<CampaignRow, AppError> {
        if req.name.trim().is_empty() || req.subject.trim().is_empty() {
            return Err(AppError::Validation(
                "name and subject are required".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&req.min_match_score) {
            return Err(AppError::Validation(
                "min_match_score must be within [0, 1]".to_string(),
            ));
        }
        let cv = self.owned_cv(req.cv_id, tenant_id).await?;

        let matches = match &req.match_ids {
            Some(ids) => self.explicit_matches(tenant_id, cv.id, ids).await?,
            None => {
                self.store
                    .list_matches(cv.id, req.min_match_score, None)
                    .await?
            }
        };
        let eligible = self.store.count_matches(cv.id, req.min_match_score).await?;
        debug!(
            "CV {} has {eligible} matches at or above {}",
            cv.id, req.min_match_score
        );

        let smtp_account_id = self.store.get_smtp_account(tenant_id).await?.map(|a| a.id);
        let logs = self
            .build_logs(tenant_id, &req.subject, &req.body_template, &matches, HashSet::new())
            .await?;
        let (campaign, seeded) = self
            .store
            .create_campaign_with_logs(
                NewCampaign {
                    tenant_id,
                    cv_id: cv.id,
                    smtp_account_id,
                    name: req.name.trim().to_string(),
                    subject: req.subject,
                    body_template: req.body_template,
                    min_match_score: req.min_match_score,
                },
                &logs,
            )
            .await?;
        info!(
            "Campaign {} created for CV {} with {} recipients",
            campaign.id,
            cv.id,
            seeded.len()
        );

        if !seeded.is_empty() {
            self.dispatch_drafts(campaign.id, tenant_id);
        }
        Ok(campaign)
    }

    /// Seeds a draft campaign from the best matches of a freshly matched CV.
    /// Returns `None` when no match reaches `threshold`.
    pub async fn create_auto_campaign(
        self: &Arc<Self>,
        cv: &CvRow,
        threshold: f64,
    ) -> Result<Option<CampaignRow>, AppError> {
        let matches = self
            .store
            .list_matches(cv.id, threshold, Some(AUTO_CAMPAIGN_LIMIT))
            .await?;
        if matches.is_empty() {
            info!(
                "No matches at or above {threshold} for CV {}; no automatic campaign",
                cv.id
            );
            return Ok(None);
        }

        let smtp_account_id = self
            .store
            .get_smtp_account(cv.tenant_id)
            .await?
            .map(|a| a.id);
        let logs = self
            .build_logs(
                cv.tenant_id,
                AUTO_CAMPAIGN_SUBJECT,
                AI_SENTINEL,
                &matches,
                HashSet::new(),
            )
            .await?;
        let (campaign, seeded) = self
            .store
            .create_campaign_with_logs(
                NewCampaign {
                    tenant_id: cv.tenant_id,
                    cv_id: cv.id,
                    smtp_account_id,
                    name: format!(
                        "AI-Outreach: {} ({})",
                        cv.original_name,
                        Utc::now().format("%Y-%m-%d")
                    ),
                    subject: AUTO_CAMPAIGN_SUBJECT.to_string(),
                    body_template: AI_SENTINEL.to_string(),
                    min_match_score: threshold,
                },
                &logs,
            )
            .await?;
        info!(
            "Automatic campaign {} created for CV {} with {} recipients",
            campaign.id,
            cv.id,
            seeded.len()
        );

        if !seeded.is_empty() {
            self.dispatch_drafts(campaign.id, campaign.tenant_id);
        }
        Ok(Some(campaign))
    }

    /// Seeds logs into an existing campaign. Returns the new ids in
    /// insertion order.
    pub(super) async fn seed_logs(
        &self,
        campaign: &CampaignRow,
        matches: &[MatchResultRow],
    ) -> Result<Vec<Uuid>, AppError> {
        let seen = self.store.campaign_professor_ids(campaign.id).await?;
        let logs = self
            .build_logs(
                campaign.tenant_id,
                &campaign.subject,
                &campaign.body_template,
                matches,
                seen,
            )
            .await?;
        Ok(self
            .store
            .insert_logs(campaign.tenant_id, campaign.id, &logs)
            .await?)
    }

    /// One PENDING log per match, skipping professors in `seen` or already
    /// taken by an earlier match, inactive professors and blacklisted
    /// addresses.
    async fn build_logs(
        &self,
        tenant_id: Uuid,
        subject: &str,
        body_template: &str,
        matches: &[MatchResultRow],
        mut seen: HashSet<Uuid>,
    ) -> Result<Vec<NewEmailLog>, AppError> {
        let mut logs = Vec::with_capacity(matches.len());

        for m in matches {
            if !seen.insert(m.professor_id) {
                continue;
            }
            let Some(professor) = self.store.get_professor(m.professor_id).await? else {
                warn!("Professor {} vanished; not seeding a log", m.professor_id);
                continue;
            };
            if professor.status != ProfessorStatus::Active {
                continue;
            }
            if self
                .store
                .is_blacklisted(tenant_id, &professor.email)
                .await?
            {
                debug!("Skipping blacklisted recipient {}", professor.email);
                continue;
            }

            logs.push(NewEmailLog {
                professor_id: professor.id,
                match_result_id: Some(m.id),
                recipient_email: professor.email.clone(),
                subject: subject.to_string(),
                body: template::render(body_template, &professor, &m.matched_keywords),
                body_origin: BodyOrigin::Template,
            });
        }
        Ok(logs)
    }

    async fn explicit_matches(
        &self,
        tenant_id: Uuid,
        cv_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<MatchResultRow>, AppError> {
        let unique: HashSet<Uuid> = ids.iter().copied().collect();
        let found = self.store.get_matches_by_ids(tenant_id, ids).await?;
        if found.len() != unique.len() || found.iter().any(|m| m.cv_id != cv_id) {
            return Err(AppError::Validation(
                "match_ids must reference this tenant's matches for the given CV".to_string(),
            ));
        }
        Ok(found)
    }

    // ── State transitions ──────────────────────────────────────────────────

    pub async fn schedule(
        &self,
        campaign_id: Uuid,
        tenant_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<CampaignRow, AppError> {
        if at <= Utc::now() {
            return Err(AppError::Validation(
                "scheduled_at must be in the future".to_string(),
            ));
        }
        let campaign = self.get(campaign_id, tenant_id).await?;
        if !self
            .store
            .schedule_campaign(campaign_id, tenant_id, at)
            .await?
        {
            return Err(AppError::Conflict(format!(
                "Only DRAFT campaigns can be scheduled (campaign is {})",
                campaign.status
            )));
        }
        info!("Campaign {campaign_id} scheduled for {at}");
        self.get(campaign_id, tenant_id).await
    }

    pub async fn cancel(&self, campaign_id: Uuid, tenant_id: Uuid) -> Result<CampaignRow, AppError> {
        let campaign = self.get(campaign_id, tenant_id).await?;
        if !self.store.cancel_campaign(campaign_id, tenant_id).await? {
            return Err(AppError::Conflict(format!(
                "Only SCHEDULED campaigns can be cancelled (campaign is {})",
                campaign.status
            )));
        }
        info!("Campaign {campaign_id} cancelled");
        self.get(campaign_id, tenant_id).await
    }

    pub async fn delete(&self, campaign_id: Uuid, tenant_id: Uuid) -> Result<(), AppError> {
        self.get(campaign_id, tenant_id).await?;
        if !self.store.delete_campaign(campaign_id, tenant_id).await? {
            return Err(AppError::Conflict(
                "Cannot delete a campaign that is in progress".to_string(),
            ));
        }
        info!("Campaign {campaign_id} deleted");
        Ok(())
    }

    // ── Reads ──────────────────────────────────────────────────────────────

    pub async fn get(&self, campaign_id: Uuid, tenant_id: Uuid) -> Result<CampaignRow, AppError> {
        self.store
            .get_campaign(campaign_id, tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Campaign {campaign_id} not found")))
    }

    pub async fn list(&self, tenant_id: Uuid) -> Result<Vec<CampaignRow>, AppError> {
        Ok(self.store.list_campaigns(tenant_id).await?)
    }

    pub async fn logs(&self, campaign_id: Uuid, tenant_id: Uuid) -> Result<Vec<EmailLogRow>, AppError> {
        self.get(campaign_id, tenant_id).await?;
        Ok(self.store.list_logs(campaign_id, tenant_id).await?)
    }

    /// A log owned by `tenant_id`; another tenant's log is not found.
    pub async fn log(&self, log_id: Uuid, tenant_id: Uuid) -> Result<EmailLogRow, AppError> {
        self.store
            .get_log(log_id, tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Email log {log_id} not found")))
    }

    async fn owned_cv(&self, cv_id: Uuid, tenant_id: Uuid) -> Result<CvRow, AppError> {
        self.store
            .get_cv(cv_id, tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("CV {cv_id} not found")))
    }

    pub(super) fn is_runnable(status: CampaignStatus) -> bool {
        matches!(status, CampaignStatus::Draft | CampaignStatus::Scheduled)
    }
}
