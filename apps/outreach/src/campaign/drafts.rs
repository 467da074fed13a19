//! AI drafting of email bodies, per campaign or per log.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::campaign::service::CampaignService;
use crate::campaign::template::{is_placeholder, join_alternates};
use crate::errors::AppError;
use crate::llm_client::EmailContext;
use crate::models::campaign::{BodyOrigin, EmailLogRow, LogStatus};

impl CampaignService {
    pub fn dispatch_drafts(self: &Arc<Self>, campaign_id: Uuid, tenant_id: Uuid) {
        let this = Arc::clone(self);
        self.dispatcher.spawn("drafts", async move {
            if let Err(e) = this.generate_drafts(campaign_id, tenant_id).await {
                error!("Draft generation for campaign {campaign_id} failed: {e}");
            }
        });
    }

    /// Drafts every PENDING log that still carries a placeholder or template
    /// body. Manual and AI bodies are kept. A failed draft leaves its log
    /// untouched and the run continues. Returns the number drafted.
    pub async fn generate_drafts(&self, campaign_id: Uuid, tenant_id: Uuid) -> Result<usize, AppError> {
        let campaign = self.get(campaign_id, tenant_id).await?;
        let logs: Vec<EmailLogRow> = self
            .store
            .list_logs(campaign_id, tenant_id)
            .await?
            .into_iter()
            .filter(|l| l.status == LogStatus::Pending && needs_draft(l))
            .collect();
        if logs.is_empty() {
            debug!("Campaign {campaign_id} has no logs awaiting a draft");
            return Ok(0);
        }

        let student_keywords = self.student_keywords(campaign.cv_id).await?;
        let mut drafted = 0;
        for log in &logs {
            match self.draft_options(&student_keywords, log).await {
                Ok(options) => {
                    let alternates = join_alternates(&options);
                    if self
                        .store
                        .update_log_body(log.id, &options[0], alternates.as_deref(), BodyOrigin::Ai)
                        .await?
                    {
                        drafted += 1;
                    }
                }
                Err(e) => warn!("Could not draft email log {}: {e}", log.id),
            }
        }

        info!(
            "Drafted {drafted}/{} email bodies for campaign {campaign_id}",
            logs.len()
        );
        Ok(drafted)
    }

    /// Replaces a single log's body with a fresh AI draft.
    pub async fn regenerate_log(&self, log_id: Uuid, tenant_id: Uuid) -> Result<EmailLogRow, AppError> {
        let log = self.log(log_id, tenant_id).await?;
        ensure_editable(&log)?;
        let campaign = self.get(log.campaign_id, tenant_id).await?;

        let student_keywords = self.student_keywords(campaign.cv_id).await?;
        let options = self.draft_options(&student_keywords, &log).await?;
        let alternates = join_alternates(&options);
        if !self
            .store
            .update_log_body(log.id, &options[0], alternates.as_deref(), BodyOrigin::Ai)
            .await?
        {
            return Err(AppError::Conflict(format!(
                "Email log {log_id} changed state while drafting"
            )));
        }
        info!("Regenerated body of email log {log_id}");
        self.log(log_id, tenant_id).await
    }

    /// Manual override. Drafting never touches the body afterwards.
    pub async fn update_log_body(
        &self,
        log_id: Uuid,
        tenant_id: Uuid,
        body: &str,
    ) -> Result<EmailLogRow, AppError> {
        if body.trim().is_empty() {
            return Err(AppError::Validation("body must not be empty".to_string()));
        }
        let log = self.log(log_id, tenant_id).await?;
        ensure_editable(&log)?;
        if !self
            .store
            .update_log_body(log.id, body, None, BodyOrigin::Manual)
            .await?
        {
            return Err(AppError::Conflict(format!(
                "Email log {log_id} is no longer editable"
            )));
        }
        self.log(log_id, tenant_id).await
    }

    pub(super) async fn student_keywords(&self, cv_id: Uuid) -> Result<String, AppError> {
        let keywords = self.store.list_cv_keywords(cv_id).await?;
        Ok(keywords
            .iter()
            .map(|k| k.keyword.as_str())
            .collect::<Vec<_>>()
            .join(", "))
    }

    /// One to three bodies for the log's recipient, best first.
    pub(super) async fn draft_options(
        &self,
        student_keywords: &str,
        log: &EmailLogRow,
    ) -> Result<Vec<String>, AppError> {
        let professor = self
            .store
            .get_professor(log.professor_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Professor {} not found", log.professor_id)))?;
        let matched_keywords = match log.match_result_id {
            Some(id) => self
                .store
                .get_match(id)
                .await?
                .map(|m| m.matched_keywords)
                .unwrap_or_default(),
            None => String::new(),
        };

        let ctx = EmailContext {
            student_keywords: student_keywords.to_string(),
            professor_name: professor.full_name(),
            university: professor.university.clone().unwrap_or_default(),
            matched_keywords,
            publications: professor.publications.clone(),
        };
        Ok(self.llm.generate_email_options(&ctx).await?)
    }
}

fn needs_draft(log: &EmailLogRow) -> bool {
    is_placeholder(&log.body) || log.body_origin == BodyOrigin::Template
}

fn ensure_editable(log: &EmailLogRow) -> Result<(), AppError> {
    match log.status {
        LogStatus::Pending | LogStatus::Failed => Ok(()),
        other => Err(AppError::Conflict(format!(
            "Email log {} is {other} and can no longer be edited",
            log.id
        ))),
    }
}
