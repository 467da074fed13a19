//! Campaign execution: claim, windowed rate limiting, per-recipient retry.
//!
//! One worker drives a campaign. The claim is a conditional status update,
//! so concurrent callers race on the row and all but one return at once.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::campaign::service::CampaignService;
use crate::campaign::template::is_placeholder;
use crate::errors::AppError;
use crate::mail::{MailAttachment, MailTransport, OutgoingEmail};
use crate::models::campaign::{BodyOrigin, CampaignRow, CampaignStatus, EmailLogRow, LogStatus};
use crate::models::smtp::{SmtpAccountRow, SmtpStatus};

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Everything a send needs that is shared by all recipients of a campaign.
struct SendContext {
    tenant_id: Uuid,
    account: SmtpAccountRow,
    /// A sender that could not be prepared (e.g. undecryptable password)
    /// fails each log it is used for rather than the whole run.
    transport: Result<Arc<dyn MailTransport>, String>,
    attachment: MailAttachment,
    student_keywords: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Delivery {
    Sent,
    Failed,
    Blacklisted,
    /// No usable body could be produced; nothing reached SMTP.
    Undrafted,
    /// Another sender moved the log on first.
    Skipped,
}

#[derive(Debug, Default)]
struct SendTally {
    sent: i32,
    failed: i32,
}

impl CampaignService {
    /// POST /campaigns/:id/execute entry: checks the campaign can start and
    /// queues the run.
    pub async fn request_execute(
        self: &Arc<Self>,
        campaign_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<CampaignRow, AppError> {
        let campaign = self.get(campaign_id, tenant_id).await?;
        if !Self::is_runnable(campaign.status) {
            return Err(AppError::Conflict(format!(
                "Campaign {campaign_id} is {} and cannot be executed",
                campaign.status
            )));
        }
        self.dispatch_execute(campaign_id, tenant_id);
        Ok(campaign)
    }

    pub fn dispatch_execute(self: &Arc<Self>, campaign_id: Uuid, tenant_id: Uuid) {
        let this = Arc::clone(self);
        self.dispatcher.spawn("execute", async move {
            if let Err(e) = this.execute(campaign_id, tenant_id).await {
                error!("Campaign {campaign_id} execution failed: {e}");
            }
        });
    }

    /// Runs the campaign to the end. Returns `Ok(false)` without touching
    /// anything if another worker holds it or it is not DRAFT/SCHEDULED.
    /// Once claimed, the campaign always ends COMPLETED or FAILED, with its
    /// counters recounted from the logs.
    pub async fn execute(&self, campaign_id: Uuid, tenant_id: Uuid) -> Result<bool, AppError> {
        if !self
            .store
            .claim_campaign(campaign_id, tenant_id, Utc::now())
            .await?
        {
            info!("Campaign {campaign_id} was not claimed; another worker owns it or it is not runnable");
            return Ok(false);
        }
        info!("Campaign {campaign_id} execution started");

        let mut tally = SendTally::default();
        let outcome = self.run_claimed(campaign_id, tenant_id, &mut tally).await;
        let status = match &outcome {
            Ok(true) => CampaignStatus::Completed,
            Ok(false) => {
                warn!("Campaign {campaign_id} interrupted by shutdown; unsent logs stay PENDING");
                CampaignStatus::Failed
            }
            Err(e) => {
                error!("Campaign {campaign_id} failed: {e}");
                CampaignStatus::Failed
            }
        };

        self.store
            .finish_campaign(campaign_id, status, Utc::now())
            .await?;
        info!(
            "Campaign {campaign_id} finished as {status}; this run sent={}, failed={}",
            tally.sent, tally.failed
        );
        outcome.map(|_| true)
    }

    /// Ok(true) when every pending log was processed, Ok(false) when shutdown
    /// cut the run short.
    async fn run_claimed(
        &self,
        campaign_id: Uuid,
        tenant_id: Uuid,
        tally: &mut SendTally,
    ) -> Result<bool, AppError> {
        let campaign = self.get(campaign_id, tenant_id).await?;
        let ctx = self.prepare_send(&campaign).await?;

        if self.store.count_logs(campaign_id).await? == 0 {
            let matches = self
                .store
                .list_matches(campaign.cv_id, campaign.min_match_score, None)
                .await?;
            let seeded = self.seed_logs(&campaign, &matches).await?;
            info!(
                "Campaign {campaign_id} had no logs; seeded {} at execution",
                seeded.len()
            );
        }

        let pending: Vec<EmailLogRow> = self
            .store
            .list_logs(campaign_id, tenant_id)
            .await?
            .into_iter()
            .filter(|l| l.status == LogStatus::Pending)
            .collect();
        debug!("Campaign {campaign_id}: {} pending logs", pending.len());

        let rate_limit = self.email.rate_limit_per_minute.max(1) as usize;
        let batch_size = self.email.batch_size.max(1) as usize;
        let mut window_start = Instant::now();
        let mut sent_in_window = 0usize;
        let mut processed = 0usize;

        for log in &pending {
            if self.shutdown.is_triggered() {
                return Ok(false);
            }
            if sent_in_window >= rate_limit {
                let wait = RATE_WINDOW.saturating_sub(window_start.elapsed());
                if !wait.is_zero() {
                    debug!(
                        "Rate limit of {rate_limit}/min reached; waiting {}ms",
                        wait.as_millis()
                    );
                    if !self.shutdown.sleep(wait).await {
                        return Ok(false);
                    }
                }
                window_start = Instant::now();
                sent_in_window = 0;
            }

            match self.deliver(&ctx, log.id).await? {
                Delivery::Sent => {
                    tally.sent += 1;
                    sent_in_window += 1;
                }
                Delivery::Failed => {
                    tally.failed += 1;
                    sent_in_window += 1;
                }
                Delivery::Blacklisted | Delivery::Undrafted => tally.failed += 1,
                Delivery::Skipped => continue,
            }

            processed += 1;
            if processed % batch_size == 0 {
                self.store.refresh_campaign_counters(campaign_id).await?;
                debug!(
                    "Campaign {campaign_id} progress: sent={}, failed={}",
                    tally.sent, tally.failed
                );
            }
        }

        Ok(true)
    }

    async fn prepare_send(&self, campaign: &CampaignRow) -> Result<SendContext, AppError> {
        let account = self
            .store
            .get_smtp_account(campaign.tenant_id)
            .await?
            .filter(|a| a.status == SmtpStatus::Active)
            .ok_or_else(|| {
                AppError::Validation("No active SMTP account configured for this tenant".to_string())
            })?;
        let cv = self
            .store
            .get_cv(campaign.cv_id, campaign.tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("CV {} not found", campaign.cv_id)))?;
        let bytes = self.blobs.retrieve(&cv.stored_path).await?;

        let transport = self.senders.get_or_create(&account).map_err(|e| {
            error!("Mail sender for SMTP account {} unavailable: {e}", account.id);
            e.to_string()
        });

        Ok(SendContext {
            tenant_id: campaign.tenant_id,
            account,
            transport,
            attachment: MailAttachment {
                filename: cv.original_name.clone(),
                content_type: cv.mime_type.clone(),
                bytes,
            },
            student_keywords: self.student_keywords(cv.id).await?,
        })
    }

    /// Blacklist check, body resolution, then the retrying send. Works from
    /// the log as stored now, so edits made while the run waited are honored.
    async fn deliver(&self, ctx: &SendContext, log_id: Uuid) -> Result<Delivery, AppError> {
        let Some(log) = self.store.get_log(log_id, ctx.tenant_id).await? else {
            warn!("Email log {log_id} disappeared before sending");
            return Ok(Delivery::Skipped);
        };
        if !matches!(log.status, LogStatus::Pending | LogStatus::Failed) {
            debug!("Email log {log_id} is {}; skipping", log.status);
            return Ok(Delivery::Skipped);
        }

        if self
            .store
            .is_blacklisted(ctx.tenant_id, &log.recipient_email)
            .await?
        {
            info!("Recipient {} is blacklisted; skipping", log.recipient_email);
            self.store
                .mark_log_failed(log.id, LogStatus::Blacklisted, "Recipient is blacklisted", 0)
                .await?;
            return Ok(Delivery::Blacklisted);
        }

        if is_placeholder(&log.body) {
            match self.draft_options(&ctx.student_keywords, &log).await {
                Ok(options) => match options.into_iter().find(|b| !b.trim().is_empty()) {
                    Some(body) => {
                        self.store
                            .update_log_body(log.id, &body, None, BodyOrigin::Ai)
                            .await?;
                    }
                    None => {
                        return self
                            .undrafted(&log, "Draft generation returned an empty body")
                            .await;
                    }
                },
                Err(e) => {
                    return self
                        .undrafted(&log, &format!("Draft generation failed: {e}"))
                        .await;
                }
            }
        }

        self.send_one(ctx, log.id).await
    }

    async fn undrafted(&self, log: &EmailLogRow, reason: &str) -> Result<Delivery, AppError> {
        warn!("No body for email log {}: {reason}", log.id);
        self.store
            .mark_log_failed(log.id, LogStatus::Failed, reason, 0)
            .await?;
        Ok(Delivery::Undrafted)
    }

    /// Claims the log and sends the claimed row. Transient failures are
    /// retried up to `retry_attempts` times in total, waiting
    /// `retry_delay_ms * attempt` after each; permanent ones fail at once.
    /// `retry_count` ends as attempts - 1.
    async fn send_one(&self, ctx: &SendContext, log_id: Uuid) -> Result<Delivery, AppError> {
        let Some(log) = self.store.mark_log_sending(log_id).await? else {
            warn!("Email log {log_id} is already being handled; skipping");
            return Ok(Delivery::Skipped);
        };

        let transport = match &ctx.transport {
            Ok(transport) => transport,
            Err(message) => {
                self.store
                    .mark_log_failed(log.id, LogStatus::Failed, message, 0)
                    .await?;
                return Ok(Delivery::Failed);
            }
        };

        let email = OutgoingEmail {
            from_email: ctx.account.email.clone(),
            from_name: ctx.account.from_name.clone(),
            to: log.recipient_email.clone(),
            subject: log.subject.clone(),
            body: log.body.clone(),
            attachment: Some(ctx.attachment.clone()),
        };

        let max_attempts = self.email.retry_attempts.max(1);
        let base_delay = Duration::from_millis(self.email.retry_delay_ms);
        let mut attempt = 0u32;
        let mut last_error = String::new();

        while attempt < max_attempts {
            attempt += 1;
            match transport.send(&email).await {
                Ok(()) => {
                    self.store
                        .mark_log_sent(log.id, (attempt - 1) as i32, Utc::now())
                        .await?;
                    debug!("Email log {} sent to {}", log.id, log.recipient_email);
                    return Ok(Delivery::Sent);
                }
                Err(e) => {
                    warn!(
                        "Send attempt {attempt}/{max_attempts} to {} failed: {e}",
                        log.recipient_email
                    );
                    last_error = e.to_string();
                    if e.is_permanent() {
                        break;
                    }
                    if attempt < max_attempts && !self.shutdown.sleep(base_delay * attempt).await {
                        break;
                    }
                }
            }
        }

        self.store
            .mark_log_failed(log.id, LogStatus::Failed, &last_error, (attempt - 1) as i32)
            .await?;
        error!(
            "Email log {} to {} failed after {attempt} attempts",
            log.id, log.recipient_email
        );
        Ok(Delivery::Failed)
    }

    /// Sends one PENDING or FAILED log right away, outside any campaign run.
    pub async fn send_log(&self, log_id: Uuid, tenant_id: Uuid) -> Result<EmailLogRow, AppError> {
        let log = self.log(log_id, tenant_id).await?;
        if !matches!(log.status, LogStatus::Pending | LogStatus::Failed) {
            return Err(AppError::Conflict(format!(
                "Email log {log_id} is {} and cannot be sent again",
                log.status
            )));
        }
        let campaign = self.get(log.campaign_id, tenant_id).await?;
        let ctx = self.prepare_send(&campaign).await?;

        let delivery = self.deliver(&ctx, log.id).await?;
        self.store.refresh_campaign_counters(campaign.id).await?;
        info!("Individual send of email log {log_id}: {delivery:?}");
        self.log(log_id, tenant_id).await
    }
}
