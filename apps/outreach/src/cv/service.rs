use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::CvSettings;
use crate::cv::extractor::TextExtractor;
use crate::cv::keywords::build_keyword_rows;
use crate::dispatch::Dispatcher;
use crate::errors::AppError;
use crate::llm_client::ChatModel;
use crate::matching::engine::MatchingService;
use crate::models::campaign::CampaignStatus;
use crate::models::cv::{CvKeywordRow, CvRow, NewCv, NewCvKeyword, ParsingStatus};
use crate::storage::BlobStore;
use crate::store::Store;

/// An upload as received at the edge.
#[derive(Debug, Clone)]
pub struct CvUpload {
    pub tenant_id: Uuid,
    pub uploaded_by: Option<Uuid>,
    pub original_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// CV intake and the asynchronous parse stage that feeds matching.
pub struct CvService {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<dyn TextExtractor>,
    llm: Arc<dyn ChatModel>,
    matching: Arc<MatchingService>,
    dispatcher: Dispatcher,
    settings: CvSettings,
}

impl CvService {
    pub fn new(
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<dyn TextExtractor>,
        llm: Arc<dyn ChatModel>,
        matching: Arc<MatchingService>,
        dispatcher: Dispatcher,
        settings: CvSettings,
    ) -> Self {
        Self {
            store,
            blobs,
            extractor,
            llm,
            matching,
            dispatcher,
            settings,
        }
    }

    /// Validates and stores the file, records a PENDING CV and queues the
    /// parse once the row exists.
    pub async fn upload(self: &Arc<Self>, upload: CvUpload) -> Result<CvRow, AppError> {
        if upload.bytes.is_empty() {
            return Err(AppError::Validation("File is empty".to_string()));
        }
        let mime_type = upload.mime_type.trim().to_ascii_lowercase();
        if !self.settings.is_allowed(&mime_type) {
            return Err(AppError::Validation(format!(
                "File type not allowed: {}",
                upload.mime_type
            )));
        }
        if upload.bytes.len() as u64 > self.settings.max_size_bytes() {
            return Err(AppError::Validation(format!(
                "File exceeds the maximum size of {} MB",
                self.settings.max_size_mb
            )));
        }

        let stored_path = self
            .blobs
            .store(upload.tenant_id, &upload.original_name, &upload.bytes)
            .await?;

        let inserted = self
            .store
            .insert_cv(NewCv {
                tenant_id: upload.tenant_id,
                uploaded_by: upload.uploaded_by,
                original_name: upload.original_name.clone(),
                stored_path: stored_path.clone(),
                size_bytes: upload.bytes.len() as i64,
                mime_type,
            })
            .await;
        let cv = match inserted {
            Ok(cv) => cv,
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&stored_path).await {
                    warn!("Could not remove orphaned upload {stored_path}: {cleanup}");
                }
                return Err(e.into());
            }
        };

        info!(
            "CV {} uploaded for tenant {} ({} bytes)",
            cv.id, cv.tenant_id, cv.size_bytes
        );
        if self.store.try_begin_parse(cv.id, cv.tenant_id).await? {
            self.dispatch_parse(cv.id, cv.tenant_id);
        }
        Ok(cv)
    }

    /// Re-queues a parse. Rejected while one is already running: the CV is
    /// claimed IN_PROGRESS before the task is queued, so of two concurrent
    /// requests only one gets through.
    pub async fn request_parse(self: &Arc<Self>, cv_id: Uuid, tenant_id: Uuid) -> Result<CvRow, AppError> {
        self.get(cv_id, tenant_id).await?;
        if !self.store.try_begin_parse(cv_id, tenant_id).await? {
            return Err(AppError::Conflict(format!(
                "CV {cv_id} is already being parsed"
            )));
        }
        self.dispatch_parse(cv_id, tenant_id);
        self.get(cv_id, tenant_id).await
    }

    fn dispatch_parse(self: &Arc<Self>, cv_id: Uuid, tenant_id: Uuid) {
        let this = Arc::clone(self);
        self.dispatcher.spawn("parse", async move {
            this.parse(cv_id, tenant_id).await;
        });
    }

    /// Extract, keyword, then COMPLETED and matching; any failure leaves the
    /// CV FAILED. The caller has already claimed the CV IN_PROGRESS. Returns
    /// the final status.
    pub async fn parse(&self, cv_id: Uuid, tenant_id: Uuid) -> Option<ParsingStatus> {
        let cv = match self.store.get_cv(cv_id, tenant_id).await {
            Ok(Some(cv)) => cv,
            Ok(None) => {
                warn!("CV {cv_id} disappeared before parsing");
                return None;
            }
            Err(e) => {
                error!("Could not load CV {cv_id} for parsing: {e}");
                return None;
            }
        };
        info!("Parsing CV {cv_id} ({})", cv.original_name);

        let outcome = match self.extract_keywords(&cv).await {
            Ok(keywords) => self
                .store
                .replace_cv_keywords(cv.id, cv.tenant_id, &keywords)
                .await
                .map(|_| keywords.len())
                .map_err(AppError::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(count) => {
                if let Err(e) = self
                    .store
                    .set_cv_status(cv_id, ParsingStatus::Completed, Some(Utc::now()))
                    .await
                {
                    error!("Could not mark CV {cv_id} completed: {e}");
                    return None;
                }
                info!("CV {cv_id} parsed: {count} keywords");
                self.matching.dispatch_compute(cv_id, tenant_id);
                Some(ParsingStatus::Completed)
            }
            Err(e) => {
                error!("Parsing CV {cv_id} failed: {e}");
                if let Err(e) = self
                    .store
                    .set_cv_status(cv_id, ParsingStatus::Failed, None)
                    .await
                {
                    error!("Could not mark CV {cv_id} failed: {e}");
                }
                Some(ParsingStatus::Failed)
            }
        }
    }

    async fn extract_keywords(&self, cv: &CvRow) -> Result<Vec<NewCvKeyword>, AppError> {
        let bytes = self.blobs.retrieve(&cv.stored_path).await?;

        let extractor = Arc::clone(&self.extractor);
        let mime_type = cv.mime_type.clone();
        let text = tokio::task::spawn_blocking(move || extractor.extract(&bytes, &mime_type))
            .await
            .map_err(|e| anyhow::anyhow!("text extraction task failed: {e}"))??;

        if text.trim().is_empty() {
            warn!("No text extracted from CV {}; storing no keywords", cv.id);
            return Ok(Vec::new());
        }

        let raw = self.llm.extract_keywords(&text).await?;
        Ok(build_keyword_rows(&raw))
    }

    // ── Reads ──────────────────────────────────────────────────────────────

    pub async fn get(&self, cv_id: Uuid, tenant_id: Uuid) -> Result<CvRow, AppError> {
        self.store
            .get_cv(cv_id, tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("CV {cv_id} not found")))
    }

    pub async fn list(&self, tenant_id: Uuid) -> Result<Vec<CvRow>, AppError> {
        Ok(self.store.list_cvs(tenant_id).await?)
    }

    pub async fn keywords(&self, cv_id: Uuid, tenant_id: Uuid) -> Result<Vec<CvKeywordRow>, AppError> {
        self.get(cv_id, tenant_id).await?;
        Ok(self.store.list_cv_keywords(cv_id).await?)
    }

    /// Removes the CV with everything it owns, then its blob (best effort).
    pub async fn delete(&self, cv_id: Uuid, tenant_id: Uuid) -> Result<(), AppError> {
        let cv = self.get(cv_id, tenant_id).await?;
        let running = self
            .store
            .list_campaigns_for_cv(cv_id)
            .await?
            .iter()
            .any(|c| c.status == CampaignStatus::InProgress);
        if running {
            return Err(AppError::Conflict(format!(
                "CV {cv_id} has a campaign in progress"
            )));
        }

        if !self.store.delete_cv(cv_id, tenant_id).await? {
            return Err(AppError::NotFound(format!("CV {cv_id} not found")));
        }
        if let Err(e) = self.blobs.delete(&cv.stored_path).await {
            warn!("CV {cv_id} deleted but its file could not be removed: {e}");
        }
        info!("CV {cv_id} deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PDF_MIME;
    use crate::store::memory::professor;
    use crate::testkit::{completed_cv, Harness};
    use std::sync::atomic::Ordering;

    fn pdf_upload(h: &Harness, bytes: &[u8]) -> CvUpload {
        CvUpload {
            tenant_id: h.tenant_id,
            uploaded_by: Some(Uuid::new_v4()),
            original_name: "resume.PDF".to_string(),
            mime_type: PDF_MIME.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_upload_parse_completes_with_ranked_keywords() {
        let h = Harness::new().await;
        h.extractor
            .set_text("Experience with transformer, pytorch, reinforcement learning");

        let cv = h.cvs.upload(pdf_upload(&h, &vec![7u8; 20 * 1024])).await.unwrap();
        assert_eq!(cv.parsing_status, ParsingStatus::Pending);
        assert!(cv.stored_path.starts_with(&h.tenant_id.to_string()));
        assert!(cv.stored_path.ends_with(".pdf"));
        h.dispatcher.wait_idle().await;

        let cv = h.cvs.get(cv.id, h.tenant_id).await.unwrap();
        assert_eq!(cv.parsing_status, ParsingStatus::Completed);
        assert!(cv.parsed_at.is_some());

        let keywords = h.cvs.keywords(cv.id, h.tenant_id).await.unwrap();
        let weights: Vec<f64> = keywords.iter().map(|k| k.weight).collect();
        assert_eq!(weights, vec![1.0, 0.55, 0.1]);
        assert_eq!(keywords[0].normalized, "transformer");
    }

    #[tokio::test]
    async fn test_parse_feeds_matching() {
        let h = Harness::new().await;
        let p1 = professor("Ada", "Lovelace", "Transformer architectures for NLP", "");
        h.store.add_professor(p1.clone());
        h.store.add_professor(professor("Osborne", "Reynolds", "Fluid dynamics", ""));
        h.extractor.set_text("transformer, pytorch, reinforcement learning");

        h.cvs.upload(pdf_upload(&h, b"%PDF-1.4")).await.unwrap();
        h.dispatcher.wait_idle().await;

        let matches = h.store.all_matches();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].professor_id, p1.id);
        assert_eq!(matches[0].score, 0.606061);
    }

    #[tokio::test]
    async fn test_blank_text_completes_without_model_call() {
        let h = Harness::new().await;
        h.extractor.set_text("   \n ");

        let cv = h.cvs.upload(pdf_upload(&h, b"%PDF-1.4")).await.unwrap();
        h.dispatcher.wait_idle().await;

        let cv = h.cvs.get(cv.id, h.tenant_id).await.unwrap();
        assert_eq!(cv.parsing_status, ParsingStatus::Completed);
        assert!(h.cvs.keywords(cv.id, h.tenant_id).await.unwrap().is_empty());
        assert_eq!(h.llm.keyword_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_failure_marks_cv_failed() {
        let h = Harness::new().await;
        h.extractor.set_text("some text");
        *h.llm.keyword_reply.lock().unwrap() = None;

        let cv = h.cvs.upload(pdf_upload(&h, b"%PDF-1.4")).await.unwrap();
        h.dispatcher.wait_idle().await;

        let cv = h.cvs.get(cv.id, h.tenant_id).await.unwrap();
        assert_eq!(cv.parsing_status, ParsingStatus::Failed);
        assert!(cv.parsed_at.is_none());
        assert!(h.store.all_matches().is_empty());
    }

    #[tokio::test]
    async fn test_extraction_failure_keeps_previous_keywords() {
        let h = Harness::new().await;
        let cv = completed_cv(&h, &[("transformer", 1.0)]).await;
        h.extractor.fail();

        let status = h.cvs.parse(cv.id, cv.tenant_id).await;
        assert_eq!(status, Some(ParsingStatus::Failed));
        assert_eq!(h.cvs.keywords(cv.id, h.tenant_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_validation() {
        let h = Harness::new().await;
        assert!(matches!(
            h.cvs.upload(pdf_upload(&h, b"")).await,
            Err(AppError::Validation(_))
        ));

        let mut doc = pdf_upload(&h, b"x");
        doc.mime_type = "application/msword".to_string();
        assert!(matches!(h.cvs.upload(doc).await, Err(AppError::Validation(_))));

        let too_big = vec![0u8; (10 * 1024 * 1024) + 1];
        assert!(matches!(
            h.cvs.upload(pdf_upload(&h, &too_big)).await,
            Err(AppError::Validation(_))
        ));
        assert!(h.cvs.list(h.tenant_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_parse_request_rejected_while_in_progress() {
        let h = Harness::new().await;
        let cv = h.pending_cv().await;
        h.store
            .set_cv_status(cv.id, ParsingStatus::InProgress, None)
            .await
            .unwrap();
        assert!(matches!(
            h.cvs.request_parse(cv.id, h.tenant_id).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_back_to_back_parse_requests_start_one_parse() {
        let h = Harness::new().await;
        h.extractor.set_text("transformer, pytorch");
        let cv = h.pending_cv().await;

        let first = h.cvs.request_parse(cv.id, h.tenant_id).await;
        let second = h.cvs.request_parse(cv.id, h.tenant_id).await;
        assert_eq!(first.unwrap().parsing_status, ParsingStatus::InProgress);
        assert!(matches!(second, Err(AppError::Conflict(_))));

        h.dispatcher.wait_idle().await;
        assert_eq!(h.llm.keyword_calls.load(Ordering::SeqCst), 1);
        let cv = h.cvs.get(cv.id, h.tenant_id).await.unwrap();
        assert_eq!(cv.parsing_status, ParsingStatus::Completed);

        h.cvs.request_parse(cv.id, h.tenant_id).await.unwrap();
        h.dispatcher.wait_idle().await;
        assert_eq!(h.llm.keyword_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_delete_removes_cv_blob_and_matches() {
        let h = Harness::new().await;
        h.store.add_professor(professor("Ada", "Lovelace", "transformer", ""));
        let cv = completed_cv(&h, &[("transformer", 1.0)]).await;
        h.matching.compute(cv.id, cv.tenant_id).await.unwrap();
        assert!(h.blobs.contains(&cv.stored_path));

        h.cvs.delete(cv.id, h.tenant_id).await.unwrap();

        assert!(!h.blobs.contains(&cv.stored_path));
        assert!(h.store.all_matches().is_empty());
        assert!(matches!(
            h.cvs.get(cv.id, h.tenant_id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_rejected_while_campaign_runs() {
        let h = Harness::new().await;
        let cv = completed_cv(&h, &[("transformer", 1.0)]).await;
        let campaign = h
            .campaigns
            .create(
                h.tenant_id,
                crate::campaign::service::CreateCampaignRequest {
                    cv_id: cv.id,
                    name: "Running".to_string(),
                    subject: "Hi".to_string(),
                    body_template: "Hello".to_string(),
                    min_match_score: 0.5,
                    match_ids: None,
                },
            )
            .await
            .unwrap();
        h.store.claim_campaign(campaign.id, h.tenant_id, Utc::now()).await.unwrap();

        assert!(matches!(
            h.cvs.delete(cv.id, h.tenant_id).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_other_tenant_cannot_read_cv() {
        let h = Harness::new().await;
        let cv = h.pending_cv().await;
        assert!(matches!(
            h.cvs.get(cv.id, Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
