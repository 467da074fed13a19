//! Wiring for pipeline tests: every service over in-memory stores, a
//! scripted model and a recording mail transport.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use crate::campaign::service::CampaignService;
use crate::config::{CvSettings, EmailSettings, PDF_MIME};
use crate::crypto::EncryptionService;
use crate::cv::extractor::{ExtractError, TextExtractor};
use crate::cv::service::CvService;
use crate::dispatch::{Dispatcher, ShutdownSignal};
use crate::llm_client::fake::ScriptedModel;
use crate::mail::cache::MailSenderCache;
use crate::mail::fake::{FakeSenderFactory, RecordingTransport};
use crate::mail::smtp_accounts::{SmtpAccountRequest, SmtpAccountService};
use crate::matching::engine::MatchingService;
use crate::matching::scoring::{scorer_for, MatchStrategy};
use crate::models::cv::{CvRow, NewCvKeyword, ParsingStatus};
use crate::models::smtp::SmtpAccountRow;
use crate::storage::memory::MemoryBlobStore;
use crate::store::memory::MemoryStore;
use crate::store::Store;

pub const TEST_KEY: &str = "test-encryption-key";
pub const CV_BYTES: &[u8] = b"%PDF-1.4 test";

/// Returns whatever text it was last given, or a PDF error after `fail`.
pub struct FixedTextExtractor {
    text: Mutex<Option<String>>,
}

impl FixedTextExtractor {
    pub fn set_text(&self, text: &str) {
        *self.text.lock().unwrap() = Some(text.to_string());
    }

    pub fn fail(&self) {
        *self.text.lock().unwrap() = None;
    }
}

impl TextExtractor for FixedTextExtractor {
    fn extract(&self, _bytes: &[u8], _mime_type: &str) -> Result<String, ExtractError> {
        self.text
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ExtractError::Pdf("corrupt document".to_string()))
    }
}

pub struct Harness {
    pub tenant_id: Uuid,
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub llm: Arc<ScriptedModel>,
    pub extractor: Arc<FixedTextExtractor>,
    pub transport: Arc<RecordingTransport>,
    pub dispatcher: Dispatcher,
    pub smtp: Arc<SmtpAccountService>,
    pub campaigns: Arc<CampaignService>,
    pub matching: Arc<MatchingService>,
    pub cvs: Arc<CvService>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(EmailSettings::default(), ShutdownSignal::never()).await
    }

    pub async fn with_email(email: EmailSettings) -> Self {
        Self::build(email, ShutdownSignal::never()).await
    }

    pub async fn build(email: EmailSettings, shutdown: ShutdownSignal) -> Self {
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(MemoryBlobStore::default());
        let llm = Arc::new(ScriptedModel::new(
            "transformer, pytorch, reinforcement learning",
            "Dear Professor, first draft.###END_OF_EMAIL###Dear Professor, second draft.",
        ));
        let extractor = Arc::new(FixedTextExtractor {
            text: Mutex::new(Some("transformer pytorch".to_string())),
        });
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = Dispatcher::new();
        let crypto = Arc::new(EncryptionService::new(TEST_KEY));

        let senders = Arc::new(MailSenderCache::new(
            Arc::new(FakeSenderFactory::new(transport.clone())),
            crypto.clone(),
        ));
        let smtp = Arc::new(
            SmtpAccountService::new(store.clone(), crypto).with_listener(senders.clone()),
        );
        let campaigns = Arc::new(CampaignService::new(
            store.clone(),
            llm.clone(),
            blobs.clone(),
            senders,
            dispatcher.clone(),
            email,
            shutdown,
        ));
        let matching = Arc::new(MatchingService::new(
            store.clone(),
            scorer_for(MatchStrategy::CombinedText),
            dispatcher.clone(),
        ));
        let cvs = Arc::new(CvService::new(
            store.clone(),
            blobs.clone(),
            extractor.clone(),
            llm.clone(),
            matching.clone(),
            dispatcher.clone(),
            CvSettings::default(),
        ));

        Self {
            tenant_id: Uuid::new_v4(),
            store,
            blobs,
            llm,
            extractor,
            transport,
            dispatcher,
            smtp,
            campaigns,
            matching,
            cvs,
        }
    }

    pub async fn configure_smtp(&self) -> SmtpAccountRow {
        self.smtp
            .upsert(
                self.tenant_id,
                SmtpAccountRequest {
                    email: "student@lab.example".to_string(),
                    host: "smtp.lab.example".to_string(),
                    port: 587,
                    username: "student".to_string(),
                    password: "app-password".to_string(),
                    use_tls: true,
                    use_ssl: false,
                    from_name: Some("Sam Student".to_string()),
                },
            )
            .await
            .unwrap()
    }

    /// A stored CV that has not been parsed yet.
    pub async fn pending_cv(&self) -> CvRow {
        let cv = cv_row(self, ParsingStatus::Pending);
        self.blobs.put(&cv.stored_path, CV_BYTES);
        self.store.put_cv(cv.clone());
        cv
    }
}

fn cv_row(h: &Harness, status: ParsingStatus) -> CvRow {
    let id = Uuid::new_v4();
    CvRow {
        id,
        tenant_id: h.tenant_id,
        uploaded_by: None,
        original_name: "cv.pdf".to_string(),
        stored_path: format!("{}/{id}.pdf", h.tenant_id),
        size_bytes: CV_BYTES.len() as i64,
        mime_type: PDF_MIME.to_string(),
        parsing_status: status,
        uploaded_at: Utc::now(),
        parsed_at: (status == ParsingStatus::Completed).then(Utc::now),
    }
}

/// A parsed CV carrying exactly `keywords` (normalized form, weight).
pub async fn completed_cv(h: &Harness, keywords: &[(&str, f64)]) -> CvRow {
    let cv = cv_row(h, ParsingStatus::Completed);
    h.blobs.put(&cv.stored_path, CV_BYTES);
    h.store.put_cv(cv.clone());

    let rows: Vec<NewCvKeyword> = keywords
        .iter()
        .map(|(keyword, weight)| NewCvKeyword {
            keyword: keyword.to_string(),
            normalized: keyword.to_lowercase(),
            weight: *weight,
            frequency: 1,
        })
        .collect();
    h.store
        .replace_cv_keywords(cv.id, h.tenant_id, &rows)
        .await
        .unwrap();
    cv
}
