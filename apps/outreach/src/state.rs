use std::sync::Arc;

use crate::campaign::service::CampaignService;
use crate::config::Config;
use crate::cv::service::CvService;
use crate::mail::smtp_accounts::SmtpAccountService;
use crate::matching::engine::MatchingService;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub cvs: Arc<CvService>,
    pub matching: Arc<MatchingService>,
    pub campaigns: Arc<CampaignService>,
    pub smtp: Arc<SmtpAccountService>,
}
