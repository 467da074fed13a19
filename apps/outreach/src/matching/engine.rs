use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::campaign::service::CampaignService;
use crate::dispatch::Dispatcher;
use crate::errors::AppError;
use crate::matching::scoring::{CvKeywordSet, MatchScorer};
use crate::models::cv::{CvRow, ParsingStatus};
use crate::models::matching::{MatchResultRow, ScoredMatch};
use crate::store::Store;

/// Scores a parsed CV against every ACTIVE professor and persists the
/// overlapping pairs. Optionally seeds an automatic campaign afterwards.
pub struct MatchingService {
    store: Arc<dyn Store>,
    scorer: Arc<dyn MatchScorer>,
    dispatcher: Dispatcher,
    auto_campaigns: Option<(Arc<CampaignService>, f64)>,
}

impl MatchingService {
    pub fn new(store: Arc<dyn Store>, scorer: Arc<dyn MatchScorer>, dispatcher: Dispatcher) -> Self {
        Self {
            store,
            scorer,
            dispatcher,
            auto_campaigns: None,
        }
    }

    /// After each successful compute, create a draft campaign from the
    /// matches scoring at least `threshold`. Never executes it.
    pub fn with_auto_campaigns(mut self, campaigns: Arc<CampaignService>, threshold: f64) -> Self {
        self.auto_campaigns = Some((campaigns, threshold));
        self
    }

    /// Queues a compute. Failures are logged; the CV stays COMPLETED.
    pub fn dispatch_compute(self: &Arc<Self>, cv_id: Uuid, tenant_id: Uuid) {
        let this = Arc::clone(self);
        self.dispatcher.spawn("match", async move {
            if let Err(e) = this.compute(cv_id, tenant_id).await {
                error!("Match computation for CV {cv_id} failed: {e}");
            }
        });
    }

    /// POST .../matches/compute
    pub async fn request_compute(self: &Arc<Self>, cv_id: Uuid, tenant_id: Uuid) -> Result<(), AppError> {
        self.completed_cv(cv_id, tenant_id).await?;
        self.dispatch_compute(cv_id, tenant_id);
        Ok(())
    }

    /// Drops every stored match for the CV, then queues a fresh compute.
    pub async fn recompute(self: &Arc<Self>, cv_id: Uuid, tenant_id: Uuid) -> Result<(), AppError> {
        self.completed_cv(cv_id, tenant_id).await?;
        let removed = self.store.delete_matches(cv_id).await?;
        info!("Cleared {removed} match results for CV {cv_id} before recompute");
        self.dispatch_compute(cv_id, tenant_id);
        Ok(())
    }

    /// Returns the number of persisted matches. A CV that is missing or not
    /// COMPLETED is skipped without error.
    pub async fn compute(&self, cv_id: Uuid, tenant_id: Uuid) -> Result<usize, AppError> {
        let Some(cv) = self.store.get_cv(cv_id, tenant_id).await? else {
            warn!("Skipping match computation: CV {cv_id} no longer exists");
            return Ok(0);
        };
        if cv.parsing_status != ParsingStatus::Completed {
            warn!(
                "Skipping match computation: CV {cv_id} is {}",
                cv.parsing_status
            );
            return Ok(0);
        }

        let keywords = CvKeywordSet::from_rows(&self.store.list_cv_keywords(cv_id).await?);
        if keywords.is_empty() {
            info!("CV {cv_id} has no keywords; nothing to match");
            self.store
                .upsert_matches(cv.tenant_id, cv_id, &[], Utc::now())
                .await?;
            return Ok(0);
        }

        let professors = self.store.list_active_professors().await?;
        let professor_keywords = if self.scorer.needs_professor_keywords() {
            let ids: Vec<Uuid> = professors.iter().map(|p| p.id).collect();
            self.store.list_professor_keywords(&ids).await?
        } else {
            Vec::new()
        };

        let scored: Vec<ScoredMatch> = professors
            .iter()
            .filter_map(|p| self.scorer.score(&keywords, p, &professor_keywords))
            .collect();
        debug!(
            "Scored {} of {} professors for CV {cv_id} ({:?})",
            scored.len(),
            professors.len(),
            self.scorer.strategy()
        );

        self.store
            .upsert_matches(cv.tenant_id, cv_id, &scored, Utc::now())
            .await?;
        info!("Persisted {} match results for CV {cv_id}", scored.len());

        if let Some((campaigns, threshold)) = &self.auto_campaigns {
            if let Err(e) = campaigns.create_auto_campaign(&cv, *threshold).await {
                error!("Automatic campaign for CV {cv_id} failed: {e}");
            }
        }

        Ok(scored.len())
    }

    /// Matches for a tenant's CV, best first.
    pub async fn list(
        &self,
        cv_id: Uuid,
        tenant_id: Uuid,
        min_score: Option<f64>,
    ) -> Result<Vec<MatchResultRow>, AppError> {
        self.owned_cv(cv_id, tenant_id).await?;
        let min_score = min_score.unwrap_or(0.0);
        if !(0.0..=1.0).contains(&min_score) {
            return Err(AppError::Validation(
                "min_score must be within [0, 1]".to_string(),
            ));
        }
        Ok(self.store.list_matches(cv_id, min_score, None).await?)
    }

    async fn owned_cv(&self, cv_id: Uuid, tenant_id: Uuid) -> Result<CvRow, AppError> {
        self.store
            .get_cv(cv_id, tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("CV {cv_id} not found")))
    }

    async fn completed_cv(&self, cv_id: Uuid, tenant_id: Uuid) -> Result<CvRow, AppError> {
        let cv = self.owned_cv(cv_id, tenant_id).await?;
        if cv.parsing_status != ParsingStatus::Completed {
            return Err(AppError::Conflict(format!(
                "CV {cv_id} is {}; matches need a COMPLETED parse",
                cv.parsing_status
            )));
        }
        Ok(cv)
    }
}
