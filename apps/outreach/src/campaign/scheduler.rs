use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::campaign::service::CampaignService;
use crate::dispatch::ShutdownSignal;
use crate::errors::AppError;
use crate::store::Store;

/// Periodically starts SCHEDULED campaigns whose time has come. Starting a
/// campaign twice is harmless: execution claims it with a conditional update.
pub struct Scheduler {
    store: Arc<dyn Store>,
    campaigns: Arc<CampaignService>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(store: Arc<dyn Store>, campaigns: Arc<CampaignService>, interval: Duration) -> Self {
        Self {
            store,
            campaigns,
            interval,
        }
    }

    /// One pass: dispatches every due campaign and returns how many.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let due = self.store.due_campaigns(now).await?;
        for campaign in &due {
            info!(
                "Starting scheduled campaign {} (due {:?})",
                campaign.id, campaign.scheduled_at
            );
            self.campaigns.dispatch_execute(campaign.id, campaign.tenant_id);
        }
        if due.is_empty() {
            debug!("Scheduler tick: nothing due");
        }
        Ok(due.len())
    }

    pub async fn run(self, shutdown: ShutdownSignal) {
        info!("Campaign scheduler running every {}s", self.interval.as_secs());
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!("Scheduler tick failed: {e}");
                    }
                }
                _ = shutdown.triggered() => {
                    info!("Campaign scheduler stopped");
                    break;
                }
            }
        }
    }
}
