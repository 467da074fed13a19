mod campaign;
mod config;
mod crypto;
mod cv;
mod db;
mod dispatch;
mod errors;
mod llm_client;
mod mail;
mod matching;
mod models;
mod routes;
mod state;
mod storage;
mod store;
#[cfg(test)]
mod testkit;

use anyhow::{Context, Result};
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::campaign::scheduler::Scheduler;
use crate::campaign::service::CampaignService;
use crate::config::{Config, StorageBackend};
use crate::crypto::EncryptionService;
use crate::cv::extractor::DocumentTextExtractor;
use crate::cv::service::CvService;
use crate::db::{create_pool, run_migrations};
use crate::dispatch::{Dispatcher, ShutdownSignal};
use crate::llm_client::LlmClient;
use crate::mail::cache::MailSenderCache;
use crate::mail::sender::LettreSenderFactory;
use crate::mail::smtp_accounts::SmtpAccountService;
use crate::matching::engine::MatchingService;
use crate::matching::scoring::scorer_for;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::s3::S3BlobStore;
use crate::storage::{BlobStore, LocalBlobStore};
use crate::store::{PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting outreach v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;
    let store: Arc<dyn Store> = Arc::new(PgStore::new(db));

    let blobs = build_blob_store(&config).await?;

    let llm = Arc::new(LlmClient::new(&config.llm));
    info!("LLM client initialized (model: {})", llm.model());

    let crypto = Arc::new(EncryptionService::new(&config.encryption_key));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown = ShutdownSignal::new(shutdown_rx);
    let dispatcher = Dispatcher::new();

    let senders = Arc::new(MailSenderCache::new(
        Arc::new(LettreSenderFactory),
        crypto.clone(),
    ));
    let smtp = Arc::new(SmtpAccountService::new(store.clone(), crypto).with_listener(senders.clone()));

    let campaigns = Arc::new(CampaignService::new(
        store.clone(),
        llm.clone(),
        blobs.clone(),
        senders,
        dispatcher.clone(),
        config.email.clone(),
        shutdown.clone(),
    ));

    let mut matching = MatchingService::new(
        store.clone(),
        scorer_for(config.matching_strategy),
        dispatcher.clone(),
    );
    if config.campaign.auto_create {
        info!(
            "Auto-campaigns enabled (threshold {})",
            config.campaign.auto_threshold
        );
        matching = matching.with_auto_campaigns(campaigns.clone(), config.campaign.auto_threshold);
    }
    let matching = Arc::new(matching);
    info!("Matching strategy: {:?}", config.matching_strategy);

    let cvs = Arc::new(CvService::new(
        store.clone(),
        blobs,
        Arc::new(DocumentTextExtractor),
        llm,
        matching.clone(),
        dispatcher.clone(),
        config.cv.clone(),
    ));

    let scheduler = Scheduler::new(
        store,
        campaigns.clone(),
        Duration::from_secs(config.scheduler_interval_secs),
    );
    let scheduler_task = tokio::spawn(scheduler.run(shutdown.clone()));

    // Build app state
    let state = AppState {
        config: config.clone(),
        cvs,
        matching,
        campaigns,
        smtp,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Could not listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Err(e) = scheduler_task.await {
        warn!("Scheduler task ended abnormally: {e}");
    }
    info!(
        "Waiting for {} background task(s) to finish",
        dispatcher.in_flight()
    );
    dispatcher.wait_idle().await;
    info!("Shutdown complete");

    Ok(())
}

/// Local filesystem by default; S3/MinIO when `STORAGE_BACKEND=s3`.
async fn build_blob_store(config: &Config) -> Result<Arc<dyn BlobStore>> {
    match config.storage.backend {
        StorageBackend::Local => {
            let store = LocalBlobStore::new(&config.storage.base_path).await?;
            info!("Local blob store at {}", config.storage.base_path);
            Ok(Arc::new(store))
        }
        StorageBackend::S3 => {
            let bucket = config
                .storage
                .s3_bucket
                .clone()
                .context("S3_BUCKET is required when STORAGE_BACKEND=s3")?;
            let client = build_s3_client(config).await;
            info!("S3 blob store initialized (bucket: {bucket})");
            Ok(Arc::new(S3BlobStore::new(client, bucket)))
        }
    }
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"));

    if let (Some(key_id), Some(secret)) = (
        &config.storage.aws_access_key_id,
        &config.storage.aws_secret_access_key,
    ) {
        loader = loader.credentials_provider(Credentials::new(
            key_id,
            secret,
            None,
            None,
            "outreach-static",
        ));
    }
    if let Some(endpoint) = &config.storage.s3_endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    let s3_config = loader.load().await;
    aws_sdk_s3::Client::new(&s3_config)
}
