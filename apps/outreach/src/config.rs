use anyhow::{Context, Result};

use crate::matching::scoring::MatchStrategy;

pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const DEFAULT_LLM_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_LLM_MODEL: &str = "openai/gpt-4o-mini";

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    pub cv: CvSettings,
    pub storage: StorageSettings,
    pub email: EmailSettings,
    pub llm: LlmSettings,
    pub campaign: CampaignSettings,
    pub matching_strategy: MatchStrategy,
    pub encryption_key: String,
    pub scheduler_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct CvSettings {
    pub allowed_types: Vec<String>,
    pub max_size_mb: u64,
}

impl CvSettings {
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb * 1024 * 1024
    }

    pub fn is_allowed(&self, mime: &str) -> bool {
        let mime = mime.trim().to_ascii_lowercase();
        self.allowed_types.iter().any(|t| *t == mime)
    }
}

impl Default for CvSettings {
    fn default() -> Self {
        Self {
            allowed_types: vec![PDF_MIME.to_string(), DOCX_MIME.to_string()],
            max_size_mb: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    Local,
    S3,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub base_path: String,
    pub s3_bucket: Option<String>,
    pub s3_endpoint: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
}

/// Send-loop tuning for campaign execution.
#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub batch_size: u32,
    pub rate_limit_per_minute: u32,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            rate_limit_per_minute: 20,
            retry_attempts: 3,
            retry_delay_ms: 5000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub model: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct CampaignSettings {
    pub auto_create: bool,
    pub auto_threshold: f64,
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            auto_create: false,
            auto_threshold: 0.40,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. `from_env` passes the
    /// process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("Required environment variable '{key}' is not set"))
        };
        let or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let allowed_types = match lookup("CV_ALLOWED_TYPES") {
            Some(raw) => split_list(&raw),
            None => CvSettings::default().allowed_types,
        };

        let backend = match or("STORAGE_BACKEND", "local").to_ascii_lowercase().as_str() {
            "local" => StorageBackend::Local,
            "s3" => StorageBackend::S3,
            other => anyhow::bail!("STORAGE_BACKEND must be 'local' or 's3', got '{other}'"),
        };
        let storage = StorageSettings {
            s3_bucket: lookup("S3_BUCKET"),
            s3_endpoint: lookup("S3_ENDPOINT"),
            aws_access_key_id: lookup("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: lookup("AWS_SECRET_ACCESS_KEY"),
            base_path: or("STORAGE_BASE_PATH", "./uploads"),
            backend,
        };
        if storage.backend == StorageBackend::S3 && storage.s3_bucket.is_none() {
            anyhow::bail!("S3_BUCKET is required when STORAGE_BACKEND=s3");
        }

        let auto_threshold: f64 = parse_var(&lookup, "CAMPAIGN_AUTO_THRESHOLD", 0.40)?;
        if !(0.0..=1.0).contains(&auto_threshold) {
            anyhow::bail!("CAMPAIGN_AUTO_THRESHOLD must be within [0, 1]");
        }

        Ok(Config {
            database_url: require("DATABASE_URL")?,
            port: parse_var(&lookup, "PORT", 8080u16)?,
            rust_log: or("RUST_LOG", "info"),
            cv: CvSettings {
                allowed_types,
                max_size_mb: parse_var(&lookup, "CV_MAX_SIZE_MB", 10u64)?,
            },
            storage,
            email: EmailSettings {
                batch_size: parse_var(&lookup, "EMAIL_BATCH_SIZE", 10u32)?.max(1),
                rate_limit_per_minute: parse_var(&lookup, "EMAIL_RATE_LIMIT_PER_MINUTE", 20u32)?
                    .max(1),
                retry_attempts: parse_var(&lookup, "EMAIL_RETRY_ATTEMPTS", 3u32)?.max(1),
                retry_delay_ms: parse_var(&lookup, "EMAIL_RETRY_DELAY_MS", 5000u64)?,
            },
            llm: LlmSettings {
                api_key: require("LLM_API_KEY")?,
                model: or("LLM_MODEL", DEFAULT_LLM_MODEL),
                url: or("LLM_URL", DEFAULT_LLM_URL),
            },
            campaign: CampaignSettings {
                auto_create: parse_var(&lookup, "CAMPAIGN_AUTO_CREATE", false)?,
                auto_threshold,
            },
            matching_strategy: or("MATCHING_STRATEGY", "combined_text")
                .parse()
                .context("MATCHING_STRATEGY is invalid")?,
            encryption_key: or("ENCRYPTION_KEY", ""),
            scheduler_interval_secs: parse_var(&lookup, "SCHEDULER_INTERVAL_SECS", 60u64)?.max(1),
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} has invalid value '{raw}': {e}")),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
