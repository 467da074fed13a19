//! Chat-completion client shared by keyword extraction and email drafting.
//!
//! Services depend on the `ChatModel` trait. Production wires in `LlmClient`,
//! tests wire in a scripted model.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::LlmSettings;

pub mod prompts;

const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;

/// Separates alternative bodies in an email-generation response.
pub const EMAIL_DELIMITER: &str = "###END_OF_EMAIL###";
const MAX_EMAIL_OPTIONS: usize = 3;

static PREAMBLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)here are[^:]*:").unwrap());

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatResponse {
    /// Text of the first choice, if it has any.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// Inputs for one personalised outreach email.
#[derive(Debug, Clone)]
pub struct EmailContext {
    pub student_keywords: String,
    pub professor_name: String,
    pub university: String,
    pub matched_keywords: String,
    pub publications: Option<String>,
}

/// A chat-completion backend. The two pipeline operations are provided on
/// top of `complete`, so a backend only has to move text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError>;

    /// Ordered keyphrases as emitted by the model, preambles and fences
    /// removed. Normalization and dedupe happen in the CV pipeline.
    async fn extract_keywords(&self, cv_text: &str) -> Result<Vec<String>, LlmError> {
        let prompt = prompts::KEYWORD_EXTRACTION_PROMPT.replace("{cv_text}", cv_text);
        let text = self
            .complete(&prompt, prompts::KEYWORD_EXTRACTION_SYSTEM)
            .await?;
        let keywords = split_keyword_response(&text);
        info!("AI extracted {} candidate keywords", keywords.len());
        Ok(keywords)
    }

    /// One to three alternative email bodies, best first.
    async fn generate_email_options(&self, ctx: &EmailContext) -> Result<Vec<String>, LlmError> {
        debug!(
            "Generating outreach email options for professor: {}",
            ctx.professor_name
        );
        let prompt = prompts::build_email_prompt(ctx);
        let text = self
            .complete(&prompt, prompts::EMAIL_GENERATION_SYSTEM)
            .await?;
        split_email_options(&text)
    }
}

/// HTTP client for an OpenAI-compatible chat-completions endpoint
/// (OpenRouter by default). Bearer auth, retry with exponential backoff.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    model: String,
    url: String,
    backoff_base: Duration,
}

impl LlmClient {
    pub fn new(settings: &LlmSettings) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            url: settings.url.clone(),
            backoff_base: Duration::from_millis(1000),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Makes a raw call to the chat endpoint, returning the full response object.
    /// Retries on transport errors, 429 and 5xx with exponential backoff.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<ChatResponse, LlmError> {
        let request_body = ChatRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = self.backoff_base * (1 << (attempt - 1));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ProviderError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let chat_response: ChatResponse = response.json().await?;

            if let Some(usage) = &chat_response.usage {
                debug!(
                    "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
                    usage.prompt_tokens, usage.completion_tokens
                );
            }

            return Ok(chat_response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let response = self.call(prompt, system).await?;
        response
            .text()
            .map(str::to_string)
            .ok_or(LlmError::EmptyContent)
    }
}

/// Splits a comma-separated keyword answer. Drops "Here are ...:" preambles
/// and code fences; newlines count as separators.
pub fn split_keyword_response(text: &str) -> Vec<String> {
    let cleaned = PREAMBLE
        .replace_all(text, "")
        .replace("```", "")
        .replace('\n', ",");
    cleaned
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Splits an email-generation answer on the delimiter, keeping at most three
/// non-empty bodies.
pub fn split_email_options(text: &str) -> Result<Vec<String>, LlmError> {
    let options: Vec<String> = text
        .split(EMAIL_DELIMITER)
        .map(str::trim)
        .filter(|body| !body.is_empty())
        .take(MAX_EMAIL_OPTIONS)
        .map(str::to_string)
        .collect();
    if options.is_empty() {
        return Err(LlmError::EmptyContent);
    }
    Ok(options)
}
