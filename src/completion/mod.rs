//! Delegated text completion for `gpt` mode.
//!
//! The compute server only sees [`CompletionService::complete`], which never
//! fails: a failed call is rendered into the returned text and travels back to
//! the client as a normal `result`.

mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use openai::OpenAiCompletion;

/// Prefix marking a completion result that describes a failure.
pub const FAILURE_PREFIX: &str = "[completion error]";

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-oss-20b:free";

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("no API key configured (set OPENROUTER_API_KEY)")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion API returned no choices")]
    EmptyResponse,
}

/// Text-generation collaborator.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Complete `prompt`. Failures are described in the returned string.
    async fn complete(&self, prompt: &str) -> String;
}

/// Render a failure the way clients receive it.
pub fn failure_text(error: &CompletionError) -> String {
    format!("{} {}", FAILURE_PREFIX, error)
}

/// Settings for the outbound completion API.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Stand-in used when no API key is available. Every call reports the
/// missing configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredCompletion;

#[async_trait]
impl CompletionService for UnconfiguredCompletion {
    async fn complete(&self, _prompt: &str) -> String {
        failure_text(&CompletionError::MissingApiKey)
    }
}

/// Build the completion service described by `config`.
pub fn from_config(config: &CompletionConfig) -> Arc<dyn CompletionService> {
    if config.api_key.is_none() {
        tracing::warn!("no completion API key configured; gpt requests will return an error result");
        return Arc::new(UnconfiguredCompletion);
    }
    match OpenAiCompletion::new(config.clone()) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            tracing::error!(error = %e, "failed to build completion client");
            Arc::new(UnconfiguredCompletion)
        }
    }
}
