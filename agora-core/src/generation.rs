//! Response generation for the Agora assistant
//!
//! Provides a `ResponseGenerator` trait with:
//! - **Gemini**: `generateContent` on the hosted Gemini API, one blocking call
//!   per request, no retry and no streaming
//! - **Fallback**: wraps any generator and turns every failure into a fixed
//!   apology so the chat endpoint always has something to answer with

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::GenerationConfig;
use crate::models::ConversationTurn;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Text returned to the user whenever the upstream model call fails.
pub const FALLBACK_REPLY: &str =
    "Sorry, I encountered an error while processing your request. Please try again later.";

// ============================================================================
// ResponseGenerator trait
// ============================================================================

/// Abstraction over hosted language models.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Produce a reply to `message` given the prior turns, oldest first.
    async fn generate(
        &self,
        message: &str,
        history: &[ConversationTurn],
    ) -> Result<String, GenerationError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Response blocked: {reason}")]
    Blocked { reason: String },

    #[error("Missing text in model response")]
    EmptyResponse,

    #[error("Missing API key")]
    MissingApiKey,
}

/// Fixed sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.8,
            top_k: 40,
            max_output_tokens: 1024,
        }
    }
}

impl From<&GenerationConfig> for SamplingParams {
    fn from(c: &GenerationConfig) -> Self {
        Self {
            temperature: c.temperature,
            top_p: c.top_p,
            top_k: c.top_k,
            max_output_tokens: c.max_output_tokens,
        }
    }
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: SamplingParams,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    code: u16,
    message: String,
}

// ============================================================================
// GeminiChatClient
// ============================================================================

/// Gemini chat client: calls `models/{model}:generateContent`.
///
/// Built once at startup and shared; holds no per-request state.
#[derive(Debug, Clone)]
pub struct GeminiChatClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    sampling: SamplingParams,
}

impl GeminiChatClient {
    /// Build a client from config, reading the key from `config.api_key_env`.
    ///
    /// A missing key is not fatal here: the server still starts and every
    /// call fails with `MissingApiKey`, which the fallback turns into an apology.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!(
                env = %config.api_key_env,
                "No model API key configured; assistant will answer with the fallback reply"
            );
        }
        Self::new(config, api_key)
    }

    pub fn new(config: &GenerationConfig, api_key: impl Into<String>) -> Result<Self, GenerationError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            sampling: SamplingParams::from(config),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(
        &self,
        message: &'a str,
        history: &'a [ConversationTurn],
    ) -> GeminiRequest<'a> {
        let mut contents: Vec<GeminiContent<'a>> = history
            .iter()
            .map(|turn| GeminiContent {
                role: turn.role.as_str(),
                parts: vec![GeminiPart { text: &turn.text }],
            })
            .collect();

        contents.push(GeminiContent {
            role: "user",
            parts: vec![GeminiPart { text: message }],
        });

        GeminiRequest {
            contents,
            generation_config: self.sampling,
        }
    }
}

#[async_trait]
impl ResponseGenerator for GeminiChatClient {
    async fn generate(
        &self,
        message: &str,
        history: &[ConversationTurn],
    ) -> Result<String, GenerationError> {
        if self.api_key.is_empty() {
            return Err(GenerationError::MissingApiKey);
        }

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let request = self.build_request(message, history);
        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(strip_url)?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let error_detail = serde_json::from_str::<GeminiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error);

            let (code, message) = error_detail
                .map(|e| (e.code, e.message))
                .unwrap_or((status.as_u16(), error_body));

            tracing::error!(code = code, message = %message, "Gemini API error");

            return Err(GenerationError::Api { code, message });
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(strip_url)?;
        extract_text(gemini_response)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// reqwest errors print the request URL; keep endpoint details out of logs.
fn strip_url(e: reqwest::Error) -> GenerationError {
    GenerationError::Http(e.without_url())
}

fn extract_text(response: GeminiResponse) -> Result<String, GenerationError> {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|f| f.block_reason)
    {
        return Err(GenerationError::Blocked { reason });
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(GenerationError::EmptyResponse)?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if !text.is_empty() {
        return Ok(text);
    }

    match candidate.finish_reason {
        Some(reason) if reason != "STOP" => Err(GenerationError::Blocked { reason }),
        _ => Err(GenerationError::EmptyResponse),
    }
}

// ============================================================================
// FallbackGenerator
// ============================================================================

/// What the chat endpoint sends back: `{ "text": ..., "success": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedReply {
    pub text: String,
    pub success: bool,
}

impl GeneratedReply {
    pub fn fallback() -> Self {
        Self {
            text: FALLBACK_REPLY.to_string(),
            success: false,
        }
    }
}

/// Wraps a generator. On any error, logs a warning and returns the fixed
/// apology with `success: false`. Callers never see a generation error.
#[derive(Clone)]
pub struct FallbackGenerator {
    inner: Arc<dyn ResponseGenerator>,
}

impl FallbackGenerator {
    pub fn new(inner: Arc<dyn ResponseGenerator>) -> Self {
        Self { inner }
    }

    pub async fn reply(&self, message: &str, history: &[ConversationTurn]) -> GeneratedReply {
        match self.inner.generate(message, history).await {
            Ok(text) => GeneratedReply { text, success: true },
            Err(e) => {
                tracing::warn!(
                    backend = self.inner.name(),
                    error = %e,
                    "Generation failed, answering with fallback reply"
                );
                GeneratedReply::fallback()
            }
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }
}

// ============================================================================
// TESTS
// ============================================================================
