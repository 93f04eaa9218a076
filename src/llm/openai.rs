//! `OpenAI` chat-completions provider implementation

use super::types::{LlmRequest, LlmResponse, PromptMessage, SamplingParams, Usage};
use super::{LlmError, LlmErrorKind, LlmService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// OpenAI-compatible chat-completions client
pub struct OpenAIService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    params: SamplingParams,
}

impl OpenAIService {
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<&str>,
        params: SamplingParams,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.unwrap_or(DEFAULT_CHAT_URL).to_string(),
            model,
            params,
        })
    }

    fn translate_request(&self, request: &LlmRequest) -> OpenAIRequest {
        OpenAIRequest {
            model: self.model.clone(),
            messages: request.messages.iter().map(translate_message).collect(),
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
            top_p: self.params.top_p,
            frequency_penalty: self.params.frequency_penalty,
            presence_penalty: self.params.presence_penalty,
        }
    }

    fn normalize_response(resp: OpenAIResponse) -> Result<LlmResponse, LlmError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::malformed("No choices in response"))?;

        let text = choice
            .message
            .content
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| LlmError::malformed("Completion contained no text"))?;

        let usage = resp.usage.map_or_else(Usage::default, |u| Usage {
            input_tokens: u64::from(u.prompt_tokens),
            output_tokens: u64::from(u.completion_tokens),
        });

        Ok(LlmResponse { text, usage })
    }
}

fn translate_message(msg: &PromptMessage) -> OpenAIMessage {
    OpenAIMessage {
        role: msg.role.as_str().to_string(),
        content: msg.text.clone(),
    }
}

fn classify_status(status: reqwest::StatusCode, message: &str) -> LlmError {
    let kind = match status.as_u16() {
        401 | 403 => LlmErrorKind::Auth,
        429 => LlmErrorKind::RateLimit,
        _ => LlmErrorKind::Rejected,
    };
    LlmError::new(kind, format!("HTTP {status}: {message}"))
}

#[async_trait]
impl LlmService for OpenAIService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let openai_request = self.translate_request(request);

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&openai_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::transport(format!("Request timeout: {e}"))
                } else {
                    LlmError::transport(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::transport(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<OpenAIErrorResponse>(&body)
                .map_or(body, |error_resp| error_resp.error.message);
            return Err(classify_status(status, &message));
        }

        let openai_response: OpenAIResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::malformed(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Self::normalize_response(openai_response)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}
