//! LLM metadata generator client
//!
//! OpenAI-compatible chat-completions client (Groq by default) returning
//! JSON objects, plus the reply parser shared by every
//! [`MetadataGenerator`].

use crate::types::{MetadataGenerator, SynthesisError};
use crate::utils::sanitize_ascii;
use async_trait::async_trait;
use mme_common::config::AiConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("mme-ai/", env!("CARGO_PKG_VERSION"));

const SYSTEM_PROMPT: &str =
    "You are a professional music metadata analyst. Always respond with valid JSON only.";

/// Parse a model reply into a JSON object
///
/// Makes one extraction attempt (first `{` through last `}`) when the
/// reply wraps the object in prose or code fences.
///
/// # Errors
/// Returns `SynthesisError::Format` when no JSON object can be recovered
pub fn parse_json_response(raw: &str) -> Result<Value, SynthesisError> {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        if value.is_object() {
            return Ok(value);
        }
    }

    let embedded = extract_json_object(raw)
        .ok_or_else(|| SynthesisError::Format("Could not parse AI response as JSON".to_string()))?;

    match serde_json::from_str::<Value>(embedded) {
        Ok(value) if value.is_object() => {
            debug!("Recovered JSON object embedded in model reply");
            Ok(value)
        }
        Ok(_) => Err(SynthesisError::Format(
            "AI response is not a JSON object".to_string(),
        )),
        Err(e) => Err(SynthesisError::Format(format!(
            "Could not parse AI response as JSON: {}",
            e
        ))),
    }
}

/// Slice from the first `{` to the last `}`, if any
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// User message sent to the model: prompt followed by the JSON template
pub fn compose_user_message(prompt: &str, schema_hint: &str) -> String {
    let message = if schema_hint.trim().is_empty() {
        prompt.to_string()
    } else {
        format!(
            "{}\n\nReturn ONLY valid JSON matching this structure:\n{}\n",
            prompt.trim_end(),
            schema_hint
        )
    };
    sanitize_ascii(&message)
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Chat-completions backed [`MetadataGenerator`]
pub struct GroqChatGenerator {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl GroqChatGenerator {
    /// Build a client for the configured endpoint
    ///
    /// # Errors
    /// Returns `SynthesisError::Service` if the HTTP client cannot be built
    pub fn new(config: &AiConfig, api_key: String) -> Result<Self, SynthesisError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| SynthesisError::Service(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl MetadataGenerator for GroqChatGenerator {
    fn name(&self) -> &'static str {
        "groq-chat"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn generate_raw(&self, prompt: &str, schema_hint: &str) -> Result<String, SynthesisError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Some(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Some(compose_user_message(prompt, schema_hint)),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        debug!(url = %url, model = %self.model, "Calling chat completions API");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SynthesisError::Service("LLM request timed out".to_string())
                } else {
                    SynthesisError::Service(format!("Network error: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Service(format!(
                "API error {}: {}",
                status.as_u16(),
                error_text
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::Service(format!("Invalid response body: {}", e)))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SynthesisError::Service("Response contained no choices".to_string()))?;

        info!(model = %self.model, chars = content.len(), "Received model reply");
        Ok(content)
    }
}

/// Placeholder used when no LLM credential is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableGenerator;

#[async_trait]
impl MetadataGenerator for UnavailableGenerator {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn generate_raw(&self, _prompt: &str, _schema_hint: &str) -> Result<String, SynthesisError> {
        Err(SynthesisError::Service(
            "AI metadata generation is not configured".to_string(),
        ))
    }
}
