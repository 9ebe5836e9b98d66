//! The reasoning model: one trait both loops talk to, and the Anthropic
//! Messages API client behind it.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AgentError, Result};
use crate::types::{ContentBlock, ToolSpec, Turn};

pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Everything the model sees on one call.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    pub system: &'a str,
    pub tools: &'a [ToolSpec],
    pub messages: &'a [Turn],
    /// Beta feature flags, sent as the `anthropic-beta` header.
    pub betas: &'a [&'a str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelResponse {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
}

impl ModelResponse {
    pub fn finished(&self) -> bool {
        self.stop_reason == Some(StopReason::EndTurn)
    }
}

#[async_trait]
pub trait ReasoningModel: Send + Sync {
    async fn respond(&self, request: ModelRequest<'_>) -> Result<ModelResponse>;
}

#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ToolSpec],
    messages: &'a [Turn],
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

/// Client for the Anthropic Messages API.
#[derive(Clone)]
pub struct Brain {
    client: Client,
    api_key: String,
    api_base: String,
}

impl Brain {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_API_BASE)
    }

    pub fn with_base_url(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// A client that keeps no idle connections, so it can be driven from a
    /// short-lived runtime on another thread.
    pub fn unpooled(self) -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .unwrap_or(self.client);
        Self { client, ..self }
    }
}

#[async_trait]
impl ReasoningModel for Brain {
    async fn respond(&self, request: ModelRequest<'_>) -> Result<ModelResponse> {
        let body = MessagesBody {
            model: request.model,
            max_tokens: request.max_tokens,
            system: request.system,
            tools: request.tools,
            messages: request.messages,
        };

        debug!(
            model = request.model,
            turns = request.messages.len(),
            tools = request.tools.len(),
            "calling model"
        );

        let mut builder = self
            .client
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body);
        if !request.betas.is_empty() {
            builder = builder.header("anthropic-beta", request.betas.join(","));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AgentError::Model(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorResponse>(&text) {
                Ok(err) => format!("{}: {}", err.error.error_type, err.error.message),
                Err(_) => text,
            };
            return Err(AgentError::ModelApi {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<ModelResponse>()
            .await
            .map_err(|e| AgentError::Model(format!("failed to parse response: {e}")))
    }
}
