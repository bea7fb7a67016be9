//! HTTP client for the classification agent.
//!
//! Talks to an OpenAI-compatible `chat/completions` endpoint. One call
//! per completed download: the structured description goes in as the
//! user message, the raw text of the first choice comes back out. No
//! retries; a failed classification only costs that hook invocation its
//! move step.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Default per-request timeout for agent calls.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Instructions pinned to every classification call.
const SYSTEM_PROMPT: &str = "You organize finished downloads into a media library. \
Given a JSON description of one finished download, answer with JSON only, in one \
of exactly two shapes: {\"sourcePath\": \"...\", \"targetPath\": \"...\"} to move \
the payload (build targetPath under the given targetParent, inferring category \
and naming from the content name), or {\"actions\": [\"...\"], \"shell\": \"...\"} \
listing shell commands to run instead. No prose, no markdown fences.";

/// Errors from the agent layer.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// No agent endpoint configured; classification is disabled.
    #[error("agent not configured: {0}")]
    NotConfigured(&'static str),

    /// The HTTP request failed (network, DNS, timeout).
    #[error("agent request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The agent endpoint returned a non-2xx status.
    #[error("agent API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The response contained no usable completion text.
    #[error("agent returned an empty response")]
    EmptyResponse,

    /// The agent's output failed plan-schema validation.
    #[error("invalid agent plan: {0}")]
    InvalidPlan(String),
}

/// Structured description of a finished download, sent to the agent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyRequest {
    /// Content name discovered by the daemon (or the raw descriptor).
    pub name: String,
    /// Where the finished payload currently sits.
    pub source_path: String,
    /// Configured destination root for organized media.
    pub target_parent: String,
    /// Host OS the agent should write paths/actions for.
    pub os: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Client for the classification agent endpoint.
pub struct AgentClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl AgentClient {
    /// Create a client for an OpenAI-compatible endpoint.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }

    /// Build a client from `AGENT_BASE_URL`, `AGENT_API_KEY`, and
    /// `AGENT_MODEL`. Returns `None` when no base URL is configured,
    /// which disables classification entirely.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("AGENT_BASE_URL").ok()?;
        let api_key = std::env::var("AGENT_API_KEY").ok();
        let model = std::env::var("AGENT_MODEL").unwrap_or_else(|_| "gpt-4.1".into());
        Some(Self::new(base_url, api_key, model))
    }

    /// Run one classification round-trip, returning the raw answer text.
    pub async fn classify(&self, request: &ClassifyRequest) -> Result<String, AgentError> {
        let payload = serde_json::to_string(request)
            .map_err(|e| AgentError::InvalidPlan(format!("unserializable request: {e}")))?;

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": payload },
            ],
        });

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(AgentError::EmptyResponse)
    }
}
