//! Remote completion transport.
//!
//! The backend exposes two endpoints: `POST /chat` for turns and
//! `POST /chat/end` for best-effort session termination. The engine talks to
//! them through the `ChatTransport` trait so tests can script replies.

use crate::error::{QueryGptError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One request to the completion backend. Exactly one shape is valid per
/// call: a cold turn carries `system_instruction`, a follow-up carries
/// `session_id`, a bare turn carries neither. Never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnRequest {
    pub message: String,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
}

impl TurnRequest {
    /// Session-opening turn carrying the full compiled instruction.
    pub fn cold(message: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: None,
            system_instruction: Some(instruction.into()),
        }
    }

    /// Follow-up turn reusing an existing session token.
    pub fn follow_up(message: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: Some(session_id.into()),
            system_instruction: None,
        }
    }

    /// Context-free one-shot turn (used for table suggestion).
    pub fn bare(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: None,
            system_instruction: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TurnReply {
    pub reply: String,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, request: &TurnRequest) -> Result<TurnReply>;

    /// Best-effort session termination. Callers ignore the outcome.
    async fn end(&self, session_id: &str) -> Result<()>;
}

/// HTTP implementation of `ChatTransport`.
pub struct ChatClient {
    base_url: String,
    client: reqwest::Client,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatTransport for ChatClient {
    async fn send(&self, request: &TurnRequest) -> Result<TurnReply> {
        debug!(
            cold = request.system_instruction.is_some(),
            follow_up = request.session_id.is_some(),
            "sending chat turn"
        );
        let response = self
            .client
            .post(format!("{}/chat", self.base_url))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.json::<ApiErrorBody>().await.ok();
            return Err(map_error_status(status.as_u16(), body));
        }

        Ok(response.json::<TurnReply>().await?)
    }

    async fn end(&self, session_id: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/chat/end", self.base_url))
            .json(&serde_json::json!({ "sessionId": session_id }))
            .send()
            .await?;
        // Response body is ignored by contract
        let status = response.status();
        if !status.is_success() {
            return Err(map_error_status(status.as_u16(), None));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

const MAX_API_MESSAGE_CHARS: usize = 200;

const GENERIC_API_MESSAGE: &str = "The query service rejected the request. Please try again.";

/// Map a non-2xx status to a user-safe error: 429 is rate limiting, 5xx is
/// an outage, other 4xx surface the embedded message capped at 200 chars.
fn map_error_status(status: u16, body: Option<ApiErrorBody>) -> QueryGptError {
    if status == 429 {
        return QueryGptError::RateLimited;
    }
    if (500..600).contains(&status) {
        return QueryGptError::ServiceUnavailable;
    }
    let embedded = body
        .and_then(|b| b.error.or(b.message))
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());
    match embedded {
        Some(m) => {
            let capped: String = m.chars().take(MAX_API_MESSAGE_CHARS).collect();
            QueryGptError::Api(capped)
        }
        None => QueryGptError::Api(GENERIC_API_MESSAGE.to_string()),
    }
}
