//! Session Manager
//!
//! Owns the single live session token per conversation. Cold turns carry the
//! compiled instruction and store the token the backend hands back;
//! follow-up turns carry only the bare message and the token. Termination is
//! best-effort: the end call is awaited but its outcome is ignored, and
//! local state is cleared regardless.

use crate::error::{QueryGptError, Result};
use crate::llm::{ChatTransport, TurnRequest};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Opaque server-issued session handle. The token is a capability with a
/// single legitimate owner; no internal structure is assumed.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

pub struct SessionManager {
    transport: Arc<dyn ChatTransport>,
    session: Option<Session>,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            session: None,
        }
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id.as_str())
    }

    /// Open a new session with the compiled instruction. Any outgoing
    /// session is terminated first so the remote side never accumulates
    /// orphans.
    pub async fn send_cold(&mut self, message: &str, instruction: &str) -> Result<String> {
        self.end_current().await;
        let reply = self
            .transport
            .send(&TurnRequest::cold(message, instruction))
            .await?;
        if let Some(id) = reply.session_id {
            debug!(session = %id, "session opened");
            self.session = Some(Session {
                id,
                created_at: Utc::now(),
            });
        }
        Ok(reply.reply)
    }

    /// Follow-up turn on the open session: bare message plus token, the
    /// instruction is never resent.
    pub async fn send_follow_up(&mut self, message: &str) -> Result<String> {
        let session_id = self
            .session
            .as_ref()
            .map(|s| s.id.clone())
            .ok_or(QueryGptError::NoSession)?;
        let reply = self
            .transport
            .send(&TurnRequest::follow_up(message, session_id))
            .await?;
        // The backend may rotate the token mid-conversation
        if let Some(id) = reply.session_id {
            if let Some(session) = self.session.as_mut() {
                session.id = id;
            }
        }
        Ok(reply.reply)
    }

    /// Explicit end-of-conversation signal (tenant switch, reset, teardown).
    pub async fn reset(&mut self) {
        self.end_current().await;
    }

    async fn end_current(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = self.transport.end(&session.id).await {
                warn!(session = %session.id, "session termination failed (ignored): {e}");
            }
        }
    }
}
