//! Ticket context input shape and key extraction.
//!
//! The actual ticket lookup lives in an external service; the engine only
//! consumes the resolved record and embeds it verbatim in prompts.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Resolved ticket record used as optional prompt enrichment. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketContext {
    pub key: String,
    pub summary: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

lazy_static! {
    static ref KEY_ONLY: Regex = Regex::new(r"^[A-Z][A-Z0-9]+-\d+$").unwrap();
    static ref BROWSE_URL: Regex = Regex::new(r"(?i)/browse/([A-Z][A-Z0-9]+-\d+)").unwrap();
    static ref EMBEDDED_KEY: Regex = Regex::new(r"(?i)([A-Z][A-Z0-9]+-\d+)").unwrap();
}

/// Extract a ticket key from raw input: a bare key ("CAV-1868"), a browse
/// URL ("https://.../browse/CAV-1868") or any string embedding a key.
/// Returns the canonical upper-cased key.
pub fn extract_ticket_key(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let upper = trimmed.to_uppercase();
    if let Some(m) = KEY_ONLY.find(&upper) {
        return Some(m.as_str().to_string());
    }
    if let Some(caps) = BROWSE_URL.captures(trimmed) {
        return Some(caps[1].to_uppercase());
    }
    if let Some(caps) = EMBEDDED_KEY.captures(trimmed) {
        return Some(caps[1].to_uppercase());
    }
    None
}
