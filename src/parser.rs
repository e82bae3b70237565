//! Response Parser
//!
//! The backend replies in free text with three labeled fields
//! (`sql query:`, `explanation:`, `suggested indexes:`). Labels vary in
//! casing and position, so extraction anchors on word boundaries anywhere in
//! the stream. A reply without the required labels is a valid outcome (an
//! out-of-scope answer), not an exception.

use crate::formatter::filter_index_suggestions;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Structured result of one generation turn.
///
/// When `error` is set the reply carried no parseable query and `query` is
/// empty; the raw text is displayed as assistant prose.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_indexes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GeneratedQuery {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn out_of_scope(raw: &str) -> Self {
        Self {
            query: String::new(),
            explanation: None,
            suggested_indexes: Vec::new(),
            error: Some(raw.trim().to_string()),
        }
    }
}

lazy_static! {
    static ref HEADING_MARKERS: Regex = Regex::new(r"(?m)^#+\s*").unwrap();
    static ref SQL_LABEL: Regex = Regex::new(r"(?i)\bsql\s+query\s*:").unwrap();
    static ref EXPLANATION_LABEL: Regex = Regex::new(r"(?i)\bexplanation\s*:").unwrap();
    static ref INDEXES_LABEL: Regex = Regex::new(r"(?i)\bsuggested\s+indexes\s*:").unwrap();
}

/// Extract the three labeled fields from a raw reply. Success requires the
/// SQL and explanation labels to be present and the SQL text non-empty;
/// otherwise the entire reply becomes the `error` payload.
pub fn parse_reply(raw: &str) -> GeneratedQuery {
    let normalized = normalize(raw);

    let sql_label = match SQL_LABEL.find(&normalized) {
        Some(m) => m,
        None => return GeneratedQuery::out_of_scope(raw),
    };
    let explanation_label = match EXPLANATION_LABEL.find_at(&normalized, sql_label.end()) {
        Some(m) => m,
        None => return GeneratedQuery::out_of_scope(raw),
    };
    let indexes_label = INDEXES_LABEL.find_at(&normalized, explanation_label.end());

    let query = normalized[sql_label.end()..explanation_label.start()].trim();
    if query.is_empty() {
        return GeneratedQuery::out_of_scope(raw);
    }

    let explanation_end = indexes_label
        .as_ref()
        .map(|m| m.start())
        .unwrap_or(normalized.len());
    let explanation = normalized[explanation_label.end()..explanation_end].trim();

    let suggested_indexes = match indexes_label {
        Some(m) => filter_index_suggestions(normalized[m.end()..].lines()),
        None => Vec::new(),
    };

    GeneratedQuery {
        query: query.to_string(),
        explanation: Some(explanation.to_string()),
        suggested_indexes,
        error: None,
    }
}

/// Normalize line endings and strip leading markdown heading markers so
/// `### SQL Query:` anchors the same as a bare label.
fn normalize(raw: &str) -> String {
    let unix = raw.replace("\r\n", "\n");
    HEADING_MARKERS.replace_all(&unix, "").trim().to_string()
}
