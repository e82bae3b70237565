//! Table Relevance Selector
//!
//! Asks the backend for a shortlist of candidate tables for a question and
//! filters the answer down to known table names. Any remote or parse failure
//! degrades to a deterministic local keyword heuristic; this operation
//! always returns a list and never surfaces a hard error.

use crate::jira::TicketContext;
use crate::llm::{ChatTransport, TurnRequest};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const FALLBACK_MAX_RESULTS: usize = 6;

/// Propose candidate tables for a question. The reply is parsed as a
/// comma-separated list and filtered case-insensitively to known tables
/// (canonical casing preserved); an empty result engages the fallback.
pub async fn suggest_tables(
    transport: &dyn ChatTransport,
    question: &str,
    tenant: &str,
    table_descriptions: &BTreeMap<String, String>,
    ticket: Option<&TicketContext>,
) -> Vec<String> {
    let message = build_suggestion_message(question, tenant, table_descriptions, ticket);
    let shortlist = match transport.send(&TurnRequest::bare(message)).await {
        Ok(reply) => {
            let names = parse_table_list(&reply.reply);
            filter_known_tables(&names, table_descriptions)
        }
        Err(e) => {
            warn!("table suggestion request failed: {e}");
            Vec::new()
        }
    };

    if !shortlist.is_empty() {
        debug!(count = shortlist.len(), "remote table suggestion accepted");
        return shortlist;
    }

    warn!("remote table suggestion unusable, falling back to keyword heuristic");
    fallback_suggest_tables(question, table_descriptions)
}

/// Single context-free instruction: directive, serialized catalog, optional
/// ticket context, then the question.
fn build_suggestion_message(
    question: &str,
    tenant: &str,
    table_descriptions: &BTreeMap<String, String>,
    ticket: Option<&TicketContext>,
) -> String {
    let mut out = String::new();
    out.push_str(
        "Given the question below and the table catalog, respond with ONLY a \
         comma-separated list of the exact table names needed to answer it. \
         No other text.\n\nTABLES:\n",
    );
    for (name, description) in table_descriptions {
        out.push_str(&format!("  {}: {}\n", name, description));
    }
    if let Some(ticket) = ticket {
        out.push_str(&format!(
            "\nTICKET CONTEXT:\n{}: {}\n{}\n",
            ticket.key, ticket.summary, ticket.description
        ));
    }
    out.push_str(&format!("\nQUESTION (tenant: {}): {}", tenant, question));
    out
}

fn parse_table_list(reply: &str) -> Vec<String> {
    reply
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Keep only names that case-insensitively match a known table, emitting the
/// canonical stored casing. Unknown names are silently dropped so invented
/// tables never reach the caller.
fn filter_known_tables(
    names: &[String],
    table_descriptions: &BTreeMap<String, String>,
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let canonical = table_descriptions
            .keys()
            .find(|known| known.eq_ignore_ascii_case(name));
        if let Some(canonical) = canonical {
            if !out.contains(canonical) {
                out.push(canonical.clone());
            }
        }
    }
    out
}

/// Deterministic local heuristic: score each table by how many question
/// words (length > 2) appear as substrings of its lowercased name or
/// description, descending, score > 0 only, capped at 6. Pure and
/// side-effect-free so it is testable without the network.
pub fn fallback_suggest_tables(
    question: &str,
    table_descriptions: &BTreeMap<String, String>,
) -> Vec<String> {
    let lowered = question.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| w.len() > 2)
        .collect();
    if words.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, &String)> = table_descriptions
        .iter()
        .filter_map(|(name, description)| {
            let haystack = format!("{} {}", name, description).to_lowercase();
            let score = words.iter().filter(|w| haystack.contains(*w)).count();
            if score > 0 {
                Some((score, name))
            } else {
                None
            }
        })
        .collect();

    // Name tie-break keeps equal scores deterministic
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored
        .into_iter()
        .take(FALLBACK_MAX_RESULTS)
        .map(|(_, name)| name.clone())
        .collect()
}
