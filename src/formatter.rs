//! Result Formatter
//!
//! Pretty-printing is an external collaborator consumed as a pure function;
//! `SqlFormatter` is the seam for it. A formatting failure never fails the
//! turn — the already-extracted SQL text is used verbatim instead.

use crate::error::{QueryGptError, Result};
use tracing::warn;

pub trait SqlFormatter: Send + Sync {
    fn format(&self, sql: &str) -> Result<String>;
}

/// Conservative built-in formatter: collapses runs of blank lines and trims
/// trailing whitespace per line. Anything smarter belongs to the external
/// pretty-printer.
#[derive(Debug, Default)]
pub struct BasicFormatter;

impl SqlFormatter for BasicFormatter {
    fn format(&self, sql: &str) -> Result<String> {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return Err(QueryGptError::Format("empty SQL text".to_string()));
        }
        let mut out: Vec<&str> = Vec::new();
        let mut last_blank = false;
        for line in trimmed.lines() {
            let line = line.trim_end();
            let blank = line.trim().is_empty();
            if blank && last_blank {
                continue;
            }
            out.push(line);
            last_blank = blank;
        }
        Ok(out.join("\n"))
    }
}

/// Run the extracted SQL through the formatter, falling back to the
/// unformatted text when formatting fails.
pub fn format_or_fallback(formatter: &dyn SqlFormatter, sql: &str) -> String {
    match formatter.format(sql) {
        Ok(formatted) => formatted,
        Err(e) => {
            warn!("SQL formatting failed, using extracted text verbatim: {e}");
            sql.to_string()
        }
    }
}

/// Drop degenerate index suggestions ("None", "N/A", blank or dash-only
/// lines); genuine suggestions are preserved verbatim.
pub fn filter_index_suggestions<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| {
            let trimmed = line.as_ref().trim();
            if is_degenerate_suggestion(trimmed) {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

fn is_degenerate_suggestion(line: &str) -> bool {
    if line.is_empty() {
        return true;
    }
    let lower = line.to_lowercase();
    if lower == "none" || lower == "n/a" {
        return true;
    }
    line.chars().all(|c| matches!(c, '-' | '\u{2014}' | '\u{2013}'))
}
