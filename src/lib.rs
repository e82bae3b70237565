pub mod engine;
pub mod error;
pub mod formatter;
pub mod jira;
pub mod llm;
pub mod parser;
pub mod prompt;
pub mod schema;
pub mod selector;
pub mod session;
