use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryGptError {
    #[error("QueryGPT is receiving too many requests right now. Please wait a moment and try again.")]
    RateLimited,

    #[error("The query service is temporarily unavailable. Please try again shortly.")]
    ServiceUnavailable,

    #[error("{0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Schema has not been loaded yet")]
    SchemaNotLoaded,

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("No tables selected for query generation and no open session to continue")]
    NoSelection,

    #[error("No open session to continue")]
    NoSession,

    #[error("Formatting error: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, QueryGptError>;
