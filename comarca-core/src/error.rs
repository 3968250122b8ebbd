use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// Validation and NotFound surface directly to API callers; Scrape and
/// Timeout are recorded into the owning execution and never escape the
/// runner boundary; Store covers transient persistence failures and must
/// never block live log delivery.
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid cron syntax: {0}")]
    InvalidCronSyntax(String),

    #[error("scrape failed against {tribunal}: {message}")]
    Scrape { tribunal: String, message: String },

    #[error("scrape timed out against {tribunal} after {elapsed_secs}s")]
    Timeout { tribunal: String, elapsed_secs: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ScrapeError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
