//! Error taxonomy for the acquisition and query pipelines.
//!
//! Stage-level errors ([`FetchError`], [`PersistenceError`]) abort only the
//! current scrape cycle. [`AgentInvocationError`] degrades a query answer
//! and never reaches the caller as an `Err`. Per-record rejections live in
//! [`crate::normalize`] and are aggregated rather than raised.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("no markup returned for {url}")]
    EmptyPayload { url: String },

    #[error("credential environment variable {0} is not set")]
    MissingCredential(String),

    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("table '{0}' does not exist; run `shelf init` or `shelf scrape` first")]
    MissingTable(String),

    #[error("table '{table}' exists with an unexpected schema: {found}")]
    SchemaMismatch { table: String, found: String },

    #[error("could not prepare database directory: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum AgentInvocationError {
    #[error("agent provider is disabled")]
    Disabled,

    #[error("credential environment variable {0} is not set")]
    MissingCredential(String),

    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    #[error("agent stopped after {0} steps without a final answer")]
    BudgetExhausted(usize),

    #[error("could not read catalog schema: {0}")]
    Schema(#[from] PersistenceError),
}

/// Stages of one scrape cycle, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeStage {
    Fetching,
    Parsing,
    Normalizing,
    Persisting,
}

impl fmt::Display for ScrapeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScrapeStage::Fetching => "fetching",
            ScrapeStage::Parsing => "parsing",
            ScrapeStage::Normalizing => "normalizing",
            ScrapeStage::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

/// A stage-fatal failure of one scrape cycle.
#[derive(Debug, Error)]
#[error("scrape failed while {stage}: {cause}")]
pub struct StageFailure {
    pub stage: ScrapeStage,
    pub cause: String,
}

impl StageFailure {
    pub fn new(stage: ScrapeStage, cause: impl ToString) -> Self {
        Self {
            stage,
            cause: cause.to_string(),
        }
    }
}
