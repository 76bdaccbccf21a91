//! Fetcher collaborator interface -- the extraction service the scheduler
//! hands scrape jobs to. Opaque to the scheduling core: implementations may
//! drive a headless browser, call a text-extraction model, or replay fixtures
//! in tests.

pub mod http;

pub use http::HttpFetcher;

use serde_json::Value;
use thiserror::Error;

/// Fallback message when the collaborator reports failure without saying why.
pub const GENERIC_FETCH_ERROR: &str = "Unknown error";

/// The coordinates of one scrape: which retailer page and which container to
/// pull products from.
#[derive(Debug, Clone)]
pub struct ScrapeJob {
    pub retailer: String,
    pub source_url: String,
    pub div_selector: String,
}

/// Products returned by a successful extraction. The payload stays opaque
/// JSON; the scheduler only counts it.
#[derive(Debug, Clone, Default)]
pub struct Harvest {
    pub products: Vec<Value>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// The collaborator answered and said no. The message follows its
    /// `error`-then-`message` precedence, with a generic fallback.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    /// Could not reach the collaborator at all, even after retries.
    #[error("extraction endpoint unreachable after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    /// The collaborator answered with a body that is not the contract.
    #[error("malformed extraction response: {0}")]
    Malformed(#[source] reqwest::Error),
}

/// An extraction backend the executor can hand jobs to.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Run one scrape job to completion.
    async fn fetch(&self, job: &ScrapeJob) -> Result<Harvest, FetchError>;
}
