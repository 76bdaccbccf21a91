//! HTTP implementation of the Fetcher contract.
//!
//! Posts `{retailer, sourceUrl, divSelector}` to the configured extraction
//! endpoint and interprets the `{ok, products, error, message}` reply. An
//! HTTP-level answer, 2xx or not, is definitive; only transport failures are
//! retried, with exponential backoff.

use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::{FetchError, Fetcher, Harvest, ScrapeJob, GENERIC_FETCH_ERROR};

/// Transport attempts per job before giving up.
pub const MAX_ATTEMPTS: u32 = 3;

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const JITTER_MS: u64 = 250;

pub struct HttpFetcher {
    client: Client,
    endpoint: String,
}

impl HttpFetcher {
    /// Build a fetcher against `endpoint` with the given per-request timeout,
    /// the only timeout anywhere in the scheduling path.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build extraction HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn send_with_retries(&self, body: &ExtractRequest<'_>) -> Result<reqwest::Response, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.post(&self.endpoint).json(body).send().await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < MAX_ATTEMPTS => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "extraction request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(FetchError::Transport {
                        attempts: attempt,
                        source: e,
                    })
                }
            }
        }
    }
}

/// 1s, 2s, 4s... plus a little jitter so parallel tasks do not retry in step.
fn backoff_delay(attempt: u32) -> Duration {
    let base = BACKOFF_BASE * 2u32.pow(attempt.saturating_sub(1));
    base + Duration::from_millis(rand::thread_rng().gen_range(0..JITTER_MS))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractRequest<'a> {
    retailer: &'a str,
    source_url: &'a str,
    div_selector: &'a str,
}

/// Whatever the endpoint sends back. Every field is optional; `ok` absent
/// means the HTTP status alone decides.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ExtractResponse {
    ok: Option<bool>,
    products: Option<Vec<Value>>,
    error: Option<String>,
    message: Option<String>,
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, job: &ScrapeJob) -> Result<Harvest, FetchError> {
        let body = ExtractRequest {
            retailer: &job.retailer,
            source_url: &job.source_url,
            div_selector: &job.div_selector,
        };

        let response = self.send_with_retries(&body).await?;
        let status = response.status();
        let reply: ExtractResponse = response.json().await.map_err(FetchError::Malformed)?;

        if status.is_success() && reply.ok.unwrap_or(true) {
            Ok(Harvest {
                products: reply.products.unwrap_or_default(),
            })
        } else {
            let message = reply
                .error
                .or(reply.message)
                .unwrap_or_else(|| GENERIC_FETCH_ERROR.to_string());
            Err(FetchError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}
