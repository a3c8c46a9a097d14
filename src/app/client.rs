//! Fetch collaborator contract and HTTP implementation
//!
//! Workers only see the [`Fetcher`] trait. [`HttpFetcher`] is the production
//! implementation: it substitutes the candidate id into an endpoint template,
//! waits on a shared rate limiter, issues a GET and parses the body as JSON.
//! Request signing and retry policy belong to the remote API wrapper and are
//! not handled here.

use std::num::NonZeroU32;
use std::time::Duration;

use futures::future::BoxFuture;
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::app::id::CandidateId;
use crate::app::models::{Document, FieldDenylist};
use crate::constants::fetch;
use crate::errors::{ConfigError, ConfigResult, FetchError, FetchOutcome};

/// Remote lookup of a single candidate
pub trait Fetcher: Send + Sync {
    /// Fetch the response document for `id`
    fn fetch(&self, id: CandidateId) -> BoxFuture<'_, FetchOutcome<Document>>;
}

/// Configuration for the HTTP fetcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Endpoint URL with an `{id}` placeholder
    pub endpoint: String,
    /// Requests per second across all workers
    pub rate_limit_rps: u32,
    /// Per-request timeout enforced by the HTTP client
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Extra headers sent with every request
    pub headers: Vec<(String, String)>,
    /// Field names stripped from every response
    pub denylist: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/aweme/related?aweme_id={id}".to_string(),
            rate_limit_rps: fetch::DEFAULT_RATE_LIMIT_RPS,
            request_timeout: Duration::from_secs(20),
            headers: Vec::new(),
            denylist: fetch::DEFAULT_DENYLIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl FetchConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.endpoint.contains(fetch::ID_PLACEHOLDER) {
            return Err(ConfigError::InvalidValue {
                field: "fetch.endpoint".to_string(),
                value: self.endpoint.clone(),
                reason: format!("endpoint must contain {}", fetch::ID_PLACEHOLDER),
            });
        }

        let probe = self.endpoint.replace(fetch::ID_PLACEHOLDER, "0");
        if let Err(e) = Url::parse(&probe) {
            return Err(ConfigError::InvalidValue {
                field: "fetch.endpoint".to_string(),
                value: self.endpoint.clone(),
                reason: e.to_string(),
            });
        }

        if self.rate_limit_rps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fetch.rate_limit_rps".to_string(),
                value: "0".to_string(),
                reason: "rate limit must be non-zero".to_string(),
            });
        }

        Ok(())
    }

    pub fn denylist(&self) -> FieldDenylist {
        FieldDenylist::new(self.denylist.iter().cloned())
    }
}

/// Rate-limited JSON-over-HTTP fetcher
#[derive(Debug)]
pub struct HttpFetcher {
    client: Client,
    endpoint: String,
    headers: Vec<(String, String)>,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl HttpFetcher {
    /// Build the client and limiter from configuration
    pub fn new(config: &FetchConfig) -> ConfigResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(fetch::CONNECT_TIMEOUT)
            .user_agent(fetch::USER_AGENT)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "fetch".to_string(),
                value: config.endpoint.clone(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            headers: config.headers.clone(),
            rate_limiter: Self::build_rate_limiter(config.rate_limit_rps)?,
        })
    }

    fn build_rate_limiter(
        rate_limit_rps: u32,
    ) -> ConfigResult<RateLimiter<NotKeyed, InMemoryState, DefaultClock>> {
        let rps = NonZeroU32::new(rate_limit_rps).ok_or_else(|| ConfigError::InvalidValue {
            field: "fetch.rate_limit_rps".to_string(),
            value: rate_limit_rps.to_string(),
            reason: "rate limit must be non-zero".to_string(),
        })?;
        Ok(RateLimiter::direct(Quota::per_second(rps)))
    }

    /// Endpoint URL for a candidate
    pub fn url_for(&self, id: CandidateId) -> FetchOutcome<Url> {
        let raw = self.endpoint.replace(fetch::ID_PLACEHOLDER, &id.to_string());
        Url::parse(&raw).map_err(|e| FetchError::InvalidUrl {
            url: raw,
            error: e.to_string(),
        })
    }

    async fn fetch_document(&self, id: CandidateId) -> FetchOutcome<Document> {
        let url = self.url_for(id)?;
        self.rate_limiter.until_ready().await;

        let mut request = self.client.get(url.as_str());
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(FetchError::InvalidResponse {
                reason: "empty body".to_string(),
            });
        }

        let document: Document =
            serde_json::from_slice(&body).map_err(|e| FetchError::InvalidResponse {
                reason: format!("body is not JSON: {}", e),
            })?;
        if !document.is_object() {
            return Err(FetchError::InvalidResponse {
                reason: "expected a JSON object".to_string(),
            });
        }

        debug!("Fetched {} ({} bytes)", id, body.len());
        Ok(document)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, id: CandidateId) -> BoxFuture<'_, FetchOutcome<Document>> {
        Box::pin(self.fetch_document(id))
    }
}
