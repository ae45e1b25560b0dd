//! HTTP client for the catalog search API.
//!
//! Wraps `reqwest` with catalog-specific error handling, optional API key
//! management, and typed response deserialization.

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use shelfmatch_core::CandidateProduct;

use crate::error::CatalogError;
use crate::retry::retry_with_backoff;
use crate::types::SearchResponse;

const USER_AGENT: &str = "shelfmatch/0.1 (shelf-item-matching)";

/// Client for the catalog search API.
///
/// Use [`CatalogClient::new`] for production or point `base_url` at a mock
/// server in tests. The request timeout is fixed at construction; a
/// timed-out search surfaces as a retriable HTTP error and, once retries
/// are exhausted, as the item's failure.
pub struct CatalogClient {
    client: Client,
    api_key: Option<String>,
    base_url: Url,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl CatalogClient {
    /// Creates a new catalog client.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`CatalogError::InvalidBaseUrl`] if
    /// `base_url` does not parse.
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        timeout_secs: u64,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;

        // Normalise: ensure the base URL ends with exactly one slash so that
        // joined paths extend it rather than replacing the last segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| CatalogError::InvalidBaseUrl {
            base_url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            api_key: api_key.map(ToOwned::to_owned),
            base_url,
            max_retries,
            backoff_base_ms,
        })
    }

    /// Searches the catalog for reference products matching `query`.
    ///
    /// Returns the service's ranked candidate list, capped at `limit`
    /// results. An empty list is a valid outcome, not an error. Transient
    /// failures are retried with backoff before surfacing.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::RateLimited`] after exhausting retries on 429.
    /// - [`CatalogError::Http`] on network failure or timeout.
    /// - [`CatalogError::UnexpectedStatus`] on non-retriable HTTP statuses.
    /// - [`CatalogError::Deserialize`] if the response body does not match
    ///   the expected shape.
    pub async fn search(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<CandidateProduct>, CatalogError> {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            self.search_once(query, limit)
        })
        .await
    }

    async fn search_once(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<CandidateProduct>, CatalogError> {
        let mut url = self
            .base_url
            .join("v1/products/search")
            .map_err(|e| CatalogError::InvalidBaseUrl {
                base_url: self.base_url.to_string(),
                reason: e.to_string(),
            })?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("limit", &limit.to_string());

        let mut request = self.client.get(url.clone());
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(CatalogError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            if status.is_server_error() {
                // Promote to a retriable reqwest error via error_for_status.
                return Err(CatalogError::Http(
                    response.error_for_status().expect_err("status is 5xx"),
                ));
            }
            return Err(CatalogError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        let parsed: SearchResponse =
            serde_json::from_str(&body).map_err(|e| CatalogError::Deserialize {
                context: format!("search(q={query})"),
                source: e,
            })?;

        tracing::debug!(
            query,
            results = parsed.products.len(),
            "catalog search completed"
        );

        Ok(parsed.products.into_iter().map(Into::into).collect())
    }
}
