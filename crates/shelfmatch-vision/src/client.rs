//! HTTP client for the vision comparison service.

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use shelfmatch_core::{CandidateProduct, ItemMetadata};

use crate::error::VisionError;
use crate::instructions::{SELECTION_POLICY, TIER_POLICY};
use crate::retry::retry_with_backoff;
use crate::types::{
    CompareRequest, RawSelectionVerdict, RawTierVerdict, SelectRequest, SelectionVerdict,
    TierVerdict, WireCandidate, WireMetadata,
};

const USER_AGENT: &str = "shelfmatch/0.1 (shelf-item-matching)";

/// Client for the vision comparison service.
///
/// One instance is shared across all concurrent item pipelines; `reqwest`'s
/// internal pooling handles connection reuse. The request timeout is fixed
/// at construction and bounds every individual comparison call.
pub struct VisionClient {
    client: Client,
    api_key: Option<String>,
    base_url: Url,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl VisionClient {
    /// Creates a new vision client.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`VisionError::InvalidBaseUrl`] if
    /// `base_url` does not parse.
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        timeout_secs: u64,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, VisionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;

        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| VisionError::InvalidBaseUrl {
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

    /// Classifies one candidate against the item crop into a match tier.
    ///
    /// # Errors
    ///
    /// - [`VisionError::MalformedResponse`] if the reply is unparsable or
    ///   fails validation — callers treat this as a per-candidate failure.
    /// - [`VisionError::RateLimited`] / [`VisionError::Http`] after
    ///   exhausting retries — callers treat these as item-level failures.
    pub async fn classify_pair(
        &self,
        crop_url: &str,
        metadata: &ItemMetadata,
        candidate: &CandidateProduct,
    ) -> Result<TierVerdict, VisionError> {
        let candidate_image =
            candidate
                .primary_image()
                .ok_or_else(|| VisionError::MalformedResponse {
                    context: format!("compare(candidate={})", candidate.catalog_key),
                    reason: "candidate has no image reference".to_owned(),
                })?;

        let context = format!("compare(candidate={})", candidate.catalog_key);
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            self.classify_once(crop_url, metadata, candidate, candidate_image, &context)
        })
        .await
    }

    async fn classify_once(
        &self,
        crop_url: &str,
        metadata: &ItemMetadata,
        candidate: &CandidateProduct,
        candidate_image: &str,
        context: &str,
    ) -> Result<TierVerdict, VisionError> {
        let request = CompareRequest {
            item_image_url: crop_url,
            candidate_image_url: candidate_image,
            item_metadata: WireMetadata::from_metadata(metadata),
            candidate: WireCandidate::from_product(candidate),
            instructions: TIER_POLICY,
        };

        let body = self.post_json("v1/compare", &request, context).await?;
        let raw: RawTierVerdict =
            serde_json::from_str(&body).map_err(|e| VisionError::MalformedResponse {
                context: context.to_owned(),
                reason: e.to_string(),
            })?;

        let verdict = TierVerdict::from_raw(raw, context)?;
        tracing::debug!(
            candidate = %candidate.catalog_key,
            tier = %verdict.tier,
            confidence = verdict.confidence,
            visual_similarity = verdict.visual_similarity,
            "pairwise classification completed"
        );
        Ok(verdict)
    }

    /// Submits all surviving candidates in one call and returns the
    /// service's selection verdict with per-candidate similarities.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`Self::classify_pair`]; additionally a
    /// `selected_index` out of bounds or a similarity list whose length
    /// differs from `candidates.len()` is a malformed response.
    pub async fn select_best(
        &self,
        crop_url: &str,
        metadata: &ItemMetadata,
        candidates: &[CandidateProduct],
    ) -> Result<SelectionVerdict, VisionError> {
        let context = format!("select({} candidates)", candidates.len());
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            self.select_once(crop_url, metadata, candidates, &context)
        })
        .await
    }

    async fn select_once(
        &self,
        crop_url: &str,
        metadata: &ItemMetadata,
        candidates: &[CandidateProduct],
        context: &str,
    ) -> Result<SelectionVerdict, VisionError> {
        let request = SelectRequest {
            item_image_url: crop_url,
            item_metadata: WireMetadata::from_metadata(metadata),
            candidates: candidates.iter().map(WireCandidate::from_product).collect(),
            instructions: SELECTION_POLICY,
        };

        let body = self.post_json("v1/select", &request, context).await?;
        let raw: RawSelectionVerdict =
            serde_json::from_str(&body).map_err(|e| VisionError::MalformedResponse {
                context: context.to_owned(),
                reason: e.to_string(),
            })?;

        let verdict = SelectionVerdict::from_raw(raw, candidates.len(), context)?;
        tracing::debug!(
            candidates = candidates.len(),
            selected_index = ?verdict.selected_index,
            "joint selection completed"
        );
        Ok(verdict)
    }

    async fn post_json<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
        context: &str,
    ) -> Result<String, VisionError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| VisionError::InvalidBaseUrl {
                base_url: self.base_url.to_string(),
                reason: e.to_string(),
            })?;

        let mut request = self.client.post(url.clone()).json(body);
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
            return Err(VisionError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            if status.is_server_error() {
                return Err(VisionError::Http(
                    response.error_for_status().expect_err("status is 5xx"),
                ));
            }
            tracing::warn!(context, status = status.as_u16(), "vision call rejected");
            return Err(VisionError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}
