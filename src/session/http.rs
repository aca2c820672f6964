//! HTTP client for the review session service.
//!
//! All calls are unauthenticated GETs with a per-request timeout. Errors are
//! returned as [`ReviewLoopError::Service`]; the resolver and feedback
//! aggregator decide what a failure means.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{PendingResponse, SessionListing, SessionRecord};
use crate::error::ReviewLoopError;
use crate::testing::ReviewService;

/// [`ReviewService`] backed by the service's REST API.
#[derive(Debug, Clone)]
pub struct HttpReviewService {
    http: Client,
    base_url: Url,
}

impl HttpReviewService {
    /// Create a client for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> crate::Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ReviewLoopError::invalid_config("serviceUrl", e.to_string()))?;
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("review-loop/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReviewLoopError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, base_url })
    }

    /// Build `<base>/api/sessions[/<id>[/<suffix>]]`, encoding the id as one segment.
    fn endpoint(&self, session_id: Option<&str>, suffix: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| ReviewLoopError::service(self.base_url.as_str(), "base URL cannot have a path"))?;
            segments.pop_if_empty().extend(["api", "sessions"]);
            if let Some(id) = session_id {
                segments.push(id);
            }
            if let Some(suffix) = suffix {
                segments.push(suffix);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("GET {url}");
        let endpoint = url.path().to_string();

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ReviewLoopError::service(&endpoint, e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(ReviewLoopError::service(&endpoint, format!("HTTP {status}")).into());
        }

        resp.json::<T>()
            .await
            .map_err(|e| ReviewLoopError::service(&endpoint, format!("invalid response body: {e}")).into())
    }
}

#[async_trait]
impl ReviewService for HttpReviewService {
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let listing: SessionListing = self.get_json(self.endpoint(None, None)?).await?;
        Ok(listing.sessions)
    }

    async fn session_detail(&self, session_id: &str) -> Result<SessionRecord> {
        self.get_json(self.endpoint(Some(session_id), None)?).await
    }

    async fn pending(&self, session_id: &str) -> Result<PendingResponse> {
        self.get_json(self.endpoint(Some(session_id), Some("pending"))?)
            .await
    }
}
