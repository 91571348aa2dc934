//! HTTP client for the dashboard backend.
//!
//! Three calls cover everything the pipeline needs: start a research
//! job, pull research status (the poller's recovery path), and start a
//! generation job. `BackendApi` is the seam the controller and tests
//! program against; `HttpBackend` is the reqwest implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::errors::BackendError;
use crate::poller::StatusSource;

/// Lifecycle status of a backend job, as reported by the pull API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Authoritative phase status from the pull API. The backend's research
/// payload carries much more (description, services, reviews, ...);
/// only the fields the pipeline consumes are deserialized.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusReport {
    pub status: JobStatus,
    #[serde(default)]
    pub error: Option<String>,
}

/// The backend calls the pipeline controller issues.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// `POST /research/{business_id}/start`
    async fn start_research(&self, business_id: &str) -> Result<(), BackendError>;

    /// `GET /research/{business_id}`
    async fn research_status(&self, business_id: &str) -> Result<StatusReport, BackendError>;

    /// `POST /websites/generate`
    async fn generate_website(
        &self,
        business_id: &str,
        template_id: &str,
    ) -> Result<(), BackendError>;
}

/// reqwest-backed implementation of [`BackendApi`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a non-2xx response to [`BackendError::Status`], pulling the
    /// FastAPI `detail` string out of the body when present.
    async fn check(url: &str, response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let code = response.status();
        if code.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("detail")?.as_str().map(String::from))
            .unwrap_or(body);
        Err(BackendError::Status {
            url: url.to_string(),
            code: code.as_u16(),
            detail,
        })
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn start_research(&self, business_id: &str) -> Result<(), BackendError> {
        let url = self.url(&format!("/research/{business_id}/start"));
        debug!(%url, "starting research job");
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|source| BackendError::Request {
                url: url.clone(),
                source,
            })?;
        Self::check(&url, response).await?;
        Ok(())
    }

    async fn research_status(&self, business_id: &str) -> Result<StatusReport, BackendError> {
        let url = self.url(&format!("/research/{business_id}"));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| BackendError::Request {
                url: url.clone(),
                source,
            })?;

        // 404 means no research record exists yet for this business;
        // for the poller that is simply "not started".
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(StatusReport {
                status: JobStatus::Pending,
                error: None,
            });
        }

        let response = Self::check(&url, response).await?;
        response
            .json::<StatusReport>()
            .await
            .map_err(|source| BackendError::Decode {
                url: url.clone(),
                source,
            })
    }

    async fn generate_website(
        &self,
        business_id: &str,
        template_id: &str,
    ) -> Result<(), BackendError> {
        let url = self.url("/websites/generate");
        debug!(%url, %template_id, "starting generation job");
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "business_id": business_id,
                "template_id": template_id,
            }))
            .send()
            .await
            .map_err(|source| BackendError::Request {
                url: url.clone(),
                source,
            })?;
        Self::check(&url, response).await?;
        Ok(())
    }
}

#[async_trait]
impl StatusSource for HttpBackend {
    async fn fetch(&self, business_id: &str) -> Result<StatusReport, BackendError> {
        self.research_status(business_id).await
    }
}
