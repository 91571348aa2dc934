//! Typed error hierarchy for the sitepilot pipeline.
//!
//! Two top-level enums cover the two subsystems that are allowed to
//! surface errors:
//! - `PipelineError` — controller-level failures (precondition gates,
//!   backend start calls)
//! - `BackendError` — HTTP client failures against the dashboard backend
//!
//! Channel and poller transport failures are intentionally absent: they
//! are recovered internally (reconnect, retry on next tick) and never
//! propagate past their owning task.

use thiserror::Error;

/// Errors surfaced to the operator by the pipeline controller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("research is not complete; finish the research phase before generating")]
    ResearchIncomplete,

    #[error("no template selected; choose a template before generating")]
    TemplateNotSelected,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl PipelineError {
    /// Whether this error is a locally-rejected precondition (no backend
    /// call was made) as opposed to a failed backend call.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            PipelineError::ResearchIncomplete | PipelineError::TemplateNotSelected
        )
    }
}

/// Errors from the backend HTTP client.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("backend returned {code} for {url}: {detail}")]
    Status {
        url: String,
        code: u16,
        detail: String,
    },

    #[error("failed to decode backend response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}
