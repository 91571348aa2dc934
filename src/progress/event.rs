//! Transport-agnostic progress events fed into the reducer.
//!
//! Both event sources (the push channel and the status poller) produce
//! these; the reducer is the single ingestion point, so duplicate and
//! out-of-order delivery across the two sources is expected.

use serde::{Deserialize, Serialize};

use crate::progress::PhaseKind;

/// Status tag carried by a progress event, when the backend sends one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    InProgress,
    Completed,
    Error,
}

/// A single step-level progress update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Step id within the owning phase's step list
    pub step: String,
    /// Percentage complete, 0-100
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EventStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressEvent {
    pub fn new(step: &str, progress: u8) -> Self {
        Self {
            step: step.to_string(),
            progress: progress.min(100),
            status: None,
            message: None,
        }
    }

    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    /// A synthesized full-completion event, used by the poller when the
    /// backend reports a terminal status without granular push events.
    pub fn completed(step: &str) -> Self {
        Self::new(step, 100).with_status(EventStatus::Completed)
    }

    /// A synthesized error event.
    pub fn errored(step: &str, message: &str) -> Self {
        Self::new(step, 0)
            .with_status(EventStatus::Error)
            .with_message(message)
    }

    pub fn is_error(&self) -> bool {
        self.status == Some(EventStatus::Error)
    }
}

/// A progress event routed to one of the two phases of a session.
#[derive(Debug, Clone)]
pub struct PipelineEvent {
    pub phase: PhaseKind,
    pub event: ProgressEvent,
}

impl PipelineEvent {
    pub fn research(event: ProgressEvent) -> Self {
        Self {
            phase: PhaseKind::Research,
            event,
        }
    }

    pub fn generation(event: ProgressEvent) -> Self {
        Self {
            phase: PhaseKind::Generation,
            event,
        }
    }
}
