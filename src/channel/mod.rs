//! Push-channel wire types.
//!
//! One WebSocket connection per dashboard session. Outbound control
//! messages bind the session's client id to a business; inbound messages
//! carry step-level progress for either phase. The backend also replays
//! the latest stored progress per business right after a subscribe, so
//! duplicates are part of normal operation here.

pub mod subscriber;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::progress::{EventStatus, PipelineEvent, ProgressEvent};

pub use subscriber::{ChannelSubscriber, SubscriberHandle};

/// Control messages sent by this client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this connection to a business entity's progress topic
    Subscribe { business_id: String },
    /// Keepalive; the backend answers with `pong`
    Ping,
}

/// Messages received from the backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ResearchProgress(ProgressUpdate),
    GenerationProgress(ProgressUpdate),
    Pong,
}

/// Step-level progress payload as the backend broadcasts it.
///
/// `progress` arrives as a float and gets clamped to 0-100 on
/// conversion; `status` is kept as the raw string because only a few
/// values are meaningful and unknown ones must not poison the message.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressUpdate {
    pub step: String,
    pub progress: f64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub business_id: Option<String>,
    /// Backend-local timestamp, ISO format without offset
    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
}

impl ProgressUpdate {
    /// Convert to the reducer's transport-agnostic event.
    pub fn into_event(self) -> ProgressEvent {
        let status = match self.status.as_deref() {
            Some("error") => Some(EventStatus::Error),
            Some("completed") => Some(EventStatus::Completed),
            Some("in_progress") => Some(EventStatus::InProgress),
            _ => None,
        };
        ProgressEvent {
            step: self.step,
            progress: self.progress.clamp(0.0, 100.0).round() as u8,
            status,
            message: self.message,
        }
    }
}

impl ServerMessage {
    /// Route an inbound message to the matching phase, or `None` for
    /// non-progress traffic.
    pub fn into_pipeline_event(self) -> Option<PipelineEvent> {
        match self {
            ServerMessage::ResearchProgress(update) => {
                Some(PipelineEvent::research(update.into_event()))
            }
            ServerMessage::GenerationProgress(update) => {
                Some(PipelineEvent::generation(update.into_event()))
            }
            ServerMessage::Pong => None,
        }
    }
}
