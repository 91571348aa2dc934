//! sitepilot — pipeline client for AI-driven business website generation.
//!
//! Reconciles two independent progress sources — a WebSocket push
//! channel and a pull-based status poll — into one consistent,
//! monotonically-advancing view of a two-phase background job
//! (research, then generation) per business.

pub mod backend;
pub mod channel;
pub mod config;
pub mod controller;
pub mod errors;
pub mod poller;
pub mod progress;
pub mod ui;

pub use controller::{PipelineController, PipelineSession, StartOutcome, TEMPLATES};
pub use errors::{BackendError, PipelineError};
pub use progress::{ApplyOutcome, Phase, PhaseKind, PhaseState, PipelineEvent, ProgressEvent};
