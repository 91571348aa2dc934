//! Progress tracking: step model, phase state machine, and the
//! idempotent reducer both event sources feed into.

pub mod event;
pub mod phase;
pub mod step;

pub use event::{EventStatus, PipelineEvent, ProgressEvent};
pub use phase::{ApplyOutcome, Phase, PhaseKind, PhaseState};
pub use step::{Step, StepStatus, generation_steps, research_steps};
