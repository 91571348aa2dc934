//! The atomic unit of pipeline progress: a named step with a bounded
//! percentage and a status.

use serde::{Deserialize, Serialize};

/// Status of a single pipeline step.
///
/// Invariants maintained by the reducer: `Completed` implies
/// `progress == 100`, `Pending` implies `progress == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not started yet
    Pending,
    /// Currently executing
    InProgress,
    /// Finished successfully
    Completed,
    /// The backend reported a failure on this step
    Error,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Error)
    }
}

/// One unit of work inside a phase.
///
/// `id` is stable and unique within the owning phase's step list;
/// `name` and `description` are display metadata and never change after
/// creation. `progress` is monotonically non-decreasing for the life of
/// the step (the reducer enforces this, error events excepted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub description: String,
    pub progress: u8,
    pub status: StepStatus,
    /// Last human-readable detail string from the backend, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Step {
    /// Create a fresh step in the `Pending` state.
    pub fn new(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            progress: 0,
            status: StepStatus::Pending,
            message: None,
        }
    }

    /// Reset progress and status, keeping the display metadata.
    pub fn reset(&mut self) {
        self.progress = 0;
        self.status = StepStatus::Pending;
        self.message = None;
    }

    /// Force the step to completed at full progress (back-fill and
    /// poller recovery both use this).
    pub fn force_complete(&mut self) {
        self.progress = 100;
        self.status = StepStatus::Completed;
    }
}

/// The research phase step catalog, in execution order.
pub fn research_steps() -> Vec<Step> {
    vec![
        Step::new(
            "init",
            "Initializing Research",
            "Setting up AI research agent",
        ),
        Step::new(
            "google",
            "Google Search",
            "Searching for business information online",
        ),
        Step::new(
            "social",
            "Social Media Analysis",
            "Checking Facebook, Instagram, and other platforms",
        ),
        Step::new(
            "analysis",
            "AI Content Analysis",
            "Analyzing and summarizing gathered information",
        ),
    ]
}

/// The generation phase step catalog, in execution order.
pub fn generation_steps() -> Vec<Step> {
    vec![
        Step::new(
            "template",
            "Template Processing",
            "Loading and customizing selected template",
        ),
        Step::new(
            "content",
            "Content Generation",
            "AI generating website content",
        ),
        Step::new(
            "optimization",
            "SEO Optimization",
            "Optimizing for search engines",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_step_is_pending_at_zero() {
        let step = Step::new("init", "Initializing Research", "Setting up");
        assert_eq!(step.status, StepStatus::Pending);
        assert_eq!(step.progress, 0);
        assert!(step.message.is_none());
    }

    #[test]
    fn reset_clears_progress_but_keeps_metadata() {
        let mut step = Step::new("google", "Google Search", "Searching online");
        step.progress = 70;
        step.status = StepStatus::InProgress;
        step.message = Some("fetching".to_string());

        step.reset();
        assert_eq!(step.progress, 0);
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.message.is_none());
        assert_eq!(step.id, "google");
        assert_eq!(step.name, "Google Search");
    }

    #[test]
    fn force_complete_pins_progress_to_100() {
        let mut step = Step::new("social", "Social Media Analysis", "Checking platforms");
        step.force_complete();
        assert_eq!(step.progress, 100);
        assert_eq!(step.status, StepStatus::Completed);
    }

    #[test]
    fn catalogs_are_ordered_and_unique() {
        let research = research_steps();
        assert_eq!(
            research.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            ["init", "google", "social", "analysis"]
        );

        let generation = generation_steps();
        assert_eq!(
            generation.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            ["template", "content", "optimization"]
        );
    }

    #[test]
    fn step_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&StepStatus::InProgress).unwrap(),
            r#""in_progress""#
        );
        assert_eq!(
            serde_json::to_string(&StepStatus::Pending).unwrap(),
            r#""pending""#
        );
    }

    #[test]
    fn terminal_statuses() {
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Error.is_terminal());
        assert!(!StepStatus::InProgress.is_terminal());
        assert!(!StepStatus::Pending.is_terminal());
    }
}
