//! Phase state machine and the progress reducer.
//!
//! A `Phase` aggregates an ordered list of steps into one pipeline stage
//! (research or generation). `Phase::apply` is the single reducer through
//! which every progress event flows, whichever source delivered it. The
//! reducer is idempotent under duplicate and out-of-order delivery:
//! applying the same event twice, or an older event after a newer one,
//! leaves the phase unchanged.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::progress::event::ProgressEvent;
use crate::progress::step::{Step, StepStatus, generation_steps, research_steps};

/// Which of the two pipeline stages a phase represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Research,
    Generation,
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseKind::Research => write!(f, "research"),
            PhaseKind::Generation => write!(f, "generation"),
        }
    }
}

/// Lifecycle state of a phase.
///
/// Transitions are forward-only, except `Failed -> InProgress` which is
/// reachable through an explicit restart (`Phase::reset` followed by
/// `Phase::begin`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

/// What the reducer did with an event. `Stale` and `UnknownStep` are
/// silent no-ops in production but observable in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The event was merged into the phase
    Applied,
    /// The event carried lower progress than already recorded and was dropped
    Stale,
    /// The event named a step id not present in this phase
    UnknownStep,
}

/// One pipeline stage: an ordered step list plus a lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub kind: PhaseKind,
    pub steps: Vec<Step>,
    pub state: PhaseState,
}

impl Phase {
    /// The research phase with its built-in step catalog.
    pub fn research() -> Self {
        Self {
            kind: PhaseKind::Research,
            steps: research_steps(),
            state: PhaseState::NotStarted,
        }
    }

    /// The generation phase with its built-in step catalog.
    pub fn generation() -> Self {
        Self {
            kind: PhaseKind::Generation,
            steps: generation_steps(),
            state: PhaseState::NotStarted,
        }
    }

    /// Merge one progress event into the phase.
    ///
    /// Rules, in order:
    /// 1. Unknown step id: no-op (`UnknownStep`).
    /// 2. Error events always apply, set the phase to `Failed`, and skip
    ///    the monotonic guard (last write wins).
    /// 3. Progress lower than recorded: dropped (`Stale`). This is what
    ///    makes duplicate and reordered delivery harmless.
    /// 4. Otherwise the step takes the event's progress and message, its
    ///    status derives from progress (100 => completed), and every
    ///    still-pending step *before* it back-fills to completed — steps
    ///    execute strictly in declared order, and the backend is not
    ///    required to emit a completion event for each one.
    pub fn apply(&mut self, event: &ProgressEvent) -> ApplyOutcome {
        let Some(idx) = self.steps.iter().position(|s| s.id == event.step) else {
            debug!(phase = %self.kind, step = %event.step, "ignoring event for unknown step");
            return ApplyOutcome::UnknownStep;
        };

        // Constructed events are already clamped; deserialized ones may
        // not be. The reducer re-clamps so step progress can never
        // leave [0, 100].
        let progress = event.progress.min(100);

        if event.is_error() {
            let step = &mut self.steps[idx];
            step.progress = progress;
            step.status = StepStatus::Error;
            step.message = event.message.clone();
            self.state = PhaseState::Failed;
            return ApplyOutcome::Applied;
        }

        if progress < self.steps[idx].progress {
            debug!(
                phase = %self.kind,
                step = %event.step,
                incoming = progress,
                recorded = self.steps[idx].progress,
                "dropping stale progress event"
            );
            return ApplyOutcome::Stale;
        }

        let step = &mut self.steps[idx];
        step.progress = progress;
        step.status = if progress == 100 {
            StepStatus::Completed
        } else {
            StepStatus::InProgress
        };
        step.message = event.message.clone();

        for earlier in &mut self.steps[..idx] {
            if earlier.status == StepStatus::Pending {
                earlier.force_complete();
            }
        }

        self.recompute_state();
        ApplyOutcome::Applied
    }

    /// Derived overall progress: arithmetic mean of step progresses,
    /// always within 0-100.
    pub fn overall_progress(&self) -> u8 {
        if self.steps.is_empty() {
            return 0;
        }
        let sum: u32 = self.steps.iter().map(|s| s.progress as u32).sum();
        ((sum as f64) / (self.steps.len() as f64)).round() as u8
    }

    /// Mark the phase as started: state moves to `InProgress` and the
    /// first step begins. Call after the backend start call succeeds.
    pub fn begin(&mut self) {
        self.state = PhaseState::InProgress;
        if let Some(first) = self.steps.first_mut() {
            if first.status == StepStatus::Pending {
                first.status = StepStatus::InProgress;
            }
        }
    }

    /// Reset all steps to pending at zero. Re-invoking a phase's start
    /// command after a failure goes through here, which is the only path
    /// from `Failed` back to `InProgress`.
    pub fn reset(&mut self) {
        for step in &mut self.steps {
            step.reset();
        }
        self.state = PhaseState::NotStarted;
    }

    pub fn is_completed(&self) -> bool {
        self.state == PhaseState::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.state == PhaseState::Failed
    }

    /// First step that reported an error, if the phase failed.
    pub fn failed_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.status == StepStatus::Error)
    }

    /// Step ids in declared order; the poller uses these to synthesize
    /// recovery events.
    pub fn step_ids(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.id.clone()).collect()
    }

    fn recompute_state(&mut self) {
        if self.steps.iter().any(|s| s.status == StepStatus::Error) {
            self.state = PhaseState::Failed;
        } else if self.steps.iter().all(|s| s.status == StepStatus::Completed) {
            self.state = PhaseState::Completed;
        } else if self.steps.iter().any(|s| s.status != StepStatus::Pending) {
            self.state = PhaseState::InProgress;
        }
        // All steps pending: keep the current state.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::event::EventStatus;

    fn step_by_id<'a>(phase: &'a Phase, id: &str) -> &'a Step {
        phase.steps.iter().find(|s| s.id == id).unwrap()
    }

    #[test]
    fn fresh_phase_is_not_started_at_zero() {
        let phase = Phase::research();
        assert_eq!(phase.state, PhaseState::NotStarted);
        assert_eq!(phase.overall_progress(), 0);
        assert!(phase.steps.iter().all(|s| s.status == StepStatus::Pending));
    }

    #[test]
    fn mid_list_event_back_fills_earlier_pending_steps() {
        // Steps [init, google, social, analysis] all pending/0.
        // Apply {step: social, progress: 40}:
        // init and google complete at 100, social in_progress at 40,
        // analysis stays pending, overall = (100+100+40+0)/4 = 60.
        let mut phase = Phase::research();
        let outcome = phase.apply(&ProgressEvent::new("social", 40));
        assert_eq!(outcome, ApplyOutcome::Applied);

        assert_eq!(step_by_id(&phase, "init").status, StepStatus::Completed);
        assert_eq!(step_by_id(&phase, "init").progress, 100);
        assert_eq!(step_by_id(&phase, "google").status, StepStatus::Completed);
        assert_eq!(step_by_id(&phase, "google").progress, 100);
        assert_eq!(step_by_id(&phase, "social").status, StepStatus::InProgress);
        assert_eq!(step_by_id(&phase, "social").progress, 40);
        assert_eq!(step_by_id(&phase, "analysis").status, StepStatus::Pending);
        assert_eq!(step_by_id(&phase, "analysis").progress, 0);

        assert_eq!(phase.overall_progress(), 60);
        assert_eq!(phase.state, PhaseState::InProgress);
    }

    #[test]
    fn regressing_event_is_dropped_without_changes() {
        let mut phase = Phase::research();
        phase.apply(&ProgressEvent::new("social", 40));
        let snapshot = phase.clone();

        let outcome = phase.apply(&ProgressEvent::new("social", 20));
        assert_eq!(outcome, ApplyOutcome::Stale);
        assert_eq!(
            serde_json::to_value(&phase).unwrap(),
            serde_json::to_value(&snapshot).unwrap()
        );
    }

    #[test]
    fn equal_progress_event_reapplies_idempotently() {
        let mut phase = Phase::research();
        phase.apply(&ProgressEvent::new("google", 50).with_message("searching"));
        let snapshot = phase.clone();

        // The backend replays stored progress on subscribe; duplicates
        // must be harmless.
        let outcome = phase.apply(&ProgressEvent::new("google", 50).with_message("searching"));
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(
            serde_json::to_value(&phase).unwrap(),
            serde_json::to_value(&snapshot).unwrap()
        );
    }

    #[test]
    fn unknown_step_is_a_no_op() {
        let mut phase = Phase::research();
        let snapshot = phase.clone();
        let outcome = phase.apply(&ProgressEvent::new("nonexistent", 80));
        assert_eq!(outcome, ApplyOutcome::UnknownStep);
        assert_eq!(
            serde_json::to_value(&phase).unwrap(),
            serde_json::to_value(&snapshot).unwrap()
        );
    }

    #[test]
    fn per_step_progress_is_non_decreasing_across_any_sequence() {
        let mut phase = Phase::research();
        let deliveries = [
            ("init", 30u8),
            ("google", 10),
            ("init", 10), // stale
            ("google", 90),
            ("social", 5),
            ("google", 40), // stale
            ("analysis", 100),
        ];

        let mut high_water: std::collections::HashMap<String, u8> = Default::default();
        for (step, progress) in deliveries {
            phase.apply(&ProgressEvent::new(step, progress));
            for s in &phase.steps {
                let prev = high_water.entry(s.id.clone()).or_insert(0);
                assert!(s.progress >= *prev, "step {} regressed", s.id);
                *prev = s.progress;
            }
            assert!(phase.overall_progress() <= 100);
        }
    }

    #[test]
    fn out_of_range_deserialized_progress_is_clamped_on_apply() {
        // The builders clamp, but a deserialized event carries whatever
        // the payload said; the reducer must re-clamp.
        let mut phase = Phase::research();
        let event: ProgressEvent =
            serde_json::from_str(r#"{"step":"google","progress":250}"#).unwrap();

        let outcome = phase.apply(&event);
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(step_by_id(&phase, "google").progress, 100);
        assert_eq!(step_by_id(&phase, "google").status, StepStatus::Completed);
        assert!(phase.overall_progress() <= 100);
    }

    #[test]
    fn step_at_100_becomes_completed() {
        let mut phase = Phase::generation();
        phase.apply(&ProgressEvent::new("template", 100));
        assert_eq!(step_by_id(&phase, "template").status, StepStatus::Completed);
    }

    #[test]
    fn phase_completes_only_when_all_steps_complete() {
        let mut phase = Phase::generation();
        phase.apply(&ProgressEvent::new("template", 100));
        phase.apply(&ProgressEvent::new("content", 100));
        assert_eq!(phase.state, PhaseState::InProgress);

        phase.apply(&ProgressEvent::new("optimization", 100));
        assert_eq!(phase.state, PhaseState::Completed);
        assert!(phase.is_completed());
        assert_eq!(phase.overall_progress(), 100);
    }

    #[test]
    fn error_event_fails_the_phase_even_with_lower_progress() {
        let mut phase = Phase::research();
        phase.apply(&ProgressEvent::new("google", 80));

        let outcome = phase.apply(
            &ProgressEvent::new("google", 10)
                .with_status(EventStatus::Error)
                .with_message("search quota exceeded"),
        );
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(phase.state, PhaseState::Failed);
        assert!(phase.is_failed());

        let failed = phase.failed_step().unwrap();
        assert_eq!(failed.id, "google");
        assert_eq!(failed.message.as_deref(), Some("search quota exceeded"));
    }

    #[test]
    fn restart_after_failure_resets_all_steps() {
        let mut phase = Phase::research();
        phase.apply(&ProgressEvent::new("social", 40));
        phase.apply(&ProgressEvent::errored("social", "agent crashed"));
        assert_eq!(phase.state, PhaseState::Failed);

        phase.reset();
        assert_eq!(phase.state, PhaseState::NotStarted);
        assert!(phase.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert!(phase.steps.iter().all(|s| s.progress == 0));

        phase.begin();
        assert_eq!(phase.state, PhaseState::InProgress);
        assert_eq!(step_by_id(&phase, "init").status, StepStatus::InProgress);
        assert_eq!(step_by_id(&phase, "init").progress, 0);
    }

    #[test]
    fn synthesized_completion_for_every_step_completes_the_phase() {
        // The poller recovery path: terminal status pulled, no push
        // events ever received.
        let mut phase = Phase::research();
        for id in phase.step_ids() {
            phase.apply(&ProgressEvent::completed(&id));
        }
        assert_eq!(phase.state, PhaseState::Completed);
        assert_eq!(phase.overall_progress(), 100);
    }

    #[test]
    fn overall_progress_rounds_the_mean() {
        let mut phase = Phase::generation(); // 3 steps
        phase.apply(&ProgressEvent::new("template", 50));
        // (50 + 0 + 0) / 3 = 16.67 -> 17
        assert_eq!(phase.overall_progress(), 17);
    }

    #[test]
    fn begin_is_safe_on_partially_progressed_phase() {
        let mut phase = Phase::research();
        phase.apply(&ProgressEvent::new("init", 100));
        phase.begin();
        // Already-completed first step must not be demoted.
        assert_eq!(step_by_id(&phase, "init").status, StepStatus::Completed);
        assert_eq!(phase.state, PhaseState::InProgress);
    }
}
