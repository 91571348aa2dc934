//! Pipeline controller: the façade the view layer drives.
//!
//! Owns one `PipelineSession` per open business and enforces the
//! command-side rules: `start_research` is idempotent, generation is
//! gated on completed research plus a selected template, and every
//! progress event — whichever source produced it — enters the state
//! through [`PipelineController::apply`].

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::BackendApi;
use crate::errors::PipelineError;
use crate::progress::{ApplyOutcome, Phase, PhaseKind, PhaseState, PipelineEvent};

/// A website template the operator can pick for generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

/// The built-in template catalog.
pub const TEMPLATES: [Template; 4] = [
    Template {
        id: "minimal",
        name: "Minimal",
        description: "Clean and simple",
    },
    Template {
        id: "modern",
        name: "Modern",
        description: "Contemporary design",
    },
    Template {
        id: "elegant",
        name: "Elegant",
        description: "Sophisticated style",
    },
    Template {
        id: "bold",
        name: "Bold",
        description: "Eye-catching design",
    },
];

/// In-memory state for one open business. Never persisted: a fresh
/// session always re-hydrates from the status poller.
#[derive(Debug, Clone)]
pub struct PipelineSession {
    pub business_id: String,
    /// Ephemeral id for this dashboard instance, generated once per
    /// session and used to scope the push connection
    pub client_id: String,
    pub research: Phase,
    pub generation: Phase,
    pub selected_template_id: Option<String>,
}

impl PipelineSession {
    pub fn new(business_id: &str) -> Self {
        Self {
            business_id: business_id.to_string(),
            client_id: format!("client-{}", Uuid::new_v4()),
            research: Phase::research(),
            generation: Phase::generation(),
            selected_template_id: None,
        }
    }
}

/// Result of an idempotent start command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The backend call was issued and the phase began
    Started,
    /// The phase was already in progress; no backend call was made
    AlreadyRunning,
}

/// Commands and read accessors over one [`PipelineSession`].
pub struct PipelineController {
    session: PipelineSession,
    backend: Arc<dyn BackendApi>,
}

impl PipelineController {
    pub fn new(business_id: &str, backend: Arc<dyn BackendApi>) -> Self {
        Self {
            session: PipelineSession::new(business_id),
            backend,
        }
    }

    pub fn session(&self) -> &PipelineSession {
        &self.session
    }

    pub fn research(&self) -> &Phase {
        &self.session.research
    }

    pub fn generation(&self) -> &Phase {
        &self.session.generation
    }

    pub fn selected_template(&self) -> Option<&str> {
        self.session.selected_template_id.as_deref()
    }

    /// Generation may start once research completed and a template is
    /// chosen.
    pub fn can_start_generation(&self) -> bool {
        self.session.research.is_completed() && self.session.selected_template_id.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.session.research.is_completed() && self.session.generation.is_completed()
    }

    /// Record the operator's template choice. Only effective once
    /// research has completed (the picker is disabled until then);
    /// returns whether the choice was recorded.
    pub fn select_template(&mut self, template_id: &str) -> bool {
        if !self.session.research.is_completed() {
            warn!(
                business_id = %self.session.business_id,
                %template_id,
                "template selection ignored; research not complete"
            );
            return false;
        }
        self.session.selected_template_id = Some(template_id.to_string());
        true
    }

    /// Start (or restart) the research phase.
    ///
    /// Idempotent: while research is already `in_progress` this is a
    /// no-op and no backend call is issued. From any other state the
    /// steps reset first, which is also the retry path after a failure.
    pub async fn start_research(&mut self) -> Result<StartOutcome, PipelineError> {
        if self.session.research.state == PhaseState::InProgress {
            return Ok(StartOutcome::AlreadyRunning);
        }

        self.session.research.reset();
        self.backend
            .start_research(&self.session.business_id)
            .await?;
        self.session.research.begin();
        info!(business_id = %self.session.business_id, "research started");
        Ok(StartOutcome::Started)
    }

    /// Start (or restart) the generation phase.
    ///
    /// Rejected locally — with no backend call — unless research is
    /// complete and a template has been selected.
    pub async fn start_generation(&mut self) -> Result<StartOutcome, PipelineError> {
        if !self.session.research.is_completed() {
            return Err(PipelineError::ResearchIncomplete);
        }
        let Some(template_id) = self.session.selected_template_id.clone() else {
            return Err(PipelineError::TemplateNotSelected);
        };
        if self.session.generation.state == PhaseState::InProgress {
            return Ok(StartOutcome::AlreadyRunning);
        }

        self.session.generation.reset();
        self.backend
            .generate_website(&self.session.business_id, &template_id)
            .await?;
        self.session.generation.begin();
        info!(
            business_id = %self.session.business_id,
            %template_id,
            "generation started"
        );
        Ok(StartOutcome::Started)
    }

    /// Merge a progress event into the owning phase.
    pub fn apply(&mut self, event: &PipelineEvent) -> ApplyOutcome {
        let phase = match event.phase {
            PhaseKind::Research => &mut self.session.research,
            PhaseKind::Generation => &mut self.session.generation,
        };
        phase.apply(&event.event)
    }
}
