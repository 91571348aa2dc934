//! CLI command implementations.
//!
//! All three commands (`watch`, `research`, `generate`) share the same
//! session loop: spawn the channel subscriber and the research status
//! poller, then apply every event through the controller and redraw.
//! They differ only in which command is issued before the loop starts.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use sitepilot::backend::HttpBackend;
use sitepilot::channel::ChannelSubscriber;
use sitepilot::config::PipelineConfig;
use sitepilot::controller::{PipelineController, StartOutcome, TEMPLATES};
use sitepilot::poller::{StatusPoller, StatusSource};
use sitepilot::progress::{PhaseKind, PhaseState};
use sitepilot::ui::PipelineUI;

/// What the operator asked the session to do.
pub enum SessionCommand {
    /// Observe only; hydrate from the poller and follow along
    Watch,
    /// Start (or resume watching) the research phase
    Research,
    /// Generate with the given template once research is complete
    Generate { template_id: String },
}

/// `sitepilot watch <business-id>`
pub async fn cmd_watch(config: &PipelineConfig, business_id: &str) -> Result<()> {
    run_session(config, business_id, SessionCommand::Watch).await
}

/// `sitepilot research <business-id>`
pub async fn cmd_research(config: &PipelineConfig, business_id: &str) -> Result<()> {
    run_session(config, business_id, SessionCommand::Research).await
}

/// `sitepilot generate <business-id> --template <id>`
pub async fn cmd_generate(
    config: &PipelineConfig,
    business_id: &str,
    template_id: &str,
) -> Result<()> {
    if !TEMPLATES.iter().any(|t| t.id == template_id) {
        let known: Vec<&str> = TEMPLATES.iter().map(|t| t.id).collect();
        anyhow::bail!(
            "unknown template '{}'; available: {}",
            template_id,
            known.join(", ")
        );
    }
    run_session(
        config,
        business_id,
        SessionCommand::Generate {
            template_id: template_id.to_string(),
        },
    )
    .await
}

async fn run_session(
    config: &PipelineConfig,
    business_id: &str,
    command: SessionCommand,
) -> Result<()> {
    let backend = Arc::new(HttpBackend::new(&config.backend_url));
    let mut controller = PipelineController::new(business_id, backend.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscriber = ChannelSubscriber::spawn(
        &config.ws_url,
        business_id,
        &controller.session().client_id,
        config.backoff(),
        tx.clone(),
    );
    let mut research_poller = Some(StatusPoller::spawn(
        backend.clone() as Arc<dyn StatusSource>,
        business_id,
        PhaseKind::Research,
        controller.research().step_ids(),
        config.poll_interval(),
        tx.clone(),
    ));
    drop(tx);

    let ui = PipelineUI::new(controller.research(), controller.generation());

    let mut pending_template = match command {
        SessionCommand::Watch => None,
        SessionCommand::Research => {
            match controller.start_research().await? {
                StartOutcome::Started => ui.print_line("Research started"),
                StartOutcome::AlreadyRunning => ui.print_line("Research already in progress"),
            }
            None
        }
        SessionCommand::Generate { template_id } => {
            ui.print_line(format!(
                "Waiting for research to complete before generating with '{template_id}'"
            ));
            Some(template_id)
        }
    };

    ui.render(controller.research(), controller.generation());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                ui.print_line("Interrupted; backend jobs keep running");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else {
                    debug!("all event sources stopped");
                    break;
                };
                controller.apply(&event);

                // The research poller is only needed while that phase is
                // unresolved.
                if matches!(
                    controller.research().state,
                    PhaseState::Completed | PhaseState::Failed
                ) {
                    if let Some(poller) = research_poller.take() {
                        poller.stop().await;
                    }
                }

                if controller.research().is_completed() {
                    if let Some(template_id) = pending_template.take() {
                        controller.select_template(&template_id);
                        match controller.start_generation().await {
                            Ok(_) => ui.print_line(format!(
                                "Generation started with template '{template_id}'"
                            )),
                            Err(e) if e.is_precondition() => {
                                ui.print_line(format!("Cannot generate: {e}"));
                                break;
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                }

                ui.render(controller.research(), controller.generation());

                if controller.is_complete() {
                    ui.print_line("Website generated successfully");
                    break;
                }
                if let Some(failed) = report_failure(&controller) {
                    ui.print_line(failed);
                    break;
                }
            }
        }
    }

    ui.finish();
    subscriber.stop().await;
    if let Some(poller) = research_poller {
        poller.stop().await;
    }
    Ok(())
}

/// A one-line failure report with the failing step's message, if either
/// phase has failed.
fn report_failure(controller: &PipelineController) -> Option<String> {
    for phase in [controller.research(), controller.generation()] {
        if phase.is_failed() {
            let detail = phase
                .failed_step()
                .and_then(|s| s.message.clone())
                .unwrap_or_else(|| "no detail reported".to_string());
            return Some(format!(
                "{} phase failed: {} (re-run the command to retry)",
                phase.kind, detail
            ));
        }
    }
    None
}
