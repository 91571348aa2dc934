use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::progress::{Phase, PhaseState, StepStatus};

const CHECK: &str = "\u{2713}"; // ✓
const CROSS: &str = "\u{2717}"; // ✗

/// Terminal view of a pipeline session, rendered via `indicatif`.
///
/// Each phase gets a header line plus one bar per step; bars fill as
/// reducer snapshots arrive. The layout mirrors the dashboard: research
/// on top, generation below.
pub struct PipelineUI {
    multi: MultiProgress,
    research_header: ProgressBar,
    research_bars: Vec<ProgressBar>,
    generation_header: ProgressBar,
    generation_bars: Vec<ProgressBar>,
}

impl PipelineUI {
    /// Build the bar stack from the session's two phases. Call once,
    /// then [`Self::render`] after every applied event.
    pub fn new(research: &Phase, generation: &Phase) -> Self {
        let multi = MultiProgress::new();

        let header_style = ProgressStyle::default_bar()
            .template("{prefix:.bold} {msg}")
            .expect("progress bar template is a valid static string");
        let step_style = ProgressStyle::default_bar()
            .template("  {prefix:.dim} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let mut add_phase = |title: &str, phase: &Phase| {
            let header = multi.add(ProgressBar::new(0));
            header.set_style(header_style.clone());
            header.set_prefix(title.to_string());

            let bars = phase
                .steps
                .iter()
                .map(|step| {
                    let bar = multi.add(ProgressBar::new(100));
                    bar.set_style(step_style.clone());
                    bar.set_prefix(format!("{:<22}", step.name));
                    bar
                })
                .collect();
            (header, bars)
        };

        let (research_header, research_bars) = add_phase("Phase 1: AI Research", research);
        let (generation_header, generation_bars) = add_phase("Phase 2: Generation", generation);

        Self {
            multi,
            research_header,
            research_bars,
            generation_header,
            generation_bars,
        }
    }

    /// Redraw both phases from the current reducer state.
    pub fn render(&self, research: &Phase, generation: &Phase) {
        Self::render_phase(&self.research_header, &self.research_bars, research);
        Self::render_phase(&self.generation_header, &self.generation_bars, generation);
    }

    fn render_phase(header: &ProgressBar, bars: &[ProgressBar], phase: &Phase) {
        let status = match phase.state {
            PhaseState::NotStarted => style("not started").dim().to_string(),
            PhaseState::InProgress => style(format!("{}%", phase.overall_progress()))
                .cyan()
                .to_string(),
            PhaseState::Completed => style(format!("{CHECK} complete")).green().to_string(),
            PhaseState::Failed => style(format!("{CROSS} failed")).red().to_string(),
        };
        header.set_message(status);

        for (bar, step) in bars.iter().zip(&phase.steps) {
            bar.set_position(step.progress as u64);
            let msg = match step.status {
                StepStatus::Pending => style("pending").dim().to_string(),
                StepStatus::InProgress => step
                    .message
                    .clone()
                    .map(|m| style(m).yellow().to_string())
                    .unwrap_or_default(),
                StepStatus::Completed => style(CHECK).green().to_string(),
                StepStatus::Error => {
                    let detail = step.message.as_deref().unwrap_or("failed");
                    style(format!("{CROSS} {detail}")).red().to_string()
                }
            };
            bar.set_message(msg);
        }
    }

    /// Print a line above the bars, falling back to stderr if the rich
    /// UI is unavailable.
    pub fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Stop all bars, leaving the final state on screen.
    pub fn finish(&self) {
        for bar in self
            .research_bars
            .iter()
            .chain(self.generation_bars.iter())
        {
            bar.finish();
        }
        self.research_header.finish();
        self.generation_header.finish();
    }
}
