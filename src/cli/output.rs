//! CLI output formatting

use crate::{
    backend::LogStream,
    core::{RunStatus, StepKind, StepState, TriggerDecision},
    execution::{ExecutionEvent, RunLogSink},
    persistence::RunSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

fn short_id(id: &Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// Create a spinner for a long-running step
pub fn create_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(spinner_style) =
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
    {
        spinner.set_style(spinner_style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Shows a spinner while the build or test step of a single run is active
#[derive(Default)]
pub struct StepProgress {
    current: Mutex<Option<ProgressBar>>,
}

impl StepProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_event(&self, event: &ExecutionEvent) {
        let Ok(mut current) = self.current.lock() else {
            return;
        };

        if let Some(spinner) = current.take() {
            spinner.finish_and_clear();
        }

        if let ExecutionEvent::StepStarted { step, .. } = event {
            if matches!(step, StepKind::Build | StepKind::Test) {
                *current = Some(create_spinner(format!("{}...", step.name())));
            }
        }
    }
}

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Completed { .. } => style("COMPLETED").green().to_string(),
        StepState::Failed { .. } => style("FAILED").red().to_string(),
        StepState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Pending => style("PENDING").dim().to_string(),
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Passed => style("PASSED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Format a trigger decision for display
pub fn format_decision(decision: &TriggerDecision) -> String {
    match decision {
        TriggerDecision::Trigger { reason } => {
            format!("{} {} ({})", ROCKET, style("triggered").green(), reason)
        }
        TriggerDecision::Skip { reason } => {
            format!("{} {} ({})", SKIP, style("skipped").yellow(), reason)
        }
    }
}

/// Format run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        RunStatus::Passed => CHECK,
        RunStatus::Failed => CROSS,
        RunStatus::Running => SPINNER,
        RunStatus::Pending => INFO,
    };

    let mut line = format!(
        "{} {} - {} - {} - {} ({}/{})",
        status_icon,
        style(short_id(&summary.run_id)).dim(),
        style(&summary.workflow_name).bold(),
        summary.event,
        format_status(summary.status),
        summary.completed_steps,
        summary.total_steps,
    );
    if let Some(step) = &summary.failed_step {
        line.push_str(&format!(" - failed at {}", style(step).red()));
    }
    line
}

/// Format an execution event for display
pub fn format_run_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted {
            run_id,
            workflow,
            event,
            git_ref,
        } => format!(
            "{} Starting {} for {}{} ({})",
            ROCKET,
            style(workflow).bold(),
            event,
            git_ref
                .as_deref()
                .map(|r| format!(" on {}", r))
                .unwrap_or_default(),
            style(short_id(run_id)).dim()
        ),
        ExecutionEvent::StepStarted { step, .. } => {
            format!("{} {}", SPINNER, style(step.name()).cyan())
        }
        ExecutionEvent::StepOutput { step, output, .. } => {
            format!("{} Output from {}:\n{}", INFO, style(step.id()).dim(), output)
        }
        ExecutionEvent::StepCompleted { step, .. } => {
            format!("{} {}", CHECK, style(step.name()).green())
        }
        ExecutionEvent::StepFailed { step, error, .. } => {
            format!("{} {}: {}", CROSS, style(step.name()).red(), style(error).dim())
        }
        ExecutionEvent::StepSkipped { step, reason, .. } => {
            format!("{} {} ({})", SKIP, style(step.name()).dim(), reason)
        }
        ExecutionEvent::RunCompleted { run_id, status } => {
            let status_str = match status {
                RunStatus::Passed => style("passed").green().to_string(),
                RunStatus::Failed => style("failed").red().to_string(),
                _ => format!("{:?}", status),
            };
            format!(
                "{} Run ({}) {}",
                INFO,
                style(short_id(run_id)).dim(),
                status_str
            )
        }
    }
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[lines.len() - max_lines..].join("\n");
        format!(
            "{}... ({} earlier lines)\n{}",
            style("[truncated]").dim(),
            lines.len() - max_lines,
            truncated
        )
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Prints build and test output lines as they arrive
///
/// A separator is printed whenever the producing run or step changes, so
/// interleaved output from parallel runs stays attributable.
#[derive(Default)]
pub struct TerminalLogSink {
    last: Mutex<Option<(Uuid, StepKind)>>,
}

impl TerminalLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn print_separator(&self) {
        let width = term_size::dimensions_stdout()
            .map(|(w, _)| w)
            .unwrap_or(80);
        println!("{}", style("─".repeat(width)).dim());
    }
}

impl RunLogSink for TerminalLogSink {
    fn on_step_line(&self, run_id: Uuid, step: StepKind, stream: LogStream, line: &str) {
        if let Ok(mut last) = self.last.lock() {
            if *last != Some((run_id, step)) {
                self.print_separator();
                *last = Some((run_id, step));
            }
        }

        let prefix = format!("[{} {}]", short_id(&run_id), step.id());
        match stream {
            LogStream::Stdout => println!("{} {}", style(prefix).dim(), line),
            LogStream::Stderr => println!("{} {}", style(prefix).yellow(), line),
        }
        let _ = io::stdout().flush();
    }
}
