//! CLI output formatting

use crate::core::{PipelineStatus, RunSummary};
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Format a pipeline status for display
pub fn format_status(status: PipelineStatus) -> String {
    match status {
        PipelineStatus::Pending => style("PENDING").dim().to_string(),
        PipelineStatus::CheckedOut => style("CHECKED OUT").cyan().to_string(),
        PipelineStatus::Running => style("RUNNING").yellow().to_string(),
        PipelineStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        PipelineStatus::Failed => style("FAILED").red().to_string(),
        PipelineStatus::TimedOut => style("TIMED OUT").red().to_string(),
    }
}

/// Format a matrix assignment as `key=value` pairs
pub fn format_assignment(assignment: &crate::core::MatrixAssignment) -> String {
    if assignment.is_empty() {
        return style("(no matrix)").dim().to_string();
    }
    assignment
        .iter()
        .map(|(k, v)| format!("{}={}", style(k).cyan(), v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format the end-of-run summary, one line per attempted variant
pub fn format_summary(summary: &RunSummary) -> String {
    let mut lines = Vec::new();
    for outcome in &summary.outcomes {
        let icon = match outcome.status {
            PipelineStatus::Succeeded => CHECK,
            PipelineStatus::TimedOut => WARN,
            _ => CROSS,
        };
        let mut line = format!(
            "{} {} - {} [{}]",
            icon,
            style(&summary.pipeline_name).bold(),
            format_status(outcome.status),
            format_assignment(&outcome.assignment),
        );
        if let Some(error) = &outcome.error {
            line.push_str(&format!(" - {}", style(error).dim()));
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// Format a duration compactly
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
