//! CLI output formatting

use crate::core::task::{Task, TaskRegistry};
use crate::sync::engine::FlushReport;
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Format one task with its stage list
pub fn format_task(task: &Task) -> String {
    let stages = task
        .stages
        .iter()
        .map(|s| s.kind.to_string())
        .collect::<Vec<_>>()
        .join(" → ");
    format!(
        "{} [{}] {}",
        style(&task.name).bold(),
        style(task.kind.to_string()).cyan(),
        if stages.is_empty() {
            style("no stages").dim().to_string()
        } else {
            stages
        }
    )
}

/// Print a task registry as an indented tree
pub fn print_registry(registry: &TaskRegistry) {
    for task in registry.tasks() {
        println!("  {}", format_task(task));
    }
}

/// Format a flush report for display
pub fn format_flush_report(report: &FlushReport) -> String {
    let mut line = format!(
        "{} synced, {} skipped",
        style(report.synced).green(),
        style(report.skipped).dim()
    );
    if !report.failures.is_empty() {
        line.push_str(&format!(", {} failed", style(report.failures.len()).red()));
    }
    line
}

/// Print each sync failure as a dismissable-notification style line
pub fn print_failures(report: &FlushReport) {
    for failure in &report.failures {
        eprintln!(
            "{} {}.{}: {}",
            WARN,
            style(&failure.task_name).bold(),
            failure.stage,
            failure.error
        );
    }
}
