//! CLI output formatting

use crate::{
    core::{Event, ExecutionStatus, JobState, RunContext, Workflow},
    execution::ExecutionEvent,
    persistence::RunSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static PACKAGE: Emoji<'_, '_> = Emoji("📦 ", "^ ");

/// Create a progress bar over job instances
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(template) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(template.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a job state for display
pub fn format_job_state(state: &JobState) -> String {
    match state {
        JobState::Pending => style("PENDING").dim().to_string(),
        JobState::Running { .. } => style("RUNNING").yellow().to_string(),
        JobState::Completed { .. } => style("COMPLETED").green().to_string(),
        JobState::Failed { .. } => style("FAILED").red().to_string(),
        JobState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::NotTriggered => style("NOT TRIGGERED").blue().to_string(),
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

/// Format a run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        _ => INFO,
    };

    format!(
        "{} {} - {} @ {} - {} ({}/{}) - {}",
        status_icon,
        style(short_id(&summary.execution_id)).dim(),
        style(&summary.workflow_name).bold(),
        style(&summary.git_ref).cyan(),
        format_status(summary.status),
        summary.completed_jobs,
        summary.total_jobs,
        style(format!("{:.0}%", summary.progress * 100.0)).cyan()
    )
}

/// Format an execution event for display, or `None` for events not worth a line
pub fn format_execution_event(event: &ExecutionEvent) -> Option<String> {
    let line = match event {
        ExecutionEvent::RunStarted {
            execution_id,
            workflow_name,
            git_ref,
        } => format!(
            "{} Starting {} for {} ({})",
            ROCKET,
            style(workflow_name).bold(),
            style(git_ref).cyan(),
            style(short_id(execution_id)).dim()
        ),
        ExecutionEvent::RunNotTriggered { event, .. } => {
            format!("{} {} does not trigger this workflow", INFO, style(event).cyan())
        }
        ExecutionEvent::JobStarted {
            job_id,
            environment,
        } => format!(
            "{} {} on {}",
            SPINNER,
            style(job_id).cyan(),
            style(environment).dim()
        ),
        ExecutionEvent::StepStarted { .. }
        | ExecutionEvent::StepCompleted { .. }
        | ExecutionEvent::InstanceFinished { .. } => return None,
        ExecutionEvent::StepSkipped {
            environment,
            step,
            reason,
            ..
        } => format!(
            "  {} [{}] {} ({})",
            style("-").dim(),
            environment,
            style(step).dim(),
            style(reason).dim()
        ),
        ExecutionEvent::StepFailed {
            environment,
            step,
            error,
            ..
        } => format!(
            "  {}[{}] {}: {}",
            CROSS,
            environment,
            style(step).red(),
            style(format_output(error, 5)).dim()
        ),
        ExecutionEvent::ArtifactsPublished {
            environment,
            tag,
            files,
            ..
        } => format!(
            "  {}[{}] uploaded {} file(s) to {}",
            PACKAGE,
            environment,
            style(files.len()).cyan(),
            style(tag).bold()
        ),
        ExecutionEvent::JobCompleted { job_id } => {
            format!("{} {}", CHECK, style(job_id).green())
        }
        ExecutionEvent::JobFailed { job_id, error } => {
            format!("{} {}: {}", CROSS, style(job_id).red(), style(error).dim())
        }
        ExecutionEvent::JobSkipped { job_id, reason } => {
            format!("{} {} skipped: {}", WARN, style(job_id).yellow(), reason)
        }
        ExecutionEvent::RunCompleted {
            execution_id,
            status,
        } => format!(
            "{} Run ({}) {}",
            INFO,
            style(short_id(execution_id)).dim(),
            format_status(*status)
        ),
    };
    Some(line)
}

/// Per-job outcome lines after a run
pub fn format_job_results(workflow: &Workflow) -> Vec<String> {
    let mut lines = Vec::new();
    for id in workflow.execution_order() {
        let Some(job) = workflow.job(id) else {
            continue;
        };
        lines.push(format!("  {} {}", style(&job.name).bold(), format_job_state(&job.state)));
        match &job.state {
            JobState::Skipped { reason } => lines.push(format!("    {}", style(reason).dim())),
            state => {
                for instance in state.instances() {
                    let marker = if instance.succeeded() { CHECK } else { CROSS };
                    lines.push(format!("    {}{}", marker, instance.environment));
                }
            }
        }
    }
    lines
}

/// Human-readable plan: stages, instances, and which steps would run
pub fn format_plan(workflow: &Workflow, event: &Event) -> Vec<String> {
    let mut lines = Vec::new();

    if !workflow.trigger.matches(event) {
        lines.push(format!(
            "{} {} does not trigger {}; nothing would run",
            INFO,
            style(event).cyan(),
            style(&workflow.name).bold()
        ));
        return lines;
    }

    lines.push(format!(
        "{} {} for {}",
        ROCKET,
        style(&workflow.name).bold(),
        style(event).cyan()
    ));

    for (index, stage) in workflow.stages().iter().enumerate() {
        lines.push(format!("{}", style(format!("Stage {}", index + 1)).bold()));
        for job_id in stage {
            let Some(job) = workflow.job(job_id) else {
                continue;
            };
            let needs = if job.needs.is_empty() {
                String::new()
            } else {
                format!(" (needs {})", job.needs.join(", "))
            };
            lines.push(format!("  {}{}", style(&job.name).cyan(), style(needs).dim()));

            for instance in job.instances() {
                lines.push(format!("    on {}", style(&instance.environment).bold()));
                let ctx = RunContext::new(
                    event.git_ref().clone(),
                    instance.matrix.clone(),
                    instance.environment.clone(),
                );
                for step in &job.steps {
                    if step.should_run(&ctx) {
                        lines.push(format!("      {} {}", style("+").green(), step.name));
                    } else {
                        lines.push(format!(
                            "      {} {} {}",
                            style("-").dim(),
                            style(&step.name).dim(),
                            style(format!("(skipped: {})", step.condition)).dim()
                        ));
                    }
                }
            }
        }
    }

    lines
}

/// Machine-readable plan
pub fn plan_json(workflow: &Workflow, event: &Event) -> serde_json::Value {
    let triggered = workflow.trigger.matches(event);
    let stages: Vec<serde_json::Value> = if triggered {
        workflow
            .stages()
            .iter()
            .map(|stage| {
                let jobs: Vec<serde_json::Value> = stage
                    .iter()
                    .filter_map(|id| workflow.job(id))
                    .map(|job| {
                        let instances: Vec<serde_json::Value> = job
                            .instances()
                            .into_iter()
                            .map(|instance| {
                                let ctx = RunContext::new(
                                    event.git_ref().clone(),
                                    instance.matrix.clone(),
                                    instance.environment.clone(),
                                );
                                let steps: Vec<serde_json::Value> = job
                                    .steps
                                    .iter()
                                    .map(|s| json!({ "name": s.name, "runs": s.should_run(&ctx) }))
                                    .collect();
                                json!({
                                    "environment": instance.environment,
                                    "matrix": instance.matrix,
                                    "steps": steps,
                                })
                            })
                            .collect();
                        json!({ "id": job.id, "needs": job.needs, "instances": instances })
                    })
                    .collect();
                json!({ "jobs": jobs })
            })
            .collect()
    } else {
        Vec::new()
    };

    json!({
        "workflow": workflow.name,
        "event": event.to_string(),
        "ref": event.git_ref().full(),
        "triggered": triggered,
        "stages": stages,
    })
}

/// Format command output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
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
