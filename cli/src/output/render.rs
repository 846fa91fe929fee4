//! Human-readable rendering of plans, outcomes, and drift reports.

use owo_colors::OwoColorize as _;

use crate::application::services::executor::MigrationOutcome;
use crate::application::services::repair::DriftReport;
use crate::domain::drift::{DriftFix, DriftKind};
use crate::domain::plan::{
    AgentChangeKind, BindingChange, CronJobChange, MigrationPlan, TopologyChange,
};
use crate::output::OutputContext;

/// Render a plan the way execution would apply it. Dry-run output is this,
/// verbatim — the plan is the literal truth of what execution would do.
pub fn render_plan(ctx: &OutputContext, plan: &MigrationPlan) {
    if plan.is_empty() {
        ctx.success("nothing to do — already up to date");
        return;
    }

    if let Some(version) = &plan.version {
        ctx.kv("version", &format!("{} -> {}", version.from, version.to));
    }

    ctx.header("Agents");
    for change in &plan.agents {
        match &change.kind {
            AgentChangeKind::Add => {
                println!("    {} {}", "+".style(ctx.styles.added), change.agent_id);
            }
            AgentChangeKind::Remove => {
                println!("    {} {}", "-".style(ctx.styles.removed), change.agent_id);
            }
            AgentChangeKind::Update { changed_paths } => {
                let detail = if changed_paths.is_empty() {
                    "settings".to_string()
                } else {
                    changed_paths.join(", ")
                };
                println!(
                    "    {} {} ({detail})",
                    "~".style(ctx.styles.changed),
                    change.agent_id
                );
            }
            AgentChangeKind::Unchanged => {
                println!(
                    "    {} {}",
                    "=".style(ctx.styles.dim),
                    change.agent_id.style(ctx.styles.dim)
                );
            }
        }
    }

    if !plan.bindings.is_empty() {
        ctx.header("Bindings");
        for change in &plan.bindings {
            match change {
                BindingChange::Add(binding) => println!(
                    "    {} {} -> {}",
                    "+".style(ctx.styles.added),
                    binding.match_.channel,
                    binding.agent_id
                ),
                BindingChange::Remove(binding) => println!(
                    "    {} {} -> {}",
                    "-".style(ctx.styles.removed),
                    binding.match_.channel,
                    binding.agent_id
                ),
            }
        }
    }

    if !plan.cron_jobs.is_empty() {
        ctx.header("Scheduled jobs");
        for change in &plan.cron_jobs {
            match change {
                CronJobChange::Add { name, spec } => println!(
                    "    {} {name} ({})",
                    "+".style(ctx.styles.added),
                    spec.schedule
                ),
                CronJobChange::Update { name, old, new, .. } => println!(
                    "    {} {name} ({} -> {})",
                    "~".style(ctx.styles.changed),
                    old.schedule,
                    new.schedule
                ),
                CronJobChange::Remove { name, .. } => {
                    println!("    {} {name}", "-".style(ctx.styles.removed));
                }
            }
        }
    }

    if !plan.topology.is_empty() {
        ctx.header("Agent-to-agent");
        for change in &plan.topology {
            match change {
                TopologyChange::Add(edge) => println!(
                    "    {} {} -> {}",
                    "+".style(ctx.styles.added),
                    edge.from,
                    edge.to
                ),
                TopologyChange::Remove(edge) => println!(
                    "    {} {} -> {}",
                    "-".style(ctx.styles.removed),
                    edge.from,
                    edge.to
                ),
                TopologyChange::Reapply(edge) => println!(
                    "    {} {} -> {} (reapply)",
                    "~".style(ctx.styles.changed),
                    edge.from,
                    edge.to
                ),
            }
        }
    }
}

/// Render the post-execution change summary.
pub fn render_outcome(ctx: &OutputContext, outcome: &MigrationOutcome) {
    let agents = format!(
        "{} added, {} updated, {} removed, {} unchanged",
        outcome.agents_added,
        outcome.agents_updated,
        outcome.agents_removed,
        outcome.agents_unchanged
    );
    ctx.kv("agents", &agents);
    ctx.kv(
        "bindings",
        &format!("{} added, {} removed", outcome.bindings_added, outcome.bindings_removed),
    );
    ctx.kv(
        "jobs",
        &format!(
            "{} added, {} updated, {} removed",
            outcome.jobs_added, outcome.jobs_updated, outcome.jobs_removed
        ),
    );
    if let Some(version) = &outcome.version {
        ctx.kv("version", &format!("{} -> {}", version.from, version.to));
    }
    for warning in &outcome.warnings {
        ctx.warn(warning);
    }
}

/// Render a drift report.
pub fn render_drift(ctx: &OutputContext, report: &DriftReport) {
    if report.findings.is_empty() {
        ctx.success("no drift detected");
    } else {
        ctx.header(&format!("{} finding(s)", report.findings.len()));
        for finding in &report.findings {
            let kind = match finding.kind {
                DriftKind::Missing => "missing".style(ctx.styles.removed).to_string(),
                DriftKind::Orphaned => "orphaned".style(ctx.styles.changed).to_string(),
                DriftKind::Changed => "changed".style(ctx.styles.changed).to_string(),
            };
            let fix = match finding.fix {
                DriftFix::Fixable => "fixable",
                DriftFix::NeedsSource => "needs source",
            };
            println!("    {kind} {} — {} [{fix}]", finding.subject, finding.detail);
        }
    }
    for warning in &report.warnings {
        ctx.warn(warning);
    }
}
