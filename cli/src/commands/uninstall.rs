//! `aviary uninstall <namespace>/<name>` — remove a formation.

use anyhow::Result;
use clap::Args;

use crate::application::services::cleanup::teardown_formation;
use crate::commands::connect_scheduler;
use crate::domain::error::FormationError;
use crate::domain::identity::parse_formation_ref;
use crate::infra::config_store::JsonConfigStore;
use crate::infra::fs::LocalFs;
use crate::infra::paths::AviaryHome;
use crate::infra::prompt::TerminalPrompter;
use crate::infra::state_store::StateManager;
use crate::output::OutputContext;

/// Arguments for the uninstall command.
#[derive(Args)]
pub struct UninstallArgs {
    /// Formation reference: <namespace>/<name>
    pub formation: String,

    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,
}

/// Run `aviary uninstall`.
///
/// # Errors
///
/// Returns an error if the formation is not installed or the config/state
/// writes fail; everything else is best-effort.
pub async fn run(ctx: &OutputContext, args: &UninstallArgs) -> Result<()> {
    use crate::application::ports::FormationStateStore as _;
    use crate::application::ports::ValuePrompter as _;

    let (namespace, name) = parse_formation_ref(&args.formation)?;
    let home = AviaryHome::resolve()?;
    let state_store = StateManager::new(home.formations_dir(), home.sources_dir());
    let config_store = JsonConfigStore::new(home.config_path());

    let state = state_store
        .load(&namespace, &name)
        .await?
        .ok_or_else(|| FormationError::NotInstalled {
            namespace: namespace.clone(),
            name: name.clone(),
        })?;

    if !args.yes {
        ctx.info(&format!(
            "This removes {} agent(s), {} binding(s), and {} scheduled job(s).",
            state.agents.len(),
            state.bindings.len(),
            state.cron_jobs.len()
        ));
        if !TerminalPrompter.confirm("Continue?", false)? {
            ctx.info("Cancelled.");
            return Ok(());
        }
    }

    // The snapshot is content-addressed: keep it if another installation
    // still points at the same tree.
    let snapshot_shared = state_store.list().await?.iter().any(|other| {
        !(other.namespace == namespace && other.name == name)
            && other.source_path.is_some()
            && other.source_path == state.source_path
    });

    let scheduler = connect_scheduler(ctx, !state.cron_jobs.is_empty());
    let outcome = teardown_formation(
        &config_store,
        &state_store,
        scheduler.as_ref(),
        &LocalFs,
        ctx,
        &state,
        home.root(),
        &home.agents_dir(),
        !snapshot_shared,
    )
    .await?;

    for warning in outcome.warnings {
        ctx.warn(&warning);
    }
    Ok(())
}
