//! `aviary install <path>` — install a formation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use aviary_common::Binding;
use clap::Args;

use crate::application::services::cleanup::teardown_formation;
use crate::application::services::executor::{execute_plan, ExecuteRequest};
use crate::application::services::stage::StagedTree;
use crate::application::services::variables::{
    parse_var_overrides, resolve_variables, ResolvedVariables,
};
use crate::commands::{connect_scheduler, load_manifest, select_bindings, stage_with_progress};
use crate::domain::bindings::classify;
use crate::domain::error::FormationError;
use crate::domain::identity::{resolve_agent_ids, validate_manifest};
use crate::domain::plan::{compute_plan, BindingChange, MigrationPlan};
use crate::infra::config_store::JsonConfigStore;
use crate::infra::fs::LocalFs;
use crate::infra::paths::AviaryHome;
use crate::infra::prompt::TerminalPrompter;
use crate::infra::state_store::StateManager;
use crate::output::render::{render_outcome, render_plan};
use crate::output::OutputContext;

/// Arguments for the install command.
#[derive(Args)]
pub struct InstallArgs {
    /// Path to the formation directory (contains formation.yaml)
    pub path: PathBuf,

    /// Install under a different namespace (multiple instances can coexist)
    #[arg(long)]
    pub namespace: Option<String>,

    /// Set a variable (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Replace an existing installation of the same formation
    #[arg(long)]
    pub force: bool,

    /// Compute and show the plan without applying anything
    #[arg(long)]
    pub dry_run: bool,

    /// Include bare bindings (match all traffic on their channel)
    #[arg(long)]
    pub with_bare_bindings: bool,

    /// Skip prompts, take defaults
    #[arg(short, long)]
    pub yes: bool,
}

/// Run `aviary install`.
///
/// # Errors
///
/// Returns an error on validation failure, an installation conflict, or a
/// fatal execution failure.
pub async fn run(ctx: &OutputContext, args: &InstallArgs, json: bool) -> Result<()> {
    use crate::application::ports::FormationStateStore as _;

    let home = AviaryHome::resolve()?;
    let manifest = load_manifest(&args.path)?;
    let namespace = args
        .namespace
        .clone()
        .unwrap_or_else(|| manifest.namespace.clone());

    let issues = validate_manifest(&manifest, &namespace);
    if !issues.is_empty() {
        return Err(FormationError::ValidationFailed(issues.join("\n")).into());
    }
    let agent_ids = resolve_agent_ids(&manifest, &namespace)?;

    let state_store = StateManager::new(home.formations_dir(), home.sources_dir());
    let config_store = JsonConfigStore::new(home.config_path());
    let fs = LocalFs;

    // Conflict checks: fatal before any mutation.
    let mut previous = state_store.load(&namespace, &manifest.name).await?;
    if previous.is_some() && !args.force {
        return Err(FormationError::AlreadyInstalled {
            namespace,
            name: manifest.name.clone(),
        }
        .into());
    }
    for other in state_store.list().await? {
        if other.namespace == namespace && other.name == manifest.name {
            continue;
        }
        for id in other.agent_ids() {
            if agent_ids.values().any(|candidate| candidate == &id) {
                return Err(FormationError::AgentIdCollision {
                    id,
                    owner: format!("{}/{}", other.namespace, other.name),
                }
                .into());
            }
        }
    }

    let overrides = parse_var_overrides(&args.vars)?;
    let prompter = TerminalPrompter;
    let interactive = !args.yes && ctx.interactive();
    let resolved = resolve_variables(
        &manifest,
        previous.as_ref(),
        &overrides,
        interactive.then_some(&prompter),
    )?;

    let staged =
        stage_with_progress(ctx, &fs, &manifest, &agent_ids, &resolved.values, &args.path)?;

    // Force reinstall: tear the existing installation down first, then plan
    // as a fresh install. Skipped in dry-run, where the fresh plan alone is
    // shown.
    if args.force && !args.dry_run {
        if let Some(state) = previous.take() {
            ctx.info(&format!(
                "replacing installed formation '{namespace}/{}'...",
                state.name
            ));
            let scheduler = connect_scheduler(ctx, !state.cron_jobs.is_empty());
            let outcome = teardown_formation(
                &config_store,
                &state_store,
                scheduler.as_ref(),
                &fs,
                ctx,
                &state,
                home.root(),
                &home.agents_dir(),
                state.source_path != Some(state_store_snapshot_path(&home, &staged)),
            )
            .await?;
            for warning in outcome.warnings {
                ctx.warn(&warning);
            }
        }
    }
    let previous = if args.force { None } else { previous };

    let plan = compute_plan(
        previous.as_ref(),
        &manifest,
        &namespace,
        &agent_ids,
        &staged.file_hashes,
        &resolved.values,
    );
    let plan = apply_binding_selection(ctx, &config_store, plan, args.with_bare_bindings, args.yes)
        .await?;

    if args.dry_run {
        if json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            ctx.header(&format!("Plan for '{namespace}/{}'", manifest.name));
            render_plan(ctx, &plan);
        }
        return Ok(());
    }

    let outcome = deploy(
        ctx,
        &home,
        &state_store,
        &config_store,
        &fs,
        DeployRequest {
            manifest: &manifest,
            namespace: &namespace,
            agent_ids: &agent_ids,
            staged: &staged,
            resolved: &resolved,
            previous: previous.as_ref(),
            plan: &plan,
            source_root: &args.path,
        },
    )
    .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        render_outcome(ctx, &outcome);
        ctx.success(&format!(
            "formation '{namespace}/{}' installed",
            manifest.name
        ));
    }
    Ok(())
}

fn state_store_snapshot_path(home: &AviaryHome, staged: &StagedTree) -> PathBuf {
    home.sources_dir().join(&staged.source_digest)
}

/// Classify the plan's binding additions against the host's channel block
/// and keep only the selected ones.
pub(crate) async fn apply_binding_selection(
    ctx: &OutputContext,
    config_store: &JsonConfigStore,
    plan: MigrationPlan,
    with_bare_bindings: bool,
    yes: bool,
) -> Result<MigrationPlan> {
    use crate::application::ports::HostConfigStore as _;

    let candidates: Vec<Binding> = plan
        .bindings
        .iter()
        .filter_map(|change| match change {
            BindingChange::Add(binding) => Some(binding.clone()),
            BindingChange::Remove(_) => None,
        })
        .collect();
    if candidates.is_empty() {
        return Ok(plan);
    }

    let host_config = config_store.load().await?;
    let classified = classify(&candidates, host_config.channels.as_ref());
    let selected = select_bindings(ctx, &classified, with_bare_bindings, yes)?;
    Ok(plan.with_selected_bindings(&selected))
}

pub(crate) struct DeployRequest<'a> {
    pub manifest: &'a aviary_common::FormationManifest,
    pub namespace: &'a str,
    pub agent_ids: &'a BTreeMap<String, String>,
    pub staged: &'a StagedTree,
    pub resolved: &'a ResolvedVariables,
    pub previous: Option<&'a crate::domain::state::FormationState>,
    pub plan: &'a MigrationPlan,
    pub source_root: &'a std::path::Path,
}

/// Shared install/update tail: snapshot the source, connect the scheduler
/// when needed, and run the executor.
pub(crate) async fn deploy(
    ctx: &OutputContext,
    home: &AviaryHome,
    state_store: &StateManager,
    config_store: &JsonConfigStore,
    fs: &LocalFs,
    req: DeployRequest<'_>,
) -> Result<crate::application::services::executor::MigrationOutcome> {
    if req.plan.is_empty() {
        ctx.success("nothing to do — already up to date");
        return Ok(crate::application::services::executor::MigrationOutcome::default());
    }

    let snapshot = state_store.snapshot_source(req.source_root, &req.staged.source_digest)?;
    let scheduler = connect_scheduler(ctx, !req.plan.cron_jobs.is_empty());

    let workspaces_root = home.workspaces_dir();
    let agents_state_root = home.agents_dir();
    let request = ExecuteRequest {
        plan: req.plan,
        manifest: req.manifest,
        namespace: req.namespace,
        name: &req.manifest.name,
        agent_ids: req.agent_ids,
        staged: req.staged,
        persisted_variables: &req.resolved.persisted,
        previous: req.previous,
        home_root: home.root(),
        workspaces_root: &workspaces_root,
        agents_state_root: &agents_state_root,
        source_snapshot: Some(snapshot),
    };
    execute_plan(
        config_store,
        state_store,
        scheduler.as_ref(),
        fs,
        ctx,
        &request,
    )
    .await
}
