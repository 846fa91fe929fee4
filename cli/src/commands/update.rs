//! `aviary update <path>` — migrate an installed formation to a new
//! manifest.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::application::services::variables::{parse_var_overrides, resolve_variables};
use crate::commands::install::{apply_binding_selection, deploy, DeployRequest};
use crate::commands::{load_manifest, stage_with_progress};
use crate::domain::error::FormationError;
use crate::domain::identity::{resolve_agent_ids, validate_manifest};
use crate::domain::plan::compute_plan;
use crate::infra::config_store::JsonConfigStore;
use crate::infra::fs::LocalFs;
use crate::infra::paths::AviaryHome;
use crate::infra::prompt::TerminalPrompter;
use crate::infra::state_store::StateManager;
use crate::output::render::{render_outcome, render_plan};
use crate::output::OutputContext;

/// Arguments for the update command.
#[derive(Args)]
pub struct UpdateArgs {
    /// Path to the formation directory (contains formation.yaml)
    pub path: PathBuf,

    /// Update the instance installed under this namespace
    #[arg(long)]
    pub namespace: Option<String>,

    /// Set a variable (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

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

/// Run `aviary update`.
///
/// # Errors
///
/// Returns an error if the formation is not installed, validation fails, or
/// execution fails fatally.
pub async fn run(ctx: &OutputContext, args: &UpdateArgs, json: bool) -> Result<()> {
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

    let previous = state_store
        .load(&namespace, &manifest.name)
        .await?
        .ok_or_else(|| FormationError::NotInstalled {
            namespace: namespace.clone(),
            name: manifest.name.clone(),
        })?;

    let overrides = parse_var_overrides(&args.vars)?;
    let prompter = TerminalPrompter;
    let interactive = !args.yes && ctx.interactive();
    let resolved = resolve_variables(
        &manifest,
        Some(&previous),
        &overrides,
        interactive.then_some(&prompter),
    )?;

    let staged =
        stage_with_progress(ctx, &fs, &manifest, &agent_ids, &resolved.values, &args.path)?;

    let plan = compute_plan(
        Some(&previous),
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

    if plan.is_empty() {
        ctx.success("nothing to do — already up to date");
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
            previous: Some(&previous),
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
            "formation '{namespace}/{}' updated",
            manifest.name
        ));
    }
    Ok(())
}
