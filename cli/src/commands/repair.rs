//! `aviary repair <namespace>/<name>` — drift scan and recovery.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::application::services::repair::{apply_fixes, scan_drift};
use crate::application::services::stage::{stage_formation, StagedTree};
use crate::commands::{connect_scheduler, load_manifest};
use crate::domain::error::FormationError;
use crate::domain::identity::{parse_formation_ref, resolve_agent_ids};
use crate::domain::state::FormationState;
use crate::domain::template::SENSITIVE_PLACEHOLDER;
use crate::infra::config_store::JsonConfigStore;
use crate::infra::fs::LocalFs;
use crate::infra::paths::AviaryHome;
use crate::infra::state_store::StateManager;
use crate::output::render::render_drift;
use crate::output::OutputContext;

/// Arguments for the repair command.
#[derive(Args)]
pub struct RepairArgs {
    /// Formation reference: <namespace>/<name>
    pub formation: String,

    /// Apply fixable corrections (drift is only reported otherwise)
    #[arg(long)]
    pub fix: bool,

    /// Formation source tree for findings that need source material
    #[arg(long)]
    pub source: Option<PathBuf>,
}

/// Run `aviary repair`.
///
/// # Errors
///
/// Returns an error if the formation is not installed or a store cannot be
/// read.
pub async fn run(ctx: &OutputContext, args: &RepairArgs, json: bool) -> Result<()> {
    use crate::application::ports::FormationStateStore as _;

    let (namespace, name) = parse_formation_ref(&args.formation)?;
    let home = AviaryHome::resolve()?;
    let state_store = StateManager::new(home.formations_dir(), home.sources_dir());
    let config_store = JsonConfigStore::new(home.config_path());
    let fs = LocalFs;

    let state = state_store
        .load(&namespace, &name)
        .await?
        .ok_or_else(|| FormationError::NotInstalled {
            namespace: namespace.clone(),
            name: name.clone(),
        })?;

    let foreign_agent_ids: BTreeSet<String> = state_store
        .list()
        .await?
        .iter()
        .filter(|other| !(other.namespace == namespace && other.name == name))
        .flat_map(FormationState::agent_ids)
        .collect();

    let scheduler = connect_scheduler(ctx, true);
    let report = scan_drift(
        &config_store,
        scheduler.as_ref(),
        &fs,
        &state,
        &foreign_agent_ids,
    )
    .await?;

    if json && !args.fix {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    render_drift(ctx, &report);

    if !args.fix || report.findings.is_empty() {
        return Ok(());
    }

    let staged = restage_for_repair(ctx, &fs, &state, &namespace, args.source.as_deref())?;
    let outcome = apply_fixes(
        &config_store,
        &state_store,
        scheduler.as_ref(),
        &fs,
        ctx,
        &state,
        &report.findings,
        staged.as_ref(),
        home.root(),
    )
    .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        ctx.kv(
            "repaired",
            &format!("{} fixed, {} skipped", outcome.fixed, outcome.skipped),
        );
        for warning in &outcome.warnings {
            ctx.warn(warning);
        }
    }
    Ok(())
}

/// Re-stage the formation for source-needing fixes, from `--source` or from
/// the recorded snapshot. Sensitive placeholders are withheld from the
/// variable map so a secret-bearing file is skipped rather than deployed
/// with placeholder text.
fn restage_for_repair(
    ctx: &OutputContext,
    fs: &LocalFs,
    state: &FormationState,
    namespace: &str,
    source: Option<&std::path::Path>,
) -> Result<Option<StagedTree>> {
    let source_root = match source {
        Some(path) => path.to_path_buf(),
        None => match &state.source_path {
            Some(snapshot) if snapshot.exists() => snapshot.clone(),
            _ => {
                ctx.warn("no source available — findings needing source material are skipped");
                return Ok(None);
            }
        },
    };

    let manifest = load_manifest(&source_root)?;
    let agent_ids = resolve_agent_ids(&manifest, namespace)?;
    let variables: BTreeMap<String, String> = state
        .variables
        .iter()
        .filter(|(_, value)| value.as_str() != SENSITIVE_PLACEHOLDER)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    stage_formation(fs, &manifest, &agent_ids, &variables, &source_root).map(Some)
}
