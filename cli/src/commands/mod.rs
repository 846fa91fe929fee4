//! Command implementations

pub mod export;
pub mod install;
pub mod list;
pub mod repair;
pub mod uninstall;
pub mod update;
pub mod version;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use aviary_common::{Binding, FormationManifest};

use crate::application::ports::{ValuePrompter, WorkspaceFs};
use crate::application::services::stage::{stage_formation, StagedTree};
use crate::domain::bindings::{default_selection, ClassifiedBinding};
use crate::infra::prompt::TerminalPrompter;
use crate::infra::scheduler::GatewayClient;
use crate::output::{progress, OutputContext};

/// Manifest file name inside a formation directory.
pub const MANIFEST_FILE: &str = "formation.yaml";

/// Load and parse `formation.yaml` from a formation directory.
pub(crate) fn load_manifest(source: &Path) -> Result<FormationManifest> {
    anyhow::ensure!(source.is_dir(), "Path not found: {}", source.display());
    let path = source.join(MANIFEST_FILE);
    anyhow::ensure!(
        path.exists(),
        "No {MANIFEST_FILE} found in: {}",
        source.display()
    );
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&content).context("failed to parse formation.yaml")
}

/// Apply the binding selection policy, with per-item interactive overrides
/// when a TTY is available and `--yes` was not given.
pub(crate) fn select_bindings(
    ctx: &OutputContext,
    classified: &[ClassifiedBinding],
    include_bare: bool,
    yes: bool,
) -> Result<Vec<Binding>> {
    if yes || !ctx.interactive() {
        for candidate in classified {
            if !candidate.selected_by_default(include_bare) {
                ctx.warn(&format!("skipping binding: {}", candidate.describe()));
            }
        }
        return Ok(default_selection(classified, include_bare));
    }

    let prompter = TerminalPrompter;
    let mut selected = Vec::new();
    for candidate in classified {
        let default = candidate.selected_by_default(include_bare);
        let keep = if default {
            true
        } else {
            prompter.confirm(
                &format!("Wire binding anyway? {}", candidate.describe()),
                false,
            )?
        };
        if keep {
            selected.push(candidate.binding.clone());
        } else {
            ctx.warn(&format!("skipping binding: {}", candidate.describe()));
        }
    }
    Ok(selected)
}

/// Stage the formation's files, with a spinner on interactive terminals.
pub(crate) fn stage_with_progress(
    ctx: &OutputContext,
    fs: &impl WorkspaceFs,
    manifest: &FormationManifest,
    agent_ids: &BTreeMap<String, String>,
    variables: &BTreeMap<String, String>,
    source_root: &Path,
) -> Result<StagedTree> {
    if !ctx.interactive() {
        return stage_formation(fs, manifest, agent_ids, variables, source_root);
    }
    let pb = progress::spinner("staging formation files...");
    let staged = stage_formation(fs, manifest, agent_ids, variables, source_root)?;
    progress::finish_ok(&pb, &format!("{} file(s) staged", staged.files.len()));
    Ok(staged)
}

/// Connect to the gateway scheduler when the plan needs it. Connection
/// failure degrades to `None`: job changes become warnings, never a fatal
/// error for the migration.
pub(crate) fn connect_scheduler(ctx: &OutputContext, needed: bool) -> Option<GatewayClient> {
    if !needed {
        return None;
    }
    match GatewayClient::connect_from_env() {
        Ok(client) => Some(client),
        Err(err) => {
            ctx.warn(&err.to_string());
            None
        }
    }
}
