//! `aviary export <namespace>/<name>` — copy the persisted source snapshot
//! out for inspection or editing.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::application::ports::WorkspaceFs as _;
use crate::domain::error::FormationError;
use crate::domain::identity::parse_formation_ref;
use crate::infra::fs::LocalFs;
use crate::infra::paths::AviaryHome;
use crate::infra::state_store::StateManager;
use crate::output::OutputContext;

/// Arguments for the export command.
#[derive(Args)]
pub struct ExportArgs {
    /// Formation reference: <namespace>/<name>
    pub formation: String,

    /// Destination directory (must not already exist)
    #[arg(long, short)]
    pub output: PathBuf,
}

/// Run `aviary export`.
///
/// # Errors
///
/// Returns an error if the formation is not installed, no snapshot was
/// recorded, or the destination already exists.
pub async fn run(ctx: &OutputContext, args: &ExportArgs) -> Result<()> {
    use crate::application::ports::FormationStateStore as _;

    let (namespace, name) = parse_formation_ref(&args.formation)?;
    let home = AviaryHome::resolve()?;
    let state_store = StateManager::new(home.formations_dir(), home.sources_dir());

    let state = state_store
        .load(&namespace, &name)
        .await?
        .ok_or_else(|| FormationError::NotInstalled {
            namespace: namespace.clone(),
            name: name.clone(),
        })?;

    let Some(snapshot) = &state.source_path else {
        anyhow::bail!("no source snapshot recorded for '{namespace}/{name}'");
    };
    anyhow::ensure!(
        snapshot.exists(),
        "recorded snapshot is gone: {}",
        snapshot.display()
    );
    anyhow::ensure!(
        !args.output.exists(),
        "destination already exists: {}",
        args.output.display()
    );

    LocalFs.copy_tree(snapshot, &args.output)?;
    ctx.success(&format!(
        "exported '{namespace}/{name}' to {}",
        args.output.display()
    ));
    Ok(())
}
