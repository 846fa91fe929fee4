//! `aviary list` — show installed formations.

use anyhow::Result;
use serde::Serialize;

use crate::infra::paths::AviaryHome;
use crate::infra::state_store::StateManager;
use crate::output::OutputContext;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FormationSummary {
    namespace: String,
    name: String,
    version: String,
    agents: usize,
    bindings: usize,
    cron_jobs: usize,
    updated_at: chrono::DateTime<chrono::Utc>,
}

/// Run `aviary list`.
///
/// # Errors
///
/// Returns an error if the state directory cannot be read.
pub async fn run(ctx: &OutputContext, json: bool) -> Result<()> {
    use crate::application::ports::FormationStateStore as _;

    let home = AviaryHome::resolve()?;
    let state_store = StateManager::new(home.formations_dir(), home.sources_dir());
    let states = state_store.list().await?;

    let summaries: Vec<FormationSummary> = states
        .iter()
        .map(|state| FormationSummary {
            namespace: state.namespace.clone(),
            name: state.name.clone(),
            version: state.version.clone(),
            agents: state.agents.len(),
            bindings: state.bindings.len(),
            cron_jobs: state.cron_jobs.len(),
            updated_at: state.updated_at,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        ctx.info("no formations installed. Install one: aviary install <path>");
        return Ok(());
    }
    for summary in &summaries {
        ctx.kv(
            &format!("{}/{}", summary.namespace, summary.name),
            &format!(
                "v{}  {} agent(s), {} binding(s), {} job(s)",
                summary.version, summary.agents, summary.bindings, summary.cron_jobs
            ),
        );
    }
    Ok(())
}
