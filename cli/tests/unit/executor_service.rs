//! Migration executor tests — full pipeline over in-memory mocks.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use aviary_cli::application::services::executor::{execute_plan, ExecuteRequest};
use aviary_cli::application::services::stage::{stage_formation, StagedTree};
use aviary_cli::domain::identity::resolve_agent_ids;
use aviary_cli::domain::plan::{compute_plan, MigrationPlan};
use aviary_cli::domain::state::FormationState;
use aviary_common::{FormationManifest, DEFAULT_AGENT_ID};

use crate::mocks::{MemConfigStore, MemFs, MemStateStore, MockScheduler, NoScheduler, RecordingReporter};

const MANIFEST_YAML: &str = r#"
namespace: ops
name: watchtower
version: "1.0.0"
agents:
  sentry:
    source: agents/sentry
    model: claude-sonnet
  scribe:
    source: agents/scribe
bindings:
  - agent: sentry
    match:
      channel: slack
      peer: "C042"
cronJobs:
  - agent: scribe
    schedule: "0 9 * * 1-5"
    prompt: "Summarize the day."
topology:
  sentry:
    - scribe
"#;

const HOME: &str = "/aviary";
const SOURCE: &str = "/src";

fn manifest() -> FormationManifest {
    serde_yaml::from_str(MANIFEST_YAML).expect("fixture parses")
}

fn vars() -> BTreeMap<String, String> {
    [("REGION".to_string(), "eu".to_string())].into_iter().collect()
}

fn source_fs() -> MemFs {
    MemFs::with_files(&[
        ("/src/agents/sentry/SOUL.md", b"Watch {{REGION}} dashboards."),
        ("/src/agents/scribe/SOUL.md", b"Write the daily summary."),
    ])
}

fn stage(fs: &MemFs, manifest: &FormationManifest) -> (BTreeMap<String, String>, StagedTree) {
    let agent_ids = resolve_agent_ids(manifest, "ops").expect("ids resolve");
    let staged =
        stage_formation(fs, manifest, &agent_ids, &vars(), Path::new(SOURCE)).expect("stages");
    (agent_ids, staged)
}

struct Roots {
    home: PathBuf,
    workspaces: PathBuf,
    agents: PathBuf,
}

fn roots() -> Roots {
    Roots {
        home: PathBuf::from(HOME),
        workspaces: PathBuf::from(HOME).join("workspaces"),
        agents: PathBuf::from(HOME).join("agents"),
    }
}

#[allow(clippy::too_many_arguments)]
fn request<'a>(
    plan: &'a MigrationPlan,
    manifest: &'a FormationManifest,
    agent_ids: &'a BTreeMap<String, String>,
    staged: &'a StagedTree,
    variables: &'a BTreeMap<String, String>,
    previous: Option<&'a FormationState>,
    roots: &'a Roots,
) -> ExecuteRequest<'a> {
    ExecuteRequest {
        plan,
        manifest,
        namespace: "ops",
        name: "watchtower",
        agent_ids,
        staged,
        persisted_variables: variables,
        previous,
        home_root: &roots.home,
        workspaces_root: &roots.workspaces,
        agents_state_root: &roots.agents,
        source_snapshot: None,
    }
}

async fn fresh_install(
    fs: &MemFs,
    config_store: &MemConfigStore,
    state_store: &MemStateStore,
    scheduler: &MockScheduler,
) -> (FormationManifest, BTreeMap<String, String>, StagedTree) {
    let m = manifest();
    let (agent_ids, staged) = stage(fs, &m);
    let plan = compute_plan(None, &m, "ops", &agent_ids, &staged.file_hashes, &vars());
    let r = roots();
    let v = vars();
    let req = request(&plan, &m, &agent_ids, &staged, &v, None, &r);
    execute_plan(
        config_store,
        state_store,
        Some(scheduler),
        fs,
        &RecordingReporter::default(),
        &req,
    )
    .await
    .expect("install executes");
    (m, agent_ids, staged)
}

// ── Fresh install ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fresh_install_applies_all_domains_and_persists_state() {
    let fs = source_fs();
    let config_store = MemConfigStore::default();
    let state_store = MemStateStore::default();
    let scheduler = MockScheduler::default();

    let (m, agent_ids, staged) = fresh_install(&fs, &config_store, &state_store, &scheduler).await;

    // Workspace files deployed with variables substituted.
    assert_eq!(
        fs.content("/aviary/workspaces/ops-sentry/SOUL.md"),
        Some(b"Watch eu dashboards.".to_vec())
    );
    // Briefing doc generated only for the agent with outgoing edges.
    assert!(fs.contains("/aviary/workspaces/ops-sentry/PEERS.md"));
    assert!(!fs.contains("/aviary/workspaces/ops-scribe/PEERS.md"));

    // Config: default agent seeded at index 0, entries and binding added.
    let config = config_store.current();
    assert_eq!(config.agents.list[0].id, DEFAULT_AGENT_ID);
    assert!(config.agents.list.iter().any(|e| e.id == "ops-sentry"));
    assert!(config.agents.list.iter().any(|e| e.id == "ops-scribe"));
    assert_eq!(config.bindings.len(), 1);
    assert_eq!(config.bindings[0].agent_id, "ops-sentry");
    let a2a = config.agent_to_agent.expect("feature block present");
    assert!(a2a.enabled);
    assert_eq!(a2a.allow, vec!["ops-*"]);

    // Scheduler holds the job.
    assert_eq!(scheduler.remote_jobs().len(), 1);
    assert_eq!(scheduler.remote_jobs()[0].name, "ops-scribe-job-0");

    // State persisted last, describing exactly what was applied.
    let state = state_store.current("ops", "watchtower").expect("state saved");
    assert_eq!(state.version, "1.0.0");
    assert_eq!(state.agents.len(), 2);
    assert_eq!(state.bindings.len(), 1);
    assert_eq!(state.cron_jobs.len(), 1);
    assert_eq!(state.file_hashes, staged.file_hashes);
    assert!(state.agent_to_agent_edges.is_some());

    // Idempotence through the executor: replanning yields an empty plan.
    let replan = compute_plan(
        Some(&state),
        &m,
        "ops",
        &agent_ids,
        &staged.file_hashes,
        &vars(),
    );
    assert!(replan.is_empty(), "replan should be empty: {replan:?}");
}

#[tokio::test]
async fn test_deselected_binding_is_neither_wired_nor_recorded() {
    let fs = source_fs();
    let config_store = MemConfigStore::default();
    let state_store = MemStateStore::default();
    let scheduler = MockScheduler::default();

    let m = manifest();
    let (agent_ids, staged) = stage(&fs, &m);
    let plan = compute_plan(None, &m, "ops", &agent_ids, &staged.file_hashes, &vars());
    // The selection step (classifier verdict or user choice) dropped every
    // binding addition.
    let plan = plan.with_selected_bindings(&[]);

    let r = roots();
    let v = vars();
    let req = request(&plan, &m, &agent_ids, &staged, &v, None, &r);
    execute_plan(
        &config_store,
        &state_store,
        Some(&scheduler),
        &fs,
        &RecordingReporter::default(),
        &req,
    )
    .await
    .expect("install executes");

    assert!(config_store.current().bindings.is_empty());
    let state = state_store.current("ops", "watchtower").expect("state saved");
    assert!(state.bindings.is_empty());
    assert_eq!(state.agents.len(), 2);
}

// ── Partial scheduler failure ────────────────────────────────────────────────

#[tokio::test]
async fn test_partial_scheduler_failure_keeps_other_changes_and_warns() {
    let fs = MemFs::with_files(&[
        ("/src/agents/sentry/SOUL.md", b"Watch."),
        ("/src/agents/scribe/SOUL.md", b"Write."),
    ]);
    let mut m = manifest();
    m.cron_jobs.push(aviary_common::CronJobDef {
        agent: "scribe".to_string(),
        schedule: "0 18 * * *".to_string(),
        prompt: "Evening wrap-up.".to_string(),
        timezone: None,
    });

    let config_store = MemConfigStore::default();
    let state_store = MemStateStore::default();
    // The second job's remote call fails.
    let scheduler = MockScheduler::failing_on(&["ops-scribe-job-1"]);

    let (agent_ids, staged) = stage(&fs, &m);
    let plan = compute_plan(None, &m, "ops", &agent_ids, &staged.file_hashes, &vars());
    let r = roots();
    let v = vars();
    let req = request(&plan, &m, &agent_ids, &staged, &v, None, &r);
    let outcome = execute_plan(
        &config_store,
        &state_store,
        Some(&scheduler),
        &fs,
        &RecordingReporter::default(),
        &req,
    )
    .await
    .expect("partial job failure must not abort the migration");

    assert_eq!(outcome.jobs_added, 1);
    assert!(
        outcome.warnings.iter().any(|w| w.contains("ops-scribe-job-1")),
        "warning should name the failed job: {:?}",
        outcome.warnings
    );

    // Config and filesystem changes applied regardless.
    assert!(config_store.current().agents.list.iter().any(|e| e.id == "ops-sentry"));
    assert!(fs.contains("/aviary/workspaces/ops-sentry/SOUL.md"));

    // State reflects only the job that succeeded remotely.
    let state = state_store.current("ops", "watchtower").expect("state saved");
    assert_eq!(state.cron_jobs.len(), 1);
    assert_eq!(state.cron_jobs[0].name, "ops-scribe-job-0");
}

#[tokio::test]
async fn test_unavailable_scheduler_degrades_to_warnings() {
    let fs = source_fs();
    let config_store = MemConfigStore::default();
    let state_store = MemStateStore::default();

    let m = manifest();
    let (agent_ids, staged) = stage(&fs, &m);
    let plan = compute_plan(None, &m, "ops", &agent_ids, &staged.file_hashes, &vars());
    let r = roots();
    let v = vars();
    let req = request(&plan, &m, &agent_ids, &staged, &v, None, &r);
    let outcome = execute_plan(
        &config_store,
        &state_store,
        None::<&NoScheduler>,
        &fs,
        &RecordingReporter::default(),
        &req,
    )
    .await
    .expect("executes without scheduler");

    assert_eq!(outcome.jobs_added, 0);
    assert!(outcome.warnings.iter().any(|w| w.contains("scheduler unavailable")));
    let state = state_store.current("ops", "watchtower").expect("state saved");
    assert!(state.cron_jobs.is_empty(), "unconfirmed jobs are not recorded");
}

// ── Hash-gated updates ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_update_rewrites_only_changed_files() {
    let fs = source_fs();
    let config_store = MemConfigStore::default();
    let state_store = MemStateStore::default();
    let scheduler = MockScheduler::default();

    let (m, agent_ids, _) = fresh_install(&fs, &config_store, &state_store, &scheduler).await;
    let previous = state_store.current("ops", "watchtower").expect("state saved");

    // Change one source file, leave the other alone.
    {
        use aviary_cli::application::ports::WorkspaceFs as _;
        fs.write(
            Path::new("/src/agents/scribe/SOUL.md"),
            b"Write the weekly summary.",
        )
        .unwrap();
    }
    fs.writes.lock().unwrap().clear();

    let (agent_ids2, staged2) = stage(&fs, &m);
    assert_eq!(agent_ids, agent_ids2);
    let plan = compute_plan(
        Some(&previous),
        &m,
        "ops",
        &agent_ids2,
        &staged2.file_hashes,
        &vars(),
    );
    let r = roots();
    let v = vars();
    let req = request(&plan, &m, &agent_ids2, &staged2, &v, Some(&previous), &r);
    execute_plan(
        &config_store,
        &state_store,
        Some(&scheduler),
        &fs,
        &RecordingReporter::default(),
        &req,
    )
    .await
    .expect("update executes");

    let writes = fs.write_log();
    assert!(
        writes.contains(&PathBuf::from("/aviary/workspaces/ops-scribe/SOUL.md")),
        "changed file must be rewritten: {writes:?}"
    );
    assert!(
        !writes.contains(&PathBuf::from("/aviary/workspaces/ops-sentry/SOUL.md")),
        "unchanged file must not be rewritten: {writes:?}"
    );
    assert_eq!(
        fs.content("/aviary/workspaces/ops-scribe/SOUL.md"),
        Some(b"Write the weekly summary.".to_vec())
    );
}

// ── Agent removal ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_removed_agent_is_cleaned_from_every_store() {
    let fs = source_fs();
    let config_store = MemConfigStore::default();
    let state_store = MemStateStore::default();
    let scheduler = MockScheduler::default();

    let (mut m, _, _) = fresh_install(&fs, &config_store, &state_store, &scheduler).await;
    let previous = state_store.current("ops", "watchtower").expect("state saved");

    // Drop scribe (and everything referencing it) from the manifest.
    m.agents.remove("scribe");
    m.cron_jobs.clear();
    m.topology.clear();

    let agent_ids = resolve_agent_ids(&m, "ops").expect("ids resolve");
    let staged =
        stage_formation(&fs, &m, &agent_ids, &vars(), Path::new(SOURCE)).expect("stages");
    let plan = compute_plan(
        Some(&previous),
        &m,
        "ops",
        &agent_ids,
        &staged.file_hashes,
        &vars(),
    );
    let r = roots();
    let v = vars();
    let req = request(&plan, &m, &agent_ids, &staged, &v, Some(&previous), &r);
    execute_plan(
        &config_store,
        &state_store,
        Some(&scheduler),
        &fs,
        &RecordingReporter::default(),
        &req,
    )
    .await
    .expect("update executes");

    assert!(!fs.contains("/aviary/workspaces/ops-scribe/SOUL.md"));
    let config = config_store.current();
    assert!(!config.agents.list.iter().any(|e| e.id == "ops-scribe"));
    // Topology emptied: the namespace pattern is withdrawn.
    assert!(config.agent_to_agent.is_none());
    // The scribe job was removed remotely.
    assert!(scheduler.remote_jobs().is_empty());

    let state = state_store.current("ops", "watchtower").expect("state saved");
    assert!(!state.agents.contains_key("scribe"));
    assert!(state.file_hashes.keys().all(|key| !key.starts_with("ops-scribe:")));
    assert!(state.cron_jobs.is_empty());
}
