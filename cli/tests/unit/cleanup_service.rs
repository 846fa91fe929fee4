//! Teardown service tests — cascading uninstall over in-memory mocks.

use std::path::Path;

use aviary_cli::application::services::cleanup::teardown_formation;

use crate::mocks::{MemConfigStore, MemFs, MemStateStore, MockScheduler, NoScheduler, RecordingReporter};

use crate::fixtures::{installed_state, matching_config, matching_fs, matching_scheduler};

#[tokio::test]
async fn test_teardown_removes_every_store_entry() {
    let config_store = MemConfigStore::with_config(matching_config());
    let state_store = MemStateStore::default();
    let fs = matching_fs();
    let scheduler = matching_scheduler();
    let state = installed_state();
    {
        use aviary_cli::application::ports::FormationStateStore as _;
        state_store.save(&state).await.unwrap();
    }

    let outcome = teardown_formation(
        &config_store,
        &state_store,
        Some(&scheduler),
        &fs,
        &RecordingReporter::default(),
        &state,
        Path::new("/aviary"),
        Path::new("/aviary/agents"),
        true,
    )
    .await
    .expect("teardown succeeds");

    assert!(outcome.warnings.is_empty(), "unexpected: {:?}", outcome.warnings);
    assert!(scheduler.remote_jobs().is_empty());
    let config = config_store.current();
    assert!(!config.agents.list.iter().any(|e| e.id == "ops-sentry"));
    assert!(config.bindings.is_empty());
    assert!(config.agent_to_agent.is_none());
    assert!(!fs.contains("/aviary/workspaces/ops-sentry/SOUL.md"));
    assert!(state_store.current("ops", "watchtower").is_none());
}

#[tokio::test]
async fn test_teardown_without_scheduler_warns_about_orphaned_jobs() {
    let config_store = MemConfigStore::with_config(matching_config());
    let state_store = MemStateStore::default();
    let fs = matching_fs();
    let state = installed_state();
    {
        use aviary_cli::application::ports::FormationStateStore as _;
        state_store.save(&state).await.unwrap();
    }

    let outcome = teardown_formation(
        &config_store,
        &state_store,
        None::<&NoScheduler>,
        &fs,
        &RecordingReporter::default(),
        &state,
        Path::new("/aviary"),
        Path::new("/aviary/agents"),
        true,
    )
    .await
    .expect("teardown proceeds without the scheduler");

    assert!(
        outcome.warnings.iter().any(|w| w.contains("orphaned")),
        "expected an orphaned-jobs warning: {:?}",
        outcome.warnings
    );
    // Local cleanup still happened.
    assert!(state_store.current("ops", "watchtower").is_none());
    assert!(!fs.contains("/aviary/workspaces/ops-sentry/SOUL.md"));
}
