//! Shared fixtures: one installed formation and the matching live world.

use std::path::PathBuf;

use aviary_cli::application::ports::RemoteJob;
use aviary_cli::domain::digest::sha256_hex;
use aviary_cli::domain::state::{AgentRecord, CronJobRecord, FormationState};
use aviary_common::{AgentEntry, Binding, BindingMatch, HostConfig};
use chrono::Utc;

use crate::mocks::{MemFs, MockScheduler};

pub const SOUL: &[u8] = b"Watch eu dashboards.";

pub fn binding() -> Binding {
    Binding {
        agent_id: "ops-sentry".to_string(),
        match_: BindingMatch {
            channel: "slack".to_string(),
            peer: Some("C042".to_string()),
            account: None,
        },
    }
}

pub fn installed_state() -> FormationState {
    let now = Utc::now();
    FormationState {
        namespace: "ops".to_string(),
        name: "watchtower".to_string(),
        version: "1.0.0".to_string(),
        installed_at: now,
        updated_at: now,
        agents: [(
            "sentry".to_string(),
            AgentRecord {
                id: "ops-sentry".to_string(),
                workspace: PathBuf::from("/aviary/workspaces/ops-sentry"),
                files: vec!["SOUL.md".to_string()],
                model: None,
            },
        )]
        .into_iter()
        .collect(),
        bindings: vec![binding()],
        cron_jobs: vec![CronJobRecord {
            id: "job-1".to_string(),
            name: "ops-sentry-job-0".to_string(),
            agent_slug: "sentry".to_string(),
            schedule: "0 9 * * *".to_string(),
            prompt: "Check in.".to_string(),
            timezone: None,
        }],
        variables: [("REGION".to_string(), "eu".to_string())].into_iter().collect(),
        file_hashes: [("ops-sentry:SOUL.md".to_string(), sha256_hex(SOUL))]
            .into_iter()
            .collect(),
        agent_to_agent_edges: Some(vec![]),
        source_path: None,
    }
}

pub fn matching_config() -> HostConfig {
    let mut config = HostConfig::default();
    config.agents.list.push(AgentEntry {
        id: "main".to_string(),
        ..AgentEntry::default()
    });
    config.agents.list.push(AgentEntry {
        id: "ops-sentry".to_string(),
        workspace: Some("/aviary/workspaces/ops-sentry".to_string()),
        ..AgentEntry::default()
    });
    config.bindings.push(binding());
    config
}

pub fn matching_fs() -> MemFs {
    MemFs::with_files(&[("/aviary/workspaces/ops-sentry/SOUL.md", SOUL)])
}

pub fn matching_scheduler() -> MockScheduler {
    MockScheduler::with_jobs(vec![RemoteJob {
        id: "job-1".to_string(),
        name: "ops-sentry-job-0".to_string(),
        schedule: "0 9 * * *".to_string(),
        prompt: "Check in.".to_string(),
        timezone: None,
    }])
}
