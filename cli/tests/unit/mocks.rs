//! In-memory mocks for the port traits.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use aviary_cli::application::ports::{
    CronJobParams, FormationStateStore, HostConfigStore, ProgressReporter, RemoteJob,
    SchedulerClient, WorkspaceFs,
};
use aviary_cli::domain::digest::sha256_hex;
use aviary_cli::domain::error::{PathGuardError, SchedulerError};
use aviary_cli::domain::state::FormationState;
use aviary_common::HostConfig;

// ── Filesystem ────────────────────────────────────────────────────────────────

/// In-memory `WorkspaceFs`: a map of absolute paths to contents, plus a log
/// of every write so tests can assert which files were (not) rewritten.
#[derive(Default)]
pub struct MemFs {
    pub files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    pub writes: Mutex<Vec<PathBuf>>,
}

impl MemFs {
    pub fn with_files(entries: &[(&str, &[u8])]) -> Self {
        let fs = Self::default();
        {
            let mut files = fs.files.lock().unwrap();
            for (path, bytes) in entries {
                files.insert(PathBuf::from(path), bytes.to_vec());
            }
        }
        fs
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(&PathBuf::from(path))
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(&PathBuf::from(path)).cloned()
    }

    pub fn write_log(&self) -> Vec<PathBuf> {
        self.writes.lock().unwrap().clone()
    }

    fn guard(root: &Path, path: &Path) -> Result<()> {
        if path
            .components()
            .any(|component| matches!(component, Component::ParentDir))
        {
            return Err(PathGuardError::ParentComponent(path.display().to_string()).into());
        }
        if !path.starts_with(root) {
            return Err(PathGuardError::Escapes {
                root: root.display().to_string(),
                path: path.display().to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl WorkspaceFs for MemFs {
    fn exists(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        files
            .keys()
            .any(|key| key.as_path() == path || key.starts_with(path))
    }

    fn create_dir_all(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such file: {}", path.display()))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), bytes.to_vec());
        self.writes.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    fn hash_file(&self, path: &Path) -> Result<Option<String>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(path)
            .map(|bytes| sha256_hex(bytes)))
    }

    fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let files = self.files.lock().unwrap();
        let mut listed: Vec<PathBuf> = files
            .keys()
            .filter_map(|key| key.strip_prefix(root).ok().map(Path::to_path_buf))
            .collect();
        listed.sort();
        Ok(listed)
    }

    fn copy_tree(&self, src: &Path, dest: &Path) -> Result<()> {
        let entries: Vec<(PathBuf, Vec<u8>)> = {
            let files = self.files.lock().unwrap();
            files
                .iter()
                .filter_map(|(key, bytes)| {
                    key.strip_prefix(src)
                        .ok()
                        .map(|rel| (dest.join(rel), bytes.clone()))
                })
                .collect()
        };
        let mut files = self.files.lock().unwrap();
        for (path, bytes) in entries {
            files.insert(path, bytes);
        }
        Ok(())
    }

    fn remove_file_within(&self, root: &Path, path: &Path) -> Result<()> {
        Self::guard(root, path)?;
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    fn remove_dir_within(&self, root: &Path, path: &Path) -> Result<()> {
        Self::guard(root, path)?;
        let mut files = self.files.lock().unwrap();
        files.retain(|key, _| !key.starts_with(path));
        Ok(())
    }
}

// ── Config store ──────────────────────────────────────────────────────────────

/// In-memory `HostConfigStore` with a save counter.
#[derive(Default)]
pub struct MemConfigStore {
    pub config: Mutex<HostConfig>,
    pub saves: Mutex<usize>,
}

impl MemConfigStore {
    pub fn with_config(config: HostConfig) -> Self {
        Self {
            config: Mutex::new(config),
            saves: Mutex::new(0),
        }
    }

    pub fn current(&self) -> HostConfig {
        self.config.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

impl HostConfigStore for MemConfigStore {
    async fn load(&self) -> Result<HostConfig> {
        Ok(self.config.lock().unwrap().clone())
    }

    async fn save(&self, config: &HostConfig) -> Result<()> {
        *self.config.lock().unwrap() = config.clone();
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}

// ── State store ───────────────────────────────────────────────────────────────

/// In-memory `FormationStateStore`.
#[derive(Default)]
pub struct MemStateStore {
    pub records: Mutex<BTreeMap<(String, String), FormationState>>,
}

impl MemStateStore {
    pub fn current(&self, namespace: &str, name: &str) -> Option<FormationState> {
        self.records
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

impl FormationStateStore for MemStateStore {
    async fn load(&self, namespace: &str, name: &str) -> Result<Option<FormationState>> {
        Ok(self.current(namespace, name))
    }

    async fn save(&self, state: &FormationState) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert((state.namespace.clone(), state.name.clone()), state.clone());
        Ok(())
    }

    async fn remove(&self, namespace: &str, name: &str) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn list(&self) -> Result<Vec<FormationState>> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

/// In-memory `SchedulerClient`. Job names listed in `fail_names` make the
/// corresponding calls fail with a remote error.
#[derive(Default)]
pub struct MockScheduler {
    pub jobs: Mutex<Vec<RemoteJob>>,
    pub fail_names: BTreeSet<String>,
    pub next_id: Mutex<u32>,
}

impl MockScheduler {
    pub fn failing_on(names: &[&str]) -> Self {
        Self {
            fail_names: names.iter().map(|n| (*n).to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_jobs(jobs: Vec<RemoteJob>) -> Self {
        Self {
            jobs: Mutex::new(jobs),
            ..Self::default()
        }
    }

    pub fn remote_jobs(&self) -> Vec<RemoteJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl SchedulerClient for MockScheduler {
    async fn add_job(&self, params: &CronJobParams) -> Result<String, SchedulerError> {
        if self.fail_names.contains(&params.name) {
            return Err(SchedulerError::Remote(format!(
                "adding job '{}': HTTP 500",
                params.name
            )));
        }
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let id = format!("job-{next_id}");
        self.jobs.lock().unwrap().push(RemoteJob {
            id: id.clone(),
            name: params.name.clone(),
            schedule: params.schedule.clone(),
            prompt: params.prompt.clone(),
            timezone: params.timezone.clone(),
        });
        Ok(id)
    }

    async fn update_job(&self, id: &str, patch: &CronJobParams) -> Result<(), SchedulerError> {
        if self.fail_names.contains(&patch.name) {
            return Err(SchedulerError::Remote(format!(
                "updating job '{}': HTTP 500",
                patch.name
            )));
        }
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.iter_mut().find(|job| job.id == id) else {
            return Err(SchedulerError::NotFound(id.to_string()));
        };
        job.schedule = patch.schedule.clone();
        job.prompt = patch.prompt.clone();
        job.timezone = patch.timezone.clone();
        Ok(())
    }

    async fn remove_job(&self, id: &str) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|job| job.id != id);
        if jobs.len() == before {
            return Err(SchedulerError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_jobs(&self) -> Result<Vec<RemoteJob>, SchedulerError> {
        Ok(self.jobs.lock().unwrap().clone())
    }
}

/// A scheduler type for tests that pass `None` — never constructed.
pub struct NoScheduler;

impl SchedulerClient for NoScheduler {
    async fn add_job(&self, _: &CronJobParams) -> Result<String, SchedulerError> {
        unreachable!("NoScheduler is never called")
    }
    async fn update_job(&self, _: &str, _: &CronJobParams) -> Result<(), SchedulerError> {
        unreachable!("NoScheduler is never called")
    }
    async fn remove_job(&self, _: &str) -> Result<(), SchedulerError> {
        unreachable!("NoScheduler is never called")
    }
    async fn list_jobs(&self) -> Result<Vec<RemoteJob>, SchedulerError> {
        unreachable!("NoScheduler is never called")
    }
}

// ── Reporter ──────────────────────────────────────────────────────────────────

/// Reporter that records messages instead of printing.
#[derive(Default)]
pub struct RecordingReporter {
    pub messages: Mutex<Vec<String>>,
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
    fn success(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
    fn warn(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
