//! Local filesystem layout of the Aviary state root.

use std::path::{Path, PathBuf};

use anyhow::Result;

/// Resolved locations under the Aviary home (`~/.aviary`, overridable via
/// `AVIARY_HOME` for tests and packaging).
#[derive(Debug, Clone)]
pub struct AviaryHome {
    root: PathBuf,
}

impl AviaryHome {
    /// Resolve from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn resolve() -> Result<Self> {
        if let Ok(root) = std::env::var("AVIARY_HOME") {
            return Ok(Self { root: PathBuf::from(root) });
        }
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        Ok(Self { root: home.join(".aviary") })
    }

    /// Explicit root (used in tests).
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The host configuration document (`AVIARY_CONFIG` override).
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = std::env::var("AVIARY_CONFIG") {
            return PathBuf::from(path);
        }
        self.root.join("aviary.json")
    }

    /// Formation state records.
    #[must_use]
    pub fn formations_dir(&self) -> PathBuf {
        self.root.join("formations")
    }

    /// Content-addressed source snapshots.
    #[must_use]
    pub fn sources_dir(&self) -> PathBuf {
        self.formations_dir().join("sources")
    }

    /// Deployed per-agent workspace trees.
    #[must_use]
    pub fn workspaces_dir(&self) -> PathBuf {
        self.root.join("workspaces")
    }

    /// Per-agent auxiliary state (sessions, memory).
    #[must_use]
    pub fn agents_dir(&self) -> PathBuf {
        self.root.join("agents")
    }
}
