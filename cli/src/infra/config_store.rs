//! Infrastructure implementation of the `HostConfigStore` port.
//!
//! The document is always read and written whole. Every save first
//! preserves the pre-mutation document as a `.bak` sibling — a human
//! recovery aid, never read programmatically — then replaces the file
//! atomically (temp file + rename).

use std::path::PathBuf;

use anyhow::{Context, Result};
use aviary_common::HostConfig;

use crate::application::ports::HostConfigStore;

/// Production implementation of `HostConfigStore` over a JSON file on disk.
#[derive(Clone)]
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load_sync(&self) -> Result<HostConfig> {
        if !self.path.exists() {
            return Ok(HostConfig::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("cannot read {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("cannot parse {}", self.path.display()))
    }

    fn save_sync(&self, config: &HostConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }

        // Preserve the pre-mutation document.
        if self.path.exists() {
            let backup = self.path.with_extension("json.bak");
            std::fs::copy(&self.path, &backup)
                .with_context(|| format!("backing up {}", self.path.display()))?;
        }

        let content =
            serde_json::to_string_pretty(config).context("cannot serialize host config")?;
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("setting permissions on {}", temp_path.display()))?;
        }

        std::fs::rename(&temp_path, &self.path)
            .with_context(|| format!("finalizing {}", self.path.display()))?;
        Ok(())
    }
}

impl HostConfigStore for JsonConfigStore {
    async fn load(&self) -> Result<HostConfig> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load_sync())
            .await
            .context("config load task panicked")?
    }

    async fn save(&self, config: &HostConfig) -> Result<()> {
        let store = self.clone();
        let config = config.clone();
        tokio::task::spawn_blocking(move || store.save_sync(&config))
            .await
            .context("config save task panicked")?
    }
}
