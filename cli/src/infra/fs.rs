//! Filesystem infrastructure — implements the `WorkspaceFs` port.
//!
//! Scoped deletions go through [`ensure_within`], which rejects any path
//! that escapes the given root via `..` components or symlink resolution.
//! The guard is a hard security invariant: an escaping path is an error,
//! never a silent skip folded into success.

use std::io::Read;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::application::ports::WorkspaceFs;
use crate::domain::digest::hex_encode;
use crate::domain::error::PathGuardError;

/// Production filesystem implementation of `WorkspaceFs`.
pub struct LocalFs;

/// Verify that `candidate` resolves strictly under `root`.
///
/// `..` components are rejected outright; an existing candidate is
/// canonicalized (resolving symlinks) and must remain inside the
/// canonicalized root.
///
/// # Errors
///
/// Returns [`PathGuardError`] on any escape.
pub fn ensure_within(root: &Path, candidate: &Path) -> Result<()> {
    if candidate
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(PathGuardError::ParentComponent(candidate.display().to_string()).into());
    }
    if !candidate.exists() {
        // Nothing on disk to resolve; the lexical check above is all that
        // can be enforced, and deletion of an absent path is a no-op anyway.
        return Ok(());
    }
    let root = root
        .canonicalize()
        .with_context(|| format!("resolving root {}", root.display()))?;
    let resolved = candidate
        .canonicalize()
        .with_context(|| format!("resolving {}", candidate.display()))?;
    if !resolved.starts_with(&root) {
        return Err(PathGuardError::Escapes {
            root: root.display().to_string(),
            path: resolved.display().to_string(),
        }
        .into());
    }
    Ok(())
}

impl WorkspaceFs for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("creating directory {}", path.display()))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
    }

    fn hash_file(&self, path: &Path) -> Result<Option<String>> {
        if !path.exists() {
            return Ok(None);
        }
        sha256_file(path).map(Some)
    }

    fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if root.is_dir() {
            collect_files(root, root, &mut files)?;
        }
        files.sort();
        Ok(files)
    }

    fn copy_tree(&self, src: &Path, dest: &Path) -> Result<()> {
        std::fs::create_dir_all(dest)
            .with_context(|| format!("creating directory {}", dest.display()))?;
        for rel in self.list_files(src)? {
            let from = src.join(&rel);
            let to = dest.join(&rel);
            if let Some(parent) = to.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating directory {}", parent.display()))?;
            }
            std::fs::copy(&from, &to)
                .with_context(|| format!("copying {} to {}", from.display(), to.display()))?;
        }
        Ok(())
    }

    fn remove_file_within(&self, root: &Path, path: &Path) -> Result<()> {
        ensure_within(root, path)?;
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("removing file {}", path.display()))?;
        }
        Ok(())
    }

    fn remove_dir_within(&self, root: &Path, path: &Path) -> Result<()> {
        ensure_within(root, path)?;
        if path.exists() {
            std::fs::remove_dir_all(path)
                .with_context(|| format!("removing directory {}", path.display()))?;
        }
        Ok(())
    }
}

fn collect_files(root: &Path, dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("listing {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("inspecting {}", path.display()))?;
        if file_type.is_dir() {
            collect_files(root, &path, files)?;
        } else if file_type.is_file() {
            if let Ok(rel) = path.strip_prefix(root) {
                files.push(rel.to_path_buf());
            }
        }
        // Symlinks are skipped: deployed trees contain regular files only.
    }
    Ok(())
}

/// Compute the SHA256 hex digest of a file.
///
/// Reads the file in 64 KB chunks to avoid loading large files into memory.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 65536];
    loop {
        let n = file.read(&mut buf).context("reading file")?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}
