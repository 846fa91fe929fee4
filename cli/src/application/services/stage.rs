//! Application service — stage a formation's workspace files.
//!
//! Reads each agent's source directory, substitutes `{{KEY}}` tokens in
//! text files (binary files are copied as opaque bytes), renders the
//! generated peer-briefing doc for agents with outgoing topology edges, and
//! produces the staged file list plus the hash map the planner and executor
//! consume. All I/O is routed through the `WorkspaceFs` port.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use aviary_common::FormationManifest;

use crate::application::ports::WorkspaceFs;
use crate::domain::state::file_hash_key;
use crate::domain::{digest, template};

/// Name of the generated briefing doc placed in the workspace of every
/// agent with outgoing topology edges.
pub const PEER_BRIEFING_FILE: &str = "PEERS.md";

/// One file ready to deploy.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub agent_slug: String,
    pub agent_id: String,
    /// Workspace-relative path, `/`-separated.
    pub rel_path: String,
    /// Hash of the final (substituted) content.
    pub hash: String,
    pub bytes: Vec<u8>,
}

/// The staged desired state of a formation's workspaces.
#[derive(Debug, Clone, Default)]
pub struct StagedTree {
    pub files: Vec<StagedFile>,
    /// `"<agentId>:<relPath>"` -> content hash, as the planner consumes it.
    pub file_hashes: BTreeMap<String, String>,
    /// Content digest of the raw source tree — addresses the snapshot.
    pub source_digest: String,
}

impl StagedTree {
    /// Staged files belonging to one agent.
    #[must_use]
    pub fn files_for<'a>(&'a self, agent_id: &'a str) -> impl Iterator<Item = &'a StagedFile> {
        self.files.iter().filter(move |f| f.agent_id == agent_id)
    }
}

/// Stage every agent's files. Deterministic: same sources, variables, and
/// topology always produce the same tree and hashes.
///
/// # Errors
///
/// Returns an error if an agent source directory is missing or unreadable.
pub fn stage_formation(
    fs: &impl WorkspaceFs,
    manifest: &FormationManifest,
    agent_ids: &BTreeMap<String, String>,
    variables: &BTreeMap<String, String>,
    source_root: &Path,
) -> Result<StagedTree> {
    let mut tree = StagedTree::default();

    for (slug, def) in &manifest.agents {
        let Some(agent_id) = agent_ids.get(slug) else {
            continue;
        };
        let dir = source_root.join(&def.source);
        anyhow::ensure!(
            fs.exists(&dir),
            "agent '{slug}' source directory not found: {}",
            dir.display()
        );

        for rel in fs.list_files(&dir)? {
            let raw = fs
                .read(&dir.join(&rel))
                .with_context(|| format!("reading {}", dir.join(&rel).display()))?;
            let bytes = render(raw, variables);
            let rel_path = unix_path(&rel);
            push_file(&mut tree, slug, agent_id, rel_path, bytes);
        }

        if let Some(briefing) = peer_briefing(manifest, slug, agent_ids) {
            push_file(
                &mut tree,
                slug,
                agent_id,
                PEER_BRIEFING_FILE.to_string(),
                briefing.into_bytes(),
            );
        }
    }

    tree.source_digest = source_tree_digest(fs, source_root)?;
    Ok(tree)
}

/// Digest of the raw (unsubstituted) source tree, used to address the
/// persisted snapshot.
///
/// # Errors
///
/// Returns an error if the tree cannot be read.
pub fn source_tree_digest(fs: &impl WorkspaceFs, source_root: &Path) -> Result<String> {
    let mut entries = Vec::new();
    for rel in fs.list_files(source_root)? {
        let raw = fs.read(&source_root.join(&rel))?;
        entries.push((unix_path(&rel), digest::sha256_hex(&raw)));
    }
    Ok(digest::tree_digest(&entries))
}

/// Render the briefing doc for `slug`, or `None` when the agent has no
/// outgoing topology edges (the file is then simply not part of the
/// deployed set, which removes a previously-generated one).
#[must_use]
pub fn peer_briefing(
    manifest: &FormationManifest,
    slug: &str,
    agent_ids: &BTreeMap<String, String>,
) -> Option<String> {
    let targets = manifest.topology.get(slug)?;
    if targets.is_empty() {
        return None;
    }
    let mut doc = String::from("# Peer agents\n\nYou may message these agents directly:\n\n");
    for target in targets {
        let Some(target_id) = agent_ids.get(target) else {
            continue;
        };
        let display = manifest
            .agents
            .get(target)
            .and_then(|def| def.display_name.as_deref())
            .unwrap_or(target);
        doc.push_str(&format!("- {display} (`{target_id}`)\n"));
    }
    Some(doc)
}

fn render(raw: Vec<u8>, variables: &BTreeMap<String, String>) -> Vec<u8> {
    if template::looks_binary(&raw) {
        return raw;
    }
    match String::from_utf8(raw) {
        Ok(text) => template::substitute(&text, variables).into_bytes(),
        // Not valid UTF-8: treat as opaque bytes.
        Err(err) => err.into_bytes(),
    }
}

fn push_file(tree: &mut StagedTree, slug: &str, agent_id: &str, rel_path: String, bytes: Vec<u8>) {
    let key = file_hash_key(agent_id, &rel_path);
    // A generated file replaces a same-named source file.
    tree.files
        .retain(|f| !(f.agent_id == agent_id && f.rel_path == rel_path));
    let hash = digest::sha256_hex(&bytes);
    tree.file_hashes.insert(key, hash.clone());
    tree.files.push(StagedFile {
        agent_slug: slug.to_string(),
        agent_id: agent_id.to_string(),
        rel_path,
        hash,
        bytes,
    });
}

fn unix_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
