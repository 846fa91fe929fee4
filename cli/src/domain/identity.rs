//! Identifier rules and pure manifest validation — no I/O, no async.
//!
//! Namespaces, formation names, and agent slugs all share one rule, checked
//! before any path interpolation to prevent path traversal (CWE-22). The
//! resolved agent id `"<namespace>-<slug>"` must satisfy the same rule,
//! including the length cap.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::Result;
use aviary_common::FormationManifest;
use regex::Regex;

use crate::domain::error::FormationError;

/// Lowercase alphanumeric with interior hyphens, 1-63 characters total.
pub static IDENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Safety: this is a compile-time constant pattern — cannot fail.
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("valid regex")
});

/// Variable keys: SCREAMING_SNAKE_CASE.
pub static VARIABLE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("valid regex")
});

/// Returns `true` if `s` is a valid namespace, formation name, or agent slug.
#[must_use]
pub fn is_valid_ident(s: &str) -> bool {
    IDENT_RE.is_match(s)
}

/// Resolve an agent slug to its stable id: `"<namespace>-<slug>"`.
///
/// The joined id is validated against [`IDENT_RE`] so a binding or state
/// record can never carry an id that would later fail path or registry
/// checks.
///
/// # Errors
///
/// Returns an error if namespace, slug, or the joined id is invalid.
pub fn resolved_agent_id(namespace: &str, slug: &str) -> Result<String> {
    if !is_valid_ident(namespace) {
        return Err(FormationError::InvalidIdentifier(namespace.to_string()).into());
    }
    if !is_valid_ident(slug) {
        return Err(FormationError::InvalidIdentifier(slug.to_string()).into());
    }
    let id = format!("{namespace}-{slug}");
    if !is_valid_ident(&id) {
        return Err(FormationError::InvalidIdentifier(id).into());
    }
    Ok(id)
}

/// Resolve every agent slug in a manifest. Deterministic: `BTreeMap` order.
///
/// # Errors
///
/// Returns an error on the first unresolvable slug.
pub fn resolve_agent_ids(
    manifest: &FormationManifest,
    namespace: &str,
) -> Result<BTreeMap<String, String>> {
    let mut ids = BTreeMap::new();
    for slug in manifest.agents.keys() {
        ids.insert(slug.clone(), resolved_agent_id(namespace, slug)?);
    }
    Ok(ids)
}

/// Deterministic logical name for the `index`-th cron job targeting `slug`.
///
/// Job identity must be stable across re-installs even though the remote
/// scheduler assigns its own opaque ids.
#[must_use]
pub fn cron_job_name(namespace: &str, slug: &str, index: usize) -> String {
    format!("{namespace}-{slug}-job-{index}")
}

/// State file name for a `(namespace, name)` pair.
///
/// `_` cannot appear in a valid identifier, so `__` is a lossless,
/// collision-free separator.
#[must_use]
pub fn state_file_name(namespace: &str, name: &str) -> String {
    format!("{namespace}__{name}.json")
}

/// Parse a `<namespace>/<name>` formation reference.
///
/// # Errors
///
/// Returns an error if the reference is malformed or either part is not a
/// valid identifier.
pub fn parse_formation_ref(reference: &str) -> Result<(String, String)> {
    let Some((namespace, name)) = reference.split_once('/') else {
        return Err(FormationError::InvalidRef(reference.to_string()).into());
    };
    if !is_valid_ident(namespace) || !is_valid_ident(name) {
        return Err(FormationError::InvalidRef(reference.to_string()).into());
    }
    Ok((namespace.to_string(), name.to_string()))
}

/// Validate a parsed manifest against the structural rules the migration
/// machinery depends on. Returns every violation, not just the first —
/// validation failures are fatal before any mutation is attempted.
///
/// Pure function — no I/O, no async.
#[must_use]
pub fn validate_manifest(manifest: &FormationManifest, namespace: &str) -> Vec<String> {
    let mut errors: Vec<String> = Vec::new();

    if !is_valid_ident(namespace) {
        errors.push(format!(
            "namespace '{namespace}' must be lowercase alphanumeric with hyphens"
        ));
    }
    if !is_valid_ident(&manifest.name) {
        errors.push(format!(
            "name '{}' must be lowercase alphanumeric with hyphens",
            manifest.name
        ));
    }
    if semver::Version::parse(&manifest.version).is_err() {
        errors.push(format!(
            "version '{}' is not a valid semantic version",
            manifest.version
        ));
    }
    if manifest.agents.is_empty() {
        errors.push("formation declares no agents".to_string());
    }

    for (slug, def) in &manifest.agents {
        if !is_valid_ident(slug) {
            errors.push(format!("agent slug '{slug}' is not a valid identifier"));
        } else if resolved_agent_id(namespace, slug).is_err() {
            errors.push(format!(
                "agent id '{namespace}-{slug}' exceeds the identifier length limit"
            ));
        }
        if def.source.trim().is_empty() {
            errors.push(format!("agent '{slug}' has an empty source directory"));
        }
        if def.source.split('/').any(|part| part == "..") {
            errors.push(format!("agent '{slug}' source escapes the formation directory"));
        }
    }

    for binding in &manifest.bindings {
        if !manifest.agents.contains_key(&binding.agent) {
            errors.push(format!(
                "binding targets unknown agent '{}'",
                binding.agent
            ));
        }
        if binding.match_.channel.trim().is_empty() {
            errors.push("binding has an empty channel".to_string());
        }
    }

    for (index, job) in manifest.cron_jobs.iter().enumerate() {
        if !manifest.agents.contains_key(&job.agent) {
            errors.push(format!(
                "cron job #{index} targets unknown agent '{}'",
                job.agent
            ));
        }
        if job.schedule.trim().is_empty() {
            errors.push(format!("cron job #{index} has an empty schedule"));
        }
        if job.prompt.trim().is_empty() {
            errors.push(format!("cron job #{index} has an empty prompt"));
        }
    }

    for (from, targets) in &manifest.topology {
        if !manifest.agents.contains_key(from) {
            errors.push(format!("topology edge from unknown agent '{from}'"));
        }
        for to in targets {
            if !manifest.agents.contains_key(to) {
                errors.push(format!("topology edge '{from}' -> unknown agent '{to}'"));
            }
        }
    }

    for variable in &manifest.variables {
        if !VARIABLE_KEY_RE.is_match(&variable.key) {
            errors.push(format!(
                "variable key '{}' must be SCREAMING_SNAKE_CASE",
                variable.key
            ));
        }
    }

    errors
}
