//! Application service — variable resolution.
//!
//! Resolution order: `--var` overrides, then values carried over from the
//! previous installation, then manifest defaults, then — for required
//! values only — the interactive prompter. In non-interactive mode every
//! missing required value is collected and reported as one validation
//! error, before any mutation is attempted.

use std::collections::BTreeMap;

use anyhow::Result;
use aviary_common::FormationManifest;

use crate::application::ports::ValuePrompter;
use crate::domain::error::FormationError;
use crate::domain::state::FormationState;
use crate::domain::template::SENSITIVE_PLACEHOLDER;

/// The resolved variable set.
#[derive(Debug, Clone, Default)]
pub struct ResolvedVariables {
    /// Real values, used for template substitution. Never persisted as-is.
    pub values: BTreeMap<String, String>,
    /// What the state record stores: sensitive values replaced by the
    /// opaque placeholder.
    pub persisted: BTreeMap<String, String>,
}

/// Parse repeated `--var KEY=VALUE` flags.
///
/// # Errors
///
/// Returns an error on a flag without `=`.
pub fn parse_var_overrides(flags: &[String]) -> Result<BTreeMap<String, String>> {
    let mut overrides = BTreeMap::new();
    for flag in flags {
        let Some((key, value)) = flag.split_once('=') else {
            anyhow::bail!("invalid --var '{flag}': expected KEY=VALUE");
        };
        overrides.insert(key.to_string(), value.to_string());
    }
    Ok(overrides)
}

/// Resolve every declared variable.
///
/// Sensitive values from the previous state are placeholders, never the
/// secret, so they cannot be carried over — a required sensitive value is
/// re-prompted (or must be supplied via `--var` in non-interactive mode).
///
/// # Errors
///
/// Returns [`FormationError::MissingVariables`] listing every missing
/// required key when no prompter is available, or a prompt error.
pub fn resolve_variables(
    manifest: &FormationManifest,
    previous: Option<&FormationState>,
    overrides: &BTreeMap<String, String>,
    prompter: Option<&impl ValuePrompter>,
) -> Result<ResolvedVariables> {
    let mut resolved = ResolvedVariables::default();
    let mut missing: Vec<String> = Vec::new();

    for def in &manifest.variables {
        let prior = previous
            .and_then(|state| state.variables.get(&def.key))
            .filter(|value| value.as_str() != SENSITIVE_PLACEHOLDER)
            .cloned();
        let mut value = overrides
            .get(&def.key)
            .cloned()
            .or(prior)
            .or_else(|| def.default.clone());

        if value.is_none() && def.required {
            match prompter {
                Some(prompter) => {
                    let entered = if def.sensitive {
                        prompter.secret(&def.key, def.description.as_deref())?
                    } else {
                        prompter.input(&def.key, def.description.as_deref(), None)?
                    };
                    value = Some(entered);
                }
                None => {
                    missing.push(def.key.clone());
                    continue;
                }
            }
        }

        if let Some(value) = value {
            let stored = if def.sensitive {
                SENSITIVE_PLACEHOLDER.to_string()
            } else {
                value.clone()
            };
            resolved.persisted.insert(def.key.clone(), stored);
            resolved.values.insert(def.key.clone(), value);
        }
    }

    if !missing.is_empty() {
        return Err(FormationError::MissingVariables(missing.join("\n")).into());
    }
    Ok(resolved)
}
