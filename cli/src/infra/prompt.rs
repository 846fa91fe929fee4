//! Infrastructure implementation of the `ValuePrompter` port using
//! dialoguer. Only constructed in interactive (non `--yes`) runs.

use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, Password};

use crate::application::ports::ValuePrompter;

/// Terminal prompter.
pub struct TerminalPrompter;

impl ValuePrompter for TerminalPrompter {
    fn input(&self, key: &str, description: Option<&str>, default: Option<&str>) -> Result<String> {
        let prompt = match description {
            Some(description) => format!("{key} ({description})"),
            None => key.to_string(),
        };
        let mut input = Input::<String>::new().with_prompt(prompt);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        input
            .interact_text()
            .with_context(|| format!("reading value for {key}"))
    }

    fn secret(&self, key: &str, description: Option<&str>) -> Result<String> {
        let prompt = match description {
            Some(description) => format!("{key} ({description})"),
            None => key.to_string(),
        };
        Password::new()
            .with_prompt(prompt)
            .interact()
            .with_context(|| format!("reading secret for {key}"))
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()
            .context("reading confirmation")
    }
}
