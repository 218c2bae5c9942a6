//! The system prompt sent at the start of every conversation. It is
//! assembled once at startup from an optional preamble and the text
//! files in the system messages directory, rendered with Handlebars
//! in strict mode so a typo in a template variable fails loudly
//! instead of producing an empty prompt.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde_json::json;

#[derive(Debug)]
pub enum Prompt {
    System,
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

const SYSTEM_PROMPT: &str = r"{{#if preamble}}{{preamble}}

{{/if}}{{#each fragments}}{{this}}
{{/each}}";

pub fn templates<'a>() -> Handlebars<'a> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    // Prompts are plain text, not HTML
    registry.register_escape_fn(handlebars::no_escape);
    registry
        .register_template_string(&Prompt::System.to_string(), SYSTEM_PROMPT)
        .expect("Failed to register template");
    registry
}

/// Read every `*.txt` file in `dir` in file name order. Files that
/// can't be read are skipped with a warning and a missing directory
/// yields no fragments.
pub fn load_system_messages(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(
                "System messages directory {} unavailable: {}",
                dir.display(),
                e
            );
            return Vec::new();
        }
    };

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    paths.sort();

    paths
        .into_iter()
        .filter_map(|path| match fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) => {
                tracing::warn!("Failed to read file {}: {}", path.display(), e);
                None
            }
        })
        .collect()
}

/// Render the system prompt. Having no preamble and no fragments is
/// valid and renders an empty string.
pub fn render_system_prompt(preamble: Option<&str>, fragments: &[String]) -> Result<String> {
    let registry = templates();
    let rendered = registry
        .render(
            &Prompt::System.to_string(),
            &json!({
                "preamble": preamble,
                "fragments": fragments,
            }),
        )
        .context("Failed to render system prompt")?;
    Ok(rendered)
}
