// CLI subcommand dispatch.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use quire_common::ContentNode;
use quire_indexer::QuireConfig;

use crate::exit_code::ExitCode;

pub mod apply;
pub mod chunks;
pub mod index;
pub mod sections;
pub mod text;

#[derive(Subcommand)]
pub enum Command {
    /// Print a document's plain text
    Text(text::TextArgs),
    /// List top-level sections with breadcrumbs
    Sections(sections::SectionsArgs),
    /// Show the chunks a document would be embedded as
    Chunks(chunks::ChunksArgs),
    /// Apply a batch of search/replace changes
    Apply(apply::ApplyArgs),
    /// Chunk, embed and store a document
    Index(index::IndexArgs),
}

pub fn run(cmd: Command) -> Result<ExitCode> {
    match cmd {
        Command::Text(args) => text::run(args),
        Command::Sections(args) => sections::run(args),
        Command::Chunks(args) => chunks::run(args),
        Command::Apply(args) => apply::run(args),
        Command::Index(args) => index::run(args),
    }
}

/// Read a document tree from its JSON wire form.
pub(crate) fn load_document(path: &Path) -> Result<ContentNode> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("`{}` is not valid JSON", path.display()))?;
    let tree = ContentNode::from_json(&value)
        .with_context(|| format!("failed to load document `{}`", path.display()))?;
    Ok(tree)
}

/// Explicit config file, or `~/.quire/config.toml` (defaults when absent).
pub(crate) fn load_config(path: Option<&Path>) -> Result<QuireConfig> {
    let config = match path {
        Some(path) => QuireConfig::load_from(path)
            .with_context(|| format!("failed to load config `{}`", path.display()))?,
        None => QuireConfig::load().context("failed to load global config")?,
    };
    Ok(config)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    use serde_json::json;
    use tempfile::TempDir;

    /// Two-section document written to a temp dir.
    pub fn write_guide(dir: &TempDir) -> PathBuf {
        let doc = json!({
            "type": "doc",
            "content": [
                { "type": "heading", "attrs": { "level": 1 }, "content": [{ "type": "text", "text": "Guide" }] },
                { "type": "paragraph", "content": [{ "type": "text", "text": "Read this first." }] },
                { "type": "heading", "attrs": { "level": 2 }, "content": [{ "type": "text", "text": "Install" }] },
                { "type": "paragraph", "content": [
                    { "type": "text", "text": "Run " },
                    { "type": "text", "text": "cargo install", "marks": [{ "type": "code" }] },
                    { "type": "text", "text": " once." }
                ] }
            ]
        });
        let path = dir.path().join("guide.json");
        std::fs::write(&path, doc.to_string()).expect("fixture should be written");
        path
    }
}
