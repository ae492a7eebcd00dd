// `quire apply`: apply a batch of search/replace changes to a document.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use quire_common::patch::NoFallback;
use quire_common::{ApplyResult, ApplyStatus, ChangeRequest, ChangeStatus, ContentNode, Patcher};
use quire_indexer::{DocumentSession, SqliteChunkStore};
use serde::Serialize;
use uuid::Uuid;

use super::{load_config, load_document};
use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Document JSON file.
    pub doc: PathBuf,

    /// JSON array of `{ "search", "replace", "overwrite" }` changes.
    pub changes: PathBuf,

    /// Write the patched document here (defaults to overwriting `doc`).
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Report without writing the document or touching the index.
    #[arg(long)]
    dry_run: bool,

    /// Mark this document's search index outdated when changes apply.
    #[arg(long)]
    doc_id: Option<Uuid>,

    /// Config file (defaults to ~/.quire/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Disable approximate matching for `overwrite` changes.
    #[arg(long)]
    exact: bool,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
pub struct ApplyReport {
    #[serde(flatten)]
    pub result: ApplyResult,
    pub status: ApplyStatus,
    pub written_to: Option<String>,
}

pub fn run(args: ApplyArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    match apply(&args) {
        Ok(report) => {
            output::print_output(format, &report, format_human)?;
            Ok(ExitCode::from_apply_status(&report.status))
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

fn apply(args: &ApplyArgs) -> anyhow::Result<ApplyReport> {
    let config = load_config(args.config.as_deref())?;
    let tree = load_document(&args.doc)?;
    let changes = load_changes(&args.changes)?;
    let matcher = if args.exact { None } else { config.patch.matcher() };

    let (tree, result) = match args.doc_id.filter(|_| !args.dry_run) {
        Some(doc_id) => {
            let index_path = config
                .index_db_path()
                .context("cannot locate the index database: no home directory")?;
            let mut store = SqliteChunkStore::open(&index_path)?;
            let mut session = DocumentSession::new(doc_id, String::new(), tree).with_matcher(matcher);
            let result = session.apply(&changes, &mut store)?;
            (session.into_tree(), result)
        }
        None => {
            let mut tree = tree;
            let patcher = match matcher {
                Some(matcher) => Patcher::new().with_fallback(matcher),
                None => Patcher::new().with_fallback(NoFallback),
            };
            let result = patcher.apply(&mut tree, &changes);
            (tree, result)
        }
    };

    let written_to = if args.dry_run || result.applied_changes == 0 {
        None
    } else {
        let target = args.output.as_deref().unwrap_or(&args.doc);
        write_document(target, &tree)?;
        Some(target.display().to_string())
    };

    Ok(ApplyReport { status: result.status(), result, written_to })
}

fn load_changes(path: &Path) -> anyhow::Result<Vec<ChangeRequest>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("`{}` is not a JSON array of changes", path.display()))
}

fn write_document(path: &Path, tree: &ContentNode) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&tree.to_json())?;
    fs::write(path, json).with_context(|| format!("failed to write `{}`", path.display()))
}

fn format_human(report: &ApplyReport) -> String {
    let mut lines = vec![match &report.status {
        ApplyStatus::NothingToApply => "no changes given".to_string(),
        ApplyStatus::AllApplied => format!("all {} change(s) applied", report.result.outcomes.len()),
        ApplyStatus::Partial { applied, total } => format!("{applied} of {total} changes applied"),
        ApplyStatus::NoneApplied => "no changes could be applied".to_string(),
        ApplyStatus::Aborted { applied, total } => {
            format!("batch aborted after {applied} of {total} changes")
        }
    }];

    for outcome in &report.result.outcomes {
        let detail = match &outcome.status {
            ChangeStatus::Applied { via_fallback: true } => "applied (approximate match)".to_string(),
            ChangeStatus::Applied { via_fallback: false } => "applied".to_string(),
            ChangeStatus::Unchanged => "unchanged".to_string(),
            ChangeStatus::Failed { error, .. } => format!("failed: {error}"),
            ChangeStatus::Aborted { reason } => format!("aborted: {reason}"),
            ChangeStatus::Skipped => "skipped".to_string(),
        };
        lines.push(format!("  #{:<3} {detail}", outcome.index));
    }

    if let Some(path) = &report.written_to {
        lines.push(format!("wrote {path}"));
    }
    lines.join("\n")
}
