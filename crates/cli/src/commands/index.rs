// `quire index`: chunk, embed and store a document.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use quire_common::ContentNode;
use quire_indexer::{
    DocumentSession, EmbeddingClient, HttpEmbeddingClient, OrchestratorOptions, QuireConfig,
    ReindexOutcome, SqliteChunkStore,
};
use serde::Serialize;
use uuid::Uuid;

use super::{load_config, load_document};
use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Document JSON file.
    pub doc: PathBuf,

    /// Stable document identifier used as the index key.
    #[arg(long)]
    doc_id: Uuid,

    /// Document title (defaults to the first heading, then the file name).
    #[arg(long)]
    title: Option<String>,

    /// Config file (defaults to ~/.quire/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
pub struct IndexReport {
    pub doc_id: Uuid,
    pub title: String,
    pub index_path: String,
    #[serde(flatten)]
    pub outcome: ReindexOutcome,
}

pub fn run(args: IndexArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")
        .and_then(|runtime| {
            runtime.block_on(async {
                let config = load_config(args.config.as_deref())?;
                let client = HttpEmbeddingClient::from_config(&config.embedding)?;
                index_document(&args, &config, &client).await
            })
        });

    match result {
        Ok(report) => {
            if let ReindexOutcome::Deferred { failed_chunks, .. } = &report.outcome {
                output::print_warning(
                    format,
                    "INDEX_DEFERRED",
                    &format!(
                        "document re-index deferred due to embedding service error ({} chunk(s) affected)",
                        failed_chunks.len()
                    ),
                );
            }
            output::print_output(format, &report, format_human)?;
            Ok(ExitCode::from_reindex(&report.outcome))
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

async fn index_document<C>(args: &IndexArgs, config: &QuireConfig, client: &C) -> anyhow::Result<IndexReport>
where
    C: EmbeddingClient + ?Sized,
{
    let tree = load_document(&args.doc)?;
    let title = args.title.clone().unwrap_or_else(|| default_title(&tree, &args.doc));
    let index_path = config
        .index_db_path()
        .context("cannot locate the index database: no home directory")?;
    let mut store = SqliteChunkStore::open(&index_path)?;

    let session = DocumentSession::new(args.doc_id, title.clone(), tree);
    let outcome = session
        .reindex(client, &mut store, &OrchestratorOptions::from_config(config))
        .await?;

    Ok(IndexReport { doc_id: args.doc_id, title, index_path: index_path.display().to_string(), outcome })
}

fn default_title(tree: &ContentNode, path: &Path) -> String {
    tree.children()
        .iter()
        .find(|node| matches!(node, ContentNode::Heading { .. }))
        .map(|heading| heading.text_content().trim().to_string())
        .filter(|text| !text.is_empty())
        .or_else(|| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
        .unwrap_or_default()
}

fn format_human(report: &IndexReport) -> String {
    let summary = match &report.outcome {
        ReindexOutcome::Skipped => "index already current".to_string(),
        ReindexOutcome::Indexed { chunks, .. } => format!("indexed {chunks} chunk(s)"),
        ReindexOutcome::Deferred { failed_chunks, title_failed } => {
            let mut text = format!("re-index deferred: {} chunk(s) failed", failed_chunks.len());
            if *title_failed {
                text.push_str(", title failed");
            }
            text
        }
    };
    format!("{} ({}): {summary}\nindex: {}", report.title, report.doc_id, report.index_path)
}
