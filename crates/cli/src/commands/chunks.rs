// `quire chunks`: show how a document would be chunked for embedding.

use std::path::PathBuf;

use clap::Args;
use quire_common::{chunk_fingerprint, plan_chunks, Chunk, ChunkOptions, ChunkStrategy};
use serde::Serialize;

use super::{load_config, load_document};
use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ChunksArgs {
    /// Document JSON file.
    pub doc: PathBuf,

    /// Config file (defaults to ~/.quire/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the paragraph chunk limit (characters).
    #[arg(long)]
    max_chars: Option<usize>,

    /// Override the fixed-size window (characters).
    #[arg(long)]
    simple_chars: Option<usize>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
pub struct ChunksResult {
    pub strategy: ChunkStrategy,
    pub fingerprint: String,
    pub chunks: Vec<Chunk>,
}

pub fn run(args: ChunksArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    let result = load_config(args.config.as_deref()).and_then(|config| {
        let options = ChunkOptions {
            max_chunk_chars: args.max_chars.unwrap_or(config.chunking.max_chunk_chars).max(1),
            simple_chunk_chars: args.simple_chars.unwrap_or(config.chunking.simple_chunk_chars).max(1),
        };
        let tree = load_document(&args.doc)?;
        let plan = plan_chunks(&tree, &options);
        Ok(ChunksResult {
            fingerprint: chunk_fingerprint(&plan.chunks),
            strategy: plan.strategy,
            chunks: plan.chunks,
        })
    });

    match result {
        Ok(result) => {
            if let ChunkStrategy::Degraded { reason } = &result.strategy {
                output::print_warning(format, "CHUNKING_DEGRADED", reason);
            }
            output::print_output(format, &result, format_human)?;
            Ok(ExitCode::Success)
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

fn format_human(result: &ChunksResult) -> String {
    let strategy = match &result.strategy {
        ChunkStrategy::Sections => "sections",
        ChunkStrategy::Simple => "simple",
        ChunkStrategy::Degraded { .. } => "degraded",
    };
    let mut lines = vec![format!("{} chunk(s), strategy: {strategy}", result.chunks.len())];
    for (position, chunk) in result.chunks.iter().enumerate() {
        let label = chunk.header_breadcrumb.as_deref().unwrap_or("(no heading)");
        lines.push(format!("[{position}] {label} ({} chars)", chunk.content.chars().count()));
        for line in chunk.content.lines().filter(|line| !line.trim().is_empty()) {
            lines.push(format!("    {line}"));
        }
    }
    lines.join("\n")
}
