// `quire sections`: list top-level sections with breadcrumbs.

use std::path::PathBuf;

use clap::Args;
use quire_common::{extract_sections, Section};
use serde::Serialize;

use super::load_document;
use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct SectionsArgs {
    /// Document JSON file.
    pub doc: PathBuf,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
pub struct SectionsResult {
    pub doc_path: String,
    pub sections: Vec<Section>,
}

pub fn run(args: SectionsArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    let result = load_document(&args.doc).and_then(|tree| {
        let sections = extract_sections(&tree)?;
        Ok(SectionsResult { doc_path: args.doc.display().to_string(), sections })
    });

    match result {
        Ok(result) => {
            output::print_output(format, &result, format_human)?;
            Ok(ExitCode::Success)
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

fn format_human(result: &SectionsResult) -> String {
    let mut lines = Vec::new();
    lines.push(format!("{}: {} section(s)", result.doc_path, result.sections.len()));

    if result.sections.is_empty() {
        return lines.join("\n");
    }

    lines.push(format!("  {:<4} {:>9}  {}", "LVL", "NODES", "BREADCRUMB"));
    for section in &result.sections {
        let nodes = format!("{}..={}", section.start_node_index, section.end_node_index);
        lines.push(format!("  H{:<3} {:>9}  {}", section.level(), nodes, section.breadcrumb));
    }
    lines.join("\n")
}
