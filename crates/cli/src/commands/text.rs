// `quire text`: print a document's plain-text rendering.

use std::path::PathBuf;

use clap::Args;
use quire_common::serialize_to_plain_text;
use serde::Serialize;

use super::load_document;
use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct TextArgs {
    /// Document JSON file.
    pub doc: PathBuf,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
pub struct TextResult {
    pub text: String,
    pub chars: usize,
}

pub fn run(args: TextArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    let result = load_document(&args.doc).map(|tree| {
        let text = serialize_to_plain_text(&tree);
        TextResult { chars: text.chars().count(), text }
    });

    match result {
        Ok(result) => {
            output::print_output(format, &result, |r| r.text.trim_end_matches('\n').to_string())?;
            Ok(ExitCode::Success)
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::commands::test_support::write_guide;

    #[test]
    fn renders_fixture_text() {
        let dir = TempDir::new().unwrap();
        let tree = load_document(&write_guide(&dir)).unwrap();
        assert_eq!(
            serialize_to_plain_text(&tree),
            "Guide\nRead this first.\nInstall\nRun cargo install once.\n"
        );
    }
}
