// Chunk generation: section-aware chunks with a fixed-window fallback.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::content::text::{serialize_nodes, serialize_to_plain_text};
use crate::content::ContentNode;
use crate::error::StructuralError;
use crate::hash::{sha256_fields, ContentHash};
use crate::section::extract::extract_sections;
use crate::types::{Chunk, Section};

pub const DEFAULT_MAX_CHUNK_CHARS: usize = 2000;
pub const DEFAULT_SIMPLE_CHUNK_CHARS: usize = 1000;

/// Size limits, counted in characters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkOptions {
    /// Upper bound for a section-aware chunk.
    pub max_chunk_chars: usize,
    /// Window size for fixed-size chunks.
    pub simple_chunk_chars: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            simple_chunk_chars: DEFAULT_SIMPLE_CHUNK_CHARS,
        }
    }
}

/// How a chunk list was produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkStrategy {
    Sections,
    /// The document has no headings.
    Simple,
    /// Section-aware chunking failed and fixed windows were used instead.
    Degraded { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub chunks: Vec<Chunk>,
    pub strategy: ChunkStrategy,
}

/// Chunk a document along its heading structure.
///
/// Fails on a structurally invalid tree instead of emitting partial output.
pub fn generate_paragraph_chunks(
    tree: &ContentNode,
    options: &ChunkOptions,
) -> Result<Vec<Chunk>, StructuralError> {
    tree.validate()?;
    let sections = extract_sections(tree)?;
    Ok(chunks_for_sections(tree.children(), &sections, options.max_chunk_chars))
}

/// Split plain text into consecutive windows of at most `window_chars`
/// characters. Concatenating the chunk contents gives back `text`.
pub fn generate_simple_chunks(text: &str, window_chars: usize) -> Vec<Chunk> {
    let window = window_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let end = window_end(rest, window);
        chunks.push(Chunk::simple(chunks.len(), rest[..end].to_string()));
        rest = &rest[end..];
    }
    chunks
}

/// Pick a chunking strategy for `tree` and run it.
///
/// No sections goes straight to fixed windows; a section-aware failure
/// degrades to fixed windows over the full plain text.
pub fn plan_chunks(tree: &ContentNode, options: &ChunkOptions) -> ChunkPlan {
    let sections = match extract_sections(tree) {
        Ok(sections) => sections,
        Err(error) => return degraded(tree, options, error),
    };
    if sections.is_empty() {
        let text = serialize_to_plain_text(tree);
        return ChunkPlan {
            chunks: generate_simple_chunks(&text, options.simple_chunk_chars),
            strategy: ChunkStrategy::Simple,
        };
    }
    if let Err(error) = tree.validate() {
        return degraded(tree, options, error);
    }

    ChunkPlan {
        chunks: chunks_for_sections(tree.children(), &sections, options.max_chunk_chars),
        strategy: ChunkStrategy::Sections,
    }
}

/// Digest of chunk contents and their structural positions.
pub fn chunk_fingerprint(chunks: &[Chunk]) -> ContentHash {
    sha256_fields(chunks.iter().flat_map(|chunk| {
        [chunk.content.as_str(), chunk.header_breadcrumb.as_deref().unwrap_or_default()]
    }))
}

fn degraded(tree: &ContentNode, options: &ChunkOptions, error: StructuralError) -> ChunkPlan {
    warn!(error = %error, "section chunking failed; using fixed-size chunks");
    let text = serialize_to_plain_text(tree);
    ChunkPlan {
        chunks: generate_simple_chunks(&text, options.simple_chunk_chars),
        strategy: ChunkStrategy::Degraded { reason: error.to_string() },
    }
}

fn chunks_for_sections(nodes: &[ContentNode], sections: &[Section], max_chars: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    let preamble_end = sections.first().map_or(nodes.len(), |section| section.start_node_index);
    for piece in split_on_blocks(&serialize_nodes(&nodes[..preamble_end]), max_chars) {
        chunks.push(Chunk {
            content: piece,
            index: None,
            heading: None,
            heading_level: None,
            header_breadcrumb: None,
            breadcrumb_hash: None,
        });
    }

    for section in sections {
        let body = serialize_nodes(&nodes[section.start_node_index + 1..=section.end_node_index]);
        let pieces = split_on_blocks(&body, max_chars);
        if pieces.is_empty() {
            debug!(breadcrumb = %section.breadcrumb, "skipping section without body text");
            continue;
        }
        for piece in pieces {
            chunks.push(Chunk {
                content: piece,
                index: None,
                heading: Some(section.heading().to_string()),
                heading_level: Some(section.level()),
                header_breadcrumb: Some(section.breadcrumb.clone()),
                breadcrumb_hash: Some(section.breadcrumb_hash.clone()),
            });
        }
    }

    chunks
}

/// Greedily pack the lines of `body` into pieces of at most `max_chars`.
/// Blank lines are dropped; an oversized line is split on its own.
fn split_on_blocks(body: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for line in body.lines().filter(|line| !line.trim().is_empty()) {
        let line_chars = line.chars().count();
        if line_chars > max_chars {
            flush(&mut pieces, &mut current, &mut current_chars);
            pieces.extend(split_long_block(line, max_chars));
            continue;
        }
        if current_chars > 0 && current_chars + 1 + line_chars > max_chars {
            flush(&mut pieces, &mut current, &mut current_chars);
        }
        if current_chars > 0 {
            current.push('\n');
            current_chars += 1;
        }
        current.push_str(line);
        current_chars += line_chars;
    }
    flush(&mut pieces, &mut current, &mut current_chars);
    pieces
}

fn flush(pieces: &mut Vec<String>, current: &mut String, current_chars: &mut usize) {
    if *current_chars > 0 {
        pieces.push(std::mem::take(current));
        *current_chars = 0;
    }
}

/// Split one block at whitespace, or at a character boundary when a
/// window holds no whitespace.
fn split_long_block(block: &str, max_chars: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = block.trim();
    while rest.chars().count() > max_chars {
        let limit = byte_offset(rest, max_chars);
        let cut = match rest[..limit].rfind(char::is_whitespace) {
            Some(position) if position > 0 => position,
            _ => limit,
        };
        parts.push(rest[..cut].trim_end().to_string());
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() {
        parts.push(rest.to_string());
    }
    parts
}

/// End of the next fixed window: after the last whitespace in the final
/// fifth of the window if there is one, otherwise exactly `window` chars.
fn window_end(text: &str, window: usize) -> usize {
    let limit = byte_offset(text, window);
    if limit == text.len() {
        return limit;
    }
    let floor = byte_offset(text, window - window / 5);
    match text[floor..limit].char_indices().rev().find(|(_, ch)| ch.is_whitespace()) {
        Some((position, ch)) => floor + position + ch.len_utf8(),
        None => limit,
    }
}

/// Byte offset of the `chars`-th character, or the end of `text`.
fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices().nth(chars).map_or(text.len(), |(offset, _)| offset)
}
