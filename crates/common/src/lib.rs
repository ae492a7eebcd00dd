// quire-common: document content pipeline shared across the Quire workspace.

pub mod chunk;
pub mod content;
pub mod error;
pub mod hash;
pub mod patch;
pub mod section;
pub mod types;

pub use chunk::{
    chunk_fingerprint, generate_paragraph_chunks, generate_simple_chunks, plan_chunks,
    ChunkOptions, ChunkPlan, ChunkStrategy,
};
pub use content::text::serialize_to_plain_text;
pub use content::{ContentNode, Mark, MarkSet};
pub use error::{MatchError, StructuralError};
pub use patch::{apply_changes, Patcher};
pub use section::extract::extract_sections;
pub use types::{ApplyResult, ApplyStatus, ChangeOutcome, ChangeRequest, ChangeStatus, Chunk, Section};
