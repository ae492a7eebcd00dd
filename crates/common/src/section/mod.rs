// Heading-based section extraction over the document tree.
pub mod extract;
