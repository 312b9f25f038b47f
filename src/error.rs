use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Failures a tree operation can report.
///
/// Missing keys and exhausted cursors are ordinary outcomes, expressed as
/// `Option`/`bool` returns rather than errors. The only fault an in-memory
/// tree can hit is the block allocator running dry.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("block allocation failed: {0}")]
    OutOfMemory(&'static str),
}
