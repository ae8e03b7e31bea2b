use thiserror::Error;

use super::types::{FrameId, PageId};

/// Storage engine error types
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Read of {0} past end of file ({1} bytes)")]
    PageOutOfRange(PageId, u64),

    #[error("Write of {0} would leave a gap after end of file ({1} bytes)")]
    NonContiguousWrite(PageId, u64),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Replacer is tracking its maximum of {0} frames")]
    ReplacerFull(usize),

    #[error("Frame {0} is not tracked by the replacer")]
    FrameNotTracked(FrameId),

    #[error("Frame {0} is not evictable")]
    FrameNotEvictable(FrameId),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Value for column {column} does not match type {expected}")]
    TypeMismatch { column: String, expected: String },

    #[error("Tuple data is {actual} bytes, schema requires {expected}")]
    TupleSize { expected: usize, actual: usize },

    #[error("Unknown column type tag {0}")]
    UnknownType(u32),

    #[error("Truncated schema encoding")]
    TruncatedSchema,

    #[error("Invalid index configuration: {0}")]
    InvalidIndexConfig(String),

    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),
}

pub type Result<T> = std::result::Result<T, StrataError>;
