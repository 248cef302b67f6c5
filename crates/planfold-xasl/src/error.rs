//! Serializer and loader failures. The first failure aborts the
//! invocation; the partially written buffer is dropped by the caller.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    /// The writer met an object reference it cannot encode.
    #[error("invalid plan node: {0}")]
    InvalidNode(String),

    /// A record's packed payload did not match its reserved size.
    #[error("record size mismatch while packing {0}")]
    SizeMismatch(String),

    /// The reader met a malformed stream.
    #[error("corrupt stream at offset {offset}: {detail}")]
    Corrupt { offset: usize, detail: String },
}
