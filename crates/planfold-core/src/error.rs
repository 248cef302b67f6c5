//! Error types for parsing and rewriting.
//!
//! Two complementary patterns are used throughout the crate:
//!
//! - [`ParseError`] and [`RewriteError`]: fatal errors returned as
//!   `Result<T, E>` that stop processing of the affected statement.
//! - [`crate::types::Issue`]: non-fatal findings collected during rewriting
//!   (an unsupported construct, a statement marked non-cacheable). These are
//!   accumulated and returned alongside the rewritten tree so the pipeline
//!   stays resilient.

use crate::types::Dialect;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Error encountered during SQL parsing.
///
/// Preserves structured information from the underlying parser, including
/// position information when available.
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Human-readable error message.
    pub message: String,
    /// Source position where the error occurred, if available.
    pub position: Option<Position>,
    /// The SQL dialect being parsed when the error occurred.
    pub dialect: Option<Dialect>,
}

/// Position information for a parse error (1-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
            dialect: None,
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Parses position from the sqlparser error message format,
    /// "... at Line: X, Column: Y". Coupled to that crate's message text;
    /// returns `None` when the format is not found.
    fn parse_position_from_message(message: &str) -> Option<Position> {
        static POSITION_REGEX: OnceLock<Regex> = OnceLock::new();
        let re = POSITION_REGEX.get_or_init(|| {
            Regex::new(r"Line:\s*(\d+)\s*,\s*Column:\s*(\d+)").expect("Invalid regex pattern")
        });

        re.captures(message).and_then(|caps| {
            let line: usize = caps.get(1)?.as_str().parse().ok()?;
            let column: usize = caps.get(2)?.as_str().parse().ok()?;
            Some(Position { line, column })
        })
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error")?;
        if let Some(dialect) = self.dialect {
            write!(f, " ({dialect:?})")?;
        }
        if let Some(pos) = self.position {
            write!(f, " at line {}, column {}", pos.line, pos.column)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<sqlparser::parser::ParserError> for ParseError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        let message = err.to_string();
        let position = Self::parse_position_from_message(&message);
        Self {
            message,
            position,
            dialect: None,
        }
    }
}

/// Fatal error raised while rewriting a statement.
#[derive(Debug, Clone, Error)]
pub enum RewriteError {
    /// The semantic checker left messages on the statement; the rewriter
    /// does not run on a statement that failed semantic analysis.
    #[error("semantic check failed: {0}")]
    Semantic(String),

    /// A catalog read failed while loading a partition descriptor.
    #[error("partition work failed on class '{class}': {detail}")]
    PartitionWork { class: String, detail: String },

    /// The front-end met a construct it cannot lower into the parse graph.
    #[error("unsupported construct: {0}")]
    Unsupported(String),

    /// Cooperative cancellation: the context error flag was raised.
    #[error("rewrite cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_position_from_message() {
        let msg = "Expected SELECT, found 'INSERT' at Line: 1, Column: 5";
        let pos = ParseError::parse_position_from_message(msg);
        assert_eq!(pos, Some(Position { line: 1, column: 5 }));
    }

    #[test]
    fn parse_position_absent() {
        assert_eq!(ParseError::parse_position_from_message("Unexpected token"), None);
    }

    #[test]
    fn parse_position_no_whitespace() {
        let pos = ParseError::parse_position_from_message("Error at Line:3,Column:12");
        assert_eq!(pos, Some(Position { line: 3, column: 12 }));
    }

    #[test]
    fn display_with_dialect_and_position() {
        let err = ParseError {
            message: "Bad syntax".into(),
            position: Some(Position { line: 1, column: 5 }),
            dialect: Some(Dialect::Postgres),
        };
        assert_eq!(
            err.to_string(),
            "Parse error (Postgres) at line 1, column 5: Bad syntax"
        );
    }

    #[test]
    fn rewrite_error_messages() {
        let err = RewriteError::PartitionWork {
            class: "t".into(),
            detail: "no descriptor".into(),
        };
        assert_eq!(err.to_string(), "partition work failed on class 't': no descriptor");
    }
}
