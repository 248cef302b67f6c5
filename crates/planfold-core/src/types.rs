//! Public request/response types for the rewriter.

use serde::{Deserialize, Serialize};

/// SQL dialect accepted by the front-end parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Generic,
    Postgres,
    Mysql,
}

impl Dialect {
    pub fn to_sqlparser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        use sqlparser::dialect::{GenericDialect, MySqlDialect, PostgreSqlDialect};
        match self {
            Self::Generic => Box::new(GenericDialect {}),
            Self::Postgres => Box::new(PostgreSqlDialect {}),
            Self::Mysql => Box::new(MySqlDialect {}),
        }
    }
}

/// How aggressively the rewriter runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    /// Predicates are left exactly as parsed.
    Off,
    /// Full rewrite pipeline.
    #[default]
    Full,
}

/// Options controlling a rewrite invocation.
///
/// Deserializable so callers can keep a configuration file; every field has
/// a default matching production behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RewriteOptions {
    pub dialect: Dialect,
    pub level: OptimizationLevel,
    /// When set, literals are bound at execution time and
    /// auto-parameterization is skipped.
    pub hostvar_late_binding: bool,
    /// Plan-cache capacity; zero disables caching and with it
    /// auto-parameterization.
    pub plan_cache_entries: u32,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::Generic,
            level: OptimizationLevel::Full,
            hostvar_late_binding: false,
            plan_cache_entries: 1024,
        }
    }
}

/// An issue encountered during rewriting (error, warning, or info).
///
/// Issues are accumulated beside successful results so one unsupported
/// construct does not fail the whole statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub severity: Severity,
    /// Machine-readable issue code
    pub code: String,
    pub message: String,
    /// Which statement index this issue relates to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_index: Option<usize>,
}

impl Issue {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: code.into(),
            message: message.into(),
            statement_index: None,
        }
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code: code.into(),
            message: message.into(),
            statement_index: None,
        }
    }

    pub fn info(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            code: code.into(),
            message: message.into(),
            statement_index: None,
        }
    }

    pub fn with_statement(mut self, index: usize) -> Self {
        self.statement_index = Some(index);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Machine-readable issue codes.
pub mod issue_codes {
    pub const PARSE_ERROR: &str = "PARSE_ERROR";
    pub const SEMANTIC: &str = "SEMANTIC";
    pub const UNSUPPORTED_SYNTAX: &str = "UNSUPPORTED_SYNTAX";
    pub const UNRESOLVED_REFERENCE: &str = "UNRESOLVED_REFERENCE";
    pub const CANNOT_PREPARE: &str = "CANNOT_PREPARE";
    pub const PARTITION_WORK_FAILED: &str = "PARTITION_WORK_FAILED";
    pub const EMPTY_RESULT: &str = "EMPTY_RESULT";
    pub const OUTER_JOIN_SYNTAX: &str = "OUTER_JOIN_SYNTAX";
}

/// Outcome of rewriting one statement.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StatementSummary {
    /// Statement was marked non-cacheable (an unbound host variable reached
    /// a partition-key expression).
    pub cannot_prepare: bool,
    /// Some spec had its partition list reduced.
    pub partition_pruned: bool,
    /// The whole predicate folded to FALSE; execution short-circuits.
    pub always_false: bool,
    /// Number of host-variable markers introduced by auto-parameterization.
    pub auto_parameters: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_enables_caching() {
        let opts = RewriteOptions::default();
        assert!(opts.plan_cache_entries > 0);
        assert!(!opts.hostvar_late_binding);
        assert_eq!(opts.level, OptimizationLevel::Full);
    }

    #[test]
    fn options_roundtrip_json() {
        let opts = RewriteOptions {
            dialect: Dialect::Postgres,
            level: OptimizationLevel::Off,
            hostvar_late_binding: true,
            plan_cache_entries: 0,
        };
        let json = serde_json::to_string(&opts).unwrap();
        let back: RewriteOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back.dialect, Dialect::Postgres);
        assert_eq!(back.level, OptimizationLevel::Off);
        assert!(back.hostvar_late_binding);
        assert_eq!(back.plan_cache_entries, 0);
    }

    #[test]
    fn issue_builders_set_severity() {
        assert_eq!(Issue::error("X", "m").severity, Severity::Error);
        assert_eq!(Issue::warning("X", "m").severity, Severity::Warning);
        assert_eq!(Issue::info("X", "m").severity, Severity::Info);
        assert_eq!(Issue::info("X", "m").with_statement(3).statement_index, Some(3));
    }
}
