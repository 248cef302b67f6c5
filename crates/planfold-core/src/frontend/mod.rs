//! SQL front-end: parse with `sqlparser` and lower the AST into the
//! arena graph the rewriter operates on.
//!
//! The parser is an external collaborator; this module owns only the
//! lowering. Name resolution uses a scope stack (one scope per SELECT
//! body), assigns every FROM entry a spec id and a location, and tags
//! ON-clause predicates with the location of the spec they join.

mod lower;

pub use lower::Lowerer;

use crate::error::ParseError;
use crate::graph::{Graph, NodeId};
use crate::types::Dialect;
use sqlparser::ast::Statement;
use sqlparser::parser::Parser;

/// Parse SQL using the specified dialect.
pub fn parse_sql_with_dialect(sql: &str, dialect: Dialect) -> Result<Vec<Statement>, ParseError> {
    let sqlparser_dialect = dialect.to_sqlparser_dialect();
    Parser::parse_sql(sqlparser_dialect.as_ref(), sql)
        .map_err(|err| ParseError::from(err).with_dialect(dialect))
}

/// Parse SQL using the generic dialect.
pub fn parse_sql(sql: &str) -> Result<Vec<Statement>, ParseError> {
    parse_sql_with_dialect(sql, Dialect::Generic)
}

/// Parses and lowers every statement of `sql` into `graph`, returning the
/// root node ids. Statements the rewriter does not cover (DDL and such)
/// are skipped with an issue.
pub fn lower_sql(
    graph: &mut Graph,
    sql: &str,
    dialect: Dialect,
) -> Result<Vec<NodeId>, ParseError> {
    let statements = parse_sql_with_dialect(sql, dialect)?;
    let mut roots = Vec::new();
    for (index, statement) in statements.iter().enumerate() {
        let mut lowerer = Lowerer::new(graph, index);
        if let Some(root) = lowerer.lower_statement(statement) {
            roots.push(root);
        }
    }
    Ok(roots)
}

/// Lowers a single statement for unit tests.
#[cfg(test)]
pub(crate) fn lower_sql_for_tests(graph: &mut Graph, sql: &str) -> NodeId {
    let mut roots = lower_sql(graph, sql, Dialect::Generic).expect("test SQL parses");
    assert!(!roots.is_empty(), "test SQL lowered to no statements");
    roots.remove(0)
}
