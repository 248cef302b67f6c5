//! LIKE rewrites against literal patterns.
//!
//! Runs of `%` compress, a bare `'%'` degenerates to IS NOT NULL, a
//! pattern without wildcards becomes an equality (unless it ends in a
//! blank, which LIKE treats differently from `=`), and a pure prefix
//! pattern becomes a half-open range `[prefix, next(prefix))`.

use super::term_attr;
use crate::graph::{Expr, ExprOp, Graph, NodeId, TypeEnum};
use crate::value::DbValue;

pub fn rewrite_like_terms(g: &mut Graph, slot: &mut Option<NodeId>) {
    for conjunct in g.collect_chain(*slot) {
        for term in g.collect_or_chain(Some(conjunct)) {
            rewrite_term(g, term);
        }
    }
}

fn rewrite_term(g: &mut Graph, term: NodeId) {
    let Some(expr) = g.node(term).as_expr().cloned() else {
        return;
    };
    if expr.op != ExprOp::Like || term_attr(g, term).is_none() {
        return;
    }
    let Some(pattern_id) = expr.arg2 else {
        return;
    };
    let Some(DbValue::Str(pattern)) = g.node(pattern_id).as_value().cloned() else {
        return;
    };

    let compressed = compress_wildcards(&pattern);
    if compressed != pattern {
        if let crate::graph::NodeKind::Value(v) = &mut g.node_mut(pattern_id).kind {
            *v = DbValue::Str(compressed.clone());
        }
    }

    if compressed.contains('_') {
        return;
    }

    if compressed == "%" {
        // Unbound pattern: every non-null value matches.
        if let Some(e) = g.node_mut(term).as_expr_mut() {
            e.op = ExprOp::IsNotNull;
            e.arg2 = None;
        }
        return;
    }

    if !compressed.contains('%') {
        if compressed.ends_with(' ') {
            // LIKE ignores trailing blanks differently than '='; leave it.
            return;
        }
        if let Some(e) = g.node_mut(term).as_expr_mut() {
            e.op = ExprOp::Eq;
        }
        return;
    }

    // Prefix pattern: exactly one '%' (after compression) at the end.
    let Some(percent) = compressed.find('%') else {
        return;
    };
    if percent == 0 || percent + 1 != compressed.len() {
        return;
    }
    let prefix = &compressed[..percent];
    if prefix.ends_with(' ') {
        return;
    }
    let Some(upper) = increment_last_char(prefix) else {
        return;
    };

    let location = g.node(term).location;
    let ty = TypeEnum::String {
        precision: u16::try_from(prefix.chars().count()).ok(),
    };
    let lower_id = g.new_value(DbValue::Str(prefix.to_string()));
    g.node_mut(lower_id).type_enum = ty;
    g.node_mut(lower_id).location = location;
    let upper_id = g.new_value(DbValue::Str(upper));
    g.node_mut(upper_id).type_enum = ty;
    g.node_mut(upper_id).location = location;

    let bounds = g.new_expr(Expr::binary(ExprOp::BetweenGeLt, lower_id, upper_id));
    g.node_mut(bounds).type_enum = TypeEnum::Logical;
    g.node_mut(bounds).location = location;
    if let Some(e) = g.node_mut(term).as_expr_mut() {
        e.op = ExprOp::Between;
        e.arg2 = Some(bounds);
    }
}

/// Collapses runs of `%` to a single one.
fn compress_wildcards(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut last_was_percent = false;
    for c in pattern.chars() {
        if c == '%' && last_was_percent {
            continue;
        }
        last_was_percent = c == '%';
        out.push(c);
    }
    out
}

/// The smallest string greater than every string with this prefix:
/// the prefix with its last character stepped once.
fn increment_last_char(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    let last = chars.pop()?;
    let next = char::from_u32(u32::from(last) + 1)?;
    chars.push(next);
    Some(chars.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lower_sql_for_tests;
    use crate::graph::NodeKind;
    use crate::normalize::cnf;

    fn run(sql: &str) -> (Graph, Option<NodeId>) {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(&mut g, sql);
        let where_clause = match &g.node(stmt).kind {
            NodeKind::Select(s) => s.where_clause,
            _ => panic!("expected select"),
        };
        let mut slot = where_clause.and_then(|w| cnf(&mut g, w));
        rewrite_like_terms(&mut g, &mut slot);
        (g, slot)
    }

    #[test]
    fn prefix_pattern_becomes_half_open_range() {
        let (g, slot) = run("SELECT s FROM t WHERE s LIKE 'abc%'");
        assert_eq!(g.print_predicate(slot), "t.s BETWEEN 'abc' GE_LT 'abd'");
    }

    #[test]
    fn lone_percent_becomes_is_not_null() {
        let (g, slot) = run("SELECT s FROM t WHERE s LIKE '%'");
        assert_eq!(g.print_predicate(slot), "t.s IS NOT NULL");
    }

    #[test]
    fn no_wildcards_becomes_equality() {
        let (g, slot) = run("SELECT s FROM t WHERE s LIKE 'abc'");
        assert_eq!(g.print_predicate(slot), "t.s = 'abc'");
    }

    #[test]
    fn trailing_blank_defeats_equality() {
        let (g, slot) = run("SELECT s FROM t WHERE s LIKE 'abc '");
        assert_eq!(g.print_predicate(slot), "t.s LIKE 'abc '");
    }

    #[test]
    fn double_percent_compresses_then_rewrites() {
        let (g, slot) = run("SELECT s FROM t WHERE s LIKE 'ab%%'");
        assert_eq!(g.print_predicate(slot), "t.s BETWEEN 'ab' GE_LT 'ac'");
    }

    #[test]
    fn underscore_stays_like() {
        let (g, slot) = run("SELECT s FROM t WHERE s LIKE 'a_c%'");
        assert_eq!(g.print_predicate(slot), "t.s LIKE 'a_c%'");
    }

    #[test]
    fn inner_percent_stays_like() {
        let (g, slot) = run("SELECT s FROM t WHERE s LIKE 'a%c'");
        assert_eq!(g.print_predicate(slot), "t.s LIKE 'a%c'");
    }

    #[test]
    fn non_literal_pattern_stays() {
        let (g, slot) = run("SELECT s FROM t WHERE s LIKE ?");
        assert_eq!(g.print_predicate(slot), "t.s LIKE ?0");
    }
}
