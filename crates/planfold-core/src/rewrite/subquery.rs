//! Uncorrelated subqueries in comparison position become joins against
//! derived tables, which frees the planner to pick a join order instead
//! of nesting an inner execution per row.

use super::order_by::wrap_query_as_derived;
use crate::graph::{
    DerivedTableType, Expr, ExprOp, FuncType, FunctionCall, Graph, Name, Node, NodeFlags, NodeId,
    NodeKind,
};

pub fn rewrite_subqueries(g: &mut Graph, stmt: NodeId, seq: &mut u32) {
    let NodeKind::Select(select) = &g.node(stmt).kind else {
        return;
    };
    let mut cursor = select.where_clause;

    while let Some(term) = cursor {
        cursor = g.node(term).next;
        if g.node(term).or_next.is_some() {
            continue;
        }
        let Some(expr) = g.node(term).as_expr().cloned() else {
            continue;
        };
        let (Some(mut arg1), Some(mut arg2)) = (expr.arg1, expr.arg2) else {
            continue;
        };
        let mut op = expr.op;
        if !matches!(
            op,
            ExprOp::Eq
                | ExprOp::IsIn
                | ExprOp::EqSome
                | ExprOp::GtSome
                | ExprOp::GeSome
                | ExprOp::LtSome
                | ExprOp::LeSome
        ) {
            continue;
        }

        // `subquery = expr` flips around so the subquery sits right.
        if g.node(arg1).is_query() && op == ExprOp::Eq {
            std::mem::swap(&mut arg1, &mut arg2);
            if let Some(e) = g.node_mut(term).as_expr_mut() {
                e.arg1 = Some(arg1);
                e.arg2 = Some(arg2);
            }
        }

        if !g.node(arg2).is_query() || !is_uncorrelated_single_column(g, arg2) {
            continue;
        }

        match op {
            ExprOp::Eq | ExprOp::IsIn | ExprOp::EqSome => {
                let lhs_elements = set_elements(g, arg1);
                if lhs_elements.is_none() && !g.is_attr(arg1) {
                    continue;
                }
                let (new_spec, new_attrs) = make_derived_spec(g, stmt, arg2, seq);
                match lhs_elements {
                    None => {
                        // attr op (subquery)  =>  attr = derived.a0
                        if let Some(e) = g.node_mut(term).as_expr_mut() {
                            e.op = ExprOp::Eq;
                            e.arg2 = new_attrs.first().copied();
                        }
                    }
                    Some(elements) => {
                        // Element-wise equality against the derived row.
                        let mut last = term;
                        for (i, element) in elements.iter().copied().enumerate() {
                            g.node_mut(element).next = None;
                            if i == 0 {
                                if let Some(e) = g.node_mut(term).as_expr_mut() {
                                    e.op = ExprOp::Eq;
                                    e.arg1 = Some(element);
                                    e.arg2 = new_attrs.first().copied();
                                }
                            } else if let Some(&new_attr) = new_attrs.get(i) {
                                let eq = g.new_expr(Expr::binary(ExprOp::Eq, element, new_attr));
                                let next = g.node(last).next;
                                g.node_mut(eq).next = next;
                                g.node_mut(last).next = Some(eq);
                                last = eq;
                            }
                        }
                        cursor = g.node(last).next;
                    }
                }
                let derived = g.node(new_spec).as_spec().and_then(|s| s.derived_table);
                if let Some(derived) = derived {
                    rewrite_subqueries(g, derived, seq);
                }
            }
            ExprOp::GtSome | ExprOp::GeSome | ExprOp::LtSome | ExprOp::LeSome => {
                if !g.is_attr(arg1) {
                    continue;
                }
                let subquery = if is_composite_or_aggregated(g, arg2) {
                    let wrapped = wrap_query_as_derived(g, arg2, seq);
                    if let Some(e) = g.node_mut(term).as_expr_mut() {
                        e.arg2 = Some(wrapped);
                    }
                    wrapped
                } else {
                    arg2
                };

                // `a > SOME (q)` holds iff `a > MIN(q)`; the mirror image
                // uses MAX.
                let func = if matches!(op, ExprOp::GtSome | ExprOp::GeSome) {
                    FuncType::Min
                } else {
                    FuncType::Max
                };
                project_through_aggregate(g, subquery, func);

                op = match op {
                    ExprOp::GtSome => ExprOp::Gt,
                    ExprOp::GeSome => ExprOp::Ge,
                    ExprOp::LtSome => ExprOp::Lt,
                    _ => ExprOp::Le,
                };
                let (new_spec, new_attrs) = make_derived_spec(g, stmt, subquery, seq);
                if let Some(e) = g.node_mut(term).as_expr_mut() {
                    e.op = op;
                    e.arg2 = new_attrs.first().copied();
                }
                let derived = g.node(new_spec).as_spec().and_then(|s| s.derived_table);
                if let Some(derived) = derived {
                    rewrite_subqueries(g, derived, seq);
                }
            }
            _ => {}
        }
    }
}

/// Elements of a set-function or sequence literal left side, `None` when
/// the side is not a set.
fn set_elements(g: &Graph, id: NodeId) -> Option<Vec<NodeId>> {
    match &g.node(id).kind {
        NodeKind::Function(f)
            if matches!(f.func, FuncType::TableSet | FuncType::TableSequence) =>
        {
            Some(g.collect_chain(f.args))
        }
        _ => None,
    }
}

fn visible_select_list(g: &Graph, query: NodeId) -> Vec<NodeId> {
    let list = match &g.node(query).kind {
        NodeKind::Select(s) => s.list,
        NodeKind::Union(u) | NodeKind::Difference(u) | NodeKind::Intersection(u) => {
            return u.arg1.map(|a| visible_select_list(g, a)).unwrap_or_default()
        }
        _ => None,
    };
    g.collect_chain(list)
        .into_iter()
        .filter(|&item| !g.node(item).flags.contains(NodeFlags::HIDDEN_COLUMN))
        .collect()
}

fn is_uncorrelated_single_column(g: &Graph, query: NodeId) -> bool {
    let correlation = match &g.node(query).kind {
        NodeKind::Select(s) => s.common.correlation_level,
        NodeKind::Union(u) | NodeKind::Difference(u) | NodeKind::Intersection(u) => {
            u.common.correlation_level
        }
        _ => return false,
    };
    correlation == 0 && visible_select_list(g, query).len() == 1
}

fn is_composite_or_aggregated(g: &Graph, query: NodeId) -> bool {
    match &g.node(query).kind {
        NodeKind::Union(_) | NodeKind::Difference(_) | NodeKind::Intersection(_) => true,
        NodeKind::Select(s) => {
            if s.group_by.is_some() {
                return true;
            }
            let list = s.list;
            g.collect_chain(list).iter().any(|&item| {
                matches!(&g.node(item).kind, NodeKind::Function(f) if f.func.is_aggregate())
            })
        }
        _ => false,
    }
}

/// Replaces the single projected column with MIN/MAX over it.
fn project_through_aggregate(g: &mut Graph, query: NodeId, func: FuncType) {
    let NodeKind::Select(select) = &g.node(query).kind else {
        return;
    };
    let Some(list) = select.list else {
        return;
    };
    let old_type = g.node(list).type_enum;
    let agg = g.alloc(Node::new(NodeKind::Function(FunctionCall {
        func,
        args: Some(list),
    })));
    g.node_mut(agg).type_enum = old_type;
    if let NodeKind::Select(s) = &mut g.node_mut(query).kind {
        s.list = Some(agg);
    }
}

/// Wraps `subquery` as a derived-table spec appended to the statement's
/// FROM, returning the spec and fresh outer-side attribute references.
pub(crate) fn make_derived_spec(
    g: &mut Graph,
    stmt: NodeId,
    subquery: NodeId,
    seq: &mut u32,
) -> (NodeId, Vec<NodeId>) {
    let columns = visible_select_list(g, subquery);
    let range_name = format!("dt{}", *seq);
    *seq += 1;

    let range_var = g.new_name(Name::attr(None, range_name.clone()));
    let spec = g.alloc(Node::new(NodeKind::Spec(crate::graph::Spec {
        derived_table: Some(subquery),
        derived_table_type: DerivedTableType::Subquery,
        range_var: Some(range_var),
        ..Default::default()
    })));

    let mut as_attr_list: Option<NodeId> = None;
    let mut outer_attrs = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().copied().enumerate() {
        let ty = g.node(column).type_enum;
        let make_name = |g: &mut Graph| -> NodeId {
            let id = g.new_name(Name {
                spec_id: Some(spec),
                resolved: Some(range_name.clone()),
                name: format!("a{i}"),
                is_meta_class: false,
            });
            g.node_mut(id).type_enum = ty;
            id
        };
        let inner = make_name(g);
        as_attr_list = Some(match as_attr_list {
            None => inner,
            Some(head) => g.append_to_chain(Some(head), inner),
        });
        outer_attrs.push(make_name(g));
    }
    if let Some(s) = g.node_mut(spec).as_spec_mut() {
        s.as_attr_list = as_attr_list;
    }

    // Append to FROM with the next location.
    if let NodeKind::Select(select) = &g.node(stmt).kind {
        let from = select.from;
        let next_location = g
            .collect_chain(from)
            .iter()
            .map(|&s| g.node(s).location + 1)
            .max()
            .unwrap_or(0);
        g.node_mut(spec).location = next_location;
        let new_from = Some(match from {
            None => spec,
            Some(head) => g.append_to_chain(Some(head), spec),
        });
        if let NodeKind::Select(s) = &mut g.node_mut(stmt).kind {
            s.from = new_from;
        }
    }
    (spec, outer_attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lower_sql_for_tests;
    use crate::normalize::cnf;

    fn prepare(sql: &str) -> (Graph, NodeId) {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(&mut g, sql);
        let where_clause = match &g.node(stmt).kind {
            NodeKind::Select(s) => s.where_clause,
            _ => panic!("expected select"),
        };
        let head = where_clause.and_then(|w| cnf(&mut g, w));
        if let NodeKind::Select(s) = &mut g.node_mut(stmt).kind {
            s.where_clause = head;
        }
        (g, stmt)
    }

    fn run(sql: &str) -> (Graph, NodeId) {
        let (mut g, stmt) = prepare(sql);
        let mut seq = 0;
        rewrite_subqueries(&mut g, stmt, &mut seq);
        (g, stmt)
    }

    fn printed(g: &Graph, stmt: NodeId) -> String {
        g.print_statement(stmt)
    }

    #[test]
    fn in_subquery_becomes_join() {
        let (g, stmt) = run("SELECT a FROM t WHERE a IN (SELECT b FROM u)");
        let text = printed(&g, stmt);
        assert!(
            text.contains("FROM t, (SELECT u.b FROM u) AS dt0(a0) WHERE t.a = dt0.a0"),
            "got: {text}"
        );
    }

    #[test]
    fn eq_scalar_subquery_becomes_join() {
        let (g, stmt) = run("SELECT a FROM t WHERE a = (SELECT MAX(b) FROM u)");
        let text = printed(&g, stmt);
        assert!(text.contains("WHERE t.a = dt0.a0"), "got: {text}");
    }

    #[test]
    fn ordered_any_uses_min() {
        let (g, stmt) = run("SELECT a FROM t WHERE a > ANY (SELECT b FROM u)");
        let text = printed(&g, stmt);
        assert!(text.contains("MIN(u.b)"), "got: {text}");
        assert!(text.contains("t.a > dt0.a0"), "got: {text}");
    }

    #[test]
    fn ordered_any_le_uses_max() {
        let (g, stmt) = run("SELECT a FROM t WHERE a <= ANY (SELECT b FROM u)");
        let text = printed(&g, stmt);
        assert!(text.contains("MAX(u.b)"), "got: {text}");
        assert!(text.contains("t.a <= dt0.a0"), "got: {text}");
    }

    #[test]
    fn correlated_subquery_is_left_alone() {
        let (g, stmt) = run("SELECT a FROM t WHERE a IN (SELECT b FROM u WHERE u.c = t.a)");
        let text = printed(&g, stmt);
        assert!(text.contains("t.a IN (SELECT"), "got: {text}");
    }

    #[test]
    fn multi_column_subquery_is_left_alone() {
        let (g, stmt) = run("SELECT a FROM t WHERE a IN (SELECT b, c FROM u)");
        let text = printed(&g, stmt);
        assert!(text.contains("IN (SELECT"), "got: {text}");
    }

    #[test]
    fn union_subquery_in_ordered_any_wraps_first() {
        let (g, stmt) = run(
            "SELECT a FROM t WHERE a > ANY (SELECT b FROM u UNION SELECT c FROM v)",
        );
        let text = printed(&g, stmt);
        assert!(text.contains("t.a > dt"), "got: {text}");
        assert!(text.contains("MIN("), "got: {text}");
    }
}
