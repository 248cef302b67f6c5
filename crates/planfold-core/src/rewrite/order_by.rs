//! ORDER BY cleanup and hidden-column derived wrapping.
//!
//! A subquery that is not a top-level result producer does not need its
//! ORDER BY unless a row-limit construct depends on it. When the ORDER BY
//! must stay and references hidden columns, the subquery is wrapped as a
//! derived table so the hidden columns disappear from the outer
//! projection.

use crate::graph::{DerivedTableType, ExprOp, Graph, Name, Node, NodeFlags, NodeId, NodeKind};

/// Wraps `query` as `SELECT a0, a1, ... FROM (query) AS dtN`, exposing
/// one generated column per projected item. Hidden columns of a sorted
/// query stay projected inside and unexposed outside.
pub fn wrap_query_as_derived(g: &mut Graph, query: NodeId, seq: &mut u32) -> NodeId {
    let (list, order_by, is_subquery, correlation_level) = match &g.node(query).kind {
        NodeKind::Select(s) => (
            g.collect_chain(s.list),
            s.common.order_by,
            s.common.is_subquery,
            s.common.correlation_level,
        ),
        NodeKind::Union(u) | NodeKind::Difference(u) | NodeKind::Intersection(u) => (
            u.arg1.map(|a| select_list_of(g, a)).unwrap_or_default(),
            u.common.order_by,
            u.common.is_subquery,
            u.common.correlation_level,
        ),
        _ => return query,
    };

    let range_name = format!("dt{}", *seq);
    *seq += 1;
    let range_var = g.new_name(Name::attr(None, range_name.clone()));
    let spec = g.alloc(Node::new(NodeKind::Spec(crate::graph::Spec {
        derived_table: Some(query),
        derived_table_type: DerivedTableType::Subquery,
        range_var: Some(range_var),
        ..Default::default()
    })));

    let mut as_attr_list: Option<NodeId> = None;
    let mut outer_list: Option<NodeId> = None;
    for (i, item) in list.iter().copied().enumerate() {
        let ty = g.node(item).type_enum;
        let inner = g.new_name(Name {
            spec_id: Some(spec),
            resolved: Some(range_name.clone()),
            name: format!("a{i}"),
            is_meta_class: false,
        });
        g.node_mut(inner).type_enum = ty;
        as_attr_list = Some(match as_attr_list {
            None => inner,
            Some(head) => g.append_to_chain(Some(head), inner),
        });

        if g.node(item).flags.contains(NodeFlags::HIDDEN_COLUMN) && order_by.is_some() {
            // The sort key stays inside the derived table only.
            g.node_mut(item).flags.clear(NodeFlags::HIDDEN_COLUMN);
            continue;
        }
        let outer = g.copy_tree(inner);
        outer_list = Some(match outer_list {
            None => outer,
            Some(head) => g.append_to_chain(Some(head), outer),
        });
    }
    if let Some(s) = g.node_mut(spec).as_spec_mut() {
        s.as_attr_list = as_attr_list;
    }

    let new_query = crate::graph::SelectQuery {
        common: crate::graph::QueryCommon {
            is_subquery,
            correlation_level,
            ..Default::default()
        },
        list: outer_list,
        from: Some(spec),
        ..Default::default()
    };
    g.alloc(Node::new(NodeKind::Select(new_query)))
}

fn select_list_of(g: &Graph, query: NodeId) -> Vec<NodeId> {
    match &g.node(query).kind {
        NodeKind::Select(s) => g.collect_chain(s.list),
        NodeKind::Union(u) | NodeKind::Difference(u) | NodeKind::Intersection(u) => {
            u.arg1.map(|a| select_list_of(g, a)).unwrap_or_default()
        }
        _ => Vec::new(),
    }
}

/// Context of the node being rewritten, standing in for the parent link
/// the walk does not carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HiddenColContext {
    /// The node produces the statement result; ORDER BY must stay.
    TopLevel,
    /// Right side of a comparison, set-operation arm, or similar.
    Nested,
    /// Argument of a TABLE(...) sequence constructor; order matters.
    SequenceArgument,
}

/// Drops an unnecessary subquery ORDER BY, or wraps the subquery as a
/// derived table when the ORDER BY must survive but leans on hidden
/// columns. Returns the node to use in place of `node`.
pub fn rewrite_hidden_col_as_derived(
    g: &mut Graph,
    node: NodeId,
    context: HiddenColContext,
    seq: &mut u32,
) -> NodeId {
    match &g.node(node).kind {
        NodeKind::Select(select) => {
            if select.common.order_by.is_none() {
                return node;
            }
            let orderby_for = select.common.orderby_for;
            let list = g.collect_chain(select.list);

            let mut remove_order_by = context == HiddenColContext::Nested;
            if orderby_for.is_some() {
                remove_order_by = false;
            }
            if remove_order_by {
                let has_orderby_num = list.iter().any(|&item| {
                    matches!(g.node(item).as_expr(), Some(e) if e.op == ExprOp::OrderbyNum)
                });
                if has_orderby_num {
                    remove_order_by = false;
                }
            }

            if remove_order_by {
                if let NodeKind::Select(s) = &mut g.node_mut(node).kind {
                    s.common.order_by = None;
                }
                // Hidden sort keys at the tail are no longer needed.
                let mut last_visible: Option<NodeId> = None;
                for &item in &list {
                    if g.node(item).flags.contains(NodeFlags::HIDDEN_COLUMN) {
                        if let Some(prev) = last_visible {
                            g.node_mut(prev).next = None;
                        }
                        break;
                    }
                    last_visible = Some(item);
                }
                node
            } else {
                let has_hidden = list
                    .iter()
                    .any(|&item| g.node(item).flags.contains(NodeFlags::HIDDEN_COLUMN));
                if has_hidden {
                    wrap_query_as_derived(g, node, seq)
                } else {
                    node
                }
            }
        }
        NodeKind::Union(u) | NodeKind::Difference(u) | NodeKind::Intersection(u) => {
            let (arg1, arg2) = (u.arg1, u.arg2);
            let new_arg1 =
                arg1.map(|a| rewrite_hidden_col_as_derived(g, a, HiddenColContext::Nested, seq));
            let new_arg2 =
                arg2.map(|a| rewrite_hidden_col_as_derived(g, a, HiddenColContext::Nested, seq));
            if let NodeKind::Union(u) | NodeKind::Difference(u) | NodeKind::Intersection(u) =
                &mut g.node_mut(node).kind
            {
                u.arg1 = new_arg1;
                u.arg2 = new_arg2;
            }
            node
        }
        _ => node,
    }
}

/// Drops ORDER BY keys that reduced to constants, and duplicate keys on
/// the same select-list position. An emptied ORDER BY disappears.
pub fn reduce_order_by(g: &mut Graph, stmt: NodeId) {
    let NodeKind::Select(select) = &g.node(stmt).kind else {
        return;
    };
    // Sorting a hierarchical result reorders whole levels; leave it be.
    if select.start_with.is_some() || select.connect_by.is_some() {
        return;
    }
    let Some(order_by) = select.common.order_by else {
        return;
    };

    let mut kept: Vec<NodeId> = Vec::new();
    let mut seen_positions: Vec<usize> = Vec::new();
    for sort in g.collect_chain(Some(order_by)) {
        let Some(sort_spec) = (match &g.node(sort).kind {
            NodeKind::SortSpec(s) => Some(s.clone()),
            _ => None,
        }) else {
            continue;
        };
        let constant = sort_spec
            .expr
            .map(|e| g.is_const_not_hostvar(e))
            .unwrap_or(false);
        if constant {
            continue;
        }
        if let Some(pos) = sort_spec.pos {
            if seen_positions.contains(&pos) {
                continue;
            }
            seen_positions.push(pos);
        }
        kept.push(sort);
    }

    for sort in &kept {
        g.node_mut(*sort).next = None;
    }
    for window in kept.windows(2) {
        g.node_mut(window[0]).next = Some(window[1]);
    }
    if let NodeKind::Select(s) = &mut g.node_mut(stmt).kind {
        s.common.order_by = kept.first().copied();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lower_sql_for_tests;
    use crate::value::DbValue;

    #[test]
    fn nested_order_by_is_dropped() {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(
            &mut g,
            "SELECT a FROM t WHERE a IN (SELECT b FROM u ORDER BY b)",
        );
        let in_expr = match &g.node(stmt).kind {
            NodeKind::Select(s) => g.node(s.where_clause.unwrap()).as_expr().unwrap().clone(),
            _ => unreachable!(),
        };
        let subquery = in_expr.arg2.unwrap();
        let mut seq = 0;
        let replaced =
            rewrite_hidden_col_as_derived(&mut g, subquery, HiddenColContext::Nested, &mut seq);
        assert_eq!(replaced, subquery);
        match &g.node(subquery).kind {
            NodeKind::Select(s) => assert!(s.common.order_by.is_none()),
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn top_level_order_by_survives() {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(&mut g, "SELECT a FROM t ORDER BY a");
        let mut seq = 0;
        let replaced =
            rewrite_hidden_col_as_derived(&mut g, stmt, HiddenColContext::TopLevel, &mut seq);
        assert_eq!(replaced, stmt);
        match &g.node(stmt).kind {
            NodeKind::Select(s) => assert!(s.common.order_by.is_some()),
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn hidden_sort_key_wraps_as_derived() {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(&mut g, "SELECT a, b FROM t ORDER BY b");
        // Mark the second projection hidden, as the printer-facing layers
        // do for sort keys that are not in the visible projection.
        let second = match &g.node(stmt).kind {
            NodeKind::Select(s) => g.collect_chain(s.list)[1],
            _ => unreachable!(),
        };
        g.node_mut(second).flags.set(NodeFlags::HIDDEN_COLUMN);
        if let NodeKind::Select(s) = &mut g.node_mut(stmt).kind {
            s.common.orderby_for = None;
        }
        let mut seq = 0;
        let replaced =
            rewrite_hidden_col_as_derived(&mut g, stmt, HiddenColContext::TopLevel, &mut seq);
        assert_ne!(replaced, stmt);
        match &g.node(replaced).kind {
            NodeKind::Select(s) => {
                let spec = g.collect_chain(s.from)[0];
                let spec_node = g.node(spec).as_spec().unwrap();
                assert_eq!(spec_node.derived_table, Some(stmt));
                // Only the visible column is exposed.
                assert_eq!(g.collect_chain(s.list).len(), 1);
            }
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn constant_sort_keys_drop() {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(&mut g, "SELECT a, b FROM t ORDER BY a, b");
        // Simulate equality reduction turning the first key constant.
        let first_key = match &g.node(stmt).kind {
            NodeKind::Select(s) => g.collect_chain(s.common.order_by)[0],
            _ => unreachable!(),
        };
        let expr = match &g.node(first_key).kind {
            NodeKind::SortSpec(s) => s.expr.unwrap(),
            _ => unreachable!(),
        };
        g.overwrite(expr, Node::new(NodeKind::Value(DbValue::Int(5))));
        reduce_order_by(&mut g, stmt);
        match &g.node(stmt).kind {
            NodeKind::Select(s) => {
                let keys = g.collect_chain(s.common.order_by);
                assert_eq!(keys.len(), 1);
            }
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn duplicate_positions_dedup() {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(&mut g, "SELECT a, b FROM t ORDER BY 1, 1, 2");
        reduce_order_by(&mut g, stmt);
        match &g.node(stmt).kind {
            NodeKind::Select(s) => {
                assert_eq!(g.collect_chain(s.common.order_by).len(), 2);
            }
            _ => panic!("expected select"),
        }
    }
}
