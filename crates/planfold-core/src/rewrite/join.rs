//! Outer-to-inner join conversion and explicit-join flattening.

use crate::graph::{ExprOp, Graph, JoinType, NodeFlags, NodeId, NodeKind, WalkControl};

/// Upgrades a LEFT/RIGHT OUTER spec to INNER when some WHERE-proper
/// conjunct is null-intolerant on the spec's rows: such a conjunct
/// discards every null-extended row anyway. The upgrade cascades through
/// the directly following RIGHT OUTER specs.
pub fn rewrite_outerjoin(g: &mut Graph, stmt: NodeId) {
    let NodeKind::Select(select) = &g.node(stmt).kind else {
        return;
    };
    let where_head = select.where_clause;
    let specs = g.collect_chain(select.from);

    for (index, spec_id) in specs.iter().copied().enumerate() {
        let join_type = g.node(spec_id).as_spec().map(|s| s.join_type);
        let watched = match join_type {
            Some(JoinType::LeftOuter) => Some(spec_id),
            // For RIGHT OUTER the null-extended side is the previous spec.
            Some(JoinType::RightOuter) if index > 0 => Some(specs[index - 1]),
            _ => None,
        };
        if let Some(watched) = watched {
            if has_null_intolerant_term(g, where_head, watched) {
                if let Some(s) = g.node_mut(spec_id).as_spec_mut() {
                    s.join_type = JoinType::Inner;
                }
                for follower in specs.iter().copied().skip(index + 1) {
                    let jt = g.node(follower).as_spec().map(|s| s.join_type);
                    match jt {
                        Some(JoinType::None) | None => break,
                        Some(JoinType::RightOuter) => {
                            if let Some(s) = g.node_mut(follower).as_spec_mut() {
                                s.join_type = JoinType::Inner;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        // Derived-table subqueries run the same rewrite inside.
        let derived = g.node(spec_id).as_spec().and_then(|s| s.derived_table);
        if let Some(derived) = derived {
            if g.node(derived).is_query() {
                rewrite_outerjoin(g, derived);
            }
        }
    }
}

/// A location-0 conjunct that references the spec and contains nothing
/// null-tolerant proves the join null-intolerant.
fn has_null_intolerant_term(g: &mut Graph, head: Option<NodeId>, spec: NodeId) -> bool {
    for term in g.collect_chain(head) {
        if g.node(term).or_next.is_some() || g.node(term).location != 0 {
            continue;
        }
        let Some(op) = g.node(term).as_expr().map(|e| e.op) else {
            continue;
        };
        if op == ExprOp::IsNull || g.node(term).flags.contains(NodeFlags::FULL_RANGE) {
            continue;
        }
        let mut references_spec = false;
        let mut nullable = false;
        g.walk_tree_pre(term, &mut |g, id| {
            match &g.node(id).kind {
                NodeKind::Name(name) if name.spec_id == Some(spec) => {
                    references_spec = true;
                }
                NodeKind::Expr(e) if e.op.is_null_tolerant() => {
                    nullable = true;
                }
                _ => {}
            }
            WalkControl::Continue
        });
        if references_spec && !nullable {
            return true;
        }
    }
    false
}

/// Resets the location of every predicate node in `[start, end]` to 0 so
/// the normalizer may move the terms freely.
pub fn reset_location_range(g: &mut Graph, head: Option<NodeId>, start: u16, end: u16) {
    for conjunct in g.collect_chain(head) {
        let conjunct_loc = g.node(conjunct).location;
        if conjunct_loc < start || conjunct_loc > end {
            continue;
        }
        g.walk_tree_pre(conjunct, &mut |g, id| {
            let loc = g.node(id).location;
            if loc >= start && loc <= end {
                g.node_mut(id).location = 0;
            }
            WalkControl::Continue
        });
    }
}

/// Downgrades runs of explicit INNER joins to unordered form when the run
/// contains no outer join and the ORDERED hint is absent, resetting the
/// ON-term locations of the run to 0.
pub fn rewrite_innerjoin(g: &mut Graph, stmt: NodeId) {
    let NodeKind::Select(select) = &g.node(stmt).kind else {
        return;
    };
    if select.ordered_hint {
        return;
    }
    let where_head = select.where_clause;
    let specs = g.collect_chain(select.from);

    let mut run_start_index = 0;
    let mut start: u16 = 0;
    let mut end: u16 = 0;
    let mut found_outerjoin = false;

    for (index, spec_id) in specs.iter().copied().enumerate() {
        let join_type = g
            .node(spec_id)
            .as_spec()
            .map(|s| s.join_type)
            .unwrap_or_default();
        if join_type.is_outer() {
            found_outerjoin = true;
        }

        if join_type == JoinType::None && !found_outerjoin && start < end {
            flatten_run(g, &specs[run_start_index..index]);
            reset_location_range(g, where_head, start, end);
            start = g.node(spec_id).location;
            run_start_index = index;
            found_outerjoin = false;
        }
        end = g.node(spec_id).location;

        let derived = g.node(spec_id).as_spec().and_then(|s| s.derived_table);
        if let Some(derived) = derived {
            if g.node(derived).is_query() {
                rewrite_innerjoin(g, derived);
            }
        }
    }

    if !found_outerjoin && start < end {
        flatten_run(g, &specs[run_start_index..]);
        reset_location_range(g, where_head, start, end);
    }
}

fn flatten_run(g: &mut Graph, specs: &[NodeId]) {
    for spec_id in specs {
        if let Some(s) = g.node_mut(*spec_id).as_spec_mut() {
            if s.join_type == JoinType::Inner {
                s.join_type = JoinType::None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lower_sql_for_tests;
    use crate::normalize::cnf;
    use crate::pipeline::merge_on_conditions;

    fn prepare(sql: &str) -> (Graph, NodeId) {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(&mut g, sql);
        merge_on_conditions(&mut g, stmt);
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

    fn join_types(g: &Graph, stmt: NodeId) -> Vec<JoinType> {
        match &g.node(stmt).kind {
            NodeKind::Select(s) => g
                .collect_chain(s.from)
                .iter()
                .map(|&spec| g.node(spec).as_spec().unwrap().join_type)
                .collect(),
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn null_intolerant_where_makes_left_outer_inner() {
        let (mut g, stmt) = prepare(
            "SELECT * FROM a LEFT OUTER JOIN b ON a.id = b.id WHERE b.x > 0",
        );
        rewrite_outerjoin(&mut g, stmt);
        assert_eq!(join_types(&g, stmt), vec![JoinType::None, JoinType::Inner]);
    }

    #[test]
    fn is_null_term_does_not_upgrade() {
        let (mut g, stmt) = prepare(
            "SELECT * FROM a LEFT OUTER JOIN b ON a.id = b.id WHERE b.x IS NULL",
        );
        rewrite_outerjoin(&mut g, stmt);
        assert_eq!(
            join_types(&g, stmt),
            vec![JoinType::None, JoinType::LeftOuter]
        );
    }

    #[test]
    fn coalesce_wrapped_term_does_not_upgrade() {
        let (mut g, stmt) = prepare(
            "SELECT * FROM a LEFT OUTER JOIN b ON a.id = b.id WHERE COALESCE(b.x, 0) > 0",
        );
        rewrite_outerjoin(&mut g, stmt);
        assert_eq!(
            join_types(&g, stmt),
            vec![JoinType::None, JoinType::LeftOuter]
        );
    }

    #[test]
    fn right_outer_watches_left_side() {
        let (mut g, stmt) = prepare(
            "SELECT * FROM a RIGHT OUTER JOIN b ON a.id = b.id WHERE a.x > 0",
        );
        rewrite_outerjoin(&mut g, stmt);
        assert_eq!(join_types(&g, stmt), vec![JoinType::None, JoinType::Inner]);
    }

    #[test]
    fn explicit_inner_joins_flatten_and_locations_reset() {
        let (mut g, stmt) = prepare(
            "SELECT * FROM a INNER JOIN b ON a.id = b.id INNER JOIN c ON b.id = c.id",
        );
        rewrite_innerjoin(&mut g, stmt);
        assert_eq!(
            join_types(&g, stmt),
            vec![JoinType::None, JoinType::None, JoinType::None]
        );
        let where_head = match &g.node(stmt).kind {
            NodeKind::Select(s) => s.where_clause,
            _ => unreachable!(),
        };
        for conjunct in g.collect_chain(where_head) {
            assert_eq!(g.node(conjunct).location, 0);
        }
    }

    #[test]
    fn outer_join_blocks_flattening() {
        let (mut g, stmt) = prepare(
            "SELECT * FROM a INNER JOIN b ON a.id = b.id LEFT OUTER JOIN c ON b.id = c.id",
        );
        rewrite_innerjoin(&mut g, stmt);
        assert_eq!(
            join_types(&g, stmt),
            vec![JoinType::None, JoinType::Inner, JoinType::LeftOuter]
        );
    }

    #[test]
    fn outer_then_inner_upgrade_then_flatten() {
        let (mut g, stmt) = prepare(
            "SELECT * FROM a LEFT OUTER JOIN b ON a.id = b.id WHERE b.x > 0",
        );
        rewrite_outerjoin(&mut g, stmt);
        rewrite_innerjoin(&mut g, stmt);
        assert_eq!(join_types(&g, stmt), vec![JoinType::None, JoinType::None]);
    }
}
