//! Statement rewrite pipeline.
//!
//! Mirrors the optimizer front-end's fixed pass order: ON-condition merge
//! into WHERE, path-join analysis, subquery-to-join rewriting, the
//! normalizer pipeline over each predicate, join rewrites, OID equality,
//! ORDER BY reduction, partition pruning, auto-parameterization, and
//! finally the ON-condition recovery post-pass.

use crate::error::RewriteError;
use crate::graph::{
    ExprOp, FuncType, Graph, JoinType, NodeFlags, NodeId, NodeKind, WalkControl,
};
use crate::normalize::{
    apply_range_intersection, auto_parameterize, cnf, convert_to_range, converse_sarg_terms,
    fold_is_and_not_null, propagate_false, reduce_comp_pair_terms, reduce_equality_terms,
    rewrite_like_terms, PartitionKeys,
};
use crate::prune::{apply_partition_pruning, Catalog};
use crate::rewrite::{
    analyze_path_join, reduce_order_by, rewrite_hidden_col_as_derived, rewrite_innerjoin,
    rewrite_oid_equality, rewrite_outerjoin, rewrite_subqueries, HiddenColContext,
};
use crate::types::{OptimizationLevel, RewriteOptions, StatementSummary};

#[cfg(feature = "tracing")]
use tracing::debug;

/// The five predicate slots the normalizer runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PredSlot {
    Where,
    Having,
    StartWith,
    ConnectBy,
    AfterCbFilter,
}

const ALL_SLOTS: [PredSlot; 5] = [
    PredSlot::Where,
    PredSlot::Having,
    PredSlot::StartWith,
    PredSlot::ConnectBy,
    PredSlot::AfterCbFilter,
];

/// Slots eligible for equality reduction. START WITH and CONNECT BY are
/// excluded: substituting a constant there would break ORDER BY over all
/// hierarchy levels.
const REDUCIBLE_SLOTS: [PredSlot; 3] =
    [PredSlot::Where, PredSlot::Having, PredSlot::AfterCbFilter];

fn get_slot(g: &Graph, stmt: NodeId, slot: PredSlot) -> Option<NodeId> {
    match (&g.node(stmt).kind, slot) {
        (NodeKind::Select(s), PredSlot::Where) => s.where_clause,
        (NodeKind::Select(s), PredSlot::Having) => s.having,
        (NodeKind::Select(s), PredSlot::StartWith) => s.start_with,
        (NodeKind::Select(s), PredSlot::ConnectBy) => s.connect_by,
        (NodeKind::Select(s), PredSlot::AfterCbFilter) => s.after_cb_filter,
        (NodeKind::Update(u), PredSlot::Where) => u.search_cond,
        (NodeKind::Delete(d), PredSlot::Where) => d.search_cond,
        _ => None,
    }
}

fn set_slot(g: &mut Graph, stmt: NodeId, slot: PredSlot, value: Option<NodeId>) {
    match (&mut g.node_mut(stmt).kind, slot) {
        (NodeKind::Select(s), PredSlot::Where) => s.where_clause = value,
        (NodeKind::Select(s), PredSlot::Having) => s.having = value,
        (NodeKind::Select(s), PredSlot::StartWith) => s.start_with = value,
        (NodeKind::Select(s), PredSlot::ConnectBy) => s.connect_by = value,
        (NodeKind::Select(s), PredSlot::AfterCbFilter) => s.after_cb_filter = value,
        (NodeKind::Update(u), PredSlot::Where) => u.search_cond = value,
        (NodeKind::Delete(d), PredSlot::Where) => d.search_cond = value,
        _ => {}
    }
}

/// Rewrites one statement tree in place and reports what happened.
pub fn rewrite_statement(
    g: &mut Graph,
    root: NodeId,
    statement_index: usize,
    options: &RewriteOptions,
    catalog: &dyn Catalog,
) -> Result<StatementSummary, RewriteError> {
    let mut summary = StatementSummary::default();
    let mut seq: u32 = 0;

    // Pre-order over every query node: subqueries in FROM and in
    // expressions run the same pipeline as the root.
    let statements = collect_statement_nodes(g, root);
    for stmt in statements.iter().copied() {
        g.check_cancelled()?;
        optimize_one(
            g,
            stmt,
            statement_index,
            options,
            catalog,
            &mut seq,
            &mut summary,
        )?;
    }

    // Post-order: recover ON conditions and drop pushed copies.
    for stmt in statements.iter().rev().copied() {
        recover_on_conditions(g, stmt, statement_index);
    }

    summary.auto_parameters = g.bound_host_var_count();
    Ok(summary)
}

/// Query/DML nodes of the tree in pre-order.
fn collect_statement_nodes(g: &mut Graph, root: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    g.walk_tree_pre(root, &mut |g, id| {
        if g.node(id).is_query()
            || matches!(
                g.node(id).kind,
                NodeKind::Update(_) | NodeKind::Delete(_) | NodeKind::Insert(_)
            )
        {
            out.push(id);
        }
        WalkControl::Continue
    });
    out
}

#[allow(clippy::too_many_arguments)]
fn optimize_one(
    g: &mut Graph,
    stmt: NodeId,
    statement_index: usize,
    options: &RewriteOptions,
    catalog: &dyn Catalog,
    seq: &mut u32,
    summary: &mut StatementSummary,
) -> Result<(), RewriteError> {
    match &g.node(stmt).kind {
        NodeKind::Select(_) => {}
        NodeKind::Update(_) | NodeKind::Delete(_) => {}
        NodeKind::Insert(_) => {
            // INSERT ... SELECT's subquery was collected separately.
            return Ok(());
        }
        NodeKind::Union(u) | NodeKind::Difference(u) | NodeKind::Intersection(u) => {
            // Set operations only wrap their arms.
            let (arg1, arg2) = (u.arg1, u.arg2);
            if let Some(arg1) = arg1 {
                let new = rewrite_hidden_col_as_derived(g, arg1, HiddenColContext::Nested, seq);
                if let NodeKind::Union(u) | NodeKind::Difference(u) | NodeKind::Intersection(u) =
                    &mut g.node_mut(stmt).kind
                {
                    u.arg1 = Some(new);
                }
            }
            if let Some(arg2) = arg2 {
                let new = rewrite_hidden_col_as_derived(g, arg2, HiddenColContext::Nested, seq);
                if let NodeKind::Union(u) | NodeKind::Difference(u) | NodeKind::Intersection(u) =
                    &mut g.node_mut(stmt).kind
                {
                    u.arg2 = Some(new);
                }
            }
            return Ok(());
        }
        _ => return Ok(()),
    }

    if let NodeKind::Select(_) = g.node(stmt).kind {
        split_connect_by_predicates(g, stmt);
        merge_on_conditions(g, stmt);
        analyze_path_join(g, stmt);
    }

    if options.level == OptimizationLevel::Off {
        return Ok(());
    }

    #[cfg(feature = "tracing")]
    debug!(statement_index, "normalizing predicates");

    // CNF conversion of every predicate slot.
    for slot in ALL_SLOTS {
        if let Some(head) = get_slot(g, stmt, slot) {
            let converted = cnf(g, head);
            set_slot(g, stmt, slot, converted);
        }
    }

    if let NodeKind::Select(_) = g.node(stmt).kind {
        move_non_aggregate_having_terms(g, stmt);
        rewrite_subqueries(g, stmt, seq);
        wrap_quantified_subqueries(g, stmt, seq);
    }

    for slot in REDUCIBLE_SLOTS {
        if let Some(head) = get_slot(g, stmt, slot) {
            let mut slot_head = Some(head);
            reduce_equality_terms(g, stmt, &mut slot_head);
            set_slot(g, stmt, slot, slot_head);
        }
    }

    for slot in ALL_SLOTS {
        let head = get_slot(g, stmt, slot);
        if head.is_some() {
            converse_sarg_terms(g, head);
        }
    }

    for slot in ALL_SLOTS {
        let mut head = get_slot(g, stmt, slot);
        if head.is_some() {
            reduce_comp_pair_terms(g, &mut head);
            set_slot(g, stmt, slot, head);
        }
    }

    for slot in ALL_SLOTS {
        let mut head = get_slot(g, stmt, slot);
        if head.is_some() {
            rewrite_like_terms(g, &mut head);
            set_slot(g, stmt, slot, head);
        }
    }

    for slot in ALL_SLOTS {
        let mut head = get_slot(g, stmt, slot);
        if head.is_some() {
            convert_to_range(g, &mut head);
            set_slot(g, stmt, slot, head);
        }
    }

    for slot in ALL_SLOTS {
        let mut head = get_slot(g, stmt, slot);
        if head.is_some() {
            apply_range_intersection(g, &mut head);
            set_slot(g, stmt, slot, head);
        }
    }

    for slot in ALL_SLOTS {
        let mut head = get_slot(g, stmt, slot);
        if head.is_some() {
            fold_is_and_not_null(g, &mut head);
            set_slot(g, stmt, slot, head);
        }
    }

    g.check_cancelled()?;

    if let NodeKind::Select(_) = g.node(stmt).kind {
        rewrite_outerjoin(g, stmt);
        rewrite_innerjoin(g, stmt);
        let had_oid = {
            let before = *seq;
            rewrite_oid_equality(g, stmt, seq);
            *seq != before
        };
        if had_oid {
            analyze_path_join(g, stmt);
        }
        reduce_order_by(g, stmt);
    }

    let prune_outcome = apply_partition_pruning(g, stmt, statement_index, catalog)?;
    summary.cannot_prepare |= prune_outcome.cannot_prepare;
    summary.partition_pruned |= prune_outcome.pruned;
    if prune_outcome.always_false {
        let mut head = get_slot(g, stmt, PredSlot::Where);
        propagate_false(g, &mut head, 0);
        set_slot(g, stmt, PredSlot::Where, head);
    }

    // Auto-parameterization is safe only as the very last rewrite.
    let caching_enabled = !options.hostvar_late_binding && options.plan_cache_entries > 0;
    if caching_enabled && !summary.cannot_prepare {
        let keys = partition_keys_for(g, stmt, catalog, prune_outcome.pruned);
        for slot in ALL_SLOTS {
            let head = get_slot(g, stmt, slot);
            if head.is_some() {
                auto_parameterize(g, &head, &keys);
            }
        }
    }

    if let Some(head) = get_slot(g, stmt, PredSlot::Where) {
        if g.as_bool_literal(head) == Some(false) && g.node(head).next.is_none() {
            summary.always_false = true;
        }
    }

    Ok(())
}

/// Hierarchical queries without joins run START WITH through the regular
/// scan machinery; the original WHERE filters after CONNECT BY instead.
fn split_connect_by_predicates(g: &mut Graph, stmt: NodeId) {
    let NodeKind::Select(select) = &g.node(stmt).kind else {
        return;
    };
    if select.connect_by.is_none() {
        return;
    }
    let single_table = g.chain_len(select.from) == 1
        && select
            .from
            .and_then(|f| g.node(f).as_spec())
            .map(|s| s.derived_table.is_none() && s.path_entities.is_none())
            .unwrap_or(false);
    if !single_table {
        return;
    }
    let where_clause = select.where_clause;
    let start_with = select.start_with;
    if let NodeKind::Select(s) = &mut g.node_mut(stmt).kind {
        s.after_cb_filter = where_clause;
        s.where_clause = start_with;
        s.start_with = None;
        s.single_table_opt = true;
    }
}

/// Moves every ON condition into WHERE; the location stamps keep the
/// groups distinguishable until the post-pass hands them back.
pub fn merge_on_conditions(g: &mut Graph, stmt: NodeId) {
    let NodeKind::Select(select) = &g.node(stmt).kind else {
        return;
    };
    let mut where_head = select.where_clause;
    for spec in g.collect_chain(select.from) {
        let on_cond = g.node(spec).as_spec().and_then(|s| s.on_cond);
        if let Some(on_cond) = on_cond {
            if let Some(s) = g.node_mut(spec).as_spec_mut() {
                s.on_cond = None;
            }
            where_head = Some(match where_head {
                None => on_cond,
                Some(head) => g.append_to_chain(Some(head), on_cond),
            });
        }
    }
    if let NodeKind::Select(s) = &mut g.node_mut(stmt).kind {
        s.where_clause = where_head;
    }
}

/// With GROUP BY present, HAVING conjuncts free of aggregates (and of the
/// row-counting pseudo-columns) filter rows just as well before grouping.
fn move_non_aggregate_having_terms(g: &mut Graph, stmt: NodeId) {
    let NodeKind::Select(select) = &g.node(stmt).kind else {
        return;
    };
    if select.group_by.is_none() || select.having.is_none() {
        return;
    }
    let having = select.having;
    let mut kept: Vec<NodeId> = Vec::new();
    let mut moved: Vec<NodeId> = Vec::new();
    for conjunct in g.collect_chain(having) {
        let mut has_aggregate = false;
        g.walk_tree_pre(conjunct, &mut |g, id| {
            match &g.node(id).kind {
                NodeKind::Function(f) if f.func.is_aggregate() => has_aggregate = true,
                NodeKind::Expr(e)
                    if matches!(e.op, ExprOp::InstNum | ExprOp::OrderbyNum) =>
                {
                    has_aggregate = true
                }
                _ => {}
            }
            WalkControl::Continue
        });
        if has_aggregate {
            kept.push(conjunct);
        } else {
            moved.push(conjunct);
        }
    }
    if moved.is_empty() {
        return;
    }
    for id in kept.iter().chain(moved.iter()) {
        g.node_mut(*id).next = None;
    }
    let mut new_having: Option<NodeId> = None;
    for id in kept {
        new_having = Some(match new_having {
            None => id,
            Some(head) => g.append_to_chain(Some(head), id),
        });
    }
    let mut where_head = match &g.node(stmt).kind {
        NodeKind::Select(s) => s.where_clause,
        _ => None,
    };
    for id in moved {
        where_head = Some(match where_head {
            None => id,
            Some(head) => g.append_to_chain(Some(head), id),
        });
    }
    if let NodeKind::Select(s) = &mut g.node_mut(stmt).kind {
        s.having = new_having;
        s.where_clause = where_head;
    }
}

/// Hidden-column wrapping for subqueries sitting on the right of IN or a
/// quantified comparison, and for TABLE(...) arguments.
fn wrap_quantified_subqueries(g: &mut Graph, stmt: NodeId, seq: &mut u32) {
    let NodeKind::Select(select) = &g.node(stmt).kind else {
        return;
    };
    let mut roots: Vec<NodeId> = Vec::new();
    roots.extend(g.collect_chain(select.where_clause));
    roots.extend(g.collect_chain(select.having));

    for root in roots {
        let exprs = g.collect_nodes(root, |g, id| {
            matches!(
                g.node(id).as_expr().map(|e| e.op),
                Some(
                    ExprOp::IsIn
                        | ExprOp::IsNotIn
                        | ExprOp::EqSome
                        | ExprOp::NeSome
                        | ExprOp::GeSome
                        | ExprOp::GtSome
                        | ExprOp::LtSome
                        | ExprOp::LeSome
                        | ExprOp::EqAll
                        | ExprOp::NeAll
                        | ExprOp::GeAll
                        | ExprOp::GtAll
                        | ExprOp::LtAll
                        | ExprOp::LeAll
                )
            )
        });
        for expr_id in exprs {
            let arg2 = g.node(expr_id).as_expr().and_then(|e| e.arg2);
            let Some(arg2) = arg2 else {
                continue;
            };
            if !g.node(arg2).is_query() {
                continue;
            }
            let new = rewrite_hidden_col_as_derived(g, arg2, HiddenColContext::Nested, seq);
            if new != arg2 {
                if let Some(e) = g.node_mut(expr_id).as_expr_mut() {
                    e.arg2 = Some(new);
                }
            }
        }

        let funcs = g.collect_nodes(root, |g, id| {
            matches!(
                &g.node(id).kind,
                NodeKind::Function(f)
                    if matches!(f.func, FuncType::TableSet | FuncType::TableSequence)
            )
        });
        for func_id in funcs {
            let args = match &g.node(func_id).kind {
                NodeKind::Function(f) => g.collect_chain(f.args),
                _ => continue,
            };
            for arg in args {
                if g.node(arg).is_query() {
                    rewrite_hidden_col_as_derived(
                        g,
                        arg,
                        HiddenColContext::SequenceArgument,
                        seq,
                    );
                }
            }
        }
    }
}

fn partition_keys_for(
    g: &Graph,
    stmt: NodeId,
    catalog: &dyn Catalog,
    already_pruned: bool,
) -> PartitionKeys {
    let from = match &g.node(stmt).kind {
        NodeKind::Select(s) => s.from,
        NodeKind::Update(u) => u.spec,
        NodeKind::Delete(d) => d.spec,
        _ => None,
    };
    let mut keys = Vec::new();
    for spec in g.collect_chain(from) {
        let entity = g
            .node(spec)
            .as_spec()
            .filter(|s| s.derived_table.is_none())
            .and_then(|s| s.entity_name)
            .and_then(|e| g.node(e).as_name().map(|n| n.name.clone()));
        let Some(entity) = entity else {
            continue;
        };
        if let Ok(Some(scheme)) = catalog.partition_scheme(&entity) {
            keys.push((spec, scheme.key_attr));
        }
    }
    PartitionKeys {
        keys,
        already_pruned,
    }
}

/// Post-pass: conjuncts stamped with an outer-join location return to
/// their spec's ON clause; groups whose spec turned INNER-or-flat reset
/// to location 0 instead, and COPYPUSH temporaries drop.
fn recover_on_conditions(g: &mut Graph, stmt: NodeId, statement_index: usize) {
    let NodeKind::Select(select) = &g.node(stmt).kind else {
        return;
    };
    let specs = g.collect_chain(select.from);
    let mut remaining: Vec<NodeId> = Vec::new();

    for conjunct in g.collect_chain(select.where_clause) {
        g.node_mut(conjunct).next = None;
        let location = g.node(conjunct).location;
        if location == 0 {
            if g.node(conjunct).flags.contains(NodeFlags::COPYPUSH) {
                continue;
            }
            remaining.push(conjunct);
            continue;
        }

        let spec = specs
            .iter()
            .copied()
            .find(|&s| g.node(s).location == location);
        match spec {
            None => {
                g.add_issue(
                    crate::types::Issue::error(
                        crate::types::issue_codes::OUTER_JOIN_SYNTAX,
                        format!(
                            "no join spec for predicate group {location}; check outer join syntax"
                        ),
                    )
                    .with_statement(statement_index),
                );
                remaining.push(conjunct);
            }
            Some(spec) => {
                let join_type = g
                    .node(spec)
                    .as_spec()
                    .map(|s| s.join_type)
                    .unwrap_or_default();
                if join_type != JoinType::None {
                    let old = g.node(spec).as_spec().and_then(|s| s.on_cond);
                    g.node_mut(conjunct).next = old;
                    if let Some(s) = g.node_mut(spec).as_spec_mut() {
                        s.on_cond = Some(conjunct);
                    }
                } else {
                    // Already flattened to an unordered join.
                    g.walk_tree_pre(conjunct, &mut |g, id| {
                        if g.node(id).location == location {
                            g.node_mut(id).location = 0;
                        }
                        WalkControl::Continue
                    });
                    if g.node(conjunct).flags.contains(NodeFlags::COPYPUSH) {
                        continue;
                    }
                    remaining.push(conjunct);
                }
            }
        }
    }

    let mut head: Option<NodeId> = None;
    for id in remaining {
        head = Some(match head {
            None => id,
            Some(h) => g.append_to_chain(Some(h), id),
        });
    }
    if let NodeKind::Select(s) = &mut g.node_mut(stmt).kind {
        s.where_clause = head;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lower_sql_for_tests;
    use crate::prune::EmptyCatalog;

    fn rewrite(sql: &str) -> (Graph, NodeId, StatementSummary) {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(&mut g, sql);
        let summary = rewrite_statement(
            &mut g,
            stmt,
            0,
            &RewriteOptions {
                plan_cache_entries: 0, // keep literals visible in asserts
                ..Default::default()
            },
            &EmptyCatalog,
        )
        .unwrap();
        (g, stmt, summary)
    }

    #[test]
    fn like_to_between_end_to_end() {
        let (g, stmt, _) = rewrite("SELECT s FROM t WHERE s LIKE 'abc%'");
        let text = g.print_statement(stmt);
        assert!(
            text.contains("t.s RANGE ('abc' GE_LT 'abd')"),
            "got: {text}"
        );
    }

    #[test]
    fn comparison_pair_end_to_end() {
        let (g, stmt, _) = rewrite("SELECT a FROM t WHERE a <= 20 AND a >= 10");
        let text = g.print_statement(stmt);
        assert!(text.contains("t.a RANGE (10 GE_LE 20)"), "got: {text}");
    }

    #[test]
    fn equality_reduction_end_to_end() {
        let (g, stmt, _) =
            rewrite("SELECT x.a, y.b FROM x, y WHERE x.a = 5 AND x.a = y.b");
        let text = g.print_statement(stmt);
        assert!(text.starts_with("SELECT 5, "), "got: {text}");
        assert!(text.contains("x.a RANGE (5 EQ_NA)"), "got: {text}");
        assert!(text.contains("y.b RANGE (5 EQ_NA)"), "got: {text}");
        assert!(text.contains("x.a = y.b [TRANSITIVE]"), "got: {text}");
    }

    #[test]
    fn outer_join_upgrade_end_to_end() {
        let (g, stmt, _) = rewrite(
            "SELECT * FROM a LEFT OUTER JOIN b ON a.id = b.id WHERE b.x > 0",
        );
        let NodeKind::Select(select) = &g.node(stmt).kind else {
            panic!("expected select");
        };
        let specs = g.collect_chain(select.from);
        let join_type = g.node(specs[1]).as_spec().unwrap().join_type;
        assert_eq!(join_type, JoinType::None, "upgraded then flattened");
        // The ON condition joined the WHERE clause at location 0.
        let text = g.print_statement(stmt);
        assert!(text.contains("a.id = b.id"), "got: {text}");
        assert!(!text.contains(" ON "), "got: {text}");
    }

    #[test]
    fn kept_outer_join_recovers_on_condition() {
        let (g, stmt, _) = rewrite(
            "SELECT * FROM a LEFT OUTER JOIN b ON a.id = b.id WHERE a.x > 0",
        );
        let NodeKind::Select(select) = &g.node(stmt).kind else {
            panic!("expected select");
        };
        let specs = g.collect_chain(select.from);
        let spec = g.node(specs[1]).as_spec().unwrap();
        assert_eq!(spec.join_type, JoinType::LeftOuter);
        assert!(spec.on_cond.is_some(), "ON condition recovered");
        let where_chain = g.collect_chain(select.where_clause);
        assert_eq!(where_chain.len(), 1, "only the WHERE-proper conjunct stays");
    }

    #[test]
    fn range_intersection_to_false_end_to_end() {
        let (g, stmt, summary) = rewrite(
            "SELECT a FROM t WHERE a BETWEEN 10 AND 20 AND a BETWEEN 30 AND 40",
        );
        assert!(summary.always_false);
        let NodeKind::Select(select) = &g.node(stmt).kind else {
            panic!("expected select");
        };
        let head = select.where_clause.unwrap();
        assert_eq!(g.as_bool_literal(head), Some(false));
    }

    #[test]
    fn uncorrelated_in_subquery_end_to_end() {
        let (g, stmt, _) = rewrite("SELECT a FROM t WHERE a IN (SELECT b FROM u)");
        let text = g.print_statement(stmt);
        assert!(text.contains("AS dt0"), "got: {text}");
        assert!(!text.contains(" IN "), "got: {text}");
    }

    #[test]
    fn auto_parameterization_counts() {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(&mut g, "SELECT a FROM t WHERE a > 5 AND a < 9");
        let summary = rewrite_statement(
            &mut g,
            stmt,
            0,
            &RewriteOptions::default(),
            &EmptyCatalog,
        )
        .unwrap();
        assert_eq!(summary.auto_parameters, 2);
        let text = g.print_statement(stmt);
        assert!(text.contains("?0"), "got: {text}");
    }

    #[test]
    fn late_binding_keeps_literals() {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(&mut g, "SELECT a FROM t WHERE a > 5");
        let summary = rewrite_statement(
            &mut g,
            stmt,
            0,
            &RewriteOptions {
                hostvar_late_binding: true,
                ..Default::default()
            },
            &EmptyCatalog,
        )
        .unwrap();
        assert_eq!(summary.auto_parameters, 0);
    }

    #[test]
    fn having_without_aggregate_moves_to_where() {
        let (g, stmt, _) = rewrite(
            "SELECT a, COUNT(*) FROM t GROUP BY a HAVING a > 1 AND COUNT(*) > 2",
        );
        let NodeKind::Select(select) = &g.node(stmt).kind else {
            panic!("expected select");
        };
        assert_eq!(g.collect_chain(select.having).len(), 1);
        let where_text = g.print_predicate(select.where_clause);
        assert!(where_text.contains("t.a RANGE (1 GT_INF)"), "got: {where_text}");
    }
}
