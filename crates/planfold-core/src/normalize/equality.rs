//! Equality reduction: `attr = const` substitutes the constant for every
//! later occurrence of the attribute in the statement.
//!
//! The reduced equality itself stays in the predicate (re-appended at the
//! end), join terms touching the reduced attribute are copied and appended
//! with the TRANSITIVE flag so the planner may drive the join from either
//! side, and constants projected out of derived tables reduce through
//! their alias.

use crate::graph::{
    DerivedTableType, Expr, ExprOp, Graph, Node, NodeFlags, NodeId, NodeKind, TypeEnum,
    WalkControl,
};
use crate::value::DbValue;

/// Largest literal precision substituted without a CAST wrapper.
const DB_MAX_LITERAL_PRECISION: u16 = 255;

pub fn reduce_equality_terms(g: &mut Graph, stmt: NodeId, slot: &mut Option<NodeId>) {
    let mut accumulator: Vec<NodeId> = Vec::new();
    let mut join_terms: Vec<NodeId> = Vec::new();
    let mut join_sources: Vec<NodeId> = Vec::new();

    'restart: loop {
        let chain = g.collect_chain(*slot);
        for (index, term) in chain.iter().copied().enumerate() {
            let Some((attr, constant, via_derived)) = reducible_pair(g, stmt, term) else {
                continue;
            };
            // Nothing left to substitute: leave the term where it stands.
            if !via_derived && !has_substitution_targets(g, *slot, term, attr) {
                continue;
            }
            // An unsubstitutable constant (domain mismatch) leaves the
            // term untouched as well.
            let Some(replacement) = replacement_content(g, attr, constant) else {
                continue;
            };

            // In the derived-alias case a copy of the equality joins the
            // chain end; once the alias occurrences are substituted it
            // reduces by itself on a later round.
            if via_derived {
                let copy = g.copy_tree(term);
                *slot = Some(match *slot {
                    None => copy,
                    Some(head) => g.append_to_chain(Some(head), copy),
                });
            }

            // Detach the term from the chain; except for the derived-alias
            // case it returns at the end.
            let next = g.node(term).next;
            g.node_mut(term).next = None;
            if index == 0 {
                *slot = next;
            } else {
                g.node_mut(chain[index - 1]).next = next;
            }
            if !via_derived {
                accumulator.push(term);
            }

            collect_transitive_join_terms(
                g,
                *slot,
                attr,
                &mut join_terms,
                &mut join_sources,
            );

            substitute(g, stmt, *slot, attr, &replacement);
            continue 'restart;
        }
        break;
    }

    for term in accumulator {
        *slot = Some(match *slot {
            None => term,
            Some(head) => g.append_to_chain(Some(head), term),
        });
    }
    for term in join_terms {
        g.node_mut(term).flags.set(NodeFlags::TRANSITIVE);
        *slot = Some(match *slot {
            None => term,
            Some(head) => g.append_to_chain(Some(head), term),
        });
    }
}

/// `attr = const` or `attr RANGE (const EQ_NA)`, PRIOR-transparent and
/// derived-alias aware. Returns the attribute, the constant node, and
/// whether the reduction went through a derived-table alias.
fn reducible_pair(g: &Graph, stmt: NodeId, term: NodeId) -> Option<(NodeId, NodeId, bool)> {
    if g.node(term).or_next.is_some() {
        return None;
    }
    let expr = g.node(term).as_expr()?.clone();
    let candidates = match expr.op {
        ExprOp::Eq => {
            let (a, b) = (expr.arg1?, expr.arg2?);
            vec![(a, b), (b, a)]
        }
        ExprOp::Range => {
            let (attr, value) = g.single_point_range(term)?;
            vec![(attr, value)]
        }
        _ => return None,
    };

    for (lhs, rhs) in candidates {
        let attr = g.strip_prior(lhs);
        if !g.is_attr(attr) {
            continue;
        }
        if is_reduceable_const(g, rhs) {
            return Some((attr, rhs, false));
        }
        // The other side may be a derived-table alias whose projected
        // column is a constant.
        let rhs_attr = strip_cast(g, rhs);
        if !g.is_attr(rhs_attr) {
            continue;
        }
        if let Some(col) = derived_constant_column(g, stmt, rhs_attr) {
            return Some((rhs_attr, col, true));
        }
    }
    None
}

/// Does the attribute still occur in another conjunct of the predicate?
/// The select list rides along when a reduction fires but does not by
/// itself trigger one, and synthesized TRANSITIVE terms intentionally
/// keep the attribute and do not count. A second run of the pass is
/// therefore a no-op.
fn has_substitution_targets(
    g: &mut Graph,
    head: Option<NodeId>,
    term: NodeId,
    attr: NodeId,
) -> bool {
    let attr_location = g.node(attr).location;
    for conjunct in g.collect_chain(head) {
        if conjunct == term || g.node(conjunct).flags.contains(NodeFlags::TRANSITIVE) {
            continue;
        }
        if attr_location > 0 && g.node(conjunct).location != attr_location {
            continue;
        }
        if !g
            .collect_nodes(conjunct, |g, id| {
                id != attr && g.node(id).is_name() && g.names_match(id, attr)
            })
            .is_empty()
        {
            return true;
        }
    }
    false
}

fn is_reduceable_const(g: &Graph, id: NodeId) -> bool {
    g.is_const_not_hostvar(id) && !matches!(g.literal_of(id), Some(DbValue::Null) | None)
}

fn strip_cast(g: &Graph, id: NodeId) -> NodeId {
    match g.node(id).as_expr() {
        Some(e) if e.op == ExprOp::Cast => e.arg1.unwrap_or(id),
        _ => id,
    }
}

/// If `alias_attr` resolves to a derived-table spec of `stmt` and the
/// corresponding projected column is a constant, return that column.
fn derived_constant_column(g: &Graph, stmt: NodeId, alias_attr: NodeId) -> Option<NodeId> {
    let name = g.node(alias_attr).as_name()?;
    let spec_id = name.spec_id?;
    let from = match &g.node(stmt).kind {
        NodeKind::Select(s) => s.from,
        _ => return None,
    };
    if !g.collect_chain(from).contains(&spec_id) {
        return None;
    }
    let spec = g.node(spec_id).as_spec()?;
    if spec.derived_table_type != DerivedTableType::Subquery {
        return None;
    }
    let derived = spec.derived_table?;
    let select_list = match &g.node(derived).kind {
        NodeKind::Select(s) => s.list,
        _ => return None,
    };
    let attrs = g.collect_chain(spec.as_attr_list);
    let idx = attrs.iter().position(|&a| {
        g.node(a)
            .as_name()
            .map(|n| n.name == name.name)
            .unwrap_or(false)
    })?;
    let col = g.collect_chain(select_list).get(idx).copied()?;
    if is_reduceable_const(g, col) {
        Some(col)
    } else {
        None
    }
}

/// Join terms touching the reduced attribute are copied once; the copies
/// are appended later with the TRANSITIVE flag.
fn collect_transitive_join_terms(
    g: &mut Graph,
    head: Option<NodeId>,
    attr: NodeId,
    join_terms: &mut Vec<NodeId>,
    join_sources: &mut Vec<NodeId>,
) {
    for term in g.collect_chain(head) {
        if join_sources.contains(&term)
            || g.node(term).or_next.is_some()
            || g.node(term).flags.contains(NodeFlags::TRANSITIVE)
        {
            continue;
        }
        let Some(expr) = g.node(term).as_expr().cloned() else {
            continue;
        };
        if !expr.op.is_comparison() {
            continue;
        }
        let (Some(arg1), Some(arg2)) = (expr.arg1, expr.arg2) else {
            continue;
        };
        let side1 = analyze_side(g, arg1, attr);
        let side2 = analyze_side(g, arg2, attr);
        let (Some(side1), Some(side2)) = (side1, side2) else {
            continue;
        };

        // A join term relates the reduced attribute to exactly one other
        // spec: X.c = Y.a, X.c + Y.a = ?, and mirror images.
        let found = if side1.attr_count > 0 {
            match side1.others.len() {
                0 => side2.others.len() == 1,
                1 => {
                    side2.others.is_empty()
                        || (side2.others.len() == 1 && side1.others[0] == side2.others[0])
                }
                _ => false,
            }
        } else if side2.attr_count > 0 {
            match side2.others.len() {
                0 => side1.others.len() == 1,
                1 => {
                    side1.others.is_empty()
                        || (side1.others.len() == 1 && side1.others[0] == side2.others[0])
                }
                _ => false,
            }
        } else {
            false
        };

        if found {
            let copy = g.copy_tree(term);
            join_terms.push(copy);
            join_sources.push(term);
        }
    }
}

struct SideInfo {
    attr_count: usize,
    /// Spec ids of attribute references other than the reduced one.
    others: Vec<NodeId>,
}

/// `None` when the side contains a nested query (not analyzable).
fn analyze_side(g: &mut Graph, root: NodeId, attr: NodeId) -> Option<SideInfo> {
    let mut info = SideInfo {
        attr_count: 0,
        others: Vec::new(),
    };
    let mut has_query = false;
    g.walk_tree_pre(root, &mut |g, id| {
        if g.node(id).is_query() {
            has_query = true;
            return WalkControl::Stop;
        }
        if g.node(id).is_name() && g.node(id).as_name().and_then(|n| n.spec_id).is_some() {
            if g.names_match(id, attr) {
                info.attr_count += 1;
            } else if let Some(spec) = g.node(id).as_name().and_then(|n| n.spec_id) {
                info.others.push(spec);
            }
        }
        WalkControl::Continue
    });
    if has_query {
        None
    } else {
        Some(info)
    }
}

/// What gets substituted for each occurrence of the attribute. The CAST
/// form materializes a fresh child node per occurrence, since chain links
/// are intrusive and cannot be shared.
enum Replacement {
    Plain(Node),
    Cast { value: DbValue, ty: TypeEnum },
}

/// CAST handling follows the literal-precision cap of the attr's domain.
fn replacement_content(g: &Graph, attr: NodeId, constant: NodeId) -> Option<Replacement> {
    let attr_type = g.node(attr).type_enum;
    let value = g.literal_of(constant)?.clone();

    if let TypeEnum::String { precision } = attr_type {
        let within_cap = precision.map(|p| p <= DB_MAX_LITERAL_PRECISION).unwrap_or(true);
        if within_cap {
            let coerced = coerce_to_string(&value)?;
            let mut node = Node::new(NodeKind::Value(coerced));
            node.type_enum = attr_type;
            return Some(Replacement::Plain(node));
        }
        // Too big a literal: keep the constant behind a CAST to the
        // attribute's domain.
        return Some(Replacement::Cast {
            value,
            ty: attr_type,
        });
    }

    let mut node = Node::new(NodeKind::Value(value));
    node.type_enum = if g.node(constant).type_enum == TypeEnum::Unknown {
        attr_type
    } else {
        g.node(constant).type_enum
    };
    Some(Replacement::Plain(node))
}

fn coerce_to_string(value: &DbValue) -> Option<DbValue> {
    Some(match value {
        DbValue::Str(_) => value.clone(),
        DbValue::Int(v) => DbValue::Str(v.to_string()),
        DbValue::Double(v) => DbValue::Str(v.to_string()),
        _ => return None,
    })
}

/// Replaces every occurrence of `attr` in the predicate chain, and in the
/// statement's select list when the attribute sits in the WHERE clause
/// proper (location 0). Occurrences inside an outer-join group only
/// substitute within that group.
fn substitute(
    g: &mut Graph,
    stmt: NodeId,
    head: Option<NodeId>,
    attr: NodeId,
    replacement: &Replacement,
) {
    let attr_location = g.node(attr).location;

    for conjunct in g.collect_chain(head) {
        if g.node(conjunct).flags.contains(NodeFlags::TRANSITIVE) {
            continue;
        }
        if attr_location > 0 && g.node(conjunct).location != attr_location {
            continue;
        }
        substitute_in_tree(g, conjunct, attr, replacement);
    }

    if attr_location == 0 {
        if let NodeKind::Select(s) = &g.node(stmt).kind {
            let list = s.list;
            for item in g.collect_chain(list) {
                substitute_in_tree(g, item, attr, replacement);
            }
        }
    }
}

fn substitute_in_tree(g: &mut Graph, root: NodeId, attr: NodeId, replacement: &Replacement) {
    let matches = g.collect_nodes(root, |g, id| {
        id != attr && g.node(id).is_name() && g.names_match(id, attr)
    });
    for id in matches {
        match replacement {
            Replacement::Plain(node) => g.overwrite(id, node.clone()),
            Replacement::Cast { value, ty } => {
                let inner = g.new_value(value.clone());
                let mut cast = Node::new(NodeKind::Expr(Expr::unary(ExprOp::Cast, inner)));
                cast.type_enum = *ty;
                g.overwrite(id, cast);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lower_sql_for_tests;
    use crate::normalize::cnf;

    fn select_parts(g: &Graph, stmt: NodeId) -> (Option<NodeId>, Option<NodeId>) {
        match &g.node(stmt).kind {
            NodeKind::Select(s) => (s.list, s.where_clause),
            _ => panic!("expected select"),
        }
    }

    fn run(g: &mut Graph, stmt: NodeId) -> Option<NodeId> {
        let (_, where_clause) = select_parts(g, stmt);
        let mut slot = where_clause.and_then(|w| cnf(g, w));
        reduce_equality_terms(g, stmt, &mut slot);
        if let NodeKind::Select(s) = &mut g.node_mut(stmt).kind {
            s.where_clause = slot;
        }
        slot
    }

    #[test]
    fn substitutes_select_list_and_keeps_term() {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(&mut g, "SELECT x.a FROM x WHERE x.a = 5 AND x.b > x.a");
        let slot = run(&mut g, stmt);
        assert_eq!(
            g.print_predicate(slot),
            "x.b > 5 AND x.a = 5 AND x.b > x.a [TRANSITIVE]",
            "occurrence substituted, equality re-appended, join term kept"
        );
        let (list, _) = select_parts(&g, stmt);
        let first = g.collect_chain(list)[0];
        assert_eq!(g.node(first).as_value(), Some(&DbValue::Int(5)));
    }

    #[test]
    fn transitive_join_term_is_copied_and_flagged() {
        let mut g = Graph::new();
        let stmt =
            lower_sql_for_tests(&mut g, "SELECT x.a, y.b FROM x, y WHERE x.a = 5 AND x.a = y.b");
        let slot = run(&mut g, stmt);
        assert_eq!(
            g.print_predicate(slot),
            "5 = y.b AND x.a = 5 AND x.a = y.b [TRANSITIVE]"
        );
    }

    #[test]
    fn or_conjuncts_are_left_alone() {
        let mut g = Graph::new();
        let stmt =
            lower_sql_for_tests(&mut g, "SELECT x.a FROM x WHERE (x.a = 5 OR x.a = 6) AND x.b > x.a");
        let slot = run(&mut g, stmt);
        assert_eq!(
            g.print_predicate(slot),
            "(x.a = 5 OR x.a = 6) AND x.b > x.a"
        );
    }

    #[test]
    fn reduction_is_idempotent() {
        let mut g = Graph::new();
        let stmt =
            lower_sql_for_tests(&mut g, "SELECT x.a, y.b FROM x, y WHERE x.a = 5 AND x.a = y.b");
        let slot = run(&mut g, stmt);
        let once = g.print_predicate(slot);
        let mut slot2 = slot;
        reduce_equality_terms(&mut g, stmt, &mut slot2);
        assert_eq!(g.print_predicate(slot2), once);
    }

    #[test]
    fn derived_alias_constant_reduces() {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(
            &mut g,
            "SELECT t.v FROM (SELECT 7 FROM u) AS t(v), w WHERE w.a = t.v",
        );
        let slot = run(&mut g, stmt);
        // w.a = t.v reduces through the derived constant; the alias
        // occurrences become 7.
        let printed = g.print_predicate(slot);
        assert!(printed.contains("w.a = 7"), "got: {printed}");
    }
}
