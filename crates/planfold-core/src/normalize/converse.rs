//! Converse normalization: attributes move to the left of comparisons.
//!
//! `const op attr` becomes `attr converse(op) const`; for `attr op attr`
//! the side appearing more often across the conjunct's DNF cluster wins
//! the left seat (counted in a separate first pass over the whole
//! cluster). Unary minus is eliminated around attributes, and a negated
//! BETWEEN bound pair splits into its two comparisons first. PRIOR
//! wrappers ride along: `PRIOR(-a)` normalizes as `-PRIOR(a)`.

use crate::graph::{ExprOp, Graph, NodeId};

pub fn converse_sarg_terms(g: &mut Graph, head: Option<NodeId>) {
    // Cursor loop: the BETWEEN split below inserts a conjunct behind the
    // current one, and it must be visited too.
    let mut cursor = head;
    while let Some(conjunct) = cursor {
        split_negated_between(g, conjunct);

        // First pass: appearance counts across the DNF cluster.
        let mut counts: Vec<(NodeId, usize)> = Vec::new();
        let mut cluster_ok = true;
        for term in g.collect_or_chain(Some(conjunct)) {
            let Some(expr) = g.node(term).as_expr().cloned() else {
                continue;
            };
            if expr.op == ExprOp::And || expr.op == ExprOp::Or {
                cluster_ok = false;
                break;
            }
            if expr.op.converse().is_none() {
                continue;
            }
            let (Some(arg1), Some(arg2)) = (expr.arg1, expr.arg2) else {
                continue;
            };
            for side in [arg1, arg2] {
                let stripped = strip_prior_and_minus(g, side);
                if g.is_attr(stripped) {
                    bump_count(g, &mut counts, stripped);
                }
            }
        }

        for term in g.collect_or_chain(Some(conjunct)) {
            let Some(op) = g.node(term).as_expr().map(|e| e.op) else {
                continue;
            };
            if op == ExprOp::And || op == ExprOp::Or {
                // Non-CNF residue: normalize the subtrees.
                let expr = g.node(term).as_expr().cloned();
                if let Some(expr) = expr {
                    converse_sarg_terms(g, expr.arg1);
                    converse_sarg_terms(g, expr.arg2);
                }
                continue;
            }

            eliminate_unary_minus(g, term);
            converse_term(g, term, if cluster_ok { &counts } else { &[] });
        }

        cursor = g.node(conjunct).next;
    }
}

/// `-attr BETWEEN lo AND hi` (single term conjunct) splits into
/// `-attr >= lo` and a new `-attr <= hi` conjunct right behind it, so the
/// minus elimination below can normalize both halves.
fn split_negated_between(g: &mut Graph, conjunct: NodeId) {
    if g.node(conjunct).or_next.is_some() {
        return;
    }
    let Some(expr) = g.node(conjunct).as_expr().cloned() else {
        return;
    };
    if expr.op != ExprOp::Between {
        return;
    }
    let (Some(arg1), Some(bounds)) = (expr.arg1, expr.arg2) else {
        return;
    };
    let inner = match g.node(arg1).as_expr() {
        Some(e) if e.op == ExprOp::UnaryMinus => e.arg1,
        _ => return,
    };
    if !inner.map(|a| g.is_attr(a)).unwrap_or(false) {
        return;
    }
    let Some(bounds_expr) = g.node(bounds).as_expr().cloned() else {
        return;
    };
    let (Some(lo), Some(hi)) = (bounds_expr.arg1, bounds_expr.arg2) else {
        return;
    };

    // The bound-pair node is recycled as the upper-half conjunct.
    let minus_copy = g.copy_tree(arg1);
    if let Some(e) = g.node_mut(conjunct).as_expr_mut() {
        e.op = ExprOp::Ge;
        e.arg2 = Some(lo);
    }
    if let Some(e) = g.node_mut(bounds).as_expr_mut() {
        e.op = ExprOp::Le;
        e.arg1 = Some(minus_copy);
        e.arg2 = Some(hi);
    }
    let old_next = g.node(conjunct).next;
    g.node_mut(bounds).next = old_next;
    g.node_mut(bounds).location = g.node(conjunct).location;
    g.node_mut(conjunct).next = Some(bounds);
}

fn strip_prior_and_minus(g: &Graph, mut id: NodeId) -> NodeId {
    id = g.strip_prior(id);
    loop {
        match g.node(id).as_expr() {
            Some(e) if e.op == ExprOp::UnaryMinus => match e.arg1 {
                Some(inner) => id = inner,
                None => return id,
            },
            _ => return id,
        }
    }
}

fn bump_count(g: &Graph, counts: &mut Vec<(NodeId, usize)>, attr: NodeId) {
    for (known, count) in counts.iter_mut() {
        if g.names_match(*known, attr) {
            *count += 1;
            return;
        }
    }
    counts.push((attr, 1));
}

fn count_of(g: &Graph, counts: &[(NodeId, usize)], attr: NodeId) -> usize {
    counts
        .iter()
        .find(|(known, _)| g.names_match(*known, attr))
        .map(|(_, count)| *count)
        .unwrap_or(0)
}

/// Cancels unary minus around the operands:
/// `-a op -b` → `a op b`, `-a op c` → `a conv(op) -c`,
/// `c op -a` → `-c conv(op) a`. PRIOR stays outermost.
fn eliminate_unary_minus(g: &mut Graph, term: NodeId) {
    loop {
        let Some(expr) = g.node(term).as_expr().cloned() else {
            return;
        };
        let Some(converse) = expr.op.converse() else {
            return;
        };
        let (Some(arg1), Some(arg2)) = (expr.arg1, expr.arg2) else {
            return;
        };

        let (prior1, bare1) = split_prior(g, arg1);
        let (prior2, bare2) = split_prior(g, arg2);
        let minus1 = minus_operand(g, bare1);
        let minus2 = minus_operand(g, bare2);

        match (minus1, minus2) {
            (Some(inner1), Some(inner2)) => {
                let new_arg1 = rewrap_prior(g, prior1, inner1);
                let new_arg2 = rewrap_prior(g, prior2, inner2);
                if let Some(e) = g.node_mut(term).as_expr_mut() {
                    e.arg1 = Some(new_arg1);
                    e.arg2 = Some(new_arg2);
                }
            }
            (Some(inner1), None)
                if minus_chain_or_attr(g, inner1) && g.is_const(arg2) =>
            {
                // -a op c  =>  a conv(op) -c, reusing the minus node.
                let new_arg1 = rewrap_prior(g, prior1, inner1);
                if let Some(m) = g.node_mut(bare1).as_expr_mut() {
                    m.arg1 = Some(arg2);
                }
                if let Some(e) = g.node_mut(term).as_expr_mut() {
                    e.op = converse;
                    e.arg1 = Some(new_arg1);
                    e.arg2 = Some(bare1);
                }
            }
            (None, Some(inner2))
                if minus_chain_or_attr(g, inner2) && g.is_const(arg1) =>
            {
                // c op -a  =>  -c conv(op) a.
                let new_arg2 = rewrap_prior(g, prior2, inner2);
                if let Some(m) = g.node_mut(bare2).as_expr_mut() {
                    m.arg1 = Some(arg1);
                }
                if let Some(e) = g.node_mut(term).as_expr_mut() {
                    e.op = converse;
                    e.arg1 = Some(bare2);
                    e.arg2 = Some(new_arg2);
                }
            }
            _ => return,
        }
    }
}

/// Splits an optional PRIOR wrapper from its operand.
fn split_prior(g: &Graph, id: NodeId) -> (Option<NodeId>, NodeId) {
    match g.node(id).as_expr() {
        Some(e) if e.op == ExprOp::Prior => (Some(id), e.arg1.unwrap_or(id)),
        _ => (None, id),
    }
}

fn rewrap_prior(g: &mut Graph, prior: Option<NodeId>, inner: NodeId) -> NodeId {
    match prior {
        Some(p) => {
            if let Some(e) = g.node_mut(p).as_expr_mut() {
                e.arg1 = Some(inner);
            }
            p
        }
        None => inner,
    }
}

fn minus_operand(g: &Graph, id: NodeId) -> Option<NodeId> {
    match g.node(id).as_expr() {
        Some(e) if e.op == ExprOp::UnaryMinus => e.arg1,
        _ => None,
    }
}

fn minus_chain_or_attr(g: &Graph, id: NodeId) -> bool {
    g.is_attr(id)
        || matches!(g.node(id).as_expr(), Some(e) if e.op == ExprOp::UnaryMinus)
}

/// Puts the attribute on the left, preferring the side that appears more
/// often across the cluster when both sides are attributes.
fn converse_term(g: &mut Graph, term: NodeId, counts: &[(NodeId, usize)]) {
    let Some(expr) = g.node(term).as_expr().cloned() else {
        return;
    };
    let Some(converse) = expr.op.converse() else {
        return;
    };
    let (Some(arg1), Some(arg2)) = (expr.arg1, expr.arg2) else {
        return;
    };
    let bare1 = g.strip_prior(arg1);
    let bare2 = g.strip_prior(arg2);
    if !g.is_attr(bare2) {
        return;
    }

    if g.is_attr(bare1) {
        let cnt1 = count_of(g, counts, bare1);
        let cnt2 = count_of(g, counts, bare2);
        if cnt1 == 0 || cnt2 == 0 || cnt1 >= cnt2 {
            return;
        }
    }

    if let Some(e) = g.node_mut(term).as_expr_mut() {
        e.op = converse;
        e.arg1 = Some(arg2);
        e.arg2 = Some(arg1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lower_sql_for_tests;
    use crate::graph::NodeKind;
    use crate::normalize::cnf;

    fn normalized_where(sql: &str) -> String {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(&mut g, sql);
        let where_clause = match &g.node(stmt).kind {
            NodeKind::Select(s) => s.where_clause,
            _ => panic!("expected select"),
        };
        let head = where_clause.and_then(|w| cnf(&mut g, w));
        converse_sarg_terms(&mut g, head);
        g.print_predicate(head)
    }

    #[test]
    fn const_moves_right() {
        assert_eq!(normalized_where("SELECT a FROM t WHERE 5 < a"), "t.a > 5");
        assert_eq!(normalized_where("SELECT a FROM t WHERE 5 = a"), "t.a = 5");
        assert_eq!(normalized_where("SELECT a FROM t WHERE 5 >= a"), "t.a <= 5");
    }

    #[test]
    fn attr_attr_swaps_by_cluster_count() {
        // y.b appears twice in the cluster, x.a once: y.b wins the left.
        assert_eq!(
            normalized_where(
                "SELECT * FROM x, y WHERE (5 < y.b OR x.a < y.b)"
            ),
            "(y.b > 5 OR y.b > x.a)"
        );
    }

    #[test]
    fn attr_attr_balanced_stays() {
        assert_eq!(
            normalized_where("SELECT * FROM x, y WHERE x.a < y.b"),
            "x.a < y.b"
        );
    }

    #[test]
    fn unary_minus_both_sides_cancels() {
        assert_eq!(
            normalized_where("SELECT a, b FROM t WHERE -a < -b"),
            "t.a < t.b"
        );
    }

    #[test]
    fn unary_minus_against_const() {
        // -a < 5  =>  a > -5
        assert_eq!(normalized_where("SELECT a FROM t WHERE -a < 5"), "t.a > -5");
        // 5 < -a  =>  -5 > a  =>  a < -5
        assert_eq!(normalized_where("SELECT a FROM t WHERE 5 < -a"), "t.a < -5");
    }

    #[test]
    fn negated_between_splits() {
        assert_eq!(
            normalized_where("SELECT a FROM t WHERE -a BETWEEN 1 AND 5"),
            "t.a <= -1 AND t.a >= -5"
        );
    }

    #[test]
    fn prior_rides_outside_unary_minus() {
        use crate::graph::{Expr, Name, Node, Spec};
        use crate::value::DbValue;

        // PRIOR(-a) < 5 normalizes as -PRIOR(a) would: PRIOR a > -5.
        let mut g = Graph::new();
        let spec = g.alloc(Node::new(crate::graph::NodeKind::Spec(Spec::default())));
        let attr = g.new_name(Name {
            spec_id: Some(spec),
            resolved: Some("t".into()),
            name: "a".into(),
            is_meta_class: false,
        });
        let minus = g.new_expr(Expr::unary(ExprOp::UnaryMinus, attr));
        let prior = g.new_expr(Expr::unary(ExprOp::Prior, minus));
        let five = g.new_value(DbValue::Int(5));
        let term = g.new_expr(Expr::binary(ExprOp::Lt, prior, five));

        converse_sarg_terms(&mut g, Some(term));
        assert_eq!(g.print_predicate(Some(term)), "PRIOR t.a > -5");
    }
}
