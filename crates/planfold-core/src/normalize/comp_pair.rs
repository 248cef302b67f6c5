//! Folding of a comparison pair into one BETWEEN term.
//!
//! `a >= 10 AND a <= 20` becomes `a BETWEEN 10 AND 20`; mixed strictness
//! keeps the exact sub-operator (`GE_LT`, `GT_LE`, `GT_LT`). A pair of
//! constant bounds that cannot hold folds the conjunct to FALSE with the
//! usual location discipline.

use super::{propagate_false, same_term_attr, term_attr};
use crate::graph::{ExprOp, Graph, NodeId};
use std::cmp::Ordering;

pub fn reduce_comp_pair_terms(g: &mut Graph, slot: &mut Option<NodeId>) {
    'restart: loop {
        let chain = g.collect_chain(*slot);
        for (index, term) in chain.iter().copied().enumerate() {
            if g.node(term).or_next.is_some() {
                continue;
            }
            let Some(op) = g.node(term).as_expr().map(|e| e.op) else {
                continue;
            };
            if term_attr(g, term).is_none() {
                continue;
            }
            let descending = match op {
                ExprOp::Gt | ExprOp::Ge => false,
                ExprOp::Lt | ExprOp::Le => true,
                _ => continue,
            };

            let Some(pair_index) = find_pair(g, &chain, index) else {
                continue;
            };
            let pair = chain[pair_index];
            let (lower, upper) = if descending {
                (pair, term)
            } else {
                (term, pair)
            };

            let lower_op = g.node(lower).as_expr().map(|e| e.op);
            let upper_op = g.node(upper).as_expr().map(|e| e.op);
            let Some(sub_op) = between_op(lower_op, upper_op) else {
                continue;
            };

            let lower_bound = g.node(lower).as_expr().and_then(|e| e.arg2);
            let upper_bound = g.node(upper).as_expr().and_then(|e| e.arg2);
            let (Some(lower_bound), Some(upper_bound)) = (lower_bound, upper_bound) else {
                continue;
            };

            // The pair node is recycled as the bound pair of the BETWEEN.
            let location = g.node(term).location;
            if let Some(e) = g.node_mut(pair).as_expr_mut() {
                e.op = if sub_op == ExprOp::BetweenGeLe {
                    ExprOp::BetweenAnd
                } else {
                    sub_op
                };
                e.arg1 = Some(lower_bound);
                e.arg2 = Some(upper_bound);
            }
            if let Some(e) = g.node_mut(term).as_expr_mut() {
                e.op = ExprOp::Between;
                e.arg2 = Some(pair);
            }

            // Unlink the pair node from the conjunct chain.
            let pair_next = g.node(pair).next;
            g.node_mut(chain[pair_index - 1]).next = pair_next;
            g.node_mut(pair).next = None;

            if between_is_empty(g, sub_op, lower_bound, upper_bound) {
                propagate_false(g, slot, location);
                return;
            }
            continue 'restart;
        }
        break;
    }
}

/// Finds the matching opposite-direction comparison after `index`: same
/// attribute, same location, same PRIOR-ness, and a compatible right
/// side (both constants, or both attributes of one spec).
fn find_pair(g: &mut Graph, chain: &[NodeId], index: usize) -> Option<usize> {
    let start = chain[index];
    let start_op = g.node(start).as_expr().map(|e| e.op)?;
    let wanted = match start_op {
        ExprOp::Gt | ExprOp::Ge => [ExprOp::Lt, ExprOp::Le],
        ExprOp::Lt | ExprOp::Le => [ExprOp::Gt, ExprOp::Ge],
        _ => return None,
    };
    let start_rhs = g.node(start).as_expr().and_then(|e| e.arg2)?;
    let rhs_const = g.is_const(strip_minus(g, start_rhs));
    let rhs_attr = g.is_attr(start_rhs);
    if !rhs_const && !rhs_attr {
        return None;
    }

    for (i, candidate) in chain.iter().copied().enumerate().skip(index + 1) {
        if g.node(candidate).or_next.is_some() {
            continue;
        }
        let Some(op) = g.node(candidate).as_expr().map(|e| e.op) else {
            continue;
        };
        if !wanted.contains(&op) {
            continue;
        }
        if g.node(candidate).location != g.node(start).location {
            continue;
        }
        if !same_term_attr(g, start, candidate) {
            continue;
        }
        let Some(cand_rhs) = g.node(candidate).as_expr().and_then(|e| e.arg2) else {
            continue;
        };
        if rhs_const && g.is_const(strip_minus(g, cand_rhs)) {
            return Some(i);
        }
        if rhs_attr && g.is_attr(cand_rhs) && same_spec(g, start_rhs, cand_rhs) {
            return Some(i);
        }
    }
    None
}

fn strip_minus(g: &Graph, mut id: NodeId) -> NodeId {
    while let Some(e) = g.node(id).as_expr() {
        if e.op == ExprOp::UnaryMinus {
            match e.arg1 {
                Some(inner) => id = inner,
                None => break,
            }
        } else {
            break;
        }
    }
    id
}

fn same_spec(g: &Graph, a: NodeId, b: NodeId) -> bool {
    let spec_a = g.node(g.strip_prior(a)).as_name().and_then(|n| n.spec_id);
    let spec_b = g.node(g.strip_prior(b)).as_name().and_then(|n| n.spec_id);
    spec_a.is_some() && spec_a == spec_b
}

fn between_op(lower: Option<ExprOp>, upper: Option<ExprOp>) -> Option<ExprOp> {
    Some(match (lower?, upper?) {
        (ExprOp::Ge, ExprOp::Le) => ExprOp::BetweenGeLe,
        (ExprOp::Ge, ExprOp::Lt) => ExprOp::BetweenGeLt,
        (ExprOp::Gt, ExprOp::Le) => ExprOp::BetweenGtLe,
        (ExprOp::Gt, ExprOp::Lt) => ExprOp::BetweenGtLt,
        _ => return None,
    })
}

/// Constant bounds where `lo > hi`, or `lo == hi` with a strict end,
/// admit no value at all.
fn between_is_empty(g: &Graph, sub_op: ExprOp, lower: NodeId, upper: NodeId) -> bool {
    let (Some(lo), Some(hi)) = (g.literal_of(lower), g.literal_of(upper)) else {
        return false;
    };
    match lo.compare(hi) {
        Some(Ordering::Greater) => true,
        Some(Ordering::Equal) => matches!(
            sub_op,
            ExprOp::BetweenGeLt | ExprOp::BetweenGtLe | ExprOp::BetweenGtLt
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lower_sql_for_tests;
    use crate::graph::NodeKind;
    use crate::normalize::{cnf, converse_sarg_terms};

    fn run(sql: &str) -> (Graph, Option<NodeId>) {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(&mut g, sql);
        let where_clause = match &g.node(stmt).kind {
            NodeKind::Select(s) => s.where_clause,
            _ => panic!("expected select"),
        };
        let mut slot = where_clause.and_then(|w| cnf(&mut g, w));
        converse_sarg_terms(&mut g, slot);
        reduce_comp_pair_terms(&mut g, &mut slot);
        (g, slot)
    }

    #[test]
    fn inclusive_pair_becomes_between_and() {
        let (g, slot) = run("SELECT a FROM t WHERE a <= 20 AND a >= 10");
        assert_eq!(g.print_predicate(slot), "t.a BETWEEN 10 AND 20");
    }

    #[test]
    fn mixed_strictness_keeps_sub_operator() {
        let (g, slot) = run("SELECT a FROM t WHERE a < 20 AND a > 10");
        assert_eq!(g.print_predicate(slot), "t.a BETWEEN 10 GT_LT 20");
    }

    #[test]
    fn attr_bounds_from_one_spec_fold() {
        let (g, slot) = run("SELECT * FROM t, u WHERE t.a < u.hi AND t.a >= u.lo");
        assert_eq!(g.print_predicate(slot), "t.a BETWEEN u.lo GE_LT u.hi");
    }

    #[test]
    fn impossible_constant_pair_folds_to_false() {
        let (g, slot) = run("SELECT a FROM t WHERE a > 20 AND a < 10");
        let head = slot.expect("predicate present");
        assert_eq!(g.as_bool_literal(head), Some(false));
        assert!(g.node(head).next.is_none());
    }

    #[test]
    fn touching_strict_bounds_fold_to_false() {
        let (g, slot) = run("SELECT a FROM t WHERE a > 10 AND a <= 10");
        let head = slot.expect("predicate present");
        assert_eq!(g.as_bool_literal(head), Some(false));
    }

    #[test]
    fn different_attributes_stay_apart() {
        let (g, slot) = run("SELECT * FROM t WHERE t.a > 10 AND t.b < 20");
        assert_eq!(g.print_predicate(slot), "t.a > 10 AND t.b < 20");
    }

    #[test]
    fn different_locations_stay_apart() {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(
            &mut g,
            "SELECT * FROM t LEFT OUTER JOIN u ON t.a > 5 AND t.a < 9",
        );
        // Merge the ON condition into WHERE the way the pipeline does,
        // then check the pair still folds inside its own group.
        let (from, where_clause) = match &g.node(stmt).kind {
            NodeKind::Select(s) => (s.from, s.where_clause),
            _ => panic!("expected select"),
        };
        assert!(where_clause.is_none());
        let specs = g.collect_chain(from);
        let on_cond = g.node(specs[1]).as_spec().unwrap().on_cond.unwrap();
        let mut slot = cnf(&mut g, on_cond);
        reduce_comp_pair_terms(&mut g, &mut slot);
        assert_eq!(g.print_predicate(slot), "t.a BETWEEN 5 GT_LT 9");
        assert_eq!(g.node(slot.unwrap()).location, 1);
    }
}
