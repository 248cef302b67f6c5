//! Folding of IS NULL / IS NOT NULL terms made meaningless by a peer
//! constraint on the same attribute at the same location.

use super::{overwrite_with_bool, same_term_attr, term_attr, term_has_prior};
use crate::graph::{ExprOp, Graph, NodeId};

pub fn fold_is_and_not_null(g: &mut Graph, slot: &mut Option<NodeId>) {
    let chain = g.collect_chain(*slot);
    for node in chain.iter().copied() {
        if g.node(node).or_next.is_some() {
            continue;
        }
        let Some(op) = g.node(node).as_expr().map(|e| e.op) else {
            continue;
        };
        if op != ExprOp::IsNull && op != ExprOp::IsNotNull {
            continue;
        }
        let Some(attr) = term_attr(g, node) else {
            continue;
        };

        let mut verdict: Option<bool> = None;
        for sibling in chain.iter().copied() {
            if sibling == node || g.node(sibling).or_next.is_some() {
                continue;
            }
            let Some(sibling_op) = g.node(sibling).as_expr().map(|e| e.op) else {
                continue;
            };
            if g.node(sibling).location != g.node(node).location {
                continue;
            }
            // A lone PRIOR wrapper makes the two sides incomparable.
            if term_has_prior(g, node) != term_has_prior(g, sibling) {
                continue;
            }

            let same_lhs = same_term_attr(g, node, sibling);
            let rhs_matches = g
                .node(sibling)
                .as_expr()
                .and_then(|e| e.arg2)
                .map(|rhs| g.node(rhs).is_name() && g.names_match(rhs, attr))
                .unwrap_or(false);
            if !same_lhs && !rhs_matches {
                continue;
            }

            verdict = Some(
                if sibling_op == ExprOp::IsNull || sibling_op == ExprOp::IsNotNull {
                    op == sibling_op
                } else {
                    // Any comparison on the attribute already implies
                    // NOT NULL.
                    op == ExprOp::IsNotNull
                },
            );
            break;
        }

        if let Some(truth) = verdict {
            overwrite_with_bool(g, node, truth);
        }
    }
}
