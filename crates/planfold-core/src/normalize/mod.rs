//! Predicate normalizer.
//!
//! The passes run in a fixed order on each of WHERE, HAVING, START WITH,
//! CONNECT BY and the after-CONNECT-BY filter: CNF conversion, equality
//! reduction, converse normalization, comparison-pair folding, LIKE
//! rewriting, RANGE conversion, range intersection, IS NULL folding, and
//! finally auto-parameterization. Each pass edits the CNF chain in place;
//! a conjunct that folds to FALSE propagates per the location discipline
//! in [`propagate_false`].

mod autoparam;
mod cnf;
mod comp_pair;
mod converse;
mod equality;
mod like;
mod null_fold;
mod range;

pub use autoparam::{auto_parameterize, PartitionKeys};
pub use cnf::cnf;
pub use comp_pair::reduce_comp_pair_terms;
pub use converse::converse_sarg_terms;
pub use equality::reduce_equality_terms;
pub use like::rewrite_like_terms;
pub use null_fold::fold_is_and_not_null;
pub use range::{apply_range_intersection, convert_to_range};

use crate::graph::{ExprOp, Graph, Node, NodeId, NodeKind};
use crate::value::DbValue;

/// The attribute on a term's left side, looking through a PRIOR wrapper.
/// `None` when the left side is not a bound attribute.
pub(crate) fn term_attr(g: &Graph, id: NodeId) -> Option<NodeId> {
    let expr = g.node(id).as_expr()?;
    let arg1 = expr.arg1?;
    let stripped = g.strip_prior(arg1);
    if g.is_attr(stripped) || g.node(stripped).as_expr().map(|e| e.op) == Some(ExprOp::InstNum) {
        Some(stripped)
    } else {
        None
    }
}

/// Does the term carry a PRIOR wrapper on its left side?
pub(crate) fn term_has_prior(g: &Graph, id: NodeId) -> bool {
    g.node(id)
        .as_expr()
        .and_then(|e| e.arg1)
        .map(|a| g.is_prior_wrapped(a))
        .unwrap_or(false)
}

/// Same left-side attribute (or both INST_NUM) under matching PRIOR-ness.
pub(crate) fn same_term_attr(g: &Graph, a: NodeId, b: NodeId) -> bool {
    if term_has_prior(g, a) != term_has_prior(g, b) {
        return false;
    }
    match (term_attr(g, a), term_attr(g, b)) {
        (Some(x), Some(y)) => {
            let (xe, ye) = (g.node(x).as_expr().map(|e| e.op), g.node(y).as_expr().map(|e| e.op));
            if xe == Some(ExprOp::InstNum) || ye == Some(ExprOp::InstNum) {
                xe == ye
            } else {
                g.names_match(x, y)
            }
        }
        _ => false,
    }
}

/// Allocates the literal FALSE (logical 0) at `location`.
pub(crate) fn false_node(g: &mut Graph, location: u16) -> NodeId {
    let id = g.new_bool(false);
    g.node_mut(id).location = location;
    id
}

/// Folds a conjunct that proved empty.
///
/// At location 0 the whole predicate is replaced with the literal FALSE.
/// At an outer-join location every node of that location is deleted and a
/// FALSE at the location is prepended, so the join group degenerates to
/// null extension only.
pub(crate) fn propagate_false(g: &mut Graph, slot: &mut Option<NodeId>, location: u16) {
    if location == 0 {
        *slot = Some(false_node(g, 0));
        return;
    }
    let kept: Vec<NodeId> = g
        .collect_chain(*slot)
        .into_iter()
        .filter(|&id| g.node(id).location != location)
        .collect();
    let false_id = false_node(g, location);
    let mut tail = false_id;
    for id in kept {
        g.node_mut(id).next = None;
        g.node_mut(tail).next = Some(id);
        tail = id;
    }
    *slot = Some(false_id);
}

/// Rebuilds a sub-range node's payload from bound form.
pub(crate) fn make_sub_range(
    g: &mut Graph,
    op: ExprOp,
    lower: Option<NodeId>,
    upper: Option<NodeId>,
    location: u16,
) -> NodeId {
    use crate::graph::{Expr, TypeEnum};
    let (arg1, arg2) = match op {
        ExprOp::BetweenEqNa
        | ExprOp::BetweenGeInf
        | ExprOp::BetweenGtInf => (lower, None),
        ExprOp::BetweenInfLe | ExprOp::BetweenInfLt => (upper, None),
        _ => (lower, upper),
    };
    let id = g.new_expr(Expr {
        op,
        arg1,
        arg2,
        arg3: None,
    });
    g.node_mut(id).type_enum = TypeEnum::Logical;
    g.node_mut(id).location = location;
    id
}

/// Replaces a node in place with a boolean literal, keeping links.
pub(crate) fn overwrite_with_bool(g: &mut Graph, id: NodeId, truth: bool) {
    use crate::graph::TypeEnum;
    let mut node = Node::new(NodeKind::Value(DbValue::Int(i64::from(truth))));
    node.type_enum = TypeEnum::Logical;
    g.overwrite(id, node);
}
