//! Tree traversal with pre/post callbacks.
//!
//! The pre-order callback steers the walk through [`WalkControl`]; the
//! post-order callback runs when a subtree finishes. Sibling (`next`) and
//! alternative (`or_next`) links are captured before descending, so
//! callbacks may relink the chains they are standing on.

use super::arena::Graph;
use super::node::NodeId;

/// Pre-order control value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    /// Descend into children and continue along the sibling chain.
    Continue,
    /// Descend into children but do not continue the sibling chain.
    SkipSiblings,
    /// Abort the whole walk.
    Stop,
}

/// Whether a walk ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    Completed,
    Stopped,
}

impl Graph {
    /// Walks the chain starting at `root`: for each element, `pre`, then
    /// children, then the `or_next` chain, then `post`, then the captured
    /// `next` sibling.
    pub fn walk_tree(
        &mut self,
        root: NodeId,
        pre: &mut dyn FnMut(&mut Graph, NodeId) -> WalkControl,
        post: &mut dyn FnMut(&mut Graph, NodeId),
    ) -> WalkOutcome {
        walk_chain(self, root, pre, post)
    }

    /// Pre-order-only walk.
    pub fn walk_tree_pre(
        &mut self,
        root: NodeId,
        pre: &mut dyn FnMut(&mut Graph, NodeId) -> WalkControl,
    ) -> WalkOutcome {
        self.walk_tree(root, pre, &mut |_, _| {})
    }

    /// Collects every node in the subtree (chain included) for which
    /// `filter` returns true.
    pub fn collect_nodes(
        &mut self,
        root: NodeId,
        filter: impl Fn(&Graph, NodeId) -> bool,
    ) -> Vec<NodeId> {
        let mut found = Vec::new();
        self.walk_tree_pre(root, &mut |g, id| {
            if filter(g, id) {
                found.push(id);
            }
            WalkControl::Continue
        });
        found
    }
}

fn walk_chain(
    g: &mut Graph,
    head: NodeId,
    pre: &mut dyn FnMut(&mut Graph, NodeId) -> WalkControl,
    post: &mut dyn FnMut(&mut Graph, NodeId),
) -> WalkOutcome {
    let mut cur = Some(head);
    while let Some(id) = cur {
        // Captured before the callbacks run; relinking is safe.
        let next = g.node(id).next;

        let mut walk_siblings = true;
        match pre(g, id) {
            WalkControl::Stop => return WalkOutcome::Stopped,
            WalkControl::SkipSiblings => walk_siblings = false,
            WalkControl::Continue => {}
        }

        for child in g.node(id).children() {
            if walk_chain(g, child, pre, post) == WalkOutcome::Stopped {
                return WalkOutcome::Stopped;
            }
        }

        let or_next = g.node(id).or_next;
        if let Some(or_id) = or_next {
            if walk_chain(g, or_id, pre, post) == WalkOutcome::Stopped {
                return WalkOutcome::Stopped;
            }
        }

        post(g, id);

        if !walk_siblings {
            break;
        }
        cur = next;
    }
    WalkOutcome::Completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{Expr, ExprOp};
    use crate::value::DbValue;

    fn int(g: &mut Graph, v: i64) -> NodeId {
        g.new_value(DbValue::Int(v))
    }

    #[test]
    fn visits_children_before_post() {
        let mut g = Graph::new();
        let a = int(&mut g, 1);
        let b = int(&mut g, 2);
        let e = g.new_expr(Expr::binary(ExprOp::Plus, a, b));

        let mut pre_order = Vec::new();
        let mut post_order = Vec::new();
        g.walk_tree(
            e,
            &mut |_, id| {
                pre_order.push(id);
                WalkControl::Continue
            },
            &mut |_, id| post_order.push(id),
        );
        assert_eq!(pre_order, vec![e, a, b]);
        assert_eq!(post_order, vec![a, b, e]);
    }

    #[test]
    fn walks_sibling_and_or_chains() {
        let mut g = Graph::new();
        let a = int(&mut g, 1);
        let b = int(&mut g, 2);
        let c = int(&mut g, 3);
        g.node_mut(a).next = Some(b);
        g.node_mut(b).or_next = Some(c);

        let mut seen = Vec::new();
        g.walk_tree_pre(a, &mut |_, id| {
            seen.push(id);
            WalkControl::Continue
        });
        assert_eq!(seen, vec![a, b, c]);
    }

    #[test]
    fn skip_siblings_halts_chain_but_walks_subtree() {
        let mut g = Graph::new();
        let a = int(&mut g, 1);
        let b = int(&mut g, 2);
        let e = g.new_expr(Expr::binary(ExprOp::Plus, a, b));
        let sibling = int(&mut g, 9);
        g.node_mut(e).next = Some(sibling);

        let mut seen = Vec::new();
        g.walk_tree_pre(e, &mut |_, id| {
            seen.push(id);
            if id == e {
                WalkControl::SkipSiblings
            } else {
                WalkControl::Continue
            }
        });
        assert_eq!(seen, vec![e, a, b]);
    }

    #[test]
    fn stop_aborts_immediately() {
        let mut g = Graph::new();
        let a = int(&mut g, 1);
        let b = int(&mut g, 2);
        g.node_mut(a).next = Some(b);

        let mut seen = Vec::new();
        let outcome = g.walk_tree_pre(a, &mut |_, id| {
            seen.push(id);
            WalkControl::Stop
        });
        assert_eq!(outcome, WalkOutcome::Stopped);
        assert_eq!(seen, vec![a]);
    }

    #[test]
    fn mutation_of_next_during_pre_is_safe() {
        let mut g = Graph::new();
        let a = int(&mut g, 1);
        let b = int(&mut g, 2);
        let c = int(&mut g, 3);
        g.node_mut(a).next = Some(b);
        g.node_mut(b).next = Some(c);

        // Detach b from the chain while standing on it.
        let mut seen = Vec::new();
        g.walk_tree_pre(a, &mut |g, id| {
            seen.push(id);
            if id == b {
                g.node_mut(b).next = None;
            }
            WalkControl::Continue
        });
        // The captured link still leads to c.
        assert_eq!(seen, vec![a, b, c]);
    }
}
