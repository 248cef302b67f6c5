//! Node arena: the owning context every rewrite runs inside.
//!
//! All nodes of one statement live in one [`Graph`]; dropping the graph
//! frees the whole tree. Identity is the [`NodeId`] index, so two fields
//! holding the same id reference the same node, and overwriting a node in
//! place is visible through every reference to it.

use super::node::{Expr, ExprOp, HostVar, Name, Node, NodeId, NodeKind, TypeEnum};
use crate::error::RewriteError;
use crate::types::Issue;
use crate::value::DbValue;
use std::ops::{Index, IndexMut};

#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    /// Value bound to each host-variable marker, by index. `None` for
    /// markers written as `?` in the source, `Some` for markers that
    /// auto-parameterization introduced over a literal.
    host_var_values: Vec<Option<DbValue>>,
    /// Non-fatal findings accumulated during lowering and rewriting.
    pub issues: Vec<Issue>,
    cancelled: bool,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).expect("arena overflow"));
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    /// Replaces the node's payload while keeping its chain links and
    /// location, so every holder of the id sees the new content in place.
    pub fn overwrite(&mut self, id: NodeId, mut node: Node) {
        let old = self.node(id);
        node.next = old.next;
        node.or_next = old.or_next;
        node.location = old.location;
        self.nodes[id.0 as usize] = node;
    }

    /// Cooperative cancellation: raised once, checked at pass boundaries.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn check_cancelled(&self) -> Result<(), RewriteError> {
        if self.cancelled {
            Err(RewriteError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn add_issue(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    // ---- constructors ----

    pub fn new_value(&mut self, value: DbValue) -> NodeId {
        let mut node = Node::new(NodeKind::Value(value));
        if let NodeKind::Value(v) = &node.kind {
            node.type_enum = TypeEnum::of_value(v);
        }
        self.alloc(node)
    }

    pub fn new_bool(&mut self, truth: bool) -> NodeId {
        let mut node = Node::new(NodeKind::Value(DbValue::Int(i64::from(truth))));
        node.type_enum = TypeEnum::Logical;
        self.alloc(node)
    }

    pub fn new_expr(&mut self, expr: Expr) -> NodeId {
        self.alloc(Node::new(NodeKind::Expr(expr)))
    }

    pub fn new_name(&mut self, name: Name) -> NodeId {
        self.alloc(Node::new(NodeKind::Name(name)))
    }

    /// Fresh numbered input marker with no bound value.
    pub fn new_host_var(&mut self) -> NodeId {
        let index = self.next_host_var_index(None);
        self.alloc(Node::new(NodeKind::HostVar(HostVar {
            index,
            bound: false,
        })))
    }

    /// Allocates the next host-variable index, recording its bound value.
    pub fn next_host_var_index(&mut self, value: Option<DbValue>) -> i32 {
        let index = i32::try_from(self.host_var_values.len()).expect("host var overflow");
        self.host_var_values.push(value);
        index
    }

    pub fn host_var_count(&self) -> i32 {
        i32::try_from(self.host_var_values.len()).unwrap_or(i32::MAX)
    }

    pub fn host_var_value(&self, index: i32) -> Option<&DbValue> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.host_var_values.get(i))
            .and_then(|v| v.as_ref())
    }

    /// Number of markers carrying a bound value (auto-parameterized).
    pub fn bound_host_var_count(&self) -> usize {
        self.host_var_values.iter().filter(|v| v.is_some()).count()
    }

    // ---- chain utilities ----

    /// Ids of a `next` chain, captured up front so callers may mutate
    /// freely while iterating.
    pub fn collect_chain(&self, head: Option<NodeId>) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = head;
        while let Some(id) = cur {
            out.push(id);
            cur = self.node(id).next;
        }
        out
    }

    /// Ids of an `or_next` chain.
    pub fn collect_or_chain(&self, head: Option<NodeId>) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = head;
        while let Some(id) = cur {
            out.push(id);
            cur = self.node(id).or_next;
        }
        out
    }

    /// Appends `tail` (itself possibly a chain) to `head`, returning the
    /// head of the combined chain.
    pub fn append_to_chain(&mut self, head: Option<NodeId>, tail: NodeId) -> NodeId {
        match head {
            None => tail,
            Some(h) => {
                let mut cur = h;
                while let Some(n) = self.node(cur).next {
                    cur = n;
                }
                self.node_mut(cur).next = Some(tail);
                h
            }
        }
    }

    pub fn chain_len(&self, head: Option<NodeId>) -> usize {
        self.collect_chain(head).len()
    }

    // ---- deep copy ----

    /// Deep copy of one node and its subtree, excluding the root's `next`
    /// sibling link. `or_next` chains and child chains are copied.
    pub fn copy_tree(&mut self, id: NodeId) -> NodeId {
        let mut node = self.node(id).clone();
        node.next = None;
        let or_next = node.or_next.take();

        let mut slots: Vec<Option<NodeId>> = Vec::new();
        node.for_each_child_slot_mut(|slot| slots.push(slot.take()));
        let copied: Vec<Option<NodeId>> = slots
            .into_iter()
            .map(|slot| slot.map(|child| self.copy_tree_list(child)))
            .collect();
        let mut it = copied.into_iter();
        node.for_each_child_slot_mut(|slot| *slot = it.next().unwrap_or(None));

        let new_id = self.alloc(node);
        if let Some(or_id) = or_next {
            let copied_or = self.copy_tree(or_id);
            self.node_mut(new_id).or_next = Some(copied_or);
        }
        new_id
    }

    /// Deep copy of a whole `next` chain.
    pub fn copy_tree_list(&mut self, head: NodeId) -> NodeId {
        let new_head = self.copy_tree(head);
        let mut src = self.node(head).next;
        let mut dst = new_head;
        while let Some(id) = src {
            let copied = self.copy_tree(id);
            self.node_mut(dst).next = Some(copied);
            dst = copied;
            src = self.node(id).next;
        }
        new_head
    }

    // ---- predicate helpers shared by the passes ----

    /// A bound attribute reference: a resolved NAME, a path DOT ending in
    /// one, or PRIOR of either.
    pub fn is_attr(&self, id: NodeId) -> bool {
        match &self.node(id).kind {
            NodeKind::Name(name) => name.spec_id.is_some(),
            NodeKind::Dot(dot) => dot
                .arg2
                .map(|a| self.node(a).is_name())
                .unwrap_or(false),
            NodeKind::Expr(e) if e.op == ExprOp::Prior => {
                e.arg1.map(|a| self.is_attr(a)).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// The attribute beneath a transparent PRIOR wrapper, if any.
    pub fn strip_prior(&self, id: NodeId) -> NodeId {
        match &self.node(id).kind {
            NodeKind::Expr(e) if e.op == ExprOp::Prior => e.arg1.unwrap_or(id),
            _ => id,
        }
    }

    pub fn is_prior_wrapped(&self, id: NodeId) -> bool {
        matches!(&self.node(id).kind, NodeKind::Expr(e) if e.op == ExprOp::Prior)
    }

    /// A literal value, possibly under CAST. Host variables excluded.
    pub fn is_const_not_hostvar(&self, id: NodeId) -> bool {
        match &self.node(id).kind {
            NodeKind::Value(_) => true,
            NodeKind::Expr(e) if e.op == ExprOp::Cast => e
                .arg1
                .map(|a| self.is_const_not_hostvar(a))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Constant for binding purposes: literals, host variables, and
    /// closed expressions over them.
    pub fn is_const(&self, id: NodeId) -> bool {
        match &self.node(id).kind {
            NodeKind::Value(_) | NodeKind::HostVar(_) => true,
            NodeKind::Expr(e) => {
                use ExprOp::*;
                let closed = matches!(
                    e.op,
                    Plus | Minus
                        | Times
                        | Divide
                        | UnaryMinus
                        | Modulus
                        | Concat
                        | Lower
                        | Upper
                        | Trim
                        | Substring
                        | CharLength
                        | Floor
                        | Ceil
                        | Abs
                        | Round
                        | Trunc
                        | Cast
                );
                closed
                    && [e.arg1, e.arg2, e.arg3]
                        .into_iter()
                        .flatten()
                        .all(|a| self.is_const(a))
            }
            _ => false,
        }
    }

    /// The literal beneath a node, looking through CAST.
    pub fn literal_of(&self, id: NodeId) -> Option<&DbValue> {
        match &self.node(id).kind {
            NodeKind::Value(v) => Some(v),
            NodeKind::Expr(e) if e.op == ExprOp::Cast => {
                e.arg1.and_then(|a| self.literal_of(a))
            }
            _ => None,
        }
    }

    /// Boolean literal test: TRUE and FALSE conjuncts are Logical-typed
    /// integer values.
    pub fn as_bool_literal(&self, id: NodeId) -> Option<bool> {
        let node = self.node(id);
        if node.type_enum != TypeEnum::Logical {
            return None;
        }
        match node.as_value() {
            Some(DbValue::Int(v)) => Some(*v != 0),
            _ => None,
        }
    }

    /// Do two references denote the same attribute? Same producing spec
    /// and same (already normalized) attribute name.
    pub fn names_match(&self, a: NodeId, b: NodeId) -> bool {
        let (a, b) = (self.strip_prior(a), self.strip_prior(b));
        match (self.node(a).as_name(), self.node(b).as_name()) {
            (Some(na), Some(nb)) => {
                na.spec_id.is_some() && na.spec_id == nb.spec_id && na.name == nb.name
            }
            _ => false,
        }
    }

    /// `attr RANGE (v EQ_NA)` — a single-point range, equivalent to
    /// equality against `v`.
    pub fn single_point_range(&self, id: NodeId) -> Option<(NodeId, NodeId)> {
        let expr = self.node(id).as_expr()?;
        if expr.op != ExprOp::Range {
            return None;
        }
        let attr = expr.arg1?;
        let sub = expr.arg2?;
        let sub_node = self.node(sub);
        let sub_expr = sub_node.as_expr()?;
        if sub_expr.op == ExprOp::BetweenEqNa && sub_node.or_next.is_none() {
            Some((attr, sub_expr.arg1?))
        } else {
            None
        }
    }
}

impl Index<NodeId> for Graph {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        self.node(id)
    }
}

impl IndexMut<NodeId> for Graph {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        self.node_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::Expr;

    #[test]
    fn chain_append_and_collect() {
        let mut g = Graph::new();
        let a = g.new_value(DbValue::Int(1));
        let b = g.new_value(DbValue::Int(2));
        let c = g.new_value(DbValue::Int(3));
        let head = g.append_to_chain(None, a);
        let head = g.append_to_chain(Some(head), b);
        let head = g.append_to_chain(Some(head), c);
        assert_eq!(g.collect_chain(Some(head)), vec![a, b, c]);
        assert_eq!(g.chain_len(Some(head)), 3);
    }

    #[test]
    fn copy_tree_detaches_sibling_link() {
        let mut g = Graph::new();
        let a = g.new_value(DbValue::Int(1));
        let b = g.new_value(DbValue::Int(2));
        g.node_mut(a).next = Some(b);
        let copy = g.copy_tree(a);
        assert_ne!(copy, a);
        assert!(g.node(copy).next.is_none());
        assert_eq!(g.node(copy).as_value(), Some(&DbValue::Int(1)));
    }

    #[test]
    fn copy_tree_list_copies_whole_chain() {
        let mut g = Graph::new();
        let a = g.new_value(DbValue::Int(1));
        let b = g.new_value(DbValue::Int(2));
        g.node_mut(a).next = Some(b);
        let copy = g.copy_tree_list(a);
        let chain = g.collect_chain(Some(copy));
        assert_eq!(chain.len(), 2);
        assert_ne!(chain[0], a);
        assert_ne!(chain[1], b);
        assert_eq!(g.node(chain[1]).as_value(), Some(&DbValue::Int(2)));
    }

    #[test]
    fn copy_tree_follows_or_chain() {
        let mut g = Graph::new();
        let lhs = g.new_value(DbValue::Int(1));
        let rhs = g.new_value(DbValue::Int(2));
        let e1 = g.new_expr(Expr::binary(ExprOp::Eq, lhs, rhs));
        let lhs2 = g.new_value(DbValue::Int(3));
        let rhs2 = g.new_value(DbValue::Int(4));
        let e2 = g.new_expr(Expr::binary(ExprOp::Eq, lhs2, rhs2));
        g.node_mut(e1).or_next = Some(e2);

        let copy = g.copy_tree(e1);
        let or = g.node(copy).or_next.expect("or chain copied");
        assert_ne!(or, e2);
        let copied_rhs = g.node(or).as_expr().unwrap().arg2.unwrap();
        assert_eq!(g.node(copied_rhs).as_value(), Some(&DbValue::Int(4)));
    }

    #[test]
    fn overwrite_preserves_links() {
        let mut g = Graph::new();
        let a = g.new_value(DbValue::Int(1));
        let b = g.new_value(DbValue::Int(2));
        g.node_mut(a).next = Some(b);
        g.node_mut(a).location = 2;
        let replacement = Node::new(NodeKind::Value(DbValue::Str("x".into())));
        g.overwrite(a, replacement);
        assert_eq!(g.node(a).next, Some(b));
        assert_eq!(g.node(a).location, 2);
        assert_eq!(g.node(a).as_value(), Some(&DbValue::Str("x".into())));
    }

    #[test]
    fn bool_literals_are_logical() {
        let mut g = Graph::new();
        let t = g.new_bool(true);
        let f = g.new_bool(false);
        let plain = g.new_value(DbValue::Int(1));
        assert_eq!(g.as_bool_literal(t), Some(true));
        assert_eq!(g.as_bool_literal(f), Some(false));
        assert_eq!(g.as_bool_literal(plain), None);
    }

    #[test]
    fn host_vars_number_sequentially() {
        let mut g = Graph::new();
        let a = g.new_host_var();
        let b = g.new_host_var();
        let ha = match &g.node(a).kind {
            NodeKind::HostVar(h) => h.index,
            _ => unreachable!(),
        };
        let hb = match &g.node(b).kind {
            NodeKind::HostVar(h) => h.index,
            _ => unreachable!(),
        };
        assert_eq!((ha, hb), (0, 1));
        assert_eq!(g.host_var_count(), 2);
    }
}
