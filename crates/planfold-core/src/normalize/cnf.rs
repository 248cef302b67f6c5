//! Conjunctive-normal-form conversion.
//!
//! The input is an arbitrary boolean tree (possibly already a `next`
//! chain, since ON conditions are appended to WHERE before this runs).
//! The output threads conjuncts through `next` and the DNF alternatives
//! of each conjunct through `or_next`. NOT is pushed onto atoms with
//! De Morgan; TRUE and FALSE literals collapse.

use crate::graph::{ExprOp, Graph, NodeId};

/// One conjunct: its disjunctive alternatives.
type Disjuncts = Vec<NodeId>;

/// Converts the predicate chain rooted at `head` to CNF, returning the
/// new chain head (`None` when the predicate collapsed to TRUE).
pub fn cnf(g: &mut Graph, head: NodeId) -> Option<NodeId> {
    let trees = g.collect_chain(Some(head));
    let mut conjuncts: Vec<Disjuncts> = Vec::new();
    for tree in trees {
        g.node_mut(tree).next = None;
        match convert(g, tree, false) {
            Cnf::Conjuncts(list) => conjuncts.extend(list),
            Cnf::False(location) => {
                // One FALSE conjunct; the later folding passes apply the
                // location discipline.
                let false_id = super::false_node(g, location);
                conjuncts.push(vec![false_id]);
            }
            Cnf::True => {}
        }
    }
    rebuild_chains(g, conjuncts)
}

enum Cnf {
    Conjuncts(Vec<Disjuncts>),
    True,
    False(u16),
}

fn convert(g: &mut Graph, id: NodeId, negated: bool) -> Cnf {
    let location = g.node(id).location;
    if let Some(truth) = g.as_bool_literal(id) {
        return if truth != negated {
            Cnf::True
        } else {
            Cnf::False(location)
        };
    }

    let op = match g.node(id).as_expr() {
        Some(e) => e.op,
        None => return Cnf::Conjuncts(vec![vec![id]]),
    };

    match op {
        ExprOp::And | ExprOp::Or => {
            let (lhs, rhs) = match g.node(id).as_expr() {
                Some(e) => (e.arg1, e.arg2),
                None => return Cnf::Conjuncts(vec![vec![id]]),
            };
            // Under negation AND and OR trade places.
            let conjunctive = (op == ExprOp::And) != negated;
            let left = lhs.map(|a| convert(g, a, negated)).unwrap_or(Cnf::True);
            let right = rhs.map(|a| convert(g, a, negated)).unwrap_or(Cnf::True);
            if conjunctive {
                combine_and(left, right)
            } else {
                combine_or(g, left, right)
            }
        }
        ExprOp::Not => {
            let arg = g.node(id).as_expr().and_then(|e| e.arg1);
            match arg {
                Some(a) => convert(g, a, !negated),
                None => Cnf::True,
            }
        }
        _ => {
            if negated {
                negate_atom(g, id);
            }
            Cnf::Conjuncts(vec![vec![id]])
        }
    }
}

fn combine_and(left: Cnf, right: Cnf) -> Cnf {
    match (left, right) {
        (Cnf::False(loc), _) | (_, Cnf::False(loc)) => Cnf::False(loc),
        (Cnf::True, other) | (other, Cnf::True) => other,
        (Cnf::Conjuncts(mut a), Cnf::Conjuncts(b)) => {
            a.extend(b);
            Cnf::Conjuncts(a)
        }
    }
}

/// Distributes OR over the conjunct lists:
/// `(a AND b) OR (c AND d)` becomes four two-way disjunctions. Atoms that
/// appear in more than one product are deep-copied, since the intrusive
/// chain links cannot be shared.
fn combine_or(g: &mut Graph, left: Cnf, right: Cnf) -> Cnf {
    let (a, b) = match (left, right) {
        (Cnf::True, _) | (_, Cnf::True) => return Cnf::True,
        (Cnf::False(_), other) | (other, Cnf::False(_)) => return other,
        (Cnf::Conjuncts(a), Cnf::Conjuncts(b)) => (a, b),
    };
    let mut out: Vec<Disjuncts> = Vec::with_capacity(a.len() * b.len());
    for (i, lhs) in a.iter().enumerate() {
        for (j, rhs) in b.iter().enumerate() {
            // Each original atom lands in exactly one product; the other
            // products get deep copies.
            let mut disjuncts: Disjuncts = Vec::with_capacity(lhs.len() + rhs.len());
            for &atom in lhs {
                disjuncts.push(if j + 1 == b.len() {
                    atom
                } else {
                    g.copy_tree(atom)
                });
            }
            for &atom in rhs {
                disjuncts.push(if i + 1 == a.len() {
                    atom
                } else {
                    g.copy_tree(atom)
                });
            }
            out.push(disjuncts);
        }
    }
    Cnf::Conjuncts(out)
}

/// Inverts an atomic term in place. Atoms with no complementary operator
/// keep a NOT wrapper instead.
fn negate_atom(g: &mut Graph, id: NodeId) {
    use ExprOp::*;
    let op = match g.node(id).as_expr() {
        Some(e) => e.op,
        None => return wrap_not(g, id),
    };
    let negated = match op {
        Eq => Ne,
        Ne => Eq,
        Gt => Le,
        Ge => Lt,
        Lt => Ge,
        Le => Gt,
        IsNull => IsNotNull,
        IsNotNull => IsNull,
        Like => NotLike,
        NotLike => Like,
        Between => NotBetween,
        NotBetween => Between,
        IsIn => IsNotIn,
        IsNotIn => IsIn,
        // NOT (a op SOME q) == a inverse(op) ALL q
        EqSome => NeAll,
        NeSome => EqAll,
        GtSome => LeAll,
        GeSome => LtAll,
        LtSome => GeAll,
        LeSome => GtAll,
        EqAll => NeSome,
        NeAll => EqSome,
        GtAll => LeSome,
        GeAll => LtSome,
        LtAll => GeSome,
        LeAll => GtSome,
        _ => return wrap_not(g, id),
    };
    if let Some(expr) = g.node_mut(id).as_expr_mut() {
        expr.op = negated;
    }
}

fn wrap_not(g: &mut Graph, id: NodeId) {
    // The atom moves into a fresh node and the original id becomes the
    // NOT wrapper, so chain links held by the caller stay valid.
    use crate::graph::{Expr, Node, NodeKind, TypeEnum};
    let inner = g.node(id).clone();
    let mut moved = inner;
    moved.next = None;
    moved.or_next = None;
    let inner_id = g.alloc(moved);
    let mut not_node = Node::new(NodeKind::Expr(Expr::unary(ExprOp::Not, inner_id)));
    not_node.type_enum = TypeEnum::Logical;
    g.overwrite(id, not_node);
}

fn rebuild_chains(g: &mut Graph, conjuncts: Vec<Disjuncts>) -> Option<NodeId> {
    let mut head: Option<NodeId> = None;
    let mut tail: Option<NodeId> = None;
    for disjuncts in conjuncts {
        let Some((&first, rest)) = disjuncts.split_first() else {
            continue;
        };
        g.node_mut(first).next = None;
        let mut or_tail = first;
        g.node_mut(or_tail).or_next = None;
        for &alt in rest {
            g.node_mut(alt).next = None;
            g.node_mut(alt).or_next = None;
            g.node_mut(or_tail).or_next = Some(alt);
            or_tail = alt;
        }
        match tail {
            None => head = Some(first),
            Some(t) => g.node_mut(t).next = Some(first),
        }
        tail = Some(first);
    }
    head
}
