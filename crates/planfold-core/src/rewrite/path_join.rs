//! Path-join classification.
//!
//! An object-path link has outer-join semantics by default: a row whose
//! path yields no object is null-extended. When the WHERE clause provably
//! rejects every null-extended row, the link runs as an inner join
//! instead.

use crate::graph::{ExprOp, Graph, NodeId, NodeKind, SpecMetaClass};
use crate::value::DbValue;
use std::cmp::Ordering;

pub fn analyze_path_join(g: &mut Graph, stmt: NodeId) {
    let NodeKind::Select(select) = &g.node(stmt).kind else {
        return;
    };
    let where_head = select.where_clause;
    let specs = g.collect_chain(select.from);
    for spec in specs {
        classify_path_children(g, spec, where_head);
    }
}

fn classify_path_children(g: &mut Graph, spec: NodeId, where_head: Option<NodeId>) {
    let children = match g.node(spec).as_spec() {
        Some(s) => g.collect_chain(s.path_entities),
        None => return,
    };
    for child in children {
        classify_path_children(g, child, where_head);

        let meta_class = g.node(child).as_spec().map(|s| s.meta_class);
        if !matches!(
            meta_class,
            Some(SpecMetaClass::PathOuter) | Some(SpecMetaClass::PathOuterWeasel)
        ) {
            continue;
        }

        let classified = if condition_yields_null_rejection(g, where_head, child) {
            SpecMetaClass::PathInner
        } else if spec_appears_in(g, where_head, child) {
            SpecMetaClass::PathOuterWeasel
        } else {
            SpecMetaClass::PathOuter
        };
        if let Some(s) = g.node_mut(child).as_spec_mut() {
            s.meta_class = classified;
        }
    }
}

/// Substitutes NULL for every reference to the path spec in a copy of the
/// predicate and folds; a definite FALSE proves the outer join can drop
/// all null-extended rows.
fn condition_yields_null_rejection(
    g: &mut Graph,
    where_head: Option<NodeId>,
    path_spec: NodeId,
) -> bool {
    let Some(head) = where_head else {
        return false;
    };
    let copy = g.copy_tree_list(head);
    let matches = {
        let mut found = Vec::new();
        for conjunct in g.collect_chain(Some(copy)) {
            found.extend(g.collect_nodes(conjunct, |g, id| {
                matches!(g.node(id).as_name(), Some(n) if n.spec_id == Some(path_spec))
            }));
        }
        found
    };
    if matches.is_empty() {
        return false;
    }
    for id in matches {
        let mut node = crate::graph::Node::new(NodeKind::Value(DbValue::Null));
        node.type_enum = crate::graph::TypeEnum::Null;
        g.overwrite(id, node);
    }
    eval_pred(g, Some(copy)) == Tri::False
}

fn spec_appears_in(g: &mut Graph, where_head: Option<NodeId>, path_spec: NodeId) -> bool {
    for conjunct in g.collect_chain(where_head) {
        let found = g.collect_nodes(conjunct, |g, id| {
            matches!(g.node(id).as_name(), Some(n) if n.spec_id == Some(path_spec))
        });
        if !found.is_empty() {
            return true;
        }
    }
    false
}

/// Three-valued folding verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tri {
    True,
    /// FALSE and NULL coincide for filtering purposes.
    False,
    Unknown,
}

fn eval_pred(g: &Graph, head: Option<NodeId>) -> Tri {
    let mut all_true = true;
    for conjunct in g.collect_chain(head) {
        match eval_disjunction(g, conjunct) {
            Tri::False => return Tri::False,
            Tri::Unknown => all_true = false,
            Tri::True => {}
        }
    }
    if all_true {
        Tri::True
    } else {
        Tri::Unknown
    }
}

fn eval_disjunction(g: &Graph, head: NodeId) -> Tri {
    let mut all_false = true;
    for alt in g.collect_or_chain(Some(head)) {
        match eval_term(g, alt) {
            Tri::True => return Tri::True,
            Tri::Unknown => all_false = false,
            Tri::False => {}
        }
    }
    if all_false {
        Tri::False
    } else {
        Tri::Unknown
    }
}

fn eval_term(g: &Graph, id: NodeId) -> Tri {
    if let Some(truth) = g.as_bool_literal(id) {
        return if truth { Tri::True } else { Tri::False };
    }
    if yields_null(g, id) {
        return Tri::False;
    }
    let Some(expr) = g.node(id).as_expr() else {
        return Tri::Unknown;
    };
    match expr.op {
        ExprOp::And => {
            match (
                expr.arg1.map(|a| eval_term(g, a)),
                expr.arg2.map(|a| eval_term(g, a)),
            ) {
                (Some(Tri::False), _) | (_, Some(Tri::False)) => Tri::False,
                (Some(Tri::True), Some(Tri::True)) => Tri::True,
                _ => Tri::Unknown,
            }
        }
        ExprOp::Or => {
            match (
                expr.arg1.map(|a| eval_term(g, a)),
                expr.arg2.map(|a| eval_term(g, a)),
            ) {
                (Some(Tri::True), _) | (_, Some(Tri::True)) => Tri::True,
                (Some(Tri::False), Some(Tri::False)) => Tri::False,
                _ => Tri::Unknown,
            }
        }
        ExprOp::Not => match expr.arg1.map(|a| eval_term(g, a)) {
            Some(Tri::True) => Tri::False,
            Some(Tri::False) => Tri::True,
            _ => Tri::Unknown,
        },
        ExprOp::IsNull => match expr.arg1 {
            Some(a) if yields_null(g, a) => Tri::True,
            Some(a) if g.is_const_not_hostvar(a) => Tri::False,
            _ => Tri::Unknown,
        },
        ExprOp::IsNotNull => match expr.arg1 {
            Some(a) if yields_null(g, a) => Tri::False,
            Some(a) if g.is_const_not_hostvar(a) => Tri::True,
            _ => Tri::Unknown,
        },
        op if op.is_comparison() => {
            let (Some(a), Some(b)) = (expr.arg1, expr.arg2) else {
                return Tri::Unknown;
            };
            // A NULL operand already returned False above via the term
            // check; here both sides may still be non-literal.
            if yields_null(g, a) || yields_null(g, b) {
                return Tri::False;
            }
            let (Some(va), Some(vb)) = (g.literal_of(a), g.literal_of(b)) else {
                return Tri::Unknown;
            };
            let Some(ordering) = va.compare(vb) else {
                return Tri::Unknown;
            };
            let holds = match op {
                ExprOp::Eq | ExprOp::NullsafeEq => ordering == Ordering::Equal,
                ExprOp::Ne => ordering != Ordering::Equal,
                ExprOp::Gt => ordering == Ordering::Greater,
                ExprOp::Ge => ordering != Ordering::Less,
                ExprOp::Lt => ordering == Ordering::Less,
                ExprOp::Le => ordering != Ordering::Greater,
                _ => return Tri::Unknown,
            };
            if holds {
                Tri::True
            } else {
                Tri::False
            }
        }
        ExprOp::Range | ExprOp::Like | ExprOp::Between | ExprOp::IsIn => {
            match expr.arg1 {
                Some(a) if yields_null(g, a) => Tri::False,
                _ => Tri::Unknown,
            }
        }
        _ => Tri::Unknown,
    }
}

/// Does the expression yield NULL for every row? NULL propagates through
/// arithmetic and string operators; the conditional operators absorb it.
fn yields_null(g: &Graph, id: NodeId) -> bool {
    match &g.node(id).kind {
        NodeKind::Value(DbValue::Null) => true,
        NodeKind::Expr(e) => {
            use ExprOp::*;
            let propagates = matches!(
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
                    | Prior
            );
            propagates
                && [e.arg1, e.arg2, e.arg3]
                    .into_iter()
                    .flatten()
                    .any(|a| yields_null(g, a))
        }
        NodeKind::Dot(d) => d
            .arg1
            .map(|a| yields_null(g, a))
            .unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Expr, Name, Node, Spec};

    /// Builds `SELECT ... FROM base (path child p) WHERE <cond>` shapes
    /// directly; object paths have no SQL surface in the front-end.
    fn setup(g: &mut Graph) -> (NodeId, NodeId, NodeId) {
        let base = g.alloc(Node::new(NodeKind::Spec(Spec::default())));
        let child = g.alloc(Node::new(NodeKind::Spec(Spec {
            meta_class: SpecMetaClass::PathOuter,
            ..Default::default()
        })));
        if let Some(s) = g.node_mut(base).as_spec_mut() {
            s.path_entities = Some(child);
        }
        let stmt = g.alloc(Node::new(NodeKind::Select(crate::graph::SelectQuery {
            from: Some(base),
            ..Default::default()
        })));
        (stmt, base, child)
    }

    fn attr_of(g: &mut Graph, spec: NodeId, name: &str) -> NodeId {
        g.new_name(Name {
            spec_id: Some(spec),
            resolved: None,
            name: name.to_string(),
            is_meta_class: false,
        })
    }

    fn set_where(g: &mut Graph, stmt: NodeId, head: NodeId) {
        if let NodeKind::Select(s) = &mut g.node_mut(stmt).kind {
            s.where_clause = Some(head);
        }
    }

    fn meta_class_of(g: &Graph, spec: NodeId) -> SpecMetaClass {
        g.node(spec).as_spec().unwrap().meta_class
    }

    #[test]
    fn null_rejecting_condition_upgrades_to_inner() {
        let mut g = Graph::new();
        let (stmt, _, child) = setup(&mut g);
        // WHERE child.x > 0: substituting NULL folds to FALSE.
        let attr = attr_of(&mut g, child, "x");
        let zero = g.new_value(DbValue::Int(0));
        let cond = g.new_expr(Expr::binary(ExprOp::Gt, attr, zero));
        set_where(&mut g, stmt, cond);
        analyze_path_join(&mut g, stmt);
        assert_eq!(meta_class_of(&g, child), SpecMetaClass::PathInner);
    }

    #[test]
    fn is_null_condition_keeps_weasel_outer() {
        let mut g = Graph::new();
        let (stmt, _, child) = setup(&mut g);
        // WHERE child.x IS NULL: NULL substitution folds TRUE, but the
        // spec still appears in WHERE.
        let attr = attr_of(&mut g, child, "x");
        let cond = g.new_expr(Expr::unary(ExprOp::IsNull, attr));
        set_where(&mut g, stmt, cond);
        analyze_path_join(&mut g, stmt);
        assert_eq!(meta_class_of(&g, child), SpecMetaClass::PathOuterWeasel);
    }

    #[test]
    fn unreferenced_path_stays_pure_outer() {
        let mut g = Graph::new();
        let (stmt, base, child) = setup(&mut g);
        let attr = attr_of(&mut g, base, "y");
        let zero = g.new_value(DbValue::Int(0));
        let cond = g.new_expr(Expr::binary(ExprOp::Gt, attr, zero));
        set_where(&mut g, stmt, cond);
        analyze_path_join(&mut g, stmt);
        assert_eq!(meta_class_of(&g, child), SpecMetaClass::PathOuter);
    }

    #[test]
    fn no_where_keeps_pure_outer() {
        let mut g = Graph::new();
        let (stmt, _, child) = setup(&mut g);
        analyze_path_join(&mut g, stmt);
        assert_eq!(meta_class_of(&g, child), SpecMetaClass::PathOuter);
    }
}
