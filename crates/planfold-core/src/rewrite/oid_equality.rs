//! OID-equality rewrite: `FROM c x ... WHERE x = <oid>` scans no table at
//! all; the object reference becomes a one-row derived set expression and
//! the class access turns into a path over it.

use crate::graph::{
    DerivedTableType, DotExpr, ExprOp, FuncType, FunctionCall, Graph, Name, Node, NodeId,
    NodeKind, SpecMetaClass, TypeEnum,
};
use crate::value::DbValue;

pub fn rewrite_oid_equality(g: &mut Graph, stmt: NodeId, seq: &mut u32) {
    loop {
        let Some((term, spec, oid_expr)) = find_oid_pred(g, stmt) else {
            return;
        };
        rewrite_one(g, stmt, term, spec, oid_expr, seq);
    }
}

/// A WHERE conjunct `x = <oid-const>` (either side) where `x` denotes a
/// base-table spec's whole object.
fn find_oid_pred(g: &Graph, stmt: NodeId) -> Option<(NodeId, NodeId, NodeId)> {
    let NodeKind::Select(select) = &g.node(stmt).kind else {
        return None;
    };
    let specs = g.collect_chain(select.from);
    for term in g.collect_chain(select.where_clause) {
        if g.node(term).or_next.is_some() {
            continue;
        }
        let Some(expr) = g.node(term).as_expr() else {
            continue;
        };
        if expr.op != ExprOp::Eq {
            continue;
        }
        let (Some(arg1), Some(arg2)) = (expr.arg1, expr.arg2) else {
            continue;
        };
        for (lhs, rhs) in [(arg1, arg2), (arg2, arg1)] {
            let Some(name) = g.node(lhs).as_name() else {
                continue;
            };
            let Some(spec_id) = name.spec_id else {
                continue;
            };
            if !specs.contains(&spec_id) {
                continue;
            }
            let Some(spec) = g.node(spec_id).as_spec() else {
                continue;
            };
            // `class c` is a meta-class access; leave it alone. Derived
            // tables carry no OID identity either.
            if spec.meta_class == SpecMetaClass::MetaClass
                || spec.derived_table_type != DerivedTableType::None
            {
                continue;
            }
            let refers_whole_object = spec
                .range_var
                .and_then(|rv| g.node(rv).as_name())
                .map(|rv| rv.name == name.name)
                .unwrap_or(false);
            if refers_whole_object && is_oid_const(g, rhs) {
                return Some((term, spec_id, rhs));
            }
        }
    }
    None
}

fn is_oid_const(g: &Graph, id: NodeId) -> bool {
    match &g.node(id).kind {
        NodeKind::Value(DbValue::Oid(_)) => true,
        NodeKind::Value(DbValue::Sequence(items)) => {
            items.iter().all(|v| matches!(v, DbValue::Oid(_)))
        }
        NodeKind::HostVar(_) => g.node(id).type_enum == TypeEnum::Object,
        _ => g.node(id).type_enum == TypeEnum::Object && g.is_const(id),
    }
}

fn rewrite_one(
    g: &mut Graph,
    stmt: NodeId,
    term: NodeId,
    old_spec: NodeId,
    oid_expr: NodeId,
    seq: &mut u32,
) {
    let alias = g
        .node(old_spec)
        .as_spec()
        .and_then(|s| s.range_var)
        .and_then(|rv| g.node(rv).as_name().map(|n| n.name.clone()))
        .unwrap_or_else(|| "x".to_string());

    // TABLE({expr}) carrying the object id(s).
    let elements = match g.node(oid_expr).as_value() {
        Some(DbValue::Sequence(items)) => {
            let mut head: Option<NodeId> = None;
            for item in items.clone() {
                let value = g.new_value(item);
                g.node_mut(value).type_enum = TypeEnum::Object;
                head = Some(g.append_to_chain(head, value));
            }
            head
        }
        _ => {
            let copy = g.copy_tree(oid_expr);
            Some(copy)
        }
    };
    let set_expr = g.alloc(Node::new(NodeKind::Function(FunctionCall {
        func: FuncType::TableSet,
        args: elements,
    })));
    g.node_mut(set_expr).type_enum = TypeEnum::Sequence;

    let range_name = format!("t{}", *seq);
    *seq += 1;
    let range_var = g.new_name(Name::attr(None, range_name.clone()));
    let new_spec = g.alloc(Node::new(NodeKind::Spec(crate::graph::Spec {
        derived_table: Some(set_expr),
        derived_table_type: DerivedTableType::SetExpr,
        range_var: Some(range_var),
        ..Default::default()
    })));
    let object_attr = g.new_name(Name {
        spec_id: Some(new_spec),
        resolved: None,
        name: alias.clone(),
        is_meta_class: false,
    });
    g.node_mut(object_attr).type_enum = TypeEnum::Object;
    if let Some(s) = g.node_mut(new_spec).as_spec_mut() {
        s.as_attr_list = Some(object_attr);
        // The class spec rides under the new spec as a path link.
        s.path_entities = Some(old_spec);
    }

    // Swap the old spec for the new one in FROM, keeping chain position.
    let NodeKind::Select(select) = &g.node(stmt).kind else {
        return;
    };
    let specs = g.collect_chain(select.from);
    let position = specs.iter().position(|&s| s == old_spec);
    let old_next = g.node(old_spec).next;
    g.node_mut(new_spec).next = old_next;
    g.node_mut(new_spec).location = g.node(old_spec).location;
    g.node_mut(old_spec).next = None;
    if let Some(s) = g.node_mut(old_spec).as_spec_mut() {
        s.meta_class = SpecMetaClass::PathOuter;
        s.join_type = Default::default();
    }
    match position {
        Some(0) | None => {
            if let NodeKind::Select(s) = &mut g.node_mut(stmt).kind {
                s.from = Some(new_spec);
            }
        }
        Some(p) => {
            g.node_mut(specs[p - 1]).next = Some(new_spec);
        }
    }

    // Excise the equality conjunct.
    let NodeKind::Select(select) = &g.node(stmt).kind else {
        return;
    };
    let where_chain = g.collect_chain(select.where_clause);
    if let Some(term_pos) = where_chain.iter().position(|&t| t == term) {
        let next = g.node(term).next;
        g.node_mut(term).next = None;
        if term_pos == 0 {
            if let NodeKind::Select(s) = &mut g.node_mut(stmt).kind {
                s.where_clause = next;
            }
        } else {
            g.node_mut(where_chain[term_pos - 1]).next = next;
        }
    }

    // `x.a` becomes the path expression `t.x.a`.
    rewrite_attr_refs(g, stmt, old_spec, new_spec, &alias, &range_name);
}

fn rewrite_attr_refs(
    g: &mut Graph,
    stmt: NodeId,
    old_spec: NodeId,
    new_spec: NodeId,
    alias: &str,
    derived_name: &str,
) {
    let NodeKind::Select(select) = &g.node(stmt).kind else {
        return;
    };
    let mut roots: Vec<NodeId> = Vec::new();
    roots.extend(g.collect_chain(select.list));
    roots.extend(g.collect_chain(select.where_clause));
    roots.extend(g.collect_chain(select.group_by));
    roots.extend(g.collect_chain(select.having));
    roots.extend(g.collect_chain(select.common.order_by));

    for root in roots {
        let matches = g.collect_nodes(root, |g, id| {
            matches!(g.node(id).as_name(), Some(n) if n.spec_id == Some(old_spec))
        });
        for name_id in matches {
            let attr_name = g.node(name_id).as_name().map(|n| n.name.clone());
            let Some(attr_name) = attr_name else {
                continue;
            };
            let ty = g.node(name_id).type_enum;
            let object_ref = g.new_name(Name {
                spec_id: Some(new_spec),
                resolved: Some(derived_name.to_string()),
                name: alias.to_string(),
                is_meta_class: false,
            });
            g.node_mut(object_ref).type_enum = TypeEnum::Object;
            let attr = g.new_name(Name {
                spec_id: Some(old_spec),
                resolved: None,
                name: attr_name,
                is_meta_class: false,
            });
            g.node_mut(attr).type_enum = ty;
            let mut dot = Node::new(NodeKind::Dot(DotExpr {
                arg1: Some(object_ref),
                arg2: Some(attr),
            }));
            dot.type_enum = ty;
            g.overwrite(name_id, dot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Expr, SelectQuery, Spec};
    use crate::value::Oid;

    fn build_statement(g: &mut Graph) -> (NodeId, NodeId, NodeId) {
        let entity = g.new_name(Name::attr(None, "c"));
        let flat = g.copy_tree(entity);
        let range_var = g.new_name(Name::attr(None, "x"));
        let spec = g.alloc(Node::new(NodeKind::Spec(Spec {
            entity_name: Some(entity),
            flat_entity_list: Some(flat),
            range_var: Some(range_var),
            ..Default::default()
        })));

        // SELECT x.a FROM c x WHERE x = OID
        let projected = g.new_name(Name {
            spec_id: Some(spec),
            resolved: Some("x".into()),
            name: "a".into(),
            is_meta_class: false,
        });
        let object_ref = g.new_name(Name {
            spec_id: Some(spec),
            resolved: None,
            name: "x".into(),
            is_meta_class: false,
        });
        g.node_mut(object_ref).type_enum = TypeEnum::Object;
        let oid = g.new_value(DbValue::Oid(Oid::new(100, 3, 0)));
        let cond = g.new_expr(Expr::binary(ExprOp::Eq, object_ref, oid));
        let stmt = g.alloc(Node::new(NodeKind::Select(SelectQuery {
            list: Some(projected),
            from: Some(spec),
            where_clause: Some(cond),
            ..Default::default()
        })));
        (stmt, spec, projected)
    }

    #[test]
    fn object_equality_becomes_set_derived_table() {
        let mut g = Graph::new();
        let (stmt, old_spec, projected) = build_statement(&mut g);
        let mut seq = 0;
        rewrite_oid_equality(&mut g, stmt, &mut seq);

        let NodeKind::Select(select) = &g.node(stmt).kind else {
            panic!("expected select");
        };
        assert!(select.where_clause.is_none(), "conjunct excised");
        let new_spec = select.from.unwrap();
        assert_ne!(new_spec, old_spec);
        let spec_node = g.node(new_spec).as_spec().unwrap();
        assert_eq!(spec_node.derived_table_type, DerivedTableType::SetExpr);
        assert_eq!(spec_node.path_entities, Some(old_spec));

        // x.a now reads through the path t0.x.a.
        assert!(matches!(g.node(projected).kind, NodeKind::Dot(_)));
        assert_eq!(g.print_node(projected), "t0.x.a");
    }

    #[test]
    fn meta_class_access_is_not_rewritten() {
        let mut g = Graph::new();
        let (stmt, spec, _) = build_statement(&mut g);
        if let Some(s) = g.node_mut(spec).as_spec_mut() {
            s.meta_class = SpecMetaClass::MetaClass;
        }
        let mut seq = 0;
        rewrite_oid_equality(&mut g, stmt, &mut seq);
        let NodeKind::Select(select) = &g.node(stmt).kind else {
            panic!("expected select");
        };
        assert!(select.where_clause.is_some(), "conjunct kept");
        assert_eq!(select.from, Some(spec));
    }

    #[test]
    fn plain_attribute_equality_is_untouched() {
        let mut g = Graph::new();
        let (stmt, spec, _) = build_statement(&mut g);
        // Rename the object reference so it no longer matches the range
        // variable.
        let NodeKind::Select(select) = &g.node(stmt).kind else {
            unreachable!();
        };
        let cond = select.where_clause.unwrap();
        let lhs = g.node(cond).as_expr().unwrap().arg1.unwrap();
        if let NodeKind::Name(n) = &mut g.node_mut(lhs).kind {
            n.name = "b".into();
        }
        let mut seq = 0;
        rewrite_oid_equality(&mut g, stmt, &mut seq);
        let NodeKind::Select(select) = &g.node(stmt).kind else {
            unreachable!();
        };
        assert!(select.where_clause.is_some());
        assert_eq!(select.from, Some(spec));
    }
}
