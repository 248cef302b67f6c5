//! Rendering of graph nodes back to SQL-shaped text.
//!
//! Used by explain output and test snapshots. Normalized predicates print
//! their RANGE form, e.g. `s RANGE ('abc' GE_LT 'abd')`, and synthesized
//! terms carry their flag marker (`[TRANSITIVE]`).

use super::arena::Graph;
use super::node::{DerivedTableType, ExprOp, FuncType, JoinType, NodeFlags, NodeId, NodeKind};

impl Graph {
    /// Renders one CNF predicate chain: conjuncts joined with AND, DNF
    /// alternatives within a conjunct joined with OR.
    pub fn print_predicate(&self, head: Option<NodeId>) -> String {
        let conjuncts = self.collect_chain(head);
        if conjuncts.is_empty() {
            return String::new();
        }
        conjuncts
            .iter()
            .map(|&id| self.print_conjunct(id))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn print_conjunct(&self, id: NodeId) -> String {
        let alts = self.collect_or_chain(Some(id));
        let rendered: Vec<String> = alts.iter().map(|&a| self.print_term(a)).collect();
        if rendered.len() == 1 {
            rendered.into_iter().next().unwrap()
        } else {
            format!("({})", rendered.join(" OR "))
        }
    }

    fn print_term(&self, id: NodeId) -> String {
        let node = self.node(id);
        let mut text = self.print_node(id);
        if node.flags.contains(NodeFlags::TRANSITIVE) {
            text.push_str(" [TRANSITIVE]");
        }
        if node.flags.contains(NodeFlags::COPYPUSH) {
            text.push_str(" [COPYPUSH]");
        }
        text
    }

    /// Renders one node (no sibling chain).
    pub fn print_node(&self, id: NodeId) -> String {
        let node = self.node(id);
        match &node.kind {
            NodeKind::Value(v) => v.to_string(),
            NodeKind::HostVar(h) => format!("?{}", h.index),
            NodeKind::Name(name) => match &name.resolved {
                Some(qualifier) => format!("{}.{}", qualifier, name.name),
                None => name.name.clone(),
            },
            NodeKind::Dot(dot) => {
                let lhs = dot.arg1.map(|a| self.print_node(a)).unwrap_or_default();
                let rhs = dot.arg2.map(|a| self.print_node(a)).unwrap_or_default();
                format!("{lhs}.{rhs}")
            }
            NodeKind::Expr(_) => self.print_expr(id),
            NodeKind::Function(f) => {
                let args = self
                    .collect_chain(f.args)
                    .iter()
                    .map(|&a| self.print_node(a))
                    .collect::<Vec<_>>()
                    .join(", ");
                match f.func {
                    FuncType::Min => format!("MIN({args})"),
                    FuncType::Max => format!("MAX({args})"),
                    FuncType::Sum => format!("SUM({args})"),
                    FuncType::Avg => format!("AVG({args})"),
                    FuncType::Count => format!("COUNT({args})"),
                    FuncType::CountStar => "COUNT(*)".to_string(),
                    FuncType::TableSet => format!("TABLE({{{args}}})"),
                    FuncType::TableSequence => format!("TABLE[{args}]"),
                }
            }
            NodeKind::Select(_)
            | NodeKind::Union(_)
            | NodeKind::Difference(_)
            | NodeKind::Intersection(_) => format!("({})", self.print_statement(id)),
            NodeKind::SortSpec(s) => {
                let mut text = s
                    .expr
                    .map(|e| self.print_node(e))
                    .or_else(|| s.pos.map(|p| p.to_string()))
                    .unwrap_or_default();
                if s.desc {
                    text.push_str(" DESC");
                }
                text
            }
            NodeKind::Spec(_) => self.print_spec(id),
            NodeKind::Update(_) | NodeKind::Delete(_) | NodeKind::Insert(_) => {
                self.print_statement(id)
            }
        }
    }

    fn print_expr(&self, id: NodeId) -> String {
        let node = self.node(id);
        let expr = match node.as_expr() {
            Some(e) => e,
            None => return String::new(),
        };
        let arg = |slot: Option<NodeId>| slot.map(|a| self.print_node(a)).unwrap_or_default();

        use ExprOp::*;
        match expr.op {
            And | Or => {
                let op = if expr.op == And { "AND" } else { "OR" };
                format!("({} {op} {})", arg(expr.arg1), arg(expr.arg2))
            }
            Not => format!("NOT ({})", arg(expr.arg1)),
            Eq => format!("{} = {}", arg(expr.arg1), arg(expr.arg2)),
            Ne => format!("{} <> {}", arg(expr.arg1), arg(expr.arg2)),
            NullsafeEq => format!("{} <=> {}", arg(expr.arg1), arg(expr.arg2)),
            Ge => format!("{} >= {}", arg(expr.arg1), arg(expr.arg2)),
            Gt => format!("{} > {}", arg(expr.arg1), arg(expr.arg2)),
            Lt => format!("{} < {}", arg(expr.arg1), arg(expr.arg2)),
            Le => format!("{} <= {}", arg(expr.arg1), arg(expr.arg2)),
            EqSome => format!("{} = SOME {}", arg(expr.arg1), arg(expr.arg2)),
            NeSome => format!("{} <> SOME {}", arg(expr.arg1), arg(expr.arg2)),
            GeSome => format!("{} >= SOME {}", arg(expr.arg1), arg(expr.arg2)),
            GtSome => format!("{} > SOME {}", arg(expr.arg1), arg(expr.arg2)),
            LtSome => format!("{} < SOME {}", arg(expr.arg1), arg(expr.arg2)),
            LeSome => format!("{} <= SOME {}", arg(expr.arg1), arg(expr.arg2)),
            EqAll => format!("{} = ALL {}", arg(expr.arg1), arg(expr.arg2)),
            NeAll => format!("{} <> ALL {}", arg(expr.arg1), arg(expr.arg2)),
            GeAll => format!("{} >= ALL {}", arg(expr.arg1), arg(expr.arg2)),
            GtAll => format!("{} > ALL {}", arg(expr.arg1), arg(expr.arg2)),
            LtAll => format!("{} < ALL {}", arg(expr.arg1), arg(expr.arg2)),
            LeAll => format!("{} <= ALL {}", arg(expr.arg1), arg(expr.arg2)),
            IsIn => {
                let rhs = self.print_in_rhs(expr.arg2);
                format!("{} IN {rhs}", arg(expr.arg1))
            }
            IsNotIn => {
                let rhs = self.print_in_rhs(expr.arg2);
                format!("{} NOT IN {rhs}", arg(expr.arg1))
            }
            IsNull => format!("{} IS NULL", arg(expr.arg1)),
            IsNotNull => format!("{} IS NOT NULL", arg(expr.arg1)),
            Like => format!("{} LIKE {}", arg(expr.arg1), arg(expr.arg2)),
            NotLike => format!("{} NOT LIKE {}", arg(expr.arg1), arg(expr.arg2)),
            Between => format!("{} BETWEEN {}", arg(expr.arg1), arg(expr.arg2)),
            NotBetween => format!("{} NOT BETWEEN {}", arg(expr.arg1), arg(expr.arg2)),
            BetweenAnd => format!("{} AND {}", arg(expr.arg1), arg(expr.arg2)),
            BetweenEqNa => format!("{} EQ_NA", arg(expr.arg1)),
            BetweenGeLe => format!("{} GE_LE {}", arg(expr.arg1), arg(expr.arg2)),
            BetweenGeLt => format!("{} GE_LT {}", arg(expr.arg1), arg(expr.arg2)),
            BetweenGtLe => format!("{} GT_LE {}", arg(expr.arg1), arg(expr.arg2)),
            BetweenGtLt => format!("{} GT_LT {}", arg(expr.arg1), arg(expr.arg2)),
            BetweenGeInf => format!("{} GE_INF", arg(expr.arg1)),
            BetweenGtInf => format!("{} GT_INF", arg(expr.arg1)),
            BetweenInfLe => format!("INF_LE {}", arg(expr.arg1)),
            BetweenInfLt => format!("INF_LT {}", arg(expr.arg1)),
            Range => {
                let subs = self
                    .collect_or_chain(expr.arg2)
                    .iter()
                    .map(|&s| self.print_node(s))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} RANGE ({subs})", arg(expr.arg1))
            }
            Plus => format!("({} + {})", arg(expr.arg1), arg(expr.arg2)),
            Minus => format!("({} - {})", arg(expr.arg1), arg(expr.arg2)),
            Times => format!("({} * {})", arg(expr.arg1), arg(expr.arg2)),
            Divide => format!("({} / {})", arg(expr.arg1), arg(expr.arg2)),
            UnaryMinus => format!("-{}", arg(expr.arg1)),
            Modulus => format!("MOD({}, {})", arg(expr.arg1), arg(expr.arg2)),
            Concat => format!("({} || {})", arg(expr.arg1), arg(expr.arg2)),
            Lower => format!("LOWER({})", arg(expr.arg1)),
            Upper => format!("UPPER({})", arg(expr.arg1)),
            Trim => format!("TRIM({})", arg(expr.arg1)),
            Substring => format!(
                "SUBSTRING({}, {}, {})",
                arg(expr.arg1),
                arg(expr.arg2),
                arg(expr.arg3)
            ),
            CharLength => format!("CHAR_LENGTH({})", arg(expr.arg1)),
            Floor => format!("FLOOR({})", arg(expr.arg1)),
            Ceil => format!("CEIL({})", arg(expr.arg1)),
            Abs => format!("ABS({})", arg(expr.arg1)),
            Round => format!("ROUND({}, {})", arg(expr.arg1), arg(expr.arg2)),
            Trunc => format!("TRUNC({}, {})", arg(expr.arg1), arg(expr.arg2)),
            Cast => format!("CAST({} AS {:?})", arg(expr.arg1), node.type_enum),
            Case => format!("CASE {} END", arg(expr.arg1)),
            Coalesce => format!("COALESCE({}, {})", arg(expr.arg1), arg(expr.arg2)),
            Ifnull => format!("IFNULL({}, {})", arg(expr.arg1), arg(expr.arg2)),
            Prior => format!("PRIOR {}", arg(expr.arg1)),
            InstNum => "INST_NUM()".to_string(),
            OrderbyNum => "ORDERBY_NUM()".to_string(),
        }
    }

    fn print_in_rhs(&self, slot: Option<NodeId>) -> String {
        match slot {
            None => "()".to_string(),
            Some(id) => {
                let node = self.node(id);
                if node.is_query() {
                    format!("({})", self.print_statement(id))
                } else {
                    let items = self
                        .collect_chain(Some(id))
                        .iter()
                        .map(|&v| self.print_node(v))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("({items})")
                }
            }
        }
    }

    fn print_spec(&self, id: NodeId) -> String {
        let node = self.node(id);
        let spec = match node.as_spec() {
            Some(s) => s,
            None => return String::new(),
        };
        let mut text = String::new();
        match spec.join_type {
            JoinType::None => {}
            JoinType::Inner => text.push_str("INNER JOIN "),
            JoinType::LeftOuter => text.push_str("LEFT OUTER JOIN "),
            JoinType::RightOuter => text.push_str("RIGHT OUTER JOIN "),
        }
        match spec.derived_table_type {
            DerivedTableType::None => {
                if let Some(name) = spec.entity_name {
                    text.push_str(&self.print_node(name));
                }
                if spec.partition_pruned {
                    let parts = self
                        .collect_chain(spec.flat_entity_list)
                        .iter()
                        .map(|&n| self.print_node(n))
                        .collect::<Vec<_>>()
                        .join(", ");
                    text.push_str(&format!(" PARTITIONS ({parts})"));
                }
            }
            DerivedTableType::Subquery | DerivedTableType::SetExpr => {
                if let Some(derived) = spec.derived_table {
                    text.push_str(&format!("({})", self.print_statement(derived)));
                }
            }
        }
        if let Some(range_var) = spec.range_var {
            // A range variable equal to the entity name adds nothing.
            let alias = self.print_node(range_var);
            let entity = spec.entity_name.map(|e| self.print_node(e));
            if entity.as_deref() != Some(alias.as_str()) {
                text.push_str(" AS ");
                text.push_str(&alias);
                let attrs = self.collect_chain(spec.as_attr_list);
                if !attrs.is_empty() {
                    let cols = attrs
                        .iter()
                        .map(|&a| self.print_node(a))
                        .collect::<Vec<_>>()
                        .join(", ");
                    text.push_str(&format!("({cols})"));
                }
            }
        }
        if let Some(on_cond) = spec.on_cond {
            text.push_str(" ON ");
            text.push_str(&self.print_predicate(Some(on_cond)));
        }
        text
    }

    /// Renders a whole statement.
    pub fn print_statement(&self, id: NodeId) -> String {
        let node = self.node(id);
        match &node.kind {
            NodeKind::Select(s) => {
                let mut text = String::from("SELECT ");
                let list = self
                    .collect_chain(s.list)
                    .iter()
                    .filter(|&&item| !self.node(item).flags.contains(NodeFlags::HIDDEN_COLUMN))
                    .map(|&item| self.print_node(item))
                    .collect::<Vec<_>>()
                    .join(", ");
                text.push_str(&list);
                let specs = self
                    .collect_chain(s.from)
                    .iter()
                    .map(|&spec| self.print_node(spec))
                    .collect::<Vec<_>>();
                if !specs.is_empty() {
                    text.push_str(" FROM ");
                    // Explicit joins render with their JOIN keyword; plain
                    // specs separate with commas.
                    let mut rendered = String::new();
                    for (i, spec_text) in specs.iter().enumerate() {
                        if i > 0 {
                            if spec_text.contains("JOIN ") {
                                rendered.push(' ');
                            } else {
                                rendered.push_str(", ");
                            }
                        }
                        rendered.push_str(spec_text);
                    }
                    text.push_str(&rendered);
                }
                if let Some(where_clause) = s.where_clause {
                    text.push_str(" WHERE ");
                    text.push_str(&self.print_predicate(Some(where_clause)));
                }
                if s.start_with.is_some() || s.connect_by.is_some() {
                    if let Some(sw) = s.start_with {
                        text.push_str(" START WITH ");
                        text.push_str(&self.print_predicate(Some(sw)));
                    }
                    if let Some(cb) = s.connect_by {
                        text.push_str(" CONNECT BY ");
                        text.push_str(&self.print_predicate(Some(cb)));
                    }
                }
                if let Some(group_by) = s.group_by {
                    text.push_str(" GROUP BY ");
                    let cols = self
                        .collect_chain(Some(group_by))
                        .iter()
                        .map(|&c| self.print_node(c))
                        .collect::<Vec<_>>()
                        .join(", ");
                    text.push_str(&cols);
                }
                if let Some(having) = s.having {
                    text.push_str(" HAVING ");
                    text.push_str(&self.print_predicate(Some(having)));
                }
                if let Some(order_by) = s.common.order_by {
                    text.push_str(" ORDER BY ");
                    let keys = self
                        .collect_chain(Some(order_by))
                        .iter()
                        .map(|&k| self.print_node(k))
                        .collect::<Vec<_>>()
                        .join(", ");
                    text.push_str(&keys);
                }
                text
            }
            NodeKind::Union(u) | NodeKind::Difference(u) | NodeKind::Intersection(u) => {
                let op = match &node.kind {
                    NodeKind::Union(q) if q.all => "UNION ALL",
                    NodeKind::Union(_) => "UNION",
                    NodeKind::Difference(_) => "EXCEPT",
                    NodeKind::Intersection(_) => "INTERSECT",
                    _ => unreachable!(),
                };
                format!(
                    "{} {op} {}",
                    u.arg1.map(|a| self.print_statement(a)).unwrap_or_default(),
                    u.arg2.map(|a| self.print_statement(a)).unwrap_or_default()
                )
            }
            NodeKind::Update(u) => {
                let mut text = String::from("UPDATE ");
                if let Some(spec) = u.spec {
                    text.push_str(&self.print_node(spec));
                }
                let assigns = self
                    .collect_chain(u.assignments)
                    .iter()
                    .map(|&a| self.print_node(a))
                    .collect::<Vec<_>>()
                    .join(", ");
                if !assigns.is_empty() {
                    text.push_str(" SET ");
                    text.push_str(&assigns);
                }
                if let Some(cond) = u.search_cond {
                    text.push_str(" WHERE ");
                    text.push_str(&self.print_predicate(Some(cond)));
                }
                text
            }
            NodeKind::Delete(d) => {
                let mut text = String::from("DELETE FROM ");
                if let Some(spec) = d.spec {
                    text.push_str(&self.print_node(spec));
                }
                if let Some(cond) = d.search_cond {
                    text.push_str(" WHERE ");
                    text.push_str(&self.print_predicate(Some(cond)));
                }
                text
            }
            NodeKind::Insert(i) => {
                let mut text = String::from("INSERT INTO ");
                if let Some(spec) = i.spec {
                    text.push_str(&self.print_node(spec));
                }
                let attrs = self
                    .collect_chain(i.attr_list)
                    .iter()
                    .map(|&a| self.print_node(a))
                    .collect::<Vec<_>>()
                    .join(", ");
                if !attrs.is_empty() {
                    text.push_str(&format!(" ({attrs})"));
                }
                if let Some(value_clause) = i.value_clause {
                    let value_node = self.node(value_clause);
                    if value_node.is_query() {
                        text.push(' ');
                        text.push_str(&self.print_statement(value_clause));
                    } else {
                        let values = self
                            .collect_chain(Some(value_clause))
                            .iter()
                            .map(|&v| self.print_node(v))
                            .collect::<Vec<_>>()
                            .join(", ");
                        text.push_str(&format!(" VALUES ({values})"));
                    }
                }
                text
            }
            _ => self.print_node(id),
        }
    }
}

/// Short display of a node for diagnostics, truncated for log lines.
pub fn short_print(graph: &Graph, id: NodeId) -> String {
    graph.print_node(id).chars().take(48).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{Expr, Name, Node};
    use crate::value::DbValue;

    #[test]
    fn renders_range_atom() {
        let mut g = Graph::new();
        let spec = g.alloc(Node::new(NodeKind::Spec(Default::default())));
        let attr = g.new_name(Name {
            spec_id: Some(spec),
            resolved: None,
            name: "s".into(),
            is_meta_class: false,
        });
        let lo = g.new_value(DbValue::Str("abc".into()));
        let hi = g.new_value(DbValue::Str("abd".into()));
        let sub = g.new_expr(Expr::binary(ExprOp::BetweenGeLt, lo, hi));
        let range = g.new_expr(Expr::binary(ExprOp::Range, attr, sub));
        assert_eq!(g.print_predicate(Some(range)), "s RANGE ('abc' GE_LT 'abd')");
    }

    #[test]
    fn renders_dnf_alternatives_in_parens() {
        let mut g = Graph::new();
        let a = g.new_value(DbValue::Int(1));
        let b = g.new_value(DbValue::Int(2));
        let e1 = g.new_expr(Expr::binary(ExprOp::Eq, a, b));
        let c = g.new_value(DbValue::Int(3));
        let d = g.new_value(DbValue::Int(4));
        let e2 = g.new_expr(Expr::binary(ExprOp::Eq, c, d));
        g.node_mut(e1).or_next = Some(e2);
        assert_eq!(g.print_predicate(Some(e1)), "(1 = 2 OR 3 = 4)");
    }

    #[test]
    fn renders_transitive_marker() {
        let mut g = Graph::new();
        let a = g.new_value(DbValue::Int(1));
        let b = g.new_value(DbValue::Int(1));
        let e = g.new_expr(Expr::binary(ExprOp::Eq, a, b));
        g.node_mut(e).flags.set(NodeFlags::TRANSITIVE);
        assert_eq!(g.print_predicate(Some(e)), "1 = 1 [TRANSITIVE]");
    }
}
