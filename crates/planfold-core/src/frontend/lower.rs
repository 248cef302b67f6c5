//! Lowering of the `sqlparser` AST into the arena graph.

use crate::graph::{
    DeleteStmt, DotExpr, Expr, ExprOp, FuncType, FunctionCall, Graph, InsertStmt, JoinType, Name,
    Node, NodeFlags, NodeId, NodeKind, SelectQuery, SetOpQuery, SortSpec, Spec, SpecMetaClass,
    TypeEnum, UpdateStmt, WalkControl,
};
use crate::types::{issue_codes, Issue};
use crate::value::DbValue;
use sqlparser::ast::{
    self, BinaryOperator, Delete, FromTable, GroupByExpr, Insert, Join, JoinConstraint,
    JoinOperator, ObjectName, Query, Select, SelectItem, SetExpr, SetOperator, SetQuantifier,
    Statement, TableFactor, TableWithJoins, UnaryOperator, Value,
};

/// One name-resolution scope; every SELECT body gets its own.
#[derive(Debug, Default)]
struct Scope {
    /// Lower-cased alias or entity name, and the spec it denotes.
    entries: Vec<(String, NodeId)>,
    /// A name inside this scope resolved to an enclosing scope.
    correlated: bool,
}

/// Lowers one `sqlparser` statement into a [`Graph`].
pub struct Lowerer<'a> {
    graph: &'a mut Graph,
    statement_index: usize,
    scopes: Vec<Scope>,
}

impl<'a> Lowerer<'a> {
    pub fn new(graph: &'a mut Graph, statement_index: usize) -> Self {
        Self {
            graph,
            statement_index,
            scopes: Vec::new(),
        }
    }

    fn issue(&mut self, issue: Issue) {
        let issue = issue.with_statement(self.statement_index);
        self.graph.add_issue(issue);
    }

    fn unsupported(&mut self, what: &str) {
        self.issue(Issue::warning(
            issue_codes::UNSUPPORTED_SYNTAX,
            format!("{what} is not lowered; statement handled conservatively"),
        ));
    }

    /// Lowers one statement; `None` when the statement kind is outside the
    /// rewriter's scope (DDL and friends pass through untouched).
    pub fn lower_statement(&mut self, statement: &Statement) -> Option<NodeId> {
        match statement {
            Statement::Query(query) => self.lower_query(query, false),
            Statement::Insert(insert) => self.lower_insert(insert),
            Statement::Update {
                table,
                assignments,
                selection,
                ..
            } => self.lower_update(table, assignments, selection.as_ref()),
            Statement::Delete(delete) => self.lower_delete(delete),
            _ => None,
        }
    }

    // ---- queries ----

    fn lower_query(&mut self, query: &Query, is_subquery: bool) -> Option<NodeId> {
        if query.with.is_some() {
            self.unsupported("WITH clause");
        }
        let body = self.lower_set_expr(&query.body, is_subquery)?;

        if let Some(order_by) = &query.order_by {
            if let ast::OrderByKind::Expressions(order_exprs) = &order_by.kind {
                let select_list = match &self.graph.node(body).kind {
                    NodeKind::Select(s) => self.graph.collect_chain(s.list),
                    _ => Vec::new(),
                };
                let mut head: Option<NodeId> = None;
                for order_expr in order_exprs {
                    let sort = self.lower_sort_spec(order_expr, &select_list);
                    head = Some(self.graph.append_to_chain(head, sort));
                }
                self.set_order_by(body, head);
            }
        }
        Some(body)
    }

    fn set_order_by(&mut self, query: NodeId, order_by: Option<NodeId>) {
        match &mut self.graph.node_mut(query).kind {
            NodeKind::Select(s) => s.common.order_by = order_by,
            NodeKind::Union(u) | NodeKind::Difference(u) | NodeKind::Intersection(u) => {
                u.common.order_by = order_by
            }
            _ => {}
        }
    }

    fn lower_sort_spec(&mut self, order_expr: &ast::OrderByExpr, select_list: &[NodeId]) -> NodeId {
        let desc = order_expr.options.asc == Some(false);

        // A bare number is a 1-based position into the select list.
        if let ast::Expr::Value(value) = &order_expr.expr {
            if let Value::Number(n, _) = &value.value {
                if let Ok(pos) = n.parse::<usize>() {
                    let expr = select_list.get(pos.saturating_sub(1)).copied();
                    return self.alloc_sort_spec(expr, Some(pos), desc);
                }
            }
        }

        let lowered = self.lower_expr(&order_expr.expr);
        // Share the select-list node when the key is the same expression,
        // so downstream passes see one identity.
        let printed = self.graph.print_node(lowered);
        for (i, &item) in select_list.iter().enumerate() {
            if self.graph.print_node(item) == printed {
                return self.alloc_sort_spec(Some(item), Some(i + 1), desc);
            }
        }
        self.alloc_sort_spec(Some(lowered), None, desc)
    }

    fn alloc_sort_spec(&mut self, expr: Option<NodeId>, pos: Option<usize>, desc: bool) -> NodeId {
        let mut node = Node::new(NodeKind::SortSpec(SortSpec { expr, pos, desc }));
        if desc {
            node.flags.set(NodeFlags::DESC_ORDER);
        }
        self.graph.alloc(node)
    }

    fn lower_set_expr(&mut self, set_expr: &SetExpr, is_subquery: bool) -> Option<NodeId> {
        match set_expr {
            SetExpr::Select(select) => self.lower_select(select, is_subquery),
            SetExpr::Query(query) => self.lower_query(query, is_subquery),
            SetExpr::SetOperation {
                op,
                set_quantifier,
                left,
                right,
            } => {
                let arg1 = self.lower_set_expr(left, is_subquery);
                let arg2 = self.lower_set_expr(right, is_subquery);
                let payload = SetOpQuery {
                    common: crate::graph::QueryCommon {
                        is_subquery,
                        ..Default::default()
                    },
                    arg1,
                    arg2,
                    all: matches!(set_quantifier, SetQuantifier::All),
                };
                let kind = match op {
                    SetOperator::Union => NodeKind::Union(payload),
                    SetOperator::Except => NodeKind::Difference(payload),
                    SetOperator::Intersect => NodeKind::Intersection(payload),
                    _ => {
                        self.unsupported("set operator");
                        return arg1;
                    }
                };
                Some(self.graph.alloc(Node::new(kind)))
            }
            _ => {
                self.unsupported("set expression");
                None
            }
        }
    }

    fn lower_select(&mut self, select: &Select, is_subquery: bool) -> Option<NodeId> {
        self.scopes.push(Scope::default());

        let mut from: Option<NodeId> = None;
        let mut location: u16 = 0;
        for table_with_joins in &select.from {
            from = self.lower_table_with_joins(table_with_joins, from, &mut location);
        }

        let where_clause = select.selection.as_ref().map(|e| self.lower_expr(e));

        let (start_with, connect_by) = match &select.connect_by {
            None => (None, None),
            Some(cb) => {
                let start_with = Some(self.lower_expr(&cb.condition));
                let mut connect: Option<NodeId> = None;
                for relationship in &cb.relationships {
                    let lowered = self.lower_expr(relationship);
                    connect = Some(match connect {
                        None => lowered,
                        Some(acc) => self
                            .graph
                            .new_expr(Expr::binary(ExprOp::And, acc, lowered)),
                    });
                }
                (start_with, connect)
            }
        };

        let group_by = match &select.group_by {
            GroupByExpr::Expressions(exprs, _) if !exprs.is_empty() => {
                let mut head: Option<NodeId> = None;
                for expr in exprs {
                    let lowered = self.lower_expr(expr);
                    head = Some(self.graph.append_to_chain(head, lowered));
                }
                head
            }
            _ => None,
        };
        let having = select.having.as_ref().map(|e| self.lower_expr(e));

        let mut list: Option<NodeId> = None;
        for item in &select.projection {
            let lowered = match item {
                SelectItem::UnnamedExpr(expr) => self.lower_expr(expr),
                SelectItem::ExprWithAlias { expr, .. } => self.lower_expr(expr),
                SelectItem::Wildcard(_) => self.graph.new_name(Name::attr(None, "*")),
                SelectItem::QualifiedWildcard(kind, _) => {
                    let qualifier = kind.to_string();
                    self.graph.new_name(Name::attr(None, qualifier + ".*"))
                }
            };
            list = Some(self.graph.append_to_chain(list, lowered));
        }

        let scope = self.scopes.pop().unwrap_or_default();
        let select_query = SelectQuery {
            common: crate::graph::QueryCommon {
                is_subquery,
                correlation_level: u32::from(scope.correlated),
                ..Default::default()
            },
            list,
            from,
            where_clause,
            start_with,
            connect_by,
            after_cb_filter: None,
            group_by,
            having,
            ordered_hint: false,
            single_table_opt: false,
            cannot_prepare: false,
            partition_pruned: false,
        };
        Some(self.graph.alloc(Node::new(NodeKind::Select(select_query))))
    }

    // ---- FROM clause ----

    fn lower_table_with_joins(
        &mut self,
        table_with_joins: &TableWithJoins,
        mut chain: Option<NodeId>,
        location: &mut u16,
    ) -> Option<NodeId> {
        if let Some(spec) = self.lower_table_factor(&table_with_joins.relation) {
            self.graph.node_mut(spec).location = *location;
            *location += 1;
            chain = Some(self.graph.append_to_chain(chain, spec));
        }
        for join in &table_with_joins.joins {
            chain = self.lower_join(join, chain, location);
        }
        chain
    }

    fn lower_join(
        &mut self,
        join: &Join,
        chain: Option<NodeId>,
        location: &mut u16,
    ) -> Option<NodeId> {
        let (join_type, constraint) = match &join.join_operator {
            JoinOperator::Join(c) | JoinOperator::Inner(c) => (JoinType::Inner, Some(c)),
            JoinOperator::Left(c) | JoinOperator::LeftOuter(c) => (JoinType::LeftOuter, Some(c)),
            JoinOperator::Right(c) | JoinOperator::RightOuter(c) => {
                (JoinType::RightOuter, Some(c))
            }
            JoinOperator::CrossJoin(c) => (JoinType::Inner, Some(c)),
            other => {
                self.unsupported(&format!("join operator {other:?}"));
                (JoinType::Inner, None)
            }
        };

        let spec = self.lower_table_factor(&join.relation)?;
        let loc = *location;
        *location += 1;
        self.graph.node_mut(spec).location = loc;

        let on_cond = match constraint {
            Some(JoinConstraint::On(expr)) => {
                let lowered = self.lower_expr(expr);
                // Every term of the ON tree carries the joined spec's
                // location so CNF conversion keeps the group together.
                self.graph.walk_tree_pre(lowered, &mut |g, id| {
                    g.node_mut(id).location = loc;
                    WalkControl::Continue
                });
                Some(lowered)
            }
            Some(JoinConstraint::None) | None => None,
            Some(other) => {
                self.unsupported(&format!("join constraint {other:?}"));
                None
            }
        };

        if let Some(spec_node) = self.graph.node_mut(spec).as_spec_mut() {
            spec_node.join_type = join_type;
            spec_node.on_cond = on_cond;
        }
        Some(self.graph.append_to_chain(chain, spec))
    }

    fn lower_table_factor(&mut self, table_factor: &TableFactor) -> Option<NodeId> {
        match table_factor {
            TableFactor::Table { name, alias, .. } => {
                let entity = normalize_object_name(name);
                let entity_name = self.graph.new_name(Name {
                    spec_id: None,
                    resolved: None,
                    name: entity.clone(),
                    is_meta_class: false,
                });
                let flat = self.graph.copy_tree(entity_name);
                let range_var_name = alias
                    .as_ref()
                    .map(|a| a.name.value.to_lowercase())
                    .unwrap_or_else(|| entity.clone());
                let range_var = self.graph.new_name(Name::attr(None, range_var_name.clone()));

                let spec = self.graph.alloc(Node::new(NodeKind::Spec(Spec {
                    entity_name: Some(entity_name),
                    flat_entity_list: Some(flat),
                    range_var: Some(range_var),
                    meta_class: SpecMetaClass::Class,
                    ..Default::default()
                })));
                self.register_spec(&range_var_name, spec);
                Some(spec)
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                let derived = self.lower_query(subquery, true)?;
                let (range_var_name, as_attrs) = match alias {
                    Some(a) => {
                        let cols: Vec<String> = a
                            .columns
                            .iter()
                            .map(|c| c.name.value.to_lowercase())
                            .collect();
                        (a.name.value.to_lowercase(), cols)
                    }
                    None => (String::from("dt"), Vec::new()),
                };
                let range_var = self.graph.new_name(Name::attr(None, range_var_name.clone()));
                let mut as_attr_list: Option<NodeId> = None;
                for col in as_attrs {
                    let name = self.graph.new_name(Name::attr(None, col));
                    as_attr_list = Some(self.graph.append_to_chain(as_attr_list, name));
                }
                let spec = self.graph.alloc(Node::new(NodeKind::Spec(Spec {
                    derived_table: Some(derived),
                    derived_table_type: crate::graph::DerivedTableType::Subquery,
                    range_var: Some(range_var),
                    as_attr_list,
                    meta_class: SpecMetaClass::Class,
                    ..Default::default()
                })));
                self.register_spec(&range_var_name, spec);
                Some(spec)
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => {
                let mut location = 0;
                self.lower_table_with_joins(table_with_joins, None, &mut location)
            }
            other => {
                self.unsupported(&format!("table factor {other:?}"));
                None
            }
        }
    }

    fn register_spec(&mut self, key: &str, spec: NodeId) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.entries.push((key.to_string(), spec));
        }
    }

    // ---- DML ----

    fn lower_insert(&mut self, insert: &Insert) -> Option<NodeId> {
        self.scopes.push(Scope::default());
        let table_name = match &insert.table {
            ast::TableObject::TableName(name) => name,
            other => {
                self.unsupported(&format!("insert table {other:?}"));
                return None;
            }
        };
        let spec = self.lower_entity_spec(table_name);

        let mut attr_list: Option<NodeId> = None;
        for column in &insert.columns {
            let name = self.graph.new_name(Name {
                spec_id: Some(spec),
                resolved: None,
                name: column.value.to_lowercase(),
                is_meta_class: false,
            });
            attr_list = Some(self.graph.append_to_chain(attr_list, name));
        }

        let value_clause = match insert.source.as_deref() {
            None => None,
            Some(query) => match query.body.as_ref() {
                SetExpr::Values(values) => {
                    if values.rows.len() > 1 {
                        self.unsupported("multi-row VALUES");
                    }
                    let mut head: Option<NodeId> = None;
                    if let Some(row) = values.rows.first() {
                        for expr in row {
                            let lowered = self.lower_expr(expr);
                            head = Some(self.graph.append_to_chain(head, lowered));
                        }
                    }
                    head
                }
                _ => self.lower_query(query, true),
            },
        };

        self.scopes.pop();
        Some(self.graph.alloc(Node::new(NodeKind::Insert(InsertStmt {
            spec: Some(spec),
            attr_list,
            value_clause,
        }))))
    }

    fn lower_update(
        &mut self,
        table: &TableWithJoins,
        assignments: &[ast::Assignment],
        selection: Option<&ast::Expr>,
    ) -> Option<NodeId> {
        self.scopes.push(Scope::default());
        let mut location = 0;
        let spec = self.lower_table_with_joins(table, None, &mut location);

        let mut assignment_chain: Option<NodeId> = None;
        for assignment in assignments {
            let target = match &assignment.target {
                ast::AssignmentTarget::ColumnName(name) => {
                    let attr = last_segment(name);
                    let resolved = self.resolve_name(None, &attr);
                    self.graph.new_name(resolved)
                }
                other => {
                    self.unsupported(&format!("assignment target {other:?}"));
                    continue;
                }
            };
            let value = self.lower_expr(&assignment.value);
            let assign = self.graph.new_expr(Expr::binary(ExprOp::Eq, target, value));
            assignment_chain = Some(self.graph.append_to_chain(assignment_chain, assign));
        }

        let search_cond = selection.map(|e| self.lower_expr(e));
        self.scopes.pop();
        Some(self.graph.alloc(Node::new(NodeKind::Update(UpdateStmt {
            spec,
            assignments: assignment_chain,
            search_cond,
            cannot_prepare: false,
            partition_pruned: false,
        }))))
    }

    fn lower_delete(&mut self, delete: &Delete) -> Option<NodeId> {
        self.scopes.push(Scope::default());
        let tables = match &delete.from {
            FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
        };
        let mut spec: Option<NodeId> = None;
        let mut location = 0;
        for table in tables {
            spec = self.lower_table_with_joins(table, spec, &mut location);
        }
        let search_cond = delete.selection.as_ref().map(|e| self.lower_expr(e));
        self.scopes.pop();
        Some(self.graph.alloc(Node::new(NodeKind::Delete(DeleteStmt {
            spec,
            search_cond,
            cannot_prepare: false,
            partition_pruned: false,
        }))))
    }

    fn lower_entity_spec(&mut self, name: &ObjectName) -> NodeId {
        let entity = normalize_object_name(name);
        let entity_name = self.graph.new_name(Name::attr(None, entity.clone()));
        let flat = self.graph.copy_tree(entity_name);
        let range_var = self.graph.new_name(Name::attr(None, entity.clone()));
        let spec = self.graph.alloc(Node::new(NodeKind::Spec(Spec {
            entity_name: Some(entity_name),
            flat_entity_list: Some(flat),
            range_var: Some(range_var),
            meta_class: SpecMetaClass::Class,
            ..Default::default()
        })));
        self.register_spec(&entity, spec);
        spec
    }

    // ---- expressions ----

    pub fn lower_expr(&mut self, expr: &ast::Expr) -> NodeId {
        use ast::Expr as E;
        match expr {
            E::Identifier(ident) => {
                let lowered = ident.value.to_lowercase();
                if lowered == "rownum" {
                    return self.graph.new_expr(Expr {
                        op: ExprOp::InstNum,
                        arg1: None,
                        arg2: None,
                        arg3: None,
                    });
                }
                let name = self.resolve_name(None, &lowered);
                self.graph.new_name(name)
            }
            E::CompoundIdentifier(idents) => match idents.as_slice() {
                [qualifier, name] => {
                    let resolved = self.resolve_name(
                        Some(&qualifier.value.to_lowercase()),
                        &name.value.to_lowercase(),
                    );
                    self.graph.new_name(resolved)
                }
                _ => {
                    // Longer paths become DOT expressions over the head.
                    let head_name = self.resolve_name(
                        Some(&idents[0].value.to_lowercase()),
                        &idents[1].value.to_lowercase(),
                    );
                    let mut acc = self.graph.new_name(head_name);
                    for step in &idents[2..] {
                        let attr = self
                            .graph
                            .new_name(Name::attr(None, step.value.to_lowercase()));
                        acc = self.graph.alloc(Node::new(NodeKind::Dot(DotExpr {
                            arg1: Some(acc),
                            arg2: Some(attr),
                        })));
                    }
                    acc
                }
            },
            E::Value(value) => self.lower_value(&value.value),
            E::BinaryOp { left, op, right } => {
                let mapped = match op {
                    BinaryOperator::And => ExprOp::And,
                    BinaryOperator::Or => ExprOp::Or,
                    BinaryOperator::Eq => ExprOp::Eq,
                    BinaryOperator::NotEq => ExprOp::Ne,
                    BinaryOperator::Spaceship => ExprOp::NullsafeEq,
                    BinaryOperator::Gt => ExprOp::Gt,
                    BinaryOperator::GtEq => ExprOp::Ge,
                    BinaryOperator::Lt => ExprOp::Lt,
                    BinaryOperator::LtEq => ExprOp::Le,
                    BinaryOperator::Plus => ExprOp::Plus,
                    BinaryOperator::Minus => ExprOp::Minus,
                    BinaryOperator::Multiply => ExprOp::Times,
                    BinaryOperator::Divide => ExprOp::Divide,
                    BinaryOperator::Modulo => ExprOp::Modulus,
                    BinaryOperator::StringConcat => ExprOp::Concat,
                    other => {
                        self.unsupported(&format!("binary operator {other:?}"));
                        ExprOp::Concat
                    }
                };
                let lhs = self.lower_expr(left);
                let rhs = self.lower_expr(right);
                self.graph.new_expr(Expr::binary(mapped, lhs, rhs))
            }
            E::UnaryOp { op, expr } => match op {
                UnaryOperator::Not => {
                    let inner = self.lower_expr(expr);
                    self.graph.new_expr(Expr::unary(ExprOp::Not, inner))
                }
                UnaryOperator::Minus => {
                    // Negative literals fold immediately.
                    let inner = self.lower_expr(expr);
                    match self.graph.node(inner).as_value() {
                        Some(DbValue::Int(v)) => {
                            let folded = -v;
                            self.graph.new_value(DbValue::Int(folded))
                        }
                        Some(DbValue::Double(v)) => {
                            let folded = -v;
                            self.graph.new_value(DbValue::Double(folded))
                        }
                        _ => self.graph.new_expr(Expr::unary(ExprOp::UnaryMinus, inner)),
                    }
                }
                UnaryOperator::Plus => self.lower_expr(expr),
                other => {
                    self.unsupported(&format!("unary operator {other:?}"));
                    self.lower_expr(expr)
                }
            },
            E::Nested(inner) => self.lower_expr(inner),
            E::IsNull(inner) => {
                let arg = self.lower_expr(inner);
                self.graph.new_expr(Expr::unary(ExprOp::IsNull, arg))
            }
            E::IsNotNull(inner) => {
                let arg = self.lower_expr(inner);
                self.graph.new_expr(Expr::unary(ExprOp::IsNotNull, arg))
            }
            E::Between {
                expr,
                negated,
                low,
                high,
            } => {
                let attr = self.lower_expr(expr);
                let lo = self.lower_expr(low);
                let hi = self.lower_expr(high);
                let bounds = self.graph.new_expr(Expr::binary(ExprOp::BetweenAnd, lo, hi));
                let op = if *negated {
                    ExprOp::NotBetween
                } else {
                    ExprOp::Between
                };
                self.graph.new_expr(Expr::binary(op, attr, bounds))
            }
            E::InList {
                expr,
                list,
                negated,
            } => {
                let attr = self.lower_expr(expr);
                let mut head: Option<NodeId> = None;
                for item in list {
                    let lowered = self.lower_expr(item);
                    head = Some(self.graph.append_to_chain(head, lowered));
                }
                let op = if *negated {
                    ExprOp::IsNotIn
                } else {
                    ExprOp::IsIn
                };
                self.graph.new_expr(Expr {
                    op,
                    arg1: Some(attr),
                    arg2: head,
                    arg3: None,
                })
            }
            E::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                let attr = self.lower_expr(expr);
                let subquery = self.lower_query(subquery, true);
                let op = if *negated {
                    ExprOp::IsNotIn
                } else {
                    ExprOp::IsIn
                };
                self.graph.new_expr(Expr {
                    op,
                    arg1: Some(attr),
                    arg2: subquery,
                    arg3: None,
                })
            }
            E::Subquery(query) => {
                let lowered = self.lower_query(query, true);
                if let Some(id) = lowered {
                    match &mut self.graph.node_mut(id).kind {
                        NodeKind::Select(s) => s.common.single_tuple = true,
                        NodeKind::Union(u)
                        | NodeKind::Difference(u)
                        | NodeKind::Intersection(u) => u.common.single_tuple = true,
                        _ => {}
                    }
                }
                lowered.unwrap_or_else(|| self.opaque("subquery"))
            }
            E::AnyOp {
                left,
                compare_op,
                right,
                ..
            } => self.lower_quantified(left, compare_op, right, true),
            E::AllOp {
                left,
                compare_op,
                right,
            } => self.lower_quantified(left, compare_op, right, false),
            E::Like {
                negated,
                expr,
                pattern,
                ..
            } => {
                let attr = self.lower_expr(expr);
                let pat = self.lower_expr(pattern);
                let op = if *negated {
                    ExprOp::NotLike
                } else {
                    ExprOp::Like
                };
                self.graph.new_expr(Expr::binary(op, attr, pat))
            }
            E::Function(func) => self.lower_function(func),
            E::Cast {
                expr, data_type, ..
            } => {
                let inner = self.lower_expr(expr);
                let cast = self.graph.new_expr(Expr::unary(ExprOp::Cast, inner));
                self.graph.node_mut(cast).type_enum = lower_data_type(data_type);
                cast
            }
            E::Prior(inner) => {
                let arg = self.lower_expr(inner);
                let prior = self.graph.new_expr(Expr::unary(ExprOp::Prior, arg));
                self.graph.node_mut(prior).flags.set(NodeFlags::PRIOR);
                prior
            }
            E::Case {
                operand,
                conditions,
                else_result,
                ..
            } => {
                let mut head: Option<NodeId> = None;
                if let Some(op) = operand {
                    let lowered = self.lower_expr(op);
                    head = Some(self.graph.append_to_chain(head, lowered));
                }
                for when in conditions {
                    let lowered = self.lower_expr(&when.condition);
                    head = Some(self.graph.append_to_chain(head, lowered));
                    let lowered = self.lower_expr(&when.result);
                    head = Some(self.graph.append_to_chain(head, lowered));
                }
                if let Some(else_result) = else_result {
                    let lowered = self.lower_expr(else_result);
                    head = Some(self.graph.append_to_chain(head, lowered));
                }
                self.graph.new_expr(Expr {
                    op: ExprOp::Case,
                    arg1: head,
                    arg2: None,
                    arg3: None,
                })
            }
            other => {
                self.unsupported(&format!("expression {other:?}"));
                self.opaque("expr")
            }
        }
    }

    fn lower_quantified(
        &mut self,
        left: &ast::Expr,
        compare_op: &BinaryOperator,
        right: &ast::Expr,
        some: bool,
    ) -> NodeId {
        let op = match (compare_op, some) {
            (BinaryOperator::Eq, true) => ExprOp::EqSome,
            (BinaryOperator::NotEq, true) => ExprOp::NeSome,
            (BinaryOperator::Gt, true) => ExprOp::GtSome,
            (BinaryOperator::GtEq, true) => ExprOp::GeSome,
            (BinaryOperator::Lt, true) => ExprOp::LtSome,
            (BinaryOperator::LtEq, true) => ExprOp::LeSome,
            (BinaryOperator::Eq, false) => ExprOp::EqAll,
            (BinaryOperator::NotEq, false) => ExprOp::NeAll,
            (BinaryOperator::Gt, false) => ExprOp::GtAll,
            (BinaryOperator::GtEq, false) => ExprOp::GeAll,
            (BinaryOperator::Lt, false) => ExprOp::LtAll,
            (BinaryOperator::LtEq, false) => ExprOp::LeAll,
            _ => {
                self.unsupported("quantified comparison operator");
                ExprOp::EqSome
            }
        };
        let lhs = self.lower_expr(left);
        let rhs = match right {
            ast::Expr::Subquery(query) => self
                .lower_query(query, true)
                .unwrap_or_else(|| self.opaque("subquery")),
            other => self.lower_expr(other),
        };
        self.graph.new_expr(Expr::binary(op, lhs, rhs))
    }

    fn lower_function(&mut self, func: &ast::Function) -> NodeId {
        let name = func.name.to_string().to_lowercase();
        let args = self.lower_function_args(func);

        match name.as_str() {
            "min" | "max" | "sum" | "avg" | "count" => {
                let func_type = match name.as_str() {
                    "min" => FuncType::Min,
                    "max" => FuncType::Max,
                    "sum" => FuncType::Sum,
                    "avg" => FuncType::Avg,
                    _ => {
                        if args.is_empty() {
                            FuncType::CountStar
                        } else {
                            FuncType::Count
                        }
                    }
                };
                let mut head: Option<NodeId> = None;
                for arg in args {
                    head = Some(self.graph.append_to_chain(head, arg));
                }
                self.graph.alloc(Node::new(NodeKind::Function(FunctionCall {
                    func: func_type,
                    args: head,
                })))
            }
            "inst_num" => self.graph.new_expr(Expr {
                op: ExprOp::InstNum,
                arg1: None,
                arg2: None,
                arg3: None,
            }),
            "orderby_num" => self.graph.new_expr(Expr {
                op: ExprOp::OrderbyNum,
                arg1: None,
                arg2: None,
                arg3: None,
            }),
            "lower" | "upper" | "trim" | "char_length" | "floor" | "ceil" | "abs" => {
                let op = match name.as_str() {
                    "lower" => ExprOp::Lower,
                    "upper" => ExprOp::Upper,
                    "trim" => ExprOp::Trim,
                    "char_length" => ExprOp::CharLength,
                    "floor" => ExprOp::Floor,
                    "ceil" => ExprOp::Ceil,
                    _ => ExprOp::Abs,
                };
                match args.first() {
                    Some(&arg) => self.graph.new_expr(Expr::unary(op, arg)),
                    None => self.opaque(&name),
                }
            }
            "round" | "trunc" | "mod" => {
                let op = match name.as_str() {
                    "round" => ExprOp::Round,
                    "trunc" => ExprOp::Trunc,
                    _ => ExprOp::Modulus,
                };
                match (args.first(), args.get(1)) {
                    (Some(&a), Some(&b)) => self.graph.new_expr(Expr::binary(op, a, b)),
                    (Some(&a), None) => {
                        let zero = self.graph.new_value(DbValue::Int(0));
                        self.graph.new_expr(Expr::binary(op, a, zero))
                    }
                    _ => self.opaque(&name),
                }
            }
            "substring" | "substr" => {
                let arg1 = args.first().copied();
                let arg2 = args.get(1).copied();
                let arg3 = args.get(2).copied();
                self.graph.new_expr(Expr {
                    op: ExprOp::Substring,
                    arg1,
                    arg2,
                    arg3,
                })
            }
            "coalesce" | "nvl" => {
                let arg1 = args.first().copied();
                let arg2 = args.get(1).copied();
                self.graph.new_expr(Expr {
                    op: ExprOp::Coalesce,
                    arg1,
                    arg2,
                    arg3: None,
                })
            }
            "ifnull" | "isnull" => {
                let arg1 = args.first().copied();
                let arg2 = args.get(1).copied();
                self.graph.new_expr(Expr {
                    op: ExprOp::Ifnull,
                    arg1,
                    arg2,
                    arg3: None,
                })
            }
            _ => {
                self.unsupported(&format!("function {name}"));
                self.opaque(&name)
            }
        }
    }

    fn lower_function_args(&mut self, func: &ast::Function) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let ast::FunctionArguments::List(arg_list) = &func.args {
            for arg in &arg_list.args {
                if let ast::FunctionArg::Unnamed(ast::FunctionArgExpr::Expr(expr)) = arg {
                    out.push(self.lower_expr(expr));
                }
            }
        }
        out
    }

    fn lower_value(&mut self, value: &Value) -> NodeId {
        match value {
            Value::Number(text, _) => {
                if let Ok(v) = text.parse::<i64>() {
                    self.graph.new_value(DbValue::Int(v))
                } else if let Ok(v) = text.parse::<f64>() {
                    self.graph.new_value(DbValue::Double(v))
                } else {
                    self.opaque("number")
                }
            }
            Value::SingleQuotedString(s) | Value::DoubleQuotedString(s) => {
                self.graph.new_value(DbValue::Str(s.clone()))
            }
            Value::Boolean(b) => self.graph.new_bool(*b),
            Value::Null => self.graph.new_value(DbValue::Null),
            Value::Placeholder(_) => self.graph.new_host_var(),
            other => {
                self.unsupported(&format!("literal {other:?}"));
                self.opaque("literal")
            }
        }
    }

    /// Placeholder node for constructs the lowerer cannot express; opaque
    /// to every pass (neither attribute nor constant).
    fn opaque(&mut self, label: &str) -> NodeId {
        self.graph.new_name(Name::attr(None, format!("<{label}>")))
    }

    // ---- name resolution ----

    fn resolve_name(&mut self, qualifier: Option<&str>, name: &str) -> Name {
        let depth = self.scopes.len();
        for (level, scope_index) in (0..depth).rev().enumerate() {
            let scope = &self.scopes[scope_index];
            let hit = match qualifier {
                Some(q) => scope
                    .entries
                    .iter()
                    .find(|(key, _)| key == q)
                    .map(|(key, spec)| (key.clone(), *spec)),
                None => {
                    if scope.entries.len() == 1 {
                        let (key, spec) = &scope.entries[0];
                        Some((key.clone(), *spec))
                    } else {
                        None
                    }
                }
            };
            if let Some((key, spec)) = hit {
                if level > 0 {
                    // Resolved in an enclosing scope: the current query is
                    // correlated.
                    if let Some(inner) = self.scopes.last_mut() {
                        inner.correlated = true;
                    }
                }
                return Name {
                    spec_id: Some(spec),
                    resolved: Some(key),
                    name: name.to_string(),
                    is_meta_class: false,
                };
            }
        }
        if qualifier.is_some() {
            self.issue(Issue::warning(
                issue_codes::UNRESOLVED_REFERENCE,
                format!(
                    "reference '{}.{}' does not match any FROM entry",
                    qualifier.unwrap_or_default(),
                    name
                ),
            ));
        }
        Name {
            spec_id: None,
            resolved: qualifier.map(str::to_string),
            name: name.to_string(),
            is_meta_class: false,
        }
    }
}

fn normalize_object_name(name: &ObjectName) -> String {
    name.to_string().to_lowercase()
}

fn last_segment(name: &ObjectName) -> String {
    name.to_string()
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

fn lower_data_type(data_type: &ast::DataType) -> TypeEnum {
    use ast::DataType as D;
    match data_type {
        D::Int(_) | D::Integer(_) | D::SmallInt(_) | D::BigInt(_) | D::TinyInt(_) => {
            TypeEnum::Integer
        }
        D::Float(_) | D::Double(_) | D::DoublePrecision | D::Real | D::Numeric(_)
        | D::Decimal(_) => TypeEnum::Double,
        D::Text => TypeEnum::String { precision: None },
        D::Char(size) | D::Character(size) => TypeEnum::String {
            precision: char_length_precision(size),
        },
        D::Varchar(size) | D::CharacterVarying(size) | D::CharVarying(size) => TypeEnum::String {
            precision: char_length_precision(size),
        },
        D::Date => TypeEnum::Date,
        D::Time(_, _) => TypeEnum::Time,
        D::Datetime(_) | D::Timestamp(_, _) => TypeEnum::Datetime,
        _ => TypeEnum::Unknown,
    }
}

fn char_length_precision(size: &Option<ast::CharacterLength>) -> Option<u16> {
    match size {
        Some(ast::CharacterLength::IntegerLength { length, .. }) => {
            u16::try_from(*length).ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lower_sql_for_tests;
    use crate::types::Dialect;

    #[test]
    fn lowers_simple_select() {
        let mut graph = Graph::new();
        let root = lower_sql_for_tests(&mut graph, "SELECT a FROM t WHERE a > 1");
        let select = match &graph.node(root).kind {
            NodeKind::Select(s) => s.clone(),
            other => panic!("expected select, got {other:?}"),
        };
        assert!(select.from.is_some());
        assert!(select.where_clause.is_some());
        let where_id = select.where_clause.unwrap();
        assert_eq!(graph.print_predicate(Some(where_id)), "t.a > 1");
    }

    #[test]
    fn resolves_alias_qualified_names() {
        let mut graph = Graph::new();
        let root = lower_sql_for_tests(&mut graph, "SELECT x.a FROM t x");
        let select = match &graph.node(root).kind {
            NodeKind::Select(s) => s.clone(),
            _ => unreachable!(),
        };
        let item = select.list.unwrap();
        let name = graph.node(item).as_name().unwrap();
        assert_eq!(name.name, "a");
        assert_eq!(name.spec_id, select.from);
    }

    #[test]
    fn on_condition_terms_carry_spec_location() {
        let mut graph = Graph::new();
        let root = lower_sql_for_tests(
            &mut graph,
            "SELECT * FROM a LEFT OUTER JOIN b ON a.id = b.id",
        );
        let select = match &graph.node(root).kind {
            NodeKind::Select(s) => s.clone(),
            _ => unreachable!(),
        };
        let specs = graph.collect_chain(select.from);
        assert_eq!(specs.len(), 2);
        assert_eq!(graph.node(specs[0]).location, 0);
        assert_eq!(graph.node(specs[1]).location, 1);
        let on_cond = graph.node(specs[1]).as_spec().unwrap().on_cond.unwrap();
        assert_eq!(graph.node(on_cond).location, 1);
        assert_eq!(
            graph.node(specs[1]).as_spec().unwrap().join_type,
            JoinType::LeftOuter
        );
    }

    #[test]
    fn subquery_correlation_level() {
        let mut graph = Graph::new();
        let root = lower_sql_for_tests(
            &mut graph,
            "SELECT a FROM t WHERE a IN (SELECT b FROM u WHERE u.b = t.a)",
        );
        let select = match &graph.node(root).kind {
            NodeKind::Select(s) => s.clone(),
            _ => unreachable!(),
        };
        let where_id = select.where_clause.unwrap();
        let in_expr = graph.node(where_id).as_expr().unwrap().clone();
        assert_eq!(in_expr.op, ExprOp::IsIn);
        let subquery = in_expr.arg2.unwrap();
        match &graph.node(subquery).kind {
            NodeKind::Select(s) => assert_eq!(s.common.correlation_level, 1),
            _ => panic!("expected subquery select"),
        }
    }

    #[test]
    fn uncorrelated_subquery_level_zero() {
        let mut graph = Graph::new();
        let root = lower_sql_for_tests(
            &mut graph,
            "SELECT a FROM t WHERE a IN (SELECT b FROM u)",
        );
        let select = match &graph.node(root).kind {
            NodeKind::Select(s) => s.clone(),
            _ => unreachable!(),
        };
        let in_expr = graph
            .node(select.where_clause.unwrap())
            .as_expr()
            .unwrap()
            .clone();
        match &graph.node(in_expr.arg2.unwrap()).kind {
            NodeKind::Select(s) => {
                assert_eq!(s.common.correlation_level, 0);
                assert!(s.common.is_subquery);
            }
            _ => panic!("expected subquery select"),
        }
    }

    #[test]
    fn placeholders_become_host_vars() {
        let mut graph = Graph::new();
        let root = lower_sql_for_tests(&mut graph, "SELECT a FROM t WHERE a = ?");
        let select = match &graph.node(root).kind {
            NodeKind::Select(s) => s.clone(),
            _ => unreachable!(),
        };
        let eq = graph
            .node(select.where_clause.unwrap())
            .as_expr()
            .unwrap()
            .clone();
        assert!(matches!(
            graph.node(eq.arg2.unwrap()).kind,
            NodeKind::HostVar(_)
        ));
    }

    #[test]
    fn update_and_delete_lower() {
        let mut graph = Graph::new();
        let roots = crate::frontend::lower_sql(
            &mut graph,
            "UPDATE t SET a = 1 WHERE b = 2; DELETE FROM t WHERE a < 0",
            Dialect::Generic,
        )
        .unwrap();
        assert_eq!(roots.len(), 2);
        assert!(matches!(graph.node(roots[0]).kind, NodeKind::Update(_)));
        assert!(matches!(graph.node(roots[1]).kind, NodeKind::Delete(_)));
    }
}
