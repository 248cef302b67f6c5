//! Lowering of a rewritten parse graph into the executable plan tree.
//!
//! The planner proper (join ordering, index selection) is out of scope;
//! this lowering produces the straightforward scan-shaped plan the CLI
//! and the round-trip tests drive through the serializer.

use crate::error::StreamError;
use crate::plan::{
    AccessMethod, AccessSpec, Domain, Hfid, KeyRange, OutPtrList, PlanArena, PlanId, PlanObj,
    PredNode, ProcKind, RangeKind, ReguVar, RelOp, XaslHeader, XaslNode,
};
use planfold_core::graph::{
    ExprOp, FuncType, Graph, NodeId, NodeKind, TypeEnum,
};
use planfold_core::value::{DbValue, Oid};

/// Lowers one rewritten statement to a plan tree plus its stream header.
pub fn lower_statement(
    g: &Graph,
    root: NodeId,
) -> Result<(PlanArena, PlanId, XaslHeader), StreamError> {
    let mut lowerer = Lowerer {
        g,
        arena: PlanArena::new(),
        class_oids: Vec::new(),
    };
    let plan = lowerer.lower_stmt(root)?;
    let header = XaslHeader {
        dbval_cnt: g.host_var_count(),
        creator_oid: Oid::default(),
        repr_ids: vec![0; lowerer.class_oids.len()],
        class_oids: lowerer.class_oids,
    };
    Ok((lowerer.arena, plan, header))
}

struct Lowerer<'a> {
    g: &'a Graph,
    arena: PlanArena,
    class_oids: Vec<Oid>,
}

impl<'a> Lowerer<'a> {
    fn lower_stmt(&mut self, stmt: NodeId) -> Result<PlanId, StreamError> {
        match &self.g.node(stmt).kind {
            NodeKind::Select(select) => {
                let select = select.clone();
                // An ungrouped aggregate projection yields a single row.
                let aggregate_only = select.group_by.is_none()
                    && self.g.collect_chain(select.list).iter().any(|&item| {
                        matches!(
                            &self.g.node(item).kind,
                            NodeKind::Function(f) if f.func.is_aggregate()
                        )
                    });
                let having_pred = self.lower_pred_chain(select.having)?;
                let kind = if aggregate_only {
                    ProcKind::BuildValue {
                        having_pred,
                        is_always_false: select
                            .where_clause
                            .map(|w| {
                                self.g.as_bool_literal(w) == Some(false)
                                    && self.g.node(w).next.is_none()
                            })
                            .unwrap_or(false),
                    }
                } else {
                    ProcKind::BuildList {
                        eptr: None,
                        groupby_list: None,
                        having_pred,
                    }
                };
                let mut node = XaslNode::new(kind);

                // FROM entries chain through the access spec's own next
                // link; the spec list carries the chain head.
                let mut spec_head: Option<PlanId> = None;
                for spec in self.g.collect_chain(select.from).into_iter().rev() {
                    let lowered = self.lower_spec(spec, spec_head)?;
                    spec_head = Some(lowered);
                }
                node.spec_list = spec_head.into_iter().collect();

                node.if_pred = self.lower_pred_chain(select.where_clause)?;
                node.outptr_list = self.lower_outptr_list(select.list)?;

                if select.start_with.is_some()
                    || select.connect_by.is_some()
                    || select.after_cb_filter.is_some()
                {
                    let mut connect = XaslNode::new(ProcKind::ConnectBy {
                        start_with_pred: self.lower_pred_chain(select.start_with)?,
                        after_connect_by_pred: self
                            .lower_pred_chain(select.after_cb_filter)?,
                    });
                    connect.if_pred = self.lower_pred_chain(select.connect_by)?;
                    let connect_id = self.arena.alloc(PlanObj::Xasl(connect));
                    node.connect_by_ptr = Some(connect_id);
                }

                node.is_single_tuple = select.common.single_tuple;
                Ok(self.arena.alloc(PlanObj::Xasl(node)))
            }
            NodeKind::Union(u) | NodeKind::Difference(u) | NodeKind::Intersection(u) => {
                let (arg1, arg2) = (u.arg1, u.arg2);
                let left = arg1.map(|a| self.lower_stmt(a)).transpose()?;
                let right = arg2.map(|a| self.lower_stmt(a)).transpose()?;
                let kind = match &self.g.node(stmt).kind {
                    NodeKind::Union(_) => ProcKind::Union { left, right },
                    NodeKind::Difference(_) => ProcKind::Difference { left, right },
                    _ => ProcKind::Intersection { left, right },
                };
                Ok(self.arena.alloc(PlanObj::Xasl(XaslNode::new(kind))))
            }
            NodeKind::Update(update) => {
                let update = update.clone();
                let class_oid = self.spec_class_oid(update.spec);
                let mut assigns = Vec::new();
                for assign in self.g.collect_chain(update.assignments) {
                    if let Some(expr) = self.g.node(assign).as_expr() {
                        if let Some(value) = expr.arg2 {
                            assigns.push(self.lower_regu(value)?);
                        }
                    }
                }
                let mut node = XaslNode::new(ProcKind::Update { class_oid, assigns });
                node.if_pred = self.lower_pred_chain(update.search_cond)?;
                if let Some(spec) = update.spec {
                    let lowered = self.lower_spec(spec, None)?;
                    node.spec_list = vec![lowered];
                }
                Ok(self.arena.alloc(PlanObj::Xasl(node)))
            }
            NodeKind::Delete(delete) => {
                let delete = delete.clone();
                let class_oid = self.spec_class_oid(delete.spec);
                let mut node = XaslNode::new(ProcKind::Delete { class_oid });
                node.if_pred = self.lower_pred_chain(delete.search_cond)?;
                if let Some(spec) = delete.spec {
                    let lowered = self.lower_spec(spec, None)?;
                    node.spec_list = vec![lowered];
                }
                Ok(self.arena.alloc(PlanObj::Xasl(node)))
            }
            NodeKind::Insert(insert) => {
                let insert = insert.clone();
                let class_oid = self.spec_class_oid(insert.spec);
                let mut values = Vec::new();
                let mut node_aptr = None;
                if let Some(value_clause) = insert.value_clause {
                    if self.g.node(value_clause).is_query() {
                        node_aptr = Some(self.lower_stmt(value_clause)?);
                    } else {
                        for value in self.g.collect_chain(Some(value_clause)) {
                            values.push(self.lower_regu(value)?);
                        }
                    }
                }
                let mut node = XaslNode::new(ProcKind::Insert { class_oid, values });
                node.aptr_list = node_aptr;
                Ok(self.arena.alloc(PlanObj::Xasl(node)))
            }
            other => Err(StreamError::InvalidNode(format!(
                "statement kind {:?} has no plan form",
                std::mem::discriminant(other)
            ))),
        }
    }

    fn spec_class_oid(&mut self, spec: Option<NodeId>) -> Oid {
        let name = spec
            .and_then(|s| self.g.node(s).as_spec().and_then(|sp| sp.entity_name))
            .and_then(|e| self.g.node(e).as_name().map(|n| n.name.clone()))
            .unwrap_or_default();
        let oid = synthetic_oid(&name);
        if !self.class_oids.contains(&oid) {
            self.class_oids.push(oid);
        }
        oid
    }

    fn lower_spec(
        &mut self,
        spec: NodeId,
        next: Option<PlanId>,
    ) -> Result<PlanId, StreamError> {
        let spec_node = self
            .g
            .node(spec)
            .as_spec()
            .ok_or_else(|| StreamError::InvalidNode("FROM entry is not a spec".into()))?
            .clone();

        let (access, class_oid) = match spec_node.derived_table_type {
            planfold_core::graph::DerivedTableType::None => {
                (AccessMethod::Sequential, self.spec_class_oid(Some(spec)))
            }
            planfold_core::graph::DerivedTableType::Subquery => {
                (AccessMethod::ListFile, Oid::default())
            }
            planfold_core::graph::DerivedTableType::SetExpr => {
                (AccessMethod::SetValues, Oid::default())
            }
        };

        let where_pred = self.lower_pred_chain(spec_node.on_cond)?;
        let mut regu_list = Vec::new();
        for attr in self.g.collect_chain(spec_node.as_attr_list) {
            regu_list.push(self.lower_regu(attr)?);
        }
        Ok(self.arena.alloc(PlanObj::AccessSpec(AccessSpec {
            access,
            class_oid,
            hfid: Hfid::default(),
            where_pred,
            regu_list,
            next,
        })))
    }

    fn lower_outptr_list(
        &mut self,
        list: Option<NodeId>,
    ) -> Result<Option<PlanId>, StreamError> {
        let items = self.g.collect_chain(list);
        if items.is_empty() {
            return Ok(None);
        }
        let mut valptrs = Vec::with_capacity(items.len());
        for item in items {
            valptrs.push(self.lower_regu(item)?);
        }
        Ok(Some(self.arena.alloc(PlanObj::OutPtrList(OutPtrList {
            valptrs,
        }))))
    }

    /// CNF chain to a right-linear AND tree, DNF alternatives to OR.
    fn lower_pred_chain(&mut self, head: Option<NodeId>) -> Result<Option<PlanId>, StreamError> {
        let conjuncts = self.g.collect_chain(head);
        let mut lowered: Vec<PlanId> = Vec::with_capacity(conjuncts.len());
        for conjunct in conjuncts {
            let alts = self.g.collect_or_chain(Some(conjunct));
            let mut alt_ids = Vec::with_capacity(alts.len());
            for alt in alts {
                alt_ids.push(self.lower_pred_term(alt)?);
            }
            lowered.push(self.fold_bool(alt_ids, crate::plan::BoolOp::Or));
        }
        if lowered.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.fold_bool(lowered, crate::plan::BoolOp::And)))
    }

    fn fold_bool(&mut self, mut terms: Vec<PlanId>, op: crate::plan::BoolOp) -> PlanId {
        let mut acc = terms.pop().expect("fold over non-empty term list");
        while let Some(lhs) = terms.pop() {
            acc = self.arena.alloc(PlanObj::Pred(PredNode::Pred {
                lhs,
                op,
                rhs: acc,
            }));
        }
        acc
    }

    fn lower_pred_term(&mut self, term: NodeId) -> Result<PlanId, StreamError> {
        if let Some(truth) = self.g.as_bool_literal(term) {
            let value = self.arena.alloc(PlanObj::Value(DbValue::Int(i64::from(truth))));
            let lhs = self.arena.alloc(PlanObj::Regu(ReguVar::Const {
                value,
                domain: domain_of(TypeEnum::Logical),
            }));
            let one = self.arena.alloc(PlanObj::Value(DbValue::Int(1)));
            let rhs = self.arena.alloc(PlanObj::Regu(ReguVar::Const {
                value: one,
                domain: domain_of(TypeEnum::Logical),
            }));
            return Ok(self.arena.alloc(PlanObj::Pred(PredNode::Comp {
                lhs: Some(lhs),
                rhs: Some(rhs),
                op: RelOp::Eq,
            })));
        }

        let Some(expr) = self.g.node(term).as_expr().cloned() else {
            return Err(StreamError::InvalidNode(
                "predicate term is not an expression".into(),
            ));
        };

        use ExprOp::*;
        match expr.op {
            And | Or => {
                let lhs = expr
                    .arg1
                    .map(|a| self.lower_pred_term(a))
                    .transpose()?
                    .ok_or_else(|| StreamError::InvalidNode("AND/OR missing operand".into()))?;
                let rhs = expr
                    .arg2
                    .map(|a| self.lower_pred_term(a))
                    .transpose()?
                    .ok_or_else(|| StreamError::InvalidNode("AND/OR missing operand".into()))?;
                let op = if expr.op == And {
                    crate::plan::BoolOp::And
                } else {
                    crate::plan::BoolOp::Or
                };
                Ok(self.arena.alloc(PlanObj::Pred(PredNode::Pred { lhs, op, rhs })))
            }
            Not => {
                let operand = expr
                    .arg1
                    .map(|a| self.lower_pred_term(a))
                    .transpose()?
                    .ok_or_else(|| StreamError::InvalidNode("NOT missing operand".into()))?;
                Ok(self.arena.alloc(PlanObj::Pred(PredNode::Not { operand })))
            }
            Eq | Ne | NullsafeEq | Ge | Gt | Lt | Le => {
                let lhs = expr.arg1.map(|a| self.lower_regu(a)).transpose()?;
                let rhs = expr.arg2.map(|a| self.lower_regu(a)).transpose()?;
                Ok(self.arena.alloc(PlanObj::Pred(PredNode::Comp {
                    lhs,
                    rhs,
                    op: rel_of(expr.op),
                })))
            }
            IsNull | IsNotNull => {
                let lhs = expr.arg1.map(|a| self.lower_regu(a)).transpose()?;
                Ok(self.arena.alloc(PlanObj::Pred(PredNode::Comp {
                    lhs,
                    rhs: None,
                    op: if expr.op == IsNull {
                        RelOp::IsNull
                    } else {
                        RelOp::IsNotNull
                    },
                })))
            }
            Like | NotLike => {
                let src = expr
                    .arg1
                    .map(|a| self.lower_regu(a))
                    .transpose()?
                    .ok_or_else(|| StreamError::InvalidNode("LIKE missing source".into()))?;
                let pattern = expr
                    .arg2
                    .map(|a| self.lower_regu(a))
                    .transpose()?
                    .ok_or_else(|| StreamError::InvalidNode("LIKE missing pattern".into()))?;
                let like = self
                    .arena
                    .alloc(PlanObj::Pred(PredNode::LikeTerm { src, pattern }));
                if expr.op == NotLike {
                    Ok(self.arena.alloc(PlanObj::Pred(PredNode::Not { operand: like })))
                } else {
                    Ok(like)
                }
            }
            Range => {
                let attr = expr
                    .arg1
                    .map(|a| self.lower_regu(a))
                    .transpose()?
                    .ok_or_else(|| StreamError::InvalidNode("RANGE missing attribute".into()))?;
                let mut ranges = Vec::new();
                for sub in self.g.collect_or_chain(expr.arg2) {
                    let sub_expr = self
                        .g
                        .node(sub)
                        .as_expr()
                        .ok_or_else(|| StreamError::InvalidNode("bad sub-range".into()))?
                        .clone();
                    let kind = range_kind_of(sub_expr.op).ok_or_else(|| {
                        StreamError::InvalidNode("bad sub-range operator".into())
                    })?;
                    let key1 = sub_expr.arg1.map(|a| self.lower_regu(a)).transpose()?;
                    let key2 = sub_expr.arg2.map(|a| self.lower_regu(a)).transpose()?;
                    ranges.push(KeyRange { kind, key1, key2 });
                }
                Ok(self
                    .arena
                    .alloc(PlanObj::Pred(PredNode::RangeTerm { attr, ranges })))
            }
            Between | NotBetween => {
                // Surviving BETWEENs lower through their bound pair.
                let bounds = expr
                    .arg2
                    .and_then(|b| self.g.node(b).as_expr().cloned())
                    .ok_or_else(|| StreamError::InvalidNode("BETWEEN missing bounds".into()))?;
                let attr = expr
                    .arg1
                    .map(|a| self.lower_regu(a))
                    .transpose()?
                    .ok_or_else(|| StreamError::InvalidNode("BETWEEN missing attr".into()))?;
                let kind = if bounds.op == BetweenAnd {
                    RangeKind::GeLe
                } else {
                    range_kind_of(bounds.op)
                        .ok_or_else(|| StreamError::InvalidNode("bad bound pair".into()))?
                };
                let key1 = bounds.arg1.map(|a| self.lower_regu(a)).transpose()?;
                let key2 = bounds.arg2.map(|a| self.lower_regu(a)).transpose()?;
                let range = self.arena.alloc(PlanObj::Pred(PredNode::RangeTerm {
                    attr,
                    ranges: vec![KeyRange { kind, key1, key2 }],
                }));
                if expr.op == NotBetween {
                    Ok(self
                        .arena
                        .alloc(PlanObj::Pred(PredNode::Not { operand: range })))
                } else {
                    Ok(range)
                }
            }
            IsIn | IsNotIn | EqSome | NeSome | GeSome | GtSome | LtSome | LeSome | EqAll
            | NeAll | GeAll | GtAll | LtAll | LeAll => {
                let elem = expr
                    .arg1
                    .map(|a| self.lower_regu(a))
                    .transpose()?
                    .ok_or_else(|| StreamError::InvalidNode("set comparison element".into()))?;
                let elemset = expr
                    .arg2
                    .map(|a| self.lower_regu(a))
                    .transpose()?
                    .ok_or_else(|| StreamError::InvalidNode("set comparison operand".into()))?;
                let (op, eq_flag) = alsm_of(expr.op);
                let alsm = self.arena.alloc(PlanObj::Pred(PredNode::Alsm {
                    elem,
                    elemset,
                    op,
                    eq_flag,
                }));
                if matches!(expr.op, IsNotIn) {
                    Ok(self.arena.alloc(PlanObj::Pred(PredNode::Not { operand: alsm })))
                } else {
                    Ok(alsm)
                }
            }
            _ => Err(StreamError::InvalidNode(format!(
                "operator {:?} has no predicate form",
                expr.op
            ))),
        }
    }

    fn lower_regu(&mut self, id: NodeId) -> Result<PlanId, StreamError> {
        let node = self.g.node(id);
        let domain = domain_of(node.type_enum);
        match &node.kind {
            NodeKind::Value(value) => {
                let value = self.arena.alloc(PlanObj::Value(value.clone()));
                Ok(self.arena.alloc(PlanObj::Regu(ReguVar::Const { value, domain })))
            }
            NodeKind::HostVar(hv) => Ok(self.arena.alloc(PlanObj::Regu(ReguVar::HostVar {
                index: hv.index,
                domain,
            }))),
            NodeKind::Name(name) => Ok(self.arena.alloc(PlanObj::Regu(ReguVar::Attr {
                attr_id: attr_id_of(&name.name),
                domain,
            }))),
            NodeKind::Dot(dot) => {
                let path = dot
                    .arg2
                    .and_then(|a| self.g.node(a).as_name().map(|n| n.name.clone()))
                    .unwrap_or_default();
                Ok(self.arena.alloc(PlanObj::Regu(ReguVar::Attr {
                    attr_id: attr_id_of(&path),
                    domain,
                })))
            }
            NodeKind::Function(f) => {
                let func = match f.func {
                    FuncType::Min => crate::plan::AggFunc::Min,
                    FuncType::Max => crate::plan::AggFunc::Max,
                    FuncType::Sum => crate::plan::AggFunc::Sum,
                    FuncType::Avg => crate::plan::AggFunc::Avg,
                    FuncType::Count => crate::plan::AggFunc::Count,
                    FuncType::CountStar => crate::plan::AggFunc::CountStar,
                    FuncType::TableSet | FuncType::TableSequence => {
                        let mut args = Vec::new();
                        for arg in self.g.collect_chain(f.args) {
                            args.push(self.lower_regu(arg)?);
                        }
                        return Ok(self
                            .arena
                            .alloc(PlanObj::Regu(ReguVar::Func { code: 1, args, domain })));
                    }
                };
                let operand = match f.args {
                    Some(first) => Some(self.lower_regu(first)?),
                    None => None,
                };
                Ok(self
                    .arena
                    .alloc(PlanObj::Regu(ReguVar::Aggregate { func, operand, domain })))
            }
            NodeKind::Expr(e) => {
                use ExprOp::*;
                let arith = match e.op {
                    Plus => crate::plan::ArithOp::Add,
                    Minus => crate::plan::ArithOp::Sub,
                    Times => crate::plan::ArithOp::Mul,
                    Divide => crate::plan::ArithOp::Div,
                    UnaryMinus => crate::plan::ArithOp::UnaryMinus,
                    Modulus => crate::plan::ArithOp::Mod,
                    Concat => crate::plan::ArithOp::Concat,
                    Prior | Cast => {
                        // Transparent at runtime; lower the operand.
                        return e
                            .arg1
                            .map(|a| self.lower_regu(a))
                            .transpose()?
                            .ok_or_else(|| {
                                StreamError::InvalidNode("empty wrapper expression".into())
                            });
                    }
                    InstNum | OrderbyNum => {
                        return Ok(self.arena.alloc(PlanObj::Regu(ReguVar::Position {
                            pos: -1,
                            domain,
                        })));
                    }
                    other => {
                        return Err(StreamError::InvalidNode(format!(
                            "operator {other:?} has no regu form"
                        )))
                    }
                };
                let lhs = e.arg1.map(|a| self.lower_regu(a)).transpose()?;
                let rhs = e.arg2.map(|a| self.lower_regu(a)).transpose()?;
                Ok(self.arena.alloc(PlanObj::Regu(ReguVar::Arith {
                    op: arith,
                    lhs,
                    rhs,
                    domain,
                })))
            }
            NodeKind::Select(_)
            | NodeKind::Union(_)
            | NodeKind::Difference(_)
            | NodeKind::Intersection(_) => {
                // A residual subquery becomes a list reference whose plan
                // is reachable from the list id.
                let list_id = self.arena.alloc(PlanObj::ListId(Default::default()));
                Ok(self.arena.alloc(PlanObj::Regu(ReguVar::List { list_id, domain })))
            }
            _ => Err(StreamError::InvalidNode(
                "node has no regu-variable form".into(),
            )),
        }
    }
}

fn rel_of(op: ExprOp) -> RelOp {
    match op {
        ExprOp::Eq => RelOp::Eq,
        ExprOp::Ne => RelOp::Ne,
        ExprOp::NullsafeEq => RelOp::NullsafeEq,
        ExprOp::Ge => RelOp::Ge,
        ExprOp::Gt => RelOp::Gt,
        ExprOp::Lt => RelOp::Lt,
        ExprOp::Le => RelOp::Le,
        _ => RelOp::Eq,
    }
}

/// Quantified comparisons carry the base operator plus an all/some flag.
fn alsm_of(op: ExprOp) -> (RelOp, i32) {
    use ExprOp::*;
    match op {
        IsIn | EqSome => (RelOp::Eq, 0),
        NeSome => (RelOp::Ne, 0),
        GeSome => (RelOp::Ge, 0),
        GtSome => (RelOp::Gt, 0),
        LtSome => (RelOp::Lt, 0),
        LeSome => (RelOp::Le, 0),
        IsNotIn | EqAll => (RelOp::Eq, 1),
        NeAll => (RelOp::Ne, 1),
        GeAll => (RelOp::Ge, 1),
        GtAll => (RelOp::Gt, 1),
        LtAll => (RelOp::Lt, 1),
        LeAll => (RelOp::Le, 1),
        _ => (RelOp::Eq, 0),
    }
}

fn range_kind_of(op: ExprOp) -> Option<RangeKind> {
    Some(match op {
        ExprOp::BetweenEqNa => RangeKind::EqNa,
        ExprOp::BetweenGeLe => RangeKind::GeLe,
        ExprOp::BetweenGeLt => RangeKind::GeLt,
        ExprOp::BetweenGtLe => RangeKind::GtLe,
        ExprOp::BetweenGtLt => RangeKind::GtLt,
        ExprOp::BetweenGeInf => RangeKind::GeInf,
        ExprOp::BetweenGtInf => RangeKind::GtInf,
        ExprOp::BetweenInfLe => RangeKind::InfLe,
        ExprOp::BetweenInfLt => RangeKind::InfLt,
        _ => return None,
    })
}

fn domain_of(ty: TypeEnum) -> Domain {
    let (type_tag, precision) = match ty {
        TypeEnum::Unknown => (0, 0),
        TypeEnum::Null => (1, 0),
        TypeEnum::Logical => (2, 0),
        TypeEnum::Integer => (3, 0),
        TypeEnum::Double => (4, 0),
        TypeEnum::String { precision } => (5, i32::from(precision.unwrap_or(0))),
        TypeEnum::Date => (6, 0),
        TypeEnum::Time => (7, 0),
        TypeEnum::Datetime => (8, 0),
        TypeEnum::Object => (9, 0),
        TypeEnum::Sequence => (10, 0),
    };
    Domain {
        type_tag,
        precision,
        scale: 0,
        codeset: 0,
        class_oid: Oid::default(),
    }
}

/// Deterministic stand-ins for catalog identities.
fn synthetic_oid(name: &str) -> Oid {
    let mut h: u32 = 2166136261;
    for b in name.as_bytes() {
        h ^= u32::from(*b);
        h = h.wrapping_mul(16777619);
    }
    Oid::new((h & 0x7fff_ffff) as i32, 0, 0)
}

fn attr_id_of(name: &str) -> i32 {
    (synthetic_oid(name).pageid % 0x0fff_ffff).abs()
}
