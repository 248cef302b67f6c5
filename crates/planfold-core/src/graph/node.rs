//! Parse graph vertices.
//!
//! A [`Node`] is a tagged variant with a common header (type, source
//! position, intrusive `next`/`or_next` links, outer-join `location`,
//! flags) and a per-variant payload in [`NodeKind`]. Nodes are referenced
//! by [`NodeId`] into the owning [`crate::graph::Graph`]; id equality is
//! semantic identity, and several fields may point at the same node.

use crate::value::{BoundOp, DbValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable index of a node inside its [`crate::graph::Graph`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Bit set in the node header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeFlags(u16);

impl NodeFlags {
    pub const HIDDEN_COLUMN: NodeFlags = NodeFlags(1 << 0);
    pub const CONSTANT: NodeFlags = NodeFlags(1 << 1);
    pub const DESC_ORDER: NodeFlags = NodeFlags(1 << 2);
    pub const FULL_RANGE: NodeFlags = NodeFlags(1 << 3);
    pub const EMPTY_RANGE: NodeFlags = NodeFlags(1 << 4);
    pub const COPYPUSH: NodeFlags = NodeFlags(1 << 5);
    pub const TRANSITIVE: NodeFlags = NodeFlags(1 << 6);
    pub const INSTNUM_C: NodeFlags = NodeFlags(1 << 7);
    pub const ORDERBYNUM_C: NodeFlags = NodeFlags(1 << 8);
    pub const PRIOR: NodeFlags = NodeFlags(1 << 9);

    pub fn empty() -> Self {
        NodeFlags(0)
    }

    pub fn contains(self, other: NodeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: NodeFlags) {
        self.0 |= other.0;
    }

    pub fn clear(&mut self, other: NodeFlags) {
        self.0 &= !other.0;
    }
}

/// Semantic type of the value a node produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeEnum {
    #[default]
    Unknown,
    Null,
    Logical,
    Integer,
    Double,
    /// Character type with declared precision when known.
    String {
        precision: Option<u16>,
    },
    Date,
    Time,
    Datetime,
    Object,
    Sequence,
}

impl TypeEnum {
    pub fn of_value(value: &DbValue) -> TypeEnum {
        match value {
            DbValue::Null => TypeEnum::Null,
            DbValue::Int(_) => TypeEnum::Integer,
            DbValue::Double(_) => TypeEnum::Double,
            DbValue::Str(s) => TypeEnum::String {
                precision: u16::try_from(s.chars().count()).ok(),
            },
            DbValue::Date(_) => TypeEnum::Date,
            DbValue::Time(_) => TypeEnum::Time,
            DbValue::Datetime(_) => TypeEnum::Datetime,
            DbValue::Oid(_) => TypeEnum::Object,
            DbValue::Sequence(_) => TypeEnum::Sequence,
        }
    }
}

/// A parse graph vertex: common header plus variant payload.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub type_enum: TypeEnum,
    /// Attached node describing precision/scale or element type.
    pub data_type: Option<NodeId>,
    pub line: u32,
    pub column: u32,
    /// Intrusive sibling link; list elements in the grammar share a chain.
    pub next: Option<NodeId>,
    /// Intrusive chain of DNF alternatives of a predicate term.
    pub or_next: Option<NodeId>,
    /// Outer-join ON-clause group this term belongs to; 0 is the WHERE
    /// clause itself.
    pub location: u16,
    pub flags: NodeFlags,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            type_enum: TypeEnum::Unknown,
            data_type: None,
            line: 0,
            column: 0,
            next: None,
            or_next: None,
            location: 0,
            flags: NodeFlags::empty(),
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self.kind, NodeKind::Value(_))
    }

    pub fn is_name(&self) -> bool {
        matches!(self.kind, NodeKind::Name(_))
    }

    pub fn is_expr(&self) -> bool {
        matches!(self.kind, NodeKind::Expr(_))
    }

    pub fn is_query(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Select(_)
                | NodeKind::Union(_)
                | NodeKind::Difference(_)
                | NodeKind::Intersection(_)
        )
    }

    pub fn as_expr(&self) -> Option<&Expr> {
        match &self.kind {
            NodeKind::Expr(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_expr_mut(&mut self) -> Option<&mut Expr> {
        match &mut self.kind {
            NodeKind::Expr(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&Name> {
        match &self.kind {
            NodeKind::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_spec(&self) -> Option<&Spec> {
        match &self.kind {
            NodeKind::Spec(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_spec_mut(&mut self) -> Option<&mut Spec> {
        match &mut self.kind {
            NodeKind::Spec(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&DbValue> {
        match &self.kind {
            NodeKind::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Calls `f` on every child chain-head slot of this node, in the fixed
    /// traversal order. `data_type` is a child slot too.
    pub fn for_each_child_slot_mut(&mut self, mut f: impl FnMut(&mut Option<NodeId>)) {
        match &mut self.kind {
            NodeKind::Select(s) => {
                f(&mut s.list);
                f(&mut s.from);
                f(&mut s.where_clause);
                f(&mut s.start_with);
                f(&mut s.connect_by);
                f(&mut s.after_cb_filter);
                f(&mut s.group_by);
                f(&mut s.having);
                f(&mut s.common.order_by);
                f(&mut s.common.orderby_for);
            }
            NodeKind::Union(u) | NodeKind::Difference(u) | NodeKind::Intersection(u) => {
                f(&mut u.arg1);
                f(&mut u.arg2);
                f(&mut u.common.order_by);
                f(&mut u.common.orderby_for);
            }
            NodeKind::Update(u) => {
                f(&mut u.spec);
                f(&mut u.assignments);
                f(&mut u.search_cond);
            }
            NodeKind::Delete(d) => {
                f(&mut d.spec);
                f(&mut d.search_cond);
            }
            NodeKind::Insert(i) => {
                f(&mut i.spec);
                f(&mut i.attr_list);
                f(&mut i.value_clause);
            }
            NodeKind::Expr(e) => {
                f(&mut e.arg1);
                f(&mut e.arg2);
                f(&mut e.arg3);
            }
            NodeKind::Dot(d) => {
                f(&mut d.arg1);
                f(&mut d.arg2);
            }
            NodeKind::Spec(s) => {
                f(&mut s.entity_name);
                f(&mut s.flat_entity_list);
                f(&mut s.derived_table);
                f(&mut s.range_var);
                f(&mut s.as_attr_list);
                f(&mut s.path_entities);
                f(&mut s.path_conjuncts);
                f(&mut s.on_cond);
            }
            NodeKind::SortSpec(s) => {
                f(&mut s.expr);
            }
            NodeKind::Function(func) => {
                f(&mut func.args);
            }
            NodeKind::Name(_) | NodeKind::Value(_) | NodeKind::HostVar(_) => {}
        }
        f(&mut self.data_type);
    }

    /// Child chain heads in traversal order.
    pub fn children(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        {
            let mut push = |slot: &Option<NodeId>| {
                if let Some(id) = slot {
                    out.push(*id);
                }
            };
            match &self.kind {
                NodeKind::Select(s) => {
                    push(&s.list);
                    push(&s.from);
                    push(&s.where_clause);
                    push(&s.start_with);
                    push(&s.connect_by);
                    push(&s.after_cb_filter);
                    push(&s.group_by);
                    push(&s.having);
                    push(&s.common.order_by);
                    push(&s.common.orderby_for);
                }
                NodeKind::Union(u) | NodeKind::Difference(u) | NodeKind::Intersection(u) => {
                    push(&u.arg1);
                    push(&u.arg2);
                    push(&u.common.order_by);
                    push(&u.common.orderby_for);
                }
                NodeKind::Update(u) => {
                    push(&u.spec);
                    push(&u.assignments);
                    push(&u.search_cond);
                }
                NodeKind::Delete(d) => {
                    push(&d.spec);
                    push(&d.search_cond);
                }
                NodeKind::Insert(i) => {
                    push(&i.spec);
                    push(&i.attr_list);
                    push(&i.value_clause);
                }
                NodeKind::Expr(e) => {
                    push(&e.arg1);
                    push(&e.arg2);
                    push(&e.arg3);
                }
                NodeKind::Dot(d) => {
                    push(&d.arg1);
                    push(&d.arg2);
                }
                NodeKind::Spec(s) => {
                    push(&s.entity_name);
                    push(&s.flat_entity_list);
                    push(&s.derived_table);
                    push(&s.range_var);
                    push(&s.as_attr_list);
                    push(&s.path_entities);
                    push(&s.path_conjuncts);
                    push(&s.on_cond);
                }
                NodeKind::SortSpec(s) => {
                    push(&s.expr);
                }
                NodeKind::Function(func) => {
                    push(&func.args);
                }
                NodeKind::Name(_) | NodeKind::Value(_) | NodeKind::HostVar(_) => {}
            }
            push(&self.data_type);
        }
        out
    }
}

/// Variant payloads.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Select(SelectQuery),
    Union(SetOpQuery),
    Difference(SetOpQuery),
    Intersection(SetOpQuery),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    Insert(InsertStmt),
    Expr(Expr),
    Name(Name),
    Value(DbValue),
    Spec(Spec),
    SortSpec(SortSpec),
    Function(FunctionCall),
    HostVar(HostVar),
    Dot(DotExpr),
}

/// Fields shared by every query producer.
#[derive(Debug, Clone, Default)]
pub struct QueryCommon {
    /// Chain of `SortSpec` nodes.
    pub order_by: Option<NodeId>,
    /// ORDER BY ... FOR limit predicate.
    pub orderby_for: Option<NodeId>,
    pub is_subquery: bool,
    /// Subquery must yield at most one tuple (scalar position).
    pub single_tuple: bool,
    /// 0 means uncorrelated.
    pub correlation_level: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub common: QueryCommon,
    /// Projection chain.
    pub list: Option<NodeId>,
    /// Spec chain.
    pub from: Option<NodeId>,
    pub where_clause: Option<NodeId>,
    pub start_with: Option<NodeId>,
    pub connect_by: Option<NodeId>,
    /// Filter applied after CONNECT BY processing.
    pub after_cb_filter: Option<NodeId>,
    pub group_by: Option<NodeId>,
    pub having: Option<NodeId>,
    /// ORDERED join hint; explicit joins keep their order.
    pub ordered_hint: bool,
    /// Hierarchical query can run on a single table without joins.
    pub single_table_opt: bool,
    pub cannot_prepare: bool,
    pub partition_pruned: bool,
}

#[derive(Debug, Clone)]
pub struct SetOpQuery {
    pub common: QueryCommon,
    pub arg1: Option<NodeId>,
    pub arg2: Option<NodeId>,
    pub all: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateStmt {
    pub spec: Option<NodeId>,
    /// Chain of `attr = expr` assignment Exprs.
    pub assignments: Option<NodeId>,
    pub search_cond: Option<NodeId>,
    pub cannot_prepare: bool,
    pub partition_pruned: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteStmt {
    pub spec: Option<NodeId>,
    pub search_cond: Option<NodeId>,
    pub cannot_prepare: bool,
    pub partition_pruned: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InsertStmt {
    pub spec: Option<NodeId>,
    pub attr_list: Option<NodeId>,
    /// VALUES row chain, or a single query node for INSERT ... SELECT.
    pub value_clause: Option<NodeId>,
}

/// Expression node: operator and up to three operands.
#[derive(Debug, Clone)]
pub struct Expr {
    pub op: ExprOp,
    pub arg1: Option<NodeId>,
    pub arg2: Option<NodeId>,
    pub arg3: Option<NodeId>,
}

impl Expr {
    pub fn unary(op: ExprOp, arg1: NodeId) -> Self {
        Self {
            op,
            arg1: Some(arg1),
            arg2: None,
            arg3: None,
        }
    }

    pub fn binary(op: ExprOp, arg1: NodeId, arg2: NodeId) -> Self {
        Self {
            op,
            arg1: Some(arg1),
            arg2: Some(arg2),
            arg3: None,
        }
    }
}

/// Expression operators. The arithmetic/string/date subset doubles as the
/// closed operator set the partition pruner's constant evaluator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExprOp {
    // Boolean connectives
    And,
    Or,
    Not,
    // Comparisons
    Eq,
    Ne,
    NullsafeEq,
    Ge,
    Gt,
    Lt,
    Le,
    // Quantified comparisons
    EqSome,
    NeSome,
    GeSome,
    GtSome,
    LtSome,
    LeSome,
    EqAll,
    NeAll,
    GeAll,
    GtAll,
    LtAll,
    LeAll,
    IsIn,
    IsNotIn,
    // Null tests
    IsNull,
    IsNotNull,
    // Pattern match
    Like,
    NotLike,
    // Surface BETWEEN; arg2 is a `BetweenAnd` bound pair
    Between,
    NotBetween,
    BetweenAnd,
    // Range sub-operators; arg1 = lower endpoint, arg2 = upper endpoint.
    // One-sided forms carry their single endpoint in arg1.
    BetweenEqNa,
    BetweenGeLe,
    BetweenGeLt,
    BetweenGtLe,
    BetweenGtLt,
    BetweenGeInf,
    BetweenGtInf,
    BetweenInfLe,
    BetweenInfLt,
    /// `attr RANGE (sub-range, ...)`: arg1 = attr, arg2 = sub-range chain
    /// threaded through `or_next`.
    Range,
    // Arithmetic
    Plus,
    Minus,
    Times,
    Divide,
    UnaryMinus,
    Modulus,
    // Strings
    Concat,
    Lower,
    Upper,
    Trim,
    Substring,
    CharLength,
    // Numeric functions
    Floor,
    Ceil,
    Abs,
    Round,
    Trunc,
    /// Target domain in the node's `data_type`.
    Cast,
    // Conditional operators; opaque to constant folding and proof of
    // null-intolerance.
    Case,
    Coalesce,
    Ifnull,
    // Hierarchical query operator
    Prior,
    // Row counters
    InstNum,
    OrderbyNum,
}

impl ExprOp {
    pub fn is_comparison(self) -> bool {
        use ExprOp::*;
        matches!(self, Eq | Ne | NullsafeEq | Ge | Gt | Lt | Le)
    }

    /// Converse for operand swap: `c op a` == `a converse(op) c`.
    pub fn converse(self) -> Option<ExprOp> {
        use ExprOp::*;
        Some(match self {
            Eq => Eq,
            Ne => Ne,
            NullsafeEq => NullsafeEq,
            Ge => Le,
            Gt => Lt,
            Lt => Gt,
            Le => Ge,
            _ => return None,
        })
    }

    pub fn is_range_sub_op(self) -> bool {
        self.range_bounds().is_some()
    }

    /// Lower/upper endpoint semantics of a range sub-operator.
    pub fn range_bounds(self) -> Option<(BoundOp, BoundOp)> {
        use ExprOp::*;
        Some(match self {
            BetweenEqNa => (BoundOp::Eq, BoundOp::Eq),
            BetweenGeLe => (BoundOp::Ge, BoundOp::Le),
            BetweenGeLt => (BoundOp::Ge, BoundOp::Lt),
            BetweenGtLe => (BoundOp::Gt, BoundOp::Le),
            BetweenGtLt => (BoundOp::Gt, BoundOp::Lt),
            BetweenGeInf => (BoundOp::Ge, BoundOp::LtInf),
            BetweenGtInf => (BoundOp::Gt, BoundOp::LtInf),
            BetweenInfLe => (BoundOp::GtInf, BoundOp::Le),
            BetweenInfLt => (BoundOp::GtInf, BoundOp::Lt),
            _ => return None,
        })
    }

    /// Rebuilds the sub-operator from endpoint semantics.
    pub fn from_range_bounds(lower: BoundOp, upper: BoundOp) -> Option<ExprOp> {
        use ExprOp::*;
        Some(match (lower, upper) {
            (BoundOp::Eq, BoundOp::Eq) => BetweenEqNa,
            (BoundOp::Ge, BoundOp::Le) => BetweenGeLe,
            (BoundOp::Ge, BoundOp::Lt) => BetweenGeLt,
            (BoundOp::Gt, BoundOp::Le) => BetweenGtLe,
            (BoundOp::Gt, BoundOp::Lt) => BetweenGtLt,
            (BoundOp::Ge, BoundOp::LtInf) => BetweenGeInf,
            (BoundOp::Gt, BoundOp::LtInf) => BetweenGtInf,
            (BoundOp::GtInf, BoundOp::Le) => BetweenInfLe,
            (BoundOp::GtInf, BoundOp::Lt) => BetweenInfLt,
            _ => return None,
        })
    }

    /// Does the sub-operator carry two endpoint slots?
    pub fn is_two_sided_range(self) -> bool {
        use ExprOp::*;
        matches!(self, BetweenGeLe | BetweenGeLt | BetweenGtLe | BetweenGtLt)
    }

    /// Operators whose result can be NULL-tolerant; a conjunct containing
    /// one of these cannot prove an outer join null-intolerant.
    pub fn is_null_tolerant(self) -> bool {
        use ExprOp::*;
        matches!(self, IsNull | NullsafeEq | Case | Coalesce | Ifnull)
    }
}

/// Object path step `obj.attr`: arg1 is the object-producing expression,
/// arg2 the attribute Name.
#[derive(Debug, Clone, Default)]
pub struct DotExpr {
    pub arg1: Option<NodeId>,
    pub arg2: Option<NodeId>,
}

/// A resolved column / entity reference.
#[derive(Debug, Clone, Default)]
pub struct Name {
    /// Id of the producing SPEC node, once bound.
    pub spec_id: Option<NodeId>,
    /// Qualifier as written or resolved (range variable).
    pub resolved: Option<String>,
    /// Attribute or entity name.
    pub name: String,
    /// Entity accessed as a meta-class (`class c`).
    pub is_meta_class: bool,
}

impl Name {
    pub fn attr(resolved: Option<String>, name: impl Into<String>) -> Self {
        Self {
            spec_id: None,
            resolved,
            name: name.into(),
            is_meta_class: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivedTableType {
    #[default]
    None,
    Subquery,
    SetExpr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    #[default]
    None,
    Inner,
    LeftOuter,
    RightOuter,
}

impl JoinType {
    pub fn is_outer(self) -> bool {
        matches!(self, JoinType::LeftOuter | JoinType::RightOuter)
    }
}

/// Join semantics of a path link or plain entity spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecMetaClass {
    #[default]
    Class,
    MetaClass,
    PathInner,
    PathOuter,
    PathOuterWeasel,
}

/// A FROM-list entry.
#[derive(Debug, Clone, Default)]
pub struct Spec {
    /// Name node of the referenced entity.
    pub entity_name: Option<NodeId>,
    /// Resolved class-hierarchy expansion (Name chain); the partition
    /// pruner replaces this with the reduced child set.
    pub flat_entity_list: Option<NodeId>,
    pub derived_table: Option<NodeId>,
    pub derived_table_type: DerivedTableType,
    /// Alias Name used by references resolved to this spec.
    pub range_var: Option<NodeId>,
    /// Derived column list (Name chain).
    pub as_attr_list: Option<NodeId>,
    /// Children in an object-path expansion (Spec chain).
    pub path_entities: Option<NodeId>,
    /// ON-join predicates of path children.
    pub path_conjuncts: Option<NodeId>,
    pub meta_class: SpecMetaClass,
    pub join_type: JoinType,
    pub on_cond: Option<NodeId>,
    pub partition_pruned: bool,
}

/// One ORDER BY element.
#[derive(Debug, Clone, Default)]
pub struct SortSpec {
    pub expr: Option<NodeId>,
    /// 1-based position into the select list, when resolved.
    pub pos: Option<usize>,
    pub desc: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuncType {
    Min,
    Max,
    Sum,
    Avg,
    Count,
    CountStar,
    /// Derived set expression `TABLE({...})`.
    TableSet,
    TableSequence,
}

impl FuncType {
    pub fn is_aggregate(self) -> bool {
        matches!(
            self,
            FuncType::Min
                | FuncType::Max
                | FuncType::Sum
                | FuncType::Avg
                | FuncType::Count
                | FuncType::CountStar
        )
    }
}

#[derive(Debug, Clone)]
pub struct FunctionCall {
    pub func: FuncType,
    /// Argument chain.
    pub args: Option<NodeId>,
}

/// Input marker introduced by auto-parameterization or written as `?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostVar {
    pub index: i32,
    /// Value bound at rewrite time, if any. Unbound markers in a
    /// partition-key expression mark the statement `cannot_prepare`.
    pub bound: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_set_and_clear() {
        let mut flags = NodeFlags::empty();
        flags.set(NodeFlags::TRANSITIVE);
        flags.set(NodeFlags::COPYPUSH);
        assert!(flags.contains(NodeFlags::TRANSITIVE));
        assert!(flags.contains(NodeFlags::COPYPUSH));
        flags.clear(NodeFlags::TRANSITIVE);
        assert!(!flags.contains(NodeFlags::TRANSITIVE));
        assert!(flags.contains(NodeFlags::COPYPUSH));
    }

    #[test]
    fn converse_ops() {
        assert_eq!(ExprOp::Lt.converse(), Some(ExprOp::Gt));
        assert_eq!(ExprOp::Ge.converse(), Some(ExprOp::Le));
        assert_eq!(ExprOp::Eq.converse(), Some(ExprOp::Eq));
        assert_eq!(ExprOp::Plus.converse(), None);
    }

    #[test]
    fn range_bounds_roundtrip() {
        use ExprOp::*;
        for op in [
            BetweenEqNa,
            BetweenGeLe,
            BetweenGeLt,
            BetweenGtLe,
            BetweenGtLt,
            BetweenGeInf,
            BetweenGtInf,
            BetweenInfLe,
            BetweenInfLt,
        ] {
            let (lo, hi) = op.range_bounds().unwrap();
            assert_eq!(ExprOp::from_range_bounds(lo, hi), Some(op));
        }
        assert!(!ExprOp::Between.is_range_sub_op());
    }

    #[test]
    fn value_node_type_inference() {
        assert_eq!(TypeEnum::of_value(&DbValue::Int(1)), TypeEnum::Integer);
        assert_eq!(
            TypeEnum::of_value(&DbValue::Str("abc".into())),
            TypeEnum::String { precision: Some(3) }
        );
    }
}
