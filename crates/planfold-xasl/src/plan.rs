//! Executable plan tree.
//!
//! Built by the planner, consumed once by the serializer, then discarded;
//! between build and serialize the tree is immutable. Objects live in a
//! [`PlanArena`] and reference each other by [`PlanId`], so one sub-object
//! can be shared by several parents and still serialize exactly once.

use planfold_core::value::{DbValue, Oid};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;

/// Stable index of an object inside its [`PlanArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanId(pub(crate) u32);

impl PlanId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct PlanArena {
    objs: Vec<PlanObj>,
}

impl PlanArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, obj: PlanObj) -> PlanId {
        let id = PlanId(u32::try_from(self.objs.len()).expect("plan arena overflow"));
        self.objs.push(obj);
        id
    }

    pub fn obj(&self, id: PlanId) -> &PlanObj {
        &self.objs[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.objs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objs.is_empty()
    }

    pub fn xasl(&self, id: PlanId) -> Option<&XaslNode> {
        match self.obj(id) {
            PlanObj::Xasl(node) => Some(node),
            _ => None,
        }
    }
}

impl Index<PlanId> for PlanArena {
    type Output = PlanObj;

    fn index(&self, id: PlanId) -> &PlanObj {
        self.obj(id)
    }
}

/// Any serializable plan object.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanObj {
    Xasl(XaslNode),
    Regu(ReguVar),
    Pred(PredNode),
    AccessSpec(AccessSpec),
    OutPtrList(OutPtrList),
    ValList(ValList),
    SortList(SortList),
    ListId(ListId),
    Value(DbValue),
    Str(String),
}

/// Scan domain descriptor: the root class OID with inline precision,
/// scale and codeset for parameterized types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Domain {
    pub type_tag: i32,
    pub precision: i32,
    pub scale: i32,
    pub codeset: i32,
    pub class_oid: Oid,
}

/// Result-table header of a completed (sub)plan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListId {
    pub id: i64,
    pub tuple_count: i32,
    pub type_count: i32,
}

/// Projection: one regu variable per output column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutPtrList {
    pub valptrs: Vec<PlanId>,
}

/// Runtime binding slots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValList {
    pub values: Vec<PlanId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortList {
    pub keys: Vec<SortKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub pos: i32,
    pub descending: bool,
}

/// Leaf of the plan tree: a runtime-evaluable value.
#[derive(Debug, Clone, PartialEq)]
pub enum ReguVar {
    Const { value: PlanId, domain: Domain },
    HostVar { index: i32, domain: Domain },
    Attr { attr_id: i32, domain: Domain },
    Position { pos: i32, domain: Domain },
    List { list_id: PlanId, domain: Domain },
    Arith { op: ArithOp, lhs: Option<PlanId>, rhs: Option<PlanId>, domain: Domain },
    Aggregate { func: AggFunc, operand: Option<PlanId>, domain: Domain },
    Func { code: i32, args: Vec<PlanId>, domain: Domain },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    UnaryMinus,
    Mod,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggFunc {
    Min,
    Max,
    Sum,
    Avg,
    Count,
    CountStar,
}

/// Comparison operators of evaluation terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelOp {
    Eq,
    Ne,
    Ge,
    Gt,
    Lt,
    Le,
    NullsafeEq,
    IsNull,
    IsNotNull,
    Like,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoolOp {
    And,
    Or,
}

/// Nine-way sub-range operator of a key range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeKind {
    EqNa,
    GeLe,
    GeLt,
    GtLe,
    GtLt,
    GeInf,
    GtInf,
    InfLe,
    InfLt,
}

/// One key range: `(range_kind, key1, key2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRange {
    pub kind: RangeKind,
    pub key1: Option<PlanId>,
    pub key2: Option<PlanId>,
}

/// Predicate tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum PredNode {
    /// Binary boolean with right-linear chains allowed.
    Pred { lhs: PlanId, op: BoolOp, rhs: PlanId },
    /// Binary comparison.
    Comp { lhs: Option<PlanId>, rhs: Option<PlanId>, op: RelOp },
    /// Quantified set comparison.
    Alsm { elem: PlanId, elemset: PlanId, op: RelOp, eq_flag: i32 },
    /// Pattern match.
    LikeTerm { src: PlanId, pattern: PlanId },
    /// Key-range membership over one attribute.
    RangeTerm { attr: PlanId, ranges: Vec<KeyRange> },
    Not { operand: PlanId },
}

/// One FROM entry of an executable scan.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessSpec {
    pub access: AccessMethod,
    pub class_oid: Oid,
    pub hfid: Hfid,
    /// Search predicate applied during the scan.
    pub where_pred: Option<PlanId>,
    /// Attributes fetched by the scan.
    pub regu_list: Vec<PlanId>,
    pub next: Option<PlanId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMethod {
    Sequential,
    Index,
    ListFile,
    SetValues,
}

/// Heap file identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Hfid {
    pub vfid_volid: i32,
    pub vfid_fileid: i32,
    pub hpgid: i32,
}

/// Per-variant payload of an XASL node.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcKind {
    /// Sorted/grouped multi-row producer.
    BuildList {
        eptr: Option<PlanId>,
        groupby_list: Option<PlanId>,
        having_pred: Option<PlanId>,
    },
    /// Single-row (aggregate) producer.
    BuildValue { having_pred: Option<PlanId>, is_always_false: bool },
    MergeList { outer: Option<PlanId>, inner: Option<PlanId> },
    ConnectBy {
        start_with_pred: Option<PlanId>,
        after_connect_by_pred: Option<PlanId>,
    },
    Update { class_oid: Oid, assigns: Vec<PlanId> },
    Delete { class_oid: Oid },
    Insert { class_oid: Oid, values: Vec<PlanId> },
    Union { left: Option<PlanId>, right: Option<PlanId> },
    Difference { left: Option<PlanId>, right: Option<PlanId> },
    Intersection { left: Option<PlanId>, right: Option<PlanId> },
    ObjFetch { arg: Option<PlanId>, fetch_pred: Option<PlanId> },
    SetFetch { arg: Option<PlanId>, fetch_pred: Option<PlanId> },
    Scan,
    /// Side-effecting statement with no result table.
    Do,
}

impl ProcKind {
    /// Stable variant tag, the first field of the binary record.
    pub fn tag(&self) -> i32 {
        match self {
            ProcKind::BuildList { .. } => 1,
            ProcKind::BuildValue { .. } => 2,
            ProcKind::MergeList { .. } => 3,
            ProcKind::ConnectBy { .. } => 4,
            ProcKind::Update { .. } => 5,
            ProcKind::Delete { .. } => 6,
            ProcKind::Insert { .. } => 7,
            ProcKind::Union { .. } => 8,
            ProcKind::Difference { .. } => 9,
            ProcKind::Intersection { .. } => 10,
            ProcKind::ObjFetch { .. } => 11,
            ProcKind::Scan => 12,
            ProcKind::SetFetch { .. } => 13,
            ProcKind::Do => 14,
        }
    }
}

/// One plan-tree vertex. Field order here tracks the byte layout; the
/// serializer walks these slots in the fixed documented sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct XaslNode {
    pub kind: ProcKind,
    pub flags: i32,
    pub list_id: Option<PlanId>,
    pub after_iscan_list: Option<PlanId>,
    pub orderby_list: Option<PlanId>,
    pub ordbynum_pred: Option<PlanId>,
    pub ordbynum_val: Option<PlanId>,
    pub ordbynum_flag: i32,
    pub single_tuple: Option<PlanId>,
    pub is_single_tuple: bool,
    pub option: i32,
    pub outptr_list: Option<PlanId>,
    pub remote_outptr_list: Option<PlanId>,
    pub selected_upd_list: Option<PlanId>,
    pub spec_list: Vec<PlanId>,
    pub merge_spec_list: Vec<PlanId>,
    pub val_list: Option<PlanId>,
    pub merge_val_list: Option<PlanId>,
    pub aptr_list: Option<PlanId>,
    pub bptr_list: Option<PlanId>,
    pub dptr_list: Option<PlanId>,
    pub after_join_pred: Option<PlanId>,
    pub if_pred: Option<PlanId>,
    pub instnum_pred: Option<PlanId>,
    pub instnum_val: Option<PlanId>,
    pub instnum_flag: i32,
    pub fptr_list: Option<PlanId>,
    pub scan_ptr: Option<PlanId>,
    pub connect_by_ptr: Option<PlanId>,
    pub level_val: Option<PlanId>,
    pub level_regu: Option<PlanId>,
    pub isleaf_val: Option<PlanId>,
    pub isleaf_regu: Option<PlanId>,
    pub iscycle_val: Option<PlanId>,
    pub iscycle_regu: Option<PlanId>,
    pub curr_spec_list: Vec<PlanId>,
    pub next_scan_on: bool,
    pub next_scan_block_on: bool,
    pub cat_fetched: bool,
    pub composite_locking: bool,
    pub projected_size: i32,
    pub cardinality: f64,
    pub iscan_oid_order: bool,
    pub query_stmt: Option<PlanId>,
    pub next: Option<PlanId>,
}

impl XaslNode {
    pub fn new(kind: ProcKind) -> Self {
        Self {
            kind,
            flags: 0,
            list_id: None,
            after_iscan_list: None,
            orderby_list: None,
            ordbynum_pred: None,
            ordbynum_val: None,
            ordbynum_flag: 0,
            single_tuple: None,
            is_single_tuple: false,
            option: 0,
            outptr_list: None,
            remote_outptr_list: None,
            selected_upd_list: None,
            spec_list: Vec::new(),
            merge_spec_list: Vec::new(),
            val_list: None,
            merge_val_list: None,
            aptr_list: None,
            bptr_list: None,
            dptr_list: None,
            after_join_pred: None,
            if_pred: None,
            instnum_pred: None,
            instnum_val: None,
            instnum_flag: 0,
            fptr_list: None,
            scan_ptr: None,
            connect_by_ptr: None,
            level_val: None,
            level_regu: None,
            isleaf_val: None,
            isleaf_regu: None,
            iscycle_val: None,
            iscycle_regu: None,
            curr_spec_list: Vec::new(),
            next_scan_on: false,
            next_scan_block_on: false,
            cat_fetched: false,
            composite_locking: false,
            projected_size: 0,
            cardinality: 0.0,
            iscan_oid_order: false,
            query_stmt: None,
            next: None,
        }
    }
}

/// Stream header carried ahead of the body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XaslHeader {
    pub dbval_cnt: i32,
    pub creator_oid: Oid,
    pub class_oids: Vec<Oid>,
    pub repr_ids: Vec<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_identity_is_shareable() {
        let mut arena = PlanArena::new();
        let value = arena.alloc(PlanObj::Value(DbValue::Int(1)));
        let regu = arena.alloc(PlanObj::Regu(ReguVar::Const {
            value,
            domain: Domain::default(),
        }));
        let out = arena.alloc(PlanObj::OutPtrList(OutPtrList {
            valptrs: vec![regu, regu],
        }));
        match arena.obj(out) {
            PlanObj::OutPtrList(o) => assert_eq!(o.valptrs[0], o.valptrs[1]),
            _ => panic!("expected outptr list"),
        }
    }

    #[test]
    fn proc_tags_are_distinct() {
        let kinds = [
            ProcKind::BuildList {
                eptr: None,
                groupby_list: None,
                having_pred: None,
            },
            ProcKind::BuildValue {
                having_pred: None,
                is_always_false: false,
            },
            ProcKind::Scan,
            ProcKind::Union {
                left: None,
                right: None,
            },
        ];
        let mut tags: Vec<i32> = kinds.iter().map(|k| k.tag()).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), kinds.len());
    }
}
