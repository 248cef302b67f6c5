//! Plan-to-stream serialization.
//!
//! Each `save` first sizes the record with a dry-run pack, reserves the
//! aligned region, records the offset in the dedup table, and only then
//! packs the payload — so a parent's record precedes its children and a
//! back reference to an in-flight record resolves to its reservation.
//! One code path packs both phases; a dry run resolves every reference
//! to offset 0 without recursing.

use crate::dedup::DedupTable;
use crate::error::StreamError;
use crate::plan::{
    AccessMethod, AccessSpec, AggFunc, ArithOp, BoolOp, Domain, KeyRange, PlanArena, PlanId,
    PlanObj, PredNode, ProcKind, RangeKind, ReguVar, RelOp, XaslHeader, XaslNode,
};
use crate::stream::{make_align, Packer, Stream};

/// Serializes the tree rooted at `root` into the framed byte layout
/// `[header_size][header][body_size][body]`.
pub fn serialize(
    arena: &PlanArena,
    root: PlanId,
    header: &XaslHeader,
) -> Result<Vec<u8>, StreamError> {
    let mut serializer = Serializer {
        arena,
        stream: Stream::new(),
        dedup: DedupTable::new(),
    };

    let header_size = header_byte_size(header);
    let prefix_len = make_align(4 + header_size + 4);
    serializer.stream.reserve_aligned(prefix_len);

    serializer.save(root)?;

    let body_size = serializer.stream.len() - prefix_len;
    let mut prefix = Packer::with_capacity(prefix_len);
    prefix.write_i32(header_size as i32);
    prefix.write_i32(header.dbval_cnt);
    prefix.write_oid(&header.creator_oid);
    prefix.write_i32(header.class_oids.len() as i32);
    for oid in &header.class_oids {
        prefix.write_oid(oid);
    }
    for repr in &header.repr_ids {
        prefix.write_i32(*repr);
    }
    prefix.write_i32(body_size as i32);

    let mut stream = serializer.stream;
    let bytes = prefix.into_bytes();
    stream.put(0, &bytes);
    Ok(stream.into_bytes())
}

/// Byte length of the header record (excluding both size words).
pub fn header_byte_size(header: &XaslHeader) -> usize {
    4 + 8 + 4 + header.class_oids.len() * 8 + header.repr_ids.len() * 4
}

/// Offset of the first body record, as both sides compute it.
pub fn body_start(header_size: usize) -> usize {
    make_align(4 + header_size + 4)
}

struct Serializer<'a> {
    arena: &'a PlanArena,
    stream: Stream,
    dedup: DedupTable,
}

impl<'a> Serializer<'a> {
    fn save(&mut self, id: PlanId) -> Result<i32, StreamError> {
        if let Some(offset) = self.dedup.offset_of(id) {
            return Ok(offset);
        }
        let size = self.pack_obj(id, true)?.len();
        let offset = self.stream.reserve_aligned(size) as i32;
        self.dedup.mark_visited(id, offset);
        let payload = self.pack_obj(id, false)?;
        if payload.len() != size {
            return Err(StreamError::SizeMismatch(format!("{id}")));
        }
        self.stream.put(offset as usize, &payload);
        Ok(offset)
    }

    fn save_ref(&mut self, id: Option<PlanId>, dry: bool) -> Result<i32, StreamError> {
        if dry {
            return Ok(0);
        }
        match id {
            None => Ok(0),
            Some(id) => self.save(id),
        }
    }

    fn pack_obj(&mut self, id: PlanId, dry: bool) -> Result<Vec<u8>, StreamError> {
        let mut p = Packer::new();
        // The arena is immutable during serialization; clone the object
        // header so child saves can borrow the serializer mutably.
        let obj = self.arena.obj(id).clone();
        match &obj {
            PlanObj::Xasl(node) => self.pack_xasl(&mut p, node, dry)?,
            PlanObj::Regu(regu) => self.pack_regu(&mut p, regu, dry)?,
            PlanObj::Pred(pred) => self.pack_pred(&mut p, pred, dry)?,
            PlanObj::AccessSpec(spec) => self.pack_access_spec(&mut p, spec, dry)?,
            PlanObj::OutPtrList(list) => {
                p.write_i32(list.valptrs.len() as i32);
                for valptr in &list.valptrs {
                    let off = self.save_ref(Some(*valptr), dry)?;
                    p.write_i32(off);
                }
            }
            PlanObj::ValList(list) => {
                p.write_i32(list.values.len() as i32);
                for value in &list.values {
                    let off = self.save_ref(Some(*value), dry)?;
                    p.write_i32(off);
                }
            }
            PlanObj::SortList(list) => {
                p.write_i32(list.keys.len() as i32);
                for key in &list.keys {
                    p.write_i32(key.pos);
                    p.write_bool(key.descending);
                }
            }
            PlanObj::ListId(list_id) => {
                p.write_i64(list_id.id);
                p.write_i32(list_id.tuple_count);
                p.write_i32(list_id.type_count);
            }
            PlanObj::Value(value) => p.write_db_value(value),
            PlanObj::Str(s) => p.write_str(s),
        }
        Ok(p.into_bytes())
    }

    fn pack_ptr(
        &mut self,
        p: &mut Packer,
        id: Option<PlanId>,
        dry: bool,
    ) -> Result<(), StreamError> {
        let off = self.save_ref(id, dry)?;
        p.write_i32(off);
        Ok(())
    }

    fn pack_ptr_list(
        &mut self,
        p: &mut Packer,
        list: &[PlanId],
        dry: bool,
    ) -> Result<(), StreamError> {
        p.write_i32(list.len() as i32);
        for id in list {
            self.pack_ptr(p, Some(*id), dry)?;
        }
        Ok(())
    }

    fn pack_domain(&mut self, p: &mut Packer, domain: &Domain) {
        p.write_i32(domain.type_tag);
        p.write_i32(domain.precision);
        p.write_i32(domain.scale);
        p.write_i32(domain.codeset);
        p.write_oid(&domain.class_oid);
    }

    /// The fixed XASL record order; the reader mirrors it byte for byte.
    fn pack_xasl(&mut self, p: &mut Packer, node: &XaslNode, dry: bool) -> Result<(), StreamError> {
        p.write_i32(node.kind.tag());
        p.write_i32(node.flags);
        self.pack_ptr(p, node.list_id, dry)?;
        self.pack_ptr(p, node.after_iscan_list, dry)?;
        self.pack_ptr(p, node.orderby_list, dry)?;
        self.pack_ptr(p, node.ordbynum_pred, dry)?;
        self.pack_ptr(p, node.ordbynum_val, dry)?;
        p.write_i32(node.ordbynum_flag);
        self.pack_ptr(p, node.single_tuple, dry)?;
        p.write_bool(node.is_single_tuple);
        p.write_i32(node.option);
        self.pack_ptr(p, node.outptr_list, dry)?;
        self.pack_ptr(p, node.remote_outptr_list, dry)?;
        self.pack_ptr(p, node.selected_upd_list, dry)?;
        self.pack_ptr_list(p, &node.spec_list, dry)?;
        self.pack_ptr_list(p, &node.merge_spec_list, dry)?;
        self.pack_ptr(p, node.val_list, dry)?;
        self.pack_ptr(p, node.merge_val_list, dry)?;
        self.pack_ptr(p, node.aptr_list, dry)?;
        self.pack_ptr(p, node.bptr_list, dry)?;
        self.pack_ptr(p, node.dptr_list, dry)?;
        self.pack_ptr(p, node.after_join_pred, dry)?;
        self.pack_ptr(p, node.if_pred, dry)?;
        self.pack_ptr(p, node.instnum_pred, dry)?;
        self.pack_ptr(p, node.instnum_val, dry)?;
        p.write_i32(node.instnum_flag);
        self.pack_ptr(p, node.fptr_list, dry)?;
        self.pack_ptr(p, node.scan_ptr, dry)?;
        self.pack_ptr(p, node.connect_by_ptr, dry)?;
        self.pack_ptr(p, node.level_val, dry)?;
        self.pack_ptr(p, node.level_regu, dry)?;
        self.pack_ptr(p, node.isleaf_val, dry)?;
        self.pack_ptr(p, node.isleaf_regu, dry)?;
        self.pack_ptr(p, node.iscycle_val, dry)?;
        self.pack_ptr(p, node.iscycle_regu, dry)?;
        self.pack_ptr_list(p, &node.curr_spec_list, dry)?;
        p.write_bool(node.next_scan_on);
        p.write_bool(node.next_scan_block_on);
        p.write_bool(node.cat_fetched);
        p.write_bool(node.composite_locking);
        self.pack_proc(p, &node.kind, dry)?;
        p.write_i32(node.projected_size);
        p.write_f64(node.cardinality);
        p.write_bool(node.iscan_oid_order);
        self.pack_ptr(p, node.query_stmt, dry)?;
        self.pack_ptr(p, node.next, dry)?;
        Ok(())
    }

    fn pack_proc(&mut self, p: &mut Packer, kind: &ProcKind, dry: bool) -> Result<(), StreamError> {
        match kind {
            ProcKind::BuildList {
                eptr,
                groupby_list,
                having_pred,
            } => {
                self.pack_ptr(p, *eptr, dry)?;
                self.pack_ptr(p, *groupby_list, dry)?;
                self.pack_ptr(p, *having_pred, dry)?;
            }
            ProcKind::BuildValue {
                having_pred,
                is_always_false,
            } => {
                self.pack_ptr(p, *having_pred, dry)?;
                p.write_bool(*is_always_false);
            }
            ProcKind::MergeList { outer, inner } => {
                self.pack_ptr(p, *outer, dry)?;
                self.pack_ptr(p, *inner, dry)?;
            }
            ProcKind::ConnectBy {
                start_with_pred,
                after_connect_by_pred,
            } => {
                self.pack_ptr(p, *start_with_pred, dry)?;
                self.pack_ptr(p, *after_connect_by_pred, dry)?;
            }
            ProcKind::Update { class_oid, assigns } => {
                p.write_oid(class_oid);
                self.pack_ptr_list(p, assigns, dry)?;
            }
            ProcKind::Delete { class_oid } => p.write_oid(class_oid),
            ProcKind::Insert { class_oid, values } => {
                p.write_oid(class_oid);
                self.pack_ptr_list(p, values, dry)?;
            }
            ProcKind::Union { left, right }
            | ProcKind::Difference { left, right }
            | ProcKind::Intersection { left, right } => {
                self.pack_ptr(p, *left, dry)?;
                self.pack_ptr(p, *right, dry)?;
            }
            ProcKind::Scan | ProcKind::Do => {}
            ProcKind::ObjFetch { arg, fetch_pred }
            | ProcKind::SetFetch { arg, fetch_pred } => {
                self.pack_ptr(p, *arg, dry)?;
                self.pack_ptr(p, *fetch_pred, dry)?;
            }
        }
        Ok(())
    }

    fn pack_regu(&mut self, p: &mut Packer, regu: &ReguVar, dry: bool) -> Result<(), StreamError> {
        match regu {
            ReguVar::Const { value, domain } => {
                p.write_i32(1);
                self.pack_domain(p, domain);
                self.pack_ptr(p, Some(*value), dry)?;
            }
            ReguVar::HostVar { index, domain } => {
                p.write_i32(2);
                self.pack_domain(p, domain);
                p.write_i32(*index);
            }
            ReguVar::Attr { attr_id, domain } => {
                p.write_i32(3);
                self.pack_domain(p, domain);
                p.write_i32(*attr_id);
            }
            ReguVar::Position { pos, domain } => {
                p.write_i32(4);
                self.pack_domain(p, domain);
                p.write_i32(*pos);
            }
            ReguVar::List { list_id, domain } => {
                p.write_i32(5);
                self.pack_domain(p, domain);
                self.pack_ptr(p, Some(*list_id), dry)?;
            }
            ReguVar::Arith {
                op,
                lhs,
                rhs,
                domain,
            } => {
                p.write_i32(6);
                self.pack_domain(p, domain);
                p.write_i32(arith_tag(*op));
                self.pack_ptr(p, *lhs, dry)?;
                self.pack_ptr(p, *rhs, dry)?;
            }
            ReguVar::Aggregate {
                func,
                operand,
                domain,
            } => {
                p.write_i32(7);
                self.pack_domain(p, domain);
                p.write_i32(agg_tag(*func));
                self.pack_ptr(p, *operand, dry)?;
            }
            ReguVar::Func { code, args, domain } => {
                p.write_i32(8);
                self.pack_domain(p, domain);
                p.write_i32(*code);
                self.pack_ptr_list(p, args, dry)?;
            }
        }
        Ok(())
    }

    fn pack_pred(&mut self, p: &mut Packer, pred: &PredNode, dry: bool) -> Result<(), StreamError> {
        match pred {
            PredNode::Pred { lhs, op, rhs } => {
                p.write_i32(1);
                self.pack_ptr(p, Some(*lhs), dry)?;
                p.write_i32(bool_tag(*op));
                self.pack_ptr(p, Some(*rhs), dry)?;
            }
            PredNode::Comp { lhs, rhs, op } => {
                p.write_i32(2);
                self.pack_ptr(p, *lhs, dry)?;
                self.pack_ptr(p, *rhs, dry)?;
                p.write_i32(rel_tag(*op));
            }
            PredNode::Alsm {
                elem,
                elemset,
                op,
                eq_flag,
            } => {
                p.write_i32(3);
                self.pack_ptr(p, Some(*elem), dry)?;
                self.pack_ptr(p, Some(*elemset), dry)?;
                p.write_i32(rel_tag(*op));
                p.write_i32(*eq_flag);
            }
            PredNode::LikeTerm { src, pattern } => {
                p.write_i32(4);
                self.pack_ptr(p, Some(*src), dry)?;
                self.pack_ptr(p, Some(*pattern), dry)?;
            }
            PredNode::RangeTerm { attr, ranges } => {
                p.write_i32(5);
                self.pack_ptr(p, Some(*attr), dry)?;
                p.write_i32(ranges.len() as i32);
                for KeyRange { kind, key1, key2 } in ranges {
                    p.write_i32(range_tag(*kind));
                    self.pack_ptr(p, *key1, dry)?;
                    self.pack_ptr(p, *key2, dry)?;
                }
            }
            PredNode::Not { operand } => {
                p.write_i32(6);
                self.pack_ptr(p, Some(*operand), dry)?;
            }
        }
        Ok(())
    }

    fn pack_access_spec(
        &mut self,
        p: &mut Packer,
        spec: &AccessSpec,
        dry: bool,
    ) -> Result<(), StreamError> {
        p.write_i32(access_tag(spec.access));
        p.write_oid(&spec.class_oid);
        p.write_i32(spec.hfid.vfid_volid);
        p.write_i32(spec.hfid.vfid_fileid);
        p.write_i32(spec.hfid.hpgid);
        self.pack_ptr(p, spec.where_pred, dry)?;
        self.pack_ptr_list(p, &spec.regu_list, dry)?;
        self.pack_ptr(p, spec.next, dry)?;
        Ok(())
    }
}

pub(crate) fn arith_tag(op: ArithOp) -> i32 {
    match op {
        ArithOp::Add => 1,
        ArithOp::Sub => 2,
        ArithOp::Mul => 3,
        ArithOp::Div => 4,
        ArithOp::UnaryMinus => 5,
        ArithOp::Mod => 6,
        ArithOp::Concat => 7,
    }
}

pub(crate) fn arith_from_tag(tag: i32) -> Option<ArithOp> {
    Some(match tag {
        1 => ArithOp::Add,
        2 => ArithOp::Sub,
        3 => ArithOp::Mul,
        4 => ArithOp::Div,
        5 => ArithOp::UnaryMinus,
        6 => ArithOp::Mod,
        7 => ArithOp::Concat,
        _ => return None,
    })
}

pub(crate) fn agg_tag(func: AggFunc) -> i32 {
    match func {
        AggFunc::Min => 1,
        AggFunc::Max => 2,
        AggFunc::Sum => 3,
        AggFunc::Avg => 4,
        AggFunc::Count => 5,
        AggFunc::CountStar => 6,
    }
}

pub(crate) fn agg_from_tag(tag: i32) -> Option<AggFunc> {
    Some(match tag {
        1 => AggFunc::Min,
        2 => AggFunc::Max,
        3 => AggFunc::Sum,
        4 => AggFunc::Avg,
        5 => AggFunc::Count,
        6 => AggFunc::CountStar,
        _ => return None,
    })
}

pub(crate) fn rel_tag(op: RelOp) -> i32 {
    match op {
        RelOp::Eq => 1,
        RelOp::Ne => 2,
        RelOp::Ge => 3,
        RelOp::Gt => 4,
        RelOp::Lt => 5,
        RelOp::Le => 6,
        RelOp::NullsafeEq => 7,
        RelOp::IsNull => 8,
        RelOp::IsNotNull => 9,
        RelOp::Like => 10,
    }
}

pub(crate) fn rel_from_tag(tag: i32) -> Option<RelOp> {
    Some(match tag {
        1 => RelOp::Eq,
        2 => RelOp::Ne,
        3 => RelOp::Ge,
        4 => RelOp::Gt,
        5 => RelOp::Lt,
        6 => RelOp::Le,
        7 => RelOp::NullsafeEq,
        8 => RelOp::IsNull,
        9 => RelOp::IsNotNull,
        10 => RelOp::Like,
        _ => return None,
    })
}

pub(crate) fn bool_tag(op: BoolOp) -> i32 {
    match op {
        BoolOp::And => 1,
        BoolOp::Or => 2,
    }
}

pub(crate) fn bool_from_tag(tag: i32) -> Option<BoolOp> {
    Some(match tag {
        1 => BoolOp::And,
        2 => BoolOp::Or,
        _ => return None,
    })
}

pub(crate) fn range_tag(kind: RangeKind) -> i32 {
    match kind {
        RangeKind::EqNa => 1,
        RangeKind::GeLe => 2,
        RangeKind::GeLt => 3,
        RangeKind::GtLe => 4,
        RangeKind::GtLt => 5,
        RangeKind::GeInf => 6,
        RangeKind::GtInf => 7,
        RangeKind::InfLe => 8,
        RangeKind::InfLt => 9,
    }
}

pub(crate) fn range_from_tag(tag: i32) -> Option<RangeKind> {
    Some(match tag {
        1 => RangeKind::EqNa,
        2 => RangeKind::GeLe,
        3 => RangeKind::GeLt,
        4 => RangeKind::GtLe,
        5 => RangeKind::GtLt,
        6 => RangeKind::GeInf,
        7 => RangeKind::GtInf,
        8 => RangeKind::InfLe,
        9 => RangeKind::InfLt,
        _ => return None,
    })
}

pub(crate) fn access_tag(access: AccessMethod) -> i32 {
    match access {
        AccessMethod::Sequential => 1,
        AccessMethod::Index => 2,
        AccessMethod::ListFile => 3,
        AccessMethod::SetValues => 4,
    }
}

pub(crate) fn access_from_tag(tag: i32) -> Option<AccessMethod> {
    Some(match tag {
        1 => AccessMethod::Sequential,
        2 => AccessMethod::Index,
        3 => AccessMethod::ListFile,
        4 => AccessMethod::SetValues,
        _ => return None,
    })
}
