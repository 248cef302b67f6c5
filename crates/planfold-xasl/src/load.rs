//! Stream loader: the reader-side mirror of the writer's field order.
//!
//! Chases offsets with a memo table so a shared byte offset rebuilds one
//! shared [`PlanId`], preserving the writer's sharing structure.

use crate::error::StreamError;
use crate::plan::{
    AccessSpec, Hfid, KeyRange, ListId, OutPtrList, PlanArena, PlanId, PlanObj, PredNode,
    ProcKind, ReguVar, SortKey, SortList, ValList, XaslHeader, XaslNode, Domain,
};
use crate::ser::{
    access_from_tag, agg_from_tag, arith_from_tag, body_start, bool_from_tag, range_from_tag,
    rel_from_tag,
};
use crate::stream::Unpacker;
use std::collections::HashMap;

/// Reads a serialized stream back into a plan arena, returning the arena,
/// the root node, and the header.
pub fn load(bytes: &[u8]) -> Result<(PlanArena, PlanId, XaslHeader), StreamError> {
    let mut unpacker = Unpacker::new(bytes);
    let header_size = read_i32(&mut unpacker, 0)? as usize;
    let dbval_cnt = read_i32(&mut unpacker, 0)?;
    let creator_oid = unpacker
        .read_oid()
        .ok_or_else(|| corrupt(0, "truncated creator oid"))?;
    let n_oids = read_i32(&mut unpacker, 0)? as usize;
    let mut class_oids = Vec::with_capacity(n_oids);
    for _ in 0..n_oids {
        class_oids.push(
            unpacker
                .read_oid()
                .ok_or_else(|| corrupt(0, "truncated class oid"))?,
        );
    }
    let mut repr_ids = Vec::with_capacity(n_oids);
    for _ in 0..n_oids {
        repr_ids.push(read_i32(&mut unpacker, 0)?);
    }
    let body_size = read_i32(&mut unpacker, 0)? as usize;
    let header = XaslHeader {
        dbval_cnt,
        creator_oid,
        class_oids,
        repr_ids,
    };

    let root_offset = body_start(header_size);
    if bytes.len() < root_offset + body_size {
        return Err(corrupt(bytes.len(), "body shorter than advertised"));
    }

    let mut loader = Loader {
        bytes,
        arena: PlanArena::new(),
        memo: HashMap::new(),
    };
    let root = loader
        .load_xasl(root_offset as i32)?
        .ok_or_else(|| corrupt(root_offset, "missing root record"))?;
    Ok((loader.arena, root, header))
}

fn corrupt(offset: usize, detail: &str) -> StreamError {
    StreamError::Corrupt {
        offset,
        detail: detail.to_string(),
    }
}

fn read_i32(unpacker: &mut Unpacker<'_>, offset: usize) -> Result<i32, StreamError> {
    unpacker
        .read_i32()
        .ok_or_else(|| corrupt(offset, "truncated integer"))
}

struct Loader<'a> {
    bytes: &'a [u8],
    arena: PlanArena,
    memo: HashMap<i32, PlanId>,
}

macro_rules! memoized {
    ($self:ident, $offset:ident, $body:expr) => {{
        if $offset == 0 {
            return Ok(None);
        }
        if let Some(&id) = $self.memo.get(&$offset) {
            return Ok(Some(id));
        }
        let obj = $body;
        let id = $self.arena.alloc(obj);
        $self.memo.insert($offset, id);
        Ok(Some(id))
    }};
}

impl<'a> Loader<'a> {
    fn cursor(&self, offset: i32) -> Unpacker<'a> {
        Unpacker::at(self.bytes, offset as usize)
    }

    fn load_xasl(&mut self, offset: i32) -> Result<Option<PlanId>, StreamError> {
        memoized!(self, offset, {
            let mut u = self.cursor(offset);
            let tag = read_i32(&mut u, offset as usize)?;
            let flags = read_i32(&mut u, offset as usize)?;
            let list_id = self.slot(&mut u, Loader::load_list_id)?;
            let after_iscan_list = self.slot(&mut u, Loader::load_sort_list)?;
            let orderby_list = self.slot(&mut u, Loader::load_sort_list)?;
            let ordbynum_pred = self.slot(&mut u, Loader::load_pred)?;
            let ordbynum_val = self.slot(&mut u, Loader::load_value)?;
            let ordbynum_flag = read_i32(&mut u, offset as usize)?;
            let single_tuple = self.slot(&mut u, Loader::load_val_list)?;
            let is_single_tuple = self.read_bool(&mut u, offset)?;
            let option = read_i32(&mut u, offset as usize)?;
            let outptr_list = self.slot(&mut u, Loader::load_outptr_list)?;
            let remote_outptr_list = self.slot(&mut u, Loader::load_outptr_list)?;
            let selected_upd_list = self.slot(&mut u, Loader::load_val_list)?;
            let spec_list = self.slot_list(&mut u, Loader::load_access_spec)?;
            let merge_spec_list = self.slot_list(&mut u, Loader::load_access_spec)?;
            let val_list = self.slot(&mut u, Loader::load_val_list)?;
            let merge_val_list = self.slot(&mut u, Loader::load_val_list)?;
            let aptr_list = self.slot(&mut u, Loader::load_xasl_req)?;
            let bptr_list = self.slot(&mut u, Loader::load_xasl_req)?;
            let dptr_list = self.slot(&mut u, Loader::load_xasl_req)?;
            let after_join_pred = self.slot(&mut u, Loader::load_pred)?;
            let if_pred = self.slot(&mut u, Loader::load_pred)?;
            let instnum_pred = self.slot(&mut u, Loader::load_pred)?;
            let instnum_val = self.slot(&mut u, Loader::load_value)?;
            let instnum_flag = read_i32(&mut u, offset as usize)?;
            let fptr_list = self.slot(&mut u, Loader::load_xasl_req)?;
            let scan_ptr = self.slot(&mut u, Loader::load_xasl_req)?;
            let connect_by_ptr = self.slot(&mut u, Loader::load_xasl_req)?;
            let level_val = self.slot(&mut u, Loader::load_value)?;
            let level_regu = self.slot(&mut u, Loader::load_regu)?;
            let isleaf_val = self.slot(&mut u, Loader::load_value)?;
            let isleaf_regu = self.slot(&mut u, Loader::load_regu)?;
            let iscycle_val = self.slot(&mut u, Loader::load_value)?;
            let iscycle_regu = self.slot(&mut u, Loader::load_regu)?;
            let curr_spec_list = self.slot_list(&mut u, Loader::load_access_spec)?;
            let next_scan_on = self.read_bool(&mut u, offset)?;
            let next_scan_block_on = self.read_bool(&mut u, offset)?;
            let cat_fetched = self.read_bool(&mut u, offset)?;
            let composite_locking = self.read_bool(&mut u, offset)?;
            let kind = self.load_proc(&mut u, tag, offset)?;
            let projected_size = read_i32(&mut u, offset as usize)?;
            let cardinality = u
                .read_f64()
                .ok_or_else(|| corrupt(offset as usize, "truncated cardinality"))?;
            let iscan_oid_order = self.read_bool(&mut u, offset)?;
            let query_stmt = self.slot(&mut u, Loader::load_str)?;
            let next = self.slot(&mut u, Loader::load_xasl_req)?;

            PlanObj::Xasl(XaslNode {
                kind,
                flags,
                list_id,
                after_iscan_list,
                orderby_list,
                ordbynum_pred,
                ordbynum_val,
                ordbynum_flag,
                single_tuple,
                is_single_tuple,
                option,
                outptr_list,
                remote_outptr_list,
                selected_upd_list,
                spec_list,
                merge_spec_list,
                val_list,
                merge_val_list,
                aptr_list,
                bptr_list,
                dptr_list,
                after_join_pred,
                if_pred,
                instnum_pred,
                instnum_val,
                instnum_flag,
                fptr_list,
                scan_ptr,
                connect_by_ptr,
                level_val,
                level_regu,
                isleaf_val,
                isleaf_regu,
                iscycle_val,
                iscycle_regu,
                curr_spec_list,
                next_scan_on,
                next_scan_block_on,
                cat_fetched,
                composite_locking,
                projected_size,
                cardinality,
                iscan_oid_order,
                query_stmt,
                next,
            })
        })
    }

    /// A slot whose referent loader signature returns `Option<PlanId>`.
    fn slot(
        &mut self,
        u: &mut Unpacker<'a>,
        loader: fn(&mut Self, i32) -> Result<Option<PlanId>, StreamError>,
    ) -> Result<Option<PlanId>, StreamError> {
        let offset = read_i32(u, u.position())?;
        loader(self, offset)
    }

    fn slot_list(
        &mut self,
        u: &mut Unpacker<'a>,
        loader: fn(&mut Self, i32) -> Result<Option<PlanId>, StreamError>,
    ) -> Result<Vec<PlanId>, StreamError> {
        let count = read_i32(u, u.position())?;
        let mut out = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            let offset = read_i32(u, u.position())?;
            if let Some(id) = loader(self, offset)? {
                out.push(id);
            }
        }
        Ok(out)
    }

    fn read_bool(&self, u: &mut Unpacker<'a>, offset: i32) -> Result<bool, StreamError> {
        u.read_bool()
            .ok_or_else(|| corrupt(offset as usize, "truncated flag"))
    }

    fn load_xasl_req(&mut self, offset: i32) -> Result<Option<PlanId>, StreamError> {
        self.load_xasl(offset)
    }

    fn load_proc(
        &mut self,
        u: &mut Unpacker<'a>,
        tag: i32,
        offset: i32,
    ) -> Result<ProcKind, StreamError> {
        Ok(match tag {
            1 => ProcKind::BuildList {
                eptr: self.slot(u, Loader::load_xasl_req)?,
                groupby_list: self.slot(u, Loader::load_sort_list)?,
                having_pred: self.slot(u, Loader::load_pred)?,
            },
            2 => ProcKind::BuildValue {
                having_pred: self.slot(u, Loader::load_pred)?,
                is_always_false: self.read_bool(u, offset)?,
            },
            3 => ProcKind::MergeList {
                outer: self.slot(u, Loader::load_xasl_req)?,
                inner: self.slot(u, Loader::load_xasl_req)?,
            },
            4 => ProcKind::ConnectBy {
                start_with_pred: self.slot(u, Loader::load_pred)?,
                after_connect_by_pred: self.slot(u, Loader::load_pred)?,
            },
            5 => ProcKind::Update {
                class_oid: u
                    .read_oid()
                    .ok_or_else(|| corrupt(offset as usize, "truncated class oid"))?,
                assigns: self.slot_list(u, Loader::load_regu)?,
            },
            6 => ProcKind::Delete {
                class_oid: u
                    .read_oid()
                    .ok_or_else(|| corrupt(offset as usize, "truncated class oid"))?,
            },
            7 => ProcKind::Insert {
                class_oid: u
                    .read_oid()
                    .ok_or_else(|| corrupt(offset as usize, "truncated class oid"))?,
                values: self.slot_list(u, Loader::load_regu)?,
            },
            8 => ProcKind::Union {
                left: self.slot(u, Loader::load_xasl_req)?,
                right: self.slot(u, Loader::load_xasl_req)?,
            },
            9 => ProcKind::Difference {
                left: self.slot(u, Loader::load_xasl_req)?,
                right: self.slot(u, Loader::load_xasl_req)?,
            },
            10 => ProcKind::Intersection {
                left: self.slot(u, Loader::load_xasl_req)?,
                right: self.slot(u, Loader::load_xasl_req)?,
            },
            11 => ProcKind::ObjFetch {
                arg: self.slot(u, Loader::load_regu)?,
                fetch_pred: self.slot(u, Loader::load_pred)?,
            },
            12 => ProcKind::Scan,
            13 => ProcKind::SetFetch {
                arg: self.slot(u, Loader::load_regu)?,
                fetch_pred: self.slot(u, Loader::load_pred)?,
            },
            14 => ProcKind::Do,
            other => {
                return Err(corrupt(
                    offset as usize,
                    &format!("unknown proc tag {other}"),
                ))
            }
        })
    }

    fn load_regu(&mut self, offset: i32) -> Result<Option<PlanId>, StreamError> {
        memoized!(self, offset, {
            let mut u = self.cursor(offset);
            let tag = read_i32(&mut u, offset as usize)?;
            let domain = self.read_domain(&mut u, offset)?;
            let regu = match tag {
                1 => ReguVar::Const {
                    value: self.required(self.slot_offset(&mut u)?, Loader::load_value, offset)?,
                    domain,
                },
                2 => ReguVar::HostVar {
                    index: read_i32(&mut u, offset as usize)?,
                    domain,
                },
                3 => ReguVar::Attr {
                    attr_id: read_i32(&mut u, offset as usize)?,
                    domain,
                },
                4 => ReguVar::Position {
                    pos: read_i32(&mut u, offset as usize)?,
                    domain,
                },
                5 => ReguVar::List {
                    list_id: self
                        .required(self.slot_offset(&mut u)?, Loader::load_list_id, offset)?,
                    domain,
                },
                6 => ReguVar::Arith {
                    op: arith_from_tag(read_i32(&mut u, offset as usize)?)
                        .ok_or_else(|| corrupt(offset as usize, "bad arith op"))?,
                    lhs: self.slot(&mut u, Loader::load_regu)?,
                    rhs: self.slot(&mut u, Loader::load_regu)?,
                    domain,
                },
                7 => ReguVar::Aggregate {
                    func: agg_from_tag(read_i32(&mut u, offset as usize)?)
                        .ok_or_else(|| corrupt(offset as usize, "bad aggregate"))?,
                    operand: self.slot(&mut u, Loader::load_regu)?,
                    domain,
                },
                8 => ReguVar::Func {
                    code: read_i32(&mut u, offset as usize)?,
                    args: self.slot_list(&mut u, Loader::load_regu)?,
                    domain,
                },
                other => {
                    return Err(corrupt(
                        offset as usize,
                        &format!("unknown regu tag {other}"),
                    ))
                }
            };
            PlanObj::Regu(regu)
        })
    }

    fn slot_offset(&self, u: &mut Unpacker<'a>) -> Result<i32, StreamError> {
        read_i32(u, u.position())
    }

    fn required(
        &mut self,
        offset: i32,
        loader: fn(&mut Self, i32) -> Result<Option<PlanId>, StreamError>,
        at: i32,
    ) -> Result<PlanId, StreamError> {
        loader(self, offset)?.ok_or_else(|| corrupt(at as usize, "unexpected null reference"))
    }

    fn load_pred(&mut self, offset: i32) -> Result<Option<PlanId>, StreamError> {
        memoized!(self, offset, {
            let mut u = self.cursor(offset);
            let tag = read_i32(&mut u, offset as usize)?;
            let pred = match tag {
                1 => {
                    let lhs = self.required(self.slot_offset(&mut u)?, Loader::load_pred, offset)?;
                    let op = bool_from_tag(read_i32(&mut u, offset as usize)?)
                        .ok_or_else(|| corrupt(offset as usize, "bad bool op"))?;
                    let rhs = self.required(self.slot_offset(&mut u)?, Loader::load_pred, offset)?;
                    PredNode::Pred { lhs, op, rhs }
                }
                2 => PredNode::Comp {
                    lhs: self.slot(&mut u, Loader::load_regu)?,
                    rhs: self.slot(&mut u, Loader::load_regu)?,
                    op: rel_from_tag(read_i32(&mut u, offset as usize)?)
                        .ok_or_else(|| corrupt(offset as usize, "bad rel op"))?,
                },
                3 => PredNode::Alsm {
                    elem: self.required(self.slot_offset(&mut u)?, Loader::load_regu, offset)?,
                    elemset: self.required(self.slot_offset(&mut u)?, Loader::load_regu, offset)?,
                    op: rel_from_tag(read_i32(&mut u, offset as usize)?)
                        .ok_or_else(|| corrupt(offset as usize, "bad rel op"))?,
                    eq_flag: read_i32(&mut u, offset as usize)?,
                },
                4 => PredNode::LikeTerm {
                    src: self.required(self.slot_offset(&mut u)?, Loader::load_regu, offset)?,
                    pattern: self.required(self.slot_offset(&mut u)?, Loader::load_regu, offset)?,
                },
                5 => {
                    let attr =
                        self.required(self.slot_offset(&mut u)?, Loader::load_regu, offset)?;
                    let count = read_i32(&mut u, offset as usize)?;
                    let mut ranges = Vec::with_capacity(count.max(0) as usize);
                    for _ in 0..count {
                        let kind = range_from_tag(read_i32(&mut u, offset as usize)?)
                            .ok_or_else(|| corrupt(offset as usize, "bad range kind"))?;
                        let key1 = self.slot(&mut u, Loader::load_regu)?;
                        let key2 = self.slot(&mut u, Loader::load_regu)?;
                        ranges.push(KeyRange { kind, key1, key2 });
                    }
                    PredNode::RangeTerm { attr, ranges }
                }
                6 => PredNode::Not {
                    operand: self.required(self.slot_offset(&mut u)?, Loader::load_pred, offset)?,
                },
                other => {
                    return Err(corrupt(
                        offset as usize,
                        &format!("unknown pred tag {other}"),
                    ))
                }
            };
            PlanObj::Pred(pred)
        })
    }

    fn load_access_spec(&mut self, offset: i32) -> Result<Option<PlanId>, StreamError> {
        memoized!(self, offset, {
            let mut u = self.cursor(offset);
            let access = access_from_tag(read_i32(&mut u, offset as usize)?)
                .ok_or_else(|| corrupt(offset as usize, "bad access method"))?;
            let class_oid = u
                .read_oid()
                .ok_or_else(|| corrupt(offset as usize, "truncated class oid"))?;
            let hfid = Hfid {
                vfid_volid: read_i32(&mut u, offset as usize)?,
                vfid_fileid: read_i32(&mut u, offset as usize)?,
                hpgid: read_i32(&mut u, offset as usize)?,
            };
            let where_pred = self.slot(&mut u, Loader::load_pred)?;
            let regu_list = self.slot_list(&mut u, Loader::load_regu)?;
            let next = self.slot(&mut u, Loader::load_access_spec)?;
            PlanObj::AccessSpec(AccessSpec {
                access,
                class_oid,
                hfid,
                where_pred,
                regu_list,
                next,
            })
        })
    }

    fn load_outptr_list(&mut self, offset: i32) -> Result<Option<PlanId>, StreamError> {
        memoized!(self, offset, {
            let mut u = self.cursor(offset);
            let valptrs = self.slot_list(&mut u, Loader::load_regu)?;
            PlanObj::OutPtrList(OutPtrList { valptrs })
        })
    }

    fn load_val_list(&mut self, offset: i32) -> Result<Option<PlanId>, StreamError> {
        memoized!(self, offset, {
            let mut u = self.cursor(offset);
            let values = self.slot_list(&mut u, Loader::load_value)?;
            PlanObj::ValList(ValList { values })
        })
    }

    fn load_sort_list(&mut self, offset: i32) -> Result<Option<PlanId>, StreamError> {
        memoized!(self, offset, {
            let mut u = self.cursor(offset);
            let count = read_i32(&mut u, offset as usize)?;
            let mut keys = Vec::with_capacity(count.max(0) as usize);
            for _ in 0..count {
                let pos = read_i32(&mut u, offset as usize)?;
                let descending = self.read_bool(&mut u, offset)?;
                keys.push(SortKey { pos, descending });
            }
            PlanObj::SortList(SortList { keys })
        })
    }

    fn load_list_id(&mut self, offset: i32) -> Result<Option<PlanId>, StreamError> {
        memoized!(self, offset, {
            let mut u = self.cursor(offset);
            let id = u
                .read_i64()
                .ok_or_else(|| corrupt(offset as usize, "truncated list id"))?;
            let tuple_count = read_i32(&mut u, offset as usize)?;
            let type_count = read_i32(&mut u, offset as usize)?;
            PlanObj::ListId(ListId {
                id,
                tuple_count,
                type_count,
            })
        })
    }

    fn load_value(&mut self, offset: i32) -> Result<Option<PlanId>, StreamError> {
        memoized!(self, offset, {
            let mut u = self.cursor(offset);
            let value = u
                .read_db_value()
                .ok_or_else(|| corrupt(offset as usize, "bad db value"))?;
            PlanObj::Value(value)
        })
    }

    fn load_str(&mut self, offset: i32) -> Result<Option<PlanId>, StreamError> {
        memoized!(self, offset, {
            let mut u = self.cursor(offset);
            let s = u
                .read_str()
                .ok_or_else(|| corrupt(offset as usize, "bad string"))?;
            PlanObj::Str(s)
        })
    }

    fn read_domain(&self, u: &mut Unpacker<'a>, offset: i32) -> Result<Domain, StreamError> {
        Ok(Domain {
            type_tag: read_i32(u, offset as usize)?,
            precision: read_i32(u, offset as usize)?,
            scale: read_i32(u, offset as usize)?,
            codeset: read_i32(u, offset as usize)?,
            class_oid: u
                .read_oid()
                .ok_or_else(|| corrupt(offset as usize, "truncated domain oid"))?,
        })
    }
}
