//! Executable-plan tree and its XASL byte stream.
//!
//! The stream is self-describing: `[header_size][header][body_size][body]`
//! with big-endian integers, 8-aligned records, and a dedup table that
//! writes every shared sub-object exactly once. [`load`] is the reader
//! mirror used by tests and the CLI's round-trip check.

mod dedup;
mod error;
mod load;
mod lower;
mod plan;
mod ser;
mod stream;

pub use error::StreamError;
pub use load::load;
pub use lower::lower_statement;
pub use plan::{
    AccessMethod, AccessSpec, AggFunc, ArithOp, BoolOp, Domain, Hfid, KeyRange, ListId,
    OutPtrList, PlanArena, PlanId, PlanObj, PredNode, ProcKind, RangeKind, ReguVar, RelOp,
    SortKey, SortList, ValList, XaslHeader, XaslNode,
};
pub use ser::serialize;
pub use stream::{make_align, Packer, Stream, Unpacker, ALIGN_UNIT};

#[cfg(test)]
mod tests {
    use super::*;
    use planfold_core::value::DbValue;

    fn scan_plan_with_shared_regu() -> (PlanArena, PlanId) {
        let mut arena = PlanArena::new();
        let value = arena.alloc(PlanObj::Value(DbValue::Int(42)));
        let shared = arena.alloc(PlanObj::Regu(ReguVar::Const {
            value,
            domain: Domain::default(),
        }));
        let pred = arena.alloc(PlanObj::Pred(PredNode::Comp {
            lhs: Some(shared),
            rhs: Some(shared),
            op: RelOp::Le,
        }));
        let out = arena.alloc(PlanObj::OutPtrList(OutPtrList {
            valptrs: vec![shared],
        }));
        let mut node = XaslNode::new(ProcKind::Scan);
        node.if_pred = Some(pred);
        node.outptr_list = Some(out);
        node.cardinality = 12.5;
        let root = arena.alloc(PlanObj::Xasl(node));
        (arena, root)
    }

    #[test]
    fn serialize_then_load_preserves_sharing() {
        let (arena, root) = scan_plan_with_shared_regu();
        let header = XaslHeader::default();
        let bytes = serialize(&arena, root, &header).unwrap();
        let (loaded, new_root, new_header) = load(&bytes).unwrap();
        assert_eq!(new_header, header);

        let node = loaded.xasl(new_root).unwrap();
        let PlanObj::Pred(PredNode::Comp { lhs, rhs, .. }) = loaded.obj(node.if_pred.unwrap())
        else {
            panic!("expected comparison predicate");
        };
        // Shared on the way in, shared on the way out.
        assert_eq!(lhs, rhs);
        let PlanObj::OutPtrList(out) = loaded.obj(node.outptr_list.unwrap()) else {
            panic!("expected outptr list");
        };
        assert_eq!(Some(out.valptrs[0]), *lhs);
    }

    #[test]
    fn serialization_is_deterministic() {
        let (arena, root) = scan_plan_with_shared_regu();
        let header = XaslHeader::default();
        let first = serialize(&arena, root, &header).unwrap();
        let second = serialize(&arena, root, &header).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn header_roundtrips() {
        use planfold_core::value::Oid;
        let (arena, root) = scan_plan_with_shared_regu();
        let header = XaslHeader {
            dbval_cnt: 3,
            creator_oid: Oid::new(11, 2, 1),
            class_oids: vec![Oid::new(100, 1, 0), Oid::new(200, 2, 0)],
            repr_ids: vec![5, 6],
        };
        let bytes = serialize(&arena, root, &header).unwrap();
        let (_, _, loaded_header) = load(&bytes).unwrap();
        assert_eq!(loaded_header, header);
    }

    #[test]
    fn cardinality_survives_as_f64() {
        let (arena, root) = scan_plan_with_shared_regu();
        let bytes = serialize(&arena, root, &XaslHeader::default()).unwrap();
        let (loaded, new_root, _) = load(&bytes).unwrap();
        let node = loaded.xasl(new_root).unwrap();
        assert!((node.cardinality - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let (arena, root) = scan_plan_with_shared_regu();
        let bytes = serialize(&arena, root, &XaslHeader::default()).unwrap();
        let truncated = &bytes[..bytes.len() / 2];
        assert!(load(truncated).is_err());
    }
}
