//! Auto-parameterization: literal constants in sargable positions become
//! numbered host-variable markers so a cached plan is reusable across
//! literals. Partition-pruning keys keep their literal until pruning has
//! run, and FULL_RANGE terms are never parameterized.

use crate::graph::{ExprOp, Graph, HostVar, Node, NodeFlags, NodeId, NodeKind};

/// Identifies partition-key attributes for the exclusion rule.
pub struct PartitionKeys {
    /// `(spec id, key attribute name)` per partitioned FROM entry.
    pub keys: Vec<(NodeId, String)>,
    /// Pruning already replaced the spec's entity list; the key literal
    /// is no longer needed.
    pub already_pruned: bool,
}

impl PartitionKeys {
    pub fn none() -> Self {
        Self {
            keys: Vec::new(),
            already_pruned: false,
        }
    }

    fn excludes(&self, g: &Graph, attr: NodeId) -> bool {
        if self.already_pruned {
            return false;
        }
        let Some(name) = g.node(attr).as_name() else {
            return false;
        };
        let Some(spec) = name.spec_id else {
            return false;
        };
        self.keys
            .iter()
            .any(|(key_spec, key_name)| *key_spec == spec && *key_name == name.name)
    }
}

pub fn auto_parameterize(g: &mut Graph, slot: &Option<NodeId>, partition_keys: &PartitionKeys) {
    for conjunct in g.collect_chain(*slot) {
        for term in g.collect_or_chain(Some(conjunct)) {
            parameterize_term(g, term, partition_keys);
        }
    }
}

fn parameterize_term(g: &mut Graph, term: NodeId, partition_keys: &PartitionKeys) {
    let Some(expr) = g.node(term).as_expr().cloned() else {
        return;
    };
    let Some(arg1) = expr.arg1 else {
        return;
    };
    let lhs = g.strip_prior(arg1);
    let lhs_ok = g.is_attr(lhs)
        || matches!(
            g.node(lhs).as_expr().map(|e| e.op),
            Some(ExprOp::InstNum) | Some(ExprOp::OrderbyNum)
        );
    if !lhs_ok {
        return;
    }
    if partition_keys.excludes(g, lhs) {
        return;
    }
    if g.node(term).flags.contains(NodeFlags::FULL_RANGE) {
        return;
    }

    match expr.op {
        ExprOp::Eq | ExprOp::Gt | ExprOp::Ge | ExprOp::Lt | ExprOp::Le | ExprOp::Like => {
            if let Some(rhs) = expr.arg2 {
                parameterize_value(g, rhs);
            }
        }
        ExprOp::Between => {
            if let Some(bounds) = expr.arg2 {
                let bounds_expr = g.node(bounds).as_expr().cloned();
                if let Some(bounds_expr) = bounds_expr {
                    if let Some(lo) = bounds_expr.arg1 {
                        parameterize_value(g, lo);
                    }
                    if let Some(hi) = bounds_expr.arg2 {
                        parameterize_value(g, hi);
                    }
                }
            }
        }
        ExprOp::Range => {
            // Single sub-range only; multi-range search keys stay literal.
            if let Some(sub) = expr.arg2 {
                if g.node(sub).or_next.is_none() {
                    let sub_expr = g.node(sub).as_expr().cloned();
                    if let Some(sub_expr) = sub_expr {
                        if let Some(lo) = sub_expr.arg1 {
                            parameterize_value(g, lo);
                        }
                        if let Some(hi) = sub_expr.arg2 {
                            parameterize_value(g, hi);
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

/// Swaps a non-NULL literal for a fresh bound marker, in place so every
/// holder of the id sees the marker.
fn parameterize_value(g: &mut Graph, id: NodeId) {
    if !g.is_const_not_hostvar(id) {
        return;
    }
    let Some(value) = g.node(id).as_value().cloned() else {
        // CAST-wrapped constants keep their cast; only bare literals
        // become parameters.
        return;
    };
    if value.is_null() {
        return;
    }
    let ty = g.node(id).type_enum;
    let index = g.next_host_var_index(Some(value));
    let mut marker = Node::new(NodeKind::HostVar(HostVar { index, bound: true }));
    marker.type_enum = ty;
    g.overwrite(id, marker);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lower_sql_for_tests;
    use crate::normalize::{cnf, convert_to_range, reduce_comp_pair_terms};
    use crate::value::DbValue;

    fn where_slot(g: &mut Graph, stmt: NodeId) -> Option<NodeId> {
        match &g.node(stmt).kind {
            NodeKind::Select(s) => s.where_clause,
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn literals_become_markers_with_values() {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(&mut g, "SELECT a, b FROM t WHERE a = 10 AND b < 20");
        let mut slot = where_slot(&mut g, stmt).and_then(|w| cnf(&mut g, w));
        auto_parameterize(&mut g, &slot, &PartitionKeys::none());
        assert_eq!(g.print_predicate(slot.take()), "t.a = ?0 AND t.b < ?1");
        assert_eq!(g.host_var_value(0), Some(&DbValue::Int(10)));
        assert_eq!(g.host_var_value(1), Some(&DbValue::Int(20)));
        assert_eq!(g.bound_host_var_count(), 2);
    }

    #[test]
    fn range_bounds_parameterize() {
        let mut g = Graph::new();
        let stmt =
            lower_sql_for_tests(&mut g, "SELECT a FROM t WHERE a >= 10 AND a <= 20");
        let mut slot = where_slot(&mut g, stmt).and_then(|w| cnf(&mut g, w));
        reduce_comp_pair_terms(&mut g, &mut slot);
        convert_to_range(&mut g, &mut slot);
        auto_parameterize(&mut g, &slot, &PartitionKeys::none());
        assert_eq!(g.print_predicate(slot), "t.a RANGE (?0 GE_LE ?1)");
    }

    #[test]
    fn partition_key_literal_is_kept() {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(&mut g, "SELECT k, b FROM t WHERE k = 7 AND b = 1");
        let slot = where_slot(&mut g, stmt).and_then(|w| cnf(&mut g, w));
        let spec = match &g.node(stmt).kind {
            NodeKind::Select(s) => g.collect_chain(s.from)[0],
            _ => unreachable!(),
        };
        let keys = PartitionKeys {
            keys: vec![(spec, "k".into())],
            already_pruned: false,
        };
        auto_parameterize(&mut g, &slot, &keys);
        assert_eq!(g.print_predicate(slot), "t.k = 7 AND t.b = ?0");
    }

    #[test]
    fn null_literal_is_not_parameterized() {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(&mut g, "SELECT a, b FROM t WHERE a = NULL AND b = 2");
        let slot = where_slot(&mut g, stmt).and_then(|w| cnf(&mut g, w));
        auto_parameterize(&mut g, &slot, &PartitionKeys::none());
        assert_eq!(g.print_predicate(slot), "t.a = NULL AND t.b = ?0");
    }

    #[test]
    fn existing_host_vars_are_untouched() {
        let mut g = Graph::new();
        let stmt = lower_sql_for_tests(&mut g, "SELECT a FROM t WHERE a = ?");
        let slot = where_slot(&mut g, stmt).and_then(|w| cnf(&mut g, w));
        auto_parameterize(&mut g, &slot, &PartitionKeys::none());
        assert_eq!(g.print_predicate(slot), "t.a = ?0");
        assert_eq!(g.bound_host_var_count(), 0);
    }
}
