//! Partition pruner.
//!
//! Given a normalized predicate and a partitioning scheme on a FROM
//! entry, computes the minimal set of partition children that can satisfy
//! the predicate. Soundness is the contract: a partition that might hold
//! a qualifying row is always kept; completeness is best effort.

pub mod catalog;
mod eval;

pub use catalog::{
    Catalog, CatalogError, EmptyCatalog, MemoryCatalog, PartBounds, PartState, PartitionKind,
    PartitionPart, PartitionScheme,
};
pub use eval::{eval_const, EvalFailure};

use crate::error::RewriteError;
use crate::graph::{ExprOp, Graph, Name, Node, NodeId, NodeKind};
use crate::types::{issue_codes, Issue};
use crate::value::{compare_bound, BoundCmp, BoundOp, DbValue};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Iteration cap when a HASH key range must be enumerated value by value.
const HASH_RANGE_ITERATION_LIMIT: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    /// Some spec had its child list reduced.
    pub pruned: bool,
    /// The predicate admits no partition at all; zero rows.
    pub always_false: bool,
    /// An unbound marker reached a partition-key expression; statement is
    /// non-cacheable and scans the full table.
    pub cannot_prepare: bool,
}

pub fn apply_partition_pruning(
    g: &mut Graph,
    stmt: NodeId,
    statement_index: usize,
    catalog: &dyn Catalog,
) -> Result<PruneOutcome, RewriteError> {
    let (from, where_head, already_pruned) = match &g.node(stmt).kind {
        NodeKind::Select(s) => (s.from, s.where_clause, s.partition_pruned),
        NodeKind::Update(u) => (u.spec, u.search_cond, u.partition_pruned),
        NodeKind::Delete(d) => (d.spec, d.search_cond, d.partition_pruned),
        _ => return Ok(PruneOutcome::default()),
    };
    if already_pruned {
        return Ok(PruneOutcome::default());
    }

    let mut outcome = PruneOutcome::default();
    for spec in g.collect_chain(from) {
        let entity = match g.node(spec).as_spec() {
            Some(s) if s.derived_table.is_none() => s
                .entity_name
                .and_then(|e| g.node(e).as_name().map(|n| n.name.clone())),
            _ => None,
        };
        let Some(entity) = entity else {
            continue;
        };
        let scheme = catalog
            .partition_scheme(&entity)
            .map_err(|err| RewriteError::PartitionWork {
                class: entity.clone(),
                detail: err.to_string(),
            })?;
        let Some(scheme) = scheme else {
            continue;
        };

        match prune_one_spec(g, spec, where_head, &scheme) {
            Selection::CannotPrepare => {
                outcome.cannot_prepare = true;
                g.add_issue(
                    Issue::info(
                        issue_codes::CANNOT_PREPARE,
                        format!(
                            "unbound marker in partition key of '{entity}'; \
                             plan not cacheable, full scan kept"
                        ),
                    )
                    .with_statement(statement_index),
                );
                mark_cannot_prepare(g, stmt);
                return Ok(outcome);
            }
            Selection::All => {}
            Selection::Some(set) => {
                let live: Vec<(usize, String)> = scheme
                    .live_parts()
                    .map(|(i, p)| (i, p.name.clone()))
                    .collect();
                let selected: Vec<&String> = live
                    .iter()
                    .filter(|(i, _)| set.contains(i))
                    .map(|(_, name)| name)
                    .collect();
                if selected.is_empty() {
                    outcome.always_false = true;
                    continue;
                }
                if selected.len() < live.len() {
                    replace_flat_entity_list(g, spec, &selected);
                    mark_pruned(g, stmt, spec);
                    outcome.pruned = true;
                }
            }
        }
    }
    Ok(outcome)
}

enum Selection {
    /// No restriction derivable; keep every partition.
    All,
    Some(BTreeSet<usize>),
    CannotPrepare,
}

fn prune_one_spec(
    g: &mut Graph,
    spec: NodeId,
    where_head: Option<NodeId>,
    scheme: &PartitionScheme,
) -> Selection {
    let mut selected: Option<BTreeSet<usize>> = None;

    for conjunct in g.collect_chain(where_head) {
        if g.node(conjunct).location != 0 {
            continue;
        }
        // Disjuncts union; one alternative off the key voids the conjunct.
        let mut conjunct_set: Option<BTreeSet<usize>> = Some(BTreeSet::new());
        for term in g.collect_or_chain(Some(conjunct)) {
            match term_partitions(g, term, spec, scheme) {
                Ok(Some(set)) => {
                    if let Some(acc) = &mut conjunct_set {
                        acc.extend(set);
                    }
                }
                Ok(None) => {
                    conjunct_set = None;
                    break;
                }
                Err(EvalFailure::UnboundHostVar) => return Selection::CannotPrepare,
                Err(EvalFailure::Unsupported) => {
                    conjunct_set = None;
                    break;
                }
            }
        }
        if let Some(set) = conjunct_set {
            selected = Some(match selected {
                None => set,
                Some(acc) => acc.intersection(&set).copied().collect(),
            });
        }
    }

    match selected {
        None => Selection::All,
        Some(set) => Selection::Some(set),
    }
}

/// Partitions one DNF term can reach, `Ok(None)` when the term does not
/// constrain the partition key.
fn term_partitions(
    g: &Graph,
    term: NodeId,
    spec: NodeId,
    scheme: &PartitionScheme,
) -> Result<Option<BTreeSet<usize>>, EvalFailure> {
    let Some(expr) = g.node(term).as_expr() else {
        return Ok(None);
    };
    let Some(arg1) = expr.arg1 else {
        return Ok(None);
    };
    let key = g.strip_prior(arg1);
    let is_key = matches!(
        g.node(key).as_name(),
        Some(n) if n.spec_id == Some(spec) && n.name == scheme.key_attr
    );
    if !is_key {
        return Ok(None);
    }

    match expr.op {
        ExprOp::Eq => {
            let Some(rhs) = expr.arg2 else {
                return Ok(None);
            };
            let value = eval_const(g, rhs)?;
            Ok(Some(point_partitions(scheme, &value)))
        }
        ExprOp::IsIn => {
            let Some(first) = expr.arg2 else {
                return Ok(None);
            };
            if g.node(first).is_query() {
                return Ok(None);
            }
            let mut set = BTreeSet::new();
            for item in g.collect_chain(Some(first)) {
                let value = eval_const(g, item)?;
                set.extend(point_partitions(scheme, &value));
            }
            Ok(Some(set))
        }
        ExprOp::Between => {
            let Some(bounds) = expr.arg2 else {
                return Ok(None);
            };
            sub_range_partitions(g, bounds, scheme).map(Some)
        }
        ExprOp::Range => {
            let Some(first_sub) = expr.arg2 else {
                return Ok(None);
            };
            let mut set = BTreeSet::new();
            for sub in g.collect_or_chain(Some(first_sub)) {
                set.extend(sub_range_partitions(g, sub, scheme)?);
            }
            Ok(Some(set))
        }
        ExprOp::Gt | ExprOp::Ge | ExprOp::Lt | ExprOp::Le => {
            let Some(rhs) = expr.arg2 else {
                return Ok(None);
            };
            let value = eval_const(g, rhs)?;
            let (lop, lo, uop, hi) = match expr.op {
                ExprOp::Gt => (BoundOp::Gt, Some(value), BoundOp::LtInf, None),
                ExprOp::Ge => (BoundOp::Ge, Some(value), BoundOp::LtInf, None),
                ExprOp::Lt => (BoundOp::GtInf, None, BoundOp::Lt, Some(value)),
                _ => (BoundOp::GtInf, None, BoundOp::Le, Some(value)),
            };
            Ok(Some(interval_partitions(scheme, lop, lo, uop, hi)))
        }
        _ => Ok(None),
    }
}

/// Endpoints of one sub-range (or a BETWEEN bound pair), evaluated.
fn sub_range_partitions(
    g: &Graph,
    sub: NodeId,
    scheme: &PartitionScheme,
) -> Result<BTreeSet<usize>, EvalFailure> {
    let Some(expr) = g.node(sub).as_expr() else {
        return Err(EvalFailure::Unsupported);
    };
    let op = if expr.op == ExprOp::BetweenAnd {
        ExprOp::BetweenGeLe
    } else {
        expr.op
    };
    let Some((lop, uop)) = op.range_bounds() else {
        return Err(EvalFailure::Unsupported);
    };
    let eval = |slot: Option<NodeId>| -> Result<DbValue, EvalFailure> {
        slot.map(|id| eval_const(g, id))
            .unwrap_or(Err(EvalFailure::Unsupported))
    };
    Ok(match (lop, uop) {
        (BoundOp::Eq, BoundOp::Eq) => point_partitions(scheme, &eval(expr.arg1)?),
        (BoundOp::GtInf, _) => {
            interval_partitions(scheme, lop, None, uop, Some(eval(expr.arg1)?))
        }
        (_, BoundOp::LtInf) => {
            interval_partitions(scheme, lop, Some(eval(expr.arg1)?), uop, None)
        }
        _ => interval_partitions(
            scheme,
            lop,
            Some(eval(expr.arg1)?),
            uop,
            Some(eval(expr.arg2)?),
        ),
    })
}

fn point_partitions(scheme: &PartitionScheme, value: &DbValue) -> BTreeSet<usize> {
    let mut set = BTreeSet::new();
    if value.is_null() {
        return set;
    }
    match scheme.kind {
        PartitionKind::Hash => {
            let size = scheme.parts.len().max(1);
            let index = (value.partition_hash() as usize) % size;
            if scheme.parts[index].state != PartState::Dropped {
                set.insert(index);
            }
        }
        PartitionKind::Range => {
            for (i, part) in scheme.live_parts() {
                if let PartBounds::Range { min, max } = &part.bounds {
                    if range_part_contains(min.as_ref(), max.as_ref(), value) {
                        set.insert(i);
                    }
                }
            }
        }
        PartitionKind::List => {
            for (i, part) in scheme.live_parts() {
                if let PartBounds::List { values } = &part.bounds {
                    if values
                        .iter()
                        .any(|v| v.compare(value) == Some(Ordering::Equal))
                    {
                        set.insert(i);
                    }
                }
            }
        }
    }
    set
}

/// `(min, max]` membership; an incomparable pair keeps the partition.
fn range_part_contains(min: Option<&DbValue>, max: Option<&DbValue>, value: &DbValue) -> bool {
    let above_min = match min {
        None => true,
        Some(min) => match value.compare(min) {
            Some(Ordering::Greater) => true,
            Some(_) => false,
            None => true,
        },
    };
    let below_max = match max {
        None => true,
        Some(max) => match value.compare(max) {
            Some(Ordering::Greater) => false,
            Some(_) => true,
            None => true,
        },
    };
    above_min && below_max
}

fn interval_partitions(
    scheme: &PartitionScheme,
    lop: BoundOp,
    lo: Option<DbValue>,
    uop: BoundOp,
    hi: Option<DbValue>,
) -> BTreeSet<usize> {
    let mut set = BTreeSet::new();
    match scheme.kind {
        PartitionKind::Hash => {
            // Only a bounded discrete interval can be enumerated; anything
            // else keeps every partition.
            match enumerate_interval(lop, &lo, uop, &hi) {
                Some(values) => {
                    for value in values {
                        set.extend(point_partitions(scheme, &value));
                    }
                }
                None => {
                    set.extend(scheme.live_parts().map(|(i, _)| i));
                }
            }
        }
        PartitionKind::Range => {
            for (i, part) in scheme.live_parts() {
                let PartBounds::Range { min, max } = &part.bounds else {
                    continue;
                };
                if !interval_disjoint_with_part(
                    lop,
                    lo.as_ref(),
                    uop,
                    hi.as_ref(),
                    min.as_ref(),
                    max.as_ref(),
                ) {
                    set.insert(i);
                }
            }
        }
        PartitionKind::List => {
            for (i, part) in scheme.live_parts() {
                let PartBounds::List { values } = &part.bounds else {
                    continue;
                };
                if values
                    .iter()
                    .any(|v| value_in_interval(v, lop, lo.as_ref(), uop, hi.as_ref()))
                {
                    set.insert(i);
                }
            }
        }
    }
    set
}

/// Values of a bounded discrete interval, in order. `None` when the
/// domain cannot be iterated or the interval is too wide.
fn enumerate_interval(
    lop: BoundOp,
    lo: &Option<DbValue>,
    uop: BoundOp,
    hi: &Option<DbValue>,
) -> Option<Vec<DbValue>> {
    let (Some(lo), Some(hi)) = (lo, hi) else {
        return None;
    };
    let mut current = match lop {
        BoundOp::Ge | BoundOp::Eq => lo.clone(),
        BoundOp::Gt => lo.successor()?,
        _ => return None,
    };
    let mut out = Vec::new();
    for _ in 0..HASH_RANGE_ITERATION_LIMIT {
        let ordering = current.compare(hi)?;
        let inside = match uop {
            BoundOp::Le | BoundOp::Eq => ordering != Ordering::Greater,
            BoundOp::Lt => ordering == Ordering::Less,
            _ => return None,
        };
        if !inside {
            return Some(out);
        }
        out.push(current.clone());
        current = current.successor()?;
    }
    None
}

fn interval_disjoint_with_part(
    lop: BoundOp,
    lo: Option<&DbValue>,
    uop: BoundOp,
    hi: Option<&DbValue>,
    part_min: Option<&DbValue>,
    part_max: Option<&DbValue>,
) -> bool {
    let null = DbValue::Null;
    let (term_hi, term_hi_op) = (hi.unwrap_or(&null), uop);
    let (part_lo, part_lo_op) = match part_min {
        Some(v) => (v, BoundOp::Gt),
        None => (&null, BoundOp::GtInf),
    };
    if matches!(
        compare_bound(term_hi, term_hi_op, part_lo, part_lo_op),
        Some(BoundCmp::Less) | Some(BoundCmp::LessAdj)
    ) {
        return true;
    }

    let (term_lo, term_lo_op) = (lo.unwrap_or(&null), lop);
    let (part_hi, part_hi_op) = match part_max {
        Some(v) => (v, BoundOp::Le),
        None => (&null, BoundOp::LtInf),
    };
    matches!(
        compare_bound(term_lo, term_lo_op, part_hi, part_hi_op),
        Some(BoundCmp::Greater) | Some(BoundCmp::GreaterAdj)
    )
}

fn value_in_interval(
    value: &DbValue,
    lop: BoundOp,
    lo: Option<&DbValue>,
    uop: BoundOp,
    hi: Option<&DbValue>,
) -> bool {
    let above = match (lop, lo) {
        (BoundOp::GtInf, _) | (_, None) => true,
        (BoundOp::Ge | BoundOp::Eq, Some(lo)) => {
            matches!(value.compare(lo), Some(Ordering::Greater | Ordering::Equal))
        }
        (BoundOp::Gt, Some(lo)) => matches!(value.compare(lo), Some(Ordering::Greater)),
        _ => true,
    };
    let below = match (uop, hi) {
        (BoundOp::LtInf, _) | (_, None) => true,
        (BoundOp::Le | BoundOp::Eq, Some(hi)) => {
            matches!(value.compare(hi), Some(Ordering::Less | Ordering::Equal))
        }
        (BoundOp::Lt, Some(hi)) => matches!(value.compare(hi), Some(Ordering::Less)),
        _ => true,
    };
    above && below
}

fn replace_flat_entity_list(g: &mut Graph, spec: NodeId, names: &[&String]) {
    let mut head: Option<NodeId> = None;
    for name in names {
        let node = g.alloc(Node::new(NodeKind::Name(Name::attr(
            None,
            name.as_str().to_string(),
        ))));
        head = Some(match head {
            None => node,
            Some(h) => g.append_to_chain(Some(h), node),
        });
    }
    if let Some(s) = g.node_mut(spec).as_spec_mut() {
        s.flat_entity_list = head;
        s.partition_pruned = true;
    }
}

fn mark_pruned(g: &mut Graph, stmt: NodeId, _spec: NodeId) {
    match &mut g.node_mut(stmt).kind {
        NodeKind::Select(s) => s.partition_pruned = true,
        NodeKind::Update(u) => u.partition_pruned = true,
        NodeKind::Delete(d) => d.partition_pruned = true,
        _ => {}
    }
}

fn mark_cannot_prepare(g: &mut Graph, stmt: NodeId) {
    match &mut g.node_mut(stmt).kind {
        NodeKind::Select(s) => s.cannot_prepare = true,
        NodeKind::Update(u) => u.cannot_prepare = true,
        NodeKind::Delete(d) => d.cannot_prepare = true,
        _ => {}
    }
}
