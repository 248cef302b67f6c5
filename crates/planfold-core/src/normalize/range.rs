//! RANGE conversion and range arithmetic.
//!
//! `convert_to_range` turns comparisons, BETWEENs and IN-lists whose left
//! side is one attribute (or INST_NUM) into a single RANGE atom per DNF
//! cluster, unioning the cluster's sub-ranges. `apply_range_intersection`
//! then intersects sibling RANGE conjuncts on the same attribute; an
//! empty intersection folds to FALSE under the location discipline.

use super::{make_sub_range, propagate_false, same_term_attr, term_attr};
use crate::graph::{ExprOp, Graph, NodeId};
use crate::value::{compare_bound, BoundCmp, BoundOp, DbValue};

pub fn convert_to_range(g: &mut Graph, slot: &mut Option<NodeId>) {
    let whole_predicate_len = g.chain_len(*slot);
    let mut cursor = *slot;
    while let Some(conjunct) = cursor {
        let mut dnf_cursor = Some(conjunct);
        while let Some(term) = dnf_cursor {
            dnf_cursor = g.node(term).or_next;
            if term_attr(g, term).is_none() {
                continue;
            }
            let Some(op) = g.node(term).as_expr().map(|e| e.op) else {
                continue;
            };
            if op == ExprOp::Eq && term == conjunct && g.node(term).or_next.is_none() {
                let rhs = g.node(term).as_expr().and_then(|e| e.arg2);
                let rhs_const = rhs.map(|r| g.is_const(r)).unwrap_or(false);
                let lhs_instnum = term_attr(g, term)
                    .and_then(|a| g.node(a).as_expr().map(|e| e.op == ExprOp::InstNum))
                    .unwrap_or(false);
                // A lone equality is the planner's business, and an
                // attribute-to-attribute equality is a join term, not a
                // sarg.
                if !lhs_instnum && (whole_predicate_len == 1 || !rhs_const) {
                    continue;
                }
            }
            match op {
                ExprOp::Eq
                | ExprOp::Gt
                | ExprOp::Ge
                | ExprOp::Lt
                | ExprOp::Le
                | ExprOp::Between
                | ExprOp::IsIn
                | ExprOp::Range => {
                    convert_cluster(g, term);
                    if g.node(term).as_expr().map(|e| e.op) == Some(ExprOp::Range) {
                        if merge_union(g, term) == MergeOutcome::Unbound {
                            // INF_INF covers everything but NULL.
                            if let Some(e) = g.node_mut(term).as_expr_mut() {
                                e.op = ExprOp::IsNotNull;
                                e.arg2 = None;
                            }
                        }
                    }
                    // The cluster collapsed into `term`; re-read the link.
                    dnf_cursor = g.node(term).or_next;
                }
                _ => {}
            }
        }
        cursor = g.node(conjunct).next;
    }
}

/// Converts `term` to a RANGE atom and folds every later DNF sibling on
/// the same attribute into its sub-range list.
fn convert_cluster(g: &mut Graph, term: NodeId) {
    let Some(head_subs) = term_sub_ranges(g, term) else {
        return;
    };
    if let Some(e) = g.node_mut(term).as_expr_mut() {
        e.op = ExprOp::Range;
        e.arg2 = Some(head_subs);
    }

    let mut prev = term;
    while let Some(sibling) = g.node(prev).or_next {
        if !same_term_attr(g, term, sibling) {
            prev = sibling;
            continue;
        }
        let Some(sub) = term_sub_ranges(g, sibling) else {
            prev = sibling;
            continue;
        };
        // Append the sibling's sub-ranges and unlink it from the cluster.
        let mut tail = head_subs;
        while let Some(next) = g.node(tail).or_next {
            tail = next;
        }
        g.node_mut(tail).or_next = Some(sub);
        let after = g.node(sibling).or_next;
        g.node_mut(prev).or_next = after;
        g.node_mut(sibling).or_next = None;
    }
}

/// The sub-range list equivalent to one comparison term, or `None` when
/// the term cannot become part of a RANGE.
fn term_sub_ranges(g: &mut Graph, term: NodeId) -> Option<NodeId> {
    let expr = g.node(term).as_expr()?.clone();
    let location = g.node(term).location;
    match expr.op {
        ExprOp::Eq => {
            let rhs = expr.arg2?;
            Some(make_sub_range(g, ExprOp::BetweenEqNa, Some(rhs), None, location))
        }
        ExprOp::Gt => {
            let rhs = expr.arg2?;
            Some(make_sub_range(g, ExprOp::BetweenGtInf, Some(rhs), None, location))
        }
        ExprOp::Ge => {
            let rhs = expr.arg2?;
            Some(make_sub_range(g, ExprOp::BetweenGeInf, Some(rhs), None, location))
        }
        ExprOp::Lt => {
            let rhs = expr.arg2?;
            Some(make_sub_range(g, ExprOp::BetweenInfLt, None, Some(rhs), location))
        }
        ExprOp::Le => {
            let rhs = expr.arg2?;
            Some(make_sub_range(g, ExprOp::BetweenInfLe, None, Some(rhs), location))
        }
        ExprOp::Between => {
            let bounds = expr.arg2?;
            if g.node(bounds).as_expr().map(|e| e.op) == Some(ExprOp::BetweenAnd) {
                if let Some(e) = g.node_mut(bounds).as_expr_mut() {
                    e.op = ExprOp::BetweenGeLe;
                }
            }
            Some(bounds)
        }
        ExprOp::IsIn => {
            // IN over a value list only; `IN (subquery)` stays put.
            let first = expr.arg2?;
            if g.node(first).is_query() {
                return None;
            }
            let values = g.collect_chain(Some(first));
            let mut head: Option<NodeId> = None;
            let mut tail: Option<NodeId> = None;
            for value in values {
                g.node_mut(value).next = None;
                let sub = make_sub_range(g, ExprOp::BetweenEqNa, Some(value), None, location);
                match tail {
                    None => head = Some(sub),
                    Some(t) => g.node_mut(t).or_next = Some(sub),
                }
                tail = Some(sub);
            }
            head
        }
        ExprOp::Range => expr.arg2,
        _ => None,
    }
}

/// Constant endpoint pair of one sub-range; the node ids reference the
/// literal endpoints (`None` marks an infinity side).
#[derive(Clone, Copy)]
struct Bounds {
    lop: BoundOp,
    lo: Option<NodeId>,
    uop: BoundOp,
    hi: Option<NodeId>,
}

fn decompose(g: &Graph, sub: NodeId) -> Option<Bounds> {
    let expr = g.node(sub).as_expr()?;
    let (lop, uop) = expr.op.range_bounds()?;
    let check = |id: Option<NodeId>| -> Option<NodeId> {
        let id = id?;
        if g.is_const_not_hostvar(id) {
            Some(id)
        } else {
            None
        }
    };
    match (lop, uop) {
        (BoundOp::GtInf, _) => Some(Bounds {
            lop,
            lo: None,
            uop,
            hi: Some(check(expr.arg1)?),
        }),
        (_, BoundOp::LtInf) => Some(Bounds {
            lop,
            lo: Some(check(expr.arg1)?),
            uop,
            hi: None,
        }),
        (BoundOp::Eq, BoundOp::Eq) => {
            let v = check(expr.arg1)?;
            Some(Bounds {
                lop,
                lo: Some(v),
                uop,
                hi: Some(v),
            })
        }
        _ => Some(Bounds {
            lop,
            lo: Some(check(expr.arg1)?),
            uop,
            hi: Some(check(expr.arg2)?),
        }),
    }
}

fn bound_value(g: &Graph, id: Option<NodeId>) -> DbValue {
    id.and_then(|id| g.literal_of(id).cloned())
        .unwrap_or(DbValue::Null)
}

fn cmp_bounds(
    g: &Graph,
    a: (BoundOp, Option<NodeId>),
    b: (BoundOp, Option<NodeId>),
) -> Option<BoundCmp> {
    let va = bound_value(g, a.1);
    let vb = bound_value(g, b.1);
    compare_bound(&va, a.0, &vb, b.0)
}

/// All four endpoint comparisons of two sub-ranges.
fn cross_compare(g: &Graph, r: &Bounds, s: &Bounds) -> Option<[BoundCmp; 4]> {
    Some([
        cmp_bounds(g, (r.lop, r.lo), (s.lop, s.lo))?,
        cmp_bounds(g, (r.lop, r.lo), (s.uop, s.hi))?,
        cmp_bounds(g, (r.uop, r.hi), (s.lop, s.lo))?,
        cmp_bounds(g, (r.uop, r.hi), (s.uop, s.hi))?,
    ])
}

fn strictly_disjoint(cmps: &[BoundCmp; 4]) -> bool {
    (cmps[0] == BoundCmp::Less || cmps[0] == BoundCmp::Greater)
        && cmps.iter().all(|c| c == &cmps[0])
}

/// Rebuilds a sub-range node from merged bounds. `None` means INF_INF.
fn build_sub_range(g: &mut Graph, bounds: Bounds, location: u16) -> Option<NodeId> {
    let mut lop = bounds.lop;
    let mut uop = bounds.uop;
    // A collapsed point keeps the EQ_NA form.
    if lop == BoundOp::Eq || uop == BoundOp::Eq {
        let point = cmp_bounds(g, (BoundOp::Ge, bounds.lo), (BoundOp::Le, bounds.hi))
            == Some(BoundCmp::Equal);
        if point && lop == BoundOp::Eq && uop == BoundOp::Eq {
            return Some(make_sub_range(
                g,
                ExprOp::BetweenEqNa,
                bounds.lo,
                None,
                location,
            ));
        }
        if lop == BoundOp::Eq {
            lop = BoundOp::Ge;
        }
        if uop == BoundOp::Eq {
            uop = BoundOp::Le;
        }
    }
    let op = ExprOp::from_range_bounds(lop, uop)?;
    if op == ExprOp::BetweenGeLe
        && cmp_bounds(g, (lop, bounds.lo), (uop, bounds.hi)) == Some(BoundCmp::Equal)
    {
        return Some(make_sub_range(
            g,
            ExprOp::BetweenEqNa,
            bounds.lo,
            None,
            location,
        ));
    }
    Some(make_sub_range(g, op, bounds.lo, bounds.hi, location))
}

fn bounds_empty(g: &Graph, bounds: &Bounds) -> bool {
    matches!(
        cmp_bounds(g, (bounds.lop, bounds.lo), (bounds.uop, bounds.hi)),
        Some(BoundCmp::Greater) | Some(BoundCmp::GreaterAdj)
    )
}

#[derive(PartialEq, Eq)]
enum MergeOutcome {
    Merged,
    Unbound,
}

/// Unions the sub-ranges of one RANGE atom: overlapping or adjacent
/// constant sub-ranges coalesce. `Unbound` reports a merge that covers
/// the whole domain.
fn merge_union(g: &mut Graph, term: NodeId) -> MergeOutcome {
    let location = g.node(term).location;
    'restart: loop {
        let list = match g.node(term).as_expr().and_then(|e| e.arg2) {
            Some(head) => g.collect_or_chain(Some(head)),
            None => return MergeOutcome::Merged,
        };
        for (i, r_id) in list.iter().copied().enumerate() {
            let Some(r) = decompose(g, r_id) else {
                continue;
            };
            for (j, s_id) in list.iter().copied().enumerate().skip(i + 1) {
                let Some(s) = decompose(g, s_id) else {
                    continue;
                };
                let Some(cmps) = cross_compare(g, &r, &s) else {
                    continue;
                };
                if strictly_disjoint(&cmps) {
                    continue;
                }

                // Union: the smaller lower bound and the larger upper.
                let (lop, lo) = if matches!(cmps[0], BoundCmp::Greater | BoundCmp::GreaterAdj) {
                    (s.lop, s.lo)
                } else {
                    (r.lop, r.lo)
                };
                let (uop, hi) = if matches!(cmps[3], BoundCmp::Less | BoundCmp::LessAdj) {
                    (s.uop, s.hi)
                } else {
                    (r.uop, r.hi)
                };
                let merged = Bounds { lop, lo, uop, hi };

                // Unlink s, rebuild r in place.
                let s_next = g.node(s_id).or_next;
                g.node_mut(list[j - 1]).or_next = s_next;
                g.node_mut(s_id).or_next = None;

                let Some(new_sub) = build_sub_range(g, merged, location) else {
                    return MergeOutcome::Unbound;
                };
                if bounds_empty(g, &merged) {
                    return MergeOutcome::Unbound;
                }
                let r_or_next = g.node(r_id).or_next;
                g.node_mut(new_sub).or_next = r_or_next;
                if i == 0 {
                    if let Some(e) = g.node_mut(term).as_expr_mut() {
                        e.arg2 = Some(new_sub);
                    }
                } else {
                    g.node_mut(list[i - 1]).or_next = Some(new_sub);
                }
                g.node_mut(r_id).or_next = None;
                continue 'restart;
            }
        }
        return MergeOutcome::Merged;
    }
}

pub fn apply_range_intersection(g: &mut Graph, slot: &mut Option<NodeId>) {
    let mut node_cursor = *slot;
    while let Some(node) = node_cursor {
        node_cursor = g.node(node).next;
        if !is_single_range_term(g, node) {
            continue;
        }

        // An invalid constant sub-range alone empties the conjunct.
        if prune_empty_subs(g, node) {
            detach_conjunct(g, slot, node);
            let location = g.node(node).location;
            propagate_false(g, slot, location);
            if location == 0 {
                return;
            }
            node_cursor = *slot;
            continue;
        }

        let mut sibling_cursor = g.node(node).next;
        while let Some(sibling) = sibling_cursor {
            sibling_cursor = g.node(sibling).next;
            if !is_single_range_term(g, sibling)
                || g.node(sibling).location != g.node(node).location
                || !same_term_attr(g, node, sibling)
            {
                continue;
            }

            intersect_ranges(g, node, sibling);

            if g.node(sibling).as_expr().and_then(|e| e.arg2).is_none() {
                detach_conjunct(g, slot, sibling);
            }
            if g.node(node).as_expr().and_then(|e| e.arg2).is_none() {
                detach_conjunct(g, slot, node);
                let location = g.node(node).location;
                propagate_false(g, slot, location);
                if location == 0 {
                    return;
                }
                // The surviving chain may hold further pairs.
                node_cursor = *slot;
                break;
            }
        }
    }
}

fn detach_conjunct(g: &mut Graph, slot: &mut Option<NodeId>, target: NodeId) {
    let chain = g.collect_chain(*slot);
    let Some(index) = chain.iter().position(|&id| id == target) else {
        return;
    };
    let next = g.node(target).next;
    if index == 0 {
        *slot = next;
    } else {
        g.node_mut(chain[index - 1]).next = next;
    }
    g.node_mut(target).next = None;
}

fn is_single_range_term(g: &Graph, id: NodeId) -> bool {
    g.node(id).or_next.is_none()
        && g.node(id).as_expr().map(|e| e.op) == Some(ExprOp::Range)
        && term_attr(g, id).is_some()
}

/// Drops constant sub-ranges whose lower bound exceeds their upper.
/// Returns true when the whole list emptied.
fn prune_empty_subs(g: &mut Graph, term: NodeId) -> bool {
    let head = match g.node(term).as_expr().and_then(|e| e.arg2) {
        Some(h) => h,
        None => return true,
    };
    let subs = g.collect_or_chain(Some(head));
    let mut kept: Vec<NodeId> = Vec::new();
    for sub in subs {
        let empty = decompose(g, sub)
            .map(|b| bounds_empty(g, &b))
            .unwrap_or(false);
        if !empty {
            kept.push(sub);
        }
    }
    relink_or_chain(g, term, &kept);
    kept.is_empty()
}

fn relink_or_chain(g: &mut Graph, term: NodeId, subs: &[NodeId]) {
    for sub in subs {
        g.node_mut(*sub).or_next = None;
    }
    for window in subs.windows(2) {
        g.node_mut(window[0]).or_next = Some(window[1]);
    }
    if let Some(e) = g.node_mut(term).as_expr_mut() {
        e.arg2 = subs.first().copied();
    }
}

/// Replaces `node`'s sub-ranges with the pairwise intersections against
/// `sibling`'s; the sibling's constant sub-ranges are subsumed and drop
/// out. Returns true when anything changed.
fn intersect_ranges(g: &mut Graph, node: NodeId, sibling: NodeId) -> bool {
    let node_head = g.node(node).as_expr().and_then(|e| e.arg2);
    let sibling_head = g.node(sibling).as_expr().and_then(|e| e.arg2);
    let node_subs = g.collect_or_chain(node_head);
    let sibling_subs = g.collect_or_chain(sibling_head);
    let location = g.node(node).location;

    let mut keep_sibling_consts = false;
    let mut result: Vec<NodeId> = Vec::new();
    let mut sibling_used: Vec<NodeId> = Vec::new();
    let mut changed = false;

    for r_id in node_subs {
        let Some(r) = decompose(g, r_id) else {
            result.push(r_id);
            keep_sibling_consts = true;
            continue;
        };
        let mut compared_any = false;
        for s_id in sibling_subs.iter().copied() {
            let Some(s) = decompose(g, s_id) else {
                continue;
            };
            let Some(cmps) = cross_compare(g, &r, &s) else {
                continue;
            };
            compared_any = true;
            if !sibling_used.contains(&s_id) {
                sibling_used.push(s_id);
            }
            if strictly_disjoint(&cmps) {
                continue;
            }

            // Intersection: the larger lower bound, the smaller upper.
            let (lop, lo) = if matches!(cmps[0], BoundCmp::Less | BoundCmp::LessAdj) {
                (s.lop, s.lo)
            } else {
                (r.lop, r.lo)
            };
            let (uop, hi) = if matches!(cmps[3], BoundCmp::Greater | BoundCmp::GreaterAdj) {
                (s.uop, s.hi)
            } else {
                (r.uop, r.hi)
            };
            let merged = Bounds { lop, lo, uop, hi };
            if bounds_empty(g, &merged) {
                changed = true;
                continue;
            }
            match build_sub_range(g, merged, location) {
                Some(new_sub) => {
                    changed = true;
                    result.push(new_sub);
                }
                None => {
                    changed = true;
                }
            }
        }
        if !compared_any {
            result.push(r_id);
        } else {
            changed = true;
        }
    }

    relink_or_chain(g, node, &result);

    if !keep_sibling_consts {
        let remaining: Vec<NodeId> = sibling_subs
            .into_iter()
            .filter(|s| !sibling_used.contains(s))
            .collect();
        relink_or_chain(g, sibling, &remaining);
    }
    changed
}
