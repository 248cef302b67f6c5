//! Quantified invariants of the normalized output, checked over randomly
//! generated predicates.

use planfold_core::graph::{ExprOp, Graph, NodeId, NodeKind, WalkControl};
use planfold_core::prune::MemoryCatalog;
use planfold_core::value::{compare_bound, BoundCmp, DbValue};
use planfold_core::{rewrite_sql, EmptyCatalog, RewriteOptions};
use proptest::prelude::*;

const ATTRS: [&str; 3] = ["a", "b", "c"];

#[derive(Clone, Debug)]
enum GenPred {
    Cmp { attr: usize, op: &'static str, value: i64 },
    Between { attr: usize, lo: i64, hi: i64 },
    InList { attr: usize, values: Vec<i64> },
    NullTest { attr: usize, negated: bool },
    And(Box<GenPred>, Box<GenPred>),
    Or(Box<GenPred>, Box<GenPred>),
    Not(Box<GenPred>),
}

impl GenPred {
    fn to_sql(&self) -> String {
        match self {
            GenPred::Cmp { attr, op, value } => format!("{} {op} {value}", ATTRS[*attr]),
            GenPred::Between { attr, lo, hi } => {
                format!("{} BETWEEN {lo} AND {hi}", ATTRS[*attr])
            }
            GenPred::InList { attr, values } => {
                let list = values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} IN ({list})", ATTRS[*attr])
            }
            GenPred::NullTest { attr, negated } => {
                if *negated {
                    format!("{} IS NOT NULL", ATTRS[*attr])
                } else {
                    format!("{} IS NULL", ATTRS[*attr])
                }
            }
            GenPred::And(lhs, rhs) => format!("({} AND {})", lhs.to_sql(), rhs.to_sql()),
            GenPred::Or(lhs, rhs) => format!("({} OR {})", lhs.to_sql(), rhs.to_sql()),
            GenPred::Not(inner) => format!("NOT ({})", inner.to_sql()),
        }
    }

    /// Truth over a non-null row.
    fn eval(&self, row: &[i64; 3]) -> bool {
        match self {
            GenPred::Cmp { attr, op, value } => {
                let v = row[*attr];
                match *op {
                    "=" => v == *value,
                    "<>" => v != *value,
                    "<" => v < *value,
                    "<=" => v <= *value,
                    ">" => v > *value,
                    _ => v >= *value,
                }
            }
            GenPred::Between { attr, lo, hi } => row[*attr] >= *lo && row[*attr] <= *hi,
            GenPred::InList { attr, values } => values.contains(&row[*attr]),
            GenPred::NullTest { negated, .. } => *negated,
            GenPred::And(lhs, rhs) => lhs.eval(row) && rhs.eval(row),
            GenPred::Or(lhs, rhs) => lhs.eval(row) || rhs.eval(row),
            GenPred::Not(inner) => !inner.eval(row),
        }
    }
}

fn leaf_strategy() -> impl Strategy<Value = GenPred> {
    let attr = 0usize..3;
    let value = -20i64..40;
    prop_oneof![
        (attr.clone(), prop_oneof![
            Just("="), Just("<>"), Just("<"), Just("<="), Just(">"), Just(">=")
        ], value.clone())
            .prop_map(|(attr, op, value)| GenPred::Cmp { attr, op, value }),
        (attr.clone(), value.clone(), value.clone())
            .prop_map(|(attr, lo, hi)| GenPred::Between { attr, lo, hi }),
        (attr.clone(), prop::collection::vec(value, 1..4))
            .prop_map(|(attr, values)| GenPred::InList { attr, values }),
        (attr, any::<bool>())
            .prop_map(|(attr, negated)| GenPred::NullTest { attr, negated }),
    ]
}

fn pred_strategy() -> impl Strategy<Value = GenPred> {
    leaf_strategy().prop_recursive(3, 12, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| GenPred::And(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| GenPred::Or(Box::new(a), Box::new(b))),
            inner.prop_map(|a| GenPred::Not(Box::new(a))),
        ]
    })
}

fn rewrite_where(pred: &GenPred) -> (Graph, Option<NodeId>) {
    let sql = format!("SELECT a, b, c FROM t WHERE {}", pred.to_sql());
    let program = rewrite_sql(
        &sql,
        &RewriteOptions {
            plan_cache_entries: 0,
            ..Default::default()
        },
        &EmptyCatalog,
    )
    .expect("generated SQL parses");
    let root = program.roots[0];
    let where_clause = match &program.graph.node(root).kind {
        NodeKind::Select(s) => s.where_clause,
        _ => unreachable!(),
    };
    (program.graph, where_clause)
}

/// Every node of the predicate, conjuncts and nested subtrees alike.
fn all_pred_nodes(g: &mut Graph, head: Option<NodeId>) -> Vec<NodeId> {
    let mut out = Vec::new();
    for conjunct in g.collect_chain(head) {
        g.walk_tree_pre(conjunct, &mut |_, id| {
            out.push(id);
            WalkControl::Continue
        });
    }
    out
}

fn range_sub_bounds(
    g: &Graph,
    sub: NodeId,
) -> Option<(
    planfold_core::value::BoundOp,
    DbValue,
    planfold_core::value::BoundOp,
    DbValue,
)> {
    use planfold_core::value::BoundOp;
    let expr = g.node(sub).as_expr()?;
    let (lop, uop) = expr.op.range_bounds()?;
    let value_of = |slot: Option<NodeId>| -> Option<DbValue> {
        slot.and_then(|id| g.node(id).as_value().cloned())
    };
    match (lop, uop) {
        (BoundOp::GtInf, _) => Some((lop, DbValue::Null, uop, value_of(expr.arg1)?)),
        (_, BoundOp::LtInf) => Some((lop, value_of(expr.arg1)?, uop, DbValue::Null)),
        (BoundOp::Eq, BoundOp::Eq) => {
            let v = value_of(expr.arg1)?;
            Some((lop, v.clone(), uop, v))
        }
        _ => Some((lop, value_of(expr.arg1)?, uop, value_of(expr.arg2)?)),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    // P1: CNF normal form. AND/OR appear only nested beneath atoms kept
    // whole; no boolean connective carries chain links.
    #[test]
    fn p1_cnf_normal_form(pred in pred_strategy()) {
        let (mut g, head) = rewrite_where(&pred);
        for id in all_pred_nodes(&mut g, head) {
            if let Some(expr) = g.node(id).as_expr() {
                if matches!(expr.op, ExprOp::And | ExprOp::Or) {
                    prop_assert!(
                        g.node(id).next.is_none() && g.node(id).or_next.is_none(),
                        "boolean connective with chain links"
                    );
                }
            }
        }
    }

    // P2: attributes sit left of constants in every comparison atom.
    #[test]
    fn p2_left_attribute_form(pred in pred_strategy()) {
        let (mut g, head) = rewrite_where(&pred);
        for id in all_pred_nodes(&mut g, head) {
            let Some(expr) = g.node(id).as_expr() else { continue };
            if !expr.op.is_comparison() {
                continue;
            }
            let (Some(arg1), Some(arg2)) = (expr.arg1, expr.arg2) else { continue };
            let const_left = g.is_const_not_hostvar(arg1);
            let attr_right = g.is_attr(arg2);
            prop_assert!(
                !(const_left && attr_right),
                "constant kept the left seat: {}",
                g.print_node(id)
            );
        }
    }

    // P3: at most one RANGE atom per attribute and location.
    #[test]
    fn p3_single_range_per_attr(pred in pred_strategy()) {
        let (g, head) = rewrite_where(&pred);
        let mut seen: Vec<(String, u16)> = Vec::new();
        for conjunct in g.collect_chain(head) {
            if g.node(conjunct).or_next.is_some() {
                continue;
            }
            let Some(expr) = g.node(conjunct).as_expr() else { continue };
            if expr.op != ExprOp::Range {
                continue;
            }
            let Some(attr) = expr.arg1 else { continue };
            let Some(name) = g.node(attr).as_name() else { continue };
            let key = (name.name.clone(), g.node(conjunct).location);
            prop_assert!(
                !seen.contains(&key),
                "two RANGE atoms on {} at location {}",
                key.0,
                key.1
            );
            seen.push(key);
        }
    }

    // P4: sub-ranges of one RANGE atom are pairwise disjoint.
    #[test]
    fn p4_subranges_disjoint(pred in pred_strategy()) {
        let (g, head) = rewrite_where(&pred);
        for conjunct in g.collect_chain(head) {
            let Some(expr) = g.node(conjunct).as_expr() else { continue };
            if expr.op != ExprOp::Range {
                continue;
            }
            let subs = g.collect_or_chain(expr.arg2);
            for (i, &a) in subs.iter().enumerate() {
                for &b in subs.iter().skip(i + 1) {
                    let (Some(ba), Some(bb)) =
                        (range_sub_bounds(&g, a), range_sub_bounds(&g, b))
                    else {
                        continue;
                    };
                    let cmps = [
                        compare_bound(&ba.1, ba.0, &bb.1, bb.0),
                        compare_bound(&ba.1, ba.0, &bb.3, bb.2),
                        compare_bound(&ba.3, ba.2, &bb.1, bb.0),
                        compare_bound(&ba.3, ba.2, &bb.3, bb.2),
                    ];
                    let strict = cmps.iter().all(|c| {
                        matches!(c, Some(BoundCmp::Less)) || matches!(c, Some(BoundCmp::LessAdj))
                    }) || cmps.iter().all(|c| {
                        matches!(c, Some(BoundCmp::Greater))
                            || matches!(c, Some(BoundCmp::GreaterAdj))
                    });
                    prop_assert!(
                        strict,
                        "overlapping sub-ranges in {}",
                        g.print_node(conjunct)
                    );
                }
            }
        }
    }

    // Semantic preservation: the rewritten predicate accepts exactly the
    // rows the original did (rows are non-null, so three-valued logic
    // degenerates to boolean).
    #[test]
    fn rewrite_preserves_semantics_on_sample_rows(
        pred in pred_strategy(),
        rows in prop::collection::vec((-25i64..45, -25i64..45, -25i64..45), 8),
    ) {
        let (mut g, head) = rewrite_where(&pred);
        for (a, b, c) in rows {
            let row = [a, b, c];
            let expected = pred.eval(&row);
            if let Some(actual) = eval_rewritten(&mut g, head, &row) {
                prop_assert_eq!(
                    actual,
                    expected,
                    "row {:?} under {}",
                    row,
                    g.print_predicate(head)
                );
            }
        }
    }

    // P7: equality reduction applied twice equals applied once.
    #[test]
    fn p7_equality_reduction_idempotent(pred in pred_strategy()) {
        use planfold_core::normalize::{cnf, reduce_equality_terms};
        let sql = format!("SELECT a, b, c FROM t WHERE {}", pred.to_sql());
        let mut g = Graph::new();
        let roots = planfold_core::lower_sql(&mut g, &sql, Default::default()).unwrap();
        let root = roots[0];
        let where_clause = match &g.node(root).kind {
            NodeKind::Select(s) => s.where_clause,
            _ => unreachable!(),
        };
        let mut slot = where_clause.and_then(|w| cnf(&mut g, w));
        reduce_equality_terms(&mut g, root, &mut slot);
        let once = g.print_predicate(slot);
        reduce_equality_terms(&mut g, root, &mut slot);
        prop_assert_eq!(g.print_predicate(slot), once);
    }

    // P5: partition pruning is sound; every partition that can hold a
    // qualifying row survives.
    #[test]
    fn p5_pruning_soundness(pred in pred_strategy()) {
        let mut catalog = MemoryCatalog::new();
        catalog.insert("t", MemoryCatalog::hash("t", "a", 4));
        let sql = format!("SELECT a, b, c FROM t WHERE {}", pred.to_sql());
        let program = rewrite_sql(
            &sql,
            &RewriteOptions {
                plan_cache_entries: 0,
                ..Default::default()
            },
            &catalog,
        )
        .unwrap();
        let root = program.roots[0];
        let g = &program.graph;
        let NodeKind::Select(select) = &g.node(root).kind else { unreachable!() };
        let spec = g.collect_chain(select.from)[0];
        let spec_node = g.node(spec).as_spec().unwrap();
        let kept: Vec<String> = g
            .collect_chain(spec_node.flat_entity_list)
            .iter()
            .map(|&n| g.node(n).as_name().unwrap().name.clone())
            .collect();
        let pruned = spec_node.partition_pruned;
        let always_false = program.summaries[0].always_false;

        for a in -25i64..=45 {
            // Rows with arbitrary b, c: the key attribute decides alone
            // only when the predicate holds for some b, c; sample a few.
            for &(b, c) in &[(0i64, 0i64), (7, -3), (30, 12)] {
                if pred.eval(&[a, b, c]) {
                    prop_assert!(!always_false, "row qualifies but statement is FALSE");
                    if pruned {
                        let expected =
                            format!("t__p{}", (DbValue::Int(a).partition_hash() as usize) % 4);
                        prop_assert!(
                            kept.contains(&expected),
                            "partition {} dropped but a={} qualifies",
                            expected,
                            a
                        );
                    }
                }
            }
        }
    }
}

/// Evaluates the rewritten CNF chain over one row; `None` when a term is
/// outside the closed evaluator (never for generator output).
fn eval_rewritten(g: &mut Graph, head: Option<NodeId>, row: &[i64; 3]) -> Option<bool> {
    let mut result = true;
    for conjunct in g.collect_chain(head) {
        let mut any = false;
        let mut known = false;
        for alt in g.collect_or_chain(Some(conjunct)) {
            match eval_term(g, alt, row) {
                Some(truth) => {
                    known = true;
                    if truth {
                        any = true;
                        break;
                    }
                }
                None => return None,
            }
        }
        if !known {
            return None;
        }
        result &= any;
        if !result {
            return Some(false);
        }
    }
    Some(result)
}

fn eval_term(g: &Graph, id: NodeId, row: &[i64; 3]) -> Option<bool> {
    if let Some(truth) = g.as_bool_literal(id) {
        return Some(truth);
    }
    let expr = g.node(id).as_expr()?;
    let value_of = |slot: Option<NodeId>| -> Option<i64> {
        let id = slot?;
        match &g.node(id).kind {
            NodeKind::Value(DbValue::Int(v)) => Some(*v),
            NodeKind::Name(name) => {
                let index = ATTRS.iter().position(|a| *a == name.name)?;
                Some(row[index])
            }
            _ => None,
        }
    };
    use ExprOp::*;
    match expr.op {
        And => Some(eval_term(g, expr.arg1?, row)? && eval_term(g, expr.arg2?, row)?),
        Or => Some(eval_term(g, expr.arg1?, row)? || eval_term(g, expr.arg2?, row)?),
        Not => Some(!eval_term(g, expr.arg1?, row)?),
        Eq => Some(value_of(expr.arg1)? == value_of(expr.arg2)?),
        Ne => Some(value_of(expr.arg1)? != value_of(expr.arg2)?),
        Gt => Some(value_of(expr.arg1)? > value_of(expr.arg2)?),
        Ge => Some(value_of(expr.arg1)? >= value_of(expr.arg2)?),
        Lt => Some(value_of(expr.arg1)? < value_of(expr.arg2)?),
        Le => Some(value_of(expr.arg1)? <= value_of(expr.arg2)?),
        // Rows are never null.
        IsNull => Some(false),
        IsNotNull => Some(true),
        IsIn => {
            let v = value_of(expr.arg1)?;
            let mut found = false;
            for item in g.collect_chain(expr.arg2) {
                if value_of(Some(item))? == v {
                    found = true;
                }
            }
            Some(found)
        }
        IsNotIn => {
            let v = value_of(expr.arg1)?;
            let mut found = false;
            for item in g.collect_chain(expr.arg2) {
                if value_of(Some(item))? == v {
                    found = true;
                }
            }
            Some(!found)
        }
        Between | NotBetween => {
            let v = value_of(expr.arg1)?;
            let bounds = g.node(expr.arg2?).as_expr()?;
            let (lo, hi) = (value_of(bounds.arg1)?, value_of(bounds.arg2)?);
            let inside = match bounds.op {
                BetweenAnd | BetweenGeLe => v >= lo && v <= hi,
                BetweenGeLt => v >= lo && v < hi,
                BetweenGtLe => v > lo && v <= hi,
                BetweenGtLt => v > lo && v < hi,
                _ => return None,
            };
            Some(if expr.op == NotBetween { !inside } else { inside })
        }
        Range => {
            let v = value_of(expr.arg1)?;
            let mut inside = false;
            for sub in g.collect_or_chain(expr.arg2) {
                let sub_expr = g.node(sub).as_expr()?;
                let matches = match sub_expr.op {
                    BetweenEqNa => v == value_of(sub_expr.arg1)?,
                    BetweenGeLe => {
                        v >= value_of(sub_expr.arg1)? && v <= value_of(sub_expr.arg2)?
                    }
                    BetweenGeLt => {
                        v >= value_of(sub_expr.arg1)? && v < value_of(sub_expr.arg2)?
                    }
                    BetweenGtLe => {
                        v > value_of(sub_expr.arg1)? && v <= value_of(sub_expr.arg2)?
                    }
                    BetweenGtLt => {
                        v > value_of(sub_expr.arg1)? && v < value_of(sub_expr.arg2)?
                    }
                    BetweenGeInf => v >= value_of(sub_expr.arg1)?,
                    BetweenGtInf => v > value_of(sub_expr.arg1)?,
                    BetweenInfLe => v <= value_of(sub_expr.arg1)?,
                    BetweenInfLt => v < value_of(sub_expr.arg1)?,
                    _ => return None,
                };
                if matches {
                    inside = true;
                    break;
                }
            }
            Some(inside)
        }
        _ => None,
    }
}
