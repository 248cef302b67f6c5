//! Closed-form constant evaluator for partition-key expressions.
//!
//! Supports the arithmetic, string, date and truncation operators plus
//! CAST. Anything else — or an unbound host-variable marker — makes the
//! statement non-cacheable instead of failing it.

use crate::graph::{ExprOp, Graph, NodeId, NodeKind, TypeEnum};
use crate::value::DbValue;
use chrono::{Duration, NaiveDate};

/// Why a partition-key expression did not evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalFailure {
    /// Operator outside the closed set; pruning gives this conjunct up.
    Unsupported,
    /// An input marker with no bound value; the whole statement is marked
    /// `cannot_prepare`.
    UnboundHostVar,
}

pub fn eval_const(g: &Graph, id: NodeId) -> Result<DbValue, EvalFailure> {
    match &g.node(id).kind {
        NodeKind::Value(v) => Ok(v.clone()),
        NodeKind::HostVar(hv) => g
            .host_var_value(hv.index)
            .cloned()
            .ok_or(EvalFailure::UnboundHostVar),
        NodeKind::Expr(e) => {
            let op = e.op;
            let arg = |slot: Option<NodeId>| -> Result<DbValue, EvalFailure> {
                slot.map(|a| eval_const(g, a))
                    .unwrap_or(Err(EvalFailure::Unsupported))
            };
            use ExprOp::*;
            match op {
                Plus => numeric_or_date(arg(e.arg1)?, arg(e.arg2)?, false),
                Minus => numeric_or_date(arg(e.arg1)?, arg(e.arg2)?, true),
                Times => numeric(arg(e.arg1)?, arg(e.arg2)?, |a, b| a * b, |a, b| a * b),
                Divide => {
                    let (a, b) = (arg(e.arg1)?, arg(e.arg2)?);
                    match (&a, &b) {
                        (_, DbValue::Int(0)) => Err(EvalFailure::Unsupported),
                        (DbValue::Int(x), DbValue::Int(y)) => Ok(DbValue::Int(x / y)),
                        _ => numeric(a, b, |a, b| a / b, |a, b| a / b),
                    }
                }
                Modulus => match (arg(e.arg1)?, arg(e.arg2)?) {
                    (DbValue::Int(a), DbValue::Int(b)) if b != 0 => Ok(DbValue::Int(a % b)),
                    _ => Err(EvalFailure::Unsupported),
                },
                UnaryMinus => match arg(e.arg1)? {
                    DbValue::Int(v) => Ok(DbValue::Int(-v)),
                    DbValue::Double(v) => Ok(DbValue::Double(-v)),
                    _ => Err(EvalFailure::Unsupported),
                },
                Concat => match (arg(e.arg1)?, arg(e.arg2)?) {
                    (DbValue::Str(a), DbValue::Str(b)) => Ok(DbValue::Str(a + &b)),
                    _ => Err(EvalFailure::Unsupported),
                },
                Lower => string_fn(arg(e.arg1)?, |s| s.to_lowercase()),
                Upper => string_fn(arg(e.arg1)?, |s| s.to_uppercase()),
                Trim => string_fn(arg(e.arg1)?, |s| s.trim().to_string()),
                CharLength => match arg(e.arg1)? {
                    DbValue::Str(s) => Ok(DbValue::Int(s.chars().count() as i64)),
                    _ => Err(EvalFailure::Unsupported),
                },
                Substring => {
                    let s = match arg(e.arg1)? {
                        DbValue::Str(s) => s,
                        _ => return Err(EvalFailure::Unsupported),
                    };
                    let from = match arg(e.arg2)? {
                        DbValue::Int(v) if v >= 1 => (v - 1) as usize,
                        _ => return Err(EvalFailure::Unsupported),
                    };
                    let chars: Vec<char> = s.chars().collect();
                    let taken: String = match e.arg3 {
                        None => chars.iter().skip(from).collect(),
                        Some(len_id) => match eval_const(g, len_id)? {
                            DbValue::Int(len) if len >= 0 => {
                                chars.iter().skip(from).take(len as usize).collect()
                            }
                            _ => return Err(EvalFailure::Unsupported),
                        },
                    };
                    Ok(DbValue::Str(taken))
                }
                Floor => rounding(arg(e.arg1)?, f64::floor),
                Ceil => rounding(arg(e.arg1)?, f64::ceil),
                Abs => match arg(e.arg1)? {
                    DbValue::Int(v) => Ok(DbValue::Int(v.abs())),
                    DbValue::Double(v) => Ok(DbValue::Double(v.abs())),
                    _ => Err(EvalFailure::Unsupported),
                },
                Round => round_to(arg(e.arg1)?, arg(e.arg2)?, f64::round),
                Trunc => round_to(arg(e.arg1)?, arg(e.arg2)?, f64::trunc),
                Cast => {
                    let inner = arg(e.arg1)?;
                    cast_to(inner, g.node(id).type_enum)
                }
                Prior => arg(e.arg1),
                _ => Err(EvalFailure::Unsupported),
            }
        }
        _ => Err(EvalFailure::Unsupported),
    }
}

fn numeric(
    a: DbValue,
    b: DbValue,
    int_op: fn(i64, i64) -> i64,
    double_op: fn(f64, f64) -> f64,
) -> Result<DbValue, EvalFailure> {
    match (a, b) {
        (DbValue::Int(x), DbValue::Int(y)) => Ok(DbValue::Int(int_op(x, y))),
        (DbValue::Int(x), DbValue::Double(y)) => Ok(DbValue::Double(double_op(x as f64, y))),
        (DbValue::Double(x), DbValue::Int(y)) => Ok(DbValue::Double(double_op(x, y as f64))),
        (DbValue::Double(x), DbValue::Double(y)) => Ok(DbValue::Double(double_op(x, y))),
        _ => Err(EvalFailure::Unsupported),
    }
}

/// Addition/subtraction with date-plus-days support.
fn numeric_or_date(a: DbValue, b: DbValue, subtract: bool) -> Result<DbValue, EvalFailure> {
    match (&a, &b) {
        (DbValue::Date(d), DbValue::Int(days)) => {
            let delta = if subtract { -*days } else { *days };
            d.checked_add_signed(Duration::days(delta))
                .map(DbValue::Date)
                .ok_or(EvalFailure::Unsupported)
        }
        _ => {
            if subtract {
                numeric(a, b, |x, y| x - y, |x, y| x - y)
            } else {
                numeric(a, b, |x, y| x + y, |x, y| x + y)
            }
        }
    }
}

fn string_fn(v: DbValue, f: impl Fn(&str) -> String) -> Result<DbValue, EvalFailure> {
    match v {
        DbValue::Str(s) => Ok(DbValue::Str(f(&s))),
        _ => Err(EvalFailure::Unsupported),
    }
}

fn rounding(v: DbValue, f: fn(f64) -> f64) -> Result<DbValue, EvalFailure> {
    match v {
        DbValue::Int(v) => Ok(DbValue::Int(v)),
        DbValue::Double(v) => Ok(DbValue::Double(f(v))),
        _ => Err(EvalFailure::Unsupported),
    }
}

fn round_to(v: DbValue, places: DbValue, f: fn(f64) -> f64) -> Result<DbValue, EvalFailure> {
    let places = match places {
        DbValue::Int(p) => p,
        _ => return Err(EvalFailure::Unsupported),
    };
    match v {
        DbValue::Int(v) if places >= 0 => Ok(DbValue::Int(v)),
        DbValue::Int(v) => {
            let factor = 10i64.checked_pow((-places) as u32).ok_or(EvalFailure::Unsupported)?;
            Ok(DbValue::Int(f((v as f64) / (factor as f64)) as i64 * factor))
        }
        DbValue::Double(v) => {
            let factor = 10f64.powi(places as i32);
            Ok(DbValue::Double(f(v * factor) / factor))
        }
        _ => Err(EvalFailure::Unsupported),
    }
}

fn cast_to(v: DbValue, target: TypeEnum) -> Result<DbValue, EvalFailure> {
    match target {
        TypeEnum::Integer => match v {
            DbValue::Int(_) => Ok(v),
            DbValue::Double(d) => Ok(DbValue::Int(d as i64)),
            DbValue::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(DbValue::Int)
                .map_err(|_| EvalFailure::Unsupported),
            _ => Err(EvalFailure::Unsupported),
        },
        TypeEnum::Double => match v {
            DbValue::Int(i) => Ok(DbValue::Double(i as f64)),
            DbValue::Double(_) => Ok(v),
            DbValue::Str(s) => s
                .trim()
                .parse::<f64>()
                .map(DbValue::Double)
                .map_err(|_| EvalFailure::Unsupported),
            _ => Err(EvalFailure::Unsupported),
        },
        TypeEnum::String { .. } => match v {
            DbValue::Str(_) => Ok(v),
            DbValue::Int(i) => Ok(DbValue::Str(i.to_string())),
            DbValue::Double(d) => Ok(DbValue::Str(d.to_string())),
            DbValue::Date(d) => Ok(DbValue::Str(d.to_string())),
            _ => Err(EvalFailure::Unsupported),
        },
        TypeEnum::Date => match v {
            DbValue::Date(_) => Ok(v),
            DbValue::Str(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(DbValue::Date)
                .map_err(|_| EvalFailure::Unsupported),
            _ => Err(EvalFailure::Unsupported),
        },
        _ => Err(EvalFailure::Unsupported),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Expr;

    fn int(g: &mut Graph, v: i64) -> NodeId {
        g.new_value(DbValue::Int(v))
    }

    #[test]
    fn arithmetic_folds() {
        let mut g = Graph::new();
        let a = int(&mut g, 40);
        let b = int(&mut g, 2);
        let plus = g.new_expr(Expr::binary(ExprOp::Plus, a, b));
        assert_eq!(eval_const(&g, plus), Ok(DbValue::Int(42)));
        let times = g.new_expr(Expr::binary(ExprOp::Times, a, b));
        assert_eq!(eval_const(&g, times), Ok(DbValue::Int(80)));
    }

    #[test]
    fn date_plus_days_folds() {
        let mut g = Graph::new();
        let d = g.new_value(DbValue::Date(NaiveDate::from_ymd_opt(2008, 12, 30).unwrap()));
        let n = int(&mut g, 3);
        let plus = g.new_expr(Expr::binary(ExprOp::Plus, d, n));
        assert_eq!(
            eval_const(&g, plus),
            Ok(DbValue::Date(NaiveDate::from_ymd_opt(2009, 1, 2).unwrap()))
        );
    }

    #[test]
    fn string_functions_fold() {
        let mut g = Graph::new();
        let s = g.new_value(DbValue::Str("AbC".into()));
        let lower = g.new_expr(Expr::unary(ExprOp::Lower, s));
        assert_eq!(eval_const(&g, lower), Ok(DbValue::Str("abc".into())));
    }

    #[test]
    fn unbound_marker_reports_cannot_prepare() {
        let mut g = Graph::new();
        let hv = g.new_host_var();
        let n = int(&mut g, 1);
        let plus = g.new_expr(Expr::binary(ExprOp::Plus, hv, n));
        assert_eq!(eval_const(&g, plus), Err(EvalFailure::UnboundHostVar));
    }

    #[test]
    fn bound_marker_evaluates() {
        let mut g = Graph::new();
        let index = g.next_host_var_index(Some(DbValue::Int(41)));
        let hv = g.alloc(crate::graph::Node::new(NodeKind::HostVar(
            crate::graph::HostVar { index, bound: true },
        )));
        let n = int(&mut g, 1);
        let plus = g.new_expr(Expr::binary(ExprOp::Plus, hv, n));
        assert_eq!(eval_const(&g, plus), Ok(DbValue::Int(42)));
    }

    #[test]
    fn unsupported_operator_gives_up() {
        let mut g = Graph::new();
        let a = int(&mut g, 1);
        let coalesce = g.new_expr(Expr::unary(ExprOp::Coalesce, a));
        assert_eq!(eval_const(&g, coalesce), Err(EvalFailure::Unsupported));
    }

    #[test]
    fn division_by_zero_gives_up() {
        let mut g = Graph::new();
        let a = int(&mut g, 1);
        let b = int(&mut g, 0);
        let div = g.new_expr(Expr::binary(ExprOp::Divide, a, b));
        assert_eq!(eval_const(&g, div), Err(EvalFailure::Unsupported));
    }
}
