//! Runtime values carried by `Value` nodes and partition descriptors.
//!
//! Comparison is defined per domain with numeric cross-coercion; `Null`
//! compares with nothing. The five-way bound comparison used by range
//! intersection and the partition pruner lives here as [`compare_bound`].

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Object identity reference (volume, page, slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Oid {
    pub pageid: i32,
    pub slotid: i16,
    pub volid: i16,
}

impl Oid {
    pub fn new(pageid: i32, slotid: i16, volid: i16) -> Self {
        Self { pageid, slotid, volid }
    }
}

/// A database value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbValue {
    Null,
    Int(i64),
    Double(f64),
    Str(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Datetime(NaiveDateTime),
    Oid(Oid),
    Sequence(Vec<DbValue>),
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    /// Domain comparison. `None` when the values are incomparable
    /// (either side NULL, or mismatched domains).
    pub fn compare(&self, other: &DbValue) -> Option<Ordering> {
        use DbValue::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Int(a), Double(b)) => (*a as f64).partial_cmp(b),
            (Double(a), Int(b)) => a.partial_cmp(&(*b as f64)),
            (Double(a), Double(b)) => a.partial_cmp(b),
            (Str(a), Str(b)) => Some(a.cmp(b)),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            (Time(a), Time(b)) => Some(a.cmp(b)),
            (Datetime(a), Datetime(b)) => Some(a.cmp(b)),
            (Date(a), Datetime(b)) => Some(a.and_hms_opt(0, 0, 0)?.cmp(b)),
            (Datetime(a), Date(b)) => Some(a.cmp(&b.and_hms_opt(0, 0, 0)?)),
            (Oid(a), Oid(b)) => {
                Some((a.volid, a.pageid, a.slotid).cmp(&(b.volid, b.pageid, b.slotid)))
            }
            _ => None,
        }
    }

    /// Fold hash used by HASH partition selection. Deterministic across
    /// processes; the reader side applies the identical fold.
    pub fn partition_hash(&self) -> u32 {
        fn fold(bytes: &[u8]) -> u32 {
            let mut h: u32 = 2166136261;
            for b in bytes {
                h ^= *b as u32;
                h = h.wrapping_mul(16777619);
            }
            h
        }
        match self {
            DbValue::Null => 0,
            // Integral doubles hash like their integer image so `k = 7`
            // and `k = 7.0` land in the same partition.
            DbValue::Int(v) => fold(&v.to_be_bytes()),
            DbValue::Double(v) => {
                if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v <= i64::MAX as f64 {
                    fold(&(*v as i64).to_be_bytes())
                } else {
                    fold(&v.to_be_bytes())
                }
            }
            DbValue::Str(s) => fold(s.as_bytes()),
            DbValue::Date(d) => fold(&(d.num_days_from_ce() as i64).to_be_bytes()),
            DbValue::Time(t) => fold(&(t.num_seconds_from_midnight() as i64).to_be_bytes()),
            DbValue::Datetime(dt) => fold(&dt.and_utc().timestamp_millis().to_be_bytes()),
            DbValue::Oid(oid) => {
                let mut bytes = Vec::with_capacity(8);
                bytes.extend_from_slice(&oid.pageid.to_be_bytes());
                bytes.extend_from_slice(&oid.slotid.to_be_bytes());
                bytes.extend_from_slice(&oid.volid.to_be_bytes());
                fold(&bytes)
            }
            DbValue::Sequence(items) => {
                items.iter().fold(0u32, |acc, v| {
                    acc.wrapping_mul(31).wrapping_add(v.partition_hash())
                })
            }
        }
    }

    /// The immediate successor in a discrete, iterable domain.
    /// `None` for continuous or unbounded-at-this-point domains.
    pub fn successor(&self) -> Option<DbValue> {
        match self {
            DbValue::Int(v) => v.checked_add(1).map(DbValue::Int),
            DbValue::Date(d) => d.succ_opt().map(DbValue::Date),
            DbValue::Time(t) => {
                let secs = t.num_seconds_from_midnight();
                if secs >= 24 * 3600 - 1 {
                    None
                } else {
                    NaiveTime::from_num_seconds_from_midnight_opt(secs + 1, 0).map(DbValue::Time)
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for DbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbValue::Null => write!(f, "NULL"),
            DbValue::Int(v) => write!(f, "{v}"),
            DbValue::Double(v) => write!(f, "{v}"),
            DbValue::Str(s) => write!(f, "'{}'", s.replace('\'', "''")),
            DbValue::Date(d) => write!(f, "DATE '{d}'"),
            DbValue::Time(t) => write!(f, "TIME '{t}'"),
            DbValue::Datetime(dt) => write!(f, "DATETIME '{dt}'"),
            DbValue::Oid(oid) => write!(f, "OID({}|{}|{})", oid.volid, oid.pageid, oid.slotid),
            DbValue::Sequence(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// One side of a range endpoint: the comparison that admits the value,
/// or an infinity sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundOp {
    Eq,
    Ge,
    Gt,
    Lt,
    Le,
    /// −∞ (the value slot is ignored)
    GtInf,
    /// +∞ (the value slot is ignored)
    LtInf,
}

/// Outcome of comparing two range endpoints.
///
/// `LessAdj`/`GreaterAdj` mean the endpoints sit on the same value with
/// inclusive/exclusive sides that make them immediate neighbors, e.g.
/// `<= 5` against `> 5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundCmp {
    Less,
    LessAdj,
    Equal,
    GreaterAdj,
    Greater,
}

/// Compares endpoint `(v1, op1)` against `(v2, op2)`.
///
/// Returns `None` when either value is not comparable in its domain; the
/// caller must then give up on merging the ranges involved.
pub fn compare_bound(
    v1: &DbValue,
    op1: BoundOp,
    v2: &DbValue,
    op2: BoundOp,
) -> Option<BoundCmp> {
    use BoundCmp::*;
    use BoundOp::*;

    if op1 == GtInf {
        return Some(if op2 == GtInf { Equal } else { Less });
    }
    if op1 == LtInf {
        return Some(if op2 == LtInf { Equal } else { Greater });
    }
    if op2 == GtInf {
        return Some(Greater);
    }
    if op2 == LtInf {
        return Some(Less);
    }

    match v1.compare(v2)? {
        Ordering::Less => Some(Less),
        Ordering::Greater => Some(Greater),
        Ordering::Equal => Some(match op1 {
            Eq | Ge | Le => match op2 {
                Eq | Ge | Le => Equal,
                Gt => LessAdj,
                Lt => GreaterAdj,
                GtInf | LtInf => unreachable!(),
            },
            Gt => match op2 {
                Eq | Ge | Le => GreaterAdj,
                Lt => Greater,
                Gt => Equal,
                GtInf | LtInf => unreachable!(),
            },
            Lt => match op2 {
                Eq | Ge | Le => LessAdj,
                Gt => Less,
                Lt => Equal,
                GtInf | LtInf => unreachable!(),
            },
            GtInf | LtInf => unreachable!(),
        }),
    }
}
