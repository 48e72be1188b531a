use bitindex_base::RowId;
use bitindex_index::CmpOp;

use crate::expr::Expr;

/// A constant on the right-hand side of a comparison or in a membership
/// set: either numeric or a string, matching the column types a
/// comparison or `InSet` might target.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Number(f64),
    Text(String),
}

impl ScalarValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Number(v) => Some(*v),
            ScalarValue::Text(_) => None,
        }
    }
}

/// A predicate tree node, per `spec.md` §3/§6's predicate surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Xor(Box<Predicate>, Box<Predicate>),
    /// `lhs ⊙ rhs`. Simple iff exactly one side is a bare column and the
    /// other a constant (see `is_simple`).
    Compare { lhs: Expr, op: CmpOp, rhs: Expr },
    /// `lo ⊙_lo expr ⊙_hi hi` (constant-op-column-op-constant).
    Range { lo: f64, lo_op: CmpOp, expr: Expr, hi_op: CmpOp, hi: f64 },
    /// `expr ∈ {values}`, for small discrete sets (numeric or string).
    InSet { expr: Expr, values: Vec<ScalarValue> },
    /// Row-id membership, independent of any column value.
    RidIn { rids: Vec<RowId> },
    /// Two column references compared, optionally with a tolerance delta
    /// added to the right-hand side before comparing (`lhs ⊙ (rhs + delta)`).
    Join { lhs: String, op: CmpOp, rhs: String, delta: Option<f64> },
}

impl Predicate {
    pub fn cmp(lhs: Expr, op: CmpOp, rhs: Expr) -> Predicate {
        Predicate::Compare { lhs, op, rhs }
    }

    pub fn and(a: Predicate, b: Predicate) -> Predicate {
        Predicate::And(Box::new(a), Box::new(b))
    }
    pub fn or(a: Predicate, b: Predicate) -> Predicate {
        Predicate::Or(Box::new(a), Box::new(b))
    }
    pub fn xor(a: Predicate, b: Predicate) -> Predicate {
        Predicate::Xor(Box::new(a), Box::new(b))
    }
    pub fn not(a: Predicate) -> Predicate {
        Predicate::Not(Box::new(a))
    }

    /// A comparison is simple iff one side is a bare column name and the
    /// other a constant: the evaluator may push it wholly to an index.
    /// Every other node (logical combinators, `Range`, `InSet`, `RidIn`,
    /// `Join`, and any `Compare` over an arithmetic tree or two columns)
    /// is complex and must be scanned — except `Range` and `InSet`, whose
    /// `expr` being a bare column still lets the evaluator decompose them
    /// into index-pushable pieces (see `bitindex-eval::evaluator`).
    pub fn simple_column_and_value(&self) -> Option<(&str, CmpOp, f64)> {
        match self {
            Predicate::Compare { lhs, op, rhs } => {
                if let (Some(col), Some(val)) = (lhs.as_bare_column(), rhs.as_const()) {
                    return Some((col, *op, val));
                }
                if let (Some(val), Some(col)) = (lhs.as_const(), rhs.as_bare_column()) {
                    return Some((col, flip(*op), val));
                }
                None
            }
            _ => None,
        }
    }
}

/// `a ⊙ b` rewritten as `b ⊙' a`.
pub fn flip(op: CmpOp) -> CmpOp {
    match op {
        CmpOp::Lt => CmpOp::Gt,
        CmpOp::Le => CmpOp::Ge,
        CmpOp::Gt => CmpOp::Lt,
        CmpOp::Ge => CmpOp::Le,
        CmpOp::Eq => CmpOp::Eq,
        CmpOp::Ne => CmpOp::Ne,
    }
}
