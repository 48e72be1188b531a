//! The arithmetic/function expression tree used inside comparison leaves.
//! A bare `Expr::Column` compared against `Expr::Const` is the "simple"
//! case the evaluator can push to an index; anything richer forces a
//! per-row scan (`Predicate::is_simple` in `predicate.rs` is the actual
//! gate).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryFn {
    Abs,
    Sqrt,
    Log,
    Exp,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Ceil,
    Floor,
    Round,
}

impl UnaryFn {
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            UnaryFn::Abs => x.abs(),
            UnaryFn::Sqrt => x.sqrt(),
            UnaryFn::Log => x.ln(),
            UnaryFn::Exp => x.exp(),
            UnaryFn::Sin => x.sin(),
            UnaryFn::Cos => x.cos(),
            UnaryFn::Tan => x.tan(),
            UnaryFn::Asin => x.asin(),
            UnaryFn::Acos => x.acos(),
            UnaryFn::Atan => x.atan(),
            UnaryFn::Ceil => x.ceil(),
            UnaryFn::Floor => x.floor(),
            UnaryFn::Round => x.round(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryFn {
    Pow,
    Atan2,
}

impl BinaryFn {
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            BinaryFn::Pow => a.powf(b),
            BinaryFn::Atan2 => a.atan2(b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
}

impl BinOp {
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Mod => a % b,
            BinOp::BitAnd => (((a as i64) & (b as i64)) as f64),
            BinOp::BitOr => (((a as i64) | (b as i64)) as f64),
        }
    }
}

/// A numeric expression over one or more columns of the same partition.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f64),
    Column(String),
    Neg(Box<Expr>),
    Unary(UnaryFn, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(BinaryFn, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Expr {
        Expr::Column(name.into())
    }

    /// The set of column names this expression reads, without duplicates,
    /// in first-seen order; used to decide simple-vs-complex and to know
    /// which columns a scan needs to fetch.
    pub fn columns(&self, out: &mut Vec<String>) {
        match self {
            Expr::Const(_) => {}
            Expr::Column(name) => {
                if !out.iter().any(|c| c == name) {
                    out.push(name.clone());
                }
            }
            Expr::Neg(e) | Expr::Unary(_, e) => e.columns(out),
            Expr::Binary(_, a, b) | Expr::Call(_, a, b) => {
                a.columns(out);
                b.columns(out);
            }
        }
    }

    /// If this expression is exactly one bare column reference, its name.
    pub fn as_bare_column(&self) -> Option<&str> {
        match self {
            Expr::Column(name) => Some(name),
            _ => None,
        }
    }

    /// If this expression is exactly one constant, its value.
    pub fn as_const(&self) -> Option<f64> {
        match self {
            Expr::Const(v) => Some(*v),
            _ => None,
        }
    }

    /// Evaluate this expression for one row, given a lookup from column
    /// name to that row's value.
    pub fn eval(&self, row: &dyn Fn(&str) -> Option<f64>) -> Option<f64> {
        match self {
            Expr::Const(v) => Some(*v),
            Expr::Column(name) => row(name),
            Expr::Neg(e) => e.eval(row).map(|v| -v),
            Expr::Unary(f, e) => e.eval(row).map(|v| f.apply(v)),
            Expr::Binary(op, a, b) => Some(op.apply(a.eval(row)?, b.eval(row)?)),
            Expr::Call(f, a, b) => Some(f.apply(a.eval(row)?, b.eval(row)?)),
        }
    }
}
