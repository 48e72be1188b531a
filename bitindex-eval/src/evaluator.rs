//! Turns a predicate tree plus a partition into a hit bitvector, per
//! `spec.md` §4.4's post-order, mask-propagating algorithm.

use bitindex_base::{kind_err, Kind, Result, RowId, RunControl};
use bitindex_bitvec::Bitvector;
use bitindex_column::ColumnValue;
use bitindex_index::CmpOp;

use crate::expr::Expr;
use crate::partition_source::PartitionSource;
use crate::predicate::{flip, Predicate, ScalarValue};

/// A bitvector restricting which rows a scan or index evaluation must
/// consider; propagated downward through the predicate tree.
pub type CandidateMask = Bitvector;

/// Lower/upper bracket around the true hit set: `lower` certainly
/// satisfies the predicate, `upper` possibly does, `lower ⊆ upper`.
#[derive(Debug, Clone)]
pub struct Bracket {
    pub lower: Bitvector,
    pub upper: Bitvector,
}

impl Bracket {
    fn exact(bv: Bitvector) -> Bracket {
        Bracket { lower: bv.clone(), upper: bv }
    }
    fn is_exact(&self) -> bool {
        self.lower.to_bit_vec() == self.upper.to_bit_vec()
    }
}

pub struct Evaluator<'p, P: PartitionSource> {
    partition: &'p P,
    config: bitindex_base::EvalConfig,
    run: RunControl,
}

impl<'p, P: PartitionSource> Evaluator<'p, P> {
    pub fn new(partition: &'p P, config: bitindex_base::EvalConfig, run: RunControl) -> Self {
        Evaluator { partition, config, run }
    }

    fn initial_mask(&self, pred: &Predicate) -> Result<CandidateMask> {
        let mut columns = Vec::new();
        collect_columns(pred, &mut columns);
        self.partition.null_mask_for(&columns)
    }

    /// Uses indices only; returns a bracket around the true answer.
    pub fn estimate(&self, pred: &Predicate) -> Result<(Bitvector, Bitvector)> {
        let mask = self.initial_mask(pred)?;
        let b = self.walk(pred, &mask, false)?;
        Ok((b.lower, b.upper))
    }

    /// Returns the exact hit set, resolving any index-only uncertainty by
    /// scanning the straddling rows.
    pub fn evaluate(&self, pred: &Predicate) -> Result<Bitvector> {
        let mask = self.initial_mask(pred)?;
        let b = self.walk(pred, &mask, true)?;
        debug_assert!(b.is_exact(), "evaluate() must resolve to an exact bracket");
        Ok(b.lower)
    }

    /// Bypasses indices entirely; evaluates by reading raw columns. Used
    /// for verification and as the `no-index` fallback.
    pub fn sequential_scan(&self, pred: &Predicate) -> Result<Bitvector> {
        let mask = self.initial_mask(pred)?;
        self.scan(pred, &mask)
    }

    fn walk(&self, pred: &Predicate, mask: &CandidateMask, exact: bool) -> Result<Bracket> {
        self.run.check()?;
        match pred {
            Predicate::Not(x) => {
                let bx = self.walk(x, mask, exact)?;
                let lower = mask.logical_minus(&bx.upper)?;
                let upper = mask.logical_minus(&bx.lower)?;
                Ok(Bracket { lower, upper })
            }
            Predicate::And(x, y) => self.walk_and(x, y, mask, exact),
            Predicate::Or(x, y) => self.walk_or(x, y, mask, exact),
            Predicate::Xor(x, y) => {
                let bx = self.walk(x, mask, true)?;
                let by = self.walk(y, mask, true)?;
                let result = bx.lower.logical_xor(&by.lower)?;
                Ok(Bracket::exact(result))
            }
            Predicate::Compare { lhs, op, rhs } => self.walk_compare(lhs, *op, rhs, mask, exact),
            Predicate::Range { lo, lo_op, expr, hi_op, hi } => {
                // `lo ⊙_lo expr` rewritten as `expr ⊙_lo' lo`, ANDed with `expr ⊙_hi hi`.
                let lo_cmp = Predicate::cmp(expr.clone(), flip(*lo_op), Expr::Const(*lo));
                let hi_cmp = Predicate::cmp(expr.clone(), *hi_op, Expr::Const(*hi));
                self.walk_and(&lo_cmp, &hi_cmp, mask, exact)
            }
            Predicate::InSet { expr, values } => self.walk_in_set(expr, values, mask, exact),
            Predicate::RidIn { rids } => self.walk_rid_in(rids, mask),
            Predicate::Join { lhs, op, rhs, delta } => self.walk_join(lhs, *op, rhs, *delta, mask),
        }
    }

    fn walk_and(&self, x: &Predicate, y: &Predicate, mask: &CandidateMask, exact: bool) -> Result<Bracket> {
        let (first, second) = self.order_for_and(x, y);
        let bf = self.walk(first, mask, exact)?;
        self.run.check()?;
        if bf.upper.count() == 0 {
            let empty = Bitvector::zeros(self.partition.row_count());
            return Ok(Bracket::exact(empty));
        }
        let bs = self.walk(second, &bf.upper, exact)?;
        let lower = bf.lower.logical_and(&bs.lower)?;
        let upper = bf.upper.logical_and(&bs.upper)?;
        Ok(Bracket { lower, upper })
    }

    fn walk_or(&self, x: &Predicate, y: &Predicate, mask: &CandidateMask, exact: bool) -> Result<Bracket> {
        let (first, second) = self.order_for_or(x, y);
        let bf = self.walk(first, mask, exact)?;
        self.run.check()?;
        let remaining = mask.logical_minus(&bf.lower)?;
        let bs = self.walk(second, &remaining, exact)?;
        let lower = bf.lower.logical_or(&bs.lower)?;
        let upper = bf.upper.logical_or(&bs.upper)?;
        Ok(Bracket { lower, upper })
    }

    /// Heuristic ordering for AND: indexed child first, then the more
    /// selective (smaller estimated hit count) child first.
    fn order_for_and<'a>(&self, x: &'a Predicate, y: &'a Predicate) -> (&'a Predicate, &'a Predicate) {
        let (hx, sx) = self.cost_hint(x);
        let (hy, sy) = self.cost_hint(y);
        let x_first = match (hx, hy) {
            (true, false) => true,
            (false, true) => false,
            _ => sx <= sy,
        };
        if x_first {
            (x, y)
        } else {
            (y, x)
        }
    }

    /// Heuristic ordering for OR: indexed child first, then the less
    /// selective (larger estimated hit count) child first.
    fn order_for_or<'a>(&self, x: &'a Predicate, y: &'a Predicate) -> (&'a Predicate, &'a Predicate) {
        let (hx, sx) = self.cost_hint(x);
        let (hy, sy) = self.cost_hint(y);
        let x_first = match (hx, hy) {
            (true, false) => true,
            (false, true) => false,
            _ => sx >= sy,
        };
        if x_first {
            (x, y)
        } else {
            (y, x)
        }
    }

    /// `(has_index, estimated_selectivity)`. Selectivity is
    /// `estimated_hits / row_count`, cheap and approximate — it is a
    /// tie-break, not a correctness-bearing computation.
    fn cost_hint(&self, pred: &Predicate) -> (bool, f64) {
        let row_count = self.partition.row_count().max(1) as f64;
        match pred {
            Predicate::Compare { .. } => {
                if let Some((col, op, val)) = pred.simple_column_and_value() {
                    if let Some(index) = self.partition.index(col) {
                        if let Ok((_, upper)) = index.evaluate(op, val) {
                            return (true, upper.count() as f64 / row_count);
                        }
                    }
                }
                (false, 0.5)
            }
            Predicate::Not(x) => {
                let (h, s) = self.cost_hint(x);
                (h, 1.0 - s)
            }
            Predicate::And(x, y) => {
                let (hx, sx) = self.cost_hint(x);
                let (hy, sy) = self.cost_hint(y);
                (hx || hy, (sx * sy).min(sx).min(sy))
            }
            Predicate::Or(x, y) => {
                let (hx, sx) = self.cost_hint(x);
                let (hy, sy) = self.cost_hint(y);
                (hx || hy, (sx + sy).min(1.0))
            }
            _ => (false, 0.5),
        }
    }

    fn walk_compare(&self, lhs: &Expr, op: CmpOp, rhs: &Expr, mask: &CandidateMask, exact: bool) -> Result<Bracket> {
        let simple = Predicate::Compare { lhs: lhs.clone(), op, rhs: rhs.clone() }
            .simple_column_and_value()
            .map(|(c, o, v)| (c.to_string(), o, v));
        if let Some((col, op, val)) = simple {
            if let Some(index) = self.partition.index(&col) {
                let (lower, upper) = index.evaluate(op, val)?;
                let mut lower = lower.logical_and(mask)?;
                let mut upper = upper.logical_and(mask)?;
                if exact && lower.to_bit_vec() != upper.to_bit_vec() {
                    let resolved = self.resolve_straddle(&col, op, val, &lower, &upper)?;
                    lower = resolved.clone();
                    upper = resolved;
                }
                return Ok(Bracket { lower, upper });
            }
            tracing::warn!(column = %col, "no index for column, falling back to scan");
        }
        let pred = Predicate::Compare { lhs: lhs.clone(), op, rhs: rhs.clone() };
        let result = self.scan(&pred, mask)?;
        Ok(Bracket::exact(result))
    }

    /// Resolve the rows in `upper \ lower` by scanning the raw column,
    /// so `evaluate()` can return an exact hit set even when the index
    /// alone could only bracket the answer.
    fn resolve_straddle(
        &self,
        col: &str,
        op: CmpOp,
        val: f64,
        lower: &Bitvector,
        upper: &Bitvector,
    ) -> Result<Bitvector> {
        let straddle = upper.logical_minus(lower)?;
        let pred = Predicate::cmp(Expr::column(col), op, Expr::Const(val));
        let confirmed = self.scan(&pred, &straddle)?;
        lower.logical_or(&confirmed)
    }

    fn walk_in_set(&self, expr: &Expr, values: &[ScalarValue], mask: &CandidateMask, exact: bool) -> Result<Bracket> {
        let col = expr.as_bare_column();
        let indexable = col.and_then(|c| self.partition.index(c).map(|idx| (c, idx)));
        if let (Some((col, index)), true) = (indexable, values.iter().all(|v| v.as_f64().is_some())) {
            let mut lower = Bitvector::zeros(self.partition.row_count());
            let mut upper = Bitvector::zeros(self.partition.row_count());
            for v in values {
                let v = v.as_f64().expect("checked all-numeric above");
                let (l, u) = index.evaluate(CmpOp::Eq, v)?;
                lower = lower.logical_or(&l)?;
                upper = upper.logical_or(&u)?;
            }
            lower = lower.logical_and(mask)?;
            upper = upper.logical_and(mask)?;
            if exact && lower.to_bit_vec() != upper.to_bit_vec() {
                let straddle = upper.logical_minus(&lower)?;
                let pred = Predicate::InSet { expr: Expr::column(col), values: values.to_vec() };
                let confirmed = self.scan(&pred, &straddle)?;
                lower = lower.logical_or(&confirmed)?;
                upper = lower.clone();
            }
            return Ok(Bracket { lower, upper });
        }
        let pred = Predicate::InSet { expr: expr.clone(), values: values.to_vec() };
        let result = self.scan(&pred, mask)?;
        Ok(Bracket::exact(result))
    }

    fn walk_rid_in(&self, rids: &[RowId], mask: &CandidateMask) -> Result<Bracket> {
        let mut bv = Bitvector::zeros(self.partition.row_count());
        for &rid in rids {
            if rid < self.partition.row_count() {
                bv.set_bit(rid, true)?;
            }
        }
        let bv = bv.logical_and(mask)?;
        Ok(Bracket::exact(bv))
    }

    fn walk_join(&self, lhs: &str, op: CmpOp, rhs: &str, delta: Option<f64>, mask: &CandidateMask) -> Result<Bracket> {
        let pred = Predicate::Join { lhs: lhs.to_string(), op, rhs: rhs.to_string(), delta };
        let result = self.scan(&pred, mask)?;
        Ok(Bracket::exact(result))
    }

    /// Evaluate `pred` row-by-row, restricted to positions set in `mask`.
    /// Used for complex leaves and as the whole-tree fallback in
    /// `sequential_scan`.
    fn scan(&self, pred: &Predicate, mask: &CandidateMask) -> Result<Bitvector> {
        match pred {
            Predicate::Not(x) => {
                let hx = self.scan(x, mask)?;
                mask.logical_minus(&hx)
            }
            Predicate::And(x, y) => {
                let hx = self.scan(x, mask)?;
                self.run.check()?;
                let hy = self.scan(y, mask)?;
                hx.logical_and(&hy)
            }
            Predicate::Or(x, y) => {
                let hx = self.scan(x, mask)?;
                self.run.check()?;
                let hy = self.scan(y, mask)?;
                hx.logical_or(&hy)
            }
            Predicate::Xor(x, y) => {
                let hx = self.scan(x, mask)?;
                let hy = self.scan(y, mask)?;
                hx.logical_xor(&hy)
            }
            Predicate::Range { lo, lo_op, expr, hi_op, hi } => {
                let lo_cmp = Predicate::cmp(expr.clone(), flip(*lo_op), Expr::Const(*lo));
                let hi_cmp = Predicate::cmp(expr.clone(), *hi_op, Expr::Const(*hi));
                self.scan(&Predicate::and(lo_cmp, hi_cmp), mask)
            }
            Predicate::Compare { lhs, op, rhs } => {
                let n = self.partition.row_count();
                let mut bits = vec![false; n as usize];
                self.for_each_candidate(mask, |pos| {
                    let l = self.eval_expr_at(lhs, pos)?;
                    let r = self.eval_expr_at(rhs, pos)?;
                    if let (Some(l), Some(r)) = (l, r) {
                        bits[pos as usize] = op.apply(l, r);
                    }
                    Ok(())
                })?;
                Ok(Bitvector::from_bit_vec(&bits))
            }
            Predicate::InSet { expr, values } => {
                let n = self.partition.row_count();
                let mut bits = vec![false; n as usize];
                self.for_each_candidate(mask, |pos| {
                    let v = self.column_value_at(expr, pos)?;
                    let hit = match v {
                        Some(ColumnValue::Str(s)) => values.iter().any(|val| matches!(val, ScalarValue::Text(t) if *t == s)),
                        Some(v) => v.as_f64().is_some_and(|v| {
                            values.iter().any(|val| val.as_f64().is_some_and(|x| x == v))
                        }),
                        None => false,
                    };
                    bits[pos as usize] = hit;
                    Ok(())
                })?;
                Ok(Bitvector::from_bit_vec(&bits))
            }
            Predicate::RidIn { rids } => {
                let mut bv = Bitvector::zeros(self.partition.row_count());
                for &rid in rids {
                    if rid < self.partition.row_count() {
                        bv.set_bit(rid, true)?;
                    }
                }
                bv.logical_and(mask)
            }
            Predicate::Join { lhs, op, rhs, delta } => {
                let n = self.partition.row_count();
                let mut bits = vec![false; n as usize];
                let lhs_col = self.partition.column(lhs)?;
                let rhs_col = self.partition.column(rhs)?;
                self.for_each_candidate(mask, |pos| {
                    if let (Some(l), Some(r)) = (lhs_col.value_at(pos), rhs_col.value_at(pos)) {
                        if let (Some(l), Some(r)) = (l.as_f64(), r.as_f64()) {
                            let r = r + delta.unwrap_or(0.0);
                            bits[pos as usize] = op.apply(l, r);
                        }
                    }
                    Ok(())
                })?;
                Ok(Bitvector::from_bit_vec(&bits))
            }
        }
    }

    fn for_each_candidate(&self, mask: &CandidateMask, mut f: impl FnMut(u32) -> Result<()>) -> Result<()> {
        let mut steps_since_check = 0u32;
        for step in mask.first_index_set() {
            let positions: Vec<u32> = match step {
                bitindex_bitvec::Step::Range(a, b) => (a..b).collect(),
                bitindex_bitvec::Step::Scatter(v) => v,
            };
            for pos in positions {
                f(pos)?;
                steps_since_check += 1;
                if steps_since_check >= self.config.cancellation_check_granularity {
                    self.run.check()?;
                    steps_since_check = 0;
                }
            }
        }
        Ok(())
    }

    fn eval_expr_at(&self, expr: &Expr, pos: u32) -> Result<Option<f64>> {
        let mut columns = Vec::new();
        expr.columns(&mut columns);
        let mut cache: Vec<(String, Option<f64>)> = Vec::with_capacity(columns.len());
        for name in columns {
            let col = self.partition.column(&name)?;
            let val = col.value_at(pos).and_then(|v| v.as_f64());
            cache.push((name, val));
        }
        Ok(expr.eval(&|name: &str| cache.iter().find(|(n, _)| n == name).and_then(|(_, v)| *v)))
    }

    fn column_value_at(&self, expr: &Expr, pos: u32) -> Result<Option<ColumnValue>> {
        let name = expr.as_bare_column().ok_or_else(|| {
            kind_err(Kind::UnknownColumn, "InSet scan requires a bare column expression")
        })?;
        let col = self.partition.column(name)?;
        Ok(col.value_at(pos))
    }
}

fn collect_columns(pred: &Predicate, out: &mut Vec<String>) {
    match pred {
        Predicate::Not(x) => collect_columns(x, out),
        Predicate::And(x, y) | Predicate::Or(x, y) | Predicate::Xor(x, y) => {
            collect_columns(x, out);
            collect_columns(y, out);
        }
        Predicate::Compare { lhs, rhs, .. } => {
            lhs.columns(out);
            rhs.columns(out);
        }
        Predicate::Range { expr, .. } | Predicate::InSet { expr, .. } => expr.columns(out),
        Predicate::RidIn { .. } => {}
        Predicate::Join { lhs, rhs, .. } => {
            if !out.iter().any(|c| c == lhs) {
                out.push(lhs.clone());
            }
            if !out.iter().any(|c| c == rhs) {
                out.push(rhs.clone());
            }
        }
    }
}
