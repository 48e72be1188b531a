use std::collections::HashMap;

use bitindex_base::{EvalConfig, Result, RunControl};
use bitindex_bitvec::Bitvector;
use bitindex_column::{Column, ColumnStorage};
use bitindex_index::BinnedIndex;
use test_log::test;

use super::*;

struct TestPartition {
    row_count: u32,
    columns: HashMap<String, Column>,
    indexes: HashMap<String, BinnedIndex>,
}

impl TestPartition {
    fn new(row_count: u32) -> Self {
        TestPartition { row_count, columns: HashMap::new(), indexes: HashMap::new() }
    }

    fn with_i32(mut self, name: &str, values: Vec<i32>) -> Self {
        self.columns.insert(name.to_string(), Column::new(ColumnStorage::I32(values)));
        self
    }
    fn with_i16(mut self, name: &str, values: Vec<i16>) -> Self {
        self.columns.insert(name.to_string(), Column::new(ColumnStorage::I16(values)));
        self
    }
    fn with_f32(mut self, name: &str, values: Vec<f32>) -> Self {
        self.columns.insert(name.to_string(), Column::new(ColumnStorage::F32(values)));
        self
    }
    fn with_f64(mut self, name: &str, values: Vec<f64>) -> Self {
        self.columns.insert(name.to_string(), Column::new(ColumnStorage::F64(values)));
        self
    }

    /// Builds a one-bin-per-distinct-value equality index, exact for every op.
    fn with_equality_index(mut self, name: &str) -> Self {
        let col = self.columns.get(name).expect("column must exist before indexing");
        let mut by_value: Vec<(f64, Vec<u32>)> = Vec::new();
        for pos in 0..col.row_count() {
            if let Some(v) = col.value_at(pos).and_then(|v| v.as_f64()) {
                match by_value.iter_mut().find(|(val, _)| *val == v) {
                    Some((_, rows)) => rows.push(pos),
                    None => by_value.push((v, vec![pos])),
                }
            }
        }
        by_value.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        let values: Vec<f64> = by_value.iter().map(|(v, _)| *v).collect();
        let bins: Vec<Bitvector> = by_value
            .iter()
            .map(|(_, rows)| {
                let mut bv = Bitvector::zeros(self.row_count);
                for &r in rows {
                    bv.set_bit(r, true).unwrap();
                }
                bv
            })
            .collect();
        let index = BinnedIndex::new_equality(values, bins, self.row_count).unwrap();
        self.indexes.insert(name.to_string(), index);
        self
    }
}

impl PartitionSource for TestPartition {
    fn row_count(&self) -> u32 {
        self.row_count
    }
    fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .get(name)
            .ok_or_else(|| bitindex_base::kind_err(bitindex_base::Kind::UnknownColumn, format!("unknown column {name}")))
    }
    fn index(&self, name: &str) -> Option<&BinnedIndex> {
        self.indexes.get(name)
    }
}

fn evaluator(p: &TestPartition) -> Evaluator<'_, TestPartition> {
    Evaluator::new(p, EvalConfig::default(), RunControl::default())
}

fn hit_count(bv: &Bitvector) -> u32 {
    bv.count()
}

// Scenario 1: a: i32, b: i16, c: f32, 100 rows, a=b=0..99, c=100..1.
fn scenario_one() -> TestPartition {
    let a: Vec<i32> = (0..100).collect();
    let b: Vec<i16> = (0..100).collect();
    let c: Vec<f32> = (0..100).map(|i| 100.0 - i as f32).collect();
    TestPartition::new(100).with_i32("a", a).with_i16("b", b).with_f32("c", c)
}

#[test]
fn scenario_one_a_lt_5() {
    let p = scenario_one();
    let e = evaluator(&p);
    let pred = Predicate::cmp(Expr::column("a"), bitindex_index::CmpOp::Lt, Expr::Const(5.0));
    assert_eq!(hit_count(&e.evaluate(&pred).unwrap()), 5);
}

#[test]
fn scenario_one_a_plus_b_gt_150() {
    let p = scenario_one();
    let e = evaluator(&p);
    let expr = Expr::Binary(BinOp::Add, Box::new(Expr::column("a")), Box::new(Expr::column("b")));
    let pred = Predicate::cmp(expr, bitindex_index::CmpOp::Gt, Expr::Const(150.0));
    assert_eq!(hit_count(&e.evaluate(&pred).unwrap()), 24);
}

#[test]
fn scenario_one_a_lt_60_and_c_lt_60() {
    let p = scenario_one();
    let e = evaluator(&p);
    let left = Predicate::cmp(Expr::column("a"), bitindex_index::CmpOp::Lt, Expr::Const(60.0));
    let right = Predicate::cmp(Expr::column("c"), bitindex_index::CmpOp::Lt, Expr::Const(60.0));
    let pred = Predicate::and(left, right);
    assert_eq!(hit_count(&e.evaluate(&pred).unwrap()), 19);
}

#[test]
fn scenario_one_c_gt_90() {
    let p = scenario_one();
    let e = evaluator(&p);
    let pred = Predicate::cmp(Expr::column("c"), bitindex_index::CmpOp::Gt, Expr::Const(90.0));
    assert_eq!(hit_count(&e.evaluate(&pred).unwrap()), 10);
}

#[test]
fn scenario_one_c_gt_a() {
    let p = scenario_one();
    let e = evaluator(&p);
    let pred = Predicate::cmp(Expr::column("c"), bitindex_index::CmpOp::Gt, Expr::column("a"));
    assert_eq!(hit_count(&e.evaluate(&pred).unwrap()), 50);
}

// Scenario 2/3: a1[j] = j & 0x7FFF, a2[j] = j>>1, a3[j] = 0.25*j.
fn scenario_arrays(n: u32) -> TestPartition {
    let a1: Vec<i32> = (0..n as i64).map(|j| (j & 0x7FFF) as i32).collect();
    let a2: Vec<i32> = (0..n as i64).map(|j| (j >> 1) as i32).collect();
    let a3: Vec<f64> = (0..n as i64).map(|j| 0.25 * j as f64).collect();
    TestPartition::new(n).with_i32("a1", a1).with_i32("a2", a2).with_f64("a3", a3)
}

#[test]
fn scenario_two_a1_lt_5() {
    for &n in &[10u32, 100, 40_000] {
        let p = scenario_arrays(n);
        let e = evaluator(&p);
        let pred = Predicate::cmp(Expr::column("a1"), bitindex_index::CmpOp::Lt, Expr::Const(5.0));
        let expected = (n.min(5) + 5 * (n >> 15)) as u32;
        assert_eq!(hit_count(&e.evaluate(&pred).unwrap()), expected, "n={n}");
    }
}

#[test]
fn scenario_three_combined_predicate() {
    for &n in &[14u32, 100, 1000] {
        let p = scenario_arrays(n);
        let e = evaluator(&p);
        let a2_le_11 = Predicate::cmp(Expr::column("a2"), bitindex_index::CmpOp::Le, Expr::Const(11.0));
        let a1_lt_5 = Predicate::cmp(Expr::column("a1"), bitindex_index::CmpOp::Lt, Expr::Const(5.0));
        let a3_range = Predicate::Range {
            lo: 2.0,
            lo_op: bitindex_index::CmpOp::Le,
            expr: Expr::column("a3"),
            hi_op: bitindex_index::CmpOp::Lt,
            hi: 3.5,
        };
        let pred = Predicate::and(a2_le_11, Predicate::or(a1_lt_5, a3_range));
        let expected = n.min(5) + 6;
        assert_eq!(hit_count(&e.evaluate(&pred).unwrap()), expected, "n={n}");
    }
}

#[test]
fn estimate_brackets_the_exact_evaluate_result() {
    let p = scenario_one().with_equality_index("a");
    let e = evaluator(&p);
    let pred = Predicate::cmp(Expr::column("a"), bitindex_index::CmpOp::Lt, Expr::Const(30.0));
    let (lower, upper) = e.estimate(&pred).unwrap();
    let exact = e.evaluate(&pred).unwrap();
    assert!(lower.logical_minus(&exact).unwrap().count() == 0, "lower must be a subset of the exact hits");
    assert!(exact.logical_minus(&upper).unwrap().count() == 0, "exact hits must be a subset of upper");
}

#[test]
fn equality_index_pushdown_matches_sequential_scan() {
    let p = scenario_one().with_equality_index("a");
    let e = evaluator(&p);
    let pred = Predicate::cmp(Expr::column("a"), bitindex_index::CmpOp::Eq, Expr::Const(42.0));
    let via_index = e.evaluate(&pred).unwrap();
    let via_scan = e.sequential_scan(&pred).unwrap();
    assert_eq!(via_index.to_bit_vec(), via_scan.to_bit_vec());
}

#[test]
fn not_is_complement_within_candidate_mask() {
    let p = scenario_one();
    let e = evaluator(&p);
    let inner = Predicate::cmp(Expr::column("a"), bitindex_index::CmpOp::Lt, Expr::Const(5.0));
    let negated = Predicate::not(inner.clone());
    let a = e.evaluate(&inner).unwrap();
    let b = e.evaluate(&negated).unwrap();
    assert_eq!(a.count() + b.count(), 100);
}

#[test]
fn xor_of_identical_predicates_is_empty() {
    let p = scenario_one();
    let e = evaluator(&p);
    let pred = Predicate::cmp(Expr::column("a"), bitindex_index::CmpOp::Lt, Expr::Const(50.0));
    let xored = Predicate::xor(pred.clone(), pred);
    assert_eq!(e.evaluate(&xored).unwrap().count(), 0);
}

#[test]
fn in_set_matches_membership() {
    let p = scenario_one();
    let e = evaluator(&p);
    let pred = Predicate::InSet {
        expr: Expr::column("a"),
        values: vec![ScalarValue::Number(1.0), ScalarValue::Number(2.0), ScalarValue::Number(3.0)],
    };
    assert_eq!(e.evaluate(&pred).unwrap().count(), 3);
}

#[test]
fn rid_in_restricts_to_named_rows() {
    let p = scenario_one();
    let e = evaluator(&p);
    let pred = Predicate::RidIn { rids: vec![0, 5, 10, 99] };
    let hits = e.evaluate(&pred).unwrap();
    assert_eq!(hits.count(), 4);
    assert!(hits.get_bit(5));
    assert!(!hits.get_bit(6));
}

#[test]
fn cancellation_aborts_evaluation() {
    let p = scenario_arrays(1000);
    let token = bitindex_base::CancellationToken::new();
    token.cancel();
    let run = RunControl { cancel: token, deadline: None };
    let e = Evaluator::new(&p, EvalConfig::default(), run);
    let pred = Predicate::cmp(Expr::column("a1"), bitindex_index::CmpOp::Lt, Expr::Const(5.0));
    let err = e.evaluate(&pred).unwrap_err();
    assert_eq!(err.kind(), bitindex_base::Kind::Cancelled);
}

#[test]
fn query_rejects_evaluate_before_specify() {
    let p = scenario_one();
    let e = evaluator(&p);
    let mut q = Query::new();
    q.set_where(Predicate::cmp(Expr::column("a"), bitindex_index::CmpOp::Lt, Expr::Const(5.0))).unwrap();
    let err = q.evaluate(&e).unwrap_err();
    assert_eq!(err.kind(), bitindex_base::Kind::InvalidState);
}

#[test]
fn query_full_lifecycle_estimate_then_evaluate_then_truncate() {
    let p = scenario_one();
    let e = evaluator(&p);
    let mut q = Query::new();
    q.set_where(Predicate::cmp(Expr::column("a"), bitindex_index::CmpOp::Lt, Expr::Const(10.0))).unwrap();
    q.specify().unwrap();
    q.estimate(&e).unwrap();
    assert_eq!(q.state(), QueryState::QuickEstimated);
    q.evaluate(&e).unwrap();
    assert_eq!(q.state(), QueryState::FullyEvaluated);
    assert_eq!(q.hits().unwrap().count(), 10);
    q.truncate_hits(3).unwrap();
    assert_eq!(q.state(), QueryState::HitsTruncated);
    assert_eq!(q.hits().unwrap().count(), 3);
}

#[test]
fn query_truncate_stages_before_refresh_hits() {
    let p = scenario_one();
    let e = evaluator(&p);
    let mut q = Query::new();
    q.set_where(Predicate::cmp(Expr::column("a"), bitindex_index::CmpOp::Lt, Expr::Const(10.0))).unwrap();
    q.specify().unwrap();
    q.evaluate(&e).unwrap();
    q.truncate(4).unwrap();
    assert_eq!(q.state(), QueryState::BundlesTruncated);
    // hits still reflects the full evaluation, not the staged truncation.
    assert_eq!(q.hits().unwrap().count(), 10);
    q.refresh_hits().unwrap();
    assert_eq!(q.state(), QueryState::HitsTruncated);
    assert_eq!(q.hits().unwrap().count(), 4);
}

#[test]
fn query_refresh_hits_rejects_wrong_state() {
    let p = scenario_one();
    let e = evaluator(&p);
    let mut q = Query::new();
    q.set_where(Predicate::cmp(Expr::column("a"), bitindex_index::CmpOp::Lt, Expr::Const(10.0))).unwrap();
    q.specify().unwrap();
    q.evaluate(&e).unwrap();
    let err = q.refresh_hits().unwrap_err();
    assert_eq!(err.kind(), bitindex_base::Kind::InvalidState);
}
