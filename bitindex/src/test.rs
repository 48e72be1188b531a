use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use bitindex_base::{EvalConfig, RunControl};
use bitindex_bitvec::Bitvector;
use bitindex_column::{Column, ColumnStorage};
use bitindex_eval::{Evaluator, Expr, PartitionSource, Predicate};
use bitindex_index::{BinnedIndex, CmpOp};
use bitindex_mesh::MeshShape;
use test_log::test;

use super::*;

fn unique_temp_dir(label: &str) -> PathBuf {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("bitindex-test-{label}-{}-{n}", std::process::id()))
}

fn range_index(name: &str, col: &Column, row_count: u32, boundaries: Vec<f64>) -> BinnedIndex {
    let n_bins = boundaries.len() - 1;
    let mut bins = vec![Bitvector::zeros(row_count); n_bins];
    for pos in 0..row_count {
        let Some(v) = col.value_at(pos).and_then(|v| v.as_f64()) else { continue };
        let bin = boundaries.windows(2).position(|w| v >= w[0] && v < w[1]).unwrap_or(n_bins - 1);
        bins[bin].set_bit(pos, true).unwrap();
    }
    BinnedIndex::new_range(boundaries, bins, row_count).unwrap_or_else(|e| panic!("building index for {name}: {e}"))
}

fn sample_partition() -> Partition {
    let mut p = Partition::new(6);
    p.add_column("a", Column::new(ColumnStorage::I32(vec![1, 5, 9, 13, 17, 21]))).unwrap();
    p.add_column("b", Column::new(ColumnStorage::F64(vec![0.5, 1.5, 2.5, 3.5, 4.5, 5.5]))).unwrap();
    let idx = range_index("a", p.column("a").unwrap(), 6, vec![0.0, 10.0, 25.0]);
    p.add_index("a", idx);
    p
}

#[test]
fn partition_round_trips_through_disk() {
    let dir = unique_temp_dir("partition");
    let partition = sample_partition();

    write_partition(&dir, &partition).unwrap();
    let loaded = read_partition(&dir).unwrap();

    assert_eq!(loaded.metadata(), partition.metadata());
    for pos in 0..6 {
        assert_eq!(loaded.column("a").unwrap().value_at(pos), partition.column("a").unwrap().value_at(pos));
        assert_eq!(loaded.column("b").unwrap().value_at(pos), partition.column("b").unwrap().value_at(pos));
    }
    let original_idx = partition.index("a").unwrap();
    let loaded_idx = loaded.index("a").unwrap();
    assert_eq!(loaded_idx.bin_boundaries(), original_idx.bin_boundaries());
    assert_eq!(loaded_idx.bin_weights(), original_idx.bin_weights());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn partition_with_mesh_shape_round_trips() {
    let dir = unique_temp_dir("mesh-partition");
    let mut p = Partition::new(12).with_mesh_shape(MeshShape::new(vec![3, 4]).unwrap()).unwrap();
    p.add_column("temp", Column::new(ColumnStorage::F32((0..12).map(|i| i as f32).collect()))).unwrap();

    write_partition(&dir, &p).unwrap();
    let loaded = read_partition(&dir).unwrap();
    assert_eq!(loaded.mesh_shape().unwrap().dims(), p.mesh_shape().unwrap().dims());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn reading_a_partition_that_was_never_written_is_an_io_error() {
    let dir = unique_temp_dir("missing");
    let err = read_partition(&dir).unwrap_err();
    assert_eq!(err.kind(), bitindex_base::Kind::Io);
}

#[test]
fn registry_supports_concurrent_readers() {
    let registry = std::sync::Arc::new(PartitionRegistry::new());
    registry.insert("p1", sample_partition());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            std::thread::spawn(move || {
                let p = registry.get("p1").unwrap();
                assert_eq!(p.column("a").unwrap().row_count(), 6);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(registry.names(), vec!["p1".to_string()]);

    registry.replace("p1", Partition::new(3));
    assert_eq!(registry.get("p1").unwrap().column_names().len(), 0);
}

#[test]
fn unknown_partition_is_an_error() {
    let registry = PartitionRegistry::new();
    let err = registry.get("nope").unwrap_err();
    assert_eq!(err.kind(), bitindex_base::Kind::InvalidState);
}

#[test]
fn evaluator_runs_against_a_facade_partition() {
    let p = sample_partition();
    let evaluator = Evaluator::new(&p, EvalConfig::default(), RunControl::default());
    let pred = Predicate::cmp(Expr::column("a"), CmpOp::Lt, Expr::Const(10.0));
    let hits = evaluator.evaluate(&pred).unwrap();
    assert_eq!(hits.count(), 3); // rows with a = 1, 5, 9
}

#[test]
fn histogram_counts_sum_to_the_defined_row_count() {
    let p = sample_partition();
    let hist = histogram1d(&p, "b", BinSpec::Adaptive { bins: 3 }, false, &EvalConfig::default()).unwrap();
    assert_eq!(hist.counts.iter().sum::<u32>(), 6);
}

#[test]
fn histogram_bitmaps_partition_the_hit_set_without_overlap() {
    let p = sample_partition();
    let hist = histogram1d(&p, "b", BinSpec::Explicit(vec![0.0, 2.0, 4.0, 6.0]), true, &EvalConfig::default()).unwrap();
    let bitmaps = hist.bitmaps.unwrap();
    assert_eq!(bitmaps.len(), hist.counts.len());

    let mut union = Bitvector::zeros(6);
    for (bm, &count) in bitmaps.iter().zip(hist.counts.iter()) {
        assert_eq!(bm.count(), count);
        let overlap = union.logical_and(bm).unwrap();
        assert_eq!(overlap.count(), 0, "bins must not overlap");
        union = union.logical_or(bm).unwrap();
    }
    assert_eq!(union.count(), 6);
}

#[test]
fn histogram2d_reads_each_dimension_into_its_own_array() {
    // If the two dimensions' value arrays aliased, this would fold down to
    // a single-dimension histogram instead of the full 2x3 cross.
    let mut p = Partition::new(6);
    p.add_column("x", Column::new(ColumnStorage::F64(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]))).unwrap();
    p.add_column("y", Column::new(ColumnStorage::F64(vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0]))).unwrap();

    let hist = histogram2d(
        &p,
        "x",
        BinSpec::Explicit(vec![0.0, 1.0, 2.0]),
        "y",
        BinSpec::Explicit(vec![0.0, 1.0, 2.0, 3.0]),
        false,
        &EvalConfig::default(),
    )
    .unwrap();

    assert_eq!(hist.counts.iter().sum::<u32>(), 6);
    assert_eq!(hist.counts, vec![1, 1, 1, 1, 1, 1]);
}

#[test]
fn histogram_requires_a_numeric_column() {
    let mut p = Partition::new(2);
    p.add_column("s", Column::new(ColumnStorage::Text(vec!["a".into(), "b".into()]))).unwrap();
    let err = histogram1d(&p, "s", BinSpec::Adaptive { bins: 2 }, false, &EvalConfig::default()).unwrap_err();
    assert_eq!(err.kind(), bitindex_base::Kind::TypeMismatch);
}

#[test]
fn explicit_boundaries_must_be_strictly_ascending() {
    let p = sample_partition();
    let err = histogram1d(&p, "b", BinSpec::Explicit(vec![0.0, 0.0, 1.0]), false, &EvalConfig::default()).unwrap_err();
    assert_eq!(err.kind(), bitindex_base::Kind::InvalidState);
}

#[test]
fn unknown_column_is_an_error() {
    let p = sample_partition();
    let err = p.column("nope").unwrap_err();
    assert_eq!(err.kind(), bitindex_base::Kind::UnknownColumn);
}
