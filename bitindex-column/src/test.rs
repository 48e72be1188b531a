use test_log::test;

use bitindex_base::EvalConfig;
use bitindex_bitvec::Bitvector;

use crate::{raw_values, select_values, Column, ColumnKind, ColumnStorage};

fn mask_from(bits: &[bool]) -> Bitvector {
    Bitvector::from_bit_vec(bits)
}

#[test]
fn i32_column_round_trips_raw_values() {
    let values: Vec<i32> = (0..100).collect();
    let col = Column::new(ColumnStorage::I32(values.clone()));
    assert_eq!(col.kind(), ColumnKind::I32);
    assert_eq!(col.row_count(), 100);
    let out: Vec<i32> = raw_values(&col).unwrap();
    assert_eq!(out, values);
}

#[test]
fn select_values_matches_mask_count_dense_and_sparse() {
    let values: Vec<i32> = (0..100).collect();
    let col = Column::new(ColumnStorage::I32(values.clone()));
    let mask_bits: Vec<bool> = (0..100).map(|i| i % 3 == 0).collect();
    let mask = mask_from(&mask_bits);

    let mut cfg = EvalConfig::default();
    cfg.scan_density_threshold = 0.0; // force dense path
    let dense = select_values::<i32>(&col, &mask, &cfg).unwrap();

    cfg.scan_density_threshold = 1.0; // force positional-run path
    let sparse = select_values::<i32>(&col, &mask, &cfg).unwrap();

    let expected: Vec<i32> = values.iter().copied().zip(&mask_bits).filter(|(_, &b)| b).map(|(v, _)| v).collect();
    assert_eq!(dense, expected);
    assert_eq!(sparse, expected);
    assert_eq!(dense.len(), mask.count() as usize);
}

#[test]
fn select_values_type_mismatch_is_an_error() {
    let col = Column::new(ColumnStorage::I32(vec![1, 2, 3]));
    let mask = Bitvector::ones(3);
    let cfg = EvalConfig::default();
    let err = select_values::<i64>(&col, &mask, &cfg).unwrap_err();
    assert_eq!(err.kind(), bitindex_base::Kind::TypeMismatch);
}

#[test]
fn select_values_size_mismatch_is_an_error() {
    let col = Column::new(ColumnStorage::I32(vec![1, 2, 3]));
    let mask = Bitvector::ones(4);
    let cfg = EvalConfig::default();
    let err = select_values::<i32>(&col, &mask, &cfg).unwrap_err();
    assert_eq!(err.kind(), bitindex_base::Kind::SizeMismatch);
}

#[test]
fn min_max_cached_for_numeric_columns() {
    let col = Column::new(ColumnStorage::F64(vec![3.0, -1.0, 10.5, 2.0]));
    assert_eq!(col.actual_min(), Some(-1.0));
    assert_eq!(col.actual_max(), Some(10.5));
    // Second call exercises the cache path.
    assert_eq!(col.actual_min(), Some(-1.0));
}

#[test]
fn min_max_is_none_for_text_columns() {
    let col = Column::new(ColumnStorage::Text(vec!["a".into(), "b".into()]));
    assert_eq!(col.actual_min(), None);
    assert_eq!(col.actual_max(), None);
}

#[test]
fn null_mask_gates_value_at() {
    let mut null_mask = Bitvector::ones(5);
    null_mask.set_bit(2, false).unwrap();
    let col = Column::with_null_mask(ColumnStorage::I32(vec![1, 2, 3, 4, 5]), null_mask).unwrap();
    assert!(col.value_at(2).is_none());
    assert!(col.value_at(0).is_some());
}

#[test]
fn category_column_select_round_trips() {
    let width = 4u16;
    let mut data = Vec::new();
    for s in ["ab", "cd", "ef"] {
        let mut buf = vec![0u8; width as usize];
        buf[..s.len()].copy_from_slice(s.as_bytes());
        data.extend(buf);
    }
    let col = Column::new(ColumnStorage::Category { width, data });
    let mask = Bitvector::ones(3);
    let out = col.select_category(&mask).unwrap();
    assert_eq!(out, vec!["ab".to_string(), "cd".to_string(), "ef".to_string()]);
}
