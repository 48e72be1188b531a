use bitindex_bitvec::Bitvector;
use test_log::test;

use super::*;

fn mesh(dims: Vec<u32>) -> MeshShape {
    MeshShape::new(dims).unwrap()
}

fn bv_from_hits(size: u32, hits: &[u32]) -> Bitvector {
    let mut bits = vec![false; size as usize];
    for &h in hits {
        bits[h as usize] = true;
    }
    Bitvector::from_bit_vec(&bits)
}

// Seed test 5: shape (4, 5), hit set = rows 1 and 2 (every column).
#[test]
fn scenario_five_rows_merge_into_one_block() {
    let shape = mesh(vec![4, 5]);
    let hits: Vec<u32> = (5..15).collect(); // rows 1,2 * 5 cols
    let bv = bv_from_hits(20, &hits);

    let blocks = to_blocks(&bv, &shape, true).unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(&blocks[0][..], &[1, 3, 0, 5]);

    let boundary = points_on_boundary(&bv, &shape).unwrap();
    assert_eq!(boundary.len(), 10, "every hit's row-neighbour (row 0 or row 3) is a miss");
}

// Seed test 6: shape (3, 3, 3), hit set = the centre point only.
#[test]
fn scenario_six_centre_point() {
    let shape = mesh(vec![3, 3, 3]);
    let bv = bv_from_hits(27, &[shape.linear_index(&[1, 1, 1]).unwrap()]);

    let blocks = to_blocks(&bv, &shape, true).unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(&blocks[0][..], &[1, 2, 1, 2, 1, 2]);

    let boundary = points_on_boundary(&bv, &shape).unwrap();
    assert_eq!(boundary, vec![vec![1, 1, 1]], "the centre point has six missing neighbours");
}

#[test]
fn to_blocks_round_trips_through_reconstruction() {
    let shape = mesh(vec![4, 6, 5]);
    let hits: Vec<u32> = vec![0, 1, 2, 7, 8, 9, 44, 90, 91, 92, 93, 119];
    let bv = bv_from_hits(shape.size(), &hits);

    for merge_pass in [false, true] {
        let blocks = to_blocks(&bv, &shape, merge_pass).unwrap();
        let rebuilt = blocks_to_bitvector(&blocks, &shape).unwrap();
        assert_eq!(rebuilt.to_bit_vec(), bv.to_bit_vec(), "merge={merge_pass}");
    }
}

#[test]
fn merge_is_idempotent() {
    let shape = mesh(vec![5, 5]);
    let hits: Vec<u32> = (0..25).filter(|&p| p % 5 != 4).collect(); // every row minus last column
    let bv = bv_from_hits(25, &hits);

    let mut blocks = to_blocks(&bv, &shape, false).unwrap();
    merge_blocks(&mut blocks, shape.ndim());
    let once = blocks.clone();
    merge_blocks(&mut blocks, shape.ndim());
    assert_eq!(blocks, once, "a second merge pass must be a no-op");
}

#[test]
fn full_mesh_is_a_single_block() {
    let shape = mesh(vec![3, 4]);
    let bv = Bitvector::ones(12);
    let blocks = to_blocks(&bv, &shape, true).unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(&blocks[0][..], &[0, 3, 0, 4]);
}

#[test]
fn empty_hit_set_yields_no_blocks() {
    let shape = mesh(vec![3, 4]);
    let bv = Bitvector::zeros(12);
    assert!(to_blocks(&bv, &shape, true).unwrap().is_empty());
    assert!(points_on_boundary(&bv, &shape).unwrap().is_empty());
}

#[test]
fn points_on_boundary_is_always_a_subset_of_hits() {
    let shape = mesh(vec![6, 7]);
    let hits: Vec<u32> = (0..42).filter(|&p| (p / 7 + p % 7) % 3 == 0).collect();
    let bv = bv_from_hits(42, &hits);
    let boundary = points_on_boundary(&bv, &shape).unwrap();
    for coords in &boundary {
        let lin = shape.linear_index(coords).unwrap();
        assert!(bv.get_bit(lin));
    }
}

#[test]
fn bitvector_to_coordinates_matches_linear_index() {
    let shape = mesh(vec![3, 3]);
    let bv = bv_from_hits(9, &[0, 4, 8]);
    let coords = bitvector_to_coordinates(&bv, &shape).unwrap();
    assert_eq!(coords, vec![0, 0, 1, 1, 2, 2]);
}

#[test]
fn dim_overflow_is_rejected() {
    let err = MeshShape::new(vec![u32::MAX, 2]).unwrap_err();
    assert_eq!(err.kind(), bitindex_base::Kind::DimOverflow);
}

#[test]
fn size_mismatch_between_shape_and_bitvector_is_rejected() {
    let shape = mesh(vec![4, 5]);
    let bv = Bitvector::zeros(19);
    let err = to_blocks(&bv, &shape, false).unwrap_err();
    assert_eq!(err.kind(), bitindex_base::Kind::SizeMismatch);
}

#[test]
fn cancellation_aborts_block_conversion() {
    let shape = mesh(vec![1000, 1000]);
    let bv = Bitvector::ones(1_000_000);
    let token = bitindex_base::CancellationToken::new();
    token.cancel();
    let run = bitindex_base::RunControl { cancel: token, deadline: None };
    let err = to_blocks_cancellable(&bv, &shape, false, &run).unwrap_err();
    assert_eq!(err.kind(), bitindex_base::Kind::Cancelled);
}
