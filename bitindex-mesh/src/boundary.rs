//! Bitmap → boundary points, per `spec.md` §4.5: every hit with at least
//! one in-mesh neighbour (differing by ±1 in exactly one coordinate)
//! that is not itself a hit.

use bitindex_base::{Result, RunControl};
use bitindex_bitvec::{Bitvector, Step};

use crate::shape::MeshShape;

/// Emits every boundary point's coordinates, row-major by position (the
/// order `IndexSet` already walks positions in).
pub fn points_on_boundary(bv: &Bitvector, shape: &MeshShape) -> Result<Vec<Vec<u32>>> {
    points_on_boundary_cancellable(bv, shape, &RunControl::default())
}

pub fn points_on_boundary_cancellable(
    bv: &Bitvector,
    shape: &MeshShape,
    run: &RunControl,
) -> Result<Vec<Vec<u32>>> {
    shape.check_size(bv.size())?;
    let mut out = Vec::new();
    for step in bv.first_index_set() {
        run.check()?;
        match step {
            Step::Range(a, b) => {
                for pos in a..b {
                    if is_boundary(bv, shape, pos) {
                        out.push(shape.coords_of(pos));
                    }
                }
            }
            Step::Scatter(positions) => {
                for pos in positions {
                    if is_boundary(bv, shape, pos) {
                        out.push(shape.coords_of(pos));
                    }
                }
            }
        }
    }
    Ok(out)
}

/// A hit is a boundary point if any of its `2*ndim` axis-aligned
/// neighbours is either outside the mesh (always exposed, per
/// `spec.md` §4.5) or inside the mesh but not itself a hit.
fn is_boundary(bv: &Bitvector, shape: &MeshShape, pos: u32) -> bool {
    let coords = shape.coords_of(pos);
    for (d, &extent) in shape.dims().iter().enumerate() {
        for delta in [-1i64, 1] {
            let neighbour = coords[d] as i64 + delta;
            if neighbour < 0 || neighbour >= extent as i64 {
                return true;
            }
            let mut nc = coords.clone();
            nc[d] = neighbour as u32;
            let lin = shape.linear_index(&nc).expect("neighbour coordinate is within range by construction");
            if !bv.get_bit(lin) {
                return true;
            }
        }
    }
    false
}
