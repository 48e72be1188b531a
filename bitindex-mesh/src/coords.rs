//! Bitmap → coordinates, per `spec.md` §4.5: every set bit's row-major
//! coordinates, flat-packed.

use bitindex_base::Result;
use bitindex_bitvec::{Bitvector, Step};

use crate::shape::MeshShape;

/// Flat-packed row-major coordinates of every set bit: `ndim` entries
/// per hit, in ascending position order. Linear in the number of hits.
pub fn bitvector_to_coordinates(bv: &Bitvector, shape: &MeshShape) -> Result<Vec<u32>> {
    shape.check_size(bv.size())?;
    let mut out = Vec::with_capacity(bv.count() as usize * shape.ndim());
    for step in bv.first_index_set() {
        match step {
            Step::Range(a, b) => {
                for pos in a..b {
                    out.extend(shape.coords_of(pos));
                }
            }
            Step::Scatter(positions) => {
                for pos in positions {
                    out.extend(shape.coords_of(pos));
                }
            }
        }
    }
    Ok(out)
}
