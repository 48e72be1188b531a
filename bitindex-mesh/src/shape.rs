//! `MeshShape`: the extents of a regular row-major mesh, per `spec.md`
//! §3's "Mesh shape" data model entry.

use bitindex_base::{kind_err, Kind, Result};

/// An ordered vector of dimension extents `dim[0], …, dim[d-1]`. Row
/// indices linearise in row-major order:
/// `index = ((i0*dim[1] + i1)*dim[2] + i2)*… + i_{d-1}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshShape {
    dims: Vec<u32>,
    /// `strides[i]` = product of `dims[i+1..]`, the step in linear index
    /// space for a unit change in coordinate `i`. `strides[d-1] == 1`.
    strides: Vec<u64>,
    size: u32,
}

impl MeshShape {
    /// Builds a shape, checking the product of dimensions does not
    /// overflow `u32` (*dim-overflow* per `spec.md` §7 otherwise).
    pub fn new(dims: Vec<u32>) -> Result<MeshShape> {
        let mut strides = vec![1u64; dims.len()];
        let mut running = 1u64;
        for i in (0..dims.len()).rev() {
            strides[i] = running;
            running = running.saturating_mul(dims[i] as u64);
            if running > u32::MAX as u64 {
                return Err(kind_err(
                    Kind::DimOverflow,
                    format!("mesh shape {dims:?} exceeds u32::MAX cells"),
                ));
            }
        }
        let size = if dims.is_empty() { 0 } else { running as u32 };
        Ok(MeshShape { dims, strides, size })
    }

    pub fn dims(&self) -> &[u32] {
        &self.dims
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of cells in the mesh (product of `dims`); 0 for a
    /// shape with no dimensions.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub(crate) fn strides(&self) -> &[u64] {
        &self.strides
    }

    /// Row-major linear index of `coords`. *dim-overflow* if `coords`
    /// has the wrong length or any coordinate is out of range for its
    /// dimension.
    pub fn linear_index(&self, coords: &[u32]) -> Result<u32> {
        if coords.len() != self.dims.len() {
            return Err(kind_err(
                Kind::DimOverflow,
                format!("expected {} coordinates, got {}", self.dims.len(), coords.len()),
            ));
        }
        let mut idx = 0u64;
        for (i, &c) in coords.iter().enumerate() {
            if c >= self.dims[i] {
                return Err(kind_err(
                    Kind::DimOverflow,
                    format!("coordinate {c} out of range for dimension {i} (extent {})", self.dims[i]),
                ));
            }
            idx += c as u64 * self.strides[i];
        }
        Ok(idx as u32)
    }

    /// Row-major coordinates of the point at linear index `pos`.
    /// `pos` is assumed `< size()`; not validated here since this is a
    /// hot path called once per hit.
    pub fn coords_of(&self, pos: u32) -> Vec<u32> {
        let mut rem = pos as u64;
        let mut coords = Vec::with_capacity(self.dims.len());
        for &stride in &self.strides {
            coords.push((rem / stride) as u32);
            rem %= stride;
        }
        coords
    }

    pub(crate) fn check_size(&self, bv_size: u32) -> Result<()> {
        if self.size != bv_size {
            return Err(kind_err(
                Kind::SizeMismatch,
                format!("mesh shape has {} cells but bitvector has {bv_size} bits", self.size),
            ));
        }
        Ok(())
    }
}
