//! `Block` — a half-open N-D hyper-rectangle — and the bitmap ↔ blocks
//! decomposition, per `spec.md` §4.5.

use std::collections::BTreeMap;
use std::ops::Deref;

use bitindex_base::{Result, RunControl};
use bitindex_bitvec::{Bitvector, Step};

use crate::shape::MeshShape;

/// A multi-dimensional half-open hyper-rectangle
/// `[lo0, hi0) × [lo1, hi1) × …`, stored as the flat sequence of `2*d`
/// integers `spec.md` §3 specifies: `[lo0, hi0, lo1, hi1, …]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block(Vec<u32>);

impl Block {
    pub fn from_bounds(bounds: Vec<u32>) -> Block {
        debug_assert_eq!(bounds.len() % 2, 0);
        Block(bounds)
    }

    pub fn ndim(&self) -> usize {
        self.0.len() / 2
    }

    pub fn lo(&self, dim: usize) -> u32 {
        self.0[2 * dim]
    }

    pub fn hi(&self, dim: usize) -> u32 {
        self.0[2 * dim + 1]
    }

    pub fn into_bounds(self) -> Vec<u32> {
        self.0
    }

    /// Number of mesh points this block covers.
    pub fn volume(&self) -> u64 {
        (0..self.ndim()).map(|d| (self.hi(d) - self.lo(d)) as u64).product()
    }

    pub fn contains(&self, coords: &[u32]) -> bool {
        coords.len() == self.ndim()
            && (0..self.ndim()).all(|d| coords[d] >= self.lo(d) && coords[d] < self.hi(d))
    }
}

impl Deref for Block {
    type Target = [u32];
    fn deref(&self) -> &[u32] {
        &self.0
    }
}

/// Decompose a linear range `[a, b)` (row-major position space over
/// `dims`) into the minimal set of canonical row-major hyper-rectangles
/// — at most 3 per recursion level, so `O(d)` blocks per contiguous run,
/// independent of the run's length. This is the general-N-D routine the
/// d=1/2/3 entry points below also use: the decomposition is already
/// optimal and dimension-count-agnostic, so there is no separate
/// specialised code path to maintain for small d.
fn decompose_range(a: u64, b: u64, dims: &[u32]) -> Vec<Vec<(u32, u32)>> {
    if a >= b {
        return Vec::new();
    }
    if dims.len() == 1 {
        return vec![vec![(a as u32, b as u32)]];
    }
    let stride: u64 = dims[1..].iter().map(|&d| d as u64).product();
    let i_a = a / stride;
    let rem_a = a % stride;
    let last = b - 1;
    let i_b = last / stride;
    let rem_b_excl = last % stride + 1;

    let mut out = Vec::new();
    let prepend = |lo: u32, hi: u32, inner: Vec<Vec<(u32, u32)>>, out: &mut Vec<Vec<(u32, u32)>>| {
        for tail in inner {
            let mut v = Vec::with_capacity(tail.len() + 1);
            v.push((lo, hi));
            v.extend(tail);
            out.push(v);
        }
    };

    if i_a == i_b {
        let inner = decompose_range(rem_a, rem_b_excl, &dims[1..]);
        prepend(i_a as u32, i_a as u32 + 1, inner, &mut out);
        return out;
    }

    if rem_a != 0 {
        let inner = decompose_range(rem_a, stride, &dims[1..]);
        prepend(i_a as u32, i_a as u32 + 1, inner, &mut out);
    }
    let mid_lo = if rem_a == 0 { i_a } else { i_a + 1 };
    let full_last_row = rem_b_excl == stride;
    let mid_hi = if full_last_row { i_b + 1 } else { i_b };
    if mid_lo < mid_hi {
        let inner = decompose_range(0, stride, &dims[1..]);
        prepend(mid_lo as u32, mid_hi as u32, inner, &mut out);
    }
    if !full_last_row {
        let inner = decompose_range(0, rem_b_excl, &dims[1..]);
        prepend(i_b as u32, i_b as u32 + 1, inner, &mut out);
    }
    out
}

fn push_run(dims: &[u32], a: u32, b: u32, out: &mut Vec<Block>) {
    for bounds in decompose_range(a as u64, b as u64, dims) {
        let flat: Vec<u32> = bounds.into_iter().flat_map(|(lo, hi)| [lo, hi]).collect();
        out.push(Block::from_bounds(flat));
    }
}

/// Converts scattered positions from one literal word into maximal
/// contiguous runs before decomposing each, so a literal with several
/// adjacent hit bits does not produce one block per bit.
fn push_scatter(dims: &[u32], positions: &[u32], out: &mut Vec<Block>) {
    let mut i = 0;
    while i < positions.len() {
        let start = positions[i];
        let mut j = i + 1;
        while j < positions.len() && positions[j] == positions[j - 1] + 1 {
            j += 1;
        }
        push_run(dims, start, positions[j - 1] + 1, out);
        i = j;
    }
}

/// Bitmap → blocks: emit the disjoint rectangles whose union is the hit
/// set. `merge` additionally coalesces blocks that share a face and
/// agree on every other dimension, repeated per dimension slowest to
/// fastest until no further merge applies (a fixed point, so a second
/// `merge` pass over the result is a no-op — the idempotence property
/// `spec.md` §8 requires).
pub fn to_blocks(bv: &Bitvector, shape: &MeshShape, merge: bool) -> Result<Vec<Block>> {
    to_blocks_cancellable(bv, shape, merge, &RunControl::default())
}

/// As [`to_blocks`], but checks `run` for cancellation between
/// `IndexSet` steps, per `spec.md` §5's suspension-point contract.
pub fn to_blocks_cancellable(
    bv: &Bitvector,
    shape: &MeshShape,
    merge: bool,
    run: &RunControl,
) -> Result<Vec<Block>> {
    shape.check_size(bv.size())?;
    run.check()?;
    if shape.ndim() == 0 || bv.size() == 0 {
        return Ok(Vec::new());
    }
    if bv.count() == bv.size() {
        let flat: Vec<u32> = shape.dims().iter().flat_map(|&d| [0, d]).collect();
        return Ok(vec![Block::from_bounds(flat)]);
    }

    let mut blocks = Vec::new();
    for step in bv.first_index_set() {
        run.check()?;
        match step {
            Step::Range(a, b) => push_run(shape.dims(), a, b, &mut blocks),
            Step::Scatter(positions) => push_scatter(shape.dims(), &positions, &mut blocks),
        }
    }
    if merge {
        merge_blocks(&mut blocks, shape.ndim());
    }
    blocks.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(blocks)
}

fn other_dims_key(b: &Block, skip: usize) -> Vec<u32> {
    let mut key = Vec::with_capacity((b.ndim() - 1) * 2);
    for d in 0..b.ndim() {
        if d != skip {
            key.push(b.lo(d));
            key.push(b.hi(d));
        }
    }
    key
}

fn rebuild(key: &[u32], skip: usize, ndim: usize, lo: u32, hi: u32) -> Block {
    let mut bounds = vec![0u32; ndim * 2];
    let mut k = 0;
    for d in 0..ndim {
        if d == skip {
            bounds[2 * d] = lo;
            bounds[2 * d + 1] = hi;
        } else {
            bounds[2 * d] = key[k];
            bounds[2 * d + 1] = key[k + 1];
            k += 2;
        }
    }
    Block::from_bounds(bounds)
}

/// One coalescing pass along dimension `dim`: groups blocks that agree
/// on every other dimension, then merges touching (`hi == next.lo`)
/// intervals along `dim` within each group. Returns whether anything
/// merged.
fn merge_along_dim(blocks: &mut Vec<Block>, dim: usize) -> bool {
    let mut groups: BTreeMap<Vec<u32>, Vec<(u32, u32)>> = BTreeMap::new();
    for b in blocks.iter() {
        groups.entry(other_dims_key(b, dim)).or_default().push((b.lo(dim), b.hi(dim)));
    }
    let ndim = blocks.first().map(|b| b.ndim()).unwrap_or(0);
    let mut changed = false;
    let mut next = Vec::with_capacity(blocks.len());
    for (key, mut intervals) in groups {
        intervals.sort_unstable();
        let before = intervals.len();
        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(before);
        for (lo, hi) in intervals {
            if let Some(last) = merged.last_mut() {
                if last.1 == lo {
                    last.1 = hi;
                    continue;
                }
            }
            merged.push((lo, hi));
        }
        if merged.len() < before {
            changed = true;
        }
        for (lo, hi) in merged {
            next.push(rebuild(&key, dim, ndim, lo, hi));
        }
    }
    *blocks = next;
    changed
}

/// Applies the merge pass per dimension, slowest (`0`) to fastest
/// (`ndim - 1`), repeating full sweeps until a sweep makes no change.
pub fn merge_blocks(blocks: &mut Vec<Block>, ndim: usize) {
    if ndim == 0 {
        return;
    }
    loop {
        let mut changed = false;
        for dim in 0..ndim {
            changed |= merge_along_dim(blocks, dim);
        }
        if !changed {
            break;
        }
    }
}

/// Rebuilds the bitvector that a block list decomposes, for round-trip
/// testing (`to_blocks(b).flatten() == b` per `spec.md` §8).
pub fn blocks_to_bitvector(blocks: &[Block], shape: &MeshShape) -> Result<Bitvector> {
    let mut bv = Bitvector::zeros(shape.size());
    for block in blocks {
        fill_block(&mut bv, shape, block)?;
    }
    Ok(bv)
}

fn fill_block(bv: &mut Bitvector, shape: &MeshShape, block: &Block) -> Result<()> {
    let ndim = shape.ndim();
    if ndim == 0 {
        return Ok(());
    }
    let last = ndim - 1;
    let run_len = block.hi(last) - block.lo(last);
    let mut coords: Vec<u32> = (0..ndim).map(|d| block.lo(d)).collect();
    loop {
        let start = shape.linear_index(&coords)?;
        for w in 0..run_len {
            bv.set_bit(start + w, true)?;
        }
        if last == 0 {
            return Ok(());
        }
        // Odometer over the outer dims (everything but `last`), carrying
        // from `last - 1` down to `0`.
        let mut d = last;
        loop {
            if d == 0 {
                return Ok(());
            }
            d -= 1;
            coords[d] += 1;
            if coords[d] < block.hi(d) {
                break;
            }
            coords[d] = block.lo(d);
        }
    }
}
