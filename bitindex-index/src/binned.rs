//! One `BinnedIndex` type implements all four bin-layout variants named
//! in the specification (equality, range, interval, binary-encoded
//! fanout) behind a single `layout` tag and one shared bin-combination
//! routine, per the tagged-variant-plus-generic-inner-routine dispatch
//! used throughout this workspace.

use std::collections::HashMap;

use bitindex_base::{kind_err, Kind, Result};
use bitindex_bitvec::Bitvector;

use crate::predicate::CmpOp;

/// How `boundaries` and `bins` relate to the column's value domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinLayout {
    /// `boundaries[i]` is the `i`-th distinct value; `bins[i]` is the
    /// exact set of rows equal to it. Always exact for every `CmpOp`,
    /// since the bins partition the domain at every point that matters.
    Equality,
    /// `boundaries` has `bins.len() + 1` entries; `bins[i]` covers rows
    /// in `[boundaries[i], boundaries[i+1])`. Exact for `Lt`/`Ge` when
    /// the constant lands exactly on a boundary, approximate otherwise.
    Range,
    /// Same storage shape as `Range`, built by merging several `Range`
    /// bins together (coarser); same evaluation rule applies.
    Interval,
    /// `bins` are bit-planes, not per-bin bitmaps: the real bin `i`'s
    /// bitmap is reconstructed by ANDing/negating planes according to
    /// the bits of `i`. Reduces storage from O(bins) bitmaps to
    /// O(log bins), at the cost of an AND per plane on every lookup.
    Fanout,
}

enum BinSource {
    Direct(Vec<Bitvector>),
    Planes(Vec<Bitvector>),
}

impl BinSource {
    fn bin_count(&self) -> usize {
        match self {
            BinSource::Direct(v) => v.len(),
            BinSource::Planes(planes) => 1usize << planes.len(),
        }
    }

    fn bin_bitmap(&self, i: usize) -> Result<Bitvector> {
        match self {
            BinSource::Direct(v) => v.get(i).cloned().ok_or_else(|| {
                kind_err(Kind::InvalidState, format!("bin index {i} out of range"))
            }),
            BinSource::Planes(planes) => {
                if i >= self.bin_count() {
                    return Err(kind_err(Kind::InvalidState, format!("bin index {i} out of range")));
                }
                let mut acc: Option<Bitvector> = None;
                for (p, plane) in planes.iter().enumerate() {
                    let bit_set = (i >> p) & 1 != 0;
                    let contribution = if bit_set { plane.clone() } else { plane.logical_not() };
                    acc = Some(match acc {
                        None => contribution,
                        Some(prev) => prev.logical_and(&contribution)?,
                    });
                }
                acc.ok_or_else(|| kind_err(Kind::InvalidState, "fanout index has no bit-planes"))
            }
        }
    }
}

pub struct BinnedIndex {
    layout: BinLayout,
    boundaries: Vec<f64>,
    bins: BinSource,
    weights: Vec<u32>,
    row_count: u32,
    /// Equality layout only: exact-match lookup from the bit pattern of
    /// an `f64` value to its bin index, avoiding a binary search on the
    /// hot equality path. Built once at construction.
    equality_lookup: Option<HashMap<u64, usize>>,
}

impl BinnedIndex {
    fn new(
        layout: BinLayout,
        boundaries: Vec<f64>,
        bins: BinSource,
        weights: Vec<u32>,
        row_count: u32,
    ) -> Self {
        let equality_lookup = (layout == BinLayout::Equality).then(|| {
            boundaries
                .iter()
                .enumerate()
                .map(|(i, &v)| (rapidhash::rapidhash(&v.to_le_bytes()), i))
                .collect()
        });
        BinnedIndex { layout, boundaries, bins, weights, row_count, equality_lookup }
    }

    pub fn new_equality(values: Vec<f64>, bins: Vec<Bitvector>, row_count: u32) -> Result<Self> {
        let weights = bins.iter().map(|b| b.count()).collect();
        Ok(BinnedIndex::new(BinLayout::Equality, values, BinSource::Direct(bins), weights, row_count))
    }

    pub fn new_range(boundaries: Vec<f64>, bins: Vec<Bitvector>, row_count: u32) -> Result<Self> {
        if boundaries.len() != bins.len() + 1 {
            return Err(kind_err(
                Kind::InvalidState,
                "range index needs exactly bins.len() + 1 boundaries",
            ));
        }
        let weights = bins.iter().map(|b| b.count()).collect();
        Ok(BinnedIndex::new(BinLayout::Range, boundaries, BinSource::Direct(bins), weights, row_count))
    }

    pub fn new_interval(boundaries: Vec<f64>, bins: Vec<Bitvector>, row_count: u32) -> Result<Self> {
        if boundaries.len() != bins.len() + 1 {
            return Err(kind_err(
                Kind::InvalidState,
                "interval index needs exactly bins.len() + 1 boundaries",
            ));
        }
        let weights = bins.iter().map(|b| b.count()).collect();
        Ok(BinnedIndex::new(BinLayout::Interval, boundaries, BinSource::Direct(bins), weights, row_count))
    }

    pub fn new_fanout(boundaries: Vec<f64>, planes: Vec<Bitvector>, row_count: u32) -> Result<Self> {
        let n_bins = 1usize << planes.len();
        if boundaries.len() != n_bins + 1 {
            return Err(kind_err(
                Kind::InvalidState,
                "fanout index needs exactly 2^planes + 1 boundaries",
            ));
        }
        let idx = BinnedIndex::new(BinLayout::Fanout, boundaries, BinSource::Planes(planes), Vec::new(), row_count);
        let weights = (0..idx.bins.bin_count())
            .map(|i| idx.bins.bin_bitmap(i).map(|b| b.count()))
            .collect::<Result<Vec<_>>>()?;
        Ok(BinnedIndex { weights, ..idx })
    }

    pub fn layout(&self) -> BinLayout {
        self.layout
    }

    pub fn bin_boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    pub fn bin_weights(&self) -> &[u32] {
        &self.weights
    }

    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    /// The raw bitmaps backing this index, for persistence: the direct
    /// per-bin bitmaps for `Equality`/`Range`/`Interval`, or the
    /// `log2(bins)` bit-planes for `Fanout`. Pairs with
    /// [`BinnedIndex::from_raw_parts`] to round-trip through a file
    /// without materialising every `Fanout` bin.
    pub fn raw_bitmaps(&self) -> &[Bitvector] {
        match &self.bins {
            BinSource::Direct(v) => v,
            BinSource::Planes(v) => v,
        }
    }

    /// Reconstruct an index from a layout tag, its boundaries, and the
    /// bitmaps `raw_bitmaps` returned for it.
    pub fn from_raw_parts(
        layout: BinLayout,
        boundaries: Vec<f64>,
        raw: Vec<Bitvector>,
        row_count: u32,
    ) -> Result<Self> {
        match layout {
            BinLayout::Equality => BinnedIndex::new_equality(boundaries, raw, row_count),
            BinLayout::Range => BinnedIndex::new_range(boundaries, raw, row_count),
            BinLayout::Interval => BinnedIndex::new_interval(boundaries, raw, row_count),
            BinLayout::Fanout => BinnedIndex::new_fanout(boundaries, raw, row_count),
        }
    }

    fn union_range(&self, lo: usize, hi: usize) -> Result<Bitvector> {
        let mut acc: Option<Bitvector> = None;
        for i in lo..hi {
            let bm = self.bins.bin_bitmap(i)?;
            acc = Some(match acc {
                None => bm,
                Some(prev) => prev.logical_or(&bm)?,
            });
        }
        Ok(acc.unwrap_or_else(|| Bitvector::zeros(self.row_count)))
    }

    /// `evaluate(op, constant) -> (lower, upper)` per `spec.md` §4.3's
    /// `Index` contract.
    pub fn evaluate(&self, op: CmpOp, constant: f64) -> Result<(Bitvector, Bitvector)> {
        tracing::debug!(layout = ?self.layout, ?op, constant, "index evaluate");
        match self.layout {
            BinLayout::Equality => self.evaluate_equality(op, constant),
            BinLayout::Range | BinLayout::Interval | BinLayout::Fanout => {
                self.evaluate_binned(op, constant)
            }
        }
    }

    fn evaluate_equality(&self, op: CmpOp, constant: f64) -> Result<(Bitvector, Bitvector)> {
        let key = rapidhash::rapidhash(&constant.to_le_bytes());
        let exact_bin = self.equality_lookup.as_ref().and_then(|m| m.get(&key)).copied();
        // `lt_count` = number of distinct values strictly less than `constant`;
        // values are sorted ascending, so a binary search gives this directly.
        let lt_count = self.boundaries.partition_point(|&v| v < constant);
        let n = self.bins.bin_count();
        let bm = match op {
            CmpOp::Eq => match exact_bin {
                Some(i) => self.union_range(i, i + 1)?,
                None => Bitvector::zeros(self.row_count),
            },
            CmpOp::Ne => match exact_bin {
                Some(i) => self.union_range(0, i)?.logical_or(&self.union_range(i + 1, n)?)?,
                None => self.union_range(0, n)?,
            },
            CmpOp::Lt => self.union_range(0, lt_count)?,
            CmpOp::Le => {
                let hi = lt_count + if exact_bin.is_some() { 1 } else { 0 };
                self.union_range(0, hi)?
            }
            CmpOp::Ge => self.union_range(lt_count, n)?,
            CmpOp::Gt => {
                let lo = lt_count + if exact_bin.is_some() { 1 } else { 0 };
                self.union_range(lo, n)?
            }
        };
        // Equality bins partition the domain exactly; every comparison is exact.
        Ok((bm.clone(), bm))
    }

    fn evaluate_binned(&self, op: CmpOp, constant: f64) -> Result<(Bitvector, Bitvector)> {
        let n = self.bins.bin_count();
        if n == 0 {
            let empty = Bitvector::zeros(self.row_count);
            return Ok((empty.clone(), empty));
        }
        // Index of the bin whose half-open range [boundaries[i], boundaries[i+1])
        // contains `constant`, clamped to the index's covered domain.
        let gt_count = self.boundaries.partition_point(|&b| b <= constant);
        let straddle = gt_count.saturating_sub(1).min(n - 1);
        let aligns = gt_count > 0 && (self.boundaries[gt_count - 1] - constant).abs() < f64::EPSILON;

        let (lower, upper) = match op {
            CmpOp::Lt => {
                if aligns {
                    (self.union_range(0, straddle)?, self.union_range(0, straddle)?)
                } else {
                    (self.union_range(0, straddle)?, self.union_range(0, straddle + 1)?)
                }
            }
            CmpOp::Ge => {
                if aligns {
                    (self.union_range(straddle, n)?, self.union_range(straddle, n)?)
                } else {
                    (self.union_range(straddle + 1, n)?, self.union_range(straddle, n)?)
                }
            }
            CmpOp::Le => (self.union_range(0, straddle)?, self.union_range(0, straddle + 1)?),
            CmpOp::Gt => (self.union_range(straddle + 1, n)?, self.union_range(straddle, n)?),
            CmpOp::Eq => (Bitvector::zeros(self.row_count), self.union_range(straddle, straddle + 1)?),
            CmpOp::Ne => {
                let candidate = self.union_range(straddle, straddle + 1)?;
                (candidate.logical_not(), Bitvector::ones(self.row_count))
            }
        };
        Ok((lower, upper))
    }
}
