//! Histogram API: counts-only or counts-plus-bitvectors, in one, two, or
//! three dimensions, with caller-supplied or adaptive bin boundaries, per
//! `spec.md` §6 and the 3-D aliasing fix in §9 (each dimension gets its
//! own freshly allocated value array below — never a reused buffer).

use bitindex_base::{kind_err, EvalConfig, Kind, Result};
use bitindex_bitvec::{Bitvector, Step};
use bitindex_column::Column;
use bitindex_eval::PartitionSource;
use bitindex_index::divide_counts;

use crate::partition::Partition;

/// Bin boundaries: supplied verbatim by the caller (must be strictly
/// ascending) or chosen adaptively from the observed data.
#[derive(Debug, Clone)]
pub enum BinSpec {
    Explicit(Vec<f64>),
    Adaptive { bins: usize },
}

#[derive(Debug, Clone)]
pub struct Histogram1D {
    pub boundaries: Vec<f64>,
    pub counts: Vec<u32>,
    pub bitmaps: Option<Vec<Bitvector>>,
}

/// A 2-D or 3-D histogram: one boundary array per dimension, and a
/// row-major-flattened count array (dimension 0 slowest-varying, as in
/// the mesh layer's coordinate convention).
#[derive(Debug, Clone)]
pub struct HistogramNd {
    pub boundaries: Vec<Vec<f64>>,
    pub counts: Vec<u32>,
    pub bitmaps: Option<Vec<Bitvector>>,
}

pub fn histogram1d(
    partition: &Partition,
    column: &str,
    bins: BinSpec,
    with_bitmaps: bool,
    cfg: &EvalConfig,
) -> Result<Histogram1D> {
    let nd = histogram_nd(partition, &[(column, bins)], with_bitmaps, cfg)?;
    Ok(Histogram1D { boundaries: nd.boundaries.into_iter().next().unwrap_or_default(), counts: nd.counts, bitmaps: nd.bitmaps })
}

pub fn histogram2d(
    partition: &Partition,
    col_a: &str,
    bins_a: BinSpec,
    col_b: &str,
    bins_b: BinSpec,
    with_bitmaps: bool,
    cfg: &EvalConfig,
) -> Result<HistogramNd> {
    histogram_nd(partition, &[(col_a, bins_a), (col_b, bins_b)], with_bitmaps, cfg)
}

pub fn histogram3d(
    partition: &Partition,
    col_a: &str,
    bins_a: BinSpec,
    col_b: &str,
    bins_b: BinSpec,
    col_c: &str,
    bins_c: BinSpec,
    with_bitmaps: bool,
    cfg: &EvalConfig,
) -> Result<HistogramNd> {
    histogram_nd(partition, &[(col_a, bins_a), (col_b, bins_b), (col_c, bins_c)], with_bitmaps, cfg)
}

fn histogram_nd(
    partition: &Partition,
    specs: &[(&str, BinSpec)],
    with_bitmaps: bool,
    cfg: &EvalConfig,
) -> Result<HistogramNd> {
    let columns: Vec<String> = specs.iter().map(|(name, _)| name.to_string()).collect();
    let mask = partition.defined_mask(&columns)?;
    let positions = mask_positions(&mask);

    // One independently-allocated value array per dimension: the bug
    // this guards against is reusing a single scratch buffer across
    // dimensions, which silently makes every dimension but the last see
    // stale values from the previous column.
    let mut per_dim_values: Vec<Vec<f64>> = Vec::with_capacity(specs.len());
    let mut boundaries: Vec<Vec<f64>> = Vec::with_capacity(specs.len());
    for (name, spec) in specs {
        let col = partition.column(name)?;
        let values = column_values_at(col, &positions)?;
        let b = match spec {
            BinSpec::Explicit(b) => {
                validate_ascending(b)?;
                b.clone()
            }
            BinSpec::Adaptive { bins } => adaptive_boundaries(&values, *bins, cfg.adaptive_fine_bin_multiplier),
        };
        boundaries.push(b);
        per_dim_values.push(values);
    }

    let bin_counts: Vec<usize> = boundaries.iter().map(|b| b.len().saturating_sub(1)).collect();
    let total_bins: usize = bin_counts.iter().product();
    let mut counts = vec![0u32; total_bins];
    let mut assigned: Vec<Vec<u32>> = if with_bitmaps { vec![Vec::new(); total_bins] } else { Vec::new() };

    'rows: for (row, &pos) in positions.iter().enumerate() {
        let mut flat = 0usize;
        for (d, b) in boundaries.iter().enumerate() {
            let Some(bin) = bin_index(b, per_dim_values[d][row]) else {
                continue 'rows;
            };
            flat = flat * bin_counts[d] + bin;
        }
        counts[flat] += 1;
        if with_bitmaps {
            assigned[flat].push(pos);
        }
    }

    let bitmaps = if with_bitmaps {
        let row_count = partition.row_count();
        Some(
            assigned
                .into_iter()
                .map(|ps| positions_to_bitvector(&ps, row_count))
                .collect::<Result<Vec<_>>>()?,
        )
    } else {
        None
    };

    Ok(HistogramNd { boundaries, counts, bitmaps })
}

fn validate_ascending(boundaries: &[f64]) -> Result<()> {
    if boundaries.len() < 2 {
        return Err(kind_err(Kind::InvalidState, "histogram needs at least 2 boundaries"));
    }
    if boundaries.windows(2).any(|w| !(w[0] < w[1])) {
        return Err(kind_err(Kind::InvalidState, "histogram boundaries must be strictly ascending"));
    }
    Ok(())
}

/// Build `~requested_bins * fine_multiplier` equal-width bins over the
/// observed range of `values`, then coalesce them with `divide_counts` so
/// every output bin has close to the same row count. The output bin
/// count may differ from `requested_bins` by a small amount — per
/// `spec.md` §9, `divide_counts` only guarantees `result.len() ==
/// target_bins + 1` when there are at least that many fine bins to draw
/// from.
fn adaptive_boundaries(values: &[f64], requested_bins: usize, fine_multiplier: u32) -> Vec<f64> {
    if requested_bins == 0 || values.is_empty() {
        return vec![0.0, 0.0];
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if min >= max {
        return vec![min, min + 1.0];
    }
    let fine_bins = ((requested_bins as u64) * (fine_multiplier as u64)).max(1) as usize;
    let width = (max - min) / fine_bins as f64;
    let mut weights = vec![0u32; fine_bins];
    for &v in values {
        let idx = (((v - min) / width) as usize).min(fine_bins - 1);
        weights[idx] += 1;
    }
    let fine_boundary_idx = divide_counts(requested_bins, &weights);
    if fine_boundary_idx.len() < 2 {
        tracing::warn!(requested_bins, "adaptive histogram produced fewer than 2 boundaries; falling back to full range");
        return vec![min, max];
    }
    let mut result: Vec<f64> = fine_boundary_idx.iter().map(|&i| min + i as f64 * width).collect();
    *result.last_mut().unwrap() = max;
    if result.len() - 1 != requested_bins {
        tracing::warn!(requested_bins, actual = result.len() - 1, "adaptive bin count differs from request");
    }
    result
}

fn bin_index(boundaries: &[f64], v: f64) -> Option<usize> {
    let n_bins = boundaries.len().checked_sub(1)?;
    let last = *boundaries.last()?;
    if v < boundaries[0] || v > last {
        return None;
    }
    if v == last {
        return Some(n_bins - 1);
    }
    match boundaries.binary_search_by(|probe| probe.partial_cmp(&v).expect("boundaries contain no NaN")) {
        Ok(i) => Some(i.min(n_bins - 1)),
        Err(i) => Some(i - 1),
    }
}

fn mask_positions(mask: &Bitvector) -> Vec<u32> {
    let mut positions = Vec::with_capacity(mask.count() as usize);
    for step in mask.first_index_set() {
        match step {
            Step::Range(a, b) => positions.extend(a..b),
            Step::Scatter(ps) => positions.extend(ps),
        }
    }
    positions
}

/// Pulls `col`'s value at each of `positions`, in order, into a freshly
/// allocated `Vec` — the per-dimension array the aliasing fix requires.
fn column_values_at(col: &Column, positions: &[u32]) -> Result<Vec<f64>> {
    positions
        .iter()
        .map(|&pos| {
            col.value_at(pos)
                .and_then(|v| v.as_f64())
                .ok_or_else(|| kind_err(Kind::TypeMismatch, "histogram requires a numeric column"))
        })
        .collect()
}

fn positions_to_bitvector(positions: &[u32], row_count: u32) -> Result<Bitvector> {
    let mut bv = Bitvector::zeros(row_count);
    for &pos in positions {
        bv.set_bit(pos, true)?;
    }
    Ok(bv)
}
