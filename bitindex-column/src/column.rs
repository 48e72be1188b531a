//! Typed, positionally-indexed access to one column's values, gated by a
//! bitvector mask.

use std::sync::Mutex;

use bitindex_base::{kind_err, EvalConfig, Kind, Result};
use bitindex_bitvec::{Bitvector, Step};

use crate::kind::{ColumnKind, ColumnValue};
use crate::storage::{ColumnStorage, MinMax};

/// One column of a partition: its values, a null mask (bit set where the
/// row has a defined value), and a lazily-computed min/max cache.
pub struct Column {
    storage: ColumnStorage,
    null_mask: Bitvector,
    min_max: Mutex<Option<Option<MinMax>>>,
}

impl Column {
    /// Construct a column from fully-populated storage (no nulls). Use
    /// `with_null_mask` for columns that have gaps.
    pub fn new(storage: ColumnStorage) -> Self {
        let n = storage.row_count();
        Column {
            null_mask: Bitvector::ones(n),
            storage,
            min_max: Mutex::new(None),
        }
    }

    pub fn with_null_mask(storage: ColumnStorage, null_mask: Bitvector) -> Result<Self> {
        if null_mask.size() != storage.row_count() {
            return Err(kind_err(
                Kind::SizeMismatch,
                format!(
                    "null mask has {} bits but column has {} rows",
                    null_mask.size(),
                    storage.row_count()
                ),
            ));
        }
        Ok(Column {
            storage,
            null_mask,
            min_max: Mutex::new(None),
        })
    }

    pub fn kind(&self) -> ColumnKind {
        self.storage.kind()
    }

    pub fn row_count(&self) -> u32 {
        self.storage.row_count()
    }

    pub fn null_mask(&self) -> &Bitvector {
        &self.null_mask
    }

    pub fn storage(&self) -> &ColumnStorage {
        &self.storage
    }

    /// Dynamically-typed value at `pos`, or `None` if the row is null.
    pub fn value_at(&self, pos: u32) -> Option<ColumnValue> {
        if !self.null_mask.get_bit(pos) {
            return None;
        }
        Some(self.storage.value_at(pos))
    }

    /// Cached observed minimum/maximum for numeric columns, computed on
    /// first call under a lock; `None` for non-numeric columns or an
    /// empty column.
    pub fn actual_min(&self) -> Option<f64> {
        self.min_max().map(|mm| mm.min)
    }
    pub fn actual_max(&self) -> Option<f64> {
        self.min_max().map(|mm| mm.max)
    }

    fn min_max(&self) -> Option<MinMax> {
        let mut cache = self.min_max.lock().expect("min/max cache lock poisoned");
        if cache.is_none() {
            *cache = Some(self.storage.compute_min_max());
        }
        cache.clone().flatten()
    }
}

/// Select only the values at positions set in `mask`, in ascending
/// position order. `|result| == mask.count()`.
///
/// The access mode (read-the-whole-column-and-filter vs. positional I/O
/// per contiguous run) is chosen from `mask`'s density against
/// `cfg.scan_density_threshold`; both modes are required to return
/// identical data; this only affects which loop shape runs, not the
/// result.
pub fn select_values<T: ColumnElement>(
    col: &Column,
    mask: &Bitvector,
    cfg: &EvalConfig,
) -> Result<Vec<T>> {
    if mask.size() != col.row_count() {
        return Err(kind_err(
            Kind::SizeMismatch,
            format!(
                "mask has {} bits but column has {} rows",
                mask.size(),
                col.row_count()
            ),
        ));
    }
    let raw = T::raw_slice(&col.storage)?;
    let density = if mask.size() == 0 {
        0.0
    } else {
        mask.count() as f64 / mask.size() as f64
    };
    let out = if density > cfg.scan_density_threshold {
        tracing::debug!(density, threshold = cfg.scan_density_threshold, "select_values: dense scan path");
        (0..mask.size())
            .filter(|&pos| mask.get_bit(pos))
            .map(|pos| raw[pos as usize].clone())
            .collect()
    } else {
        tracing::debug!(density, threshold = cfg.scan_density_threshold, "select_values: positional run path");
        let mut out = Vec::with_capacity(mask.count() as usize);
        for step in mask.first_index_set() {
            match step {
                Step::Range(a, b) => out.extend(raw[a as usize..b as usize].iter().cloned()),
                Step::Scatter(positions) => {
                    out.extend(positions.into_iter().map(|p| raw[p as usize].clone()))
                }
            }
        }
        out
    };
    Ok(out)
}

/// Return all values of the column in position order.
pub fn raw_values<T: ColumnElement>(col: &Column) -> Result<Vec<T>> {
    Ok(T::raw_slice(&col.storage)?.to_vec())
}

/// Element types that `select_values`/`raw_values` can be instantiated
/// over. One arm per `ColumnKind`, generated by the macro below: the
/// tagged-variant-plus-generic-inner-routine dispatch pattern applied to
/// the type-access boundary.
pub trait ColumnElement: Clone {
    fn raw_slice(storage: &ColumnStorage) -> Result<&[Self]>;
}

macro_rules! impl_column_element {
    ($t:ty, $variant:ident) => {
        impl ColumnElement for $t {
            fn raw_slice(storage: &ColumnStorage) -> Result<&[Self]> {
                match storage {
                    ColumnStorage::$variant(v) => Ok(v),
                    other => Err(kind_err(
                        Kind::TypeMismatch,
                        format!(
                            "expected {} column, found {}",
                            stringify!($t),
                            other.kind()
                        ),
                    )),
                }
            }
        }
    };
}

impl_column_element!(i8, I8);
impl_column_element!(i16, I16);
impl_column_element!(i32, I32);
impl_column_element!(i64, I64);
impl_column_element!(u8, U8);
impl_column_element!(u16, U16);
impl_column_element!(u32, U32);
impl_column_element!(u64, U64);
impl_column_element!(f32, F32);
impl_column_element!(f64, F64);
impl_column_element!(String, Text);

impl Column {
    /// Category columns are dictionary/fixed-width on disk but exposed
    /// as owned strings; kept off the generic `ColumnElement` path since
    /// they are not a contiguous `&[String]` in storage.
    pub fn select_category(&self, mask: &Bitvector) -> Result<Vec<String>> {
        let ColumnStorage::Category { width, data } = &self.storage else {
            return Err(kind_err(
                Kind::TypeMismatch,
                format!("expected category column, found {}", self.storage.kind()),
            ));
        };
        if mask.size() != self.row_count() {
            return Err(kind_err(Kind::SizeMismatch, "mask size does not match column row count"));
        }
        let width = *width as usize;
        let mut out = Vec::with_capacity(mask.count() as usize);
        for step in mask.first_index_set() {
            let positions: Vec<u32> = match step {
                Step::Range(a, b) => (a..b).collect(),
                Step::Scatter(v) => v,
            };
            for pos in positions {
                let bytes = &data[pos as usize * width..(pos as usize + 1) * width];
                let end = memchr::memchr(0, bytes).unwrap_or(width);
                out.push(String::from_utf8_lossy(&bytes[..end]).into_owned());
            }
        }
        Ok(out)
    }
}
