//! In-memory partition: a row count, a column store, and zero or more
//! per-column indices, wired up behind `bitindex_eval::PartitionSource`.

use std::collections::HashMap;

use bitindex_base::{kind_err, Kind, Result};
use bitindex_bitvec::Bitvector;
use bitindex_column::Column;
use bitindex_eval::PartitionSource;
use bitindex_index::BinnedIndex;
use bitindex_mesh::MeshShape;

use crate::metadata::PartitionMetadata;

/// A data partition: one process's in-memory view of a contiguous row
/// range, column-wise. Immutable from the evaluator's point of view
/// (the registry clones the old partition's read-only parts before a
/// rebuild mutates anything, per `spec.md` §5).
pub struct Partition {
    row_count: u32,
    columns: HashMap<String, Column>,
    indices: HashMap<String, BinnedIndex>,
    mesh_shape: Option<MeshShape>,
}

impl Partition {
    pub fn new(row_count: u32) -> Self {
        Partition { row_count, columns: HashMap::new(), indices: HashMap::new(), mesh_shape: None }
    }

    pub fn with_mesh_shape(mut self, shape: MeshShape) -> Result<Self> {
        shape.check_size(self.row_count)?;
        self.mesh_shape = Some(shape);
        Ok(self)
    }

    pub fn add_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if column.row_count() != self.row_count {
            return Err(kind_err(
                Kind::SizeMismatch,
                format!(
                    "column {name} has {} rows but partition has {}",
                    column.row_count(),
                    self.row_count
                ),
            ));
        }
        self.columns.insert(name, column);
        Ok(())
    }

    /// Attach an index for `column`. Does not validate the index's
    /// bitmaps against the column's values — building an index that
    /// actually partitions a column's value domain is the index-builder's
    /// job, not the registry's.
    pub fn add_index(&mut self, column: impl Into<String>, index: BinnedIndex) {
        self.indices.insert(column.into(), index);
    }

    pub fn mesh_shape(&self) -> Option<&MeshShape> {
        self.mesh_shape.as_ref()
    }

    /// Column names in the same sorted order `metadata()` lists them in.
    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.columns.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn metadata(&self) -> PartitionMetadata {
        let mut columns: Vec<_> = self.columns.iter().map(|(name, col)| (name.clone(), col.kind())).collect();
        columns.sort_by(|a, b| a.0.cmp(&b.0));
        let mut meta = PartitionMetadata::new(self.row_count);
        for (name, kind) in columns {
            meta = meta.with_column(name, kind);
        }
        if let Some(shape) = &self.mesh_shape {
            meta = meta.with_mesh_shape(shape.dims().to_vec());
        }
        meta
    }
}

impl PartitionSource for Partition {
    fn row_count(&self) -> u32 {
        self.row_count
    }

    fn column(&self, name: &str) -> Result<&Column> {
        self.columns.get(name).ok_or_else(|| kind_err(Kind::UnknownColumn, format!("unknown column {name}")))
    }

    fn index(&self, name: &str) -> Option<&BinnedIndex> {
        self.indices.get(name)
    }
}

impl Partition {
    /// The rows with a value in every column named, as a fresh bitmap.
    /// Exposed directly (not only via `PartitionSource::null_mask_for`)
    /// since the histogram API needs it without going through the
    /// evaluator.
    pub fn defined_mask(&self, columns: &[String]) -> Result<Bitvector> {
        self.null_mask_for(columns)
    }
}
