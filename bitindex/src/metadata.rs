//! The partition metadata descriptor: column names/types, row count, and
//! an optional mesh shape, per `spec.md` §6's on-disk layout obligations.

use bitindex_base::{kind_err, Kind, Result};
use bitindex_column::ColumnKind;

/// One column's entry in the descriptor. Order here is the column order
/// used when writing/reading the rest of the partition's files.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    pub kind: ColumnKind,
}

/// Enumerates a partition's columns, row count, and (if the partition's
/// rows are mesh points) the mesh's extents.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PartitionMetadata {
    pub row_count: u32,
    pub columns: Vec<ColumnMeta>,
    pub mesh_shape: Option<Vec<u32>>,
}

impl PartitionMetadata {
    pub fn new(row_count: u32) -> Self {
        PartitionMetadata { row_count, columns: Vec::new(), mesh_shape: None }
    }

    pub fn with_column(mut self, name: impl Into<String>, kind: ColumnKind) -> Self {
        self.columns.push(ColumnMeta { name: name.into(), kind });
        self
    }

    pub fn with_mesh_shape(mut self, dims: Vec<u32>) -> Self {
        self.mesh_shape = Some(dims);
        self
    }

    pub fn column(&self, name: &str) -> Result<&ColumnMeta> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| kind_err(Kind::UnknownColumn, format!("unknown column {name}")))
    }
}
