//! Facade crate: ties the column store, indices, predicate evaluator,
//! and mesh geometry together into a `Partition`/`PartitionRegistry` a
//! caller can load data into, index, query, and take histograms of.
//! Per `spec.md` §6's on-disk layout, and §5's "one process-wide
//! mutable structure" concurrency model.

mod histogram;
mod metadata;
mod partition;
mod persist;
mod registry;

pub use histogram::{histogram1d, histogram2d, histogram3d, BinSpec, Histogram1D, HistogramNd};
pub use metadata::{ColumnMeta, PartitionMetadata};
pub use partition::Partition;
pub use persist::{read_partition, write_partition};
pub use registry::PartitionRegistry;

#[cfg(test)]
mod test;
