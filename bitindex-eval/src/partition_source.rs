//! The interface the evaluator needs from a partition. Kept as a trait
//! here (rather than depending on the `bitindex` facade crate's concrete
//! `Partition`) so dependency order stays leaf-first: the facade crate
//! depends on `bitindex-eval`, not the reverse.

use bitindex_base::Result;
use bitindex_bitvec::Bitvector;
use bitindex_column::Column;
use bitindex_index::BinnedIndex;

pub trait PartitionSource {
    fn row_count(&self) -> u32;

    /// Look up a column by name. *unknown-column* if absent.
    fn column(&self, name: &str) -> Result<&Column>;

    /// Look up a column's index, if one has been built for it. A column
    /// may have no index, in which case the evaluator falls back to a
    /// scan for predicates that reference it.
    fn index(&self, name: &str) -> Option<&BinnedIndex>;

    /// The rows with a defined value in every column a predicate touches
    /// is the initial candidate mask; `null_free_mask` answers "defined
    /// everywhere a given set of columns is read", which the evaluator
    /// computes by ANDing together the referenced columns' null masks.
    fn null_mask_for(&self, columns: &[String]) -> Result<Bitvector> {
        let mut mask = Bitvector::ones(self.row_count());
        for name in columns {
            let col = self.column(name)?;
            mask = mask.logical_and(col.null_mask())?;
        }
        Ok(mask)
    }
}
