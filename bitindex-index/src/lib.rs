mod binned;
mod divide;
mod predicate;

pub use binned::{BinLayout, BinnedIndex};
pub use divide::divide_counts;
pub use predicate::CmpOp;
