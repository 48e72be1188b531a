mod evaluator;
mod expr;
mod partition_source;
mod predicate;
mod query;

pub use evaluator::{Bracket, CandidateMask, Evaluator};
pub use expr::{BinOp, BinaryFn, Expr, UnaryFn};
pub use partition_source::PartitionSource;
pub use predicate::{flip, Predicate, ScalarValue};
pub use query::{Query, QueryState};

#[cfg(test)]
mod test;
