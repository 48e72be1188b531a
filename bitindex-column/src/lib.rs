mod column;
mod kind;
mod storage;

pub use column::{raw_values, select_values, Column, ColumnElement};
pub use kind::{ColumnKind, ColumnValue};
pub use storage::{float_min_max, integer_min_max, ColumnStorage, MinMax};

#[cfg(test)]
mod test;
