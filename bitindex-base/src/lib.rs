mod cancel;
mod config;
mod error;

pub use cancel::{CancellationToken, Deadline, RunControl};
pub use config::EvalConfig;
pub use error::{err, kind_err, Error, Kind, Result};

/// A row position within a partition. Partitions hold at most
/// `u32::MAX` rows (the bitvector's addressable range).
pub type RowId = u32;
