/// Tunables threaded explicitly through the evaluator and column reader.
///
/// Kept as an explicit value rather than global state: the only
/// process-wide mutable structure in the core is the partition registry
/// (see the `bitindex` facade crate).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalConfig {
    /// Mask density (set bits / total bits) above which the column reader
    /// reads the whole column and filters rather than doing positional I/O
    /// per contiguous run.
    pub scan_density_threshold: f64,
    /// Multiplier applied to the requested histogram bin count to build
    /// the fine equal-width grid before coalescing with `divide_counts`.
    pub adaptive_fine_bin_multiplier: u32,
    /// Number of IndexSet steps (or AND/OR/XOR children) between
    /// cancellation/deadline checks.
    pub cancellation_check_granularity: u32,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            scan_density_threshold: 0.25,
            adaptive_fine_bin_multiplier: 8,
            cancellation_check_granularity: 1,
        }
    }
}
