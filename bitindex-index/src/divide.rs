//! `divide_counts`: choose a coarser partition of a fine bin grid whose
//! weight sums are as equal as possible. Shared by index rebinning and by
//! the adaptive histogram routine in the facade crate. O(n) after an
//! initial prefix-sum pass.

/// Given `weights[0..n]` (row counts of `n` fine bins) and a
/// `target_bins` count, return the boundary indices of a coarser
/// partition: `result[0] = 0`, `result.last() = n`, and each
/// `result[i]..result[i+1]` run's summed weight is as close as possible
/// to `total / target_bins`. `result.len() == target_bins + 1`, except
/// when `n < target_bins`, in which case every fine bin becomes its own
/// output bin and `result.len() == n + 1` (fewer output bins than
/// requested — the "adaptive count may differ from request" case).
pub fn divide_counts(target_bins: usize, weights: &[u32]) -> Vec<usize> {
    let n = weights.len();
    if n == 0 || target_bins == 0 {
        return vec![0];
    }
    if n <= target_bins {
        return (0..=n).collect();
    }
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0u64);
    for &w in weights {
        prefix.push(prefix.last().unwrap() + w as u64);
    }
    let total = *prefix.last().unwrap();
    let mut boundaries = Vec::with_capacity(target_bins + 1);
    boundaries.push(0usize);
    let mut next_fine = 0usize;
    for k in 1..target_bins {
        let target = total * k as u64 / target_bins as u64;
        // Advance until the prefix sum reaches (or first exceeds) the
        // target for this cut point, never going backwards and never
        // past the last fine bin.
        while next_fine < n && prefix[next_fine + 1] <= target {
            next_fine += 1;
        }
        let cut = next_fine.max(*boundaries.last().unwrap() + 1).min(n);
        boundaries.push(cut);
    }
    boundaries.push(n);
    boundaries.dedup();
    boundaries
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::divide_counts;

    #[test]
    fn equal_weights_split_evenly() {
        let weights = vec![10u32; 8];
        let boundaries = divide_counts(4, &weights);
        assert_eq!(boundaries, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn fewer_fine_bins_than_target_keeps_all() {
        let weights = vec![5u32, 7, 3];
        let boundaries = divide_counts(10, &weights);
        assert_eq!(boundaries, vec![0, 1, 2, 3]);
    }

    #[test]
    fn skewed_weights_still_cover_the_full_range() {
        let weights = vec![1u32, 1, 1, 1, 100, 1, 1, 1, 1];
        let boundaries = divide_counts(3, &weights);
        assert_eq!(*boundaries.first().unwrap(), 0);
        assert_eq!(*boundaries.last().unwrap(), weights.len());
        assert!(boundaries.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn empty_weights_yields_single_boundary() {
        assert_eq!(divide_counts(5, &[]), vec![0]);
    }
}
