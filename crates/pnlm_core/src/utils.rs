use std::cmp::Ordering;

use ndarray::ArrayView2;

use crate::float_trait::PnlmFloat;

/// Order-statistic comparison that tolerates NaN (treated as equal).
#[inline]
fn cmp_float<F: PnlmFloat>(a: &F, b: &F) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

/// Percentile `q` (in percent, 0..=100) of `data` with linear interpolation
/// between the two nearest order statistics (numpy's default definition).
///
/// The slice is reordered in place. Runs in O(n) via `select_nth_unstable_by`.
/// Returns zero for an empty slice.
pub fn percentile_of_slice<F: PnlmFloat>(data: &mut [F], q: f64) -> F {
    let len = data.len();
    if len == 0 {
        return F::zero();
    }
    let pos = (q.clamp(0.0, 100.0) / 100.0) * (len - 1) as f64;
    let lo = pos.floor() as usize;
    let frac = pos - lo as f64;

    let (_, &mut lo_val, upper) = data.select_nth_unstable_by(lo, cmp_float);
    if frac <= 0.0 || upper.is_empty() {
        return lo_val;
    }

    // Everything right of `lo` is >= lo_val, so the next order statistic is
    // the minimum of that partition.
    let hi_val = upper
        .iter()
        .copied()
        .fold(F::infinity(), |a, b| if b < a { b } else { a });
    lo_val + (hi_val - lo_val) * F::from_f64_c(frac)
}

/// Symmetric reflection of an index into `[0, len)`.
///
/// The edge sample is repeated: reflect(-1) = 0, reflect(-2) = 1,
/// reflect(len) = len-1. Valid for arbitrarily large excursions.
#[inline(always)]
pub fn reflect_index(idx: isize, len: usize) -> usize {
    debug_assert!(len > 0);
    let n = len as isize;
    let period = 2 * n;
    let m = idx.rem_euclid(period);
    if m < n {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

/// Mean of all samples in f64 accumulation. Zero for an empty view.
pub fn mean_of<F: PnlmFloat>(data: ArrayView2<F>) -> f64 {
    let n = data.len();
    if n == 0 {
        return 0.0;
    }
    data.iter().map(|v| v.to_f64_c()).sum::<f64>() / n as f64
}

/// Global (min, max) of a view. Returns (0, 0) for an empty view.
pub fn min_max_of<F: PnlmFloat>(data: ArrayView2<F>) -> (F, F) {
    if data.is_empty() {
        return (F::zero(), F::zero());
    }
    data.iter().copied().fold(
        (F::infinity(), F::neg_infinity()),
        |(lo, hi), v| (if v < lo { v } else { lo }, if v > hi { v } else { hi }),
    )
}

/// True when every sample is finite.
pub fn all_finite<F: PnlmFloat>(data: ArrayView2<F>) -> bool {
    data.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_percentile_matches_linear_interpolation() {
        // numpy.percentile([1, 2, 3, 4], 50) == 2.5
        let mut data = vec![4.0f64, 1.0, 3.0, 2.0];
        assert!((percentile_of_slice(&mut data, 50.0) - 2.5).abs() < 1e-12);

        // numpy.percentile(arange(11), 90) == 9.0
        let mut data: Vec<f64> = (0..11).rev().map(|v| v as f64).collect();
        assert!((percentile_of_slice(&mut data, 90.0) - 9.0).abs() < 1e-12);

        // numpy.percentile([0, 10], 25) == 2.5
        let mut data = vec![10.0f32, 0.0];
        assert!((percentile_of_slice(&mut data, 25.0) - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_percentile_extremes() {
        let mut data = vec![5.0f32, -1.0, 7.0, 3.0];
        assert_eq!(percentile_of_slice(&mut data, 0.0), -1.0);
        assert_eq!(percentile_of_slice(&mut data, 100.0), 7.0);
    }

    #[test]
    fn test_percentile_empty_and_single() {
        let mut empty: Vec<f32> = Vec::new();
        assert_eq!(percentile_of_slice(&mut empty, 50.0), 0.0);
        let mut single = vec![3.5f32];
        assert_eq!(percentile_of_slice(&mut single, 90.0), 3.5);
    }

    #[test]
    fn test_reflect_index_symmetric() {
        assert_eq!(reflect_index(-1, 5), 0);
        assert_eq!(reflect_index(-2, 5), 1);
        assert_eq!(reflect_index(5, 5), 4);
        assert_eq!(reflect_index(6, 5), 3);
        assert_eq!(reflect_index(2, 5), 2);
    }

    #[test]
    fn test_reflect_index_large_excursion() {
        // Period 2: 0 1 | 1 0 | 0 1 ...
        assert_eq!(reflect_index(-3, 2), 1);
        assert_eq!(reflect_index(7, 2), 0);
        assert_eq!(reflect_index(-5, 1), 0);
        for i in -50..50 {
            assert!(reflect_index(i, 3) < 3);
        }
    }

    #[test]
    fn test_mean_and_min_max() {
        let a = Array2::from_shape_vec((2, 2), vec![1.0f32, 2.0, 3.0, 6.0]).unwrap();
        assert!((mean_of(a.view()) - 3.0).abs() < 1e-12);
        assert_eq!(min_max_of(a.view()), (1.0, 6.0));
        assert!(all_finite(a.view()));

        let mut b = a.clone();
        b[[0, 1]] = f32::NAN;
        assert!(!all_finite(b.view()));
    }
}
