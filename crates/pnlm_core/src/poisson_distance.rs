//! Memoized L2 distance between two Poisson distributions.
//!
//! `d(lx, ly) = sum_r (pmf(r; lx) - pmf(r; ly))^2` over
//! `r = 0..=ceil(m + 6 sqrt(m))` with `m = max(lx, ly)`.
//!
//! Inputs are quantized to a fixed step before lookup, so the table stays
//! small (bounded by the lambda range over the step). The table is
//! insert-only and safe to share between concurrent pipeline runs.

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Default lambda quantization step.
pub const DEFAULT_QUANT_STEP: f64 = 0.02;

/// Number of standard deviations of support above the larger mean.
const SUPPORT_SIGMAS: f64 = 6.0;

/// Key of a canonical `(min, max)` pair of quantized lambdas.
pub type DistanceKey = (u64, u64);

/// Round `lambda` to the nearest multiple of `step`, halves to even.
#[inline]
pub fn quantize(lambda: f64, step: f64) -> f64 {
    // `+ 0.0` folds -0.0 into +0.0 so both map to one key.
    (lambda / step).round_ties_even() * step + 0.0
}

/// Canonical key for two already-quantized lambdas.
#[inline]
pub fn canonical_key(qa: f64, qb: f64) -> DistanceKey {
    let (lo, hi) = if qa <= qb { (qa, qb) } else { (qb, qa) };
    (lo.to_bits(), hi.to_bits())
}

/// Thread-safe memo table of Poisson L2 distances.
#[derive(Debug, Default)]
pub struct PoissonDistanceTable {
    entries: RwLock<FxHashMap<DistanceKey, f64>>,
}

static SHARED_TABLE: OnceLock<Arc<PoissonDistanceTable>> = OnceLock::new();

impl PoissonDistanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide default table, created on first use.
    pub fn shared() -> Arc<PoissonDistanceTable> {
        SHARED_TABLE
            .get_or_init(|| Arc::new(PoissonDistanceTable::new()))
            .clone()
    }

    /// Distance with the default quantization step.
    pub fn distance(&self, lx: f64, ly: f64) -> f64 {
        self.distance_with_step(lx, ly, DEFAULT_QUANT_STEP)
    }

    /// Distance after quantizing both inputs to `step`.
    pub fn distance_with_step(&self, lx: f64, ly: f64, step: f64) -> f64 {
        self.distance_quantized(quantize(lx, step), quantize(ly, step))
    }

    /// Distance between two lambdas that are already quantized.
    pub fn distance_quantized(&self, qa: f64, qb: f64) -> f64 {
        let key = canonical_key(qa, qb);
        if let Some(&d) = self.entries.read().get(&key) {
            return d;
        }

        let (lo, hi) = (f64::from_bits(key.0), f64::from_bits(key.1));
        let d = poisson_l2_distance(lo, hi);
        *self.entries.write().entry(key).or_insert(d)
    }

    /// Number of memoized pairs.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// `ln(r!)` for `r = 0..=max_r`.
fn ln_factorials(max_r: usize) -> Vec<f64> {
    let mut table = Vec::with_capacity(max_r + 1);
    let mut acc = 0.0f64;
    table.push(0.0);
    for r in 1..=max_r {
        acc += (r as f64).ln();
        table.push(acc);
    }
    table
}

/// Poisson probability of `r` events, evaluated in log space.
#[inline]
fn poisson_pmf(r: usize, lambda: f64, ln_fact: &[f64]) -> f64 {
    if lambda <= 0.0 {
        return if r == 0 { 1.0 } else { 0.0 };
    }
    (r as f64 * lambda.ln() - lambda - ln_fact[r]).exp()
}

/// Unmemoized distance. Non-positive lambdas are the point mass at zero.
pub fn poisson_l2_distance(lx: f64, ly: f64) -> f64 {
    let lmax = lx.max(ly);
    if lmax.is_nan() || lmax <= 0.0 || lx == ly {
        return 0.0;
    }

    let max_r = (lmax + SUPPORT_SIGMAS * lmax.sqrt()).ceil() as usize;
    let ln_fact = ln_factorials(max_r);

    (0..=max_r)
        .map(|r| {
            let diff = poisson_pmf(r, lx, &ln_fact) - poisson_pmf(r, ly, &ln_fact);
            diff * diff
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// Direct recurrence `p(r) = p(r-1) * lambda / r`, fine for small lambda.
    fn pmf_recurrence(lambda: f64, max_r: usize) -> Vec<f64> {
        let mut out = Vec::with_capacity(max_r + 1);
        let mut p = (-lambda).exp();
        out.push(p);
        for r in 1..=max_r {
            p *= lambda / r as f64;
            out.push(p);
        }
        out
    }

    #[test]
    fn test_quantize() {
        assert!((quantize(1.013, 0.02) - 1.02).abs() < 1e-12);
        assert!((quantize(1.009, 0.02) - 1.0).abs() < 1e-12);
        assert_eq!(quantize(-0.001, 0.02).to_bits(), 0.0f64.to_bits());
    }

    #[test]
    fn test_quantize_half_step_rounds_to_even() {
        // 1.25 / 0.5 = 2.5 and 0.75 / 0.5 = 1.5 are exact halves.
        assert_eq!(quantize(1.25, 0.5), 1.0);
        assert_eq!(quantize(0.75, 0.5), 1.0);
        assert_eq!(quantize(1.75, 0.5), 2.0);
        assert_eq!(quantize(0.25, 0.5).to_bits(), 0.0f64.to_bits());
    }

    #[test]
    fn test_identity_is_zero() {
        let table = PoissonDistanceTable::new();
        for &l in &[0.0, 0.02, 0.5, 3.0, 18.0, 250.0] {
            assert_eq!(table.distance(l, l), 0.0);
        }
    }

    #[test]
    fn test_both_non_positive_is_zero() {
        assert_eq!(poisson_l2_distance(0.0, 0.0), 0.0);
        assert_eq!(poisson_l2_distance(-1.0, -0.5), 0.0);
    }

    #[test]
    fn test_symmetry_shares_entry() {
        let table = PoissonDistanceTable::new();
        let pairs = [(0.0, 1.0), (2.5, 7.1), (30.0, 29.96), (0.3, 120.0)];
        for &(a, b) in &pairs {
            assert_eq!(table.distance(a, b), table.distance(b, a));
        }
        assert_eq!(table.len(), pairs.len());
    }

    #[test]
    fn test_matches_direct_computation() {
        let (lx, ly) = (3.0, 5.0);
        let max_r = (5.0f64 + 6.0 * 5.0f64.sqrt()).ceil() as usize;
        let px = pmf_recurrence(lx, max_r);
        let py = pmf_recurrence(ly, max_r);
        let expected: f64 = px.iter().zip(&py).map(|(a, b)| (a - b) * (a - b)).sum();

        let got = poisson_l2_distance(lx, ly);
        assert!((got - expected).abs() < 1e-12, "{} vs {}", got, expected);
    }

    #[test]
    fn test_zero_lambda_is_point_mass() {
        // d(0, 1) = (1 - e^-1)^2 + sum_{r>=1} (e^-1 / r!)^2 over r <= 7
        let py = pmf_recurrence(1.0, 7);
        let expected = (1.0 - py[0]).powi(2) + py[1..].iter().map(|p| p * p).sum::<f64>();
        assert!((poisson_l2_distance(0.0, 1.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_large_lambda_is_finite() {
        let d = poisson_l2_distance(1000.0, 1000.5);
        assert!(d.is_finite());
        assert!(d > 0.0);
        // Distant means over large support: close to the sum of squared masses.
        let far = poisson_l2_distance(800.0, 1200.0);
        assert!(far.is_finite() && far > d);
    }

    #[test]
    fn test_distance_grows_with_separation() {
        let table = PoissonDistanceTable::new();
        let near = table.distance(10.0, 10.5);
        let mid = table.distance(10.0, 12.0);
        let far = table.distance(10.0, 20.0);
        assert!(near < mid && mid < far);
    }

    #[test]
    fn test_quantization_collapses_nearby_inputs() {
        let table = PoissonDistanceTable::new();
        let a = table.distance(4.001, 6.004);
        let b = table.distance(3.999, 5.996);
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_concurrent_access() {
        let table = Arc::new(PoissonDistanceTable::new());
        let reference = PoissonDistanceTable::new();

        thread::scope(|scope| {
            for t in 0..8 {
                let table = Arc::clone(&table);
                scope.spawn(move || {
                    for i in 0..200 {
                        let a = ((i + t * 13) % 97) as f64 * 0.1;
                        let b = ((i * 7 + t) % 89) as f64 * 0.1;
                        let d = table.distance(a, b);
                        assert!(d.is_finite() && d >= 0.0);
                    }
                });
            }
        });

        for i in 0..200 {
            let a = ((i + 13) % 97) as f64 * 0.1;
            let b = ((i * 7 + 1) % 89) as f64 * 0.1;
            assert_eq!(table.distance(a, b), reference.distance(a, b));
        }
    }

    #[test]
    fn test_shared_is_singleton() {
        let a = PoissonDistanceTable::shared();
        let b = PoissonDistanceTable::shared();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
