//! Exact Poisson non-local means on a gradient field.
//!
//! Every interior pixel is replaced by a weighted average of the candidates in
//! its search window. The weight of a candidate comes from the patch-summed
//! Poisson distance between the two lambda patches. Pixels closer than
//! `patch_radius` to an edge are copied through unchanged.
//!
//! Cost is `O(H * W * S^2 * P^2)` distance lookups (`S` the search side, `P`
//! the patch side). This engine is the reference the fast engine is checked
//! against.

use std::sync::Arc;

use ndarray::{s, Array2, ArrayView2, ArrayViewMut1, Axis};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::differential::GradientField;
use crate::filtering::box_filter;
use crate::float_trait::PnlmFloat;
use crate::poisson_distance::{canonical_key, quantize, DistanceKey, PoissonDistanceTable};

/// Default search window radius.
pub const DEFAULT_SEARCH_RADIUS: usize = 5;

/// Default patch radius.
pub const DEFAULT_PATCH_RADIUS: usize = 1;

/// Default weight bandwidth multiplier.
pub const DEFAULT_RHO: f64 = 1.5;

/// Default field-wide mean of the synthetic count map.
pub const DEFAULT_COUNT_TARGET_MEAN: f64 = 30.0;

/// Box size used to smooth counts into the lambda map.
const LAMBDA_KERNEL_SIZE: usize = 3;

/// Lambda floor; also guards the weight bandwidth.
const LAMBDA_FLOOR: f64 = 1e-8;

/// Number of row bands; progress is reported once per band.
const PROGRESS_BANDS: usize = 20;

/// Parameters of the exact engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExactParams {
    /// Search window radius. Default: 5
    pub search_radius: usize,
    /// Patch radius. Default: 1
    pub patch_radius: usize,
    /// Weight bandwidth multiplier. Default: 1.5
    pub rho: f64,
    /// Mean of the synthetic count map. Default: 30.0
    pub count_target_mean: f64,
    /// Lambda quantization step. Default: 0.02
    pub quant_step: f64,
    /// Keep only the `k` nearest candidates. Default: all
    pub top_k: Option<usize>,
}

impl Default for ExactParams {
    fn default() -> Self {
        Self {
            search_radius: DEFAULT_SEARCH_RADIUS,
            patch_radius: DEFAULT_PATCH_RADIUS,
            rho: DEFAULT_RHO,
            count_target_mean: DEFAULT_COUNT_TARGET_MEAN,
            quant_step: crate::poisson_distance::DEFAULT_QUANT_STEP,
            top_k: None,
        }
    }
}

impl ExactParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), String> {
        if !is_positive_finite(self.rho) {
            return Err("rho must be finite and > 0".to_string());
        }
        if !is_positive_finite(self.count_target_mean) {
            return Err("count_target_mean must be finite and > 0".to_string());
        }
        if !is_positive_finite(self.quant_step) {
            return Err("quant_step must be finite and > 0".to_string());
        }
        if self.top_k == Some(0) {
            return Err("top_k must be > 0 when set".to_string());
        }
        Ok(())
    }
}

#[inline]
fn is_positive_finite(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

/// Synthetic count intensity derived from the gradient magnitude.
///
/// The magnitude is rescaled so its mean equals `count_target_mean`, box
/// filtered (size 3) and floored at `1e-8`.
pub fn lambda_map<F: PnlmFloat>(field: &GradientField<F>, count_target_mean: f64) -> Array2<f64> {
    let magnitude = field.magnitude().mapv(|v| v.to_f64_c());
    let mean = crate::utils::mean_of(magnitude.view()) + 1e-12;
    let scale = count_target_mean / mean;

    let counts = magnitude.mapv(|m| (m * scale).max(0.0));
    box_filter(counts.view(), LAMBDA_KERNEL_SIZE).mapv(|v| v.max(LAMBDA_FLOOR))
}

/// Normalized candidate weights `exp(-d / (rho * max(lambda_bar, 1e-8)))`.
///
/// If every weight underflows to zero the candidates are weighted uniformly.
pub fn candidate_weights(distances: &[f64], lambda_bar: f64, rho: f64) -> Vec<f64> {
    let bandwidth = rho * lambda_bar.max(LAMBDA_FLOOR);
    let mut weights: Vec<f64> = distances.iter().map(|&d| (-d / bandwidth).exp()).collect();
    let mut total: f64 = weights.iter().sum();
    if total == 0.0 {
        weights.iter_mut().for_each(|w| *w = 1.0);
        total = weights.len() as f64;
    }
    if total > 0.0 {
        weights.iter_mut().for_each(|w| *w /= total);
    }
    weights
}

/// Worker-local front cache over the shared distance table.
struct LocalDistanceCache<'a> {
    table: &'a PoissonDistanceTable,
    entries: FxHashMap<DistanceKey, f64>,
    hits: u64,
    misses: u64,
}

impl<'a> LocalDistanceCache<'a> {
    fn new(table: &'a PoissonDistanceTable) -> Self {
        Self {
            table,
            entries: FxHashMap::default(),
            hits: 0,
            misses: 0,
        }
    }

    #[inline]
    fn distance(&mut self, qa: f64, qb: f64) -> f64 {
        let key = canonical_key(qa, qb);
        if let Some(&d) = self.entries.get(&key) {
            self.hits += 1;
            return d;
        }
        self.misses += 1;
        let d = self.table.distance_quantized(qa, qb);
        self.entries.insert(key, d);
        d
    }
}

/// Read-only inputs shared by every worker.
struct RowContext<'a, F: PnlmFloat> {
    gx: ArrayView2<'a, F>,
    gy: ArrayView2<'a, F>,
    lambda: ArrayView2<'a, f64>,
    quantized: ArrayView2<'a, f64>,
    params: &'a ExactParams,
}

impl<F: PnlmFloat> RowContext<'_, F> {
    /// Patch-summed distance between the patches centred at `(y, x)` and `(yy, xx)`.
    fn patch_distance(
        &self,
        (y, x): (usize, usize),
        (yy, xx): (usize, usize),
        cache: &mut LocalDistanceCache<'_>,
    ) -> f64 {
        let pr = self.params.patch_radius;
        let side = 2 * pr + 1;
        let mut total = 0.0;
        for j in 0..side {
            for i in 0..side {
                let a = self.quantized[[y - pr + j, x - pr + i]];
                let b = self.quantized[[yy - pr + j, xx - pr + i]];
                total += cache.distance(a, b);
            }
        }
        total
    }

    /// Denoise one interior row; border samples keep their input value.
    fn denoise_row(
        &self,
        y: usize,
        out_x: &mut ArrayViewMut1<F>,
        out_y: &mut ArrayViewMut1<F>,
        cache: &mut LocalDistanceCache<'_>,
        candidates: &mut Vec<(f64, usize, usize)>,
    ) {
        let (rows, cols) = self.gx.dim();
        let pr = self.params.patch_radius;
        let sr = self.params.search_radius;
        if y < pr || y + pr >= rows || cols <= 2 * pr {
            return;
        }

        let side = 2 * pr + 1;
        let patch_area = (side * side) as f64;
        let y_lo = pr.max(y.saturating_sub(sr));
        let y_hi = (rows - pr).min(y + sr + 1);

        for x in pr..cols - pr {
            let lambda_bar = self
                .lambda
                .slice(s![y - pr..=y + pr, x - pr..=x + pr])
                .sum()
                / patch_area;

            let x_lo = pr.max(x.saturating_sub(sr));
            let x_hi = (cols - pr).min(x + sr + 1);

            candidates.clear();
            for yy in y_lo..y_hi {
                for xx in x_lo..x_hi {
                    let d = self.patch_distance((y, x), (yy, xx), cache);
                    candidates.push((d, yy, xx));
                }
            }

            if let Some(k) = self.params.top_k {
                if candidates.len() > k {
                    candidates.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0));
                    candidates.truncate(k);
                }
            }

            let distances: Vec<f64> = candidates.iter().map(|c| c.0).collect();
            let weights = candidate_weights(&distances, lambda_bar, self.params.rho);

            let mut acc_x = 0.0f64;
            let mut acc_y = 0.0f64;
            for (w, &(_, yy, xx)) in weights.iter().zip(candidates.iter()) {
                acc_x += w * self.gx[[yy, xx]].to_f64_c();
                acc_y += w * self.gy[[yy, xx]].to_f64_c();
            }
            out_x[x] = F::from_f64_c(acc_x);
            out_y[x] = F::from_f64_c(acc_y);
        }
    }
}

/// Exact engine bound to a distance table.
#[derive(Debug, Clone)]
pub struct ExactGradientDenoiser {
    params: ExactParams,
    table: Arc<PoissonDistanceTable>,
}

impl ExactGradientDenoiser {
    pub fn new(params: ExactParams, table: Arc<PoissonDistanceTable>) -> Self {
        Self { params, table }
    }

    pub fn params(&self) -> &ExactParams {
        &self.params
    }

    /// Denoise both components.
    ///
    /// `progress` receives the completed fraction in `[0, 1]` once per row band,
    /// always on the calling thread.
    pub fn denoise<F: PnlmFloat>(
        &self,
        field: &GradientField<F>,
        progress: &mut dyn FnMut(f32),
    ) -> GradientField<F> {
        let (rows, cols) = field.dim();
        let mut out = field.clone();
        if rows == 0 || cols == 0 {
            progress(1.0);
            return out;
        }

        let lambda = lambda_map(field, self.params.count_target_mean);
        let step = self.params.quant_step;
        let quantized = lambda.mapv(|l| quantize(l, step));
        debug!(
            rows,
            cols,
            mean_lambda = crate::utils::mean_of(lambda.view()),
            "Exact engine lambda map ready"
        );

        let ctx = RowContext {
            gx: field.gx.view(),
            gy: field.gy.view(),
            lambda: lambda.view(),
            quantized: quantized.view(),
            params: &self.params,
        };

        let workers = rayon::current_num_threads().max(1);
        let mut caches: Vec<LocalDistanceCache> = (0..workers)
            .map(|_| LocalDistanceCache::new(&self.table))
            .collect();

        let band_rows = rows.div_ceil(PROGRESS_BANDS).max(1);
        let mut band_start = 0;
        while band_start < rows {
            progress(band_start as f32 / rows as f32);
            let band_end = (band_start + band_rows).min(rows);

            let mut out_x = out.gx.slice_mut(s![band_start..band_end, ..]);
            let mut out_y = out.gy.slice_mut(s![band_start..band_end, ..]);
            let mut band: Vec<_> = out_x
                .axis_iter_mut(Axis(0))
                .zip(out_y.axis_iter_mut(Axis(0)))
                .enumerate()
                .map(|(i, (rx, ry))| (band_start + i, rx, ry))
                .collect();

            let chunk_len = band.len().div_ceil(caches.len()).max(1);
            band.par_chunks_mut(chunk_len)
                .zip(caches.par_iter_mut())
                .for_each(|(chunk, cache)| {
                    let mut candidates = Vec::new();
                    for (y, row_x, row_y) in chunk.iter_mut() {
                        ctx.denoise_row(*y, row_x, row_y, cache, &mut candidates);
                    }
                });

            band_start = band_end;
        }

        let (hits, misses) = caches
            .iter()
            .fold((0u64, 0u64), |(h, m), c| (h + c.hits, m + c.misses));
        debug!(
            hits,
            misses,
            table_entries = self.table.len(),
            "Exact engine distance cache"
        );

        progress(1.0);
        out
    }
}
