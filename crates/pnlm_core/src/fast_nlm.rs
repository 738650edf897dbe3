//! Fast gradient-field denoiser built on the generic NLM primitive.
//!
//! Each gradient component is min-max normalized to `[0, 1]` (the range the
//! primitive's `h` is calibrated for), smoothed, and mapped back. Fields above
//! a pixel threshold are processed in overlapping blocks. Only the core of each
//! block is written back.

use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::differential::GradientField;
use crate::float_trait::PnlmFloat;
use crate::nl_means::denoise_nl_means;
use crate::utils::min_max_of;

/// Smoothing strength for unit-range gradient components.
pub const DEFAULT_H: f64 = 0.001;

/// Default block side.
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Default context overlap around each block.
pub const DEFAULT_BLOCK_OVERLAP: usize = 16;

/// Fields with more pixels than this are processed in blocks.
pub const DEFAULT_BLOCK_THRESHOLD_PIXELS: usize = 1_000_000;

/// Smallest patch side handed to the primitive.
const MIN_PATCH_SIZE: usize = 3;

/// Smallest search distance handed to the primitive.
const MIN_PATCH_DISTANCE: usize = 5;

/// Parameters of the fast engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FastParams {
    /// Patch side passed to the primitive.
    pub patch_size: usize,
    /// Search distance passed to the primitive.
    pub patch_distance: usize,
    /// Smoothing strength. Default: 0.001
    pub h: f64,
    /// Block side. Default: 1024
    pub block_size: usize,
    /// Context overlap per block side. Default: 16
    pub block_overlap: usize,
    /// Blocking starts above this pixel count. Default: 1_000_000
    pub block_threshold_pixels: usize,
}

impl Default for FastParams {
    fn default() -> Self {
        Self::from_radii(
            crate::exact_nlm::DEFAULT_SEARCH_RADIUS,
            crate::exact_nlm::DEFAULT_PATCH_RADIUS,
        )
    }
}

impl FastParams {
    /// Translate exact-engine radii into primitive parameters.
    pub fn from_radii(search_radius: usize, patch_radius: usize) -> Self {
        Self {
            patch_size: MIN_PATCH_SIZE.max(2 * patch_radius + 1),
            patch_distance: MIN_PATCH_DISTANCE.max(2 * search_radius + 3),
            h: DEFAULT_H,
            block_size: DEFAULT_BLOCK_SIZE,
            block_overlap: DEFAULT_BLOCK_OVERLAP,
            block_threshold_pixels: DEFAULT_BLOCK_THRESHOLD_PIXELS,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.patch_size == 0 {
            return Err("patch_size must be > 0".to_string());
        }
        if !(self.h.is_finite() && self.h > 0.0) {
            return Err("h must be finite and > 0".to_string());
        }
        if self.block_size == 0 {
            return Err("block_size must be > 0".to_string());
        }
        Ok(())
    }
}

/// Affine map of one component onto `[0, 1]`; `None` for a constant component.
#[derive(Debug, Clone, Copy)]
struct UnitRange<F: PnlmFloat> {
    offset: F,
    span: F,
}

impl<F: PnlmFloat> UnitRange<F> {
    fn of(channel: ArrayView2<F>) -> Option<Self> {
        let (lo, hi) = min_max_of(channel);
        let span = hi - lo;
        if span > F::zero() {
            Some(Self { offset: lo, span })
        } else {
            None
        }
    }

    fn forward(&self, channel: ArrayView2<F>) -> Array2<F> {
        channel.mapv(|v| (v - self.offset) / self.span)
    }

    fn inverse(&self, channel: &mut Array2<F>) {
        channel.mapv_inplace(|v| v * self.span + self.offset);
    }
}

/// Fast engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct FastGradientDenoiser {
    params: FastParams,
}

impl FastGradientDenoiser {
    pub fn new(params: FastParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FastParams {
        &self.params
    }

    /// Smooth both components of one region in parallel.
    fn smooth_pair<F: PnlmFloat>(&self, gx: ArrayView2<F>, gy: ArrayView2<F>) -> (Array2<F>, Array2<F>) {
        let p = &self.params;
        rayon::join(
            || denoise_nl_means(gx, p.patch_size, p.patch_distance, p.h),
            || denoise_nl_means(gy, p.patch_size, p.patch_distance, p.h),
        )
    }

    /// Denoise both components.
    ///
    /// `progress` receives the completed fraction in `[0, 1]`, proportional to
    /// finished blocks, on the calling thread.
    pub fn denoise<F: PnlmFloat>(
        &self,
        field: &GradientField<F>,
        progress: &mut dyn FnMut(f32),
    ) -> GradientField<F> {
        let (rows, cols) = field.dim();
        if rows == 0 || cols == 0 {
            progress(1.0);
            return field.clone();
        }

        let range_x = UnitRange::of(field.gx.view());
        let range_y = UnitRange::of(field.gy.view());
        let norm_x = match range_x {
            Some(r) => r.forward(field.gx.view()),
            None => field.gx.clone(),
        };
        let norm_y = match range_y {
            Some(r) => r.forward(field.gy.view()),
            None => field.gy.clone(),
        };

        let (mut gx, mut gy) = if rows * cols > self.params.block_threshold_pixels {
            self.denoise_blocks(norm_x.view(), norm_y.view(), progress)
        } else {
            let pair = self.smooth_pair(norm_x.view(), norm_y.view());
            progress(1.0);
            pair
        };

        if let Some(r) = range_x {
            r.inverse(&mut gx);
        }
        if let Some(r) = range_y {
            r.inverse(&mut gy);
        }
        GradientField { gx, gy }
    }

    fn denoise_blocks<F: PnlmFloat>(
        &self,
        gx: ArrayView2<F>,
        gy: ArrayView2<F>,
        progress: &mut dyn FnMut(f32),
    ) -> (Array2<F>, Array2<F>) {
        let (rows, cols) = gx.dim();
        let block = self.params.block_size.max(1);
        let overlap = self.params.block_overlap;
        let blocks_y = rows.div_ceil(block);
        let blocks_x = cols.div_ceil(block);
        let total = blocks_y * blocks_x;
        debug!(blocks_y, blocks_x, block, overlap, "Fast engine block decomposition");

        let mut out_x = Array2::<F>::zeros((rows, cols));
        let mut out_y = Array2::<F>::zeros((rows, cols));
        let mut done = 0usize;

        for by in 0..blocks_y {
            for bx in 0..blocks_x {
                let core_r0 = by * block;
                let core_r1 = ((by + 1) * block).min(rows);
                let core_c0 = bx * block;
                let core_c1 = ((bx + 1) * block).min(cols);

                let r0 = core_r0.saturating_sub(overlap);
                let r1 = (core_r1 + overlap).min(rows);
                let c0 = core_c0.saturating_sub(overlap);
                let c1 = (core_c1 + overlap).min(cols);

                let (smooth_x, smooth_y) = self.smooth_pair(
                    gx.slice(s![r0..r1, c0..c1]),
                    gy.slice(s![r0..r1, c0..c1]),
                );

                // Core rows/cols relative to the padded block.
                let (rr0, rr1) = (core_r0 - r0, core_r1 - r0);
                let (rc0, rc1) = (core_c0 - c0, core_c1 - c0);
                out_x
                    .slice_mut(s![core_r0..core_r1, core_c0..core_c1])
                    .assign(&smooth_x.slice(s![rr0..rr1, rc0..rc1]));
                out_y
                    .slice_mut(s![core_r0..core_r1, core_c0..core_c1])
                    .assign(&smooth_y.slice(s![rr0..rr1, rc0..rc1]));

                done += 1;
                progress(done as f32 / total as f32);
            }
        }
        (out_x, out_y)
    }
}
