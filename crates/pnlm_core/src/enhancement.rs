//! Noise-aware gradient enhancement.
//!
//! The gradient of the working field is scaled by a locally adaptive gain
//! `k = (1 + mu) / (1 + (sigma / C)^2)`. Here `sigma` is the local standard
//! deviation and `C` is its 90th percentile over the whole field. Pixels whose
//! local variance does not exceed `epsilon` are masked to zero.

use ndarray::{Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use crate::differential::{gradient, GradientField};
use crate::filtering::box_filter;
use crate::float_trait::PnlmFloat;
use crate::utils::percentile_of_slice;

/// Default 8-bit variance threshold, before mapping to the unit domain.
pub const DEFAULT_EPSILON_8BIT: f64 = 2.3;

/// Default gain boost.
pub const DEFAULT_MU: f64 = 10.0;

/// Default local-variance window side.
pub const DEFAULT_VARIANCE_KERNEL_SIZE: usize = 5;

/// Percentile of the local standard deviation used as the gain knee `C`.
const GAIN_KNEE_PERCENTILE: f64 = 90.0;

/// Parameters of the gradient enhancer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceParams {
    /// Variance threshold in the unit domain. Default: `2.3 / 255^2`
    pub epsilon: f64,
    /// Gain boost. Default: 10.0
    pub mu: f64,
    /// Side of the local-variance window (even sizes are bumped). Default: 5
    pub variance_kernel_size: usize,
}

impl Default for EnhanceParams {
    fn default() -> Self {
        Self {
            epsilon: Self::epsilon_from_8bit(DEFAULT_EPSILON_8BIT),
            mu: DEFAULT_MU,
            variance_kernel_size: DEFAULT_VARIANCE_KERNEL_SIZE,
        }
    }
}

impl EnhanceParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a variance threshold expressed on the 0..255 scale into `[0, 1]`.
    pub fn epsilon_from_8bit(value: f64) -> f64 {
        value / (255.0 * 255.0)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.variance_kernel_size == 0 {
            return Err("variance_kernel_size must be > 0".to_string());
        }
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err("epsilon must be finite and >= 0".to_string());
        }
        if !self.mu.is_finite() || self.mu < 0.0 {
            return Err("mu must be finite and >= 0".to_string());
        }
        Ok(())
    }
}

/// Local variance `E[x^2] - E[x]^2` over a `ksize x ksize` window, floored at 0.
pub fn local_variance<F: PnlmFloat>(field: ArrayView2<F>, ksize: usize) -> Array2<F> {
    let mean = box_filter(field, ksize);
    let squared = field.mapv(|v| v * v);
    let mean_sq = box_filter(squared.view(), ksize);

    let mut variance = mean_sq;
    variance.zip_mut_with(&mean, |v, &m| {
        let var = *v - m * m;
        *v = if var > F::zero() { var } else { F::zero() };
    });
    variance
}

/// Enhance the gradient of `field` with the noise-adaptive gain and mask.
///
/// A flat field (all-zero variance) gives a uniform gain; the mask then zeroes
/// every pixel, so the result is the zero field.
pub fn enhance_gradient<F: PnlmFloat>(
    field: ArrayView2<F>,
    params: &EnhanceParams,
) -> GradientField<F> {
    let GradientField { mut gx, mut gy } = gradient(field);
    if field.is_empty() {
        return GradientField { gx, gy };
    }

    let variance = local_variance(field, params.variance_kernel_size);
    let sigma = variance.mapv(|v| (v + F::TINY).sqrt());

    let mut sigma_sorted: Vec<F> = sigma.iter().copied().collect();
    let knee = percentile_of_slice(&mut sigma_sorted, GAIN_KNEE_PERCENTILE) + F::TINY;

    let boost = F::one() + F::from_f64_c(params.mu);
    let epsilon = F::from_f64_c(params.epsilon);

    Zip::from(&mut gx)
        .and(&mut gy)
        .and(&sigma)
        .and(&variance)
        .for_each(|x, y, &s, &var| {
            // Threshold direction is `>`: flat regions are the ones masked out.
            if var > epsilon {
                let ratio = s / knee;
                let gain = boost / (F::one() + ratio * ratio);
                *x *= gain;
                *y *= gain;
            } else {
                *x = F::zero();
                *y = F::zero();
            }
        });

    GradientField { gx, gy }
}
