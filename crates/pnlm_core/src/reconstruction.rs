//! Variational reconstruction of an image from a target gradient field.
//!
//! Explicit Euler steps on
//! `I <- clamp(I - dt * (gamma * div(grad I / |grad I|) + 2 * delta * (lap I - div G)), 0, 1)`
//! starting from the normalized input.

use ndarray::{Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use crate::differential::{divergence_of, gradient, laplace, GradientField};
use crate::float_trait::PnlmFloat;

/// Default total-variation weight.
pub const DEFAULT_GAMMA: f64 = 0.2;

/// Default gradient-fidelity weight.
pub const DEFAULT_DELTA: f64 = 0.8;

/// Default number of Euler steps.
pub const DEFAULT_ITERATIONS: usize = 10;

/// Default step size.
pub const DEFAULT_DT: f64 = 0.15;

/// Parameters of the reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructParams {
    /// TV weight. Default: 0.2
    pub gamma: f64,
    /// Fidelity weight. Default: 0.8
    pub delta: f64,
    /// Euler steps. Default: 10
    pub iterations: usize,
    /// Step size. Default: 0.15
    pub dt: f64,
}

impl Default for ReconstructParams {
    fn default() -> Self {
        Self {
            gamma: DEFAULT_GAMMA,
            delta: DEFAULT_DELTA,
            iterations: DEFAULT_ITERATIONS,
            dt: DEFAULT_DT,
        }
    }
}

impl ReconstructParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err("dt must be finite and > 0".to_string());
        }
        if !self.gamma.is_finite() || !self.delta.is_finite() {
            return Err("gamma and delta must be finite".to_string());
        }
        Ok(())
    }
}

/// One explicit Euler step. `div_target` is `div G`, fixed across steps.
fn euler_step<F: PnlmFloat>(
    current: &Array2<F>,
    div_target: &Array2<F>,
    params: &ReconstructParams,
) -> Array2<F> {
    let mut p = gradient(current.view());
    Zip::from(&mut p.gx).and(&mut p.gy).for_each(|x, y| {
        let norm = (*x * *x + *y * *y).sqrt() + F::TINY;
        *x /= norm;
        *y /= norm;
    });

    let div_p = divergence_of(&p);
    let lap = laplace(current.view());

    let dt = F::from_f64_c(params.dt);
    let gamma = F::from_f64_c(params.gamma);
    let two_delta = F::from_f64_c(2.0 * params.delta);

    let mut next = current.clone();
    Zip::from(&mut next)
        .and(&div_p)
        .and(&lap)
        .and(div_target)
        .for_each(|i, &dp, &l, &dg| {
            let updated = *i - dt * (gamma * dp + two_delta * (l - dg));
            *i = updated.max(F::zero()).min(F::one());
        });
    next
}

/// Reconstruct an image whose gradient follows `target`, starting from `base`.
pub fn reconstruct<F: PnlmFloat>(
    base: ArrayView2<F>,
    target: &GradientField<F>,
    params: &ReconstructParams,
) -> Array2<F> {
    let div_target = divergence_of(target);
    let mut current = base.to_owned();
    for _ in 0..params.iterations {
        current = euler_step(&current, &div_target, params);
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differential::divergence;
    use ndarray::Array2;

    #[test]
    fn test_zero_iterations_returns_base() {
        let base = Array2::from_shape_fn((8, 8), |(r, c)| ((r + c) as f32) / 16.0);
        let params = ReconstructParams {
            iterations: 0,
            ..ReconstructParams::default()
        };
        let out = reconstruct(base.view(), &GradientField::zeros((8, 8)), &params);
        assert_eq!(out, base);
    }

    #[test]
    fn test_constant_base_with_zero_target_is_stable() {
        let base = Array2::from_elem((16, 16), 0.4f64);
        let out = reconstruct(
            base.view(),
            &GradientField::zeros((16, 16)),
            &ReconstructParams::default(),
        );
        for &v in out.iter() {
            assert!((v - 0.4).abs() < 1e-12);
        }
    }

    #[test]
    fn test_output_clamped_to_unit_range() {
        let base = Array2::from_shape_fn((20, 20), |(r, c)| if (r / 4 + c / 4) % 2 == 0 { 0.0 } else { 1.0 });
        let target = GradientField {
            gx: Array2::from_elem((20, 20), 5.0f64),
            gy: Array2::from_shape_fn((20, 20), |(r, _)| if r % 2 == 0 { -3.0 } else { 3.0 }),
        };
        let params = ReconstructParams {
            iterations: 4,
            dt: 0.5,
            ..ReconstructParams::default()
        };
        let out = reconstruct(base.view(), &target, &params);
        assert!(out.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_single_step_matches_formula() {
        let base = Array2::from_shape_fn((6, 7), |(r, c)| 0.3 + 0.05 * ((r * 3 + c * 5) % 4) as f64);
        let target = GradientField {
            gx: Array2::from_shape_fn((6, 7), |(r, c)| 0.01 * (r as f64 - c as f64)),
            gy: Array2::from_elem((6, 7), 0.002f64),
        };
        let params = ReconstructParams {
            iterations: 1,
            ..ReconstructParams::default()
        };
        let out = reconstruct(base.view(), &target, &params);

        let g = gradient(base.view());
        let norm = g.magnitude().mapv(|m| m + 1e-12);
        let div_p = divergence((&g.gx / &norm).view(), (&g.gy / &norm).view()).unwrap();
        let lap = laplace(base.view());
        let div_g = divergence_of(&target);
        let expected = (&base - &((&div_p * 0.2 + &((&lap - &div_g) * 1.6)) * 0.15))
            .mapv(|v| v.clamp(0.0, 1.0));

        for (a, b) in out.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_validate() {
        assert!(ReconstructParams::default().validate().is_ok());
        let mut p = ReconstructParams::default();
        p.dt = 0.0;
        assert!(p.validate().is_err());
    }
}
