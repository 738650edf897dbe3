//! Discrete differential operators on 2D scalar fields.
//!
//! All operators use central differences with **periodic** wraparound:
//! index `-1` is the last row/column and index `n` is the first. This avoids
//! special-casing borders at the cost of a seam where opposite image edges
//! differ. The seam is visible in the gradient of any image whose left/right
//! (or top/bottom) edges disagree.
//!
//! With these definitions `divergence` is the negative adjoint of `gradient`:
//! `sum(f * divergence(gradient(g))) == -sum(gradient(f) . gradient(g))`.

use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;

use crate::float_trait::PnlmFloat;

/// Pixel count above which rows are evaluated in parallel.
const PARALLEL_PIXEL_THRESHOLD: usize = 1 << 16;

/// A discrete vector field: horizontal (`gx`) and vertical (`gy`) components.
///
/// Both components always share one shape. Outside this crate a field can
/// only be built through [`GradientField::new`], which checks that.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientField<F: PnlmFloat> {
    pub(crate) gx: Array2<F>,
    pub(crate) gy: Array2<F>,
}

impl<F: PnlmFloat> GradientField<F> {
    /// Pair two components. Fails if the shapes differ.
    pub fn new(gx: Array2<F>, gy: Array2<F>) -> Result<Self, String> {
        if gx.dim() != gy.dim() {
            return Err(format!(
                "Gradient component shape mismatch: gx {:?} vs gy {:?}",
                gx.dim(),
                gy.dim()
            ));
        }
        Ok(Self { gx, gy })
    }

    /// A zero field of the given shape.
    pub fn zeros(dim: (usize, usize)) -> Self {
        Self {
            gx: Array2::zeros(dim),
            gy: Array2::zeros(dim),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.gx.dim()
    }

    pub fn gx(&self) -> &Array2<F> {
        &self.gx
    }

    pub fn gy(&self) -> &Array2<F> {
        &self.gy
    }

    /// Split into `(gx, gy)`.
    pub fn into_parts(self) -> (Array2<F>, Array2<F>) {
        (self.gx, self.gy)
    }

    /// Per-pixel Euclidean magnitude `sqrt(gx^2 + gy^2)`.
    pub fn magnitude(&self) -> Array2<F> {
        let mut out = self.gx.clone();
        out.zip_mut_with(&self.gy, |x, &y| *x = (*x * *x + y * y).sqrt());
        out
    }

    /// True when both components are free of NaN and infinities.
    pub fn is_finite(&self) -> bool {
        self.gx.iter().chain(self.gy.iter()).all(|v| v.is_finite())
    }
}

/// Periodic predecessor / successor of `i` in `[0, n)`.
#[inline(always)]
fn wrap_neighbors(i: usize, n: usize) -> (usize, usize) {
    let prev = if i == 0 { n - 1 } else { i - 1 };
    let next = if i + 1 == n { 0 } else { i + 1 };
    (prev, next)
}

/// Build an array row by row, in parallel for large shapes.
fn build_rows<F, K>(dim: (usize, usize), kernel: K) -> Array2<F>
where
    F: PnlmFloat,
    K: Fn(usize, usize) -> F + Sync,
{
    let (rows, cols) = dim;
    let mut output = Array2::zeros(dim);
    if rows == 0 || cols == 0 {
        return output;
    }

    if rows * cols >= PARALLEL_PIXEL_THRESHOLD {
        let output_rows: Vec<_> = output.axis_iter_mut(Axis(0)).collect();
        output_rows
            .into_par_iter()
            .enumerate()
            .for_each(|(r, mut row)| {
                for (c, v) in row.iter_mut().enumerate() {
                    *v = kernel(r, c);
                }
            });
    } else {
        for ((r, c), v) in output.indexed_iter_mut() {
            *v = kernel(r, c);
        }
    }
    output
}

/// Central-difference gradient with periodic borders.
///
/// `gx[r, c] = 0.5 * (f[r, c+1] - f[r, c-1])`, `gy[r, c] = 0.5 * (f[r+1, c] - f[r-1, c])`.
pub fn gradient<F: PnlmFloat>(field: ArrayView2<F>) -> GradientField<F> {
    let (rows, cols) = field.dim();
    let half = F::from_f64_c(0.5);

    let gx = build_rows((rows, cols), |r, c| {
        let (cp, cn) = wrap_neighbors(c, cols);
        half * (field[[r, cn]] - field[[r, cp]])
    });
    let gy = build_rows((rows, cols), |r, c| {
        let (rp, rn) = wrap_neighbors(r, rows);
        half * (field[[rn, c]] - field[[rp, c]])
    });

    GradientField { gx, gy }
}

/// Central-difference divergence of `(px, py)` with periodic borders.
///
/// Fails if the two components differ in shape.
pub fn divergence<F: PnlmFloat>(
    px: ArrayView2<F>,
    py: ArrayView2<F>,
) -> Result<Array2<F>, String> {
    if px.dim() != py.dim() {
        return Err(format!(
            "Divergence component shape mismatch: px {:?} vs py {:?}",
            px.dim(),
            py.dim()
        ));
    }
    Ok(divergence_same_shape(px, py))
}

fn divergence_same_shape<F: PnlmFloat>(px: ArrayView2<F>, py: ArrayView2<F>) -> Array2<F> {
    let (rows, cols) = px.dim();
    let half = F::from_f64_c(0.5);

    build_rows((rows, cols), |r, c| {
        let (cp, cn) = wrap_neighbors(c, cols);
        let (rp, rn) = wrap_neighbors(r, rows);
        half * (px[[r, cn]] - px[[r, cp]]) + half * (py[[rn, c]] - py[[rp, c]])
    })
}

/// Divergence of a [`GradientField`].
pub fn divergence_of<F: PnlmFloat>(field: &GradientField<F>) -> Array2<F> {
    divergence_same_shape(field.gx.view(), field.gy.view())
}

/// 4-neighbour discrete Laplacian with periodic borders.
pub fn laplace<F: PnlmFloat>(field: ArrayView2<F>) -> Array2<F> {
    let (rows, cols) = field.dim();
    let four = F::from_f64_c(4.0);

    build_rows((rows, cols), |r, c| {
        let (cp, cn) = wrap_neighbors(c, cols);
        let (rp, rn) = wrap_neighbors(r, rows);
        field[[rp, c]] + field[[rn, c]] + field[[r, cp]] + field[[r, cn]] - four * field[[r, c]]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    // Deterministic "random" data, same generator the other modules use.
    struct SimpleLcg {
        state: u64,
    }

    impl SimpleLcg {
        fn new(seed: u64) -> Self {
            Self { state: seed }
        }

        fn next_f64(&mut self) -> f64 {
            self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
            (self.state >> 11) as f64 / (1u64 << 53) as f64
        }
    }

    fn random_field(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
        let mut rng = SimpleLcg::new(seed);
        Array2::from_shape_fn((rows, cols), |_| rng.next_f64() - 0.5)
    }

    #[test]
    fn test_gradient_of_constant_is_zero() {
        let field = Array2::from_elem((8, 9), 0.7f32);
        let g = gradient(field.view());
        assert!(g.gx.iter().all(|&v| v == 0.0));
        assert!(g.gy.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_gradient_central_difference_interior() {
        let field = Array2::from_shape_fn((5, 6), |(r, c)| (2 * c + 3 * r) as f64);
        let g = gradient(field.view());
        assert!((g.gx[[2, 2]] - 2.0).abs() < 1e-12);
        assert!((g.gy[[2, 2]] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_gradient_wraps_at_border() {
        // Row [0, 1, 2, 3]: gx[0] = 0.5 * (f[1] - f[3]) = -1.0
        let field = Array2::from_shape_vec((1, 4), vec![0.0f64, 1.0, 2.0, 3.0]).unwrap();
        let g = gradient(field.view());
        assert!((g.gx[[0, 0]] + 1.0).abs() < 1e-12);
        assert!((g.gx[[0, 3]] + 1.0).abs() < 1e-12);
        // Single row: vertical neighbours are the row itself.
        assert!(g.gy.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_laplace_of_impulse() {
        let mut field = Array2::<f64>::zeros((5, 5));
        field[[2, 2]] = 1.0;
        let lap = laplace(field.view());
        assert_eq!(lap[[2, 2]], -4.0);
        assert_eq!(lap[[1, 2]], 1.0);
        assert_eq!(lap[[2, 3]], 1.0);
        assert!((lap.sum()).abs() < 1e-12, "Periodic Laplacian sums to zero");
    }

    #[test]
    fn test_divergence_gradient_adjointness() {
        for (rows, cols, seed) in [(16, 16, 1u64), (13, 29, 7), (40, 3, 99)] {
            let f = random_field(rows, cols, seed);
            let g = random_field(rows, cols, seed + 1000);

            let grad_g = gradient(g.view());
            let div_grad_g = divergence_of(&grad_g);
            let lhs: f64 = (&f * &div_grad_g).sum();

            let grad_f = gradient(f.view());
            let rhs: f64 = (&grad_f.gx * &grad_g.gx).sum() + (&grad_f.gy * &grad_g.gy).sum();

            assert!(
                (lhs + rhs).abs() < 1e-9 * (1.0 + rhs.abs()),
                "adjointness failed for {}x{}: lhs={} rhs={}",
                rows,
                cols,
                lhs,
                rhs
            );
        }
    }

    #[test]
    fn test_parallel_path_matches_sequential() {
        // 256 x 256 crosses the parallel threshold.
        let f = random_field(256, 256, 5);
        let lap = laplace(f.view());
        for &(r, c) in &[(0usize, 0usize), (17, 200), (255, 255), (128, 0)] {
            let (rp, rn) = wrap_neighbors(r, 256);
            let (cp, cn) = wrap_neighbors(c, 256);
            let expected = f[[rp, c]] + f[[rn, c]] + f[[r, cp]] + f[[r, cn]] - 4.0 * f[[r, c]];
            assert!((lap[[r, c]] - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_gradient_field_shape_check() {
        let ok = GradientField::new(Array2::<f32>::zeros((3, 4)), Array2::zeros((3, 4)));
        assert!(ok.is_ok());
        let bad = GradientField::new(Array2::<f32>::zeros((3, 4)), Array2::zeros((4, 3)));
        assert!(bad.is_err());
    }

    #[test]
    fn test_divergence_rejects_mismatched_components() {
        let px = Array2::<f64>::zeros((3, 4));
        let py = Array2::<f64>::zeros((4, 3));
        let err = divergence(px.view(), py.view()).unwrap_err();
        assert!(err.contains("shape mismatch"), "unexpected message: {}", err);

        let py = Array2::<f64>::zeros((3, 4));
        assert_eq!(divergence(px.view(), py.view()).unwrap().dim(), (3, 4));
    }

    #[test]
    fn test_accessors_and_into_parts() {
        let gx = Array2::from_elem((2, 3), 1.0f32);
        let gy = Array2::from_elem((2, 3), -2.0f32);
        let field = GradientField::new(gx.clone(), gy.clone()).unwrap();
        assert_eq!(field.gx(), &gx);
        assert_eq!(field.gy(), &gy);
        let (x, y) = field.into_parts();
        assert_eq!((x, y), (gx, gy));
    }

    #[test]
    fn test_magnitude() {
        let field = GradientField::new(
            Array2::from_elem((2, 2), 3.0f32),
            Array2::from_elem((2, 2), 4.0f32),
        )
        .unwrap();
        assert!(field.magnitude().iter().all(|&m| (m - 5.0).abs() < 1e-6));
        assert!(field.is_finite());
    }
}
