//! Generic non-local means smoothing of a scalar field ("fast mode").
//!
//! For every offset `(dy, dx)` of the search window, the squared difference
//! between the field and its shifted copy is integrated once. Every patch
//! distance at that offset is then read from the integral image in constant
//! time. The weight of a neighbour is `exp(-mean_sq_diff / h^2)`.
//!
//! Borders use symmetric reflection. Accumulation runs offset by offset with
//! row-parallel updates, so results do not depend on the thread count.

use ndarray::{Array2, ArrayView2, Axis, Zip};
use rayon::prelude::*;

use crate::float_trait::PnlmFloat;
use crate::utils::reflect_index;

/// Symmetrically padded copy of `field` with `pad` samples on every side.
fn reflect_pad<F: PnlmFloat>(field: ArrayView2<F>, pad: usize) -> Array2<f64> {
    let (rows, cols) = field.dim();
    Array2::from_shape_fn((rows + 2 * pad, cols + 2 * pad), |(r, c)| {
        let sr = reflect_index(r as isize - pad as isize, rows);
        let sc = reflect_index(c as isize - pad as isize, cols);
        field[[sr, sc]].to_f64_c()
    })
}

/// Integral image of the squared difference between the padded field and its
/// copy shifted by `(dy, dx)`, restricted to patch-centre-extended coordinates.
///
/// Entry `[r + 1, c + 1]` holds the sum over `[0..=r, 0..=c]`. Row `r` of the
/// extended region maps to padded row `r + distance`.
fn shifted_sq_diff_integral(
    padded: &Array2<f64>,
    extent: (usize, usize),
    distance: usize,
    (dy, dx): (isize, isize),
) -> Array2<f64> {
    let (ext_rows, ext_cols) = extent;
    let mut integral = Array2::<f64>::zeros((ext_rows + 1, ext_cols + 1));

    for r in 0..ext_rows {
        let pr = r + distance;
        let qr = (pr as isize + dy) as usize;
        let mut row_sum = 0.0;
        for c in 0..ext_cols {
            let pc = c + distance;
            let qc = (pc as isize + dx) as usize;
            let diff = padded[[pr, pc]] - padded[[qr, qc]];
            row_sum += diff * diff;
            integral[[r + 1, c + 1]] = integral[[r, c + 1]] + row_sum;
        }
    }
    integral
}

#[inline(always)]
fn box_sum(integral: &Array2<f64>, r: usize, c: usize, side: usize) -> f64 {
    integral[[r + side, c + side]] - integral[[r, c + side]] - integral[[r + side, c]]
        + integral[[r, c]]
}

/// Non-local means with square patches of side `patch_size` and a search
/// window of `2 * patch_distance + 1` per side.
///
/// An even `patch_size` is bumped to the next odd size. A non-positive `h`
/// returns the input unchanged.
pub fn denoise_nl_means<F: PnlmFloat>(
    field: ArrayView2<F>,
    patch_size: usize,
    patch_distance: usize,
    h: f64,
) -> Array2<F> {
    let (rows, cols) = field.dim();
    if rows == 0 || cols == 0 || h.is_nan() || h <= 0.0 {
        return field.to_owned();
    }

    let side = if patch_size % 2 == 0 {
        patch_size + 1
    } else {
        patch_size
    };
    let half = side / 2;
    let distance = patch_distance;
    let pad = half + distance;

    let padded = reflect_pad(field, pad);
    let extent = (rows + 2 * half, cols + 2 * half);
    let inv_area = 1.0 / (side * side) as f64;
    let inv_h2 = 1.0 / (h * h);

    let mut numerator = Array2::<f64>::zeros((rows, cols));
    let mut denominator = Array2::<f64>::zeros((rows, cols));
    let d = distance as isize;

    for dy in -d..=d {
        for dx in -d..=d {
            let integral = shifted_sq_diff_integral(&padded, extent, distance, (dy, dx));

            let num_rows: Vec<_> = numerator.axis_iter_mut(Axis(0)).collect();
            let den_rows: Vec<_> = denominator.axis_iter_mut(Axis(0)).collect();
            num_rows
                .into_par_iter()
                .zip(den_rows.into_par_iter())
                .enumerate()
                .for_each(|(r, (mut num_row, mut den_row))| {
                    let nr = (r as isize + pad as isize + dy) as usize;
                    for c in 0..cols {
                        let dist = (box_sum(&integral, r, c, side) * inv_area).max(0.0);
                        let w = (-dist * inv_h2).exp();
                        let nc = (c as isize + pad as isize + dx) as usize;
                        num_row[c] += w * padded[[nr, nc]];
                        den_row[c] += w;
                    }
                });
        }
    }

    let mut out = Array2::<F>::zeros((rows, cols));
    Zip::from(&mut out)
        .and(&numerator)
        .and(&denominator)
        .and(&field)
        .for_each(|o, &n, &den, &orig| {
            // The zero offset always contributes weight 1, so `den >= 1`.
            *o = if den > 0.0 { F::from_f64_c(n / den) } else { orig };
        });
    out
}
