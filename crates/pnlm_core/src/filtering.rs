//! Separable box (mean) filter with symmetric border reflection.
//!
//! Used for the local second-moment estimate of the gradient enhancer and for
//! smoothing the count map into a lambda map. Borders repeat the edge sample
//! (`cba|abc|cba`), which is what the enhancement reference expects from its
//! mean filter.

use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;

use crate::float_trait::PnlmFloat;
use crate::utils::reflect_index;

/// Minimum row count before rows are filtered in parallel.
const PARALLEL_ROW_THRESHOLD: usize = 256;

/// Fill a pre-allocated padded buffer with reflected boundaries.
#[inline]
fn fill_padded_row<F: PnlmFloat>(input: &[F], radius: usize, padded: &mut Vec<F>) {
    let n = input.len();
    padded.clear();
    padded.extend((0..n + 2 * radius).map(|i| {
        let src = reflect_index(i as isize - radius as isize, n);
        input[src]
    }));
}

/// Mean over a sliding window of `2 * radius + 1` samples of a padded row.
#[inline]
fn mean_1d_padded<F: PnlmFloat>(padded: &[F], radius: usize, output: &mut [F]) {
    let klen = 2 * radius + 1;
    let inv = F::one() / F::usize_as(klen);
    for (i, out) in output.iter_mut().enumerate() {
        let mut sum = F::zero();
        for &v in &padded[i..i + klen] {
            sum += v;
        }
        *out = sum * inv;
    }
}

/// Apply the 1D mean filter along every row.
fn mean_rows<F: PnlmFloat>(input: ArrayView2<F>, radius: usize) -> Array2<F> {
    let (rows, cols) = input.dim();
    let mut output = Array2::zeros((rows, cols));
    if rows == 0 || cols == 0 {
        return output;
    }

    if rows >= PARALLEL_ROW_THRESHOLD {
        let output_rows: Vec<_> = output.axis_iter_mut(Axis(0)).collect();
        let input_rows: Vec<_> = input.axis_iter(Axis(0)).collect();

        output_rows
            .into_par_iter()
            .zip(input_rows.into_par_iter())
            .for_each(|(mut out_row, in_row)| {
                let in_slice: Vec<F> = in_row.iter().copied().collect();
                let mut padded = Vec::with_capacity(cols + 2 * radius);
                fill_padded_row(&in_slice, radius, &mut padded);
                let mut out_buf = vec![F::zero(); cols];
                mean_1d_padded(&padded, radius, &mut out_buf);
                for (dst, src) in out_row.iter_mut().zip(out_buf) {
                    *dst = src;
                }
            });
    } else {
        let mut row_buf = Vec::with_capacity(cols);
        let mut padded = Vec::with_capacity(cols + 2 * radius);
        let mut out_buf = vec![F::zero(); cols];

        for r in 0..rows {
            row_buf.clear();
            row_buf.extend(input.row(r).iter().copied());
            fill_padded_row(&row_buf, radius, &mut padded);
            mean_1d_padded(&padded, radius, &mut out_buf);
            for (dst, &src) in output.row_mut(r).iter_mut().zip(out_buf.iter()) {
                *dst = src;
            }
        }
    }

    output
}

/// Box (mean) filter of side `ksize` with symmetric reflection at borders.
///
/// An even `ksize` is bumped to the next odd size; `ksize <= 1` returns a copy.
pub fn box_filter<F: PnlmFloat>(input: ArrayView2<F>, ksize: usize) -> Array2<F> {
    let ksize = if ksize % 2 == 0 { ksize + 1 } else { ksize };
    let radius = ksize / 2;
    if radius == 0 {
        return input.to_owned();
    }

    let horizontal = mean_rows(input, radius);
    // Vertical pass: filter the rows of the transposed view, then transpose back.
    let vertical_t = mean_rows(horizontal.t(), radius);
    vertical_t.reversed_axes().as_standard_layout().into_owned()
}
