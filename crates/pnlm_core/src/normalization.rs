//! Reversible mapping between raw `u16` intensities and the `[0, 1]` working
//! domain.
//!
//! `normalize` returns the working field together with the
//! [`NormalizationContext`] needed to map the processed field back with
//! `denormalize`. Degenerate ranges are widened silently, so normalization
//! never fails.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Default lower clip percentile.
pub const DEFAULT_PERCENTILE_LOW: f64 = 0.5;

/// Default upper clip percentile.
pub const DEFAULT_PERCENTILE_HIGH: f64 = 99.5;

/// How `vmin` / `vmax` are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NormalizationMode {
    /// Clip at the `low` / `high` percentiles of the image (in percent).
    Percentile { low: f64, high: f64 },
    /// Use an externally supplied display window: `center ± width / 2`.
    Window { center: f64, width: f64 },
}

impl Default for NormalizationMode {
    fn default() -> Self {
        NormalizationMode::Percentile {
            low: DEFAULT_PERCENTILE_LOW,
            high: DEFAULT_PERCENTILE_HIGH,
        }
    }
}

impl NormalizationMode {
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            NormalizationMode::Percentile { low, high } => {
                if !(0.0..=100.0).contains(&low) || !(0.0..=100.0).contains(&high) {
                    return Err(format!(
                        "percentiles must lie in [0, 100], got ({}, {})",
                        low, high
                    ));
                }
                if low > high {
                    return Err(format!(
                        "low percentile {} exceeds high percentile {}",
                        low, high
                    ));
                }
            }
            NormalizationMode::Window { center, width } => {
                if !center.is_finite() || !width.is_finite() {
                    return Err("window center and width must be finite".to_string());
                }
            }
        }
        Ok(())
    }
}

/// The affine map between raw intensities and the working domain.
///
/// Invariant: `vmax > vmin`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationContext {
    pub vmin: f64,
    pub vmax: f64,
}

impl NormalizationContext {
    /// Build a context, widening a degenerate range so that `vmax > vmin`.
    ///
    /// `data_max` is the largest raw sample; the widened upper bound is
    /// `data_max + 1` (or `vmin + 1` if that is still not above `vmin`).
    pub fn widened(vmin: f64, vmax: f64, data_max: f64) -> Self {
        let mut vmax = vmax;
        if vmax <= vmin {
            vmax = data_max + 1.0;
            if vmax <= vmin {
                vmax = vmin + 1.0;
            }
        }
        Self { vmin, vmax }
    }

    #[inline]
    pub fn span(&self) -> f64 {
        self.vmax - self.vmin
    }

    #[inline]
    pub fn to_unit(&self, raw: f64) -> f64 {
        ((raw - self.vmin) / self.span()).clamp(0.0, 1.0)
    }

    #[inline]
    pub fn from_unit(&self, unit: f64) -> f64 {
        unit.clamp(0.0, 1.0) * self.span() + self.vmin
    }
}

/// Inclusive output clamp range for `denormalize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRange {
    pub min: u16,
    pub max: u16,
}

impl OutputRange {
    /// The whole representable 16-bit range.
    pub const FULL_U16: OutputRange = OutputRange {
        min: 0,
        max: u16::MAX,
    };
}

impl Default for OutputRange {
    fn default() -> Self {
        Self::FULL_U16
    }
}

/// Histogram of a `u16` image; supports exact order-statistic lookups.
struct U16Histogram {
    counts: Vec<u64>,
    total: u64,
}

impl U16Histogram {
    fn new(image: ArrayView2<u16>) -> Self {
        let mut counts = vec![0u64; u16::MAX as usize + 1];
        for &v in image.iter() {
            counts[v as usize] += 1;
        }
        Self {
            counts,
            total: image.len() as u64,
        }
    }

    /// The `rank`-th smallest sample (0-based).
    fn value_at_rank(&self, rank: u64) -> f64 {
        let mut seen = 0u64;
        for (value, &count) in self.counts.iter().enumerate() {
            seen += count;
            if seen > rank {
                return value as f64;
            }
        }
        self.max()
    }

    fn max(&self) -> f64 {
        self.counts
            .iter()
            .rposition(|&c| c > 0)
            .map(|v| v as f64)
            .unwrap_or(0.0)
    }

    /// Percentile with linear interpolation between neighbouring ranks.
    fn percentile(&self, q: f64) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let pos = (q.clamp(0.0, 100.0) / 100.0) * (self.total - 1) as f64;
        let lo = pos.floor() as u64;
        let frac = pos - lo as f64;
        let lo_val = self.value_at_rank(lo);
        if frac <= 0.0 {
            return lo_val;
        }
        let hi_val = self.value_at_rank((lo + 1).min(self.total - 1));
        lo_val + (hi_val - lo_val) * frac
    }
}

/// Map a raw image into the `[0, 1]` working domain.
///
/// Never fails: a degenerate `vmax <= vmin` is widened to `max(data) + 1`.
pub fn normalize(
    image: ArrayView2<u16>,
    mode: NormalizationMode,
) -> (Array2<f32>, NormalizationContext) {
    let histogram = U16Histogram::new(image);
    let data_max = histogram.max();

    let (vmin, vmax) = match mode {
        NormalizationMode::Percentile { low, high } => {
            (histogram.percentile(low), histogram.percentile(high))
        }
        NormalizationMode::Window { center, width } => {
            (center - width / 2.0, center + width / 2.0)
        }
    };
    let context = NormalizationContext::widened(vmin, vmax, data_max);

    let field = image.mapv(|v| context.to_unit(v as f64) as f32);
    (field, context)
}

/// Map a working field back to raw intensities.
///
/// The field is clamped to `[0, 1]`, mapped through the inverse affine map,
/// rounded to nearest and clamped to `out_range`.
pub fn denormalize(
    field: ArrayView2<f32>,
    context: &NormalizationContext,
    out_range: OutputRange,
) -> Array2<u16> {
    let lo = out_range.min as f64;
    let hi = out_range.max as f64;
    field.mapv(|v| {
        let unit = if v.is_finite() { v as f64 } else { 0.0 };
        context.from_unit(unit).round().clamp(lo, hi) as u16
    })
}
