//! Float trait abstraction for f32/f64 support.
//!
//! The differential operators, the gradient enhancer, the NLM primitive and the
//! variational reconstructor are generic over the working precision. The
//! pipeline itself runs in `f32`; `f64` is used by tests and by callers that
//! want extra headroom.

use num_traits::{Float, FromPrimitive, NumAssign};
use std::fmt::Debug;
use std::iter::Sum;

/// Trait alias for floating point types supported by the enhancement stages.
///
/// Combines:
/// - Basic float operations (Float, NumAssign)
/// - Conversion from primitive types (FromPrimitive)
/// - Iteration support (Sum)
/// - Thread safety for rayon workers (Send + Sync)
pub trait PnlmFloat:
    Float + FromPrimitive + NumAssign + Sum + Debug + Send + Sync + 'static
{
    /// Guard added to norms and scales before dividing by them.
    const TINY: Self;

    /// Create a value from an f64 constant.
    fn from_f64_c(val: f64) -> Self;

    /// Create a value from a usize constant.
    fn usize_as(val: usize) -> Self;

    /// Widen to f64 (lossless for both supported types).
    fn to_f64_c(self) -> f64;
}

impl PnlmFloat for f32 {
    const TINY: Self = 1e-12;

    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val as f32
    }

    #[inline]
    fn usize_as(val: usize) -> Self {
        val as f32
    }

    #[inline]
    fn to_f64_c(self) -> f64 {
        self as f64
    }
}

impl PnlmFloat for f64 {
    const TINY: Self = 1e-12;

    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val
    }

    #[inline]
    fn usize_as(val: usize) -> Self {
        val as f64
    }

    #[inline]
    fn to_f64_c(self) -> f64 {
        self
    }
}
