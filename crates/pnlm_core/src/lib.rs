//! Poisson non-local-means gradient-field enhancement for 16-bit radiographs.
//!
//! Pure Rust implementation of the enhancement pipeline:
//! normalization, noise-aware gradient enhancement, Poisson-weighted
//! non-local smoothing of the gradient field (exact and fast engines), and
//! variational reconstruction. This crate has no I/O and never installs a
//! logging subscriber.

pub mod control;
pub mod denoiser;
pub mod differential;
pub mod enhancement;
pub mod error;
pub mod exact_nlm;
pub mod fast_nlm;
pub mod filtering;
pub mod float_trait;
pub mod nl_means;
pub mod normalization;
pub mod orchestration;
pub mod params;
pub mod poisson_distance;
pub mod reconstruction;
pub mod utils;

// Re-export commonly used types at the crate root
pub use control::{CancellationToken, ProgressReporter};
pub use denoiser::{DenoiserEngine, EngineKind, EngineSelection, GradientDenoiser};
pub use differential::{divergence, gradient, laplace, GradientField};
pub use enhancement::{enhance_gradient, EnhanceParams};
pub use error::{EnhanceError, EnhanceResult, PipelineStage};
pub use exact_nlm::{ExactGradientDenoiser, ExactParams};
pub use fast_nlm::{FastGradientDenoiser, FastParams};
pub use float_trait::PnlmFloat;
pub use normalization::{denormalize, normalize, NormalizationContext, NormalizationMode, OutputRange};
pub use orchestration::{enhance_xray, EnhanceReport, EnhanceRequest, Enhancer};
pub use params::{PipelineParameters, TunedParameters, TuningTier};
pub use poisson_distance::PoissonDistanceTable;
pub use reconstruction::{reconstruct, ReconstructParams};
