//! Pipeline parameters, presets and the size-adaptive tuning policy.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::denoiser::EngineSelection;
use crate::enhancement::EnhanceParams;
use crate::exact_nlm::ExactParams;
use crate::reconstruction::ReconstructParams;

/// Above this many pixels the large-image clamps apply.
pub const LARGE_IMAGE_PIXELS: usize = 2_000_000;

/// Above this many pixels the extreme-speed settings are forced.
pub const EXTREME_IMAGE_PIXELS: usize = 5_000_000;

const LARGE_MAX_SEARCH_RADIUS: usize = 1;
const LARGE_MAX_TOP_K: usize = 5;
const LARGE_MAX_ITERATIONS: usize = 2;
const LARGE_MAX_PATCH_RADIUS: usize = 1;

const EXTREME_SEARCH_RADIUS: usize = 1;
const EXTREME_TOP_K: usize = 3;
const EXTREME_ITERATIONS: usize = 1;
const EXTREME_PATCH_RADIUS: usize = 1;

/// Every tunable of one enhancement run.
///
/// Missing fields deserialize to their defaults, so stored presets only need
/// to name what they change.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParameters {
    /// Gradient enhancement.
    pub enhance: EnhanceParams,
    /// Non-local gradient smoothing. The fast engine derives its patch and
    /// search sizes from these radii.
    pub denoise: ExactParams,
    /// Variational reconstruction.
    pub reconstruct: ReconstructParams,
    /// Engine override.
    pub engine: EngineSelection,
}

/// Which size policy was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TuningTier {
    Standard,
    Large,
    ExtremeSpeed,
}

impl TuningTier {
    pub fn for_pixel_count(pixel_count: usize) -> Self {
        if pixel_count > EXTREME_IMAGE_PIXELS {
            TuningTier::ExtremeSpeed
        } else if pixel_count > LARGE_IMAGE_PIXELS {
            TuningTier::Large
        } else {
            TuningTier::Standard
        }
    }
}

/// Parameters after the size policy, and the tier that produced them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TunedParameters {
    pub params: PipelineParameters,
    pub tier: TuningTier,
}

impl PipelineParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for on-demand enhancement in an interactive viewer.
    pub fn interactive() -> Self {
        let mut params = Self::default();
        params.denoise.search_radius = 3;
        params.denoise.patch_radius = 2;
        params.denoise.top_k = Some(15);
        params.denoise.count_target_mean = 18.0;
        params.reconstruct.iterations = 5;
        params
    }

    pub fn validate(&self) -> Result<(), String> {
        self.enhance
            .validate()
            .map_err(|e| format!("enhance: {}", e))?;
        self.denoise
            .validate()
            .map_err(|e| format!("denoise: {}", e))?;
        self.reconstruct
            .validate()
            .map_err(|e| format!("reconstruct: {}", e))?;
        Ok(())
    }

    /// Apply the size policy for an image of `pixel_count` pixels.
    pub fn auto_tune(&self, pixel_count: usize) -> TunedParameters {
        let tier = TuningTier::for_pixel_count(pixel_count);
        let mut params = *self;

        match tier {
            TuningTier::Standard => {}
            TuningTier::Large => {
                let d = &mut params.denoise;
                d.search_radius = d.search_radius.min(LARGE_MAX_SEARCH_RADIUS);
                d.patch_radius = d.patch_radius.min(LARGE_MAX_PATCH_RADIUS);
                d.top_k = Some(d.top_k.map_or(LARGE_MAX_TOP_K, |k| k.min(LARGE_MAX_TOP_K)));
                params.reconstruct.iterations = params.reconstruct.iterations.min(LARGE_MAX_ITERATIONS);
            }
            TuningTier::ExtremeSpeed => {
                params.denoise.search_radius = EXTREME_SEARCH_RADIUS;
                params.denoise.patch_radius = EXTREME_PATCH_RADIUS;
                params.denoise.top_k = Some(EXTREME_TOP_K);
                params.reconstruct.iterations = EXTREME_ITERATIONS;
            }
        }

        if params != *self {
            warn!(
                pixel_count,
                ?tier,
                search_radius = params.denoise.search_radius,
                patch_radius = params.denoise.patch_radius,
                top_k = ?params.denoise.top_k,
                iterations = params.reconstruct.iterations,
                "Large image: parameters reduced for speed"
            );
        }

        TunedParameters { params, tier }
    }
}
