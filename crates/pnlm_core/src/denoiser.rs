//! Interchangeable gradient-field denoising engines.
//!
//! The orchestrator resolves an [`EngineSelection`] once per run into a
//! [`DenoiserEngine`] and hands it the enhanced gradient field.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::differential::GradientField;
use crate::exact_nlm::{ExactGradientDenoiser, ExactParams};
use crate::fast_nlm::{FastGradientDenoiser, FastParams};
use crate::float_trait::PnlmFloat;
use crate::poisson_distance::PoissonDistanceTable;

/// Caller override for engine choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EngineSelection {
    /// Let the pipeline decide (currently always the fast engine).
    #[default]
    Auto,
    ForceExact,
    ForceFast,
}

impl EngineSelection {
    pub fn resolve(self) -> EngineKind {
        match self {
            EngineSelection::ForceExact => EngineKind::Exact,
            EngineSelection::Auto | EngineSelection::ForceFast => EngineKind::Fast,
        }
    }
}

/// The engine that actually ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineKind {
    Exact,
    Fast,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Exact => f.write_str("exact"),
            EngineKind::Fast => f.write_str("fast"),
        }
    }
}

/// A gradient-field smoother.
///
/// `progress` receives the completed fraction of this stage in `[0, 1]` on the
/// calling thread.
pub trait GradientDenoiser {
    fn kind(&self) -> EngineKind;

    fn denoise<F: PnlmFloat>(
        &self,
        field: &GradientField<F>,
        progress: &mut dyn FnMut(f32),
    ) -> GradientField<F>;
}

impl GradientDenoiser for ExactGradientDenoiser {
    fn kind(&self) -> EngineKind {
        EngineKind::Exact
    }

    fn denoise<F: PnlmFloat>(
        &self,
        field: &GradientField<F>,
        progress: &mut dyn FnMut(f32),
    ) -> GradientField<F> {
        ExactGradientDenoiser::denoise(self, field, progress)
    }
}

impl GradientDenoiser for FastGradientDenoiser {
    fn kind(&self) -> EngineKind {
        EngineKind::Fast
    }

    fn denoise<F: PnlmFloat>(
        &self,
        field: &GradientField<F>,
        progress: &mut dyn FnMut(f32),
    ) -> GradientField<F> {
        FastGradientDenoiser::denoise(self, field, progress)
    }
}

/// The resolved engine for one run.
#[derive(Debug, Clone)]
pub enum DenoiserEngine {
    Exact(ExactGradientDenoiser),
    Fast(FastGradientDenoiser),
}

impl DenoiserEngine {
    /// Build the engine for `selection`. The fast engine derives its
    /// parameters from the exact engine's radii.
    pub fn select(
        selection: EngineSelection,
        params: &ExactParams,
        table: Arc<PoissonDistanceTable>,
    ) -> Self {
        match selection.resolve() {
            EngineKind::Exact => DenoiserEngine::Exact(ExactGradientDenoiser::new(*params, table)),
            EngineKind::Fast => DenoiserEngine::Fast(FastGradientDenoiser::new(
                FastParams::from_radii(params.search_radius, params.patch_radius),
            )),
        }
    }
}

impl GradientDenoiser for DenoiserEngine {
    fn kind(&self) -> EngineKind {
        match self {
            DenoiserEngine::Exact(e) => e.kind(),
            DenoiserEngine::Fast(e) => e.kind(),
        }
    }

    fn denoise<F: PnlmFloat>(
        &self,
        field: &GradientField<F>,
        progress: &mut dyn FnMut(f32),
    ) -> GradientField<F> {
        match self {
            DenoiserEngine::Exact(e) => GradientDenoiser::denoise(e, field, progress),
            DenoiserEngine::Fast(e) => GradientDenoiser::denoise(e, field, progress),
        }
    }
}
