//! End-to-end enhancement of a 16-bit radiograph.
//!
//! A run is strictly linear:
//! normalize -> enhance -> denoise (exact | fast) -> reconstruct -> denormalize.
//!
//! - Parameters are validated and size-tuned once, before any stage runs.
//! - Cancellation is checked between stages only.
//! - A stage that panics or leaves non-finite values aborts the run with
//!   [`EnhanceError::StageFailure`]. [`Enhancer::enhance_or_original`] turns
//!   any failure into an untouched copy of the input.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use ndarray::{Array2, ArrayView2};
use tracing::{error, info, warn};

use crate::control::{CancellationToken, ProgressReporter};
use crate::denoiser::{DenoiserEngine, EngineKind, GradientDenoiser};
use crate::differential::GradientField;
use crate::enhancement::enhance_gradient;
use crate::error::{EnhanceError, EnhanceResult, PipelineStage};
use crate::normalization::{denormalize, normalize, NormalizationContext, NormalizationMode, OutputRange};
use crate::params::{PipelineParameters, TuningTier};
use crate::poisson_distance::PoissonDistanceTable;
use crate::reconstruction::reconstruct;
use crate::utils::all_finite;

// =============================================================================
// Progress milestones
// =============================================================================

const PROGRESS_NORMALIZED: f32 = 0.3;
const PROGRESS_ENHANCED: f32 = 0.4;
const PROGRESS_DENOISED: f32 = 0.8;
const PROGRESS_RECONSTRUCTED: f32 = 0.9;
const PROGRESS_DONE: f32 = 1.0;

// =============================================================================
// Types
// =============================================================================

/// Everything one run needs besides the image.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnhanceRequest {
    pub params: PipelineParameters,
    pub normalization: NormalizationMode,
    pub output_range: OutputRange,
}

impl EnhanceRequest {
    pub fn new(params: PipelineParameters) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Normalize with a display window instead of percentiles.
    pub fn with_window(mut self, center: f64, width: f64) -> Self {
        self.normalization = NormalizationMode::Window { center, width };
        self
    }
}

/// Output image plus the intermediate fields of a run.
#[derive(Debug, Clone)]
pub struct EnhanceReport {
    pub image: Array2<u16>,
    pub enhanced_gradient: GradientField<f32>,
    pub denoised_gradient: GradientField<f32>,
    pub context: NormalizationContext,
    pub engine: EngineKind,
    pub tier: TuningTier,
    /// Parameters after size tuning.
    pub effective: PipelineParameters,
}

// =============================================================================
// Stage helpers
// =============================================================================

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn stage_failure(stage: PipelineStage, message: String) -> EnhanceError {
    error!(stage = %stage, %message, "Enhancement stage failed");
    EnhanceError::StageFailure { stage, message }
}

/// Run one stage, converting a panic into a stage failure and logging time.
fn run_stage<T>(stage: PipelineStage, body: impl FnOnce() -> T) -> EnhanceResult<T> {
    let start = Instant::now();
    let out = panic::catch_unwind(AssertUnwindSafe(body))
        .map_err(|payload| stage_failure(stage, panic_message(payload.as_ref())))?;
    info!(
        stage = %stage,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Stage complete"
    );
    Ok(out)
}

fn ensure_finite(stage: PipelineStage, finite: bool) -> EnhanceResult<()> {
    if finite {
        Ok(())
    } else {
        Err(stage_failure(
            stage,
            "non-finite values in stage output".to_string(),
        ))
    }
}

fn check_cancel(cancel: Option<&CancellationToken>, after: PipelineStage) -> EnhanceResult<()> {
    match cancel {
        Some(token) if token.is_cancelled() => {
            info!(after = %after, "Enhancement cancelled");
            Err(EnhanceError::Cancelled { after })
        }
        _ => Ok(()),
    }
}

// =============================================================================
// Enhancer
// =============================================================================

/// Runs the enhancement pipeline against an injected distance table.
#[derive(Debug, Clone)]
pub struct Enhancer {
    table: Arc<PoissonDistanceTable>,
}

impl Default for Enhancer {
    fn default() -> Self {
        Self::new()
    }
}

impl Enhancer {
    /// Enhancer using the process-wide distance table.
    pub fn new() -> Self {
        Self::with_distance_table(PoissonDistanceTable::shared())
    }

    pub fn with_distance_table(table: Arc<PoissonDistanceTable>) -> Self {
        Self { table }
    }

    pub fn distance_table(&self) -> &Arc<PoissonDistanceTable> {
        &self.table
    }

    /// Enhance `image` and return the new image.
    pub fn enhance(
        &self,
        image: ArrayView2<u16>,
        request: &EnhanceRequest,
        progress: Option<&mut dyn FnMut(f32)>,
        cancel: Option<&CancellationToken>,
    ) -> EnhanceResult<Array2<u16>> {
        self.enhance_detailed(image, request, progress, cancel)
            .map(|report| report.image)
    }

    /// Enhance `image`; on any failure return a copy of the input and the error.
    pub fn enhance_or_original(
        &self,
        image: ArrayView2<u16>,
        request: &EnhanceRequest,
        progress: Option<&mut dyn FnMut(f32)>,
        cancel: Option<&CancellationToken>,
    ) -> (Array2<u16>, Option<EnhanceError>) {
        match self.enhance(image, request, progress, cancel) {
            Ok(out) => (out, None),
            Err(err) => {
                warn!(%err, "Returning the original image");
                (image.to_owned(), Some(err))
            }
        }
    }

    /// Enhance `image` and keep the intermediate fields.
    pub fn enhance_detailed(
        &self,
        image: ArrayView2<u16>,
        request: &EnhanceRequest,
        progress: Option<&mut dyn FnMut(f32)>,
        cancel: Option<&CancellationToken>,
    ) -> EnhanceResult<EnhanceReport> {
        let (rows, cols) = image.dim();
        if rows == 0 || cols == 0 {
            return Err(EnhanceError::InvalidInput(format!(
                "image must have a non-zero area, got {}x{}",
                rows, cols
            )));
        }
        request
            .params
            .validate()
            .map_err(EnhanceError::InvalidParameters)?;
        request
            .normalization
            .validate()
            .map_err(EnhanceError::InvalidParameters)?;
        if request.output_range.min > request.output_range.max {
            return Err(EnhanceError::InvalidParameters(
                "output range min exceeds max".to_string(),
            ));
        }

        let run_start = Instant::now();
        let mut reporter = ProgressReporter::new(progress);
        let tuned = request.params.auto_tune(rows * cols);
        let effective = tuned.params;
        let engine = DenoiserEngine::select(
            effective.engine,
            &effective.denoise,
            Arc::clone(&self.table),
        );
        info!(
            rows,
            cols,
            tier = ?tuned.tier,
            engine = %engine.kind(),
            "Starting enhancement"
        );

        let (field, context) = run_stage(PipelineStage::Normalize, || {
            normalize(image, request.normalization)
        })?;
        reporter.report(PROGRESS_NORMALIZED);
        check_cancel(cancel, PipelineStage::Normalize)?;

        let enhanced = run_stage(PipelineStage::Enhance, || {
            enhance_gradient(field.view(), &effective.enhance)
        })?;
        ensure_finite(PipelineStage::Enhance, enhanced.is_finite())?;
        reporter.report(PROGRESS_ENHANCED);
        check_cancel(cancel, PipelineStage::Enhance)?;

        let denoised = run_stage(PipelineStage::Denoise, || {
            engine.denoise(&enhanced, &mut |p| {
                reporter.report_within(PROGRESS_ENHANCED, PROGRESS_DENOISED, p)
            })
        })?;
        ensure_finite(PipelineStage::Denoise, denoised.is_finite())?;
        reporter.report(PROGRESS_DENOISED);
        check_cancel(cancel, PipelineStage::Denoise)?;

        let restored = run_stage(PipelineStage::Reconstruct, || {
            reconstruct(field.view(), &denoised, &effective.reconstruct)
        })?;
        ensure_finite(PipelineStage::Reconstruct, all_finite(restored.view()))?;
        reporter.report(PROGRESS_RECONSTRUCTED);
        check_cancel(cancel, PipelineStage::Reconstruct)?;

        let output = run_stage(PipelineStage::Denormalize, || {
            denormalize(restored.view(), &context, request.output_range)
        })?;
        reporter.report(PROGRESS_DONE);

        info!(
            elapsed_ms = run_start.elapsed().as_secs_f64() * 1000.0,
            "Enhancement complete"
        );

        Ok(EnhanceReport {
            image: output,
            enhanced_gradient: enhanced,
            denoised_gradient: denoised,
            context,
            engine: engine.kind(),
            tier: tuned.tier,
            effective,
        })
    }
}

/// Enhance with percentile normalization and the shared distance table.
pub fn enhance_xray(
    image: ArrayView2<u16>,
    params: &PipelineParameters,
) -> EnhanceResult<Array2<u16>> {
    Enhancer::new().enhance(image, &EnhanceRequest::new(*params), None, None)
}
