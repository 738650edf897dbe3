use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stages of one enhancement run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    Normalize,
    Enhance,
    Denoise,
    Reconstruct,
    Denormalize,
}

impl PipelineStage {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Normalize => "normalize",
            PipelineStage::Enhance => "enhance",
            PipelineStage::Denoise => "denoise",
            PipelineStage::Reconstruct => "reconstruct",
            PipelineStage::Denormalize => "denormalize",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnhanceError {
    #[error("Invalid input image: {0}")]
    InvalidInput(String),
    #[error("Invalid pipeline parameters: {0}")]
    InvalidParameters(String),
    #[error("Stage {stage} failed: {message}")]
    StageFailure {
        stage: PipelineStage,
        message: String,
    },
    #[error("Enhancement cancelled after stage {after}")]
    Cancelled { after: PipelineStage },
}

impl EnhanceError {
    /// True for cooperative cancellation, as opposed to a computation fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EnhanceError::Cancelled { .. })
    }
}

pub type EnhanceResult<T> = std::result::Result<T, EnhanceError>;
