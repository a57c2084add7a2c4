// error.rs - Structured errors for the orchestration APIs
//
// Per-pixel kernels never fail; only the outer entry points return these.

use crate::scene::LightId;

#[derive(Debug, thiserror::Error)]
pub enum RelightError {
    #[error("No depth buffer available")]
    NoDepthAvailable,

    #[error("No image available")]
    NoImageAvailable,

    #[error("Invalid light type: {0}")]
    InvalidLightType(u32),

    #[error("Unknown light: {0:?}")]
    UnknownLight(LightId),

    #[error("Buffer size mismatch: expected {expected} elements, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Frame size mismatch: expected {expected:?}, got {actual:?}")]
    FrameSizeMismatch { expected: (usize, usize), actual: (usize, usize) },

    #[error("Segmentation fusion failed: {0}")]
    Segmentation(#[from] SegmentationError),

    #[error("Invalid material table: {0}")]
    MaterialTable(#[from] serde_json::Error),

    #[error("Material table has no `_default` entry")]
    MissingDefaultMaterial,

    #[error("Render request superseded by a newer one")]
    Superseded,
}

/// Why a segmentation result could not be fused with depth.
#[derive(Debug, thiserror::Error)]
pub enum SegmentationError {
    #[error("Segmentation contains no segments")]
    Empty,

    #[error("Segment `{label}` has an empty mask")]
    EmptyMask { label: String },

    #[error("Segment `{label}` has an invalid mask: {reason}")]
    InvalidMask { label: String, reason: String },
}
