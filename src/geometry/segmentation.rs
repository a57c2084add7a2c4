// segmentation.rs - Labeled masks handed over by the segmentation collaborator
//
// Masks keep their own resolution; the fuser maps them onto the depth grid.

use ndarray::Array2;

use crate::error::SegmentationError;

#[derive(Clone, Debug)]
pub struct Segment {
    pub label: String,
    pub class_id: u32,
    /// Alpha mask indexed [row, col], values in [0, 1]
    pub mask: Array2<f32>,
    pub confidence: f32,
}

impl Segment {
    pub fn new(label: impl Into<String>, class_id: u32, mask: Array2<f32>, confidence: f32) -> Self {
        Self { label: label.into(), class_id, mask, confidence }
    }

    /// Build from a row-major alpha slice of `mask_w * mask_h` values
    pub fn from_alpha(
        label: impl Into<String>,
        class_id: u32,
        mask_w: usize,
        mask_h: usize,
        alpha: Vec<f32>,
        confidence: f32,
    ) -> Result<Self, SegmentationError> {
        let label = label.into();
        let mask = Array2::from_shape_vec((mask_h, mask_w), alpha).map_err(|e| SegmentationError::InvalidMask {
            label: label.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self { label, class_id, mask, confidence })
    }

    /// (width, height) of the mask
    pub fn mask_dims(&self) -> (usize, usize) {
        let (rows, cols) = self.mask.dim();
        (cols, rows)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SegmentationResult {
    pub segments: Vec<Segment>,
}

impl SegmentationResult {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Reject results the fuser cannot rasterize
    pub fn validate(&self) -> Result<(), SegmentationError> {
        if self.segments.is_empty() {
            return Err(SegmentationError::Empty);
        }
        for seg in &self.segments {
            if seg.mask.is_empty() {
                return Err(SegmentationError::EmptyMask { label: seg.label.clone() });
            }
            if seg.mask.iter().any(|v| !v.is_finite()) {
                return Err(SegmentationError::InvalidMask {
                    label: seg.label.clone(),
                    reason: "non-finite alpha".into(),
                });
            }
        }
        Ok(())
    }
}
