// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Detection parameters.
//!
//! [`DetectionParams`] controls a single inference call: confidence threshold,
//! IoU threshold for Non-Maximum Suppression (NMS), the detection cap, and the
//! square input size images are letterboxed to.

use std::fmt;

use serde::Serialize;

use crate::error::{DetectError, Result};

/// Parameters for a detection call.
///
/// Uses a builder pattern for convenient construction.
///
/// # Example
///
/// ```rust
/// use pipe_detect::DetectionParams;
///
/// let params = DetectionParams::new()
///     .with_confidence(0.5)
///     .with_iou(0.45)
///     .with_max_detections(100)
///     .with_input_size(640);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionParams {
    /// Confidence threshold in [0, 1]. Detections scoring below it are discarded.
    pub confidence: f32,
    /// IoU threshold in [0, 1] for NMS. Lower values suppress more overlaps.
    pub iou: f32,
    /// Maximum number of detections to return; the top scorers are kept.
    pub max_detections: usize,
    /// Square inference input size in pixels; images are letterboxed to it.
    pub input_size: usize,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            iou: 0.45,
            max_detections: 300,
            input_size: 640,
        }
    }
}

impl DetectionParams {
    /// Create parameters with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the confidence threshold.
    #[must_use]
    pub const fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Set the IoU threshold for NMS.
    #[must_use]
    pub const fn with_iou(mut self, iou: f32) -> Self {
        self.iou = iou;
        self
    }

    /// Set the maximum number of detections to return.
    #[must_use]
    pub const fn with_max_detections(mut self, max: usize) -> Self {
        self.max_detections = max;
        self
    }

    /// Set the square inference input size.
    #[must_use]
    pub const fn with_input_size(mut self, size: usize) -> Self {
        self.input_size = size;
        self
    }

    /// Validate parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns a config error when a threshold is outside [0, 1] or a count
    /// is zero.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(DetectError::Config(format!(
                "confidence threshold must be in [0, 1], got {}",
                self.confidence
            )));
        }
        if !(0.0..=1.0).contains(&self.iou) {
            return Err(DetectError::Config(format!(
                "IoU threshold must be in [0, 1], got {}",
                self.iou
            )));
        }
        if self.max_detections == 0 {
            return Err(DetectError::Config(
                "max_detections must be positive".to_string(),
            ));
        }
        if self.input_size == 0 {
            return Err(DetectError::Config(
                "input_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for DetectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "conf={:.2} iou={:.2} max_det={} imgsz={}",
            self.confidence, self.iou, self.max_detections, self.input_size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_default() {
        let params = DetectionParams::default();
        assert!((params.confidence - 0.5).abs() < f32::EPSILON);
        assert!((params.iou - 0.45).abs() < f32::EPSILON);
        assert_eq!(params.max_detections, 300);
        assert_eq!(params.input_size, 640);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_params_builder() {
        let params = DetectionParams::new()
            .with_confidence(0.25)
            .with_iou(0.6)
            .with_max_detections(50)
            .with_input_size(320);

        assert!((params.confidence - 0.25).abs() < f32::EPSILON);
        assert!((params.iou - 0.6).abs() < f32::EPSILON);
        assert_eq!(params.max_detections, 50);
        assert_eq!(params.input_size, 320);
    }

    #[test]
    fn test_params_validation() {
        assert!(DetectionParams::new().with_confidence(1.5).validate().is_err());
        assert!(DetectionParams::new().with_confidence(-0.1).validate().is_err());
        assert!(DetectionParams::new().with_iou(2.0).validate().is_err());
        assert!(DetectionParams::new().with_max_detections(0).validate().is_err());
        assert!(DetectionParams::new().with_input_size(0).validate().is_err());
    }

    #[test]
    fn test_params_display() {
        let params = DetectionParams::default();
        assert_eq!(params.to_string(), "conf=0.50 iou=0.45 max_det=300 imgsz=640");
    }
}
