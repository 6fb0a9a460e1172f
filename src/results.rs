// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Detection results.
//!
//! A [`Detections`] value is created fresh by each inference call, is
//! immutable, and is consumed immediately for rendering or counting. Nothing
//! is persisted unless the caller explicitly serializes it.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

/// Timing information for a detection call (in milliseconds).
#[derive(Debug, Clone, Default)]
pub struct Speed {
    /// Time spent on preprocessing.
    pub preprocess: Option<f64>,
    /// Time spent on model inference.
    pub inference: Option<f64>,
    /// Time spent on postprocessing.
    pub postprocess: Option<f64>,
}

impl Speed {
    /// Create a new Speed instance with all timings in milliseconds.
    #[must_use]
    pub const fn new(preprocess: f64, inference: f64, postprocess: f64) -> Self {
        Self {
            preprocess: Some(preprocess),
            inference: Some(inference),
            postprocess: Some(postprocess),
        }
    }

    /// Total time across all stages in milliseconds.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.preprocess.unwrap_or(0.0)
            + self.inference.unwrap_or(0.0)
            + self.postprocess.unwrap_or(0.0)
    }
}

/// A single detected object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    /// Bounding box [x1, y1, x2, y2] in original-image pixel space.
    pub bbox: [f32; 4],
    /// Confidence score in [0, 1].
    pub confidence: f32,
    /// Class id.
    pub class_id: usize,
}

impl Detection {
    /// Create a new detection.
    #[must_use]
    pub const fn new(bbox: [f32; 4], confidence: f32, class_id: usize) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
        }
    }

    /// Box center as (x, y).
    #[must_use]
    pub fn center(&self) -> (f32, f32) {
        (
            (self.bbox[0] + self.bbox[2]) / 2.0,
            (self.bbox[1] + self.bbox[3]) / 2.0,
        )
    }

    /// Box width in pixels.
    #[must_use]
    pub fn width(&self) -> f32 {
        self.bbox[2] - self.bbox[0]
    }

    /// Box height in pixels.
    #[must_use]
    pub fn height(&self) -> f32 {
        self.bbox[3] - self.bbox[1]
    }

    /// Box area in square pixels.
    #[must_use]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

/// Ordered detections from one inference call.
#[derive(Debug, Clone, Serialize)]
pub struct Detections {
    detections: Vec<Detection>,
    names: HashMap<usize, String>,
    orig_shape: (u32, u32),
    #[serde(skip)]
    speed: Speed,
}

impl Detections {
    /// Create a results container.
    ///
    /// `orig_shape` is the source image shape as (height, width).
    #[must_use]
    pub fn new(
        detections: Vec<Detection>,
        names: HashMap<usize, String>,
        orig_shape: (u32, u32),
    ) -> Self {
        Self {
            detections,
            names,
            orig_shape,
            speed: Speed::default(),
        }
    }

    pub(crate) fn set_speed(&mut self, speed: Speed) {
        self.speed = speed;
    }

    /// Number of detections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    /// Whether no objects were detected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Iterate over the detections in score order.
    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    /// The detections as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Detection] {
        &self.detections
    }

    /// Class id to name mapping of the model that produced these results.
    #[must_use]
    pub fn names(&self) -> &HashMap<usize, String> {
        &self.names
    }

    /// Source image shape as (height, width).
    #[must_use]
    pub const fn orig_shape(&self) -> (u32, u32) {
        self.orig_shape
    }

    /// Timing information for the call that produced these results.
    #[must_use]
    pub const fn speed(&self) -> &Speed {
        &self.speed
    }

    /// Detection counts per class id, in ascending id order.
    #[must_use]
    pub fn class_counts(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for det in &self.detections {
            *counts.entry(det.class_id).or_insert(0) += 1;
        }
        counts
    }

    /// Number of detections of a single class.
    #[must_use]
    pub fn count_of(&self, class_id: usize) -> usize {
        self.detections
            .iter()
            .filter(|d| d.class_id == class_id)
            .count()
    }

    /// Human-readable summary, e.g. "3 pipes, 1 coupling".
    #[must_use]
    pub fn verbose(&self) -> String {
        if self.is_empty() {
            return "(no detections)".to_string();
        }

        let mut parts = Vec::new();
        for (class_id, count) in self.class_counts() {
            let name = self
                .names
                .get(&class_id)
                .map_or_else(|| class_id.to_string(), Clone::clone);
            let name = if count > 1 { pluralize(&name) } else { name };
            parts.push(format!("{count} {name}"));
        }
        parts.join(", ")
    }
}

impl<'a> IntoIterator for &'a Detections {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Simple English pluralization for class names.
fn pluralize(word: &str) -> String {
    if word.ends_with('s') || word.ends_with("ch") || word.ends_with("sh") {
        format!("{word}es")
    } else if word.ends_with('y') && !word.ends_with("ey") && !word.ends_with("ay") {
        format!("{}ies", &word[..word.len() - 1])
    } else {
        format!("{word}s")
    }
}
