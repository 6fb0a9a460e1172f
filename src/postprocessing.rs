// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Post-processing of raw detection model output.
//!
//! Decodes the detect head (both `[1, 4+nc, N]` and `[1, N, 4+nc]` layouts),
//! filters by confidence, runs per-class Non-Maximum Suppression, caps the
//! result at the detection limit, and maps box coordinates back to
//! original-image pixel space.

use std::collections::HashMap;

use ndarray::Array2;

use crate::error::{DetectError, Result};
use crate::inference::DetectionParams;
use crate::preprocessing::{PreprocessResult, clip_coords, scale_coords};
use crate::results::{Detection, Detections};

/// Decode raw model output into [`Detections`].
///
/// Guarantees: the result length never exceeds `params.max_detections`, and
/// every detection's confidence is at least `params.confidence`.
///
/// # Errors
///
/// An output tensor whose shape does not match the model's class count is an
/// inference failure, not an empty result; it is surfaced as
/// [`DetectError::Inference`] with the image dimensions and parameters used.
pub fn decode_detections(
    output: &[f32],
    output_shape: &[usize],
    preprocess: &PreprocessResult,
    params: &DetectionParams,
    names: &HashMap<usize, String>,
) -> Result<Detections> {
    let inference_error = |reason: String| DetectError::Inference {
        width: preprocess.orig_shape.1,
        height: preprocess.orig_shape.0,
        params: params.clone(),
        reason,
    };

    let num_features = 4 + names.len();
    let (num_predictions, transposed) = parse_detect_shape(output_shape, num_features)
        .ok_or_else(|| {
            inference_error(format!(
                "unexpected output shape {output_shape:?} for {} classes",
                names.len()
            ))
        })?;

    if output.len() != num_features * num_predictions {
        return Err(inference_error(format!(
            "output has {} values, expected {} ({} features x {} predictions)",
            output.len(),
            num_features * num_predictions,
            num_features,
            num_predictions
        )));
    }

    let output_2d = if transposed {
        // [1, num_preds, num_features] is already row-per-prediction
        Array2::from_shape_vec((num_predictions, num_features), output.to_vec())
    } else {
        Array2::from_shape_vec((num_features, num_predictions), output.to_vec())
            .map(|arr| arr.t().to_owned())
    }
    .map_err(|e| inference_error(format!("failed to reshape output: {e}")))?;

    let mut candidates = Vec::new();
    for row in output_2d.rows() {
        // Best class across the score columns; NaN scores rank lowest
        let (best_class, best_score) = row
            .iter()
            .skip(4)
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Less))
            .map(|(idx, &score)| (idx, if score.is_nan() { 0.0 } else { score }))
            .unwrap_or((0, 0.0));

        if best_score < params.confidence {
            continue;
        }

        // Model outputs center-format boxes
        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        let xyxy = [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0];

        let scaled = scale_coords(&xyxy, preprocess.scale, preprocess.padding);
        let clipped = clip_coords(&scaled, preprocess.orig_shape);

        candidates.push(Detection::new(clipped, best_score, best_class));
    }

    let keep = nms_per_class(&candidates, params.iou);
    let detections: Vec<Detection> = keep
        .into_iter()
        .take(params.max_detections)
        .map(|i| candidates[i])
        .collect();

    Ok(Detections::new(
        detections,
        names.clone(),
        preprocess.orig_shape,
    ))
}

/// Determine the prediction count and layout of the detect-head output.
///
/// Returns `(num_predictions, transposed)` where `transposed` means the
/// layout is prediction-major (`[.., N, 4+nc]`).
fn parse_detect_shape(shape: &[usize], num_features: usize) -> Option<(usize, bool)> {
    let (a, b) = match shape {
        [a, b] => (*a, *b),
        [1, a, b] => (*a, *b),
        _ => return None,
    };

    if a == num_features {
        Some((b, false))
    } else if b == num_features {
        Some((a, true))
    } else {
        None
    }
}

/// Intersection over Union of two xyxy boxes.
fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = ((x2 - x1).max(0.0)) * ((y2 - y1).max(0.0));

    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 { intersection / union } else { 0.0 }
}

/// Per-class Non-Maximum Suppression.
///
/// Only suppresses boxes within the same class, matching Ultralytics
/// behavior. Returns indices of detections to keep, in descending score order.
fn nms_per_class(detections: &[Detection], iou_threshold: f32) -> Vec<usize> {
    if detections.is_empty() {
        return vec![];
    }

    let mut indices: Vec<usize> = (0..detections.len()).collect();
    indices.sort_by(|&a, &b| {
        detections[b]
            .confidence
            .partial_cmp(&detections[a].confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = vec![];
    let mut suppressed = vec![false; detections.len()];

    for &i in &indices {
        if suppressed[i] {
            continue;
        }
        keep.push(i);

        for &j in &indices {
            if !suppressed[j] && i != j && detections[j].class_id == detections[i].class_id {
                let iou = calculate_iou(&detections[i].bbox, &detections[j].bbox);
                if iou > iou_threshold {
                    suppressed[j] = true;
                }
            }
        }
    }

    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn pipe_names() -> HashMap<usize, String> {
        let mut names = HashMap::new();
        names.insert(0, "pipe".to_string());
        names.insert(1, "coupling".to_string());
        names
    }

    /// Identity preprocessing for a 64x64 image.
    fn identity_preprocess() -> PreprocessResult {
        PreprocessResult {
            tensor: Array4::zeros((1, 3, 64, 64)),
            orig_shape: (64, 64),
            scale: (1.0, 1.0),
            padding: (0.0, 0.0),
        }
    }

    /// Build a features-major output ([features, preds]) from prediction rows
    /// of [cx, cy, w, h, score0, score1].
    fn features_major(rows: &[[f32; 6]]) -> Vec<f32> {
        let mut out = vec![0.0; 6 * rows.len()];
        for (i, row) in rows.iter().enumerate() {
            for (f, &v) in row.iter().enumerate() {
                out[f * rows.len() + i] = v;
            }
        }
        out
    }

    #[test]
    fn test_confidence_floor_and_class_selection() {
        let rows = [
            [32.0, 32.0, 10.0, 10.0, 0.9, 0.1], // class 0, kept
            [10.0, 10.0, 8.0, 8.0, 0.2, 0.05],  // below threshold
            [50.0, 50.0, 8.0, 8.0, 0.1, 0.7],   // class 1, kept
        ];
        let output = features_major(&rows);
        let params = DetectionParams::new().with_confidence(0.5);

        let dets = decode_detections(
            &output,
            &[1, 6, 3],
            &identity_preprocess(),
            &params,
            &pipe_names(),
        )
        .unwrap();

        assert_eq!(dets.len(), 2);
        assert!(dets.iter().all(|d| d.confidence >= 0.5));
        assert_eq!(dets.count_of(0), 1);
        assert_eq!(dets.count_of(1), 1);
    }

    #[test]
    fn test_max_detections_cap() {
        let rows: Vec<[f32; 6]> = (0..10)
            .map(|i| {
                let c = 5.0 + (i as f32) * 6.0;
                [c, c, 4.0, 4.0, 0.9, 0.0]
            })
            .collect();
        let output = features_major(&rows);
        let params = DetectionParams::new()
            .with_confidence(0.5)
            .with_max_detections(3);

        let dets = decode_detections(
            &output,
            &[1, 6, 10],
            &identity_preprocess(),
            &params,
            &pipe_names(),
        )
        .unwrap();

        assert_eq!(dets.len(), 3);
    }

    #[test]
    fn test_transposed_layout() {
        // [1, preds, features] row-major
        let output = vec![
            32.0, 32.0, 10.0, 10.0, 0.9, 0.1, // pred 0
            50.0, 50.0, 8.0, 8.0, 0.1, 0.7, // pred 1
        ];
        let params = DetectionParams::new().with_confidence(0.5);

        let dets = decode_detections(
            &output,
            &[1, 2, 6],
            &identity_preprocess(),
            &params,
            &pipe_names(),
        )
        .unwrap();

        assert_eq!(dets.len(), 2);
    }

    #[test]
    fn test_bad_shape_is_inference_error() {
        let result = decode_detections(
            &[0.0; 12],
            &[1, 3, 4],
            &identity_preprocess(),
            &DetectionParams::default(),
            &pipe_names(),
        );
        assert!(matches!(result, Err(DetectError::Inference { .. })));
    }

    #[test]
    fn test_calculate_iou() {
        let box1 = [0.0, 0.0, 10.0, 10.0];
        let box2 = [5.0, 5.0, 15.0, 15.0];
        let iou = calculate_iou(&box1, &box2);
        assert!((iou - 0.142_857).abs() < 0.001); // 25 / (100 + 100 - 25)
    }

    #[test]
    fn test_nms_suppresses_same_class_only() {
        let dets = vec![
            Detection::new([0.0, 0.0, 10.0, 10.0], 0.9, 0),
            Detection::new([1.0, 1.0, 11.0, 11.0], 0.8, 0), // overlaps class 0, suppressed
            Detection::new([1.0, 1.0, 11.0, 11.0], 0.7, 1), // overlaps but different class
        ];
        let keep = nms_per_class(&dets, 0.5);
        assert_eq!(keep.len(), 2);
        assert!(keep.contains(&0));
        assert!(keep.contains(&2));
    }
}
