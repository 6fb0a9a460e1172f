// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Detection model loading and inference.
//!
//! [`PipeDetector`] wraps an ONNX Runtime session and is the concrete Model
//! Handle the provisioner produces: it exposes the class-name mapping used for
//! schema validation and the detection call.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use image::{DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;

use crate::error::{DetectError, Result};
use crate::inference::DetectionParams;
use crate::metadata::ModelMetadata;
use crate::postprocessing::decode_detections;
use crate::preprocessing::preprocess_image;
use crate::provisioner::{ModelHandle, ModelLoader};
use crate::results::{Detections, Speed};

/// A loaded, ready-to-run detection model.
///
/// # Example
///
/// ```no_run
/// use pipe_detect::{DetectionParams, PipeDetector};
///
/// let mut model = PipeDetector::load("pipe_model.onnx")?;
/// let image = image::open("pipes.jpg").map_err(pipe_detect::DetectError::from)?;
/// let detections = model.detect(&image, &DetectionParams::default())?;
/// println!("TOTAL: {}", detections.len());
/// # Ok::<(), pipe_detect::DetectError>(())
/// ```
pub struct PipeDetector {
    /// ONNX Runtime session.
    session: Session,
    /// Model metadata (class names, input size, stride).
    metadata: ModelMetadata,
    /// Input tensor name.
    input_name: String,
    /// First output tensor name.
    output_name: String,
}

impl PipeDetector {
    /// Load a detection model from an ONNX file.
    ///
    /// Class names, input size, and stride are read from the model's custom
    /// metadata properties. A model without class names cannot be
    /// schema-validated and is rejected as a load failure.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Load`] if the file is missing, unreadable, or
    /// not a usable detection model.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let load_error = |reason: String| DetectError::Load {
            path: path.to_path_buf(),
            reason,
        };

        if !path.exists() {
            return Err(load_error("model file not found".to_string()));
        }

        let session = Session::builder()
            .map_err(|e| load_error(format!("failed to create session builder: {e}")))?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(|e| load_error(format!("failed to set optimization level: {e}")))?
            .commit_from_file(path)
            .map_err(|e| load_error(e.to_string()))?;

        let metadata = Self::extract_metadata(&session)
            .map_err(|e| load_error(format!("failed to parse model metadata: {e}")))?;
        if metadata.names.is_empty() {
            return Err(load_error(
                "model metadata has no class names; cannot identify its classes".to_string(),
            ));
        }

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "images".to_string());
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "output0".to_string());

        Ok(Self {
            session,
            metadata,
            input_name,
            output_name,
        })
    }

    /// Extract metadata from the ONNX session's custom properties.
    ///
    /// Ultralytics exports store each field under its own key; combine the
    /// interesting ones into one string for the parser. Some exporters store
    /// everything under a single combined key instead.
    fn extract_metadata(session: &Session) -> Result<ModelMetadata> {
        let model_metadata = session
            .metadata()
            .map_err(|e| DetectError::Config(format!("failed to read model metadata: {e}")))?;

        let keys = ["stride", "task", "imgsz", "names", "channels"];
        let mut parts = Vec::new();
        for key in &keys {
            if let Ok(Some(value)) = model_metadata.custom(key) {
                parts.push(format!("{key}: {value}"));
            }
        }

        if parts.is_empty() {
            // Single combined key fallback
            for key in &["metadata", "model_metadata"] {
                if let Ok(Some(value)) = model_metadata.custom(key) {
                    return ModelMetadata::from_metadata_str(&value);
                }
            }
            return Ok(ModelMetadata::default());
        }

        ModelMetadata::from_metadata_str(&parts.join("\n"))
    }

    /// Run detection on a decoded image.
    ///
    /// Guarantees: at most `params.max_detections` results, each with
    /// confidence at least `params.confidence`. A runtime failure is surfaced
    /// as [`DetectError::Inference`] with the image dimensions and parameters
    /// used; it is never silently turned into an empty result.
    ///
    /// # Errors
    ///
    /// Returns a config error for invalid parameters, an image error if
    /// preprocessing fails, or an inference error from the runtime.
    pub fn detect(&mut self, image: &DynamicImage, params: &DetectionParams) -> Result<Detections> {
        params.validate()?;

        let (width, height) = image.dimensions();

        let start_preprocess = Instant::now();
        let preprocess = preprocess_image(image, params.input_size)?;
        let preprocess_time = start_preprocess.elapsed().as_secs_f64() * 1000.0;

        let start_inference = Instant::now();
        let (output, output_shape) =
            self.run_session(&preprocess.tensor)
                .map_err(|reason| DetectError::Inference {
                    width,
                    height,
                    params: params.clone(),
                    reason,
                })?;
        let inference_time = start_inference.elapsed().as_secs_f64() * 1000.0;

        let start_postprocess = Instant::now();
        let mut detections = decode_detections(
            &output,
            &output_shape,
            &preprocess,
            params,
            &self.metadata.names,
        )?;
        let postprocess_time = start_postprocess.elapsed().as_secs_f64() * 1000.0;

        detections.set_speed(Speed::new(preprocess_time, inference_time, postprocess_time));
        Ok(detections)
    }

    /// Run detection on an image file.
    ///
    /// # Errors
    ///
    /// Returns an image error if the file can't be decoded, otherwise as
    /// [`Self::detect`].
    pub fn detect_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        params: &DetectionParams,
    ) -> Result<Detections> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|e| {
            DetectError::Image(format!("failed to load image {}: {e}", path.display()))
        })?;
        self.detect(&image, params)
    }

    /// Run the ONNX session on a preprocessed tensor.
    fn run_session(
        &mut self,
        input: &Array4<f32>,
    ) -> std::result::Result<(Vec<f32>, Vec<usize>), String> {
        let input_contiguous = input.as_standard_layout();
        let input_tensor = TensorRef::from_array_view(&input_contiguous)
            .map_err(|e| format!("failed to create input tensor: {e}"))?;

        let inputs = ort::inputs![&self.input_name => input_tensor];
        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| format!("session run failed: {e}"))?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| format!("output '{}' not found", self.output_name))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| format!("failed to extract output: {e}"))?;

        let shape_vec: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        Ok((data.to_vec(), shape_vec))
    }

    /// The model's class id to name mapping.
    #[must_use]
    pub fn names(&self) -> &HashMap<usize, String> {
        &self.metadata.names
    }

    /// Number of classes.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.metadata.num_classes()
    }

    /// The model's native input size as (height, width).
    #[must_use]
    pub const fn input_size(&self) -> (usize, usize) {
        self.metadata.imgsz
    }

    /// The model's stride.
    #[must_use]
    pub const fn stride(&self) -> u32 {
        self.metadata.stride
    }

    /// The parsed model metadata.
    #[must_use]
    pub const fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

impl ModelHandle for PipeDetector {
    fn names(&self) -> &HashMap<usize, String> {
        &self.metadata.names
    }
}

impl std::fmt::Debug for PipeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeDetector")
            .field("num_classes", &self.metadata.num_classes())
            .field("imgsz", &self.metadata.imgsz)
            .field("stride", &self.metadata.stride)
            .finish()
    }
}

/// Loads [`PipeDetector`] handles from ONNX files. The production
/// [`ModelLoader`] used by the provisioner.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxLoader;

impl ModelLoader for OnnxLoader {
    type Handle = PipeDetector;

    fn load(&self, path: &Path) -> Result<Self::Handle> {
        PipeDetector::load(path)
    }
}
