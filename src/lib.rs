// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

#![allow(clippy::multiple_crate_versions)]

//! # Pipe Detection Library
//!
//! Counts pipes in photographs with a specialized YOLO-family ONNX detector,
//! provisioned from a remote artifact with caching, schema validation, and
//! fallback to a generic detection model.
//!
//! ## Features
//!
//! - **Model Provisioning** - Download once, cache locally, atomic writes,
//!   explicit invalidation
//! - **Schema Validation** - Confirms the loaded artifact really is the
//!   two-class pipe model, not a generic detector
//! - **Automatic Fallback** - Substitutes an always-available generic model
//!   when the specialized artifact cannot be provisioned
//! - **ONNX Runtime** - Cross-platform inference via ONNX Runtime
//! - **Annotation** - Detection boxes and a count banner on the result image
//!
//! ## Quick Start (Library)
//!
//! ```no_run
//! use pipe_detect::{ArtifactRef, ClassSchema, DetectionParams, PipeProvisioner, FALLBACK_MODEL_URL};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache_dir = dirs::cache_dir().unwrap().join("pipe-detect");
//!     let primary = ArtifactRef::resolve("https://example.com/pipe_model.onnx", &cache_dir)?;
//!     let fallback = ArtifactRef::resolve(FALLBACK_MODEL_URL, &cache_dir)?;
//!
//!     // Download (if needed), load, and schema-check the pipe model;
//!     // fall back to the generic model on any failure
//!     let provisioner = PipeProvisioner::default();
//!     let provisioned = provisioner.acquire(&primary, Some(&ClassSchema::pipe()), &fallback)?;
//!     if provisioned.provenance.is_fallback() {
//!         eprintln!("using the generic fallback model");
//!     }
//!
//!     let mut model = provisioned.handle;
//!     let image = image::open("pipes.jpg")?;
//!     let detections = model.detect(&image, &DetectionParams::default())?;
//!     println!("TOTAL: {}", detections.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Count pipes with the specialized model (downloaded and cached on first use)
//! pipe-detect count --source pipes.jpg --model-url https://example.com/pipe_model.onnx
//!
//! # Generic model only
//! pipe-detect count --source pipes.jpg
//!
//! # Custom thresholds, save the annotated image
//! pipe-detect count --source pipes.jpg --conf 0.6 --iou 0.5 --save
//!
//! # JSON output
//! pipe-detect count --source pipes.jpg --json
//!
//! # Force re-download of a cached model
//! pipe-detect clear-cache --model-url https://example.com/pipe_model.onnx
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`provisioner`] | [`Provisioner`] state machine: cache, load, validate, fall back |
//! | [`artifact`] | [`ArtifactRef`] identifier-to-cache-path mapping |
//! | [`schema`] | [`ClassSchema`] expected class-id contract |
//! | [`download`] | [`HttpFetcher`] atomic streaming downloads |
//! | [`model`] | [`PipeDetector`] ONNX session handle |
//! | [`inference`] | [`DetectionParams`] thresholds and sizing |
//! | [`results`] | [`Detections`] boxes, counts, summaries |
//! | [`preprocessing`] | Letterbox resize and tensor conversion |
//! | [`postprocessing`] | Detect-head decoding and NMS |
//! | [`error`] | [`DetectError`] taxonomy |
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `annotate` | Image annotation support (default) |

// Modules
#[cfg(feature = "annotate")]
pub mod annotate;
pub mod artifact;
pub mod cli;
pub mod download;
pub mod error;
pub mod inference;
pub mod metadata;
pub mod model;
pub mod postprocessing;
pub mod preprocessing;
pub mod provisioner;
pub mod results;
pub mod schema;

// Re-export main types for convenience
pub use artifact::ArtifactRef;
pub use download::{FALLBACK_MODEL_URL, Fetcher, HttpFetcher};
pub use error::{DetectError, Result};
pub use inference::DetectionParams;
pub use metadata::ModelMetadata;
pub use model::{OnnxLoader, PipeDetector};
pub use provisioner::{
    CacheOutcome, ModelCache, ModelHandle, ModelLoader, PipeProvisioner, Provenance, Provisioned,
    Provisioner,
};
pub use results::{Detection, Detections, Speed};
pub use schema::ClassSchema;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
