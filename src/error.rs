// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Error types for model provisioning and detection.
//!
//! Every provisioning stage has its own error kind so callers can tell a
//! network problem from a corrupt file from a semantically wrong model, and
//! react accordingly (retry, clear the cache, fix the identifier).

use std::fmt;
use std::path::PathBuf;

use crate::inference::DetectionParams;
use crate::schema::ClassSchema;

/// Result type alias for provisioning and detection operations.
pub type Result<T> = std::result::Result<T, DetectError>;

/// Main error type for the crate.
#[derive(Debug)]
pub enum DetectError {
    /// Network/transfer failure while fetching a model artifact.
    /// The artifact was never (fully) written to the cache path.
    Acquisition {
        /// Remote identifier of the artifact that failed to download.
        identifier: String,
        /// Underlying cause.
        reason: String,
    },
    /// The artifact is present on disk but could not be loaded
    /// (corrupt file, incompatible architecture, unsupported operator).
    Load {
        /// Cache path of the file that failed to load.
        path: PathBuf,
        /// Underlying cause.
        reason: String,
    },
    /// The artifact loaded fine but is not the intended specialized model:
    /// its class-id set does not match the expected schema.
    SchemaMismatch {
        /// Remote identifier of the offending artifact.
        identifier: String,
        /// The schema the caller asked for.
        expected: ClassSchema,
        /// The class ids the loaded model actually exposes, sorted.
        found: Vec<usize>,
    },
    /// Both the primary artifact and the fallback failed. Terminal for the
    /// request; wraps both causes.
    ProvisioningFailed {
        /// Why the primary artifact could not be provisioned.
        primary: Box<DetectError>,
        /// Why the fallback could not be provisioned either.
        fallback: Box<DetectError>,
    },
    /// Runtime failure during detection on an otherwise valid handle.
    /// Carries the image dimensions and parameters for reproducibility.
    Inference {
        /// Width of the input image in pixels.
        width: u32,
        /// Height of the input image in pixels.
        height: u32,
        /// Parameters the failing call was made with.
        params: DetectionParams,
        /// Underlying cause.
        reason: String,
    },
    /// Invalid configuration or parameters.
    Config(String),
    /// Error decoding or processing an image.
    Image(String),
    /// Wrapped `std::io::Error`.
    Io(std::io::Error),
}

impl fmt::Display for DetectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acquisition { identifier, reason } => {
                write!(f, "Failed to acquire model '{identifier}': {reason}")
            }
            Self::Load { path, reason } => {
                write!(f, "Failed to load model {}: {reason}", path.display())
            }
            Self::SchemaMismatch {
                identifier,
                expected,
                found,
            } => {
                write!(
                    f,
                    "Model '{identifier}' loaded but exposes class ids {found:?}, expected {expected}"
                )
            }
            Self::ProvisioningFailed { primary, fallback } => {
                write!(
                    f,
                    "Model provisioning failed. Primary: {primary}. Fallback: {fallback}"
                )
            }
            Self::Inference {
                width,
                height,
                params,
                reason,
            } => {
                write!(
                    f,
                    "Inference failed on {width}x{height} image ({params}): {reason}"
                )
            }
            Self::Config(msg) => write!(f, "Config error: {msg}"),
            Self::Image(msg) => write!(f, "Image error: {msg}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
        }
    }
}

impl std::error::Error for DetectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ProvisioningFailed { primary, .. } => Some(primary.as_ref()),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DetectError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<image::ImageError> for DetectError {
    fn from(err: image::ImageError) -> Self {
        Self::Image(err.to_string())
    }
}
