// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::fs;
use std::path::PathBuf;
use std::process;

use crate::artifact::ArtifactRef;
use crate::cli::args::{ClearCacheArgs, CountArgs};
use crate::cli::logging;
use crate::inference::DetectionParams;
use crate::model::PipeDetector;
use crate::provisioner::{PipeProvisioner, Provenance, Provisioned};
use crate::schema::ClassSchema;
use crate::{error, info, success, verbose, warn};

/// Default cache directory for model artifacts.
fn resolve_cache_dir(cache_dir: Option<PathBuf>) -> PathBuf {
    cache_dir.unwrap_or_else(|| {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("pipe-detect")
    })
}

/// Run pipe detection and counting on an image.
#[allow(clippy::needless_pass_by_value)]
pub fn run_count(args: CountArgs) {
    logging::set_verbose(args.verbose);

    let params = DetectionParams::new()
        .with_confidence(args.conf)
        .with_iou(args.iou)
        .with_max_detections(args.max_det)
        .with_input_size(args.imgsz);
    if let Err(e) = params.validate() {
        error!("{e}");
        process::exit(2);
    }

    let cache_dir = resolve_cache_dir(args.cache_dir.clone());
    let fallback = match ArtifactRef::resolve(&args.fallback_url, &cache_dir) {
        Ok(r) => r,
        Err(e) => {
            error!("{e}");
            process::exit(2);
        }
    };

    let provisioner = PipeProvisioner::default();

    let mut model: PipeDetector = match &args.model_url {
        Some(url) => {
            let primary = match ArtifactRef::resolve(url, &cache_dir) {
                Ok(r) => r,
                Err(e) => {
                    error!("{e}");
                    process::exit(2);
                }
            };
            match provisioner.acquire(&primary, Some(&ClassSchema::pipe()), &fallback) {
                Ok(Provisioned { handle, provenance }) => {
                    match provenance {
                        Provenance::Primary => {
                            verbose!("Loaded pipe model from '{url}'");
                        }
                        Provenance::Fallback { primary_cause } => {
                            warn!(
                                "Pipe model unavailable, using the generic fallback model. \
                                 Counts reflect generic object classes. Cause: {primary_cause}"
                            );
                        }
                    }
                    handle
                }
                Err(e) => {
                    // Primary and fallback both failed; nothing to run with
                    error!("{e}");
                    process::exit(1);
                }
            }
        }
        None => {
            warn!(
                "'model-url' argument is missing. Using the generic model '{}'.",
                args.fallback_url
            );
            match provisioner.provision(&fallback, None) {
                Ok(handle) => handle,
                Err(e) => {
                    error!("{e}");
                    process::exit(1);
                }
            }
        }
    };

    let image = match image::open(&args.source) {
        Ok(img) => img,
        Err(e) => {
            error!("Failed to load image {}: {e}", args.source.display());
            process::exit(1);
        }
    };

    let detections = match model.detect(&image, &params) {
        Ok(d) => d,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    success!("Detection complete: {}", detections.verbose());
    info!("TOTAL: {}", detections.len());

    let speed = detections.speed();
    verbose!(
        "Speed: {:.1}ms preprocess, {:.1}ms inference, {:.1}ms postprocess",
        speed.preprocess.unwrap_or(0.0),
        speed.inference.unwrap_or(0.0),
        speed.postprocess.unwrap_or(0.0)
    );

    if args.json {
        match serde_json::to_string_pretty(&detections) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!("Failed to serialize detections: {e}");
                process::exit(1);
            }
        }
    }

    if args.save || args.output.is_some() {
        save_annotated(&args, &image, &detections);
    }
}

#[cfg(feature = "annotate")]
fn save_annotated(
    args: &CountArgs,
    image: &image::DynamicImage,
    detections: &crate::results::Detections,
) {
    let output = args.output.clone().unwrap_or_else(|| {
        PathBuf::from(format!("detection_result_{}pipes.jpg", detections.len()))
    });

    let annotated = crate::annotate::annotate_image(image, detections);
    match annotated.to_rgb8().save(&output) {
        Ok(()) => {
            success!("Saved annotated image to {}", output.display());
        }
        Err(e) => {
            error!("Failed to save annotated image: {e}");
            process::exit(1);
        }
    }
}

#[cfg(not(feature = "annotate"))]
fn save_annotated(
    _args: &CountArgs,
    _image: &image::DynamicImage,
    _detections: &crate::results::Detections,
) {
    warn!(
        "--save requires the 'annotate' feature. Compile with --features annotate to enable saving."
    );
}

/// Remove cached model artifacts.
#[allow(clippy::needless_pass_by_value)]
pub fn run_clear_cache(args: ClearCacheArgs) {
    let cache_dir = resolve_cache_dir(args.cache_dir.clone());

    if let Some(url) = &args.model_url {
        let reference = match ArtifactRef::resolve(url, &cache_dir) {
            Ok(r) => r,
            Err(e) => {
                error!("{e}");
                process::exit(2);
            }
        };
        let provisioner = PipeProvisioner::default();
        match provisioner.invalidate(&reference) {
            Ok(()) => {
                success!("Removed cached artifact for '{url}'");
            }
            Err(e) => {
                error!("{e}");
                process::exit(1);
            }
        }
        return;
    }

    // No URL given: clear every cached artifact
    let entries = match fs::read_dir(&cache_dir) {
        Ok(entries) => entries,
        Err(_) => {
            info!("Cache is empty: {}", cache_dir.display());
            return;
        }
    };

    let mut removed = 0usize;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    error!("Failed to remove {}: {e}", path.display());
                }
            }
        }
    }
    success!("Removed {removed} cached artifact(s) from {}", cache_dir.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_cache_dir_explicit() {
        let dir = resolve_cache_dir(Some(PathBuf::from("/tmp/custom-cache")));
        assert_eq!(dir, PathBuf::from("/tmp/custom-cache"));
    }

    #[test]
    fn test_resolve_cache_dir_default_has_app_name() {
        let dir = resolve_cache_dir(None);
        assert!(dir.ends_with("pipe-detect"));
    }
}
