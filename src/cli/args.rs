// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::download::FALLBACK_MODEL_URL;

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r#"Examples:
    pipe-detect count --source pipes.jpg --model-url https://example.com/pipe_model.onnx
    pipe-detect count --source pipes.jpg --conf 0.6 --save
    pipe-detect count --source pipes.jpg --json
    pipe-detect clear-cache --model-url https://example.com/pipe_model.onnx"#)]
pub struct Cli {
    #[command(subcommand)]
    /// Subcommand to execute.
    pub command: Commands,
}

/// Commands for the CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect and count pipes in an image
    Count(CountArgs),
    /// Delete cached model artifacts to force re-download
    ClearCache(ClearCacheArgs),
}

/// Arguments for the count command.
#[derive(Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct CountArgs {
    /// Input image file
    #[arg(short, long)]
    pub source: PathBuf,

    /// URL of the specialized pipe model; when omitted, the generic fallback
    /// model is used directly
    #[arg(short, long)]
    pub model_url: Option<String>,

    /// URL of the generic fallback model
    #[arg(long, default_value = FALLBACK_MODEL_URL)]
    pub fallback_url: String,

    /// Confidence threshold
    #[arg(long, default_value_t = 0.5)]
    pub conf: f32,

    /// IoU threshold for NMS
    #[arg(long, default_value_t = 0.45)]
    pub iou: f32,

    /// Maximum number of detections
    #[arg(long, default_value_t = 300)]
    pub max_det: usize,

    /// Inference image size
    #[arg(long, default_value_t = 640)]
    pub imgsz: usize,

    /// Model cache directory [default: the user cache dir]
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Save the annotated result image
    #[arg(long, default_value_t = false)]
    pub save: bool,

    /// Path for the annotated image [default: detection_result_<N>pipes.jpg]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print detections as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Show verbose output
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub verbose: bool,
}

/// Arguments for the clear-cache command.
#[derive(Args, Debug)]
pub struct ClearCacheArgs {
    /// URL of the model to invalidate; when omitted, every cached artifact is
    /// removed
    #[arg(short, long)]
    pub model_url: Option<String>,

    /// Model cache directory [default: the user cache dir]
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_count_args_defaults() {
        let args = Cli::parse_from(["app", "count", "--source", "pipes.jpg"]);
        match args.command {
            Commands::Count(count_args) => {
                assert_eq!(count_args.source, PathBuf::from("pipes.jpg"));
                assert!(count_args.model_url.is_none());
                assert_eq!(count_args.fallback_url, FALLBACK_MODEL_URL);
                assert!((count_args.conf - 0.5).abs() < f32::EPSILON);
                assert!((count_args.iou - 0.45).abs() < f32::EPSILON);
                assert_eq!(count_args.max_det, 300);
                assert_eq!(count_args.imgsz, 640);
                assert!(!count_args.save);
                assert!(!count_args.json);
                assert!(count_args.verbose);
            }
            Commands::ClearCache(_) => panic!("expected count command"),
        }
    }

    #[test]
    fn test_count_args_custom() {
        let args = Cli::parse_from([
            "app",
            "count",
            "--source",
            "pipes.jpg",
            "--model-url",
            "https://example.com/pipe_model.onnx",
            "--conf",
            "0.7",
            "--max-det",
            "50",
            "--save",
        ]);
        match args.command {
            Commands::Count(count_args) => {
                assert_eq!(
                    count_args.model_url.as_deref(),
                    Some("https://example.com/pipe_model.onnx")
                );
                assert!((count_args.conf - 0.7).abs() < f32::EPSILON);
                assert_eq!(count_args.max_det, 50);
                assert!(count_args.save);
            }
            Commands::ClearCache(_) => panic!("expected count command"),
        }
    }

    #[test]
    fn test_clear_cache_args() {
        let args = Cli::parse_from(["app", "clear-cache"]);
        match args.command {
            Commands::ClearCache(clear_args) => {
                assert!(clear_args.model_url.is_none());
                assert!(clear_args.cache_dir.is_none());
            }
            Commands::Count(_) => panic!("expected clear-cache command"),
        }
    }
}
