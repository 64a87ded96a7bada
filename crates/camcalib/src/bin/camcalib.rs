use std::{error::Error, path::PathBuf};

use camcalib::{run, CalibrationConfig, PatternShape, SquareSize};
use clap::Parser;
use log::LevelFilter;

/// Estimate camera intrinsics from a directory of checkerboard images.
#[derive(Debug, Parser)]
#[command(author, version, about = "Checkerboard camera calibration")]
struct Args {
    /// Directory holding the calibration images (png, jpg, jpeg).
    #[arg(short = 'p', long, alias = "path_to_images")]
    path_to_images: Option<PathBuf>,

    /// Directory receiving calibration_results.json.
    #[arg(short = 'r', long, alias = "path_to_results")]
    path_to_results: Option<PathBuf>,

    /// Inner corners of the board as ROWSxCOLS, e.g. 6x9.
    #[arg(short = 'c', long, alias = "pattern_shape")]
    pattern_shape: Option<PatternShape>,

    /// Side length of one square in millimeters.
    #[arg(short = 's', long, alias = "square_size", value_parser = parse_square_size)]
    square_size: Option<SquareSize>,

    /// JSON CalibrationConfig; command line flags take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save every image with a detected board, corners drawn, into this directory.
    #[arg(long)]
    annotated_dir: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,

    /// Emit logs as JSON lines.
    #[cfg(feature = "tracing")]
    #[arg(long)]
    json_logs: bool,
}

fn parse_square_size(raw: &str) -> Result<SquareSize, String> {
    let mm: f64 = raw.parse().map_err(|e| format!("{e}"))?;
    SquareSize::new(mm).map_err(|e| e.to_string())
}

fn missing(flag: &str) -> Box<dyn Error> {
    format!("{flag} is required when no --config is given").into()
}

fn build_config(args: &Args) -> Result<CalibrationConfig, Box<dyn Error>> {
    let mut cfg = match &args.config {
        Some(path) => CalibrationConfig::load_json(path)?,
        None => CalibrationConfig::new(
            args.path_to_images
                .clone()
                .ok_or_else(|| missing("--path-to-images"))?,
            args.path_to_results
                .clone()
                .ok_or_else(|| missing("--path-to-results"))?,
            args.pattern_shape
                .ok_or_else(|| missing("--pattern-shape"))?,
            args.square_size.ok_or_else(|| missing("--square-size"))?,
        ),
    };
    if let Some(dir) = &args.path_to_images {
        cfg.images_dir = dir.clone();
    }
    if let Some(dir) = &args.path_to_results {
        cfg.results_dir = dir.clone();
    }
    if let Some(shape) = args.pattern_shape {
        cfg.pattern = shape;
    }
    if let Some(size) = args.square_size {
        cfg.square_size_mm = size;
    }
    if args.annotated_dir.is_some() {
        cfg.annotated_dir = args.annotated_dir.clone();
    }
    Ok(cfg)
}

#[cfg(feature = "tracing")]
fn init_logging(args: &Args) -> Result<(), Box<dyn Error>> {
    let _ = tracing_log::LogTracer::init();
    camcalib::core::init_tracing(args.log_level, args.json_logs);
    Ok(())
}

#[cfg(not(feature = "tracing"))]
fn init_logging(args: &Args) -> Result<(), Box<dyn Error>> {
    camcalib::core::init_with_level(args.log_level)?;
    Ok(())
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(&args)?;
    let cfg = build_config(&args)?;
    let outcome = run(&cfg)?;
    println!(
        "{}/{} valid calibration image(s), RMSE {:.4} px, results in {}",
        outcome.images.valid,
        outcome.images.total,
        outcome.result.rmse,
        outcome.results_path.display()
    );
    Ok(())
}
