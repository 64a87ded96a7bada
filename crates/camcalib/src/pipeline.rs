//! End-to-end run: scan the image directory, calibrate, persist.

use crate::config::CalibrationConfig;
use crate::report::persist;
use crate::validate::{scan_with, ValidateError, ValidatedImageSet};
use camcalib_chessboard::{ChessboardDetection, ChessboardDetector};
use camcalib_core::ObjectLattice;
use camcalib_solver::{
    calibrate_with_report, CalibrationResult, ReportError, SolveReport, SolverError,
};
use image::DynamicImage;
use log::{info, warn};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Validate(#[from] ValidateError),
    #[error("no valid calibration images in {0}")]
    NoValidImages(PathBuf),
    #[error("calibration failed: {0}")]
    Solver(#[from] SolverError),
    #[error("cannot write calibration results: {0}")]
    Report(#[from] ReportError),
}

/// Everything a completed run produced.
#[derive(Clone, Debug)]
pub struct CalibrationRun {
    pub images: ValidatedImageSet,
    pub result: CalibrationResult,
    pub report: SolveReport,
    pub results_path: PathBuf,
}

/// Calibrate from `cfg.images_dir` and write the result into
/// `cfg.results_dir`. Nothing is written unless every step succeeds.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(cfg), fields(pattern = %cfg.pattern))
)]
pub fn run(cfg: &CalibrationConfig) -> Result<CalibrationRun, PipelineError> {
    let detector = ChessboardDetector::new(cfg.pattern, cfg.detector.clone());
    let images = match cfg.annotated_dir.as_deref() {
        Some(dir) => scan_with(&cfg.images_dir, &detector, |path, img, det| {
            save_annotated(dir, path, img, det)
        })?,
        None => scan_with(&cfg.images_dir, &detector, |_, _, _| {})?,
    };

    let Some(image_size) = images.image_size.filter(|_| images.valid > 0) else {
        return Err(PipelineError::NoValidImages(cfg.images_dir.clone()));
    };

    let lattice = ObjectLattice::generate(cfg.pattern, cfg.square_size_mm);
    let (result, report) =
        calibrate_with_report(&lattice, &images.image_points(), image_size, &cfg.solver)?;
    info!(
        "calibrated {} view(s) of {image_size} in {} evaluations",
        images.valid, report.evaluations
    );

    let results_path = persist(&result, &cfg.results_dir)?;
    Ok(CalibrationRun {
        images,
        result,
        report,
        results_path,
    })
}

/// Overlay failures are reported and otherwise ignored.
fn save_annotated(dir: &Path, source: &Path, img: &DynamicImage, det: &ChessboardDetection) {
    let Some(name) = source.file_name() else {
        return;
    };
    let out = dir.join(name);
    let saved = fs::create_dir_all(dir)
        .map_err(|e| e.to_string())
        .and_then(|_| det.draw(img).save(&out).map_err(|e| e.to_string()));
    if let Err(err) = saved {
        warn!("cannot save annotated image {}: {err}", out.display());
    }
}
