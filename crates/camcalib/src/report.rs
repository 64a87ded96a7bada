//! Persisting the calibration result.

use camcalib_solver::{CalibrationResult, ReportError};
use log::info;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// File name of the result inside the results directory.
pub const RESULTS_FILE_NAME: &str = "calibration_results.json";

/// Write `result` to `<results_dir>/calibration_results.json`, creating the
/// directory when needed. Returns the path written.
pub fn persist(result: &CalibrationResult, results_dir: &Path) -> Result<PathBuf, ReportError> {
    fs::create_dir_all(results_dir)?;
    let path = results_dir.join(RESULTS_FILE_NAME);
    result.write_json(&path)?;
    info!("RMSE: {:.4} px", result.rmse);
    info!("calibration results saved to {}", path.display());
    Ok(path)
}

/// Read the result stored in `results_dir`.
pub fn load(results_dir: &Path) -> Result<CalibrationResult, ReportError> {
    CalibrationResult::load_json(results_dir.join(RESULTS_FILE_NAME))
}
