//! Intrinsic camera calibration from a directory of checkerboard images.
//!
//! ```no_run
//! use camcalib::{run, CalibrationConfig, PatternShape, SquareSize};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = CalibrationConfig::new(
//!     "images",
//!     "results",
//!     "6x9".parse::<PatternShape>()?,
//!     SquareSize::new(24.0)?,
//! );
//! let outcome = run(&cfg)?;
//! println!("rmse = {:.3} px", outcome.result.rmse);
//! # Ok(())
//! # }
//! ```
//!
//! The run scans the directory for PNG/JPEG images, detects the board in
//! each, checks that every accepted image has the same size, solves for the
//! camera matrix and Brown–Conrady distortion, and writes
//! `calibration_results.json` into the results directory.

mod config;
mod pipeline;
mod report;
mod validate;

pub use config::{CalibrationConfig, ConfigError};
pub use pipeline::{run, CalibrationRun, PipelineError};
pub use report::{load, persist, RESULTS_FILE_NAME};
pub use validate::{
    list_candidates, scan, scan_with, CalibrationView, ImageOutcome, ImageRecord,
    ScanAccumulator, ValidateError, ValidatedImageSet, IMAGE_EXTENSIONS,
};

pub use camcalib_chessboard::{ChessboardDetection, ChessboardDetector, ChessboardParams};
pub use camcalib_core::{
    ImagePointSet, ImageSize, ObjectLattice, PatternError, PatternShape, SquareSize,
};
pub use camcalib_solver::{CalibrationResult, ReportError, SolveReport, SolverError, SolverOptions};

pub use camcalib_chessboard as chessboard;
pub use camcalib_core as core;
pub use camcalib_solver as solver;
