//! Run configuration, loadable from JSON.

use camcalib_chessboard::ChessboardParams;
use camcalib_core::{PatternShape, SquareSize};
use camcalib_solver::SolverOptions;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Everything one calibration run needs.
///
/// `pattern` accepts `"6x9"` or `{ "rows": 6, "cols": 9 }`; the detector and
/// solver blocks may be omitted or partial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub images_dir: PathBuf,
    pub results_dir: PathBuf,
    pub pattern: PatternShape,
    pub square_size_mm: SquareSize,
    /// Where to save a copy of every image with its detected corners drawn.
    #[serde(default)]
    pub annotated_dir: Option<PathBuf>,
    #[serde(default)]
    pub detector: ChessboardParams,
    #[serde(default)]
    pub solver: SolverOptions,
}

impl CalibrationConfig {
    pub fn new(
        images_dir: impl Into<PathBuf>,
        results_dir: impl Into<PathBuf>,
        pattern: PatternShape,
        square_size_mm: SquareSize,
    ) -> Self {
        Self {
            images_dir: images_dir.into(),
            results_dir: results_dir.into(),
            pattern,
            square_size_mm,
            annotated_dir: None,
            detector: ChessboardParams::default(),
            solver: SolverOptions::default(),
        }
    }

    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
