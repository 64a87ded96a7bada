//! Calibration output and its JSON form.

use crate::model::{BrownConrady, Intrinsics, PinholeCamera};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(thiserror::Error, Debug)]
pub enum ReportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Intrinsic calibration of one camera.
///
/// The serialized form has exactly three fields: `rmse` (pixels),
/// `camera_matrix` (3x3, row-major) and `distortion_coefficients`
/// (`[k1, k2, p1, p2, k3]`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub rmse: f64,
    pub camera_matrix: [[f64; 3]; 3],
    pub distortion_coefficients: Vec<f64>,
}

impl CalibrationResult {
    pub fn from_camera(camera: &PinholeCamera, rmse: f64) -> Self {
        let k = &camera.intrinsics;
        Self {
            rmse,
            camera_matrix: [
                [k.fx, 0.0, k.cx],
                [0.0, k.fy, k.cy],
                [0.0, 0.0, 1.0],
            ],
            distortion_coefficients: camera.distortion.coefficients().to_vec(),
        }
    }

    pub fn fx(&self) -> f64 {
        self.camera_matrix[0][0]
    }

    pub fn fy(&self) -> f64 {
        self.camera_matrix[1][1]
    }

    pub fn cx(&self) -> f64 {
        self.camera_matrix[0][2]
    }

    pub fn cy(&self) -> f64 {
        self.camera_matrix[1][2]
    }

    /// Camera model described by this result. Missing trailing distortion
    /// coefficients are taken as zero.
    pub fn camera(&self) -> PinholeCamera {
        let d = |i: usize| self.distortion_coefficients.get(i).copied().unwrap_or(0.0);
        PinholeCamera {
            intrinsics: Intrinsics {
                fx: self.fx(),
                fy: self.fy(),
                cx: self.cx(),
                cy: self.cy(),
            },
            distortion: BrownConrady {
                k1: d(0),
                k2: d(1),
                p1: d(2),
                p2: d(3),
                k3: d(4),
            },
        }
    }

    /// Load a result previously written with [`Self::write_json`].
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this result to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
