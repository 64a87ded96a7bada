//! Intrinsic calibration from planar-board observations.
//!
//! ```text
//! per view:   lattice XY ──DLT──▶ H_i
//! all views:  {H_i} + image center ──▶ fx, fy
//! per view:   K, H_i ──▶ T_C_B,i
//! jointly:    Levenberg–Marquardt over K, distortion and every T_C_B,i
//! ```
//!
//! The result carries the reprojection RMSE, the 3x3 camera matrix and the
//! five Brown–Conrady coefficients `[k1, k2, p1, p2, k3]`.

mod backend_lm;
mod init;
mod model;
mod problem;
mod result;
mod solver;

pub use backend_lm::{LmBackend, LmOutcome};
pub use init::{focal_from_homographies, pose_from_homography};
pub use model::{BrownConrady, Intrinsics, Iso3, PinholeCamera};
pub use problem::{NllsProblem, PlanarIntrinsicsProblem};
pub use result::{CalibrationResult, ReportError};
pub use solver::{calibrate, calibrate_with_report, SolveReport, SolverError, SolverOptions};
