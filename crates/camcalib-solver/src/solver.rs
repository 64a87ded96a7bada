use crate::backend_lm::LmBackend;
use crate::init::{focal_from_homographies, pose_from_homography};
use crate::model::{BrownConrady, Intrinsics, Iso3, PinholeCamera};
use crate::problem::{decode_camera, pack_params, NllsProblem, PlanarIntrinsicsProblem};
use crate::result::CalibrationResult;
use camcalib_core::{estimate_homography, ImagePointSet, ImageSize, ObjectLattice, Pt2};
use log::debug;
use nalgebra::{DMatrix, DVector, Matrix3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("no views to calibrate from")]
    NoViews,
    #[error("view {view} has {found} image points but the pattern has {expected}")]
    PointCountMismatch {
        view: usize,
        expected: usize,
        found: usize,
    },
    #[error("a view needs at least 4 points, the pattern has {0}")]
    TooFewPoints(usize),
    #[error("degenerate view configuration: {0}")]
    Degenerate(String),
    #[error("optimization did not converge: {0}")]
    NotConverged(String),
}

/// Termination and conditioning parameters of the solve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// LM patience; the evaluation budget is `max_iters * (n_params + 1)`.
    pub max_iters: usize,
    /// Relative tolerance on the cost reduction.
    pub ftol: f64,
    /// Relative tolerance on the parameter update.
    pub xtol: f64,
    /// Tolerance on the residual/Jacobian orthogonality.
    pub gtol: f64,
    /// Smallest accepted ratio between the extreme singular values of the
    /// column-normalized Jacobian.
    pub rank_tol: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iters: 200,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-12,
            rank_tol: 1e-8,
        }
    }
}

/// Diagnostics of a successful solve.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SolveReport {
    /// RMSE of the closed-form initialization, in pixels.
    pub initial_rmse: f64,
    pub rmse: f64,
    /// RMSE of every view, in input order.
    pub per_view_rmse: Vec<f64>,
    pub evaluations: usize,
    pub termination: String,
}

/// Calibrate intrinsics and distortion from `image_points`, one point set per
/// view, each index-aligned with `lattice`.
pub fn calibrate(
    lattice: &ObjectLattice,
    image_points: &[ImagePointSet],
    image_size: ImageSize,
    opts: &SolverOptions,
) -> Result<CalibrationResult, SolverError> {
    calibrate_with_report(lattice, image_points, image_size, opts).map(|(result, _)| result)
}

/// [`calibrate`] that also returns the solve diagnostics.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(lattice, image_points, opts),
        fields(views = image_points.len())
    )
)]
pub fn calibrate_with_report(
    lattice: &ObjectLattice,
    image_points: &[ImagePointSet],
    image_size: ImageSize,
    opts: &SolverOptions,
) -> Result<(CalibrationResult, SolveReport), SolverError> {
    check_inputs(lattice, image_points)?;
    if image_size.width == 0 || image_size.height == 0 {
        return Err(SolverError::Degenerate(format!("empty image size {image_size}")));
    }

    let (camera0, poses0) = initialize(lattice, image_points, image_size)?;
    let object = lattice.points();
    let problem = PlanarIntrinsicsProblem::new(object, image_points);
    let total_points = (object.len() * image_points.len()) as f64;

    let x0 = pack_params(&camera0, &poses0);
    let initial_rmse = rmse(&problem.residuals(&x0), total_points);
    debug!(
        "initial estimate fx={:.2} fy={:.2} cx={:.2} cy={:.2}, rmse {:.4} px",
        camera0.intrinsics.fx,
        camera0.intrinsics.fy,
        camera0.intrinsics.cx,
        camera0.intrinsics.cy,
        initial_rmse
    );

    let ratio = conditioning(&problem.jacobian(&x0));
    if ratio < opts.rank_tol {
        return Err(SolverError::Degenerate(format!(
            "the views do not constrain the intrinsics (singular value ratio {ratio:.1e}); \
             capture the board at several distinct orientations"
        )));
    }

    let (x, outcome) = LmBackend.solve(&problem, x0, opts);
    debug!(
        "LM finished after {} evaluations: {}",
        outcome.evaluations, outcome.termination
    );
    if !outcome.converged {
        return Err(SolverError::NotConverged(outcome.termination));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(SolverError::NotConverged("non-finite parameters".to_string()));
    }

    let ratio = conditioning(&problem.jacobian(&x));
    if ratio < opts.rank_tol {
        return Err(SolverError::Degenerate(format!(
            "rank-deficient Jacobian at the solution (singular value ratio {ratio:.1e})"
        )));
    }

    let camera = decode_camera(&x);
    if !(camera.intrinsics.fx > 0.0 && camera.intrinsics.fy > 0.0) {
        return Err(SolverError::NotConverged(format!(
            "non-physical focal lengths fx={} fy={}",
            camera.intrinsics.fx, camera.intrinsics.fy
        )));
    }

    let final_rmse = rmse(&problem.residuals(&x), total_points);
    if !final_rmse.is_finite() {
        return Err(SolverError::NotConverged("non-finite reprojection error".to_string()));
    }
    let per_view_rmse = problem.per_view_rmse(&x);
    for (v, e) in per_view_rmse.iter().enumerate() {
        debug!("view {v}: rmse {e:.4} px");
    }

    let report = SolveReport {
        initial_rmse,
        rmse: final_rmse,
        per_view_rmse,
        evaluations: outcome.evaluations,
        termination: outcome.termination,
    };
    Ok((CalibrationResult::from_camera(&camera, final_rmse), report))
}

fn check_inputs(
    lattice: &ObjectLattice,
    image_points: &[ImagePointSet],
) -> Result<(), SolverError> {
    if image_points.is_empty() {
        return Err(SolverError::NoViews);
    }
    let expected = lattice.len();
    if expected < 4 {
        return Err(SolverError::TooFewPoints(expected));
    }
    for (view, pts) in image_points.iter().enumerate() {
        if pts.len() != expected {
            return Err(SolverError::PointCountMismatch {
                view,
                expected,
                found: pts.len(),
            });
        }
    }
    let shape = lattice.shape();
    if shape.rows < 2 || shape.cols < 2 {
        return Err(SolverError::Degenerate(format!(
            "a {shape} pattern has collinear corners"
        )));
    }
    Ok(())
}

/// Homography per view, focal lengths with the principal point at the image
/// center, then board poses; distortion starts at zero.
fn initialize(
    lattice: &ObjectLattice,
    image_points: &[ImagePointSet],
    image_size: ImageSize,
) -> Result<(PinholeCamera, Vec<Iso3>), SolverError> {
    let board_xy: Vec<Pt2> = lattice
        .points()
        .iter()
        .map(|p| Pt2::new(p.x, p.y))
        .collect();

    let hs = image_points
        .iter()
        .enumerate()
        .map(|(v, pts)| {
            estimate_homography(&board_xy, pts).map(|h| h.h).ok_or_else(|| {
                SolverError::Degenerate(format!("no homography for view {v}"))
            })
        })
        .collect::<Result<Vec<Matrix3<f64>>, _>>()?;

    let cx = (image_size.width as f64 - 1.0) * 0.5;
    let cy = (image_size.height as f64 - 1.0) * 0.5;
    let (fx, fy) = focal_from_homographies(&hs, cx, cy).ok_or_else(|| {
        SolverError::Degenerate(
            "focal length initialization failed; fronto-parallel views carry no focal information"
                .to_string(),
        )
    })?;
    let max_focal = 100.0 * image_size.width.max(image_size.height) as f64;
    if fx > max_focal || fy > max_focal {
        return Err(SolverError::Degenerate(format!(
            "implausible initial focal lengths fx={fx:.1} fy={fy:.1}"
        )));
    }

    let intrinsics = Intrinsics { fx, fy, cx, cy };
    let poses = hs
        .iter()
        .enumerate()
        .map(|(v, h)| {
            pose_from_homography(&intrinsics, h)
                .ok_or_else(|| SolverError::Degenerate(format!("no pose for view {v}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((
        PinholeCamera {
            intrinsics,
            distortion: BrownConrady::default(),
        },
        poses,
    ))
}

fn rmse(residuals: &DVector<f64>, total_points: f64) -> f64 {
    (residuals.norm_squared() / total_points.max(1.0)).sqrt()
}

/// `σ_min / σ_max` of the Jacobian after scaling every column to unit norm.
/// Zero when a parameter has no influence at all.
fn conditioning(j: &DMatrix<f64>) -> f64 {
    let mut jn = j.clone();
    for mut col in jn.column_iter_mut() {
        let n = col.norm();
        if !(n > 0.0 && n.is_finite()) {
            return 0.0;
        }
        col /= n;
    }
    let sv = jn.singular_values();
    let max = sv.max();
    if max <= 0.0 {
        return 0.0;
    }
    sv.min() / max
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcalib_core::{PatternShape, SquareSize};
    use nalgebra::{Translation3, UnitQuaternion, Vector3};

    fn lattice(rows: u32, cols: u32) -> ObjectLattice {
        ObjectLattice::generate(
            PatternShape::new(rows, cols).expect("shape"),
            SquareSize::new(30.0).expect("size"),
        )
    }

    fn camera() -> PinholeCamera {
        PinholeCamera {
            intrinsics: Intrinsics {
                fx: 900.0,
                fy: 880.0,
                cx: 330.0,
                cy: 245.0,
            },
            distortion: BrownConrady {
                k1: -0.15,
                k2: 0.08,
                p1: 0.0008,
                p2: -0.0005,
                k3: 0.0,
            },
        }
    }

    fn pose(w: [f64; 3], t: [f64; 3]) -> Iso3 {
        Iso3::from_parts(
            Translation3::new(t[0], t[1], t[2]),
            UnitQuaternion::from_scaled_axis(Vector3::from(w)),
        )
    }

    fn observe(lattice: &ObjectLattice, cam: &PinholeCamera, poses: &[Iso3]) -> Vec<ImagePointSet> {
        poses
            .iter()
            .map(|p| {
                lattice
                    .points()
                    .iter()
                    .map(|q| cam.project_board(p, q).expect("visible"))
                    .collect()
            })
            .collect()
    }

    fn varied_poses() -> Vec<Iso3> {
        vec![
            pose([0.35, 0.0, 0.0], [-120.0, -75.0, 600.0]),
            pose([0.0, 0.4, 0.05], [-140.0, -80.0, 650.0]),
            pose([-0.3, 0.25, -0.1], [-110.0, -60.0, 560.0]),
            pose([0.2, -0.35, 0.1], [-100.0, -90.0, 700.0]),
            pose([-0.25, -0.2, 0.0], [-130.0, -70.0, 620.0]),
        ]
    }

    #[test]
    fn input_errors_are_reported_before_solving() {
        let l = lattice(6, 9);
        let size = ImageSize::new(640, 480);
        let opts = SolverOptions::default();
        assert_eq!(calibrate(&l, &[], size, &opts), Err(SolverError::NoViews));

        let views = vec![vec![Pt2::new(0.0, 0.0); 54], vec![Pt2::new(0.0, 0.0); 53]];
        assert_eq!(
            calibrate(&l, &views, size, &opts),
            Err(SolverError::PointCountMismatch {
                view: 1,
                expected: 54,
                found: 53
            })
        );

        let tiny = lattice(1, 3);
        assert_eq!(
            calibrate(&tiny, &[vec![Pt2::new(0.0, 0.0); 3]], size, &opts),
            Err(SolverError::TooFewPoints(3))
        );

        let line = lattice(1, 6);
        let err = calibrate(&line, &[vec![Pt2::new(0.0, 0.0); 6]], size, &opts).unwrap_err();
        assert!(matches!(err, SolverError::Degenerate(_)), "{err:?}");
    }

    #[test]
    fn exact_observations_recover_the_camera() {
        let l = lattice(6, 9);
        let cam = camera();
        let views = observe(&l, &cam, &varied_poses());

        let size = ImageSize::new(660, 490);
        let (result, report) = calibrate_with_report(&l, &views, size, &SolverOptions::default())
            .expect("calibration");

        assert!(result.rmse < 1e-6, "rmse {}", result.rmse);
        assert!((result.fx() - 900.0).abs() < 1e-3, "fx {}", result.fx());
        assert!((result.fy() - 880.0).abs() < 1e-3, "fy {}", result.fy());
        assert!((result.cx() - 330.0).abs() < 1e-3);
        assert!((result.cy() - 245.0).abs() < 1e-3);
        assert!((result.distortion_coefficients[0] + 0.15).abs() < 1e-5);
        assert_eq!(report.per_view_rmse.len(), 5);
        assert!(report.initial_rmse > report.rmse);
    }

    #[test]
    fn fronto_parallel_views_are_degenerate() {
        let l = lattice(6, 9);
        let mut cam = camera();
        cam.distortion = BrownConrady::default();
        let poses = vec![
            pose([0.0, 0.0, 0.0], [-120.0, -75.0, 600.0]),
            pose([0.0, 0.0, 0.3], [-100.0, -60.0, 700.0]),
        ];
        let views = observe(&l, &cam, &poses);
        let size = ImageSize::new(640, 480);
        let err = calibrate(&l, &views, size, &SolverOptions::default()).unwrap_err();
        assert!(matches!(err, SolverError::Degenerate(_)), "{err:?}");
    }

    #[test]
    fn repeated_single_pose_is_degenerate() {
        let l = lattice(6, 9);
        let mut cam = camera();
        cam.distortion = BrownConrady::default();
        let p = pose([0.3, 0.25, 0.0], [-120.0, -75.0, 600.0]);
        let views = observe(&l, &cam, &[p, p, p]);
        let size = ImageSize::new(640, 480);
        let err = calibrate(&l, &views, size, &SolverOptions::default()).unwrap_err();
        assert!(matches!(err, SolverError::Degenerate(_)), "{err:?}");
    }

    #[test]
    fn conditioning_of_a_rank_deficient_matrix_is_zero_or_tiny() {
        let j = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 2.0, 4.0, 3.0, 6.0]);
        assert!(conditioning(&j) < 1e-12);
        let j = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(conditioning(&j), 0.0);
        assert!((conditioning(&DMatrix::identity(3, 3)) - 1.0).abs() < 1e-12);
    }
}
