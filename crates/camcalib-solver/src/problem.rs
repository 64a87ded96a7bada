//! Reprojection least-squares problem over shared intrinsics and per-view
//! board poses.
//!
//! Parameter layout: `[fx, fy, cx, cy, k1, k2, p1, p2, k3]` followed by six
//! entries per view, the axis-angle rotation and the translation of
//! `T_C_B`.

use crate::model::{BrownConrady, Intrinsics, Iso3, PinholeCamera};
use camcalib_core::{Pt2, Pt3};
use nalgebra::{DMatrix, DVector, Translation3, UnitQuaternion, Vector3};

pub const INTRINSIC_DIM: usize = 9;
pub const POSE_DIM: usize = 6;

/// Residual penalty for a board point that ends up behind the camera.
const BEHIND_CAMERA_PENALTY: f64 = 1e6;

/// A nonlinear least-squares problem: residuals and their Jacobian.
pub trait NllsProblem {
    fn num_params(&self) -> usize;
    fn num_residuals(&self) -> usize;
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64>;
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64>;
}

/// One board, seen in several views. Every view holds one image point per
/// object point, in the same order.
#[derive(Debug, Clone, Copy)]
pub struct PlanarIntrinsicsProblem<'a> {
    object: &'a [Pt3],
    views: &'a [Vec<Pt2>],
}

impl<'a> PlanarIntrinsicsProblem<'a> {
    pub fn new(object: &'a [Pt3], views: &'a [Vec<Pt2>]) -> Self {
        Self { object, views }
    }

    pub fn num_views(&self) -> usize {
        self.views.len()
    }

    fn view_rows(&self) -> usize {
        2 * self.object.len()
    }

    /// Write the residuals (`measured - projected`) of one view into `out`.
    fn view_residuals(&self, camera: &PinholeCamera, pose: &Iso3, view: usize, out: &mut [f64]) {
        for (j, (p, meas)) in self.object.iter().zip(&self.views[view]).enumerate() {
            let (ex, ey) = match camera.project_board(pose, p) {
                Some(proj) => (meas.x - proj.x, meas.y - proj.y),
                None => (BEHIND_CAMERA_PENALTY, BEHIND_CAMERA_PENALTY),
            };
            out[2 * j] = ex;
            out[2 * j + 1] = ey;
        }
    }

    /// Root-mean-square reprojection error of every view.
    pub fn per_view_rmse(&self, x: &DVector<f64>) -> Vec<f64> {
        let r = self.residuals(x);
        let n = self.object.len().max(1) as f64;
        r.as_slice()
            .chunks(self.view_rows().max(1))
            .map(|rows| (rows.iter().map(|e| e * e).sum::<f64>() / n).sqrt())
            .collect()
    }
}

impl NllsProblem for PlanarIntrinsicsProblem<'_> {
    fn num_params(&self) -> usize {
        INTRINSIC_DIM + POSE_DIM * self.num_views()
    }

    fn num_residuals(&self) -> usize {
        self.view_rows() * self.num_views()
    }

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let camera = decode_camera(x);
        let rows = self.view_rows();
        let mut r = DVector::zeros(self.num_residuals());
        for v in 0..self.num_views() {
            let pose = decode_pose(x, v);
            let out = &mut r.as_mut_slice()[v * rows..(v + 1) * rows];
            self.view_residuals(&camera, &pose, v, out);
        }
        r
    }

    /// Central differences. Intrinsic columns touch every view; a pose column
    /// only touches the rows of its own view.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let rows = self.view_rows();
        let mut j = DMatrix::zeros(self.num_residuals(), self.num_params());

        for k in 0..INTRINSIC_DIM {
            let h = step(x[k]);
            let mut xp = x.clone();
            xp[k] += h;
            let mut xm = x.clone();
            xm[k] -= h;
            let diff = (self.residuals(&xp) - self.residuals(&xm)) / (2.0 * h);
            j.set_column(k, &diff);
        }

        let camera = decode_camera(x);
        let mut rp = vec![0.0; rows];
        let mut rm = vec![0.0; rows];
        for v in 0..self.num_views() {
            let base = INTRINSIC_DIM + POSE_DIM * v;
            for k in base..base + POSE_DIM {
                let h = step(x[k]);
                let mut xp = x.clone();
                xp[k] += h;
                let mut xm = x.clone();
                xm[k] -= h;
                self.view_residuals(&camera, &decode_pose(&xp, v), v, &mut rp);
                self.view_residuals(&camera, &decode_pose(&xm, v), v, &mut rm);
                for i in 0..rows {
                    j[(v * rows + i, k)] = (rp[i] - rm[i]) / (2.0 * h);
                }
            }
        }

        j
    }
}

#[inline]
fn step(x: f64) -> f64 {
    1e-6 * x.abs().max(1.0)
}

/// Pack a camera and board poses into a parameter vector.
pub fn pack_params(camera: &PinholeCamera, poses: &[Iso3]) -> DVector<f64> {
    let mut x = DVector::zeros(INTRINSIC_DIM + POSE_DIM * poses.len());
    let k = &camera.intrinsics;
    let d = &camera.distortion;
    x.as_mut_slice()[..INTRINSIC_DIM]
        .copy_from_slice(&[k.fx, k.fy, k.cx, k.cy, d.k1, d.k2, d.p1, d.p2, d.k3]);

    for (i, pose) in poses.iter().enumerate() {
        let idx = INTRINSIC_DIM + POSE_DIM * i;
        let w = pose.rotation.scaled_axis();
        let t = pose.translation.vector;
        x.as_mut_slice()[idx..idx + POSE_DIM].copy_from_slice(&[w.x, w.y, w.z, t.x, t.y, t.z]);
    }
    x
}

pub fn decode_camera(x: &DVector<f64>) -> PinholeCamera {
    PinholeCamera {
        intrinsics: Intrinsics {
            fx: x[0],
            fy: x[1],
            cx: x[2],
            cy: x[3],
        },
        distortion: BrownConrady {
            k1: x[4],
            k2: x[5],
            p1: x[6],
            p2: x[7],
            k3: x[8],
        },
    }
}

pub fn decode_pose(x: &DVector<f64>, view: usize) -> Iso3 {
    let idx = INTRINSIC_DIM + POSE_DIM * view;
    let w = Vector3::new(x[idx], x[idx + 1], x[idx + 2]);
    let t = Translation3::new(x[idx + 3], x[idx + 4], x[idx + 5]);
    Iso3::from_parts(t, UnitQuaternion::from_scaled_axis(w))
}
