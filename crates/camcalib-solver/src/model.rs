//! Pinhole camera with Brown–Conrady distortion.

use camcalib_core::{Pt2, Pt3};
use nalgebra::{Isometry3, Matrix3, Point3, Vector2};
use serde::{Deserialize, Serialize};

/// Rigid transform from board coordinates into camera coordinates.
pub type Iso3 = Isometry3<f64>;

/// Focal lengths and principal point in pixels (zero skew).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    /// `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`
    pub fn k_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }
}

/// Radial (`k1`, `k2`, `k3`) and tangential (`p1`, `p2`) distortion applied
/// to normalized image coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl BrownConrady {
    pub fn distort(&self, n: Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let xy = x * y;
        let x_tan = 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * xy;
        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }

    /// Fixed-point inversion of [`Self::distort`]; accurate for the moderate
    /// distortion of ordinary lenses.
    pub fn undistort(&self, n_dist: Vector2<f64>) -> Vector2<f64> {
        let mut n = n_dist;
        for _ in 0..20 {
            n -= self.distort(n) - n_dist;
        }
        n
    }

    /// Coefficients in the conventional `[k1, k2, p1, p2, k3]` order.
    pub fn coefficients(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PinholeCamera {
    pub intrinsics: Intrinsics,
    pub distortion: BrownConrady,
}

impl PinholeCamera {
    /// Project a point given in camera coordinates. Points at or behind the
    /// camera center have no projection.
    pub fn project(&self, p_c: &Point3<f64>) -> Option<Pt2> {
        if p_c.z <= 1e-12 {
            return None;
        }
        let n = self
            .distortion
            .distort(Vector2::new(p_c.x / p_c.z, p_c.y / p_c.z));
        let k = &self.intrinsics;
        Some(Pt2::new(k.fx * n.x + k.cx, k.fy * n.y + k.cy))
    }

    /// Project a board point seen from `pose`.
    pub fn project_board(&self, pose: &Iso3, p: &Pt3) -> Option<Pt2> {
        self.project(&pose.transform_point(p))
    }

    /// Normalized, undistorted viewing direction of a pixel (`z = 1`).
    pub fn unproject(&self, px: &Pt2) -> Vector2<f64> {
        let k = &self.intrinsics;
        self.distortion
            .undistort(Vector2::new((px.x - k.cx) / k.fx, (px.y - k.cy) / k.fy))
    }
}
