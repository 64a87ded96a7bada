//! Board-plane to image homographies.
//!
//! Each calibration view starts from the projective map between the board
//! plane (lattice `x, y` in millimeters) and the detected pixels.

use nalgebra::{Matrix3, Point2, SMatrix, Vector3};

type Mat9 = SMatrix<f64, 9, 9>;
type Row9 = SMatrix<f64, 1, 9>;

/// Plane-to-plane projective map, `dst ~ H * src`, scaled so `H[(2, 2)] = 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    /// Map a point; `None` when it lands on the line at infinity.
    pub fn apply(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        (v.z.abs() > f64::EPSILON).then(|| Point2::new(v.x / v.z, v.y / v.z))
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }

    /// Root mean square transfer error of `src -> dst` in destination units.
    pub fn transfer_rmse(&self, src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<f64> {
        if src.is_empty() || src.len() != dst.len() {
            return None;
        }
        let mut sum = 0.0;
        for (s, d) in src.iter().zip(dst) {
            sum += (self.apply(*s)? - d).norm_squared();
        }
        Some((sum / src.len() as f64).sqrt())
    }
}

/// Similarity moving the centroid to the origin with mean distance `sqrt(2)`.
/// `None` when all points coincide.
fn conditioning(pts: &[Point2<f64>]) -> Option<Matrix3<f64>> {
    let n = pts.len() as f64;
    let sum = pts
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + Vector3::new(p.x, p.y, 0.0));
    let c = sum / n;
    let spread = pts
        .iter()
        .map(|p| (p.x - c.x).hypot(p.y - c.y))
        .sum::<f64>()
        / n;
    if spread < 1e-12 {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / spread;
    let mut t = Matrix3::from_diagonal(&Vector3::new(s, s, 1.0));
    t[(0, 2)] = -s * c.x;
    t[(1, 2)] = -s * c.y;
    Some(t)
}

fn condition(t: &Matrix3<f64>, p: &Point2<f64>) -> (f64, f64) {
    let v = t * Vector3::new(p.x, p.y, 1.0);
    (v.x, v.y)
}

/// Normalized DLT estimate of `H` with `dst ~ H * src`.
///
/// Works from 4 correspondences up. The null vector of the stacked DLT
/// system is taken as the eigenvector of `AᵀA` with the smallest
/// eigenvalue. Returns `None` for mismatched or short inputs and degenerate
/// point configurations.
pub fn estimate_homography(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }
    let t_src = conditioning(src)?;
    let t_dst = conditioning(dst)?;

    let mut ata = Mat9::zeros();
    for (s, d) in src.iter().zip(dst) {
        let (x, y) = condition(&t_src, s);
        let (u, v) = condition(&t_dst, d);
        let ru = Row9::from_row_slice(&[x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, -u]);
        let rv = Row9::from_row_slice(&[0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y, -v]);
        ata += ru.transpose() * ru + rv.transpose() * rv;
    }

    let eig = ata.symmetric_eigen();
    let (k, _) = eig
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let n = eig.eigenvectors.column(k);
    let hn = Matrix3::new(n[0], n[1], n[2], n[3], n[4], n[5], n[6], n[7], n[8]);

    let h = t_dst.try_inverse()? * hn * t_src;
    let scale = h[(2, 2)];
    if !scale.is_finite() || scale.abs() < 1e-12 {
        return None;
    }
    Some(Homography::new(h / scale))
}
