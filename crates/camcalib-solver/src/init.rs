//! Closed-form initialization from plane-to-image homographies.

use crate::model::{Intrinsics, Iso3};
use nalgebra::{DMatrix, DVector, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};

/// Focal lengths from the orthogonality constraints of the homographies,
/// with the principal point fixed at `(cx, cy)`.
///
/// With the principal point known and zero skew, the image of the absolute
/// conic is `diag(1/fx², 1/fy², 1)` in centered coordinates, so each view
/// contributes two linear equations in `(1/fx², 1/fy²)`. Returns `None` when
/// the system is singular or yields a non-positive solution, which is what
/// fronto-parallel views produce.
pub fn focal_from_homographies(hs: &[Matrix3<f64>], cx: f64, cy: f64) -> Option<(f64, f64)> {
    if hs.is_empty() {
        return None;
    }
    let t_inv = Matrix3::new(
        1.0, 0.0, -cx, //
        0.0, 1.0, -cy, //
        0.0, 0.0, 1.0,
    );

    let mut a = DMatrix::<f64>::zeros(2 * hs.len(), 2);
    let mut b = DVector::<f64>::zeros(2 * hs.len());
    for (k, h) in hs.iter().enumerate() {
        let hc = t_inv * h;
        let norm = hc.norm();
        if norm <= f64::EPSILON {
            return None;
        }
        let hc = hc / norm;
        let (u, v) = (hc.column(0), hc.column(1));

        a[(2 * k, 0)] = u[0] * v[0];
        a[(2 * k, 1)] = u[1] * v[1];
        b[2 * k] = -u[2] * v[2];

        a[(2 * k + 1, 0)] = u[0] * u[0] - v[0] * v[0];
        a[(2 * k + 1, 1)] = u[1] * u[1] - v[1] * v[1];
        b[2 * k + 1] = -(u[2] * u[2] - v[2] * v[2]);
    }

    let ata = a.transpose() * &a;
    let atb = a.transpose() * &b;
    let x = ata.try_inverse()? * atb;
    let (inv_fx2, inv_fy2) = (x[0], x[1]);
    if !(inv_fx2 > 0.0 && inv_fy2 > 0.0) {
        return None;
    }
    let (fx, fy) = (inv_fx2.sqrt().recip(), inv_fy2.sqrt().recip());
    (fx.is_finite() && fy.is_finite()).then_some((fx, fy))
}

/// Decompose a plane-to-image homography into the board pose `T_C_B`.
///
/// The rotation is projected onto SO(3) and the sign of the scale chosen so
/// that the board lies in front of the camera.
pub fn pose_from_homography(k: &Intrinsics, h: &Matrix3<f64>) -> Option<Iso3> {
    let k_inv = k.k_matrix().try_inverse()?;
    let h1 = k_inv * h.column(0);
    let h2 = k_inv * h.column(1);
    let h3 = k_inv * h.column(2);

    let scale = 0.5 * (h1.norm() + h2.norm());
    if scale <= f64::EPSILON {
        return None;
    }
    let mut lambda = 1.0 / scale;
    if (lambda * h3).z < 0.0 {
        lambda = -lambda;
    }

    let r1 = lambda * h1;
    let r2 = lambda * h2;
    let r3 = r1.cross(&r2);
    let r_mat = Matrix3::from_columns(&[r1, r2, r3]);

    // Closest rotation in the Frobenius sense.
    let svd = r_mat.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let t: Vector3<f64> = lambda * h3;
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Some(Iso3::from_parts(Translation3::from(t), rot))
}
