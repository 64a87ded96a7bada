//! Gradient-based sub-pixel corner refinement.
//!
//! At the true corner `q` every image gradient `g(p)` in the neighborhood is
//! orthogonal to `p - q`. Summing `g gᵀ (p - q) = 0` over a Gaussian-weighted
//! window gives a 2x2 linear system for `q`, which is re-solved around the
//! updated estimate until it moves less than `epsilon`.

use crate::params::SubPixParams;
use camcalib_core::{sample_bilinear, GrayImageView};
use nalgebra::{Matrix2, Point2, Vector2};

/// Refine a single corner. The refinement is abandoned, and `init`
/// returned, if the estimate leaves the search window or the structure
/// tensor is singular before the first update.
pub fn refine_corner(
    img: &GrayImageView<'_>,
    init: Point2<f64>,
    params: &SubPixParams,
) -> Point2<f64> {
    let hw = params.half_window.max(1) as i32;
    let hwf = hw as f64;
    let eps2 = params.epsilon * params.epsilon;

    let mut q = init;
    for _ in 0..params.max_iters {
        let mut m = Matrix2::<f64>::zeros();
        let mut b = Vector2::<f64>::zeros();

        for dy in -hw..=hw {
            for dx in -hw..=hw {
                let p = Point2::new(q.x + dx as f64, q.y + dy as f64);
                let g = gradient(img, p);
                let w = (-(dx as f64 / hwf).powi(2) - (dy as f64 / hwf).powi(2)).exp();
                let ggt = g * g.transpose() * w;
                m += ggt;
                b += ggt * p.coords;
            }
        }

        let Some(next) = m.try_inverse().map(|inv| Point2::from(inv * b)) else {
            break;
        };
        if !next.x.is_finite() || !next.y.is_finite() {
            break;
        }
        let shift = (next - q).norm_squared();
        q = next;
        if shift < eps2 {
            break;
        }
    }

    if (q.x - init.x).abs() > hwf || (q.y - init.y).abs() > hwf {
        return init;
    }
    q
}

fn gradient(img: &GrayImageView<'_>, p: Point2<f64>) -> Vector2<f64> {
    let (x, y) = (p.x as f32, p.y as f32);
    let gx = sample_bilinear(img, x + 1.0, y) - sample_bilinear(img, x - 1.0, y);
    let gy = sample_bilinear(img, x, y + 1.0) - sample_bilinear(img, x, y - 1.0);
    Vector2::new(0.5 * gx as f64, 0.5 * gy as f64)
}
