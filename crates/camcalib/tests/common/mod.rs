#![allow(dead_code)]

use camcalib::solver::Iso3;
use image::{GrayImage, Luma};
use nalgebra::{Matrix3, Point3, Translation3, UnitQuaternion, Vector3};
use std::path::{Path, PathBuf};

pub const ROWS: u32 = 6;
pub const COLS: u32 = 9;
pub const SQUARE_MM: f64 = 20.0;
pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;
pub const FX: f64 = 600.0;
pub const FY: f64 = 600.0;
pub const CX: f64 = 320.0;
pub const CY: f64 = 240.0;

pub fn k_matrix() -> Matrix3<f64> {
    Matrix3::new(FX, 0.0, CX, 0.0, FY, CY, 0.0, 0.0, 1.0)
}

/// Board poses with the lattice center roughly on the optical axis.
pub fn poses() -> Vec<Iso3> {
    let tilts = [
        [0.35, 0.0, 0.0],
        [-0.35, 0.1, 0.02],
        [0.0, 0.4, 0.05],
        [0.1, -0.35, -0.05],
        [0.25, 0.25, 0.08],
        [-0.2, -0.3, 0.0],
    ];
    let center = Vector3::new(
        (COLS - 1) as f64 * SQUARE_MM / 2.0,
        (ROWS - 1) as f64 * SQUARE_MM / 2.0,
        0.0,
    );
    tilts
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let rot = UnitQuaternion::from_scaled_axis(Vector3::new(w[0], w[1], w[2]));
            let offset = Vector3::new(
                (i as f64 - 2.5) * 8.0,
                (i as f64 % 3.0 - 1.0) * 10.0,
                480.0 + 15.0 * i as f64,
            );
            Iso3::from_parts(Translation3::from(offset - rot * center), rot)
        })
        .collect()
}

/// Board millimeters to pixels for a distortion-free camera.
pub fn board_homography(pose: &Iso3) -> Matrix3<f64> {
    let r = pose.rotation.to_rotation_matrix();
    let r = r.matrix();
    let t = pose.translation.vector;
    let rt = Matrix3::from_columns(&[r.column(0).into_owned(), r.column(1).into_owned(), t]);
    k_matrix() * rt
}

/// Gray level of the board plane point `(bx, by)` in millimeters: squares,
/// a white quiet zone of one square and a gray background.
fn shade(bx: f64, by: f64) -> u8 {
    let (x_max, y_max) = (COLS as f64 * SQUARE_MM, ROWS as f64 * SQUARE_MM);
    let on_squares = bx >= -SQUARE_MM && by >= -SQUARE_MM && bx < x_max && by < y_max;
    let on_margin = bx >= -2.0 * SQUARE_MM
        && by >= -2.0 * SQUARE_MM
        && bx < x_max + SQUARE_MM
        && by < y_max + SQUARE_MM;
    if on_squares {
        let i = (bx / SQUARE_MM).floor() as i64;
        let j = (by / SQUARE_MM).floor() as i64;
        if (i + j).rem_euclid(2) == 0 {
            30
        } else {
            225
        }
    } else if on_margin {
        225
    } else {
        120
    }
}

fn shade_at(h_inv: &Matrix3<f64>, px: f64, py: f64) -> u8 {
    let b = h_inv * Vector3::new(px, py, 1.0);
    shade(b.x / b.z, b.y / b.z)
}

/// Samples per axis inside pixels crossed by an edge.
const EDGE_SAMPLES: u32 = 16;

/// Render the board seen from `pose`.
///
/// Pixel `(x, y)` covers `[x - 0.5, x + 0.5] x [y - 0.5, y + 0.5]`. A pixel
/// whose four corners share one shade is flat; the others are averaged over
/// an `EDGE_SAMPLES x EDGE_SAMPLES` grid, which keeps edge positions accurate
/// to a small fraction of a pixel.
pub fn render_view(width: u32, height: u32, pose: &Iso3) -> GrayImage {
    let h_inv = board_homography(pose)
        .try_inverse()
        .expect("invertible homography");
    let stride = width as usize + 1;
    let corners: Vec<u8> = (0..=height)
        .flat_map(|y| (0..=width).map(move |x| (x, y)))
        .map(|(x, y)| shade_at(&h_inv, x as f64 - 0.5, y as f64 - 0.5))
        .collect();

    let n = EDGE_SAMPLES;
    GrayImage::from_fn(width, height, |x, y| {
        let at = |dx: u32, dy: u32| corners[(y + dy) as usize * stride + (x + dx) as usize];
        let c00 = at(0, 0);
        if at(1, 0) == c00 && at(0, 1) == c00 && at(1, 1) == c00 {
            return Luma([c00]);
        }
        let mut acc = 0u32;
        for sy in 0..n {
            for sx in 0..n {
                let px = x as f64 + (sx as f64 + 0.5) / n as f64 - 0.5;
                let py = y as f64 + (sy as f64 + 0.5) / n as f64 - 0.5;
                acc += u32::from(shade_at(&h_inv, px, py));
            }
        }
        Luma([(acc as f64 / (n * n) as f64).round() as u8])
    })
}

/// Pixel position of the lattice corner `(r, c)` under `pose`.
pub fn project_corner(pose: &Iso3, r: u32, c: u32) -> (f64, f64) {
    let p = pose * Point3::new(c as f64 * SQUARE_MM, r as f64 * SQUARE_MM, 0.0);
    (FX * p.x / p.z + CX, FY * p.y / p.z + CY)
}

/// Write the first `count` synthetic views as `view_XX.png` into `dir`.
pub fn write_views(dir: &Path, count: usize) -> Vec<PathBuf> {
    poses()
        .iter()
        .take(count)
        .enumerate()
        .map(|(i, pose)| {
            let path = dir.join(format!("view_{i:02}.png"));
            render_view(WIDTH, HEIGHT, pose)
                .save(&path)
                .expect("save view");
            path
        })
        .collect()
}
