//! Core types and utilities for checkerboard camera calibration.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete corner detector, image decoder or solver.

mod homography;
mod image;
mod logger;
mod pattern;

pub use homography::{estimate_homography, Homography};
pub use image::{sample_bilinear, GrayImageView};
pub use pattern::{ObjectLattice, PatternError, PatternShape, SquareSize};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;

/// 2D pixel point used for detected corners.
pub type Pt2 = nalgebra::Point2<f64>;

/// 3D point in board coordinates.
pub type Pt3 = nalgebra::Point3<f64>;

/// Ordered corner positions of one image, index-aligned with [`ObjectLattice`].
pub type ImagePointSet = Vec<Pt2>;

/// Image size as `(width, height)` in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
