//! Checkerboard inner-corner detector built on top of `camcalib-core`.
//!
//! ## Quickstart
//!
//! ```
//! use camcalib_chessboard::{ChessboardDetector, ChessboardParams};
//! use camcalib_core::PatternShape;
//!
//! let pattern = PatternShape::new(6, 9).expect("valid shape");
//! let detector = ChessboardDetector::new(pattern, ChessboardParams::default());
//!
//! let img = image::DynamicImage::new_luma8(64, 48);
//! let result = detector.detect(&img);
//! println!("detected: {}", result.is_some());
//! ```
//!
//! Algorithm:
//! 1. ChESS corner candidates from `chess-corners` (single scale, relative
//!    threshold and non-maximum suppression from [`ChessParams`]).
//! 2. Starting from the strongest candidates, a lattice is grown
//!    breadth-first by predicting neighbor positions from assigned corners
//!    and accepting the nearest candidate within a spacing-relative radius.
//! 3. A complete `rows x cols` window (in either orientation) is required.
//! 4. The squares between the corners must alternate dark/light.
//! 5. Corners are put in reading order and refined to sub-pixel accuracy
//!    with the gradient-orthogonality criterion.

mod corners;
mod detector;
mod draw;
mod grid;
mod params;
mod subpix;

pub use corners::{find_candidates, Candidate};
pub use detector::{ChessboardDetection, ChessboardDetector};
pub use grid::{assemble_grid, GridMatch};
pub use params::{CheckerParams, ChessParams, ChessboardParams, GridParams, SubPixParams};
pub use subpix::refine_corner;
