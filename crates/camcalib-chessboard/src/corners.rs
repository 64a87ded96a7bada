//! ChESS corner candidates from `chess-corners`.

use crate::params::ChessParams;
use chess_corners::{find_chess_corners_image, CornerDescriptor};
use image::GrayImage;
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// One ChESS corner in full-resolution pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub position: Point2<f32>,
    pub strength: f32,
}

fn adapt_chess_corner(c: &CornerDescriptor) -> Candidate {
    Candidate {
        position: Point2::new(c.x, c.y),
        strength: c.response,
    }
}

/// Run the single-scale ChESS detector and keep position and strength of
/// every corner.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(img, params),
        fields(width = img.width(), height = img.height())
    )
)]
pub fn find_candidates(img: &GrayImage, params: &ChessParams) -> Vec<Candidate> {
    if img.width() == 0 || img.height() == 0 {
        return Vec::new();
    }
    find_chess_corners_image(img, &params.chess_config())
        .iter()
        .map(adapt_chess_corner)
        .collect()
}
