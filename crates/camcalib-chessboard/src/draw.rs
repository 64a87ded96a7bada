//! Annotated overlays of detected corners.

use crate::detector::ChessboardDetection;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};

/// Per-row colors, cycled for boards with more rows.
const ROW_COLORS: [Rgb<u8>; 6] = [
    Rgb([255, 0, 0]),
    Rgb([255, 128, 0]),
    Rgb([200, 200, 0]),
    Rgb([0, 200, 0]),
    Rgb([0, 128, 255]),
    Rgb([160, 0, 255]),
];

impl ChessboardDetection {
    /// Copy of `img` with every corner circled and the lattice traced in
    /// detection order: each row in its own color, consecutive rows joined
    /// from the last corner of one to the first corner of the next.
    pub fn draw(&self, img: &DynamicImage) -> RgbImage {
        let mut canvas = img.to_rgb8();
        let cols = self.shape.cols as usize;
        let radius = (canvas.width().min(canvas.height()) / 150).max(3) as i32;

        let mut prev: Option<(f32, f32)> = None;
        for (k, p) in self.corners.iter().enumerate() {
            let color = ROW_COLORS[(k / cols) % ROW_COLORS.len()];
            let here = (p.x as f32, p.y as f32);
            draw_hollow_circle_mut(
                &mut canvas,
                (p.x.round() as i32, p.y.round() as i32),
                radius,
                color,
            );
            if let Some(from) = prev {
                draw_line_segment_mut(&mut canvas, from, here, color);
            }
            prev = Some(here);
        }
        canvas
    }
}
