use crate::corners::{find_candidates, Candidate};
use crate::grid::{assemble_grid, GridMatch};
use crate::params::{CheckerParams, ChessboardParams};
use crate::subpix::refine_corner;
use camcalib_core::{sample_bilinear, GrayImageView, ImagePointSet, PatternShape, Pt2};
use image::{DynamicImage, GrayImage};
use log::debug;
use nalgebra::{Point2, Vector2};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Inner corners of one detected board.
#[derive(Clone, Debug, PartialEq)]
pub struct ChessboardDetection {
    pub shape: PatternShape,
    /// Sub-pixel corners, row-major with the column index varying fastest,
    /// index-aligned with the object lattice of `shape`.
    pub corners: ImagePointSet,
    /// ChESS response of every corner, same order as `corners`.
    pub strengths: Vec<f32>,
}

/// Chessboard detector for a fixed pattern shape.
///
/// Detection either returns all `rows * cols` inner corners or nothing;
/// partial boards are never reported.
#[derive(Clone, Debug)]
pub struct ChessboardDetector {
    pattern: PatternShape,
    params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(pattern: PatternShape, params: ChessboardParams) -> Self {
        Self { pattern, params }
    }

    pub fn pattern(&self) -> PatternShape {
        self.pattern
    }

    pub fn params(&self) -> &ChessboardParams {
        &self.params
    }

    /// Detect the board in a decoded image of any color type.
    pub fn detect(&self, img: &DynamicImage) -> Option<ChessboardDetection> {
        self.detect_gray(&img.to_luma8())
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip(self, img),
            fields(width = img.width(), height = img.height())
        )
    )]
    pub fn detect_gray(&self, img: &GrayImage) -> Option<ChessboardDetection> {
        let (rows, cols) = (self.pattern.rows as usize, self.pattern.cols as usize);
        let view = GrayImageView::new(img.width() as usize, img.height() as usize, img.as_raw())?;

        let candidates = find_candidates(img, &self.params.chess);
        debug!("{} ChESS candidates", candidates.len());
        if candidates.len() < rows * cols {
            return None;
        }
        self.detect_from_candidates(&view, &candidates)
    }

    /// Grid assembly, checker test, ordering and sub-pixel refinement over
    /// precomputed ChESS candidates of `img`.
    pub fn detect_from_candidates(
        &self,
        img: &GrayImageView<'_>,
        candidates: &[Candidate],
    ) -> Option<ChessboardDetection> {
        let (rows, cols) = (self.pattern.rows as usize, self.pattern.cols as usize);
        let grid = assemble_grid(candidates, rows, cols, &self.params.grid)?;
        let mut corners = grid_positions(candidates, &grid);
        let mut strengths: Vec<f32> = grid
            .indices
            .iter()
            .map(|&i| candidates[i].strength)
            .collect();

        if !passes_checker_test(img, &corners, rows, cols, &self.params.checker) {
            debug!("lattice rejected by the checker alternation test");
            return None;
        }

        let order = canonical_order(&corners, rows, cols);
        corners = order.iter().map(|&i| corners[i]).collect();
        strengths = order.iter().map(|&i| strengths[i]).collect();

        let corners = corners
            .into_iter()
            .map(|p| refine_corner(img, p, &self.params.subpix))
            .collect();

        Some(ChessboardDetection {
            shape: self.pattern,
            corners,
            strengths,
        })
    }
}

fn grid_positions(candidates: &[Candidate], grid: &GridMatch) -> Vec<Pt2> {
    grid.indices
        .iter()
        .map(|&i| {
            let p = candidates[i].position;
            Point2::new(p.x as f64, p.y as f64)
        })
        .collect()
}

/// Mean intensity inside the quadrilateral spanned by four corners.
fn cell_intensity(img: &GrayImageView<'_>, quad: [Pt2; 4]) -> f32 {
    let center = quad.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / 4.0;
    let mut acc = sample_at(img, center);
    for p in quad {
        acc += sample_at(img, center + (p.coords - center) * 0.5);
    }
    acc / 5.0
}

fn sample_at(img: &GrayImageView<'_>, p: Vector2<f64>) -> f32 {
    sample_bilinear(img, p.x as f32, p.y as f32)
}

/// Neighboring squares between the lattice corners must alternate between
/// dark and light with enough contrast. Boards without interior squares
/// (a single row or column of corners) pass trivially.
fn passes_checker_test(
    img: &GrayImageView<'_>,
    corners: &[Pt2],
    rows: usize,
    cols: usize,
    params: &CheckerParams,
) -> bool {
    if rows < 2 || cols < 2 {
        return true;
    }
    let (cell_rows, cell_cols) = (rows - 1, cols - 1);
    let at = |r: usize, c: usize| corners[r * cols + c];

    let mut cells = Vec::with_capacity(cell_rows * cell_cols);
    for r in 0..cell_rows {
        for c in 0..cell_cols {
            cells.push(cell_intensity(
                img,
                [at(r, c), at(r, c + 1), at(r + 1, c + 1), at(r + 1, c)],
            ));
        }
    }

    // Differences are taken as "even parity cell minus odd parity cell" so
    // that a proper board gives a single sign throughout.
    let mut diffs = Vec::new();
    for r in 0..cell_rows {
        for c in 0..cell_cols {
            let here = cells[r * cell_cols + c];
            let sign = if (r + c) % 2 == 0 { 1.0 } else { -1.0 };
            if c + 1 < cell_cols {
                diffs.push(sign * (here - cells[r * cell_cols + c + 1]));
            }
            if r + 1 < cell_rows {
                diffs.push(sign * (here - cells[(r + 1) * cell_cols + c]));
            }
        }
    }
    if diffs.is_empty() {
        return true;
    }

    let n = diffs.len() as f32;
    let positive = diffs.iter().filter(|&&d| d > 0.0).count() as f32;
    let alternation = positive.max(n - positive) / n;
    let contrast = diffs.iter().map(|d| d.abs()).sum::<f32>() / n;
    debug!("checker test: alternation {alternation:.2}, contrast {contrast:.1}");

    alternation >= params.min_alternation && contrast >= params.min_contrast
}

/// Permutation that puts the corners in a stable reading order: the first
/// corner is the top-left one, columns run left to right and rows top to
/// bottom. For square patterns the lattice axis closer to horizontal
/// becomes the column axis.
fn canonical_order(corners: &[Pt2], rows: usize, cols: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..rows * cols).collect();
    let (col_dir, row_dir) = lattice_axes(corners, &order, rows, cols);

    if rows == cols && horizontality(row_dir) > horizontality(col_dir) {
        order = (0..rows * cols)
            .map(|k| (k % cols) * cols + k / cols)
            .collect();
    }

    let (col_dir, row_dir) = lattice_axes(corners, &order, rows, cols);
    let flip_cols = col_dir.x < 0.0;
    let flip_rows = row_dir.y < 0.0;

    (0..rows)
        .flat_map(|r| (0..cols).map(move |c| (r, c)))
        .map(|(r, c)| {
            let r = if flip_rows { rows - 1 - r } else { r };
            let c = if flip_cols { cols - 1 - c } else { c };
            order[r * cols + c]
        })
        .collect()
}

/// Mean vector along a lattice row (first to last column) and along a
/// lattice column (first to last row).
fn lattice_axes(
    corners: &[Pt2],
    order: &[usize],
    rows: usize,
    cols: usize,
) -> (Vector2<f64>, Vector2<f64>) {
    let at = |r: usize, c: usize| corners[order[r * cols + c]];
    let mut col_dir = Vector2::zeros();
    for r in 0..rows {
        col_dir += at(r, cols - 1) - at(r, 0);
    }
    let mut row_dir = Vector2::zeros();
    for c in 0..cols {
        row_dir += at(rows - 1, c) - at(0, c);
    }
    (col_dir / rows as f64, row_dir / cols as f64)
}

fn horizontality(v: Vector2<f64>) -> f64 {
    let n = v.norm();
    if n > 0.0 {
        v.x.abs() / n
    } else {
        0.0
    }
}
