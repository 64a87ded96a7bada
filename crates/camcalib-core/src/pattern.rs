//! Checkerboard geometry: pattern shape, square size and the object lattice.

use crate::Pt3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pattern validation errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    #[error("pattern rows and cols must be > 0 (got {rows}x{cols})")]
    InvalidShape { rows: u32, cols: u32 },
    #[error("square size must be a positive finite number of millimeters (got {0})")]
    InvalidSquareSize(f64),
    #[error("cannot parse pattern shape {0:?}, expected \"RxC\" such as \"6x9\"")]
    Unparsable(String),
}

/// Number of *inner* corners along each board axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PatternShapeRepr")]
pub struct PatternShape {
    pub rows: u32,
    pub cols: u32,
}

impl PatternShape {
    pub fn new(rows: u32, cols: u32) -> Result<Self, PatternError> {
        if rows == 0 || cols == 0 {
            return Err(PatternError::InvalidShape { rows, cols });
        }
        Ok(Self { rows, cols })
    }

    /// Total number of inner corners.
    pub fn corner_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }
}

impl fmt::Display for PatternShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

impl FromStr for PatternShape {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unparsable = || PatternError::Unparsable(s.to_string());
        let (rows, cols) = s.trim().split_once(['x', 'X']).ok_or_else(unparsable)?;
        let rows = rows.trim().parse().map_err(|_| unparsable())?;
        let cols = cols.trim().parse().map_err(|_| unparsable())?;
        Self::new(rows, cols)
    }
}

/// Accepts either `"6x9"` or `{ "rows": 6, "cols": 9 }` in config files.
#[derive(Deserialize)]
#[serde(untagged)]
enum PatternShapeRepr {
    Text(String),
    Dims { rows: u32, cols: u32 },
}

impl TryFrom<PatternShapeRepr> for PatternShape {
    type Error = PatternError;

    fn try_from(repr: PatternShapeRepr) -> Result<Self, Self::Error> {
        match repr {
            PatternShapeRepr::Text(s) => s.parse(),
            PatternShapeRepr::Dims { rows, cols } => Self::new(rows, cols),
        }
    }
}

/// Physical edge length of one board square, in millimeters.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct SquareSize(f64);

impl SquareSize {
    pub fn new(mm: f64) -> Result<Self, PatternError> {
        if !mm.is_finite() || mm <= 0.0 {
            return Err(PatternError::InvalidSquareSize(mm));
        }
        Ok(Self(mm))
    }

    pub fn mm(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for SquareSize {
    type Error = PatternError;

    fn try_from(mm: f64) -> Result<Self, Self::Error> {
        Self::new(mm)
    }
}

impl From<SquareSize> for f64 {
    fn from(s: SquareSize) -> Self {
        s.0
    }
}

/// Canonical 3D positions of the inner corners, `z = 0`.
///
/// Row-major with the column index varying fastest: point `r * cols + c`
/// sits at `(c * s, r * s, 0)`. This is the order in which the chessboard
/// detector reports corners.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectLattice {
    shape: PatternShape,
    square_size: SquareSize,
    points: Vec<Pt3>,
}

impl ObjectLattice {
    pub fn generate(shape: PatternShape, square_size: SquareSize) -> Self {
        let s = square_size.mm();
        let points = (0..shape.rows)
            .flat_map(|r| (0..shape.cols).map(move |c| Pt3::new(c as f64 * s, r as f64 * s, 0.0)))
            .collect();
        Self {
            shape,
            square_size,
            points,
        }
    }

    pub fn shape(&self) -> PatternShape {
        self.shape
    }

    pub fn square_size(&self) -> SquareSize {
        self.square_size
    }

    pub fn points(&self) -> &[Pt3] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
