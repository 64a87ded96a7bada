use chess_corners::ChessConfig;
use serde::{Deserialize, Serialize};

/// Settings forwarded to the `chess-corners` single-scale detector.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChessParams {
    /// Sample the r=10 ring instead of the canonical r=5 (heavily blurred input).
    pub use_radius10: bool,
    /// Relative threshold as a fraction of the max response.
    pub threshold_rel: f32,
    /// Non-maximum suppression radius (in pixels).
    pub nms_radius: u32,
    /// Minimum count of positive-response neighbors in the NMS window
    /// to accept a corner (rejects isolated noise).
    pub min_cluster_size: u32,
}

impl Default for ChessParams {
    fn default() -> Self {
        Self {
            use_radius10: false,
            threshold_rel: 0.2,
            nms_radius: 2,
            min_cluster_size: 2,
        }
    }
}

impl ChessParams {
    pub fn chess_config(&self) -> ChessConfig {
        let mut cfg = ChessConfig::single_scale();
        cfg.params.use_radius10 = self.use_radius10;
        cfg.params.threshold_rel = self.threshold_rel;
        cfg.params.nms_radius = self.nms_radius;
        cfg.params.min_cluster_size = self.min_cluster_size;
        cfg
    }
}

/// Parameters of the lattice growth over ChESS candidates.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct GridParams {
    /// Nearest neighbors inspected when picking the two seed axes.
    pub k_neighbors: usize,
    /// Neighbor distance window for the seed axes.
    pub min_spacing_pix: f32,
    pub max_spacing_pix: f32,
    /// Acceptance radius around a predicted corner, relative to the local spacing.
    pub search_radius_rel: f32,
    /// Strongest candidates tried as seeds before giving up.
    pub max_seeds: usize,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            k_neighbors: 8,
            min_spacing_pix: 6.0,
            max_spacing_pix: 400.0,
            search_radius_rel: 0.35,
            max_seeds: 24,
        }
    }
}

/// Termination of the gradient-based sub-pixel refinement.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SubPixParams {
    /// Half size of the search window; 5 gives the usual 11x11 window.
    pub half_window: u32,
    pub max_iters: u32,
    /// Stop once the corner moves less than this many pixels.
    pub epsilon: f64,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            half_window: 5,
            max_iters: 30,
            epsilon: 0.001,
        }
    }
}

/// Parameters specific to the chessboard detector.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    pub chess: ChessParams,
    pub grid: GridParams,
    pub subpix: SubPixParams,
    pub checker: CheckerParams,
}

/// Photometric check that a grown lattice really sits on a checkerboard.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CheckerParams {
    /// Minimal mean intensity difference between neighboring squares.
    pub min_contrast: f32,
    /// Fraction of neighboring square pairs that must alternate correctly.
    pub min_alternation: f32,
}

impl Default for CheckerParams {
    fn default() -> Self {
        Self {
            min_contrast: 20.0,
            min_alternation: 0.9,
        }
    }
}
