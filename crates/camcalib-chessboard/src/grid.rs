//! Lattice growth over ChESS candidates.
//!
//! A seed corner and its two closest non-collinear neighbors define the
//! first cell. The lattice is then grown breadth-first: the image position
//! of every empty neighbor cell is predicted from already assigned corners
//! (linear extrapolation along rows and columns, parallelogram completion
//! across diagonals) and the nearest unused candidate inside a radius
//! proportional to the local spacing is accepted. Prediction is local, so
//! moderate perspective and lens distortion are tolerated.

use crate::corners::Candidate;
use crate::params::GridParams;
use kiddo::{KdTree, SquaredEuclidean};
use log::debug;
use nalgebra::{Point2, Vector2};
use std::collections::{HashMap, VecDeque};

type Cell = (i32, i32);

const STEPS: [Cell; 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const DIAGONALS: [Cell; 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

/// Candidates arranged as a complete `rows x cols` lattice.
#[derive(Clone, Debug, PartialEq)]
pub struct GridMatch {
    pub rows: usize,
    pub cols: usize,
    /// Candidate indices, row-major with the column index varying fastest.
    pub indices: Vec<usize>,
}

impl GridMatch {
    pub fn at(&self, r: usize, c: usize) -> usize {
        self.indices[r * self.cols + c]
    }
}

/// Try the strongest candidates as seeds until one grows into a complete
/// `rows x cols` lattice.
pub fn assemble_grid(
    candidates: &[Candidate],
    rows: usize,
    cols: usize,
    params: &GridParams,
) -> Option<GridMatch> {
    if rows == 0 || cols == 0 || candidates.len() < rows * cols {
        return None;
    }

    let coords = candidates
        .iter()
        .map(|c| [c.position.x, c.position.y])
        .collect::<Vec<_>>();
    let tree: KdTree<f32, 2> = (&coords).into();

    let mut seeds: Vec<usize> = (0..candidates.len()).collect();
    seeds.sort_by(|&a, &b| candidates[b].strength.total_cmp(&candidates[a].strength));
    seeds.truncate(params.max_seeds.max(1));

    let grower = Grower {
        candidates,
        tree: &tree,
        params,
        max_extent: rows.max(cols) as i32,
    };

    for (attempt, &seed) in seeds.iter().enumerate() {
        let Some((u, v)) = grower.seed_axes(seed) else {
            continue;
        };
        let cells = grower.grow(seed, u, v);
        if let Some(found) = complete_board(&cells, rows, cols) {
            debug!(
                "lattice grown from seed #{attempt} ({} cells assigned)",
                cells.len()
            );
            return Some(found);
        }
    }

    debug!(
        "no complete {rows}x{cols} lattice among {} candidates",
        candidates.len()
    );
    None
}

struct Grower<'a> {
    candidates: &'a [Candidate],
    tree: &'a KdTree<f32, 2>,
    params: &'a GridParams,
    max_extent: i32,
}

impl Grower<'_> {
    fn pos(&self, idx: usize) -> Point2<f32> {
        self.candidates[idx].position
    }

    /// Nearest neighbor inside the spacing window, then the nearest one that
    /// is roughly orthogonal to it and of comparable length.
    fn seed_axes(&self, seed: usize) -> Option<(usize, usize)> {
        let p = self.pos(seed);
        let results = self
            .tree
            .nearest_n::<SquaredEuclidean>(&[p.x, p.y], self.params.k_neighbors + 1);

        let mut u: Option<(usize, Vector2<f32>)> = None;
        for nn in results.into_iter() {
            let idx = nn.item as usize;
            if idx == seed {
                continue;
            }
            let d = nn.distance.sqrt();
            if d < self.params.min_spacing_pix || d > self.params.max_spacing_pix {
                continue;
            }
            let dir = self.pos(idx) - p;
            match u {
                None => u = Some((idx, dir)),
                Some((u_idx, u_dir)) => {
                    let cos = u_dir.dot(&dir) / (u_dir.norm() * dir.norm());
                    let ratio = dir.norm() / u_dir.norm();
                    if cos.abs() < 0.707 && (0.5..=2.0).contains(&ratio) {
                        return Some((u_idx, idx));
                    }
                }
            }
        }
        None
    }

    fn grow(&self, seed: usize, u: usize, v: usize) -> HashMap<Cell, usize> {
        let mut cells: HashMap<Cell, usize> = HashMap::new();
        let mut used = vec![false; self.candidates.len()];
        let mut queue = VecDeque::new();

        for (cell, idx) in [((0, 0), seed), ((1, 0), u), ((0, 1), v)] {
            cells.insert(cell, idx);
            used[idx] = true;
            queue.push_back(cell);
        }
        let mut bounds = Bounds::new((0, 0));
        bounds.include((1, 0));
        bounds.include((0, 1));

        while let Some((i, j)) = queue.pop_front() {
            for (di, dj) in STEPS {
                let target = (i + di, j + dj);
                if cells.contains_key(&target) || !bounds.fits(target, self.max_extent) {
                    continue;
                }
                let Some((predicted, spacing)) = self.predict(&cells, target) else {
                    continue;
                };
                let radius = self.params.search_radius_rel * spacing;
                let Some(idx) = self.nearest_unused(predicted, radius, &used) else {
                    continue;
                };
                cells.insert(target, idx);
                used[idx] = true;
                bounds.include(target);
                queue.push_back(target);
            }
        }

        cells
    }

    /// Mean of all available predictions for `target`, with the mean
    /// spacing of the corners the predictions were built from.
    fn predict(&self, cells: &HashMap<Cell, usize>, target: Cell) -> Option<(Point2<f32>, f32)> {
        let (ti, tj) = target;
        let get = |c: Cell| cells.get(&c).map(|&idx| self.pos(idx));

        let mut sum = Vector2::<f32>::zeros();
        let mut spacing = 0.0f32;
        let mut n = 0u32;

        for (di, dj) in STEPS {
            let (Some(a), Some(b)) = (get((ti - di, tj - dj)), get((ti - 2 * di, tj - 2 * dj)))
            else {
                continue;
            };
            sum += (a.coords * 2.0) - b.coords;
            spacing += (a - b).norm();
            n += 1;
        }

        for (di, dj) in DIAGONALS {
            let (Some(a), Some(b), Some(c)) = (
                get((ti - di, tj)),
                get((ti, tj - dj)),
                get((ti - di, tj - dj)),
            ) else {
                continue;
            };
            sum += a.coords + b.coords - c.coords;
            spacing += 0.5 * ((a - c).norm() + (b - c).norm());
            n += 1;
        }

        if n == 0 {
            return None;
        }
        let n = n as f32;
        Some((Point2::from(sum / n), spacing / n))
    }

    fn nearest_unused(&self, p: Point2<f32>, radius: f32, used: &[bool]) -> Option<usize> {
        let r2 = radius * radius;
        self.tree
            .nearest_n::<SquaredEuclidean>(&[p.x, p.y], 4)
            .into_iter()
            .take_while(|nn| nn.distance <= r2)
            .map(|nn| nn.item as usize)
            .find(|&idx| !used[idx])
    }
}

#[derive(Clone, Copy, Debug)]
struct Bounds {
    min: Cell,
    max: Cell,
}

impl Bounds {
    fn new(c: Cell) -> Self {
        Self { min: c, max: c }
    }

    fn include(&mut self, (i, j): Cell) {
        self.min = (self.min.0.min(i), self.min.1.min(j));
        self.max = (self.max.0.max(i), self.max.1.max(j));
    }

    fn fits(&self, (i, j): Cell, max_extent: i32) -> bool {
        let w = self.max.0.max(i) - self.min.0.min(i) + 1;
        let h = self.max.1.max(j) - self.min.1.min(j) + 1;
        w <= max_extent && h <= max_extent
    }

    fn of(cells: &HashMap<Cell, usize>) -> Option<Self> {
        let mut keys = cells.keys();
        let mut b = Self::new(*keys.next()?);
        for &c in keys {
            b.include(c);
        }
        Some(b)
    }
}

/// The grown lattice must be exactly the board: a fully populated bounding
/// box of `cols x rows` cells, or `rows x cols` in which case it is
/// transposed. A larger lattice means a bigger board or a wrong pattern
/// shape, and is rejected rather than cropped.
fn complete_board(cells: &HashMap<Cell, usize>, rows: usize, cols: usize) -> Option<GridMatch> {
    if cells.len() != rows * cols {
        return None;
    }
    let bounds = Bounds::of(cells)?;
    let (w, h) = (
        (bounds.max.0 - bounds.min.0 + 1) as usize,
        (bounds.max.1 - bounds.min.1 + 1) as usize,
    );
    // `transposed` maps lattice rows onto the grown i axis.
    let transposed = if (w, h) == (cols, rows) {
        false
    } else if (w, h) == (rows, cols) {
        true
    } else {
        return None;
    };
    let indices = window_indices(cells, bounds.min, rows, cols, transposed)?;
    Some(GridMatch {
        rows,
        cols,
        indices,
    })
}

fn window_indices(
    cells: &HashMap<Cell, usize>,
    (oi, oj): Cell,
    rows: usize,
    cols: usize,
    transposed: bool,
) -> Option<Vec<usize>> {
    let mut indices = Vec::with_capacity(rows * cols);
    for r in 0..rows as i32 {
        for c in 0..cols as i32 {
            let cell = if transposed {
                (oi + r, oj + c)
            } else {
                (oi + c, oj + r)
            };
            indices.push(*cells.get(&cell)?);
        }
    }
    Some(indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice_candidates(
        rows: usize,
        cols: usize,
        origin: (f32, f32),
        step: (f32, f32),
    ) -> Vec<Candidate> {
        let mut out = Vec::new();
        for r in 0..rows {
            for c in 0..cols {
                out.push(Candidate {
                    position: Point2::new(
                        origin.0 + c as f32 * step.0,
                        origin.1 + r as f32 * step.1,
                    ),
                    strength: 100.0,
                });
            }
        }
        out
    }

    fn positions(cands: &[Candidate], m: &GridMatch) -> Vec<Point2<f32>> {
        m.indices.iter().map(|&i| cands[i].position).collect()
    }

    #[test]
    fn regular_lattice_is_assembled_completely() {
        let cands = lattice_candidates(4, 6, (50.0, 40.0), (30.0, 30.0));
        let m = assemble_grid(&cands, 4, 6, &GridParams::default()).expect("grid");
        assert_eq!((m.rows, m.cols), (4, 6));
        assert_eq!(m.indices.len(), 24);

        let mut sorted = m.indices.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 24, "every candidate used exactly once");

        // Neighbors in the match are one step apart in the image.
        let pts = positions(&cands, &m);
        for r in 0..4 {
            for c in 0..5 {
                let d = (pts[r * 6 + c + 1] - pts[r * 6 + c]).norm();
                assert!((d - 30.0).abs() < 1e-3, "row step {d}");
            }
        }
        for r in 0..3 {
            for c in 0..6 {
                let d = (pts[(r + 1) * 6 + c] - pts[r * 6 + c]).norm();
                assert!((d - 30.0).abs() < 1e-3, "col step {d}");
            }
        }
    }

    #[test]
    fn transposed_shape_is_accepted() {
        // Board laid out 6 tall and 4 wide while 4x6 is requested.
        let cands = lattice_candidates(6, 4, (50.0, 40.0), (25.0, 25.0));
        let m = assemble_grid(&cands, 4, 6, &GridParams::default()).expect("grid");
        assert_eq!((m.rows, m.cols), (4, 6));
        let pts = positions(&cands, &m);
        // Consecutive entries within a lattice row are adjacent corners.
        let d = (pts[1] - pts[0]).norm();
        assert!((d - 25.0).abs() < 1e-3);
    }

    #[test]
    fn perspective_lattice_is_assembled() {
        let h = nalgebra::Matrix3::new(
            1.0f32, 0.15, 80.0, //
            0.05, 0.9, 60.0, //
            0.0012, 0.0006, 1.0,
        );
        let cands: Vec<Candidate> = (0..5)
            .flat_map(|r| (0..7).map(move |c| (r, c)))
            .map(|(r, c)| {
                let v = h * nalgebra::Vector3::new(c as f32 * 35.0, r as f32 * 35.0, 1.0);
                Candidate {
                    position: Point2::new(v.x / v.z, v.y / v.z),
                    strength: 50.0,
                }
            })
            .collect();
        let m = assemble_grid(&cands, 5, 7, &GridParams::default()).expect("grid");
        assert_eq!(m.indices.len(), 35);
    }

    #[test]
    fn clutter_outside_the_board_is_ignored() {
        let mut cands = lattice_candidates(3, 5, (100.0, 100.0), (40.0, 40.0));
        cands.push(Candidate {
            position: Point2::new(10.0, 12.0),
            strength: 500.0,
        });
        cands.push(Candidate {
            position: Point2::new(400.0, 20.0),
            strength: 1.0,
        });
        let m = assemble_grid(&cands, 3, 5, &GridParams::default()).expect("grid");
        assert!(m.indices.iter().all(|&i| i < 15));
    }

    #[test]
    fn incomplete_board_is_rejected() {
        let mut cands = lattice_candidates(4, 5, (60.0, 60.0), (30.0, 30.0));
        cands.remove(7);
        assert!(assemble_grid(&cands, 4, 5, &GridParams::default()).is_none());
    }

    #[test]
    fn larger_board_than_requested_is_rejected() {
        let cands = lattice_candidates(5, 6, (60.0, 60.0), (30.0, 30.0));
        assert!(assemble_grid(&cands, 4, 6, &GridParams::default()).is_none());
    }

    #[test]
    fn too_few_candidates_is_rejected_early() {
        let cands = lattice_candidates(2, 2, (0.0, 0.0), (20.0, 20.0));
        assert!(assemble_grid(&cands, 3, 3, &GridParams::default()).is_none());
        assert!(assemble_grid(&[], 0, 3, &GridParams::default()).is_none());
    }
}
