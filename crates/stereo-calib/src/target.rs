//! Calibration-pattern geometry.

use stereo_core::{ConfigError, Pt2, Pt3, Real};

/// Physical checkerboard description.
///
/// `rows` and `cols` count squares; the detectable inner-corner grid is
/// `(rows - 1) x (cols - 1)`.
#[derive(Clone, Copy, Debug)]
pub struct ChessboardGeometry {
    pub rows: usize,
    pub cols: usize,
    /// Physical side length of one square (the unit fixes the scale of the
    /// solved baseline; metres throughout this repo).
    pub square_size: Real,
}

impl ChessboardGeometry {
    pub fn new(rows: usize, cols: usize, square_size: Real) -> Result<Self, ConfigError> {
        if rows < 3 || cols < 3 {
            return Err(ConfigError(format!(
                "checkerboard needs at least 3x3 squares, got {rows}x{cols}"
            )));
        }
        if square_size <= 0.0 {
            return Err(ConfigError(format!(
                "square_size must be positive, got {square_size}"
            )));
        }
        Ok(Self {
            rows,
            cols,
            square_size,
        })
    }

    pub fn inner_rows(&self) -> usize {
        self.rows - 1
    }

    pub fn inner_cols(&self) -> usize {
        self.cols - 1
    }

    /// Number of inner corners a full detection must return.
    pub fn corner_count(&self) -> usize {
        self.inner_rows() * self.inner_cols()
    }

    /// Inner-corner coordinates on the board plane, row-major (Y major),
    /// matching the ordering contract of the corner detector.
    pub fn object_points_2d(&self) -> Vec<Pt2> {
        let mut pts = Vec::with_capacity(self.corner_count());
        for j in 0..self.inner_rows() {
            for i in 0..self.inner_cols() {
                pts.push(Pt2::new(
                    i as Real * self.square_size,
                    j as Real * self.square_size,
                ));
            }
        }
        pts
    }

    /// Same grid embedded in the `Z = 0` plane.
    pub fn object_points(&self) -> Vec<Pt3> {
        self.object_points_2d()
            .into_iter()
            .map(|p| Pt3::new(p.x, p.y, 0.0))
            .collect()
    }
}
