//! Grid specification for radar composite fields.

use serde::{Deserialize, Serialize};

use crate::error::{NowcastError, NowcastResult};

/// Shape of a row-major radar grid.
///
/// Row 0 is the first row of the stored array; pixel `(x, y)` lives at
/// flat index `y * width + x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Number of columns
    pub width: usize,
    /// Number of rows
    pub height: usize,
}

impl GridSpec {
    /// Create a new grid specification.
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Total number of pixels.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Check if grid is empty.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Get the 1D array index for a 2D grid position.
    #[inline]
    pub fn flat_index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Split a flat index back into `(x, y)`.
    #[inline]
    pub fn coords(&self, index: usize) -> (usize, usize) {
        (index % self.width, index / self.width)
    }

    /// Round a continuous position to the nearest pixel.
    ///
    /// Pixel centres sit on integer coordinates, so a position belongs to
    /// pixel `floor(p + 0.5)`. Returns `None` outside the grid.
    #[inline]
    pub fn nearest_index(&self, x: f64, y: f64) -> Option<usize> {
        let ix = (x + 0.5).floor();
        let iy = (y + 0.5).floor();

        if !ix.is_finite() || !iy.is_finite() {
            return None;
        }
        if ix < 0.0 || iy < 0.0 || ix >= self.width as f64 || iy >= self.height as f64 {
            return None;
        }

        Some(self.flat_index(ix as usize, iy as usize))
    }

    /// Verify that a flat buffer matches this grid.
    pub fn check_len(&self, actual: usize) -> NowcastResult<()> {
        if actual != self.len() {
            return Err(NowcastError::ShapeMismatch {
                expected: self.len(),
                actual,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for GridSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
