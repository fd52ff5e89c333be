//! Error types shared by the engine and its callers.
//!
//! Per the engine's error-handling design, most failure modes are *not*
//! represented as `Result`s at all: an out-of-bounds read returns "no
//! cell", a malformed glyph becomes an empty cell, and removing an absent
//! input is a no-op. Only a write to an out-of-bounds coordinate is a real
//! error.

use crate::coord::Coord;
use thiserror::Error;

/// Failures that can surface from the engine's public surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A write (`Grid::set`) targeted a coordinate outside the grid.
    #[error("coordinate ({x}, {y}) is out of bounds for a {width}x{height} grid", x = .coord.x, y = .coord.y)]
    CoordOutOfBounds {
        /// The coordinate that was rejected.
        coord: Coord,
        /// Grid width at the time of the write.
        width: usize,
        /// Grid height at the time of the write.
        height: usize,
    },
}

impl EngineError {
    /// Builds a [`EngineError::CoordOutOfBounds`].
    #[must_use]
    pub fn coord_out_of_bounds(coord: Coord, width: usize, height: usize) -> Self {
        Self::CoordOutOfBounds {
            coord,
            width,
            height,
        }
    }
}
