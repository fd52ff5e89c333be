//! Errors surfaced while applying queued messages to a [`World`](crate::World).

use shortcircuit_common::EngineError;
use thiserror::Error;

/// Failures that can occur while a [`World`](crate::World) processes a
/// message.
#[derive(Debug, Error)]
pub enum WorldError {
    /// A message named a grid index that doesn't exist.
    #[error("message referenced grid index {index}, but the world only has {grid_count} grid(s)")]
    NoSuchGrid { index: usize, grid_count: usize },

    /// The engine itself rejected the operation (currently: an out-of-bounds write).
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// `write_board` failed to write the serialized board to disk.
    #[error("failed to write board to {path}: {source}")]
    WriteBoard {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl WorldError {
    /// Builds a [`WorldError::NoSuchGrid`].
    #[must_use]
    pub fn no_such_grid(index: usize, grid_count: usize) -> Self {
        Self::NoSuchGrid { index, grid_count }
    }
}
