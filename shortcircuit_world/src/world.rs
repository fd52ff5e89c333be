//! The World: a collection of grids plus a FIFO message queue, the layer
//! that turns editor/host intent into grid operations.

use std::collections::VecDeque;
use std::fs;

use shortcircuit_engine::{Grid, Node};
use tracing::{info, warn};

use crate::error::WorldError;
use crate::message::Message;

/// Owns every grid in play and the queue of messages waiting to be
/// applied to them. The grid is the only mutable simulation state; the
/// World's job is dispatch, not simulation.
#[derive(Debug, Default)]
pub struct World {
    grids: Vec<Grid>,
    queue: VecDeque<Message>,
}

impl World {
    /// Creates a world with no grids and an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a world seeded with the given grids.
    #[must_use]
    pub fn with_grids(grids: Vec<Grid>) -> Self {
        Self {
            grids,
            queue: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn grids(&self) -> &[Grid] {
        &self.grids
    }

    /// Enqueues a message for later processing by [`World::process_queue`].
    pub fn submit(&mut self, message: Message) {
        self.queue.push_back(message);
    }

    fn grid_mut(&mut self, index: usize) -> Result<&mut Grid, WorldError> {
        let count = self.grids.len();
        self.grids
            .get_mut(index)
            .ok_or_else(|| WorldError::no_such_grid(index, count))
    }

    fn grid(&self, index: usize) -> Result<&Grid, WorldError> {
        let count = self.grids.len();
        self.grids
            .get(index)
            .ok_or_else(|| WorldError::no_such_grid(index, count))
    }

    /// Applies one message. Messages are applied fully before the caller
    /// regains control, per the engine's single-threaded, non-suspending
    /// execution model; no message partially applies.
    pub fn apply(&mut self, message: Message) -> Result<(), WorldError> {
        match message {
            Message::TileSet { coord, index, node } => {
                let node = node.and_then(Node::deserialize);
                self.grid_mut(index)?.set(coord, node)?;
            }
            Message::NandRotate {
                coord,
                index,
                delta,
            } => {
                self.grid_mut(index)?.rotate_nand(coord, delta);
            }
            Message::SwitchToggle {
                coord,
                index,
                value,
            } => {
                let grid = self.grid_mut(index)?;
                match value {
                    Some(wanted) => {
                        let current = grid.get(coord).map(Node::output).unwrap_or(false);
                        if current != wanted {
                            grid.toggle_switch(coord);
                        }
                    }
                    None => grid.toggle_switch(coord),
                }
            }
            Message::Tick { count } => {
                for grid in &mut self.grids {
                    for _ in 0..count {
                        grid.tick();
                    }
                }
            }
            Message::Copy { from, dims, to } => {
                let (width, height) = dims;
                if from.index == to.index {
                    let mut scratch = Grid::new(width, height);
                    {
                        let src = self.grid(from.index)?;
                        src.copy_region(
                            from.coord,
                            width,
                            height,
                            &mut scratch,
                            shortcircuit_common::Coord::new(0, 0),
                        )?;
                    }
                    let dest = self.grid_mut(to.index)?;
                    scratch.copy_region(
                        shortcircuit_common::Coord::new(0, 0),
                        width,
                        height,
                        dest,
                        to.coord,
                    )?;
                } else {
                    let src = self.grid(from.index)?.clone();
                    let dest = self.grid_mut(to.index)?;
                    src.copy_region(from.coord, width, height, dest, to.coord)?;
                }
            }
            Message::WriteBoard { index, filepath } => {
                let serialized = self.grid(index)?.serialize();
                fs::write(&filepath, serialized).map_err(|source| WorldError::WriteBoard {
                    path: filepath,
                    source,
                })?;
                info!(index, "wrote board to disk");
            }
            Message::Quit => {}
        }
        Ok(())
    }

    /// Drains and applies every queued message in FIFO order. Stops (and
    /// returns the error) at the first message that fails; messages
    /// already applied remain applied, and the remaining queue is left
    /// for the caller to retry or discard.
    ///
    /// Returns `true` if a `quit` message was among those processed.
    pub fn process_queue(&mut self) -> Result<bool, WorldError> {
        let mut quit = false;
        while let Some(message) = self.queue.pop_front() {
            let is_quit = matches!(message, Message::Quit);
            if let Err(err) = self.apply(message) {
                warn!(%err, "message failed to apply");
                return Err(err);
            }
            if is_quit {
                quit = true;
                break;
            }
        }
        Ok(quit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shortcircuit_common::Coord;

    #[test]
    fn tile_set_places_a_node() {
        let mut world = World::with_grids(vec![Grid::new(2, 2)]);
        world
            .apply(Message::TileSet {
                coord: Coord::new(0, 0),
                index: 0,
                node: Some('-'),
            })
            .unwrap();
        assert!(world.grid(0).unwrap().get(Coord::new(0, 0)).is_some());
    }

    #[test]
    fn switch_toggle_null_flips_current_state() {
        let mut world = World::with_grids(vec![Grid::new(1, 1)]);
        world
            .apply(Message::TileSet {
                coord: Coord::new(0, 0),
                index: 0,
                node: Some('x'),
            })
            .unwrap();
        world
            .apply(Message::SwitchToggle {
                coord: Coord::new(0, 0),
                index: 0,
                value: None,
            })
            .unwrap();
        assert!(world.grid(0).unwrap().get(Coord::new(0, 0)).unwrap().output());
    }

    #[test]
    fn unknown_grid_index_is_an_error() {
        let mut world = World::with_grids(vec![Grid::new(1, 1)]);
        let err = world
            .apply(Message::TileSet {
                coord: Coord::new(0, 0),
                index: 5,
                node: Some('-'),
            })
            .unwrap_err();
        assert!(matches!(err, WorldError::NoSuchGrid { .. }));
    }

    #[test]
    fn quit_stops_queue_processing() {
        let mut world = World::with_grids(vec![Grid::new(1, 1)]);
        world.submit(Message::Quit);
        world.submit(Message::TileSet {
            coord: Coord::new(0, 0),
            index: 0,
            node: Some('-'),
        });
        let quit = world.process_queue().unwrap();
        assert!(quit);
        assert!(world.grid(0).unwrap().get(Coord::new(0, 0)).is_none());
    }

    #[test]
    fn copy_across_grids_does_not_alias_wires() {
        let mut src = Grid::new(1, 1);
        src.set(Coord::new(0, 0), Some(shortcircuit_engine::Node::Wire(
            shortcircuit_engine::Wire::default(),
        )))
        .unwrap();
        let mut world = World::with_grids(vec![src, Grid::new(1, 1)]);
        world
            .apply(Message::Copy {
                from: crate::message::RegionEnd {
                    index: 0,
                    coord: Coord::new(0, 0),
                },
                dims: (1, 1),
                to: crate::message::RegionEnd {
                    index: 1,
                    coord: Coord::new(0, 0),
                },
            })
            .unwrap();
        assert!(world.grid(1).unwrap().get(Coord::new(0, 0)).is_some());
    }
}
