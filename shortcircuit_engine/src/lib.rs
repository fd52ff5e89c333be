//! The simulation engine: node state machines, the arena that owns them,
//! and the grid that wires them together.

pub mod arena;
pub mod grid;
pub mod node;

pub use arena::{Arena, NodeId};
pub use grid::Grid;
pub use node::{Nand, Node, Portal, PortalGroupId, Switch, Wire};

pub use shortcircuit_common::{Coord, Direction, EngineError};
