//! The World layer: grids plus a FIFO message queue that turns editor or
//! host intent into grid operations.

pub mod board_file;
pub mod error;
pub mod message;
pub mod world;

pub use board_file::{load_board, save_board};
pub use error::WorldError;
pub use message::{Message, RegionEnd};
pub use world::World;
