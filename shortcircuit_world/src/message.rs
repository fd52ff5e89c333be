//! The wire format for editing a [`World`](crate::World): a FIFO queue of
//! tagged JSON records, one per editor/host action.

use serde::{Deserialize, Serialize};
use shortcircuit_common::Coord;

/// One grid edit or control action. Serializes as a JSON object tagged by
/// `type`, with the message's own fields flattened alongside it, e.g.
/// `{"type": "switch_toggle", "coord": [1, 2], "index": 0, "value": null}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Places (or clears, if `node` is `None`) the glyph at `coord` on
    /// grid `index`.
    TileSet {
        coord: Coord,
        index: usize,
        node: Option<char>,
    },
    /// Rotates the NAND at `coord` on grid `index` by `delta` steps (mod 4).
    NandRotate {
        coord: Coord,
        index: usize,
        delta: i32,
    },
    /// Sets the switch at `coord` on grid `index`. `value: None` flips the
    /// current state rather than forcing one.
    SwitchToggle {
        coord: Coord,
        index: usize,
        value: Option<bool>,
    },
    /// Advances every grid in the world by `count` ticks.
    Tick { count: u32 },
    /// Copies a rectangular region from one grid to another (or the same
    /// grid), as fresh, unaliased nodes.
    Copy {
        from: RegionEnd,
        dims: (usize, usize),
        to: RegionEnd,
    },
    /// Serializes grid `index` and writes it to `filepath`.
    WriteBoard { index: usize, filepath: String },
    /// Ends the message loop.
    Quit,
}

/// One endpoint of a [`Message::Copy`]: which grid, and the coordinate of
/// its region's top-left corner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegionEnd {
    pub index: usize,
    pub coord: Coord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_toggle_with_null_value_round_trips_through_json() {
        let msg = Message::SwitchToggle {
            coord: Coord::new(1, 2),
            index: 0,
            value: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn quit_has_no_fields() {
        let msg = Message::Quit;
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"quit"}"#);
    }
}
