//! Loading a [`Grid`] from its on-disk text form: glyph rows, optionally
//! followed by a blank line and a portal-annex JSON object.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use shortcircuit_engine::Grid;
use tracing::warn;

/// The on-disk shape of the optional portal annex:
/// `{ "portals": { "<group-id>": [[x, y, index], ...] } }`. `index` is the
/// annex author's bookkeeping (insertion order within the group) and
/// carries no engine meaning; only `x, y` matter to deserialization.
#[derive(Debug, Serialize, Deserialize)]
struct PortalAnnexFile {
    portals: HashMap<String, Vec<[i64; 3]>>,
}

/// Parses board text into a [`Grid`]. A structurally broken annex is
/// logged and ignored rather than failing the whole load, per this
/// engine's error-handling design: a malformed save file recovers
/// silently rather than refusing to open.
#[must_use]
pub fn load_board(text: &str) -> Grid {
    let (board_text, annex_text) = match text.split_once("\n\n") {
        Some((board, annex)) => (board, Some(annex)),
        None => (text, None),
    };

    let annex = annex_text
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|annex_text| match serde_json::from_str::<PortalAnnexFile>(annex_text) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!(%err, "portal annex malformed, ignoring");
                None
            }
        });

    let portal_annex: Vec<(u32, Vec<(i32, i32)>)> = annex
        .map(|annex| {
            annex
                .portals
                .into_iter()
                .filter_map(|(group, members)| {
                    let group_id: u32 = group.parse().ok()?;
                    let coords = members
                        .into_iter()
                        .map(|[x, y, _index]| (x as i32, y as i32))
                        .collect();
                    Some((group_id, coords))
                })
                .collect()
        })
        .unwrap_or_default();

    Grid::deserialize(board_text, &portal_annex)
}

/// Serializes `grid` back to the on-disk text form, including the portal
/// annex when the grid has any portal groups.
#[must_use]
pub fn save_board(grid: &Grid) -> String {
    let mut out = grid.serialize();
    let annex = grid.portal_annex();
    if annex.is_empty() {
        return out;
    }

    let portals: HashMap<String, Vec<[i64; 3]>> = annex
        .into_iter()
        .map(|(group, members)| {
            let triples = members
                .into_iter()
                .enumerate()
                .map(|(index, (x, y))| [i64::from(x), i64::from(y), index as i64])
                .collect();
            (group.to_string(), triples)
        })
        .collect();
    let file = PortalAnnexFile { portals };
    let json = serde_json::to_string(&file).unwrap_or_else(|_| "{}".to_string());
    out.push_str("\n\n");
    out.push_str(&json);
    out
}
