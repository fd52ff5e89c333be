//! The grid: a 2D array of cells, each optionally holding a [`NodeId`] into
//! an [`Arena`], plus the connectivity-maintenance operations that keep
//! wire groups and portal groups consistent as the board is edited.

use std::collections::{HashMap, HashSet, VecDeque};

use contracts::debug_ensures;
use shortcircuit_common::{Coord, Direction, EngineError};

use crate::arena::{Arena, NodeId};
use crate::node::{Nand, Node, Portal, PortalGroupId, Switch, Wire};

/// A rectangular board of cells. Each cell is either empty (`None`) or a
/// [`NodeId`] into `arena`; two cells sharing a `NodeId` are the same wire
/// (or portal) object, which is how group membership is represented.
#[derive(Debug, Clone)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Option<NodeId>>,
    arena: Arena,
    /// Every cell belonging to each portal group, kept so the group's
    /// shared `recalculate_io` can walk all of its cells without a grid
    /// scan. Not part of the serialized board glyphs; rebuilt from the
    /// JSON annex on deserialize.
    portal_cells: HashMap<PortalGroupId, Vec<Coord>>,
    next_portal_group: u32,
}

impl Grid {
    /// Creates an empty `width`x`height` grid with every cell unoccupied.
    #[must_use]
    #[debug_ensures(ret.cells.len() == width * height)]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![None; width * height],
            arena: Arena::new(),
            portal_cells: HashMap::new(),
            next_portal_group: 0,
        }
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    fn in_bounds(&self, coord: Coord) -> bool {
        match coord.as_index() {
            Some((x, y)) => x < self.width && y < self.height,
            None => false,
        }
    }

    fn index_of(&self, coord: Coord) -> Option<usize> {
        if self.in_bounds(coord) {
            let (x, y) = coord.as_index().expect("checked in_bounds");
            Some(y * self.width + x)
        } else {
            None
        }
    }

    /// Reads the node occupying `coord`, or `None` if the coordinate is
    /// out of bounds or the cell is empty. Out-of-bounds reads are not an
    /// error: they behave exactly like an empty cell (per this engine's
    /// error-handling design, only writes can fail).
    #[must_use]
    pub fn get(&self, coord: Coord) -> Option<&Node> {
        let idx = self.index_of(coord)?;
        self.cells[idx].map(|id| self.arena.get(id))
    }

    fn get_id(&self, coord: Coord) -> Option<NodeId> {
        let idx = self.index_of(coord)?;
        self.cells[idx]
    }

    fn neighbors(&self, coord: Coord) -> impl Iterator<Item = (Direction, Coord)> + '_ {
        Direction::ALL
            .into_iter()
            .map(move |d| (d, coord + d.delta()))
    }

    /// Places a node at `coord`, running the four steps the specification
    /// requires of every edit: break any wire group the old occupant was
    /// part of, install the new node, join it into any adjacent wire
    /// group, and refresh directional IO for every affected neighbor.
    ///
    /// Fails only if `coord` is outside the grid.
    pub fn set(&mut self, coord: Coord, node: Option<Node>) -> Result<(), EngineError> {
        if !self.in_bounds(coord) {
            return Err(EngineError::coord_out_of_bounds(
                coord,
                self.width,
                self.height,
            ));
        }
        tracing::debug!(?coord, "setting cell");

        let mut dirty = self.break_wire_group_at(coord);

        let idx = self.index_of(coord).expect("checked in_bounds");
        if let Some(old_id) = self.cells[idx].take() {
            self.depush(coord, old_id);
            match self.leave_portal_group(coord, old_id) {
                Some(remaining) if !remaining.is_empty() => dirty.extend(remaining),
                _ => {
                    self.arena.remove(old_id);
                }
            }
        }

        if let Some(node) = node {
            let is_wire = matches!(node, Node::Wire(_));
            let id = self.arena.insert(node);
            self.cells[idx] = Some(id);
            if is_wire {
                dirty.extend(self.join_wire_group_at(coord));
            }
        }

        dirty.insert(coord);
        dirty.extend(
            self.neighbors(coord)
                .map(|(d, c)| self.resolve_through_bridges_coord(c, d)),
        );

        for dirty_coord in dirty {
            self.recalculate_io_at(dirty_coord);
        }
        Ok(())
    }

    /// Retires `coord` from the portal group `old_id`'s Portal belongs to,
    /// called right before `old_id` would otherwise be removed from the
    /// arena. Returns `None` when `old_id` isn't a grouped Portal (the
    /// caller's normal arena-removal path applies) or when `coord` was the
    /// group's last member (the group and its shared node are retired
    /// together). Returns the group's remaining member coords when other
    /// cells still share `old_id`, so the caller re-dirties them instead
    /// of removing the still-live shared Portal node.
    fn leave_portal_group(&mut self, coord: Coord, old_id: NodeId) -> Option<HashSet<Coord>> {
        let Node::Portal(portal) = self.arena.get(old_id) else {
            return None;
        };
        let group = portal.group?;
        let cells = self.portal_cells.get_mut(&group)?;
        cells.retain(|c| *c != coord);
        if cells.is_empty() {
            self.portal_cells.remove(&group);
            None
        } else {
            Some(cells.iter().copied().collect())
        }
    }

    /// Merges the wire at `coord` with every orthogonally-adjacent wire,
    /// by explicit-worklist flood fill (never recursion, to keep this safe
    /// on boards far larger than the recursion budget). All cells visited
    /// are repointed at `coord`'s own survivor `NodeId`; every other wire
    /// object the flood fill touches is dropped from the arena. Returns
    /// every non-wire neighbor cell touched by the flood, so the caller can
    /// re-run `recalculate_io` on them against the new survivor.
    fn join_wire_group_at(&mut self, coord: Coord) -> HashSet<Coord> {
        let Some(start_id) = self.get_id(coord) else {
            return HashSet::new();
        };
        if !matches!(self.arena.get(start_id), Node::Wire(_)) {
            return HashSet::new();
        }

        let mut group_ids: HashSet<NodeId> = HashSet::new();
        group_ids.insert(start_id);
        let mut worklist = VecDeque::from([coord]);
        let mut visited_coords = HashSet::new();
        visited_coords.insert(coord);

        while let Some(here) = worklist.pop_front() {
            for (_, neighbor) in self.neighbors(here) {
                if !visited_coords.insert(neighbor) {
                    continue;
                }
                if let Some(id) = self.get_id(neighbor) {
                    if matches!(self.arena.get(id), Node::Wire(_)) {
                        group_ids.insert(id);
                        worklist.push_back(neighbor);
                    } else {
                        visited_coords.remove(&neighbor);
                    }
                } else {
                    visited_coords.remove(&neighbor);
                }
            }
        }

        let mut dirty = HashSet::new();
        for visited in &visited_coords {
            dirty.extend(
                self.neighbors(*visited)
                    .map(|(d, c)| self.resolve_through_bridges_coord(c, d)),
            );
        }

        if group_ids.len() <= 1 {
            return dirty;
        }

        // The wire just placed/edited survives; every other wire object the
        // flood fill touches merges into it. This matches the observed
        // behavior of a fresh `set` call: the new Wire is the one callers
        // hold a reference to afterward.
        let survivor = start_id;
        let merged_signal = group_ids
            .iter()
            .any(|id| self.arena.get(*id).output());

        for coord in &visited_coords {
            let Some(id) = self.get_id(*coord) else {
                continue;
            };
            if group_ids.contains(&id) && id != survivor {
                let idx = self.index_of(*coord).expect("visited coords are in bounds");
                self.cells[idx] = Some(survivor);
            }
        }

        for id in &group_ids {
            if *id != survivor {
                self.arena.remove(*id);
            }
        }
        if let Node::Wire(w) = self.arena.get_mut(survivor) {
            w.signal = merged_signal;
            w.next_signal = merged_signal;
        }

        dirty
    }

    /// Called *before* `coord`'s old occupant is removed: if that occupant
    /// was part of a multi-cell wire group, splits the group so that each
    /// remaining connected region gets its own fresh `Wire` object, then
    /// removes the shared object that used to cover all of them. Returns
    /// every neighbor cell of the pre-split group, so the caller can re-run
    /// `recalculate_io` on the ones that turn out to be non-wire.
    fn break_wire_group_at(&mut self, coord: Coord) -> HashSet<Coord> {
        let Some(old_id) = self.get_id(coord) else {
            return HashSet::new();
        };
        let Node::Wire(old_wire) = self.arena.get(old_id) else {
            return HashSet::new();
        };
        let old_signal = old_wire.signal;

        let group_coords: Vec<Coord> = self
            .all_coords()
            .filter(|c| self.get_id(*c) == Some(old_id))
            .collect();

        let mut dirty = HashSet::new();
        for group_coord in &group_coords {
            dirty.extend(
                self.neighbors(*group_coord)
                    .map(|(d, c)| self.resolve_through_bridges_coord(c, d)),
            );
        }

        if group_coords.len() <= 1 {
            return dirty;
        }

        let mut remaining: HashSet<Coord> = group_coords.into_iter().filter(|c| *c != coord).collect();

        while let Some(&seed) = remaining.iter().next() {
            let mut region = HashSet::new();
            let mut worklist = VecDeque::from([seed]);
            region.insert(seed);
            remaining.remove(&seed);

            while let Some(here) = worklist.pop_front() {
                for (_, neighbor) in self.neighbors(here) {
                    if remaining.contains(&neighbor) {
                        remaining.remove(&neighbor);
                        region.insert(neighbor);
                        worklist.push_back(neighbor);
                    }
                }
            }

            let fresh_id = self.arena.insert(Node::Wire(Wire {
                signal: old_signal,
                next_signal: old_signal,
                inputs: HashSet::new(),
            }));
            for region_coord in &region {
                let idx = self
                    .index_of(*region_coord)
                    .expect("region coords are in bounds");
                self.cells[idx] = Some(fresh_id);
            }
        }

        self.arena.remove(old_id);
        dirty
    }

    /// Recomputes directional IO (`inputs`) for `coord`'s own node (if
    /// active: Nand/Portal) and every neighbor whose own input set might
    /// depend on `coord`'s occupant, after an edit at `coord`.
    fn recalculate_neighbors(&mut self, coord: Coord) {
        self.recalculate_io_at(coord);
        let neighbors: Vec<Coord> = self.neighbors(coord).map(|(_, c)| c).collect();
        for neighbor in neighbors {
            self.recalculate_io_at(neighbor);
        }
    }

    /// Rebuilds the `inputs` set for the node at `coord`, if that kind
    /// tracks one. Wire and WireBridge are passive: they never pull
    /// inputs themselves (another node's `input_add` is what populates a
    /// Wire's set), so their `recalculate_io` is a no-op, exactly as the
    /// authoritative board behavior treats them.
    fn recalculate_io_at(&mut self, coord: Coord) {
        let Some(id) = self.get_id(coord) else {
            return;
        };
        match self.arena.get(id) {
            Node::Nand(_) => self.recalculate_nand_io(coord, id),
            Node::Switch(_) => self.recalculate_switch_io(coord, id),
            Node::Portal(_) => self.recalculate_portal_io(coord, id),
            Node::Wire(_) | Node::WireBridge => {}
        }
    }

    /// A Switch has no `inputs` of its own to rebuild, but like Nand it
    /// must actively push itself into every neighbor it drives — a
    /// passive Wire never comes looking for it. Unlike Nand it has no
    /// facing to exclude: it pushes into all four directions.
    fn recalculate_switch_io(&mut self, coord: Coord, id: NodeId) {
        let neighbors: Vec<(Direction, Coord)> = self.neighbors(coord).collect();
        for (direction, neighbor) in &neighbors {
            if let Some(neighbor_id) = self.resolve_through_bridges(*neighbor, *direction) {
                if neighbor_id != id {
                    self.arena.get_mut(neighbor_id).input_remove(id);
                }
            }
        }
        for (direction, neighbor) in neighbors {
            let Some(neighbor_id) = self.resolve_through_bridges(neighbor, direction) else {
                continue;
            };
            if neighbor_id == id {
                continue;
            }
            let _ = self
                .arena
                .get_mut(neighbor_id)
                .input_add(id, direction.invert().delta());
        }
    }

    /// Purges `old_id` from every neighbor it may have pushed itself into,
    /// called right before a Nand or Switch is removed from the grid (by
    /// `set` replacing or clearing its cell). Without this, a neighbor's
    /// `inputs` set would keep a dangling reference into a vacated arena
    /// slot once `old_id` is freed. Portal groups are left alone here:
    /// removing one cell of a group doesn't retire the shared id as long
    /// as other member cells still point at it.
    fn depush(&mut self, coord: Coord, old_id: NodeId) {
        if !matches!(self.arena.get(old_id), Node::Nand(_) | Node::Switch(_)) {
            return;
        }
        for (direction, neighbor) in self.neighbors(coord).collect::<Vec<_>>() {
            if let Some(neighbor_id) = self.resolve_through_bridges(neighbor, direction) {
                if neighbor_id != old_id {
                    self.arena.get_mut(neighbor_id).input_remove(old_id);
                }
            }
        }
    }

    /// Nand IO is the one place push and pull both happen. For the single
    /// direction equal to `facing`, the gate *drives* that neighbor: it
    /// calls the neighbor's own `input_add`, since a passive neighbor
    /// (Wire, WireBridge-terminated Wire, Switch, grouped Portal) never
    /// comes looking for inputs on its own. For the other three
    /// directions the gate pulls: if the neighbor claims to output back
    /// toward this cell, it goes straight into `self.inputs`. Every
    /// previous push this Nand made is purged first, since `facing` may
    /// have rotated since the last recalculation.
    fn recalculate_nand_io(&mut self, coord: Coord, id: NodeId) {
        self.arena.get_mut(id).clear_inputs();

        let Node::Nand(nand) = self.arena.get(id) else {
            return;
        };
        let facing = nand.facing;

        let neighbors: Vec<(Direction, Coord)> = self.neighbors(coord).collect();

        for (direction, neighbor) in &neighbors {
            if let Some(neighbor_id) = self.resolve_through_bridges(*neighbor, *direction) {
                if neighbor_id != id {
                    self.arena.get_mut(neighbor_id).input_remove(id);
                }
            }
        }

        for (direction, neighbor) in neighbors {
            let Some(neighbor_id) = self.resolve_through_bridges(neighbor, direction) else {
                continue;
            };
            if neighbor_id == id {
                continue;
            }
            if direction == facing {
                let _ = self
                    .arena
                    .get_mut(neighbor_id)
                    .input_add(id, direction.invert().delta());
            } else {
                let neighbor_outputs_here = self
                    .arena
                    .get(neighbor_id)
                    .outputs_to(direction.invert().delta());
                if neighbor_outputs_here {
                    self.arena.get_mut(id).input_insert_unchecked(neighbor_id);
                }
            }
        }
    }

    /// Portal IO is active and group-wide, and like Nand it both pushes
    /// and pulls: a grouped Portal outputs in every direction (it has no
    /// facing), so every one of its member cells' neighbors gets pushed
    /// into (so a plain Wire or Switch sitting against a portal sees the
    /// portal as an input exactly as it would a driving Nand), while the
    /// same walk pulls any neighbor that drives back into the group's one
    /// shared `inputs` set. Portals don't bridge-resolve; they are
    /// themselves the long-distance connection.
    fn recalculate_portal_io(&mut self, _coord: Coord, id: NodeId) {
        let Node::Portal(p) = self.arena.get(id) else {
            return;
        };
        let Some(group) = p.group else {
            return;
        };
        let Some(cells) = self.portal_cells.get(&group).cloned() else {
            return;
        };

        self.arena.get_mut(id).clear_inputs();

        for cell in &cells {
            let neighbors: Vec<(Direction, Coord)> = self.neighbors(*cell).collect();
            for (_, neighbor) in neighbors {
                if let Some(neighbor_id) = self.get_id(neighbor) {
                    if neighbor_id != id {
                        self.arena.get_mut(neighbor_id).input_remove(id);
                    }
                }
            }
        }

        for cell in &cells {
            let neighbors: Vec<(Direction, Coord)> = self.neighbors(*cell).collect();
            for (direction, neighbor) in neighbors {
                let Some(neighbor_id) = self.get_id(neighbor) else {
                    continue;
                };
                if neighbor_id == id {
                    continue;
                }
                let _ = self
                    .arena
                    .get_mut(neighbor_id)
                    .input_add(id, direction.invert().delta());

                let neighbor_outputs_here = self
                    .arena
                    .get(neighbor_id)
                    .outputs_to(direction.invert().delta());
                if neighbor_outputs_here {
                    self.arena.get_mut(id).input_insert_unchecked(neighbor_id);
                }
            }
        }
    }

    /// Follows a chain of `WireBridge`s starting from `through` (reached
    /// while walking in `direction`), returning the first non-bridge
    /// node's id, or `None` if the chain runs off the grid or into an
    /// empty cell.
    fn resolve_through_bridges(&self, mut through: Coord, direction: Direction) -> Option<NodeId> {
        loop {
            let id = self.get_id(through)?;
            match self.arena.get(id) {
                Node::WireBridge => {
                    through = through + direction.delta();
                }
                _ => return Some(id),
            }
        }
    }

    /// Like [`Self::resolve_through_bridges`], but returns the coordinate
    /// of the first non-bridge cell reached (rather than its id), falling
    /// back to `through` itself once the chain runs off the grid or into
    /// an empty cell. Used to dirty the electrically active cell on the
    /// far side of a bridge chain after a wire-topology edit, rather than
    /// the (passive, no-op-on-recalculate) bridge cell itself.
    fn resolve_through_bridges_coord(&self, mut through: Coord, direction: Direction) -> Coord {
        while let Some(id) = self.get_id(through) {
            if matches!(self.arena.get(id), Node::WireBridge) {
                through = through + direction.delta();
            } else {
                break;
            }
        }
        through
    }

    fn all_coords(&self) -> impl Iterator<Item = Coord> + '_ {
        itertools::iproduct!(0..self.height, 0..self.width)
            .map(|(y, x)| Coord::new(i32::try_from(x).unwrap(), i32::try_from(y).unwrap()))
    }

    /// Advances the simulation by one tick: computes every non-wire's next
    /// signal, advances every non-wire, then computes-and-advances each
    /// wire object one at a time (all within the same tick). Portals are
    /// bucketed with the non-wires even though their carrier behaves like
    /// a Wire, because a Portal can sit electrically between two ordinary
    /// wires and interleaved per-node ticking of that bucket would make
    /// propagation depend on iteration order.
    pub fn tick(&mut self) {
        let all_ids: Vec<NodeId> = self.arena.iter().map(|(id, _)| id).collect();
        let (wire_ids, non_wire_ids): (Vec<NodeId>, Vec<NodeId>) = all_ids
            .into_iter()
            .partition(|id| self.arena.get(*id).is_wire());

        for id in &non_wire_ids {
            self.compute_next_for(*id);
        }
        for id in &non_wire_ids {
            self.arena.get_mut(*id).advance();
        }
        for id in &wire_ids {
            self.compute_next_for(*id);
            self.arena.get_mut(*id).advance();
        }
    }

    fn compute_next_for(&mut self, id: NodeId) {
        let Some(inputs) = self.arena.get(id).inputs() else {
            return;
        };
        let outputs: Vec<bool> = inputs.iter().map(|input| self.arena.get(*input).output()).collect();
        self.arena.get_mut(id).compute_next(outputs.into_iter());
    }

    /// Toggles a `Switch` at `coord`. A no-op if the cell doesn't hold one.
    pub fn toggle_switch(&mut self, coord: Coord) {
        if let Some(id) = self.get_id(coord) {
            if let Node::Switch(s) = self.arena.get_mut(id) {
                s.signal = !s.signal;
            }
        }
    }

    /// Rotates a `Nand`'s facing at `coord` by `delta` steps, then
    /// refreshes IO for it and its neighbors. A no-op if the cell doesn't
    /// hold a Nand.
    pub fn rotate_nand(&mut self, coord: Coord, delta: i32) {
        let Some(id) = self.get_id(coord) else {
            return;
        };
        if let Node::Nand(n) = self.arena.get_mut(id) {
            n.rotate_facing(delta);
            self.recalculate_neighbors(coord);
        }
    }

    /// Serializes the board to its glyph form: rows joined by `\n`, with
    /// no trailing newline.
    #[must_use]
    pub fn serialize(&self) -> String {
        let rows: Vec<String> = (0..self.height)
            .map(|y| {
                (0..self.width)
                    .map(|x| {
                        let coord = Coord::new(i32::try_from(x).unwrap(), i32::try_from(y).unwrap());
                        self.get(coord).map_or('.', Node::serialize)
                    })
                    .collect()
            })
            .collect();
        rows.join("\n")
    }

    /// The portal group annex: each group's id paired with the `(x, y)`
    /// cells belonging to it, in the shape this engine's JSON serializes
    /// alongside the glyph board.
    #[must_use]
    pub fn portal_annex(&self) -> Vec<(u32, Vec<(i32, i32)>)> {
        let mut out: Vec<(u32, Vec<(i32, i32)>)> = self
            .portal_cells
            .iter()
            .map(|(group, cells)| (group.0, cells.iter().map(|c| (c.x, c.y)).collect()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    /// Rebuilds a grid from glyph text plus a portal annex (group id ->
    /// member cells; ignored entries whose glyph isn't `P`, since an
    /// annex is supplementary bookkeeping and never authoritative over
    /// the board text itself).
    ///
    /// Deserialization proceeds in three passes: place every node fresh
    /// (seeding Nand signal from glyph case only, never re-advancing it,
    /// and Switch signal from glyph directly), join wire groups globally
    /// via two-pass connected-component labeling with union-find (rather
    /// than repeated local joins, which would be quadratic on a large
    /// contiguous wire mass), then assign portal groups from the annex
    /// and run one global IO refresh.
    pub fn deserialize(text: &str, portal_annex: &[(u32, Vec<(i32, i32)>)]) -> Self {
        let lines: Vec<&str> = text.lines().collect();
        let height = lines.len();
        let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
        let mut grid = Grid::new(width, height);

        for (y, line) in lines.iter().enumerate() {
            for (x, glyph) in line.chars().enumerate() {
                if let Some(node) = Node::deserialize(glyph) {
                    let coord = Coord::new(i32::try_from(x).unwrap(), i32::try_from(y).unwrap());
                    let idx = grid.index_of(coord).expect("within computed bounds");
                    let id = grid.arena.insert(node);
                    grid.cells[idx] = Some(id);
                }
            }
        }

        grid.global_join_wires();
        grid.assign_portal_groups(portal_annex);
        grid.global_recalculate_io();
        grid.settle_wires_once();
        grid
    }

    /// Runs one compute+advance pass over every wire (and only wires),
    /// matching the authoritative board behavior's global IO refresh:
    /// Nand/Switch/Portal signal already came straight from the glyph (or
    /// the annex) and is never independently re-advanced at load time,
    /// but a freshly deserialized wire still needs to pick up whatever
    /// its now-resolved inputs are already driving before the caller
    /// takes its first look at the board.
    fn settle_wires_once(&mut self) {
        let wire_ids: Vec<NodeId> = self
            .arena
            .iter()
            .filter(|(_, node)| node.is_wire())
            .map(|(id, _)| id)
            .collect();
        for id in wire_ids {
            self.compute_next_for(id);
            self.arena.get_mut(id).advance();
        }
    }

    /// Two-pass connected-component labeling with union-find: assigns
    /// every wire cell a provisional label, unions labels across
    /// orthogonal wire-wire adjacency, then collapses each connected
    /// component down to one shared `Wire` object.
    fn global_join_wires(&mut self) {
        let wire_coords: Vec<Coord> = self
            .all_coords()
            .filter(|c| matches!(self.get(*c), Some(Node::Wire(_))))
            .collect();
        if wire_coords.is_empty() {
            return;
        }

        let mut parent: HashMap<Coord, Coord> = wire_coords.iter().map(|c| (*c, *c)).collect();

        fn find(parent: &mut HashMap<Coord, Coord>, c: Coord) -> Coord {
            let p = parent[&c];
            if p == c {
                c
            } else {
                let root = find(parent, p);
                parent.insert(c, root);
                root
            }
        }

        for coord in &wire_coords {
            for (_, neighbor) in self.neighbors(*coord) {
                if matches!(self.get(neighbor), Some(Node::Wire(_))) {
                    let root_a = find(&mut parent, *coord);
                    let root_b = find(&mut parent, neighbor);
                    if root_a != root_b {
                        parent.insert(root_a, root_b);
                    }
                }
            }
        }

        let mut groups: HashMap<Coord, Vec<Coord>> = HashMap::new();
        for coord in &wire_coords {
            let root = find(&mut parent, *coord);
            groups.entry(root).or_default().push(*coord);
        }

        for members in groups.values() {
            let signal = members
                .iter()
                .any(|c| self.get(*c).map(Node::output).unwrap_or(false));
            let survivor = self.arena.insert(Node::Wire(Wire {
                signal,
                next_signal: signal,
                inputs: HashSet::new(),
            }));
            for coord in members {
                let idx = self.index_of(*coord).expect("wire coords are in bounds");
                if let Some(old_id) = self.cells[idx].replace(survivor) {
                    self.arena.remove(old_id);
                }
            }
        }
    }

    fn assign_portal_groups(&mut self, annex: &[(u32, Vec<(i32, i32)>)]) {
        for (raw_group, members) in annex {
            let group = PortalGroupId(*raw_group);
            let mut coords = Vec::new();
            let group_id = self.arena.insert(Node::Portal(Portal {
                group: Some(group),
                signal: false,
                next_signal: false,
                inputs: HashSet::new(),
            }));
            let mut used = false;
            for (x, y) in members {
                let coord = Coord::new(*x, *y);
                if let Some(idx) = self.index_of(coord) {
                    if matches!(self.cells[idx].map(|id| self.arena.get(id)), Some(Node::Portal(_))) {
                        if let Some(old_id) = self.cells[idx].replace(group_id) {
                            self.arena.remove(old_id);
                        }
                        coords.push(coord);
                        used = true;
                    }
                }
            }
            if used {
                self.next_portal_group = self.next_portal_group.max(raw_group + 1);
                self.portal_cells.insert(group, coords);
            } else {
                self.arena.remove(group_id);
            }
        }
    }

    fn global_recalculate_io(&mut self) {
        let coords: Vec<Coord> = self.all_coords().collect();
        for coord in coords {
            self.recalculate_io_at(coord);
        }
    }

    /// Deep-copies a rectangular region of `self` starting at `dest` in
    /// `other`, as fresh, unaliased nodes: every source Wire/Portal
    /// becomes its own new object (Portals lose their group, becoming
    /// inert single cells, since a copy has no annex of its own to assign
    /// a group from), and ordinary `set` is used so copied wires
    /// naturally re-join whatever they land next to in the destination.
    pub fn copy_region(
        &self,
        region_origin: Coord,
        region_width: usize,
        region_height: usize,
        dest: &mut Grid,
        dest_origin: Coord,
    ) -> Result<(), EngineError> {
        for dy in 0..region_height {
            for dx in 0..region_width {
                let src_coord = region_origin
                    + Coord::new(i32::try_from(dx).unwrap(), i32::try_from(dy).unwrap());
                let dest_coord = dest_origin
                    + Coord::new(i32::try_from(dx).unwrap(), i32::try_from(dy).unwrap());
                let fresh = self.get(src_coord).map(Node::clone_fresh);
                dest.set(dest_coord, fresh)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;
    use rstest::rstest;

    fn board(rows: &[&str]) -> Grid {
        Grid::deserialize(&rows.join("\n"), &[])
    }

    #[test]
    fn deserialize_then_serialize_roundtrips_plain_board() {
        let rows = ["x-U", ".-."];
        let grid = board(&rows);
        assert_eq!(grid.serialize(), rows.join("\n"));
    }

    #[rstest]
    #[case("-")]
    #[case(".")]
    #[case("x")]
    #[case("o")]
    #[case("uU")]
    #[case("|")]
    fn single_row_round_trips_for_every_glyph(#[case] row: &str) {
        assert_eq!(board(&[row]).serialize(), row);
    }

    quickcheck! {
        fn round_trip_is_bit_exact_for_glyph_only_boards(seed: u32) -> bool {
            let alphabet = ['.', '-', 'u', 'r', 'd', 'l', 'U', 'R', 'D', 'L', 'x', 'o', '|'];
            let mut state = seed.max(1);
            let row: String = (0..8)
                .map(|_| {
                    state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                    alphabet[(state as usize) % alphabet.len()]
                })
                .collect();
            let grid = Grid::deserialize(&row, &[]);
            grid.serialize() == row
        }
    }

    #[test]
    fn scenario_join_new_wire_merges_and_inherits_nand_input() {
        let mut grid = board(&["-R-.-"]);
        grid.set(Coord::new(3, 0), Some(Node::Wire(Wire::default())))
            .unwrap();

        let a = grid.get_id(Coord::new(2, 0));
        let b = grid.get_id(Coord::new(3, 0));
        let c = grid.get_id(Coord::new(4, 0));
        assert_eq!(a, b);
        assert_eq!(b, c);

        let nand_id = grid.get_id(Coord::new(1, 0)).unwrap();
        match grid.arena.get(a.unwrap()) {
            Node::Wire(w) => assert_eq!(w.inputs, HashSet::from([nand_id])),
            other => panic!("expected a Wire, got {other:?}"),
        }

        grid.tick();
        assert!(grid.get(Coord::new(2, 0)).unwrap().output());
        assert!(grid.get(Coord::new(3, 0)).unwrap().output());
        assert!(grid.get(Coord::new(4, 0)).unwrap().output());
    }

    #[test]
    fn scenario_break_splits_wire_and_drops_downstream_input() {
        let mut grid = board(&["-R---"]);
        grid.set(Coord::new(3, 0), None).unwrap();

        let left = grid.get_id(Coord::new(2, 0)).unwrap();
        let right = grid.get_id(Coord::new(4, 0)).unwrap();
        assert_ne!(left, right);

        let nand_id = grid.get_id(Coord::new(1, 0)).unwrap();
        match grid.arena.get(left) {
            Node::Wire(w) => assert_eq!(w.inputs, HashSet::from([nand_id])),
            other => panic!("expected a Wire, got {other:?}"),
        }
        match grid.arena.get(right) {
            Node::Wire(w) => assert!(w.inputs.is_empty()),
            other => panic!("expected a Wire, got {other:?}"),
        }

        grid.tick();
        assert!(grid.get(Coord::new(2, 0)).unwrap().output());
        assert!(!grid.get(Coord::new(4, 0)).unwrap().output());
    }

    #[test]
    fn adjacent_wires_join_into_one_group_on_set() {
        let mut grid = Grid::new(3, 1);
        grid.set(Coord::new(0, 0), Some(Node::Wire(Wire::default())))
            .unwrap();
        grid.set(Coord::new(1, 0), Some(Node::Wire(Wire::default())))
            .unwrap();
        let a = grid.get_id(Coord::new(0, 0));
        let b = grid.get_id(Coord::new(1, 0));
        assert_eq!(a, b, "adjacent wires must share one object");
    }

    #[test]
    fn removing_bridge_wire_breaks_group_into_separate_regions() {
        let mut grid = Grid::new(3, 1);
        for x in 0..3 {
            grid.set(Coord::new(x, 0), Some(Node::Wire(Wire::default())))
                .unwrap();
        }
        let left_before = grid.get_id(Coord::new(0, 0));
        let right_before = grid.get_id(Coord::new(2, 0));
        assert_eq!(left_before, right_before);

        grid.set(Coord::new(1, 0), None).unwrap();

        let left_after = grid.get_id(Coord::new(0, 0));
        let right_after = grid.get_id(Coord::new(2, 0));
        assert!(left_after.is_some());
        assert!(right_after.is_some());
        assert_ne!(left_after, right_after, "halves must become distinct objects");
    }

    #[test]
    fn switch_feeding_wire_propagates_after_tick() {
        let mut grid = Grid::new(2, 1);
        grid.set(Coord::new(0, 0), Some(Node::Switch(Switch { signal: true })))
            .unwrap();
        grid.set(Coord::new(1, 0), Some(Node::Wire(Wire::default())))
            .unwrap();
        grid.tick();
        assert!(grid.get(Coord::new(1, 0)).unwrap().output());
    }

    #[test]
    fn nand_signal_is_seeded_from_glyph_case_without_advancing() {
        let grid = board(&["U"]);
        assert!(grid.get(Coord::new(0, 0)).unwrap().output());
        let grid = board(&["u"]);
        assert!(!grid.get(Coord::new(0, 0)).unwrap().output());
    }

    #[test]
    fn direct_gate_to_gate_feedback_loop_clocks_every_tick() {
        // A ring of four NANDs, each driving the next with no wire between
        // them: (0,0)->(1,0)->(1,1)->(0,1)->(0,0). A self-referential loop
        // the three-phase tick must not special-case, and since every link
        // is a direct gate-to-gate connection the whole ring is a
        // one-tick clock (toggles every tick).
        let mut grid = Grid::new(2, 2);
        let placements = [
            (Coord::new(0, 0), Direction::Right),
            (Coord::new(1, 0), Direction::Down),
            (Coord::new(1, 1), Direction::Left),
            (Coord::new(0, 1), Direction::Up),
        ];
        for (coord, facing) in placements {
            grid.set(
                coord,
                Some(Node::Nand(Nand {
                    facing,
                    ..Nand::default()
                })),
            )
            .unwrap();
        }

        for expected in [true, false, true, false] {
            grid.tick();
            for (coord, _) in placements {
                assert_eq!(grid.get(coord).unwrap().output(), expected, "{coord:?}");
            }
        }
    }

    #[test]
    fn two_region_break_separates_left_and_right_nand_feeds() {
        // Rows 0 and 1 drive into the wire column at x=1 (facing right)
        // and the wire column at x=5 (facing left); row 2's NANDs face
        // away from the board and drive nothing. Breaking the middle of
        // row 1 splits the big wire mass into a left half fed only by the
        // two left-facing NANDs and a right half fed only by the two
        // right-facing ones.
        let mut grid = board(&["r-...-l", "r-----l", "l-...-r"]);
        grid.set(Coord::new(3, 1), None).unwrap();

        let left_id = grid.get_id(Coord::new(2, 1));
        let right_id = grid.get_id(Coord::new(4, 1));
        assert!(left_id.is_some());
        assert!(right_id.is_some());
        assert_ne!(left_id, right_id);

        let left_nand_top = grid.get_id(Coord::new(0, 0)).unwrap();
        let left_nand_mid = grid.get_id(Coord::new(0, 1)).unwrap();
        match grid.arena.get(left_id.unwrap()) {
            Node::Wire(w) => assert_eq!(w.inputs, HashSet::from([left_nand_top, left_nand_mid])),
            other => panic!("expected a Wire, got {other:?}"),
        }

        let right_nand_top = grid.get_id(Coord::new(6, 0)).unwrap();
        let right_nand_mid = grid.get_id(Coord::new(6, 1)).unwrap();
        match grid.arena.get(right_id.unwrap()) {
            Node::Wire(w) => assert_eq!(w.inputs, HashSet::from([right_nand_top, right_nand_mid])),
            other => panic!("expected a Wire, got {other:?}"),
        }
    }

    #[test]
    fn bridge_passes_signal_through_without_joining_wires() {
        let mut grid = Grid::new(3, 1);
        grid.set(Coord::new(0, 0), Some(Node::Switch(Switch { signal: true })))
            .unwrap();
        grid.set(Coord::new(1, 0), Some(Node::WireBridge)).unwrap();
        grid.set(Coord::new(2, 0), Some(Node::Wire(Wire::default())))
            .unwrap();
        grid.tick();
        assert!(grid.get(Coord::new(2, 0)).unwrap().output());
    }

    #[test]
    fn bridge_only_passes_signal_along_its_own_axis() {
        // A WireBridge at a four-way junction only resolves straight
        // through in the direction it was entered from; the wires sitting
        // on the perpendicular axis through the same bridge cell must see
        // no signal at all.
        let mut grid = Grid::new(3, 3);
        grid.set(Coord::new(0, 1), Some(Node::Switch(Switch { signal: true })))
            .unwrap();
        grid.set(Coord::new(1, 1), Some(Node::WireBridge)).unwrap();
        grid.set(Coord::new(2, 1), Some(Node::Wire(Wire::default())))
            .unwrap();
        grid.set(Coord::new(1, 0), Some(Node::Wire(Wire::default())))
            .unwrap();
        grid.set(Coord::new(1, 2), Some(Node::Wire(Wire::default())))
            .unwrap();

        grid.tick();
        assert!(grid.get(Coord::new(2, 1)).unwrap().output());
        assert!(!grid.get(Coord::new(1, 0)).unwrap().output());
        assert!(!grid.get(Coord::new(1, 2)).unwrap().output());
    }

    #[test]
    fn feedback_through_short_wire_loop_clocks_every_tick_like_direct_loop() {
        // NandA drives NandB directly (gate-to-gate); NandB drives a short
        // wire loop that feeds back into NandA's non-facing side. Per
        // spec.md §4.7, wires are computed and advanced within the same
        // tick as the non-wire phase that feeds them, so a wire interposed
        // in a feedback loop still clocks every tick, exactly like the
        // all-direct ring.
        let mut grid = Grid::new(2, 2);
        grid.set(
            Coord::new(0, 0),
            Some(Node::Nand(Nand {
                facing: Direction::Right,
                ..Nand::default()
            })),
        )
        .unwrap();
        grid.set(
            Coord::new(1, 0),
            Some(Node::Nand(Nand {
                facing: Direction::Down,
                ..Nand::default()
            })),
        )
        .unwrap();
        grid.set(Coord::new(1, 1), Some(Node::Wire(Wire::default())))
            .unwrap();
        grid.set(Coord::new(0, 1), Some(Node::Wire(Wire::default())))
            .unwrap();

        for expected in [true, false, true, false] {
            grid.tick();
            assert_eq!(grid.get(Coord::new(0, 0)).unwrap().output(), expected);
            assert_eq!(grid.get(Coord::new(1, 0)).unwrap().output(), expected);
            assert_eq!(grid.get(Coord::new(1, 1)).unwrap().output(), expected);
        }
    }

    #[test]
    fn portal_group_shares_signal_across_distant_cells() {
        // Row0: Portal(0,0), Switch(1,0). Row1: Switch(0,1), Portal(1,1).
        // Both portals share group 0 and must read as one node.
        let mut grid = Grid::deserialize("Px\nxP", &[(0, vec![(0, 0), (1, 1)])]);
        grid.set(Coord::new(1, 0), Some(Node::Switch(Switch { signal: true })))
            .unwrap();
        grid.tick();

        let portal_a = grid.get_id(Coord::new(0, 0));
        let portal_b = grid.get_id(Coord::new(1, 1));
        assert_eq!(portal_a, portal_b, "grouped portals must be one shared node");
        assert!(grid.get(Coord::new(0, 0)).unwrap().output());
        assert!(grid.get(Coord::new(1, 1)).unwrap().output());
    }

    #[test]
    fn out_of_bounds_set_is_an_error() {
        let mut grid = Grid::new(2, 2);
        let err = grid
            .set(Coord::new(5, 5), Some(Node::Wire(Wire::default())))
            .unwrap_err();
        assert!(matches!(err, EngineError::CoordOutOfBounds { .. }));
    }

    #[test]
    fn copy_region_does_not_alias_source_wires() {
        // NodeIds are only comparable within one arena, so aliasing has to
        // be caught behaviorally: drive the copy and confirm the source
        // wire it was copied from doesn't move.
        let mut src = Grid::new(2, 1);
        src.set(Coord::new(0, 0), Some(Node::Wire(Wire::default())))
            .unwrap();
        let mut dest = Grid::new(2, 1);
        src.copy_region(Coord::new(0, 0), 1, 1, &mut dest, Coord::new(0, 0))
            .unwrap();

        dest.set(Coord::new(1, 0), Some(Node::Switch(Switch { signal: true })))
            .unwrap();
        dest.tick();

        assert!(dest.get(Coord::new(0, 0)).unwrap().output());
        assert!(
            !src.get(Coord::new(0, 0)).unwrap().output(),
            "copy must not alias the source wire"
        );
    }
}
