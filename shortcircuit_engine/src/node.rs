//! The node family: Wire, Nand, Switch, WireBridge, Portal.
//!
//! Modeled as one discriminated union per Design Notes §9 ("implementations
//! in a sum-type language use one discriminated union") rather than a
//! trait object — there is a fixed, closed set of kinds and no external
//! implementors.

use std::collections::HashSet;

use shortcircuit_common::Coord;

use crate::arena::NodeId;

/// A shared identifier for a group of [`Portal`]s that behave as one wire
/// cell. Assigned explicitly (deserialize annex, or an edit), never
/// inferred from adjacency the way wire groups are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortalGroupId(pub u32);

/// State of a Wire node: its published signal, the signal it will publish
/// after the next `advance`, and the set of nodes that drive it.
#[derive(Debug, Clone, Default)]
pub struct Wire {
    pub signal: bool,
    pub next_signal: bool,
    pub inputs: HashSet<NodeId>,
}

/// State of a Nand node: signal/next_signal as with Wire, plus the
/// direction it drives its output toward and the set of nodes driving it.
#[derive(Debug, Clone)]
pub struct Nand {
    pub signal: bool,
    pub next_signal: bool,
    pub facing: shortcircuit_common::Direction,
    pub inputs: HashSet<NodeId>,
}

impl Default for Nand {
    fn default() -> Self {
        Self {
            signal: false,
            next_signal: false,
            facing: shortcircuit_common::Direction::Up,
            inputs: HashSet::new(),
        }
    }
}

/// State of a Switch node: a bare signal, toggled only by external command.
#[derive(Debug, Clone, Copy, Default)]
pub struct Switch {
    pub signal: bool,
}

/// State of a Portal node.
///
/// The Data Model table in the specification lists only `group` as
/// Portal's state, but "portals sharing a group behave as one wire cell"
/// (spec §4.2/§8 scenario 6) requires somewhere to hold that shared
/// signal; per this crate's grounding notes (see `DESIGN.md`) a Portal's
/// signal/next_signal/inputs are that shared state, exactly mirroring
/// Wire's fields. All cells belonging to one group point at the *same*
/// `NodeId`, the same way a wire group's cells all point at the same Wire
/// — group membership is explicit rather than geometric.
#[derive(Debug, Clone, Default)]
pub struct Portal {
    pub group: Option<PortalGroupId>,
    pub signal: bool,
    pub next_signal: bool,
    pub inputs: HashSet<NodeId>,
}

/// A placed component, or the absence of one is represented by `None` in
/// the grid rather than by a variant here.
#[derive(Debug, Clone)]
pub enum Node {
    Wire(Wire),
    Nand(Nand),
    Switch(Switch),
    WireBridge,
    Portal(Portal),
}

impl Node {
    /// The currently-published signal.
    #[must_use]
    pub fn output(&self) -> bool {
        match self {
            Node::Wire(w) => w.signal,
            Node::Nand(n) => n.signal,
            Node::Switch(s) => s.signal,
            Node::WireBridge => false,
            Node::Portal(p) => p.signal,
        }
    }

    /// Commits a previously-computed `next_signal` to `signal`. No-op for
    /// stateless kinds.
    pub fn advance(&mut self) {
        match self {
            Node::Wire(w) => w.signal = w.next_signal,
            Node::Nand(n) => n.signal = n.next_signal,
            Node::Switch(_) | Node::WireBridge => {}
            Node::Portal(p) => p.signal = p.next_signal,
        }
    }

    /// Computes `next_signal` from the current outputs of this node's
    /// inputs (already resolved to booleans by the caller, since reading
    /// another node's `output()` requires grid context this type doesn't
    /// have). Wire/Portal: OR. Nand: NOT AND (empty input set yields
    /// `true`). Switch/WireBridge: no-op.
    pub fn compute_next(&mut self, input_outputs: impl Iterator<Item = bool>) {
        match self {
            Node::Wire(w) => w.next_signal = input_outputs.fold(false, |acc, o| acc || o),
            Node::Nand(n) => n.next_signal = !input_outputs.fold(true, |acc, o| acc && o),
            Node::Switch(_) | Node::WireBridge => {}
            Node::Portal(p) => p.next_signal = input_outputs.fold(false, |acc, o| acc || o),
        }
    }

    /// Whether this kind tracks an input set at all.
    #[must_use]
    pub fn inputs(&self) -> Option<&HashSet<NodeId>> {
        match self {
            Node::Wire(w) => Some(&w.inputs),
            Node::Nand(n) => Some(&n.inputs),
            Node::Portal(p) => Some(&p.inputs),
            Node::Switch(_) | Node::WireBridge => None,
        }
    }

    /// Clears this node's own input set, if it has one. Used as the first
    /// step of rebuilding IO from scratch.
    pub fn clear_inputs(&mut self) {
        match self {
            Node::Wire(w) => w.inputs.clear(),
            Node::Nand(n) => n.inputs.clear(),
            Node::Portal(p) => p.inputs.clear(),
            Node::Switch(_) | Node::WireBridge => {}
        }
    }

    /// Removes `id` from this node's input set. A no-op if `id` was not
    /// present (stale-reference removal is never an error, per the
    /// engine's error-handling design).
    pub fn input_remove(&mut self, id: NodeId) {
        match self {
            Node::Wire(w) => {
                w.inputs.remove(&id);
            }
            Node::Nand(n) => {
                n.inputs.remove(&id);
            }
            Node::Portal(p) => {
                p.inputs.remove(&id);
            }
            Node::Switch(_) | Node::WireBridge => {}
        }
    }

    /// Inserts `id` into this node's own input set directly, bypassing the
    /// [`Node::input_add`] permission check. Used by a node that is
    /// actively rebuilding its own inputs (Nand, Portal) and has already
    /// confirmed the neighbor drives it.
    pub fn input_insert_unchecked(&mut self, id: NodeId) {
        match self {
            Node::Wire(w) => {
                w.inputs.insert(id);
            }
            Node::Nand(n) => {
                n.inputs.insert(id);
            }
            Node::Portal(p) => {
                p.inputs.insert(id);
            }
            Node::Switch(_) | Node::WireBridge => {}
        }
    }

    /// Attempts to add `other` to this node's inputs, where `delta` is the
    /// direction from *this node* to `other`. Refuses (returns `false`) if
    /// `delta` points along this node's own output direction — a node
    /// can't take input from the one cell it drives — and refuses
    /// unconditionally for kinds with no input set.
    pub fn input_add(&mut self, other: NodeId, delta: Coord) -> bool {
        match self {
            Node::Wire(w) => {
                w.inputs.insert(other);
                true
            }
            Node::Nand(n) => {
                if n.outputs_to(delta) {
                    false
                } else {
                    n.inputs.insert(other);
                    true
                }
            }
            Node::Portal(p) => {
                if p.group.is_none() {
                    false
                } else {
                    p.inputs.insert(other);
                    true
                }
            }
            Node::Switch(_) | Node::WireBridge => false,
        }
    }

    /// Whether this node drives a signal in the direction `delta` (from
    /// this node's own position). Default `true`; Nand returns true only
    /// for its facing direction. An ungrouped Portal drives nothing.
    #[must_use]
    pub fn outputs_to(&self, delta: Coord) -> bool {
        match self {
            Node::Nand(n) => n.outputs_to(delta),
            Node::Portal(p) => p.group.is_some(),
            Node::Wire(_) | Node::Switch(_) | Node::WireBridge => true,
        }
    }

    /// Whether this kind participates in the tick's wire bucket (computed
    /// and advanced, one node at a time, after every other node has
    /// already advanced this tick) as opposed to the non-wire bucket
    /// (computed in full, then advanced in full, before any wire runs).
    #[must_use]
    pub const fn is_wire(&self) -> bool {
        matches!(self, Node::Wire(_))
    }

    /// The glyph this node serializes to.
    #[must_use]
    pub fn serialize(&self) -> char {
        match self {
            Node::Wire(_) => '-',
            Node::Nand(n) => {
                let lower = match n.facing {
                    shortcircuit_common::Direction::Up => 'u',
                    shortcircuit_common::Direction::Right => 'r',
                    shortcircuit_common::Direction::Down => 'd',
                    shortcircuit_common::Direction::Left => 'l',
                };
                if n.signal {
                    lower.to_ascii_uppercase()
                } else {
                    lower
                }
            }
            Node::Switch(s) => {
                if s.signal {
                    'o'
                } else {
                    'x'
                }
            }
            Node::WireBridge => '|',
            Node::Portal(_) => 'P',
        }
    }

    /// Builds a freshly-initialized node from a glyph, or `None` for `.`
    /// or any unrecognized glyph (which deserializes as an empty cell,
    /// per the engine's error-handling design).
    #[must_use]
    pub fn deserialize(glyph: char) -> Option<Node> {
        use shortcircuit_common::Direction;
        match glyph {
            '-' => Some(Node::Wire(Wire::default())),
            '|' => Some(Node::WireBridge),
            'x' => Some(Node::Switch(Switch { signal: false })),
            'o' => Some(Node::Switch(Switch { signal: true })),
            'P' => Some(Node::Portal(Portal::default())),
            'u' | 'r' | 'd' | 'l' | 'U' | 'R' | 'D' | 'L' => {
                let facing = match glyph.to_ascii_lowercase() {
                    'u' => Direction::Up,
                    'r' => Direction::Right,
                    'd' => Direction::Down,
                    'l' => Direction::Left,
                    _ => unreachable!(),
                };
                Some(Node::Nand(Nand {
                    signal: glyph.is_uppercase(),
                    next_signal: false,
                    facing,
                    inputs: HashSet::new(),
                }))
            }
            _ => None,
        }
    }

    /// Deep-clones this node into a *fresh* instance with no shared
    /// identity and an empty input set — used by `copy`, which must never
    /// alias the source's Wire/Portal objects (spec §6, `copy` message).
    #[must_use]
    pub fn clone_fresh(&self) -> Node {
        match self {
            Node::Wire(w) => Node::Wire(Wire {
                signal: w.signal,
                next_signal: w.next_signal,
                inputs: HashSet::new(),
            }),
            Node::Nand(n) => Node::Nand(Nand {
                signal: n.signal,
                next_signal: n.next_signal,
                facing: n.facing,
                inputs: HashSet::new(),
            }),
            Node::Switch(s) => Node::Switch(*s),
            Node::WireBridge => Node::WireBridge,
            Node::Portal(_) => Node::Portal(Portal::default()),
        }
    }
}

impl Nand {
    /// Whether this Nand drives a signal in direction `delta`, i.e.
    /// whether `delta` is its facing direction.
    #[must_use]
    pub fn outputs_to(&self, delta: Coord) -> bool {
        self.facing.delta() == delta
    }

    /// Rotates `facing` by `delta` steps (mod 4). Grid-level
    /// `recalculate_io` must be re-run afterward.
    pub fn rotate_facing(&mut self, delta: i32) {
        self.facing = self.facing.rotate(delta);
    }
}
