//! The network graph: node registry, edge map and adjacency.
//!
//! Absence is explicit: [`Topology::edge`] returns `None` for unlinked
//! pairs instead of a default value. Adjacency rows are kept sorted by
//! neighbor id, so every iteration over the graph is deterministic.

use indexmap::IndexMap;
use smallvec::SmallVec;

use skymesh_core::{ClassId, NodeId, Position, Role};

use crate::edge::{Edge, EdgeKey};
use crate::error::TopologyError;

/// Per-node data the graph needs for linking and routing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeEntry {
    /// Configured class.
    pub class: ClassId,
    /// Role, fixed at creation.
    pub role: Role,
    /// Last known position.
    pub position: Position,
}

type Adjacency = SmallVec<[NodeId; 8]>;

/// Graph of nodes and bidirectional links.
///
/// Owns the global step value: `packet_size / max(bandwidth)` over all
/// current edges. With no edges the previous value is kept.
#[derive(Clone, Debug)]
pub struct Topology {
    nodes: IndexMap<NodeId, NodeEntry>,
    edges: IndexMap<EdgeKey, Edge>,
    adjacency: IndexMap<NodeId, Adjacency>,
    packet_size: u64,
    step_value: f64,
}

impl Topology {
    /// Empty graph for `packet_size`-byte packets.
    ///
    /// `initial_step` is the step value used until the first edge exists.
    pub fn new(packet_size: u64, initial_step: f64) -> Result<Self, TopologyError> {
        if packet_size == 0 {
            return Err(TopologyError::ZeroPacketSize);
        }
        Ok(Self {
            nodes: IndexMap::new(),
            edges: IndexMap::new(),
            adjacency: IndexMap::new(),
            packet_size,
            step_value: initial_step,
        })
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Register a node.
    pub fn add_node(
        &mut self,
        id: NodeId,
        class: ClassId,
        role: Role,
        position: Position,
    ) -> Result<(), TopologyError> {
        if self.nodes.contains_key(&id) {
            return Err(TopologyError::DuplicateNode(id));
        }
        self.nodes.insert(
            id,
            NodeEntry {
                class,
                role,
                position,
            },
        );
        self.adjacency.insert(id, Adjacency::new());
        Ok(())
    }

    /// Registry entry for `id`.
    pub fn node(&self, id: NodeId) -> Option<&NodeEntry> {
        self.nodes.get(&id)
    }

    /// Role of `id`.
    pub fn role(&self, id: NodeId) -> Option<Role> {
        self.nodes.get(&id).map(|n| n.role)
    }

    /// Class of `id`.
    pub fn class(&self, id: NodeId) -> Option<ClassId> {
        self.nodes.get(&id).map(|n| n.class)
    }

    /// Position of `id`.
    pub fn position(&self, id: NodeId) -> Option<Position> {
        self.nodes.get(&id).map(|n| n.position)
    }

    /// Move `id`. Links are not re-evaluated until the next refresh.
    pub fn set_position(&mut self, id: NodeId, position: Position) -> Result<(), TopologyError> {
        let entry = self
            .nodes
            .get_mut(&id)
            .ok_or(TopologyError::UnknownNode(id))?;
        entry.position = position;
        Ok(())
    }

    /// Registered node ids, in registration order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Registered node entries, in registration order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &NodeEntry)> + '_ {
        self.nodes.iter().map(|(id, e)| (*id, e))
    }

    /// Number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Destination-role nodes, in registration order.
    pub fn destinations(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .filter(|(_, e)| e.role == Role::Destination)
            .map(|(id, _)| *id)
    }

    // ── Edges ──────────────────────────────────────────────────────

    /// Neighbors of `id`, ascending. Empty for unknown nodes.
    pub fn neighbors(&self, id: NodeId) -> &[NodeId] {
        self.adjacency.get(&id).map(|a| a.as_slice()).unwrap_or(&[])
    }

    /// True if `x` and `y` are linked.
    pub fn are_adjacent(&self, x: NodeId, y: NodeId) -> bool {
        EdgeKey::new(x, y).is_some_and(|k| self.edges.contains_key(&k))
    }

    /// The link between `x` and `y`, if any.
    pub fn edge(&self, x: NodeId, y: NodeId) -> Option<&Edge> {
        EdgeKey::new(x, y).and_then(|k| self.edges.get(&k))
    }

    /// All links, in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.values()
    }

    /// All link keys, ascending.
    pub fn edge_keys(&self) -> Vec<EdgeKey> {
        let mut keys: Vec<EdgeKey> = self.edges.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Number of links.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Link `x` and `y`. Returns `false` if they were already linked.
    ///
    /// Does not recompute the step value; call
    /// [`recompute_step_value`](Self::recompute_step_value) after a batch
    /// of mutations.
    pub fn insert_edge(&mut self, x: NodeId, y: NodeId, bandwidth: f64) -> Result<bool, TopologyError> {
        let key = EdgeKey::new(x, y).ok_or(TopologyError::SelfLink(x))?;
        if !(bandwidth.is_finite() && bandwidth > 0.0) {
            return Err(TopologyError::InvalidBandwidth(bandwidth));
        }
        for n in [x, y] {
            if !self.nodes.contains_key(&n) {
                return Err(TopologyError::UnknownNode(n));
            }
        }
        if let Some(existing) = self.edges.get_mut(&key) {
            if existing.bandwidth() != bandwidth {
                existing.set_bandwidth(bandwidth, self.packet_size);
            }
            return Ok(false);
        }
        self.edges
            .insert(key, Edge::new(key, bandwidth, self.packet_size));
        self.link(key.a(), key.b());
        self.link(key.b(), key.a());
        Ok(true)
    }

    /// Unlink `x` and `y`, returning the removed edge.
    pub fn remove_edge(&mut self, x: NodeId, y: NodeId) -> Option<Edge> {
        let key = EdgeKey::new(x, y)?;
        let edge = self.edges.shift_remove(&key)?;
        self.unlink(key.a(), key.b());
        self.unlink(key.b(), key.a());
        Some(edge)
    }

    fn link(&mut self, from: NodeId, to: NodeId) {
        if let Some(row) = self.adjacency.get_mut(&from) {
            if let Err(pos) = row.binary_search(&to) {
                row.insert(pos, to);
            }
        }
    }

    fn unlink(&mut self, from: NodeId, to: NodeId) {
        if let Some(row) = self.adjacency.get_mut(&from) {
            if let Ok(pos) = row.binary_search(&to) {
                row.remove(pos);
            }
        }
    }

    /// Set every edge's load to the sum of its endpoints' queue lengths.
    pub fn refresh_loads(&mut self, mut queue_len: impl FnMut(NodeId) -> usize) {
        for edge in self.edges.values_mut() {
            let key = edge.key();
            let load = queue_len(key.a()) + queue_len(key.b());
            edge.set_load(load as u64);
        }
    }

    // ── Step value ─────────────────────────────────────────────────

    /// Seconds per tick.
    pub fn step_value(&self) -> f64 {
        self.step_value
    }

    /// Global packet size in bytes.
    pub fn packet_size(&self) -> u64 {
        self.packet_size
    }

    /// Recompute the step value from the fastest edge.
    ///
    /// Keeps the previous value when there are no edges. Returns `true`
    /// if the value changed.
    pub fn recompute_step_value(&mut self) -> bool {
        let max_bw = self
            .edges
            .values()
            .map(Edge::bandwidth)
            .fold(None, |acc: Option<f64>, bw| Some(acc.map_or(bw, |m| m.max(bw))));
        let Some(max_bw) = max_bw else {
            return false;
        };
        let step = self.packet_size as f64 / max_bw;
        let changed = step != self.step_value;
        self.step_value = step;
        changed
    }

    /// Change the global packet size, recomputing every edge's tick
    /// value and the step value.
    pub fn set_packet_size(&mut self, packet_size: u64) -> Result<(), TopologyError> {
        if packet_size == 0 {
            return Err(TopologyError::ZeroPacketSize);
        }
        self.packet_size = packet_size;
        for edge in self.edges.values_mut() {
            edge.set_packet_size(packet_size);
        }
        self.recompute_step_value();
        Ok(())
    }
}
