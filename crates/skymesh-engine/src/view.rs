//! Read-only network view handed to decision providers.

use indexmap::IndexMap;

use skymesh_core::{NetworkView, NodeId, Position, TickId};
use skymesh_topology::Topology;

use crate::node::Node;

/// Borrowed snapshot of the topology and node buffers.
pub struct TickView<'a> {
    tick: TickId,
    topology: &'a Topology,
    nodes: &'a IndexMap<NodeId, Node>,
}

impl<'a> TickView<'a> {
    /// View of `nodes` over `topology` during `tick`.
    pub fn new(tick: TickId, topology: &'a Topology, nodes: &'a IndexMap<NodeId, Node>) -> Self {
        Self {
            tick,
            topology,
            nodes,
        }
    }
}

impl NetworkView for TickView<'_> {
    fn tick(&self) -> TickId {
        self.tick
    }

    fn neighbors(&self, node: NodeId) -> &[NodeId] {
        self.topology.neighbors(node)
    }

    fn queue_len(&self, node: NodeId) -> usize {
        self.nodes.get(&node).map_or(0, Node::queue_len)
    }

    fn edge_load(&self, a: NodeId, b: NodeId) -> Option<u64> {
        self.topology.edge(a, b).map(|e| e.load())
    }

    fn position(&self, node: NodeId) -> Option<Position> {
        self.topology.position(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skymesh_core::{ClassId, Packet, PacketId, Role, StateVector};

    #[test]
    fn view_reads_queues_and_links() {
        let mut topology = Topology::new(500, 1.0).unwrap();
        let mut nodes = IndexMap::new();
        for i in 0..3 {
            topology
                .add_node(NodeId(i), ClassId(0), Role::Relay, Position::default())
                .unwrap();
            nodes.insert(
                NodeId(i),
                Node::new(NodeId(i), ClassId(0), Role::Relay, Position::default()),
            );
        }
        topology.insert_edge(NodeId(0), NodeId(1), 500.0).unwrap();
        topology.insert_edge(NodeId(1), NodeId(2), 500.0).unwrap();
        let relay = nodes.get_mut(&NodeId(1)).unwrap();
        let packet = Packet::new(PacketId::next(), &[NodeId(0), NodeId(1), NodeId(2)], 500, TickId(0)).unwrap();
        relay.receive(packet, NodeId(0), TickId(1)).unwrap();
        relay.update_queue(TickId(1)).unwrap();

        let view = TickView::new(TickId(2), &topology, &nodes);
        assert_eq!(view.tick(), TickId(2));
        assert_eq!(view.queue_len(NodeId(1)), 1);
        assert_eq!(view.queue_len(NodeId(9)), 0);
        assert_eq!(view.neighbors(NodeId(1)), &[NodeId(0), NodeId(2)]);
        assert_eq!(view.edge_load(NodeId(0), NodeId(2)), None);

        let state = StateVector::neighborhood_queues(&view, NodeId(0), 2);
        assert_eq!(state.as_slice(), &[1.0, 0.0, 0.0, 0.0]);
    }
}
