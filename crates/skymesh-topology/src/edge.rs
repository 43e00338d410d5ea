//! Links between nodes and their capacity model.

use std::fmt;

use skymesh_core::NodeId;

/// Unordered pair of distinct nodes, stored as `(min, max)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    a: NodeId,
    b: NodeId,
}

impl EdgeKey {
    /// Key for the link between `x` and `y`. `None` for a self-link.
    pub fn new(x: NodeId, y: NodeId) -> Option<Self> {
        match x.cmp(&y) {
            std::cmp::Ordering::Less => Some(Self { a: x, b: y }),
            std::cmp::Ordering::Greater => Some(Self { a: y, b: x }),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Lower endpoint.
    pub fn a(&self) -> NodeId {
        self.a
    }

    /// Higher endpoint.
    pub fn b(&self) -> NodeId {
        self.b
    }

    /// The endpoint opposite `node`, if `node` is an endpoint.
    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        if node == self.a {
            Some(self.b)
        } else if node == self.b {
            Some(self.a)
        } else {
            None
        }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.a, self.b)
    }
}

/// A bidirectional link.
///
/// `tick_value` is the time in seconds needed to push one packet across
/// the link; the engine divides it by the global step to get the number
/// of ticks between consecutive sends. `load` is only a routing cost: it
/// never blocks a send.
#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    key: EdgeKey,
    bandwidth: f64,
    tick_value: f64,
    load: u64,
}

impl Edge {
    /// A link of `bandwidth` bytes/second carrying `packet_size`-byte packets.
    pub fn new(key: EdgeKey, bandwidth: f64, packet_size: u64) -> Self {
        Self {
            key,
            bandwidth,
            tick_value: packet_size as f64 / bandwidth,
            load: 0,
        }
    }

    /// Endpoints.
    pub fn key(&self) -> EdgeKey {
        self.key
    }

    /// Capacity in bytes per second.
    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Seconds per packet.
    pub fn tick_value(&self) -> f64 {
        self.tick_value
    }

    /// Buffered packets at both endpoints as of the last refresh.
    pub fn load(&self) -> u64 {
        self.load
    }

    pub(crate) fn set_load(&mut self, load: u64) {
        self.load = load;
    }

    /// Recompute `tick_value` for a new global packet size.
    pub(crate) fn set_packet_size(&mut self, packet_size: u64) {
        self.tick_value = packet_size as f64 / self.bandwidth;
    }

    /// Change the capacity, recomputing `tick_value`.
    pub(crate) fn set_bandwidth(&mut self, bandwidth: f64, packet_size: u64) {
        self.bandwidth = bandwidth;
        self.set_packet_size(packet_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_unordered() {
        let k1 = EdgeKey::new(NodeId(4), NodeId(1)).unwrap();
        let k2 = EdgeKey::new(NodeId(1), NodeId(4)).unwrap();
        assert_eq!(k1, k2);
        assert_eq!(k1.a(), NodeId(1));
        assert_eq!(k1.b(), NodeId(4));
        assert_eq!(k1.other(NodeId(4)), Some(NodeId(1)));
        assert_eq!(k1.other(NodeId(2)), None);
    }

    #[test]
    fn no_self_links() {
        assert!(EdgeKey::new(NodeId(3), NodeId(3)).is_none());
    }

    #[test]
    fn tick_value_is_packet_over_bandwidth() {
        let k = EdgeKey::new(NodeId(0), NodeId(1)).unwrap();
        let mut e = Edge::new(k, 500.0, 500);
        assert_eq!(e.tick_value(), 1.0);
        e.set_packet_size(1000);
        assert_eq!(e.tick_value(), 2.0);
        e.set_bandwidth(4000.0, 1000);
        assert_eq!(e.tick_value(), 0.25);
    }
}
