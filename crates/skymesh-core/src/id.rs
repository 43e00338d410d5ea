//! Strongly-typed identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies a node within a simulated network.
///
/// Nodes are numbered in creation order. `NodeId(n)` is the n-th node the
/// engine built; ids are never reused, even after population growth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a node class (ground, relay, satellite, ...).
///
/// `ClassId(n)` corresponds to the n-th class in the simulation config.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ClassId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Counter for unique [`PacketId`] allocation.
static PACKET_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a packet.
///
/// Allocated from a monotonic, process-wide atomic counter via
/// [`PacketId::next`]. Two packets never share an id, even across
/// simulations running in the same process. Within one simulation,
/// ids are increasing in creation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PacketId(u64);

impl PacketId {
    /// Allocate a fresh, unique packet id. Thread-safe.
    pub fn next() -> Self {
        Self(PACKET_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "packet_{}", self.0)
    }
}

/// Monotonically increasing tick counter.
///
/// Tick 0 is the build-time state; the first executed tick is tick 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TickId(pub u64);

impl TickId {
    /// The tick after this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Tick number as `f64`, for comparison against fractional schedules.
    pub fn as_f64(self) -> f64 {
        self.0 as f64
    }
}

impl fmt::Display for TickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TickId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_ids_are_unique_and_increasing() {
        let a = PacketId::next();
        let b = PacketId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn node_id_display() {
        assert_eq!(NodeId(7).to_string(), "node_7");
        assert_eq!(NodeId::from(3), NodeId(3));
    }

    #[test]
    fn tick_next() {
        assert_eq!(TickId(4).next(), TickId(5));
        assert_eq!(TickId(4).as_f64(), 4.0);
    }
}
