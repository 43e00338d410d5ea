//! Packets and their lifecycle.
//!
//! A [`Packet`] carries its own route: `past` holds the visited hops
//! (head = source) and `future` the remaining ones (head = next required
//! hop). Delivery moves one hop from `future` to `past`; an empty `future`
//! means arrival. Status moves `InFlight -> Arrived` or
//! `InFlight -> Dropped` exactly once. A second terminal transition is an
//! [`InvariantViolation`].

use smallvec::SmallVec;

use crate::error::{InvariantViolation, PathError};
use crate::id::{NodeId, PacketId, TickId};

/// Inline storage for a route. Most routes in a multi-tier network are
/// short (ground -> relay -> satellite -> ground).
pub type Route = SmallVec<[NodeId; 8]>;

/// Lifecycle state of a packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacketStatus {
    /// Still travelling.
    InFlight,
    /// Delivered to its destination.
    Arrived,
    /// Discarded before reaching its destination.
    Dropped,
}

/// Why a packet was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DropReason {
    /// Receiver's buffer was full when staging was flushed.
    BufferOverflow,
    /// Freshly generated packet did not fit in the source's own buffer.
    SourceBufferFull,
    /// The next hop was no longer a neighbor (topology churn).
    LinkLost,
}

/// A unit of traffic.
#[derive(Clone, Debug)]
pub struct Packet {
    id: PacketId,
    size: u64,
    source: NodeId,
    destination: NodeId,
    past: Route,
    future: Route,
    born_tick: TickId,
    died_tick: Option<TickId>,
    status: PacketStatus,
    drop_reason: Option<DropReason>,
    reward_requests: SmallVec<[NodeId; 2]>,
}

impl Packet {
    /// Create a packet travelling along `path`.
    ///
    /// `path[0]` is the source and the last element the destination.
    /// The path must contain at least two nodes.
    pub fn new(id: PacketId, path: &[NodeId], size: u64, born_tick: TickId) -> Result<Self, PathError> {
        let (source, destination) = match path {
            [first, .., last] => (*first, *last),
            _ => return Err(PathError::Empty),
        };
        let mut past = Route::new();
        past.push(source);
        Ok(Self {
            id,
            size,
            source,
            destination,
            past,
            future: path[1..].iter().copied().collect(),
            born_tick,
            died_tick: None,
            status: PacketStatus::InFlight,
            drop_reason: None,
            reward_requests: SmallVec::new(),
        })
    }

    /// Unique id.
    pub fn id(&self) -> PacketId {
        self.id
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Originating node.
    pub fn source(&self) -> NodeId {
        self.source
    }

    /// Final node.
    pub fn destination(&self) -> NodeId {
        self.destination
    }

    /// Hops already visited, source first.
    pub fn past(&self) -> &[NodeId] {
        &self.past
    }

    /// Hops still to visit, next hop first.
    pub fn future(&self) -> &[NodeId] {
        &self.future
    }

    /// The node that must receive this packet next.
    pub fn next_hop(&self) -> Option<NodeId> {
        self.future.first().copied()
    }

    /// The node currently holding this packet.
    pub fn current_location(&self) -> NodeId {
        self.past.last().copied().unwrap_or(self.source)
    }

    /// Current lifecycle state.
    pub fn status(&self) -> PacketStatus {
        self.status
    }

    /// Tick of creation.
    pub fn born_tick(&self) -> TickId {
        self.born_tick
    }

    /// Tick of the terminal transition, if any.
    pub fn died_tick(&self) -> Option<TickId> {
        self.died_tick
    }

    /// Why the packet was dropped, if it was.
    pub fn drop_reason(&self) -> Option<DropReason> {
        self.drop_reason
    }

    /// `died_tick - born_tick`, once terminal.
    pub fn delay(&self) -> Option<u64> {
        self.died_tick
            .map(|died| died.0.saturating_sub(self.born_tick.0))
    }

    /// Nodes that asked to be told how this packet ends.
    pub fn reward_requests(&self) -> &[NodeId] {
        &self.reward_requests
    }

    /// Register `node` for a reward callback when this packet resolves.
    pub fn request_reward(&mut self, node: NodeId) {
        if !self.reward_requests.contains(&node) {
            self.reward_requests.push(node);
        }
    }

    /// True once arrived or dropped.
    pub fn is_resolved(&self) -> bool {
        self.status != PacketStatus::InFlight
    }

    /// Deliver this packet to `at`.
    ///
    /// `at` must be exactly the head of `future`; anything else is a
    /// routing bug and is reported as [`InvariantViolation::HopMismatch`].
    /// Returns `true` if the packet has now arrived.
    pub fn advance_hop(&mut self, at: NodeId, tick: TickId) -> Result<bool, InvariantViolation> {
        if self.is_resolved() {
            return Err(InvariantViolation::DeliveredAfterResolution {
                packet: self.id,
                status: self.status,
                actual: at,
            });
        }
        let Some(expected) = self.next_hop() else {
            return Err(InvariantViolation::EmptyFuture {
                packet: self.id,
                actual: at,
            });
        };
        if expected != at {
            return Err(InvariantViolation::HopMismatch {
                packet: self.id,
                expected,
                actual: at,
            });
        }
        self.future.remove(0);
        self.past.push(at);
        if self.future.is_empty() {
            self.resolve(PacketStatus::Arrived, tick)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Mark the packet dropped at `tick`.
    pub fn mark_dropped(&mut self, tick: TickId, reason: DropReason) -> Result<(), InvariantViolation> {
        self.resolve(PacketStatus::Dropped, tick)?;
        self.drop_reason = Some(reason);
        Ok(())
    }

    fn resolve(&mut self, to: PacketStatus, tick: TickId) -> Result<(), InvariantViolation> {
        if self.status != PacketStatus::InFlight {
            return Err(InvariantViolation::DoubleResolution {
                packet: self.id,
                previous: self.status,
                attempted: to,
                tick,
            });
        }
        self.status = to;
        self.died_tick = Some(tick);
        Ok(())
    }

    /// Replace the remaining route.
    ///
    /// `new_path` must start at the packet's current location and end at
    /// its destination; the remaining hops become `new_path[1..]`. On
    /// error the packet is unchanged. Adjacency of the new hops is the
    /// caller's concern (the router checks it against the live graph).
    pub fn recal_path(&mut self, new_path: &[NodeId]) -> Result<(), PathError> {
        if self.is_resolved() {
            return Err(PathError::Resolved(self.id));
        }
        let (first, last) = match new_path {
            [first, .., last] => (*first, *last),
            _ => return Err(PathError::Empty),
        };
        if last != self.destination {
            return Err(PathError::DestinationMismatch {
                expected: self.destination,
                got: last,
            });
        }
        let here = self.current_location();
        if first != here {
            return Err(PathError::OriginMismatch {
                expected: here,
                got: first,
            });
        }
        self.future.clear();
        self.future.extend(new_path[1..].iter().copied());
        Ok(())
    }

    /// Snapshot of a resolved packet. `None` while in flight.
    pub fn outcome(&self) -> Option<PacketOutcome> {
        let died_tick = self.died_tick?;
        Some(PacketOutcome {
            packet: self.id,
            source: self.source,
            destination: self.destination,
            size: self.size,
            status: self.status,
            drop_reason: self.drop_reason,
            born_tick: self.born_tick,
            died_tick,
            hops: self.past.len().saturating_sub(1),
        })
    }
}

/// Final record of a resolved packet.
///
/// Kept for metrics and handed to decision providers in reward callbacks.
#[derive(Clone, Debug, PartialEq)]
pub struct PacketOutcome {
    /// The packet.
    pub packet: PacketId,
    /// Originating node.
    pub source: NodeId,
    /// Intended destination.
    pub destination: NodeId,
    /// Size in bytes.
    pub size: u64,
    /// `Arrived` or `Dropped`.
    pub status: PacketStatus,
    /// Set when dropped.
    pub drop_reason: Option<DropReason>,
    /// Tick of creation.
    pub born_tick: TickId,
    /// Tick of resolution.
    pub died_tick: TickId,
    /// Edges traversed.
    pub hops: usize,
}

impl PacketOutcome {
    /// Ticks between creation and resolution.
    pub fn delay(&self) -> u64 {
        self.died_tick.0.saturating_sub(self.born_tick.0)
    }

    /// Reward used when a provider has no opinion of its own.
    ///
    /// `1 / delay` on arrival, `-delay` on drop. Delay is clamped to at
    /// least one tick so same-tick deliveries stay finite.
    pub fn default_reward(&self) -> f64 {
        let delay = self.delay().max(1) as f64;
        match self.status {
            PacketStatus::Arrived => 1.0 / delay,
            _ => -delay,
        }
    }
}
