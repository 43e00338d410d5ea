//! Error types shared across the Skymesh workspace.
//!
//! Two families: [`InvariantViolation`] is fatal and aborts the run,
//! [`PathError`] is recoverable and rejects a single reroute request.

use thiserror::Error;

use crate::id::{NodeId, PacketId, TickId};
use crate::packet::PacketStatus;

/// A broken simulation invariant. Always fatal.
///
/// Raised by the packet lifecycle and by generation accounting. The tick
/// engine surfaces it through `TickError` and the run aborts.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// A packet was delivered to a node other than its next required hop.
    #[error("{packet} delivered to {actual} but next hop is {expected}")]
    HopMismatch {
        /// The misrouted packet.
        packet: PacketId,
        /// The hop recorded at the head of the packet's remaining path.
        expected: NodeId,
        /// The node that attempted to receive it.
        actual: NodeId,
    },
    /// A packet with no remaining path was delivered again.
    #[error("{packet} has no remaining hops but was delivered to {actual}")]
    EmptyFuture {
        /// The packet.
        packet: PacketId,
        /// The node that attempted to receive it.
        actual: NodeId,
    },
    /// A resolved packet was handed to a node.
    #[error("{packet} is {status:?} but was delivered to {actual}")]
    DeliveredAfterResolution {
        /// The packet.
        packet: PacketId,
        /// Its terminal status.
        status: PacketStatus,
        /// The node that attempted to receive it.
        actual: NodeId,
    },
    /// A packet reached a second terminal status.
    #[error("{packet} already {previous:?} but was marked {attempted:?} at tick {tick}")]
    DoubleResolution {
        /// The packet.
        packet: PacketId,
        /// The terminal status it already had.
        previous: PacketStatus,
        /// The terminal status that was attempted.
        attempted: PacketStatus,
        /// Tick of the second attempt.
        tick: TickId,
    },
    /// Generation credit went negative.
    #[error("{node} generation credit went negative ({credit})")]
    NegativeCredit {
        /// The generating node.
        node: NodeId,
        /// The offending credit value, as text to keep `Eq`.
        credit: String,
    },
}

/// A rejected path rewrite. Recoverable: the packet keeps its old path.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path has fewer than two nodes, so no hop to take.
    #[error("path has no hops")]
    Empty,
    /// The replacement path ends somewhere other than the packet's destination.
    #[error("replacement path ends at {got}, packet is bound for {expected}")]
    DestinationMismatch {
        /// The packet's destination.
        expected: NodeId,
        /// The last node of the replacement path.
        got: NodeId,
    },
    /// The replacement path does not start where the packet currently is.
    #[error("replacement path starts at {got}, packet is at {expected}")]
    OriginMismatch {
        /// The packet's current location.
        expected: NodeId,
        /// The first node of the replacement path.
        got: NodeId,
    },
    /// Two consecutive nodes of the replacement path are not linked.
    #[error("no edge between {from} and {to}")]
    NotAdjacent {
        /// Earlier node.
        from: NodeId,
        /// Later node.
        to: NodeId,
    },
    /// The packet is already terminal.
    #[error("{0} is no longer in flight")]
    Resolved(PacketId),
}
