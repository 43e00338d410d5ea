//! Core types and traits for the Skymesh network simulator.
//!
//! Leaf crate with no internal dependencies. It defines the vocabulary
//! shared by the topology and engine crates: identifiers, positions, the
//! packet lifecycle, error types, and the provider traits through which
//! mobility, forwarding policy and metrics plug into the engine.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod decision;
pub mod error;
pub mod id;
pub mod mobility;
pub mod packet;
pub mod position;
pub mod role;
pub mod sink;

pub use decision::{
    Action, AlwaysForward, DecisionProvider, NetworkView, QueueThreshold, StateVector,
    DEFAULT_MAX_NEIGHBORS,
};
pub use error::{InvariantViolation, PathError};
pub use id::{ClassId, NodeId, PacketId, TickId};
pub use mobility::{
    LinearDrift, MobilityContext, MobilityProvider, RandomWalk, Stationary, DEFAULT_SPEED,
};
pub use packet::{DropReason, Packet, PacketOutcome, PacketStatus, Route};
pub use position::Position;
pub use role::Role;
pub use sink::{MetricsSink, NullSink, TickSnapshot, VecSink};
