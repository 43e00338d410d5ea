//! Error types for graph mutation.

use skymesh_core::NodeId;
use thiserror::Error;

/// Errors arising from topology construction or mutation.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum TopologyError {
    /// The node is not registered.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    /// A node with this id is already registered.
    #[error("node {0} already registered")]
    DuplicateNode(NodeId),
    /// A link was requested between a node and itself.
    #[error("node {0} cannot link to itself")]
    SelfLink(NodeId),
    /// Bandwidth must be finite and positive.
    #[error("bandwidth must be finite and positive, got {0}")]
    InvalidBandwidth(f64),
    /// Packet size must be positive.
    #[error("packet size must be positive")]
    ZeroPacketSize,
}
