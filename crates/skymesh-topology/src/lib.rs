//! Dynamic link topology for Skymesh simulations.
//!
//! This crate owns the network graph and everything that reads or
//! reshapes it between ticks:
//!
//! - [`Topology`]: node registry, explicit [`Edge`] map, sorted adjacency
//!   and the global step value derived from the fastest link.
//! - [`ConnectivityPolicy`]: which node classes may link, at what
//!   bandwidth, and whether distance applies.
//! - [`TopologyManager`]: periodic, idempotent reconciliation of the edge
//!   set with the policy.
//! - [`router`]: congestion-aware shortest paths, reroutes and packet
//!   path planning.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod connectivity;
pub mod edge;
pub mod error;
pub mod graph;
pub mod manager;
pub mod router;

pub use connectivity::{ConnectivityPolicy, LinkRange, LinkRule};
pub use edge::{Edge, EdgeKey};
pub use error::TopologyError;
pub use graph::{NodeEntry, Topology};
pub use manager::{RefreshOutcome, TopologyManager};
