//! Skymesh: a packet-level, discrete-event simulator for multi-tier
//! networks of ground stations, UAV relays and satellites.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Skymesh sub-crates. For most users, adding `skymesh` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use skymesh::prelude::*;
//!
//! // One ground source linked straight to one station.
//! let config = SimConfig::new(GlobalConfig {
//!     distance_threshold: Some(100.0),
//!     duration: 60.0,
//!     ..GlobalConfig::default()
//! })
//! .with_class(
//!     NodeClassConfig::new("ground", Role::Source, 1)
//!         .generating(500.0)
//!         .links_to("station")
//!         .bandwidth(500.0),
//! )
//! .with_class(NodeClassConfig::new("station", Role::Destination, 1));
//!
//! let mut sim = Simulation::new(config).unwrap();
//! let report = sim.run_to_completion().unwrap();
//! assert_eq!(report.ticks_run, 60);
//! assert_eq!(report.arrived, 60);
//! assert!(report.is_conserved());
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `skymesh-core` | IDs, packets, positions, provider and sink traits |
//! | [`topology`] | `skymesh-topology` | Graph, edges, connectivity policy, link manager, router |
//! | [`engine`] | `skymesh-engine` | Config, nodes, tick engine, run lifecycle, statistics |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`skymesh-core`).
///
/// Contains [`types::Packet`] and its lifecycle, positions, roles, and the
/// extension traits ([`types::MobilityProvider`],
/// [`types::DecisionProvider`], [`types::MetricsSink`]).
pub use skymesh_core as types;

/// Dynamic link topology (`skymesh-topology`).
///
/// [`topology::Topology`] holds the graph; [`topology::TopologyManager`]
/// keeps it in line with a [`topology::ConnectivityPolicy`];
/// [`topology::router`] computes congestion-aware paths.
pub use skymesh_topology as topology;

/// Tick engine and simulation driver (`skymesh-engine`).
///
/// [`engine::TickEngine`] for tick-by-tick stepping,
/// [`engine::Simulation`] for timed runs with cancellation.
pub use skymesh_engine as engine;

/// Common imports for typical Skymesh usage.
///
/// ```rust
/// use skymesh::prelude::*;
/// ```
///
/// This imports the configuration builders, the engine entry points, the
/// core identifiers and the provider traits.
pub mod prelude {
    // Core types and traits
    pub use skymesh_core::{
        Action, DecisionProvider, DropReason, MetricsSink, MobilityProvider, NetworkView, NodeId,
        PacketOutcome, PacketStatus, Position, Role, StateVector, TickId, TickSnapshot,
    };

    // Reference providers and sinks
    pub use skymesh_core::{
        AlwaysForward, LinearDrift, NullSink, QueueThreshold, RandomWalk, Stationary, VecSink,
    };

    // Errors
    pub use skymesh_core::{InvariantViolation, PathError};
    pub use skymesh_engine::{ConfigError, TickError};
    pub use skymesh_topology::TopologyError;

    // Topology
    pub use skymesh_topology::LinkRange;

    // Engine
    pub use skymesh_engine::{
        CancelToken, ChannelSink, DecisionPolicyConfig, GlobalConfig, InitialPosition,
        IterationOrder, NodeClassConfig, RunReport, SimConfig, SimEvent, Simulation,
        SimulationStats, StepMetrics, TickEngine,
    };
}
