//! Tick engine and simulation driver for Skymesh.
//!
//! Builds a world from a [`SimConfig`], then advances it in discrete
//! ticks: packets are generated at sources, forwarded hop by hop subject
//! to link cadence and buffer capacity, and resolved as arrived or
//! dropped. [`TickEngine`] executes single ticks; [`Simulation`] runs a
//! duration and reports the result.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cancel;
pub mod config;
pub mod metrics;
pub mod node;
pub mod sink;
pub mod stats;
pub mod tick;
pub mod view;
pub mod world;

pub use cancel::CancelToken;
pub use config::{
    ConfigError, DecisionPolicyConfig, GlobalConfig, InitialPosition, IterationOrder,
    MobilityRegistry, NodeClassConfig, SimConfig,
};
pub use metrics::StepMetrics;
pub use node::{Node, NodeHistory};
pub use sink::{ChannelSink, SimEvent};
pub use stats::{NodeReport, RunReport, SimulationStats};
pub use tick::{TickEngine, TickError, TickErrorKind, TickResult};
pub use world::Simulation;
