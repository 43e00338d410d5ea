//! Test fixtures and mock providers for Skymesh development.
//!
//! Provides ready-made configurations for the reference scenarios, mock
//! decision and mobility providers, a shareable sink, and a tracing
//! initializer for tests that want log output.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{ScriptedDecision, SharedSink, Teleport};

use skymesh_core::Role;
use skymesh_engine::{GlobalConfig, NodeClassConfig, SimConfig};
use tracing_subscriber::filter::LevelFilter;

/// Route engine logs to the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(LevelFilter::DEBUG)
        .try_init();
}

/// Global settings shared by the scenarios: everything at the origin,
/// 500-byte packets, a 100 m link threshold.
pub fn base_global(duration: f64) -> GlobalConfig {
    GlobalConfig {
        packet_size: 500,
        duration,
        distance_threshold: Some(100.0),
        seed: 42,
        ..GlobalConfig::default()
    }
}

/// One source linked straight to one destination at 500 B/s, generating
/// 500 B/s for 60 s.
///
/// Ids: source 0, destination 1.
pub fn scenario_a() -> SimConfig {
    SimConfig::new(base_global(60.0))
        .with_class(
            NodeClassConfig::new("ground", Role::Source, 1)
                .generating(500.0)
                .links_to("station")
                .bandwidth(500.0),
        )
        .with_class(NodeClassConfig::new("station", Role::Destination, 1))
}

/// Source, a relay with no buffer space, and a destination behind it.
///
/// Ids: source 0, relay 1, destination 2.
pub fn scenario_b() -> SimConfig {
    SimConfig::new(base_global(30.0))
        .with_class(
            NodeClassConfig::new("ground", Role::Source, 1)
                .generating(500.0)
                .links_to("uav")
                .bandwidth(500.0),
        )
        .with_class(
            NodeClassConfig::new("uav", Role::Relay, 1)
                .buffer(0)
                .links_to("station")
                .bandwidth(500.0),
        )
        .with_class(NodeClassConfig::new("station", Role::Destination, 1))
}

/// A source whose class has no link rules.
///
/// Ids: source 0, destination 1.
pub fn scenario_c() -> SimConfig {
    SimConfig::new(base_global(20.0))
        .with_class(NodeClassConfig::new("ground", Role::Source, 1).generating(500.0))
        .with_class(NodeClassConfig::new("station", Role::Destination, 1))
}

/// Two sources feeding one relay faster than it can drain, the relay
/// serving two destinations over equal-cadence links.
///
/// Source links run at 1000 B/s (one packet per tick), relay links at
/// 500 B/s (one packet every two ticks each). Step value is 0.5 s.
///
/// Ids: sources 0 and 1, relay 2, destinations 3 and 4.
pub fn scenario_d() -> SimConfig {
    SimConfig::new(base_global(100.0))
        .with_class(
            NodeClassConfig::new("ground", Role::Source, 2)
                .generating(2000.0)
                .links_to("uav")
                .bandwidth(1000.0),
        )
        .with_class(
            NodeClassConfig::new("uav", Role::Relay, 1)
                .links_to("station")
                .bandwidth(500.0),
        )
        .with_class(NodeClassConfig::new("station", Role::Destination, 2))
}
