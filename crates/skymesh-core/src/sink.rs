//! Metrics sink interface: how results leave the engine.

use crate::id::{NodeId, TickId};
use crate::packet::PacketOutcome;

/// Aggregate state published after every tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickSnapshot {
    /// The tick just completed.
    pub tick: TickId,
    /// Packets generated so far.
    pub generated: u64,
    /// Packets arrived so far.
    pub arrived: u64,
    /// Packets dropped so far.
    pub dropped: u64,
    /// Packets buffered or staged anywhere in the network.
    pub in_flight: u64,
    /// Delivered bytes per simulated second, since the start of the run.
    pub throughput: f64,
    /// Simulated seconds elapsed.
    pub elapsed_seconds: f64,
    /// Buffer length of every node, ascending by id.
    pub queue_lengths: Vec<(NodeId, usize)>,
}

/// Receives per-tick snapshots and per-packet outcomes.
///
/// Sinks are called on the simulation thread, after the tick's state is
/// final. A slow sink slows the simulation.
pub trait MetricsSink: Send {
    /// Called once per tick.
    fn on_tick(&mut self, snapshot: &TickSnapshot);
    /// Called once per resolved packet, in resolution order.
    fn on_resolved(&mut self, _outcome: &PacketOutcome) {}
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn on_tick(&mut self, _snapshot: &TickSnapshot) {}
}

/// Buffers everything in memory.
#[derive(Clone, Debug, Default)]
pub struct VecSink {
    /// Snapshots in tick order.
    pub ticks: Vec<TickSnapshot>,
    /// Outcomes in resolution order.
    pub outcomes: Vec<PacketOutcome>,
}

impl MetricsSink for VecSink {
    fn on_tick(&mut self, snapshot: &TickSnapshot) {
        self.ticks.push(snapshot.clone());
    }

    fn on_resolved(&mut self, outcome: &PacketOutcome) {
        self.outcomes.push(outcome.clone());
    }
}
