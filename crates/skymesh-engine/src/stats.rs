//! Run-wide counters, histories and the end-of-run report.

use std::collections::BTreeMap;
use std::time::Duration;

use skymesh_core::{DropReason, NodeId, PacketOutcome, PacketStatus, TickId};

use crate::node::NodeHistory;

/// Global counters and time series for one run.
///
/// Owned by the [`TickEngine`](crate::tick::TickEngine); every counter
/// starts at zero when the engine is built.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimulationStats {
    /// Packets created, including those dropped at birth.
    pub generated_count: u64,
    /// Packets that reached their destination.
    pub arrived_count: u64,
    /// Packets dropped anywhere.
    pub dropped_count: u64,
    /// Drops broken down by cause.
    pub drops_by_reason: BTreeMap<DropReason, u64>,
    /// Generations abandoned because no destination was reachable.
    pub skipped_generations: u64,
    /// Payload bytes of arrived packets.
    pub delivered_bytes: u64,
    /// Sum of the delays of arrived packets, in ticks.
    pub total_arrival_delay: u64,
    /// Simulated seconds covered so far.
    pub elapsed_seconds: f64,
    /// Overall throughput after each tick.
    pub throughput_history: Vec<f64>,
    /// Packets generated during each tick.
    pub generated_history: Vec<u64>,
    /// Packets dropped during each tick.
    pub dropped_history: Vec<u64>,
    /// Sum of all rewards returned by decision providers.
    pub total_reward: f64,
    /// Terminal outcomes, kept only when packet records are retained.
    pub records: Vec<PacketOutcome>,
}

impl SimulationStats {
    /// Count a resolved packet.
    pub fn record_outcome(&mut self, outcome: &PacketOutcome, retain: bool) {
        match outcome.status {
            PacketStatus::Arrived => {
                self.arrived_count += 1;
                self.delivered_bytes += outcome.size;
                self.total_arrival_delay += outcome.delay();
            }
            PacketStatus::Dropped => {
                self.dropped_count += 1;
                if let Some(reason) = outcome.drop_reason {
                    *self.drops_by_reason.entry(reason).or_default() += 1;
                }
            }
            PacketStatus::InFlight => {}
        }
        if retain {
            self.records.push(outcome.clone());
        }
    }

    /// Close out a tick.
    pub(crate) fn end_tick(&mut self, elapsed_seconds: f64, generated: u64, dropped: u64) {
        self.elapsed_seconds = elapsed_seconds;
        self.generated_history.push(generated);
        self.dropped_history.push(dropped);
        self.throughput_history.push(self.throughput());
    }

    /// Delivered bytes per simulated second. Zero before time advances.
    pub fn throughput(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.delivered_bytes as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }

    /// `dropped / generated`; zero if nothing was generated.
    pub fn loss_rate(&self) -> f64 {
        if self.generated_count == 0 {
            0.0
        } else {
            self.dropped_count as f64 / self.generated_count as f64
        }
    }

    /// Mean ticks from birth to arrival, over arrived packets.
    pub fn average_delay(&self) -> Option<f64> {
        (self.arrived_count > 0)
            .then(|| self.total_arrival_delay as f64 / self.arrived_count as f64)
    }

    /// Drops for one cause.
    pub fn drops(&self, reason: DropReason) -> u64 {
        self.drops_by_reason.get(&reason).copied().unwrap_or(0)
    }
}

/// Summary of a finished (or cancelled) run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    /// Ticks fully applied by this call.
    pub ticks_run: u64,
    /// Last tick applied.
    pub last_tick: TickId,
    /// True if the run stopped on a cancellation request.
    pub cancelled: bool,
    /// Packets generated.
    pub generated: u64,
    /// Packets arrived.
    pub arrived: u64,
    /// Packets dropped.
    pub dropped: u64,
    /// Packets still buffered or staged.
    pub in_flight: u64,
    /// `dropped / generated`.
    pub loss_rate: f64,
    /// Delivered bytes per simulated second.
    pub overall_throughput: f64,
    /// Mean arrival delay in ticks, if anything arrived.
    pub average_delay: Option<f64>,
    /// Wall-clock time spent in the run call.
    pub wall_clock: Duration,
}

impl RunReport {
    /// True if every generated packet is accounted for.
    pub fn is_conserved(&self) -> bool {
        self.generated == self.arrived + self.dropped + self.in_flight
    }
}

/// A node's history, tagged with its id.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeReport {
    /// The node.
    pub node: NodeId,
    /// Its history at the time of the report.
    pub history: NodeHistory,
}
