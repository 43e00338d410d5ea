//! Streaming results to another thread.

use crossbeam_channel::{Receiver, Sender, TrySendError};

use skymesh_core::{MetricsSink, PacketOutcome, TickSnapshot};

/// One item on a [`ChannelSink`] stream.
#[derive(Clone, Debug, PartialEq)]
pub enum SimEvent {
    /// A tick completed.
    Tick(TickSnapshot),
    /// A packet reached a terminal status.
    Resolved(PacketOutcome),
}

/// Forwards everything over a crossbeam channel.
///
/// Bounded channels never block the simulation: events that do not fit
/// are discarded and counted. Once the receiver is gone the sink goes
/// quiet.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Sender<SimEvent>,
    dropped: u64,
    disconnected: bool,
}

impl ChannelSink {
    /// Sink with an unbounded queue.
    pub fn unbounded() -> (Self, Receiver<SimEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::from_sender(tx), rx)
    }

    /// Sink holding at most `capacity` undelivered events.
    pub fn bounded(capacity: usize) -> (Self, Receiver<SimEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self::from_sender(tx), rx)
    }

    /// Wrap an existing sender.
    pub fn from_sender(tx: Sender<SimEvent>) -> Self {
        Self {
            tx,
            dropped: 0,
            disconnected: false,
        }
    }

    /// Events discarded because the channel was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped
    }

    fn send(&mut self, event: SimEvent) {
        if self.disconnected {
            return;
        }
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.dropped += 1,
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("metrics receiver disconnected");
                self.disconnected = true;
            }
        }
    }
}

impl MetricsSink for ChannelSink {
    fn on_tick(&mut self, snapshot: &TickSnapshot) {
        self.send(SimEvent::Tick(snapshot.clone()));
    }

    fn on_resolved(&mut self, outcome: &PacketOutcome) {
        self.send(SimEvent::Resolved(outcome.clone()));
    }
}
