//! Reusable provider and sink fixtures.
//!
//! - [`ScriptedDecision`]: replays a fixed sequence of actions.
//! - [`Teleport`]: jumps to a position at a given tick.
//! - [`SharedSink`]: a [`VecSink`] the test keeps a handle to after the
//!   engine takes ownership.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use skymesh_core::{
    Action, DecisionProvider, MetricsSink, MobilityContext, MobilityProvider, PacketOutcome,
    Position, StateVector, TickId, TickSnapshot, VecSink,
};

/// Cycles through `script`, one action per decision.
///
/// Counts post-tick callbacks and resolutions in shared counters so a
/// test can inspect them after handing the provider to the engine.
pub struct ScriptedDecision {
    script: Vec<Action>,
    cursor: usize,
    pub post_ticks: Arc<AtomicUsize>,
    pub resolutions: Arc<AtomicUsize>,
}

impl ScriptedDecision {
    pub fn new(script: Vec<Action>) -> Self {
        Self {
            script,
            cursor: 0,
            post_ticks: Arc::new(AtomicUsize::new(0)),
            resolutions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always the same action.
    pub fn always(action: Action) -> Self {
        Self::new(vec![action])
    }
}

impl DecisionProvider for ScriptedDecision {
    fn decide(&mut self, _tick: TickId, _state: &StateVector) -> Action {
        if self.script.is_empty() {
            return Action::Forward;
        }
        let action = self.script[self.cursor % self.script.len()];
        self.cursor += 1;
        action
    }

    fn on_post_tick(&mut self, _tick: TickId, _state: &StateVector) {
        self.post_ticks.fetch_add(1, Ordering::Relaxed);
    }

    fn on_resolved(&mut self, outcome: &PacketOutcome) -> f64 {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        outcome.default_reward()
    }
}

/// Stays put until `at_tick`, then jumps to `to` and stays there.
#[derive(Clone, Copy, Debug)]
pub struct Teleport {
    pub at_tick: u64,
    pub to: Position,
}

impl MobilityProvider for Teleport {
    fn next_position(&mut self, ctx: &MobilityContext, current: Position) -> Position {
        if ctx.elapsed_ticks >= self.at_tick {
            self.to
        } else {
            current
        }
    }
}

/// A [`VecSink`] shared between the engine and the test.
#[derive(Clone, Default)]
pub struct SharedSink {
    inner: Arc<Mutex<VecSink>>,
}

impl SharedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Boxed clone to hand to the engine.
    pub fn boxed(&self) -> Box<dyn MetricsSink> {
        Box::new(self.clone())
    }

    /// Everything recorded so far.
    pub fn lock(&self) -> MutexGuard<'_, VecSink> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MetricsSink for SharedSink {
    fn on_tick(&mut self, snapshot: &TickSnapshot) {
        self.lock().on_tick(snapshot);
    }

    fn on_resolved(&mut self, outcome: &PacketOutcome) {
        self.lock().on_resolved(outcome);
    }
}
