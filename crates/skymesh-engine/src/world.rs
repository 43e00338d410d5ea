//! Run lifecycle around the tick engine.
//!
//! [`Simulation`] turns a duration in simulated seconds into a tick
//! count, drives the [`TickEngine`] until the count is reached or the
//! run is cancelled, and summarizes the result as a [`RunReport`].
//!
//! # Ownership model
//!
//! `Simulation` is [`Send`], so a run can be moved to a worker thread.
//! The [`CancelToken`] is the only piece meant to be shared: clone it
//! before moving the simulation and call
//! [`cancel()`](CancelToken::cancel) from anywhere. The driver checks it
//! between ticks, so the reported state is always that of a fully
//! applied tick.

use std::time::Instant;

use tracing::info;

use skymesh_core::{MetricsSink, NodeId};

use crate::cancel::CancelToken;
use crate::config::{ConfigError, SimConfig};
use crate::stats::RunReport;
use crate::tick::{TickEngine, TickError};

// Compile-time assertion: Simulation is Send.
// Fails to compile if any provider or sink loses its Send bound.
const _: () = {
    #[allow(dead_code)]
    fn assert_send<T: Send>() {}
    #[allow(dead_code)]
    fn check() {
        assert_send::<Simulation>();
    }
};

/// A configured simulation ready to run.
pub struct Simulation {
    engine: TickEngine,
    cancel: CancelToken,
}

impl Simulation {
    /// Validate `config` and build the world.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            engine: TickEngine::new(config)?,
            cancel: CancelToken::new(),
        })
    }

    /// Build the world, publishing results to `sink`.
    pub fn with_sink(config: SimConfig, sink: Box<dyn MetricsSink>) -> Result<Self, ConfigError> {
        Ok(Self {
            engine: TickEngine::with_sink(config, sink)?,
            cancel: CancelToken::new(),
        })
    }

    /// Handle that stops a run in progress.
    ///
    /// The flag stays set after a cancelled run; call
    /// [`CancelToken::reset`] before running again.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run for `duration` simulated seconds.
    ///
    /// The tick count is `floor(duration / step_value)` with the step
    /// value in force when the run starts; later step changes do not
    /// alter it.
    pub fn run(&mut self, duration: f64) -> Result<RunReport, TickError> {
        let step = self.engine.step_value();
        let ticks = if duration.is_finite() && duration > 0.0 {
            (duration / step).floor() as u64
        } else {
            0
        };
        let started = Instant::now();
        info!(ticks, step_value = step, duration, "run started");

        let mut ticks_run = 0;
        let mut cancelled = false;
        while ticks_run < ticks {
            if self.cancel.is_cancelled() {
                cancelled = true;
                info!(ticks_run, "run cancelled");
                break;
            }
            self.engine.execute_tick()?;
            ticks_run += 1;
        }

        let report = self.report(ticks_run, cancelled, started);
        info!(
            ticks_run,
            generated = report.generated,
            arrived = report.arrived,
            dropped = report.dropped,
            throughput = report.overall_throughput,
            "run finished"
        );
        Ok(report)
    }

    /// Run for the configured duration.
    pub fn run_to_completion(&mut self) -> Result<RunReport, TickError> {
        let duration = self.engine.config().global.duration;
        self.run(duration)
    }

    /// Rebuild from the config with a new seed for another run.
    pub fn reset(&mut self, seed: u64) -> Result<(), ConfigError> {
        self.engine.reset(seed)?;
        self.cancel.reset();
        Ok(())
    }

    /// Add a member of `class` mid-run.
    pub fn spawn_node(&mut self, class: &str) -> Result<NodeId, ConfigError> {
        self.engine.spawn_node(class)
    }

    /// The underlying engine.
    pub fn engine(&self) -> &TickEngine {
        &self.engine
    }

    /// Mutable access for stepping tick by tick.
    pub fn engine_mut(&mut self) -> &mut TickEngine {
        &mut self.engine
    }

    fn report(&self, ticks_run: u64, cancelled: bool, started: Instant) -> RunReport {
        let stats = self.engine.stats();
        RunReport {
            ticks_run,
            last_tick: self.engine.current_tick(),
            cancelled,
            generated: stats.generated_count,
            arrived: stats.arrived_count,
            dropped: stats.dropped_count,
            in_flight: self.engine.in_flight(),
            loss_rate: stats.loss_rate(),
            overall_throughput: stats.throughput(),
            average_delay: stats.average_delay(),
            wall_clock: started.elapsed(),
        }
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("engine", &self.engine)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
