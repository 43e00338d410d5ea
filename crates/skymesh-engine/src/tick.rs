//! Tick engine: the single-threaded simulation loop.
//!
//! [`TickEngine`] owns the topology, the nodes and the run statistics, and
//! advances them one tick at a time. Every tick follows the same fixed
//! sequence:
//!
//! 0. rebuild invalidated neighbor schedules,
//! 1. observe and decide: policy relays snapshot their state, then decide
//!    serially in node-id order (an offload reroutes the head packet),
//! 2. plan: every node computes a [`NodePlan`] against the pre-tick state,
//! 3. apply plans in node-id order (creation, forwarding, drops), then
//!    move mobile nodes,
//! 4. flush every node's staging area into its buffer,
//! 5. refresh edge loads,
//! 6. accumulate statistics,
//! 7. refresh links if due,
//! 8. post-tick observations, reward callbacks and the metrics sink.
//!
//! Plans never observe each other's effects and staging is flushed in a
//! canonical order, so the order in which plans are computed cannot
//! change the outcome.

use std::fmt;
use std::time::Instant;

use indexmap::IndexMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{debug, info, trace};

use skymesh_core::{
    Action, DropReason, InvariantViolation, MetricsSink, NodeId, NullSink, PacketStatus, PathError,
    Position, StateVector, TickId, TickSnapshot,
};
use skymesh_topology::{router, Topology, TopologyError, TopologyManager};

use crate::config::{class_id, ConfigError, InitialPosition, IterationOrder, SimConfig};
use crate::metrics::{elapsed_us, StepMetrics};
use crate::node::{
    resolved_entry, BufferLimit, DecisionPolicy, Generation, Mobility, Node, NodeError, NodePlan,
    PlanContext, Resolved,
};
use crate::stats::{NodeReport, SimulationStats};
use crate::view::TickView;

// ── TickResult ─────────────────────────────────────────────────────

/// Result of a successful tick execution.
#[derive(Clone, Debug, PartialEq)]
pub struct TickResult {
    /// The tick just applied.
    pub tick: TickId,
    /// Timing and traffic for this tick.
    pub metrics: StepMetrics,
}

// ── TickError ──────────────────────────────────────────────────────

/// What went wrong in a failed tick.
#[derive(Debug, Error, PartialEq)]
pub enum TickErrorKind {
    /// A packet lifecycle rule was broken.
    #[error("invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
    /// A packet could not be built or rerouted.
    #[error("path rejected: {0}")]
    Path(#[from] PathError),
    /// The graph rejected an update.
    #[error("topology update failed: {0}")]
    Topology(#[from] TopologyError),
    /// An earlier tick failed; the engine no longer advances.
    #[error("engine halted after a failed tick")]
    Halted,
}

impl From<NodeError> for TickErrorKind {
    fn from(e: NodeError) -> Self {
        match e {
            NodeError::Invariant(v) => Self::Invariant(v),
            NodeError::Path(p) => Self::Path(p),
        }
    }
}

/// Error returned from [`TickEngine::execute_tick()`].
///
/// A failed tick leaves the engine halted: state may be partially
/// updated, so every later call fails with [`TickErrorKind::Halted`]
/// until [`TickEngine::reset`].
#[derive(Debug, PartialEq)]
pub struct TickError {
    /// The tick that failed.
    pub tick: TickId,
    /// The underlying error.
    pub kind: TickErrorKind,
}

impl TickError {
    fn at(tick: TickId, kind: impl Into<TickErrorKind>) -> Self {
        Self {
            tick,
            kind: kind.into(),
        }
    }
}

impl fmt::Display for TickError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tick {}: {}", self.tick.0, self.kind)
    }
}

impl std::error::Error for TickError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

// ── TickEngine ─────────────────────────────────────────────────────

/// Single-threaded, deterministic tick engine.
///
/// Owns all simulation state. Two engines built from the same config
/// produce identical statistics tick for tick.
pub struct TickEngine {
    config: SimConfig,
    topology: Topology,
    manager: TopologyManager,
    nodes: IndexMap<NodeId, Node>,
    class_members: Vec<usize>,
    current_tick: TickId,
    elapsed_seconds: f64,
    stats: SimulationStats,
    sink: Box<dyn MetricsSink>,
    last_metrics: StepMetrics,
    halted: bool,
}

impl TickEngine {
    /// Construct an engine from a [`SimConfig`].
    ///
    /// Validates the config, creates every configured node and forms the
    /// initial links. Results go to a [`NullSink`] until
    /// [`set_sink`](Self::set_sink) is called.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        Self::with_sink(config, Box::new(NullSink))
    }

    /// Construct an engine that publishes to `sink`.
    pub fn with_sink(config: SimConfig, sink: Box<dyn MetricsSink>) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = config.connectivity_policy();
        let packet_size = config.global.packet_size;
        let initial_step = policy
            .max_bandwidth()
            .map_or(1.0, |bw| packet_size as f64 / bw);
        let topology = Topology::new(packet_size, initial_step)?;
        let manager = TopologyManager::new(policy, config.global.link_refresh_period);

        let mut engine = Self {
            class_members: vec![0; config.classes.len()],
            config,
            topology,
            manager,
            nodes: IndexMap::new(),
            current_tick: TickId::default(),
            elapsed_seconds: 0.0,
            stats: SimulationStats::default(),
            sink,
            last_metrics: StepMetrics::default(),
            halted: false,
        };
        for index in 0..engine.config.classes.len() {
            for _ in 0..engine.config.classes[index].count {
                engine.add_member(index)?;
            }
        }
        let outcome = engine.manager.refresh(&mut engine.topology)?;
        info!(
            nodes = engine.nodes.len(),
            links = outcome.added.len(),
            step_value = engine.topology.step_value(),
            "simulation built"
        );
        Ok(engine)
    }

    fn add_member(&mut self, index: usize) -> Result<NodeId, ConfigError> {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        let member = self.class_members[index];
        let class = &self.config.classes[index];
        let seed = self.config.global.seed;

        let position = match &class.initial_position {
            InitialPosition::Fixed(p) => *p,
            InitialPosition::Explicit(list) => list
                .get(member)
                .or(list.last())
                .copied()
                .unwrap_or_default(),
            InitialPosition::UniformInArea { altitude } => {
                let mut rng = ChaCha8Rng::seed_from_u64(seed ^ (u64::from(id.0) << 32));
                let (w, d) = self.config.global.area;
                Position::new(rng.random::<f64>() * w, rng.random::<f64>() * d, *altitude)
            }
        };

        let mut node = Node::new(id, class_id(index), class.role, position);
        if let Some(rate) = class.generation_rate {
            let generation = Generation::new(rate, self.config.packet_size_for(index))
                .starting_at(self.current_tick);
            node = node.with_generation(generation);
        }
        if let Some(max_bytes) = class.buffer_size {
            node = node.with_buffer_limit(BufferLimit { max_bytes });
        }
        if let Some(key) = &class.mobility {
            let provider = self
                .config
                .mobility
                .build(key, id, seed)
                .ok_or_else(|| ConfigError::UnknownMobility {
                    class: class.name.clone(),
                    key: key.clone(),
                })?;
            node = node.with_mobility(Mobility::new(provider));
        }
        if let Some(policy) = &class.decision {
            let target = self
                .config
                .class_index(&policy.offload_class)
                .ok_or_else(|| ConfigError::UnknownClass {
                    class: class.name.clone(),
                    reference: policy.offload_class.clone(),
                })?;
            node = node.with_policy(DecisionPolicy::new((policy.factory)(id), class_id(target)));
        }

        self.topology
            .add_node(id, class_id(index), class.role, position)?;
        self.nodes.insert(id, node);
        self.class_members[index] += 1;
        Ok(id)
    }

    /// Add a member of `class` to the running simulation.
    ///
    /// The node joins the edge set at the next link refresh.
    pub fn spawn_node(&mut self, class: &str) -> Result<NodeId, ConfigError> {
        let index = self
            .config
            .class_index(class)
            .ok_or_else(|| ConfigError::NoSuchClass(class.to_string()))?;
        let id = self.add_member(index)?;
        debug!(node = %id, class, tick = self.current_tick.0, "node spawned");
        Ok(id)
    }

    /// Rebuild the world from its config with a new seed.
    ///
    /// Statistics, nodes and links start over; the sink is kept.
    pub fn reset(&mut self, seed: u64) -> Result<(), ConfigError> {
        let mut config = self.config.clone();
        config.global.seed = seed;
        let sink = std::mem::replace(&mut self.sink, Box::new(NullSink));
        *self = Self::with_sink(config, sink)?;
        Ok(())
    }

    /// Replace the metrics sink, returning the previous one.
    pub fn set_sink(&mut self, sink: Box<dyn MetricsSink>) -> Box<dyn MetricsSink> {
        std::mem::replace(&mut self.sink, sink)
    }

    /// Execute one tick.
    pub fn execute_tick(&mut self) -> Result<TickResult, TickError> {
        let tick = self.current_tick.next();
        if self.halted {
            return Err(TickError::at(tick, TickErrorKind::Halted));
        }
        match self.run_tick(tick) {
            Ok(metrics) => {
                self.current_tick = tick;
                self.last_metrics = metrics.clone();
                Ok(TickResult { tick, metrics })
            }
            Err(kind) => {
                self.halted = true;
                tracing::error!(tick = tick.0, error = %kind, "tick failed");
                Err(TickError::at(tick, kind))
            }
        }
    }

    fn run_tick(&mut self, tick: TickId) -> Result<StepMetrics, TickErrorKind> {
        let start = Instant::now();
        let mut metrics = StepMetrics::default();
        let mut resolved: Vec<Resolved> = Vec::new();

        // 0. Lazy schedule rebuild.
        for node in self.nodes.values_mut() {
            node.prepare(&self.topology, tick);
        }

        // 1. Observe + decide.
        let t = Instant::now();
        self.decide(tick)?;
        metrics.decide_us = elapsed_us(t);

        // 2. Plan against the pre-tick state.
        let t = Instant::now();
        let plans = self.plan(tick)?;
        metrics.plan_us = elapsed_us(t);

        // 3. Apply in id order.
        let t = Instant::now();
        for plan in plans {
            let Some(node) = self.nodes.get_mut(&plan.node) else {
                continue;
            };
            let from = node.id();
            let mut out = node.apply_plan(plan, tick)?;
            metrics.generated += out.created;
            self.stats.skipped_generations += out.skipped;
            metrics.forwarded += out.sends.len() as u64;
            resolved.append(&mut out.resolved);
            for (to, mut packet) in out.sends {
                match self.nodes.get_mut(&to) {
                    Some(receiver) => resolved.extend(receiver.receive(packet, from, tick)?),
                    None => {
                        packet.mark_dropped(tick, DropReason::LinkLost)?;
                        resolved.extend(resolved_entry(&packet));
                    }
                }
            }
        }
        let step_value = self.topology.step_value();
        for node in self.nodes.values_mut() {
            if let Some(position) = node.step_mobility(tick, step_value) {
                self.topology.set_position(node.id(), position)?;
            }
        }
        metrics.apply_us = elapsed_us(t);

        // 4. Flush staging.
        let t = Instant::now();
        for node in self.nodes.values_mut() {
            resolved.append(&mut node.update_queue(tick)?);
        }
        metrics.queue_us = elapsed_us(t);

        // 5. Edge loads.
        let nodes = &self.nodes;
        self.topology
            .refresh_loads(|id| nodes.get(&id).map_or(0, Node::queue_len));

        // 6. Statistics.
        let retain = self.config.global.retain_packet_records;
        for (outcome, _) in &resolved {
            self.stats.record_outcome(outcome, retain);
            match outcome.status {
                PacketStatus::Arrived => metrics.arrived += 1,
                _ => metrics.dropped += 1,
            }
        }
        self.stats.generated_count += metrics.generated;
        self.elapsed_seconds += step_value;
        self.stats
            .end_tick(self.elapsed_seconds, metrics.generated, metrics.dropped);
        for node in self.nodes.values_mut() {
            node.record_history();
        }

        // 7. Link refresh.
        if self.manager.is_due(tick) {
            let t = Instant::now();
            let outcome = self.manager.refresh(&mut self.topology)?;
            if outcome.is_changed() {
                for node in self.nodes.values_mut() {
                    node.invalidate_schedule();
                }
                debug!(
                    tick = tick.0,
                    added = outcome.added.len(),
                    removed = outcome.removed.len(),
                    step_value = self.topology.step_value(),
                    "links changed"
                );
            }
            metrics.links_added = outcome.added.len() as u32;
            metrics.links_removed = outcome.removed.len() as u32;
            metrics.topology_us = elapsed_us(t);
        }

        // 8. Post-tick observations, rewards, sink.
        self.post_tick(tick);
        self.dispatch_rewards(&resolved);
        for (outcome, _) in &resolved {
            self.sink.on_resolved(outcome);
        }
        let snapshot = self.snapshot_at(tick);
        self.sink.on_tick(&snapshot);

        metrics.total_us = elapsed_us(start);
        trace!(
            tick = tick.0,
            generated = metrics.generated,
            arrived = metrics.arrived,
            dropped = metrics.dropped,
            "tick applied"
        );
        Ok(metrics)
    }

    fn decide(&mut self, tick: TickId) -> Result<(), TickErrorKind> {
        let view = TickView::new(tick, &self.topology, &self.nodes);
        let states: Vec<(NodeId, StateVector)> = self
            .nodes
            .values()
            .filter(|n| n.queue_len() > 0)
            .filter_map(|n| {
                n.policy()
                    .map(|p| (n.id(), p.provider().get_state(n.id(), &view)))
            })
            .collect();

        for (id, state) in states {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            let Some(policy) = node.policy_mut() else {
                continue;
            };
            let action = policy.provider_mut().decide(tick, &state);
            policy.set_awaiting_post_state(true);
            let offload_class = policy.offload_class();
            node.history_mut().decisions += 1;

            let Some(head) = node.head_mut() else {
                continue;
            };
            head.request_reward(id);
            if action != Action::Offload {
                continue;
            }
            let destination = head.destination();
            let path = router::least_loaded_neighbor(&self.topology, id, offload_class)
                .and_then(|via| router::route_via(&self.topology, id, via, destination));
            match path {
                Some(path) => {
                    router::reroute(&self.topology, head, &path)?;
                    node.history_mut().offloads += 1;
                }
                None => trace!(node = %id, "no offload route; forwarding"),
            }
        }
        Ok(())
    }

    fn plan(&self, tick: TickId) -> Result<Vec<NodePlan>, InvariantViolation> {
        let ctx = PlanContext {
            tick,
            topology: &self.topology,
            seed: self.config.global.seed,
            max_destinations: self.config.global.max_destinations,
            max_route_attempts: self.config.global.max_route_attempts,
        };
        let mut plans = Vec::with_capacity(self.nodes.len());
        match self.config.global.iteration_order {
            IterationOrder::Forward => {
                for node in self.nodes.values() {
                    plans.push(node.plan(&ctx)?);
                }
            }
            IterationOrder::Reverse => {
                for node in self.nodes.values().rev() {
                    plans.push(node.plan(&ctx)?);
                }
            }
        }
        plans.sort_by_key(|p| p.node);
        Ok(plans)
    }

    fn post_tick(&mut self, tick: TickId) {
        let view = TickView::new(tick, &self.topology, &self.nodes);
        let states: Vec<(NodeId, StateVector)> = self
            .nodes
            .values()
            .filter_map(|n| {
                let p = n.policy()?;
                p.awaiting_post_state()
                    .then(|| (n.id(), p.provider().get_state(n.id(), &view)))
            })
            .collect();
        for (id, state) in states {
            if let Some(policy) = self.nodes.get_mut(&id).and_then(Node::policy_mut) {
                policy.provider_mut().on_post_tick(tick, &state);
                policy.set_awaiting_post_state(false);
            }
        }
    }

    fn dispatch_rewards(&mut self, resolved: &[Resolved]) {
        for (outcome, requesters) in resolved {
            for id in requesters {
                let Some(node) = self.nodes.get_mut(id) else {
                    continue;
                };
                let Some(policy) = node.policy_mut() else {
                    continue;
                };
                let reward = policy.provider_mut().on_resolved(outcome);
                node.history_mut().reward += reward;
                self.stats.total_reward += reward;
            }
        }
    }

    fn snapshot_at(&self, tick: TickId) -> TickSnapshot {
        TickSnapshot {
            tick,
            generated: self.stats.generated_count,
            arrived: self.stats.arrived_count,
            dropped: self.stats.dropped_count,
            in_flight: self.in_flight(),
            throughput: self.stats.throughput(),
            elapsed_seconds: self.elapsed_seconds,
            queue_lengths: self
                .nodes
                .values()
                .map(|n| (n.id(), n.queue_len()))
                .collect(),
        }
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// Last applied tick; zero before the first.
    pub fn current_tick(&self) -> TickId {
        self.current_tick
    }

    /// True after a failed tick.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Metrics from the most recent successful tick.
    pub fn last_metrics(&self) -> &StepMetrics {
        &self.last_metrics
    }

    /// Run-wide statistics.
    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// The current graph.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// The config this engine was built from.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Seconds per tick.
    pub fn step_value(&self) -> f64 {
        self.topology.step_value()
    }

    /// Simulated seconds elapsed.
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    /// A node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// All nodes, ascending by id.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values()
    }

    /// Packets buffered or staged anywhere.
    pub fn in_flight(&self) -> u64 {
        self.nodes
            .values()
            .map(|n| (n.queue_len() + n.staging_len()) as u64)
            .sum()
    }

    /// Aggregate state as of the last applied tick.
    pub fn snapshot(&self) -> TickSnapshot {
        self.snapshot_at(self.current_tick)
    }

    /// Per-node histories, ascending by id.
    pub fn node_reports(&self) -> Vec<NodeReport> {
        self.nodes
            .values()
            .map(|n| NodeReport {
                node: n.id(),
                history: n.history().clone(),
            })
            .collect()
    }
}

impl fmt::Debug for TickEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickEngine")
            .field("current_tick", &self.current_tick)
            .field("nodes", &self.nodes.len())
            .field("links", &self.topology.edge_count())
            .field("step_value", &self.topology.step_value())
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GlobalConfig, NodeClassConfig};
    use skymesh_core::{Role, VecSink};

    fn pair(rate: f64, bandwidth: f64) -> SimConfig {
        SimConfig::new(GlobalConfig {
            distance_threshold: Some(100.0),
            ..GlobalConfig::default()
        })
        .with_class(
            NodeClassConfig::new("ground", Role::Source, 1)
                .generating(rate)
                .links_to("sink")
                .bandwidth(bandwidth),
        )
        .with_class(NodeClassConfig::new("sink", Role::Destination, 1))
    }

    #[test]
    fn build_forms_initial_links() {
        let engine = TickEngine::new(pair(500.0, 500.0)).unwrap();
        assert_eq!(engine.topology().edge_count(), 1);
        assert_eq!(engine.step_value(), 1.0);
        assert_eq!(engine.current_tick(), TickId(0));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = pair(500.0, 500.0);
        config.global.link_refresh_period = 0;
        match TickEngine::new(config) {
            Err(ConfigError::InvalidRefreshPeriod) => {}
            other => panic!("expected InvalidRefreshPeriod, got {other:?}"),
        }
    }

    #[test]
    fn packet_crosses_single_link_in_one_tick() {
        let mut engine = TickEngine::new(pair(500.0, 500.0)).unwrap();
        let result = engine.execute_tick().unwrap();
        assert_eq!(result.tick, TickId(1));
        assert_eq!(result.metrics.generated, 1);
        assert_eq!(result.metrics.arrived, 1);
        assert_eq!(engine.stats().delivered_bytes, 500);
        assert_eq!(engine.in_flight(), 0);
    }

    #[test]
    fn sink_sees_every_tick_and_outcome() {
        let mut engine =
            TickEngine::with_sink(pair(1000.0, 500.0), Box::new(VecSink::default())).unwrap();
        for _ in 0..5 {
            engine.execute_tick().unwrap();
        }
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.tick, TickId(5));
        assert_eq!(
            snapshot.generated,
            snapshot.arrived + snapshot.dropped + snapshot.in_flight
        );
        // Two packets per second over a one-packet-per-tick link: a backlog builds.
        assert!(snapshot.in_flight > 0);
    }

    #[test]
    fn spawn_unknown_class_fails() {
        let mut engine = TickEngine::new(pair(500.0, 500.0)).unwrap();
        match engine.spawn_node("nope") {
            Err(ConfigError::NoSuchClass(name)) => assert_eq!(name, "nope"),
            other => panic!("expected NoSuchClass, got {other:?}"),
        }
    }

    #[test]
    fn spawned_node_links_at_next_refresh() {
        let mut config = pair(500.0, 500.0);
        config.global.link_refresh_period = 2;
        let mut engine = TickEngine::new(config).unwrap();
        let id = engine.spawn_node("ground").unwrap();
        assert_eq!(id, NodeId(2));
        assert!(engine.topology().neighbors(id).is_empty());
        engine.execute_tick().unwrap();
        assert!(engine.topology().neighbors(id).is_empty());
        engine.execute_tick().unwrap();
        assert_eq!(engine.topology().neighbors(id), &[NodeId(1)]);
    }

    #[test]
    fn reset_starts_over() {
        let mut engine = TickEngine::new(pair(500.0, 500.0)).unwrap();
        for _ in 0..3 {
            engine.execute_tick().unwrap();
        }
        engine.reset(99).unwrap();
        assert_eq!(engine.current_tick(), TickId(0));
        assert_eq!(engine.stats().generated_count, 0);
        assert_eq!(engine.config().global.seed, 99);
    }

    #[test]
    fn tick_error_display_names_tick() {
        let err = TickError::at(TickId(4), TickErrorKind::Halted);
        assert_eq!(err.to_string(), "tick 4: engine halted after a failed tick");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn engine_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<TickEngine>();
    }
}
