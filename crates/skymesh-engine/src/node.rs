//! Simulated nodes and their per-tick behavior.
//!
//! A [`Node`] is a role plus a set of optional capabilities:
//!
//! | Capability | Present on |
//! |------------|------------|
//! | [`Generation`] | sources |
//! | [`RelayScheduling`] | every node (destinations never use it) |
//! | [`BufferLimit`] | classes with a `buffer_size` |
//! | [`Mobility`] | classes with a mobility key |
//! | [`DecisionPolicy`] | relay classes with a policy |
//!
//! Each tick a node first computes a [`NodePlan`] against the pre-tick
//! state ([`Node::plan`] takes `&self`); the engine then applies the plans
//! in node-id order. Packets handed to a node land in its staging area
//! and only become visible in the buffer after
//! [`update_queue`](Node::update_queue).

use std::collections::VecDeque;

use indexmap::IndexMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use smallvec::SmallVec;
use thiserror::Error;

use skymesh_core::{
    ClassId, DecisionProvider, DropReason, InvariantViolation, MobilityContext, MobilityProvider,
    NodeId, Packet, PacketId, PacketOutcome, PathError, Position, Role, Route, TickId,
};
use skymesh_topology::{router, Topology};

/// A packet that just reached a terminal status, with the nodes owed a
/// reward for it.
pub type Resolved = (PacketOutcome, SmallVec<[NodeId; 2]>);

/// Failure while a node applies its plan.
#[derive(Debug, Error, PartialEq)]
pub enum NodeError {
    /// A packet lifecycle rule was broken.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    /// A planned route could not become a packet.
    #[error(transparent)]
    Path(#[from] PathError),
}

// ── Capabilities ───────────────────────────────────────────────────

/// Fractional-rate packet generation.
///
/// Once per simulated second (every `1 / step_value` ticks) the credit
/// grows by `rate / packet_size`; whole credits become packets and the
/// remainder carries over.
#[derive(Clone, Debug)]
pub struct Generation {
    rate: f64,
    packet_size: u64,
    credit: f64,
    next_gen_tick: f64,
    destinations: Vec<NodeId>,
}

impl Generation {
    /// Generator of `rate` bytes/second in `packet_size`-byte packets.
    pub fn new(rate: f64, packet_size: u64) -> Self {
        Self {
            rate,
            packet_size,
            credit: 0.0,
            next_gen_tick: 0.0,
            destinations: Vec::new(),
        }
    }

    /// Begin counting generation instants from `tick` instead of zero.
    pub fn starting_at(mut self, tick: TickId) -> Self {
        self.next_gen_tick = tick.as_f64();
        self
    }

    /// Bytes per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Bytes per packet.
    pub fn packet_size(&self) -> u64 {
        self.packet_size
    }

    /// Fractional packets carried to the next generation instant.
    pub fn credit(&self) -> f64 {
        self.credit
    }

    /// Destinations discovered so far.
    pub fn destinations(&self) -> &[NodeId] {
        &self.destinations
    }
}

/// When a node may next send to a given neighbor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NeighborSchedule {
    /// First tick at which the next packet may cross the link.
    pub next_ok_tick: f64,
    /// Ticks the link needs per packet: `tick_value / step_value`.
    pub ticks_per_packet: f64,
}

/// Per-neighbor send cadence, rebuilt lazily after topology changes.
#[derive(Clone, Debug, Default)]
pub struct RelayScheduling {
    neighbors: IndexMap<NodeId, NeighborSchedule>,
    valid: bool,
}

impl RelayScheduling {
    /// Mark stale; rebuilt before the node next acts.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// True if the schedule reflects the current topology.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Rebuild from `node`'s current links. Every neighbor may send
    /// from `tick` onward.
    pub fn rebuild(&mut self, node: NodeId, topology: &Topology, tick: TickId) {
        let step = topology.step_value();
        self.neighbors.clear();
        for &n in topology.neighbors(node) {
            if let Some(edge) = topology.edge(node, n) {
                self.neighbors.insert(
                    n,
                    NeighborSchedule {
                        next_ok_tick: tick.as_f64(),
                        ticks_per_packet: edge.tick_value() / step,
                    },
                );
            }
        }
        self.valid = true;
    }

    /// Schedule for `neighbor`, if it is still linked.
    pub fn get(&self, neighbor: NodeId) -> Option<&NeighborSchedule> {
        self.neighbors.get(&neighbor)
    }

    /// Scheduled neighbors.
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    /// True if no neighbor is scheduled.
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

/// Byte capacity of the buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferLimit {
    /// Maximum buffered bytes.
    pub max_bytes: u64,
}

/// Moves the node once per tick.
pub struct Mobility {
    provider: Box<dyn MobilityProvider>,
}

impl Mobility {
    /// Wrap a provider.
    pub fn new(provider: Box<dyn MobilityProvider>) -> Self {
        Self { provider }
    }
}

/// Per-packet forwarding decisions.
pub struct DecisionPolicy {
    provider: Box<dyn DecisionProvider>,
    offload_class: ClassId,
    awaiting_post_state: bool,
}

impl DecisionPolicy {
    /// Wrap a provider that offloads to members of `offload_class`.
    pub fn new(provider: Box<dyn DecisionProvider>, offload_class: ClassId) -> Self {
        Self {
            provider,
            offload_class,
            awaiting_post_state: false,
        }
    }

    /// Class of offload targets.
    pub fn offload_class(&self) -> ClassId {
        self.offload_class
    }

    pub(crate) fn provider(&self) -> &dyn DecisionProvider {
        &*self.provider
    }

    pub(crate) fn provider_mut(&mut self) -> &mut dyn DecisionProvider {
        &mut *self.provider
    }

    pub(crate) fn set_awaiting_post_state(&mut self, awaiting: bool) {
        self.awaiting_post_state = awaiting;
    }

    pub(crate) fn awaiting_post_state(&self) -> bool {
        self.awaiting_post_state
    }
}

// ── NodeHistory ────────────────────────────────────────────────────

/// Per-node time series and counters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeHistory {
    /// Buffer length after every tick.
    pub queue_lengths: Vec<usize>,
    /// Positions after every tick. Mobile nodes only.
    pub positions: Vec<Position>,
    /// Packets created here.
    pub generated: u64,
    /// Generations abandoned for lack of a route.
    pub skipped: u64,
    /// Packets sent to a neighbor.
    pub forwarded: u64,
    /// Packets received from a neighbor.
    pub received: u64,
    /// Packets dropped here, for any reason.
    pub dropped: u64,
    /// Decisions taken by this node's policy.
    pub decisions: u64,
    /// Decisions that rerouted a packet.
    pub offloads: u64,
    /// Sum of rewards returned by this node's policy.
    pub reward: f64,
}

// ── NodePlan ───────────────────────────────────────────────────────

/// A packet position in a node's outgoing view of the tick: the existing
/// buffer followed by the packets generated this tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    /// Index into the pre-tick buffer.
    Buffered(usize),
    /// Index into [`NodePlan::generated`].
    Fresh(usize),
}

/// A packet planned for creation.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedPacket {
    /// Full route, source first.
    pub path: Route,
    /// False if it does not fit in the source's buffer and is dropped at birth.
    pub admitted: bool,
}

/// Everything a node will do this tick, computed without mutation.
#[derive(Clone, Debug, PartialEq)]
pub struct NodePlan {
    /// The acting node.
    pub node: NodeId,
    /// New packets, in creation order.
    pub generated: Vec<PlannedPacket>,
    /// Generations abandoned for lack of a route.
    pub skipped: u64,
    /// Credit and next instant after generation.
    pub generation_state: Option<(f64, f64)>,
    /// Newly discovered destination list, if the cache was empty.
    pub destinations: Option<Vec<NodeId>>,
    /// Packets to send, with their receiver.
    pub forwards: Vec<(Slot, NodeId)>,
    /// Packets whose next hop is no longer linked.
    pub lost: Vec<Slot>,
    /// New `next_ok_tick` per neighbor used.
    pub schedule_updates: Vec<(NodeId, f64)>,
}

impl NodePlan {
    fn idle(node: NodeId) -> Self {
        Self {
            node,
            generated: Vec::new(),
            skipped: 0,
            generation_state: None,
            destinations: None,
            forwards: Vec::new(),
            lost: Vec::new(),
            schedule_updates: Vec::new(),
        }
    }
}

/// Read-only parameters for planning.
#[derive(Clone, Copy, Debug)]
pub struct PlanContext<'a> {
    /// Tick being planned.
    pub tick: TickId,
    /// Pre-tick graph.
    pub topology: &'a Topology,
    /// Simulation seed.
    pub seed: u64,
    /// Cap on the destination list.
    pub max_destinations: usize,
    /// Destination draws per generation.
    pub max_route_attempts: u32,
}

/// Result of applying a plan's sends to the sender.
pub(crate) struct Outgoing {
    pub(crate) created: u64,
    pub(crate) skipped: u64,
    pub(crate) sends: Vec<(NodeId, Packet)>,
    pub(crate) resolved: Vec<Resolved>,
}

// ── Node ───────────────────────────────────────────────────────────

/// One simulated device.
pub struct Node {
    id: NodeId,
    class: ClassId,
    role: Role,
    position: Position,
    buffer: VecDeque<Packet>,
    buffered_bytes: u64,
    staging: Vec<(NodeId, Packet)>,
    generation: Option<Generation>,
    schedule: RelayScheduling,
    buffer_limit: Option<BufferLimit>,
    mobility: Option<Mobility>,
    policy: Option<DecisionPolicy>,
    history: NodeHistory,
}

impl Node {
    /// A node with no optional capabilities.
    pub fn new(id: NodeId, class: ClassId, role: Role, position: Position) -> Self {
        Self {
            id,
            class,
            role,
            position,
            buffer: VecDeque::new(),
            buffered_bytes: 0,
            staging: Vec::new(),
            generation: None,
            schedule: RelayScheduling::default(),
            buffer_limit: None,
            mobility: None,
            policy: None,
            history: NodeHistory::default(),
        }
    }

    /// Attach a generator. Ignored unless the node is a source.
    pub fn with_generation(mut self, generation: Generation) -> Self {
        if self.role == Role::Source {
            self.generation = Some(generation);
        }
        self
    }

    /// Bound the buffer.
    pub fn with_buffer_limit(mut self, limit: BufferLimit) -> Self {
        self.buffer_limit = Some(limit);
        self
    }

    /// Attach a mobility provider.
    pub fn with_mobility(mut self, mobility: Mobility) -> Self {
        self.mobility = Some(mobility);
        self
    }

    /// Attach a forwarding policy.
    pub fn with_policy(mut self, policy: DecisionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// Id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Class.
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current position.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Buffered packets, head first.
    pub fn buffer(&self) -> impl Iterator<Item = &Packet> + '_ {
        self.buffer.iter()
    }

    /// Buffered packet count.
    pub fn queue_len(&self) -> usize {
        self.buffer.len()
    }

    /// Buffered bytes.
    pub fn buffered_bytes(&self) -> u64 {
        self.buffered_bytes
    }

    /// Packets received this tick and not yet flushed.
    pub fn staging_len(&self) -> usize {
        self.staging.len()
    }

    /// Capacity, if bounded.
    pub fn buffer_limit(&self) -> Option<BufferLimit> {
        self.buffer_limit
    }

    /// Generator, if a source.
    pub fn generation(&self) -> Option<&Generation> {
        self.generation.as_ref()
    }

    /// Send cadence.
    pub fn schedule(&self) -> &RelayScheduling {
        &self.schedule
    }

    /// Forwarding policy, if any.
    pub fn policy(&self) -> Option<&DecisionPolicy> {
        self.policy.as_ref()
    }

    pub(crate) fn policy_mut(&mut self) -> Option<&mut DecisionPolicy> {
        self.policy.as_mut()
    }

    /// Counters and time series.
    pub fn history(&self) -> &NodeHistory {
        &self.history
    }

    pub(crate) fn history_mut(&mut self) -> &mut NodeHistory {
        &mut self.history
    }

    /// True if `bytes` more would still fit in the buffer.
    fn fits(&self, current: u64, bytes: u64) -> bool {
        self.buffer_limit
            .is_none_or(|l| current.saturating_add(bytes) <= l.max_bytes)
    }

    pub(crate) fn head_mut(&mut self) -> Option<&mut Packet> {
        self.buffer.front_mut()
    }

    pub(crate) fn invalidate_schedule(&mut self) {
        self.schedule.invalidate();
    }

    pub(crate) fn prepare(&mut self, topology: &Topology, tick: TickId) {
        if !self.schedule.is_valid() {
            self.schedule.rebuild(self.id, topology, tick);
        }
    }

    // ── Plan ───────────────────────────────────────────────────────

    /// Compute this tick's actions against the pre-tick state.
    ///
    /// Sources generate, then forward at most one packet. Relays forward
    /// any number of packets, at most one per neighbor, each subject to
    /// that neighbor's cadence. Destinations do nothing. Buffered packets
    /// are scanned head first.
    pub fn plan(&self, ctx: &PlanContext<'_>) -> Result<NodePlan, InvariantViolation> {
        let mut plan = NodePlan::idle(self.id);
        if self.role == Role::Destination {
            return Ok(plan);
        }
        if let Some(generation) = &self.generation {
            self.plan_generation(generation, ctx, &mut plan)?;
        }
        self.plan_forwarding(ctx, &mut plan);
        Ok(plan)
    }

    fn plan_generation(
        &self,
        generation: &Generation,
        ctx: &PlanContext<'_>,
        plan: &mut NodePlan,
    ) -> Result<(), InvariantViolation> {
        let tick = ctx.tick.as_f64();
        let interval = 1.0 / ctx.topology.step_value();
        let mut credit = generation.credit;
        let mut next = generation.next_gen_tick;
        while tick > next {
            credit += generation.rate / generation.packet_size as f64;
            next += interval;
        }
        if credit < 0.0 || !credit.is_finite() {
            return Err(InvariantViolation::NegativeCredit {
                node: self.id,
                credit: credit.to_string(),
            });
        }
        let whole = credit.floor();
        plan.generation_state = Some((credit - whole, next));
        if whole < 1.0 {
            return Ok(());
        }

        let destinations: Vec<NodeId> = if generation.destinations.is_empty() {
            let found: Vec<NodeId> = ctx
                .topology
                .destinations()
                .filter(|d| *d != self.id)
                .take(ctx.max_destinations)
                .collect();
            if !found.is_empty() {
                plan.destinations = Some(found.clone());
            }
            found
        } else {
            generation.destinations.clone()
        };

        let mut rng = ChaCha8Rng::seed_from_u64(ctx.seed ^ (u64::from(self.id.0) << 32) ^ ctx.tick.0);
        let mut bytes = self.buffered_bytes;
        for _ in 0..whole as u64 {
            let path = router::plan_packet(
                ctx.topology,
                &mut rng,
                self.id,
                &destinations,
                None,
                ctx.max_route_attempts,
            );
            match path {
                Some(path) => {
                    let admitted = self.fits(bytes, generation.packet_size);
                    if admitted {
                        bytes += generation.packet_size;
                    }
                    plan.generated.push(PlannedPacket { path, admitted });
                }
                None => plan.skipped += 1,
            }
        }
        Ok(())
    }

    fn plan_forwarding(&self, ctx: &PlanContext<'_>, plan: &mut NodePlan) {
        let budget = match self.role {
            Role::Source => 1,
            Role::Relay => usize::MAX,
            Role::Destination => 0,
        };
        let tick = ctx.tick.as_f64();
        let mut served: SmallVec<[(NodeId, f64); 8]> = SmallVec::new();

        let buffered = self
            .buffer
            .iter()
            .enumerate()
            .map(|(i, p)| (Slot::Buffered(i), p.next_hop()));
        let fresh = plan
            .generated
            .iter()
            .enumerate()
            .filter(|(_, g)| g.admitted)
            .map(|(i, g)| (Slot::Fresh(i), g.path.get(1).copied()));
        let queue: Vec<(Slot, Option<NodeId>)> = buffered.chain(fresh).collect();

        for (slot, next_hop) in queue {
            if plan.forwards.len() >= budget {
                break;
            }
            let Some(next_hop) = next_hop else {
                continue;
            };
            let Some(schedule) = self.schedule.get(next_hop) else {
                plan.lost.push(slot);
                continue;
            };
            if served.iter().any(|(n, _)| *n == next_hop) {
                continue;
            }
            if tick >= schedule.next_ok_tick {
                let next_ok = schedule.next_ok_tick.max(tick) + schedule.ticks_per_packet;
                served.push((next_hop, next_ok));
                plan.forwards.push((slot, next_hop));
            }
        }
        plan.schedule_updates = served.into_vec();
    }

    // ── Apply ──────────────────────────────────────────────────────

    /// Apply the sender side of `plan`: create packets, drop lost ones,
    /// pull sends out of the buffer and advance cadences.
    pub(crate) fn apply_plan(&mut self, plan: NodePlan, tick: TickId) -> Result<Outgoing, NodeError> {
        self.history.skipped += plan.skipped;
        let mut out = Outgoing {
            created: 0,
            skipped: plan.skipped,
            sends: Vec::new(),
            resolved: Vec::new(),
        };

        if let Some(generation) = self.generation.as_mut() {
            if let Some((credit, next)) = plan.generation_state {
                generation.credit = credit;
                generation.next_gen_tick = next;
            }
            if let Some(found) = plan.destinations {
                generation.destinations = found;
            }
        }
        let packet_size = self
            .generation
            .as_ref()
            .map(Generation::packet_size)
            .unwrap_or_default();

        // Fresh slots index into `plan.generated`, admitted or not.
        let mut fresh: Vec<Option<Packet>> = Vec::with_capacity(plan.generated.len());
        for planned in &plan.generated {
            let mut packet = Packet::new(PacketId::next(), &planned.path, packet_size, tick)?;
            out.created += 1;
            self.history.generated += 1;
            if planned.admitted {
                fresh.push(Some(packet));
            } else {
                packet.mark_dropped(tick, DropReason::SourceBufferFull)?;
                self.history.dropped += 1;
                tracing::debug!(node = %self.id, packet = %packet.id(), "source buffer full");
                out.resolved.extend(resolved_entry(&packet));
                fresh.push(None);
            }
        }
        let mut buffered: Vec<Option<Packet>> = self.buffer.drain(..).map(Some).collect();

        let mut take = |slot: Slot| -> Option<Packet> {
            match slot {
                Slot::Buffered(i) => buffered.get_mut(i).and_then(Option::take),
                Slot::Fresh(i) => fresh.get_mut(i).and_then(Option::take),
            }
        };

        for slot in plan.lost {
            if let Some(mut packet) = take(slot) {
                packet.mark_dropped(tick, DropReason::LinkLost)?;
                self.history.dropped += 1;
                tracing::debug!(node = %self.id, packet = %packet.id(), "next hop lost");
                out.resolved.extend(resolved_entry(&packet));
            }
        }
        for (slot, to) in plan.forwards {
            if let Some(packet) = take(slot) {
                self.history.forwarded += 1;
                out.sends.push((to, packet));
            }
        }

        self.buffer = buffered
            .into_iter()
            .chain(fresh)
            .flatten()
            .collect();
        self.buffered_bytes = self.buffer.iter().map(Packet::size).sum();

        for (neighbor, next_ok) in plan.schedule_updates {
            if let Some(s) = self.schedule.neighbors.get_mut(&neighbor) {
                s.next_ok_tick = next_ok;
            }
        }
        Ok(out)
    }

    /// Accept a packet from `from`.
    ///
    /// The packet must name this node as its next hop. Returns the
    /// packet's outcome if it arrived here; otherwise it is staged.
    pub fn receive(
        &mut self,
        mut packet: Packet,
        from: NodeId,
        tick: TickId,
    ) -> Result<Option<Resolved>, InvariantViolation> {
        let arrived = packet.advance_hop(self.id, tick)?;
        self.history.received += 1;
        if arrived {
            return Ok(resolved_entry(&packet));
        }
        self.staging.push((from, packet));
        Ok(None)
    }

    /// Flush staging into the buffer.
    ///
    /// Staged packets are ordered by sender id, then packet id. They are
    /// admitted in that order while they fit; the first one that does not
    /// fit and every one after it are dropped.
    pub fn update_queue(&mut self, tick: TickId) -> Result<Vec<Resolved>, InvariantViolation> {
        let mut staged = std::mem::take(&mut self.staging);
        staged.sort_by_key(|(from, p)| (*from, p.id()));

        let mut dropped = Vec::new();
        let mut overflowing = false;
        for (_, mut packet) in staged {
            if !overflowing && self.fits(self.buffered_bytes, packet.size()) {
                self.buffered_bytes += packet.size();
                self.buffer.push_back(packet);
                continue;
            }
            overflowing = true;
            packet.mark_dropped(tick, DropReason::BufferOverflow)?;
            self.history.dropped += 1;
            tracing::debug!(node = %self.id, packet = %packet.id(), "buffer overflow");
            dropped.extend(resolved_entry(&packet));
        }
        Ok(dropped)
    }

    /// Advance the mobility provider by one tick.
    pub(crate) fn step_mobility(&mut self, tick: TickId, step_value: f64) -> Option<Position> {
        let mobility = self.mobility.as_mut()?;
        let ctx = MobilityContext {
            node: self.id,
            elapsed_ticks: tick.0,
            step_value,
        };
        self.position = mobility.provider.next_position(&ctx, self.position);
        Some(self.position)
    }

    /// Append this tick's queue length (and position, if mobile).
    pub(crate) fn record_history(&mut self) {
        self.history.queue_lengths.push(self.buffer.len());
        if self.mobility.is_some() {
            self.history.positions.push(self.position);
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("class", &self.class)
            .field("role", &self.role)
            .field("position", &self.position)
            .field("queue_len", &self.buffer.len())
            .field("buffered_bytes", &self.buffered_bytes)
            .field("staging", &self.staging.len())
            .field("mobile", &self.mobility.is_some())
            .field("policy", &self.policy.is_some())
            .finish()
    }
}

/// Outcome of a resolved `packet` with the nodes awaiting its reward.
pub(crate) fn resolved_entry(packet: &Packet) -> Option<Resolved> {
    packet
        .outcome()
        .map(|o| (o, packet.reward_requests().iter().copied().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use skymesh_core::PacketStatus;

    fn line(n: u32, bandwidth: f64) -> Topology {
        let mut t = Topology::new(500, 500.0 / bandwidth).unwrap();
        for i in 0..n {
            let role = if i + 1 == n {
                Role::Destination
            } else if i == 0 {
                Role::Source
            } else {
                Role::Relay
            };
            t.add_node(NodeId(i), ClassId(i), role, Position::default())
                .unwrap();
        }
        for i in 1..n {
            t.insert_edge(NodeId(i - 1), NodeId(i), bandwidth).unwrap();
        }
        t.recompute_step_value();
        t
    }

    fn ctx(t: &Topology, tick: u64) -> PlanContext<'_> {
        PlanContext {
            tick: TickId(tick),
            topology: t,
            seed: 7,
            max_destinations: 6,
            max_route_attempts: 20,
        }
    }

    fn packet_via(path: &[u32]) -> Packet {
        let path: Vec<NodeId> = path.iter().map(|&i| NodeId(i)).collect();
        Packet::new(PacketId::next(), &path, 500, TickId(0)).unwrap()
    }

    fn source(t: &Topology, rate: f64) -> Node {
        let mut n = Node::new(NodeId(0), ClassId(0), Role::Source, Position::default())
            .with_generation(Generation::new(rate, 500));
        n.prepare(t, TickId(1));
        n
    }

    #[test]
    fn source_generates_one_packet_per_second_and_forwards_it() {
        let t = line(2, 500.0);
        let node = source(&t, 500.0);
        let plan = node.plan(&ctx(&t, 1)).unwrap();
        assert_eq!(plan.generated.len(), 1);
        assert!(plan.generated[0].admitted);
        assert_eq!(plan.forwards, vec![(Slot::Fresh(0), NodeId(1))]);
        assert_eq!(plan.generation_state, Some((0.0, 1.0)));
    }

    #[test]
    fn fractional_credit_carries_over() {
        let t = line(2, 500.0);
        let mut node = source(&t, 250.0);
        let p1 = node.plan(&ctx(&t, 1)).unwrap();
        assert!(p1.generated.is_empty());
        node.apply_plan(p1, TickId(1)).unwrap();
        assert_eq!(node.generation().unwrap().credit(), 0.5);
        let p2 = node.plan(&ctx(&t, 2)).unwrap();
        assert_eq!(p2.generated.len(), 1);
    }

    #[test]
    fn source_sends_at_most_one_per_tick() {
        let t = line(2, 500.0);
        let mut node = source(&t, 1500.0);
        let plan = node.plan(&ctx(&t, 1)).unwrap();
        assert_eq!(plan.generated.len(), 3);
        assert_eq!(plan.forwards.len(), 1);
        let out = node.apply_plan(plan, TickId(1)).unwrap();
        assert_eq!(out.created, 3);
        assert_eq!(out.sends.len(), 1);
        assert_eq!(node.queue_len(), 2);
    }

    #[test]
    fn full_source_buffer_drops_at_birth() {
        let t = line(2, 500.0);
        let mut node = Node::new(NodeId(0), ClassId(0), Role::Source, Position::default())
            .with_generation(Generation::new(1500.0, 500))
            .with_buffer_limit(BufferLimit { max_bytes: 1000 });
        node.prepare(&t, TickId(1));
        let plan = node.plan(&ctx(&t, 1)).unwrap();
        let admitted: Vec<bool> = plan.generated.iter().map(|g| g.admitted).collect();
        assert_eq!(admitted, vec![true, true, false]);
        let out = node.apply_plan(plan, TickId(1)).unwrap();
        assert_eq!(out.resolved.len(), 1);
        assert_eq!(out.resolved[0].0.drop_reason, Some(DropReason::SourceBufferFull));
        assert!(node.buffered_bytes() <= 1000);
    }

    #[test]
    fn relay_respects_cadence() {
        // Link at half the global rate: two ticks per packet.
        let mut t = line(3, 500.0);
        t.insert_edge(NodeId(0), NodeId(2), 1000.0).unwrap();
        t.recompute_step_value();
        let mut relay = Node::new(NodeId(1), ClassId(1), Role::Relay, Position::default());
        relay.prepare(&t, TickId(1));
        for _ in 0..3 {
            relay
                .receive(packet_via(&[0, 1, 2]), NodeId(0), TickId(1))
                .unwrap();
        }
        relay.update_queue(TickId(1)).unwrap();

        let mut sent = Vec::new();
        for tick in 2..=6 {
            let plan = relay.plan(&ctx(&t, tick)).unwrap();
            let out = relay.apply_plan(plan, TickId(tick)).unwrap();
            sent.push(out.sends.len());
        }
        // First send at tick 2, then every other tick.
        assert_eq!(sent, vec![1, 0, 1, 0, 1]);
    }

    #[test]
    fn relay_serves_neighbors_independently() {
        let mut t = line(2, 500.0);
        t.add_node(NodeId(2), ClassId(2), Role::Destination, Position::default())
            .unwrap();
        t.add_node(NodeId(3), ClassId(3), Role::Relay, Position::default())
            .unwrap();
        t.insert_edge(NodeId(3), NodeId(1), 500.0).unwrap();
        t.insert_edge(NodeId(3), NodeId(2), 500.0).unwrap();
        let mut relay = Node::new(NodeId(3), ClassId(3), Role::Relay, Position::default());
        relay.prepare(&t, TickId(1));
        relay.receive(packet_via(&[0, 3, 1]), NodeId(0), TickId(1)).unwrap();
        relay.receive(packet_via(&[0, 3, 1]), NodeId(0), TickId(1)).unwrap();
        relay.receive(packet_via(&[0, 3, 2]), NodeId(0), TickId(1)).unwrap();
        relay.update_queue(TickId(1)).unwrap();

        let plan = relay.plan(&ctx(&t, 2)).unwrap();
        let targets: Vec<NodeId> = plan.forwards.iter().map(|(_, to)| *to).collect();
        assert_eq!(targets, vec![NodeId(1), NodeId(2)]);
        assert_eq!(plan.forwards[1].0, Slot::Buffered(2));
    }

    #[test]
    fn missing_schedule_entry_drops_packet() {
        let t = line(3, 500.0);
        let mut relay = Node::new(NodeId(1), ClassId(1), Role::Relay, Position::default());
        relay.prepare(&t, TickId(1));
        relay.receive(packet_via(&[0, 1, 9]), NodeId(0), TickId(1)).unwrap();
        relay.update_queue(TickId(1)).unwrap();
        let plan = relay.plan(&ctx(&t, 2)).unwrap();
        assert_eq!(plan.lost, vec![Slot::Buffered(0)]);
        let out = relay.apply_plan(plan, TickId(2)).unwrap();
        assert_eq!(out.resolved[0].0.drop_reason, Some(DropReason::LinkLost));
        assert_eq!(relay.queue_len(), 0);
    }

    #[test]
    fn dropped_packet_keeps_reward_requesters() {
        let mut p = packet_via(&[0, 1, 2]);
        p.request_reward(NodeId(1));
        assert!(resolved_entry(&p).is_none());
        p.mark_dropped(TickId(4), DropReason::LinkLost).unwrap();
        let (outcome, requesters) = resolved_entry(&p).unwrap();
        assert_eq!(outcome.status, PacketStatus::Dropped);
        assert_eq!(requesters.as_slice(), &[NodeId(1)]);
    }

    #[test]
    fn receive_rejects_wrong_hop() {
        let mut n = Node::new(NodeId(5), ClassId(0), Role::Relay, Position::default());
        match n.receive(packet_via(&[0, 1, 2]), NodeId(0), TickId(1)) {
            Err(InvariantViolation::HopMismatch { .. }) => {}
            other => panic!("expected HopMismatch, got {other:?}"),
        }
        assert_eq!(n.staging_len(), 0);
    }

    #[test]
    fn arrival_bypasses_buffer() {
        let mut dest = Node::new(NodeId(1), ClassId(0), Role::Destination, Position::default());
        let arrived = dest
            .receive(packet_via(&[0, 1]), NodeId(0), TickId(3))
            .unwrap()
            .unwrap();
        assert_eq!(arrived.0.status, PacketStatus::Arrived);
        assert_eq!(dest.staging_len(), 0);
        assert_eq!(dest.queue_len(), 0);
    }

    #[test]
    fn update_queue_drops_overflow_tail_in_order() {
        let mut n = Node::new(NodeId(1), ClassId(0), Role::Relay, Position::default())
            .with_buffer_limit(BufferLimit { max_bytes: 1000 });
        // Staged from two senders; sender 0 is flushed first.
        let a = packet_via(&[2, 1, 3]);
        let b = packet_via(&[0, 1, 3]);
        let c = packet_via(&[0, 1, 3]);
        let a_id = a.id();
        n.receive(a, NodeId(2), TickId(1)).unwrap();
        n.receive(b, NodeId(0), TickId(1)).unwrap();
        n.receive(c, NodeId(0), TickId(1)).unwrap();
        let dropped = n.update_queue(TickId(1)).unwrap();
        assert_eq!(n.queue_len(), 2);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].0.packet, a_id);
        assert_eq!(n.buffered_bytes(), 1000);
        assert_eq!(n.staging_len(), 0);
    }

    #[test]
    fn zero_buffer_drops_everything() {
        let mut n = Node::new(NodeId(1), ClassId(0), Role::Relay, Position::default())
            .with_buffer_limit(BufferLimit { max_bytes: 0 });
        n.receive(packet_via(&[0, 1, 2]), NodeId(0), TickId(1)).unwrap();
        assert_eq!(n.update_queue(TickId(1)).unwrap().len(), 1);
        assert_eq!(n.queue_len(), 0);
    }

    #[test]
    fn destination_never_plans() {
        let t = line(2, 500.0);
        let dest = Node::new(NodeId(1), ClassId(1), Role::Destination, Position::default())
            .with_generation(Generation::new(500.0, 500));
        assert!(dest.generation().is_none());
        let plan = dest.plan(&ctx(&t, 1)).unwrap();
        assert!(plan.generated.is_empty() && plan.forwards.is_empty());
    }
}
