//! Per-packet forwarding decisions for policy-driven relays.
//!
//! A relay with a [`DecisionProvider`] offers the head of its buffer to the
//! provider each tick. The engine drives the provider through a fixed
//! cycle:
//!
//! 1. [`get_state`](DecisionProvider::get_state) against the pre-tick
//!    network (read-only),
//! 2. [`decide`](DecisionProvider::decide), serially in node-id order,
//! 3. [`on_post_tick`](DecisionProvider::on_post_tick) with the state
//!    after the tick was applied,
//! 4. [`on_resolved`](DecisionProvider::on_resolved) once for every
//!    packet it acted on, when that packet arrives or is dropped.
//!
//! The engine never interprets the state vector; a learning provider is
//! free to feed it to whatever model it owns.

use crate::id::{NodeId, TickId};
use crate::packet::PacketOutcome;
use crate::position::Position;

/// Default state width parameter: a provider sees up to
/// `DEFAULT_MAX_NEIGHBORS^2` queue lengths.
pub const DEFAULT_MAX_NEIGHBORS: usize = 5;

/// What a policy relay does with its head packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    /// Follow the packet's current route.
    Forward,
    /// Reroute through a neighbor of the configured offload class.
    Offload,
}

/// Read-only view of the network as of the start of the tick.
pub trait NetworkView {
    /// Tick being executed.
    fn tick(&self) -> TickId;
    /// Neighbors of `node`, ascending by id. Empty for unknown nodes.
    fn neighbors(&self, node: NodeId) -> &[NodeId];
    /// Packets buffered at `node`.
    fn queue_len(&self, node: NodeId) -> usize;
    /// Load of the edge between `a` and `b`, if they are linked.
    fn edge_load(&self, a: NodeId, b: NodeId) -> Option<u64>;
    /// Position of `node`, if it exists.
    fn position(&self, node: NodeId) -> Option<Position>;
}

/// Observation handed to a decision provider.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateVector(pub Vec<f64>);

impl StateVector {
    /// Queue lengths of neighbors and neighbors-of-neighbors.
    ///
    /// The vector has `max_neighbors^2` slots. For each neighbor in id
    /// order the neighbor's own queue length is written, followed by the
    /// queue lengths of its neighbors. Slots past the last observed node
    /// stay zero; nodes beyond the width are not observed.
    pub fn neighborhood_queues(view: &dyn NetworkView, node: NodeId, max_neighbors: usize) -> Self {
        let width = max_neighbors * max_neighbors;
        let mut state = vec![0.0; width];
        let mut index = 0;
        for &neighbor in view.neighbors(node) {
            if index >= width {
                break;
            }
            state[index] = view.queue_len(neighbor) as f64;
            for &second in view.neighbors(neighbor) {
                if index + 1 >= width {
                    break;
                }
                index += 1;
                state[index] = view.queue_len(second) as f64;
            }
            index += 1;
        }
        Self(state)
    }

    /// The raw values.
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no slots.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A forwarding policy for one relay node.
///
/// Providers are owned by their node and are `Send` so the whole
/// simulation can move between threads.
pub trait DecisionProvider: Send {
    /// Observe the network from `node`'s point of view.
    fn get_state(&self, node: NodeId, view: &dyn NetworkView) -> StateVector {
        StateVector::neighborhood_queues(view, node, DEFAULT_MAX_NEIGHBORS)
    }

    /// Choose an action for the head packet.
    fn decide(&mut self, tick: TickId, state: &StateVector) -> Action;

    /// State observed after the tick that followed a decision.
    fn on_post_tick(&mut self, _tick: TickId, _state: &StateVector) {}

    /// A packet this provider acted on has resolved. Returns the reward
    /// credited to the node.
    fn on_resolved(&mut self, outcome: &PacketOutcome) -> f64 {
        outcome.default_reward()
    }
}

/// Always follows the current route.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysForward;

impl DecisionProvider for AlwaysForward {
    fn decide(&mut self, _tick: TickId, _state: &StateVector) -> Action {
        Action::Forward
    }
}

/// Offloads when the observed neighborhood is congested.
///
/// Congestion is the mean of the state vector's non-zero slots.
#[derive(Clone, Copy, Debug)]
pub struct QueueThreshold {
    /// Mean queue length at or above which packets are offloaded.
    pub threshold: f64,
}

impl DecisionProvider for QueueThreshold {
    fn decide(&mut self, _tick: TickId, state: &StateVector) -> Action {
        let (sum, n) = state
            .as_slice()
            .iter()
            .filter(|v| **v > 0.0)
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        if n > 0 && sum / n as f64 >= self.threshold {
            Action::Offload
        } else {
            Action::Forward
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Star {
        // 0 is linked to 1 and 2; 1 is linked to 0 and 3.
        adjacency: Vec<Vec<NodeId>>,
        queues: Vec<usize>,
    }

    impl NetworkView for Star {
        fn tick(&self) -> TickId {
            TickId(1)
        }
        fn neighbors(&self, node: NodeId) -> &[NodeId] {
            self.adjacency
                .get(node.0 as usize)
                .map(|v| v.as_slice())
                .unwrap_or(&[])
        }
        fn queue_len(&self, node: NodeId) -> usize {
            self.queues[node.0 as usize]
        }
        fn edge_load(&self, _a: NodeId, _b: NodeId) -> Option<u64> {
            None
        }
        fn position(&self, _node: NodeId) -> Option<Position> {
            None
        }
    }

    fn star() -> Star {
        Star {
            adjacency: vec![
                vec![NodeId(1), NodeId(2)],
                vec![NodeId(0), NodeId(3)],
                vec![NodeId(0)],
                vec![NodeId(1)],
            ],
            queues: vec![9, 4, 2, 7],
        }
    }

    #[test]
    fn neighborhood_layout() {
        let s = StateVector::neighborhood_queues(&star(), NodeId(0), 3);
        // [q1, q0, q3, q2, q0, 0, ...]
        assert_eq!(s.len(), 9);
        assert_eq!(&s.as_slice()[..6], &[4.0, 9.0, 7.0, 2.0, 9.0, 0.0]);
    }

    #[test]
    fn neighborhood_truncates_to_width() {
        let s = StateVector::neighborhood_queues(&star(), NodeId(0), 1);
        assert_eq!(s.as_slice(), &[4.0]);
    }

    #[test]
    fn threshold_policy() {
        let mut p = QueueThreshold { threshold: 5.0 };
        assert_eq!(p.decide(TickId(1), &StateVector(vec![6.0, 0.0, 4.0])), Action::Offload);
        assert_eq!(p.decide(TickId(1), &StateVector(vec![1.0, 0.0])), Action::Forward);
        assert_eq!(p.decide(TickId(1), &StateVector(vec![0.0; 4])), Action::Forward);
    }

    #[test]
    fn default_state_uses_neighborhood() {
        let s = AlwaysForward.get_state(NodeId(2), &star());
        assert_eq!(s.len(), DEFAULT_MAX_NEIGHBORS * DEFAULT_MAX_NEIGHBORS);
        assert_eq!(&s.as_slice()[..4], &[9.0, 4.0, 2.0, 0.0]);
    }
}
