//! Periodic link maintenance.
//!
//! [`TopologyManager::refresh`] reconciles the graph's edge set with the
//! [`ConnectivityPolicy`] for the nodes' current positions. Refreshing is
//! idempotent: a second call with unchanged positions does nothing.

use tracing::{debug, info};

use skymesh_core::{NodeId, TickId};

use crate::connectivity::ConnectivityPolicy;
use crate::edge::EdgeKey;
use crate::error::TopologyError;
use crate::graph::Topology;

/// Edges changed by one refresh.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Links created, ascending.
    pub added: Vec<EdgeKey>,
    /// Links removed, ascending.
    pub removed: Vec<EdgeKey>,
}

impl RefreshOutcome {
    /// True if any edge was added or removed.
    pub fn is_changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

/// Forms and breaks links from positions and class rules.
#[derive(Clone, Debug)]
pub struct TopologyManager {
    policy: ConnectivityPolicy,
    refresh_period: u64,
}

impl TopologyManager {
    /// Manager refreshing every `refresh_period` ticks. A period of zero
    /// disables periodic refreshes (build-time only).
    pub fn new(policy: ConnectivityPolicy, refresh_period: u64) -> Self {
        Self {
            policy,
            refresh_period,
        }
    }

    /// The rules in force.
    pub fn policy(&self) -> &ConnectivityPolicy {
        &self.policy
    }

    /// Ticks between refreshes.
    pub fn refresh_period(&self) -> u64 {
        self.refresh_period
    }

    /// True if a periodic refresh is due after `tick`.
    pub fn is_due(&self, tick: TickId) -> bool {
        self.refresh_period > 0 && tick.0 % self.refresh_period == 0
    }

    /// Reconcile the edge set with the policy.
    ///
    /// Every unordered pair of distinct nodes is linked if and only if a
    /// rule covers their classes and they are in range. Recomputes the
    /// step value when anything changed.
    pub fn refresh(&self, topology: &mut Topology) -> Result<RefreshOutcome, TopologyError> {
        let nodes: Vec<(NodeId, _)> = topology.nodes().map(|(id, e)| (id, *e)).collect();
        let mut outcome = RefreshOutcome::default();

        for (i, (x, ex)) in nodes.iter().enumerate() {
            for (y, ey) in &nodes[i + 1..] {
                let wanted = self
                    .policy
                    .link_bandwidth(ex.class, &ex.position, ey.class, &ey.position);
                match wanted {
                    Some(bandwidth) => {
                        if topology.insert_edge(*x, *y, bandwidth)? {
                            outcome.added.extend(EdgeKey::new(*x, *y));
                        }
                    }
                    None => {
                        if topology.remove_edge(*x, *y).is_some() {
                            outcome.removed.extend(EdgeKey::new(*x, *y));
                        }
                    }
                }
            }
        }

        outcome.added.sort_unstable();
        outcome.removed.sort_unstable();
        if outcome.is_changed() {
            topology.recompute_step_value();
            info!(
                added = outcome.added.len(),
                removed = outcome.removed.len(),
                edges = topology.edge_count(),
                step_value = topology.step_value(),
                "topology refreshed"
            );
        } else {
            debug!(edges = topology.edge_count(), "topology unchanged");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::LinkRange;
    use skymesh_core::{ClassId, Position, Role};

    const GROUND: ClassId = ClassId(0);
    const SAT: ClassId = ClassId(1);
    const DEST: ClassId = ClassId(2);

    fn world() -> (TopologyManager, Topology) {
        let mut policy = ConnectivityPolicy::new(Some(50.0));
        policy
            .add_rule(GROUND, GROUND, 1000.0)
            .add_rule(GROUND, SAT, 500.0)
            .add_rule(SAT, DEST, 500.0)
            .set_range(SAT, LinkRange::Unbounded);
        let mut t = Topology::new(500, 1.0).unwrap();
        t.add_node(NodeId(0), GROUND, Role::Source, Position::new(0.0, 0.0, 0.0))
            .unwrap();
        t.add_node(NodeId(1), GROUND, Role::Relay, Position::new(30.0, 0.0, 0.0))
            .unwrap();
        t.add_node(NodeId(2), SAT, Role::Relay, Position::new(0.0, 0.0, 5e5))
            .unwrap();
        t.add_node(NodeId(3), DEST, Role::Destination, Position::new(900.0, 0.0, 0.0))
            .unwrap();
        (TopologyManager::new(policy, 10), t)
    }

    fn key(a: u32, b: u32) -> EdgeKey {
        EdgeKey::new(NodeId(a), NodeId(b)).unwrap()
    }

    #[test]
    fn initial_refresh_builds_expected_edges() {
        let (m, mut t) = world();
        let out = m.refresh(&mut t).unwrap();
        assert_eq!(out.added, vec![key(0, 1), key(0, 2), key(1, 2), key(2, 3)]);
        assert!(out.removed.is_empty());
        assert_eq!(t.step_value(), 0.5);
    }

    #[test]
    fn refresh_is_idempotent() {
        let (m, mut t) = world();
        m.refresh(&mut t).unwrap();
        let before = t.edge_keys();
        let out = m.refresh(&mut t).unwrap();
        assert!(!out.is_changed());
        assert_eq!(t.edge_keys(), before);
    }

    #[test]
    fn moving_out_of_range_breaks_link() {
        let (m, mut t) = world();
        m.refresh(&mut t).unwrap();
        t.set_position(NodeId(1), Position::new(80.0, 0.0, 0.0))
            .unwrap();
        let out = m.refresh(&mut t).unwrap();
        assert_eq!(out.removed, vec![key(0, 1)]);
        assert!(out.added.is_empty());
        // Satellite links are unbounded and survive.
        assert!(t.are_adjacent(NodeId(1), NodeId(2)));
        assert_eq!(t.step_value(), 1.0);
    }

    #[test]
    fn rule_for_empty_class_yields_nothing() {
        let mut policy = ConnectivityPolicy::new(Some(50.0));
        policy.add_rule(GROUND, ClassId(9), 100.0);
        let m = TopologyManager::new(policy, 1);
        let (_, mut t) = world();
        let out = m.refresh(&mut t).unwrap();
        assert!(!out.is_changed());
        assert_eq!(t.edge_count(), 0);
    }

    #[test]
    fn due_every_period() {
        let (m, _) = world();
        assert!(!m.is_due(TickId(9)));
        assert!(m.is_due(TickId(10)));
        assert!(m.is_due(TickId(20)));
        let never = TopologyManager::new(ConnectivityPolicy::default(), 0);
        assert!(!never.is_due(TickId(10)));
    }
}
