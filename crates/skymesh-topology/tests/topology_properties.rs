use proptest::prelude::*;
use skymesh_core::{ClassId, NodeId, Position, Role};
use skymesh_topology::router::route;
use skymesh_topology::{ConnectivityPolicy, LinkRange, Topology, TopologyManager};

const GROUND: ClassId = ClassId(0);
const SAT: ClassId = ClassId(1);

fn build(positions: &[(f64, f64)], with_sat: bool) -> (TopologyManager, Topology) {
    let mut policy = ConnectivityPolicy::new(Some(40.0));
    policy.add_rule(GROUND, GROUND, 1000.0);
    if with_sat {
        policy
            .add_rule(GROUND, SAT, 250.0)
            .set_range(SAT, LinkRange::Unbounded);
    }
    let mut t = Topology::new(500, 1.0).unwrap();
    for (i, (x, y)) in positions.iter().enumerate() {
        let role = if i == 0 { Role::Destination } else { Role::Relay };
        t.add_node(NodeId(i as u32), GROUND, role, Position::new(*x, *y, 0.0))
            .unwrap();
    }
    if with_sat {
        let id = NodeId(positions.len() as u32);
        t.add_node(id, SAT, Role::Relay, Position::new(0.0, 0.0, 5e5))
            .unwrap();
    }
    (TopologyManager::new(policy, 5), t)
}

/// Every simple path from `at` to `to` whose interior avoids destinations,
/// as `(total load, hops)`.
fn path_costs(
    t: &Topology,
    at: NodeId,
    to: NodeId,
    visited: &mut Vec<NodeId>,
    out: &mut Vec<(u64, u32)>,
) {
    visited.push(at);
    if at == to {
        let load = visited
            .windows(2)
            .map(|w| t.edge(w[0], w[1]).map_or(0, |e| e.load()))
            .sum();
        out.push((load, (visited.len() - 1) as u32));
    } else if visited.len() == 1 || t.role(at) != Some(Role::Destination) {
        for &next in t.neighbors(at) {
            if !visited.contains(&next) {
                path_costs(t, next, to, visited, out);
            }
        }
    }
    visited.pop();
}

fn arb_mesh() -> impl Strategy<Value = (Vec<bool>, Vec<bool>, Vec<usize>)> {
    (2usize..7).prop_flat_map(|n| {
        (
            proptest::collection::vec(any::<bool>(), n),
            proptest::collection::vec(any::<bool>(), n * n),
            proptest::collection::vec(0usize..6, n),
        )
    })
}

fn arb_positions() -> impl Strategy<Value = Vec<(f64, f64)>> {
    proptest::collection::vec((0f64..200.0, 0f64..200.0), 2..12)
}

proptest! {
    #[test]
    fn refresh_twice_is_identical(positions in arb_positions(), with_sat in any::<bool>()) {
        let (m, mut t) = build(&positions, with_sat);
        m.refresh(&mut t).unwrap();
        let first = t.edge_keys();
        let step = t.step_value();
        let out = m.refresh(&mut t).unwrap();
        prop_assert!(!out.is_changed());
        prop_assert_eq!(t.edge_keys(), first);
        prop_assert_eq!(t.step_value(), step);
    }

    #[test]
    fn edges_match_the_policy(positions in arb_positions()) {
        let (m, mut t) = build(&positions, false);
        m.refresh(&mut t).unwrap();
        for i in 0..positions.len() {
            for j in (i + 1)..positions.len() {
                let a = NodeId(i as u32);
                let b = NodeId(j as u32);
                let d = t.position(a).unwrap().distance(&t.position(b).unwrap());
                prop_assert_eq!(t.are_adjacent(a, b), d < 40.0);
            }
        }
    }

    #[test]
    fn routes_are_walkable_and_never_transit_destinations(
        positions in arb_positions(),
        from in 0usize..12,
        to in 0usize..12,
    ) {
        let (m, mut t) = build(&positions, true);
        m.refresh(&mut t).unwrap();
        let n = t.node_count();
        let (from, to) = (NodeId((from % n) as u32), NodeId((to % n) as u32));
        if let Some(path) = route(&t, from, to) {
            prop_assert_eq!(path.first(), Some(&from));
            prop_assert_eq!(path.last(), Some(&to));
            for w in path.windows(2) {
                prop_assert!(t.are_adjacent(w[0], w[1]));
            }
            for hop in path.iter().skip(1).take(path.len().saturating_sub(2)) {
                prop_assert_ne!(t.role(*hop), Some(Role::Destination));
            }
        }
    }

    #[test]
    fn route_minimises_load_then_hops(
        (dest, links, queues) in arb_mesh(),
        from in 0usize..7,
        offset in 1usize..7,
    ) {
        let n = dest.len();
        let mut t = Topology::new(500, 1.0).unwrap();
        for (i, is_dest) in dest.iter().enumerate() {
            let role = if *is_dest { Role::Destination } else { Role::Relay };
            t.add_node(NodeId(i as u32), GROUND, role, Position::default())
                .unwrap();
        }
        for i in 0..n {
            for j in (i + 1)..n {
                if links[i * n + j] {
                    t.insert_edge(NodeId(i as u32), NodeId(j as u32), 500.0).unwrap();
                }
            }
        }
        t.refresh_loads(|id| queues[id.0 as usize]);

        let from = NodeId((from % n) as u32);
        let to = NodeId(((from.0 as usize + offset) % n) as u32);
        prop_assume!(from != to);

        let mut costs = Vec::new();
        path_costs(&t, from, to, &mut Vec::new(), &mut costs);
        let best = costs.iter().min().copied();

        let found = route(&t, from, to).map(|path| {
            let load = path
                .windows(2)
                .map(|w| t.edge(w[0], w[1]).map_or(0, |e| e.load()))
                .sum::<u64>();
            (load, (path.len() - 1) as u32)
        });
        prop_assert_eq!(found, best);
    }
}

#[test]
fn satellite_step_value_is_bottlenecked_by_fastest_link() {
    let (m, mut t) = build(&[(0.0, 0.0), (1000.0, 0.0)], true);
    m.refresh(&mut t).unwrap();
    // Only satellite links (250 B/s) exist; ground nodes are too far apart.
    assert_eq!(t.edge_count(), 2);
    assert_eq!(t.step_value(), 2.0);
}
