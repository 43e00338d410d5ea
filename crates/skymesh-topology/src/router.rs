//! Congestion-aware shortest paths.
//!
//! Path cost is `(sum of edge load, hop count)`, compared
//! lexicographically: the least congested path wins, and among equally
//! congested paths the shortest. Remaining ties are broken by node id.
//! Destination-role nodes terminate paths but never relay them.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use indexmap::IndexMap;
use rand::Rng;
use smallvec::smallvec;
use tracing::{trace, warn};

use skymesh_core::{ClassId, NodeId, Packet, PathError, Role, Route};

use crate::graph::Topology;

/// `(total load, hops)`.
type Cost = (u64, u32);

/// Shortest least-congested path from `from` to `to`, both inclusive.
///
/// Returns `None` if `to` is unreachable or either node is unknown.
pub fn route(topology: &Topology, from: NodeId, to: NodeId) -> Option<Route> {
    shortest(topology, from, to, None)
}

/// Dijkstra over `(load, hops)`, never entering `avoid`.
fn shortest(topology: &Topology, from: NodeId, to: NodeId, avoid: Option<NodeId>) -> Option<Route> {
    topology.node(from)?;
    topology.node(to)?;
    if from == to {
        return Some(smallvec![from]);
    }

    let mut best: IndexMap<NodeId, (Cost, Option<NodeId>)> = IndexMap::new();
    let mut heap = BinaryHeap::new();
    best.insert(from, ((0, 0), None));
    heap.push(Reverse(((0u64, 0u32), from)));

    while let Some(Reverse((cost, node))) = heap.pop() {
        if best.get(&node).is_some_and(|(c, _)| *c < cost) {
            continue;
        }
        if node == to {
            break;
        }
        if node != from && topology.role(node) == Some(Role::Destination) {
            continue;
        }
        for &next in topology.neighbors(node) {
            if Some(next) == avoid {
                continue;
            }
            let Some(edge) = topology.edge(node, next) else {
                continue;
            };
            let candidate = (cost.0 + edge.load(), cost.1 + 1);
            let better = best.get(&next).is_none_or(|(c, _)| candidate < *c);
            if better {
                best.insert(next, (candidate, Some(node)));
                heap.push(Reverse((candidate, next)));
            }
        }
    }

    best.get(&to)?;
    let mut path = Route::new();
    let mut cursor = Some(to);
    while let Some(node) = cursor {
        path.push(node);
        cursor = best.get(&node).and_then(|(_, prev)| *prev);
    }
    path.reverse();
    Some(path)
}

/// Path that leaves `from` through `via` and continues to `to`.
///
/// `via` must be a neighbor of `from`, and may only be a destination if
/// it is `to` itself. The tail never passes back through `from`. Returns
/// `None` when any of this fails or `to` is unreachable from `via`.
pub fn route_via(topology: &Topology, from: NodeId, via: NodeId, to: NodeId) -> Option<Route> {
    if !topology.are_adjacent(from, via) {
        return None;
    }
    if via != to && topology.role(via) == Some(Role::Destination) {
        return None;
    }
    let tail = shortest(topology, via, to, Some(from))?;
    let mut path = Route::with_capacity(tail.len() + 1);
    path.push(from);
    path.extend(tail);
    Some(path)
}

/// Check that every consecutive pair in `path` is linked.
pub fn check_adjacency(topology: &Topology, path: &[NodeId]) -> Result<(), PathError> {
    for w in path.windows(2) {
        if !topology.are_adjacent(w[0], w[1]) {
            return Err(PathError::NotAdjacent {
                from: w[0],
                to: w[1],
            });
        }
    }
    Ok(())
}

/// Reroute `packet` along `new_path`.
///
/// On top of [`Packet::recal_path`]'s checks, the first hop must be
/// linked to the packet's current location.
pub fn reroute(topology: &Topology, packet: &mut Packet, new_path: &[NodeId]) -> Result<(), PathError> {
    if let [here, next, ..] = new_path {
        if !topology.are_adjacent(*here, *next) {
            return Err(PathError::NotAdjacent {
                from: *here,
                to: *next,
            });
        }
    }
    packet.recal_path(new_path)
}

/// Neighbor of `node` in `class` with the lowest edge load. Ties go to
/// the lower id. Destinations are skipped since they cannot relay.
pub fn least_loaded_neighbor(topology: &Topology, node: NodeId, class: ClassId) -> Option<NodeId> {
    topology
        .neighbors(node)
        .iter()
        .filter(|n| topology.class(**n) == Some(class))
        .filter(|n| topology.role(**n) != Some(Role::Destination))
        .filter_map(|n| topology.edge(node, *n).map(|e| (e.load(), *n)))
        .min()
        .map(|(_, n)| n)
}

/// Path for a new packet originating at `from`.
///
/// Picks a destination uniformly from `destinations` and routes to it,
/// optionally leaving through `next_hop`. An unreachable destination is
/// retried with a fresh draw, up to `max_attempts` draws in total; after
/// that the generation is abandoned. A node without links gives up
/// immediately.
pub fn plan_packet<R: Rng + ?Sized>(
    topology: &Topology,
    rng: &mut R,
    from: NodeId,
    destinations: &[NodeId],
    next_hop: Option<NodeId>,
    max_attempts: u32,
) -> Option<Route> {
    if topology.neighbors(from).is_empty() || destinations.is_empty() {
        return None;
    }
    for attempt in 0..max_attempts {
        let dest = destinations[rng.random_range(0..destinations.len())];
        if dest == from {
            continue;
        }
        let path = match next_hop {
            None => route(topology, from, dest),
            Some(via) => route_via(topology, from, via, dest),
        };
        match path {
            Some(p) if p.len() >= 2 => return Some(p),
            _ => trace!(node = %from, dest = %dest, attempt, "no path"),
        }
    }
    warn!(node = %from, max_attempts, "route attempts exhausted");
    None
}
