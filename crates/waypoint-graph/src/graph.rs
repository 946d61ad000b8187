//! Arena graph of waypoints and directed edges.

use std::collections::VecDeque;
use std::fmt;

use crate::rule::SpatialRule;
use crate::sorting::{SortedEntry, SpatialSorting};
use crate::waypoint::{Axis, Waypoint};

/// Index of a node in its [`Graph`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaypointId(pub usize);

impl fmt::Display for WaypointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

struct Node {
    waypoint: Waypoint,
    info: Option<String>,
    neighbours: Vec<WaypointId>,
    alive: bool,
}

/// Waypoints plus directed edges. Removal leaves a dead slot behind so ids
/// stay stable.
#[derive(Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, waypoint: Waypoint) -> WaypointId {
        self.add_with_info(waypoint, None)
    }

    pub fn add_with_info(&mut self, waypoint: Waypoint, info: Option<String>) -> WaypointId {
        let id = WaypointId(self.nodes.len());
        self.nodes.push(Node {
            waypoint,
            info,
            neighbours: Vec::new(),
            alive: true,
        });
        id
    }

    fn node(&self, id: WaypointId) -> Option<&Node> {
        self.nodes.get(id.0).filter(|n| n.alive)
    }

    pub fn contains(&self, id: WaypointId) -> bool {
        self.node(id).is_some()
    }

    pub fn waypoint(&self, id: WaypointId) -> Option<Waypoint> {
        self.node(id).map(|n| n.waypoint)
    }

    pub fn info(&self, id: WaypointId) -> Option<&str> {
        self.node(id).and_then(|n| n.info.as_deref())
    }

    pub fn set_info(&mut self, id: WaypointId, info: Option<String>) {
        if let Some(node) = self.nodes.get_mut(id.0).filter(|n| n.alive) {
            node.info = info;
        }
    }

    pub fn neighbours(&self, id: WaypointId) -> &[WaypointId] {
        self.node(id).map(|n| n.neighbours.as_slice()).unwrap_or(&[])
    }

    /// Removes the node and every edge involving it.
    pub fn remove(&mut self, id: WaypointId) -> bool {
        if !self.contains(id) {
            return false;
        }
        for node in self.nodes.iter_mut() {
            node.neighbours.retain(|&n| n != id);
        }
        let node = &mut self.nodes[id.0];
        node.neighbours.clear();
        node.alive = false;
        true
    }

    pub fn unidirectional_edge(&mut self, from: WaypointId, to: WaypointId) {
        debug_assert_ne!(from, to);
        if !self.contains(from) || !self.contains(to) {
            return;
        }
        let node = &mut self.nodes[from.0];
        if !node.neighbours.contains(&to) {
            node.neighbours.push(to);
        }
    }

    /// Connects both ways; a no-op when either direction already exists.
    pub fn bidirectional_edge(&mut self, a: WaypointId, b: WaypointId) {
        debug_assert_ne!(a, b);
        if !self.contains(a) || !self.contains(b) {
            return;
        }
        if self.nodes[a.0].neighbours.contains(&b) || self.nodes[b.0].neighbours.contains(&a) {
            return;
        }
        self.nodes[a.0].neighbours.push(b);
        self.nodes[b.0].neighbours.push(a);
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.alive).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> impl Iterator<Item = WaypointId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.alive)
            .map(|(i, _)| WaypointId(i))
    }

    pub fn waypoints(&self) -> impl Iterator<Item = (WaypointId, Waypoint, Option<&str>)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.alive)
            .map(|(i, n)| (WaypointId(i), n.waypoint, n.info.as_deref()))
    }

    pub fn edges(&self) -> impl Iterator<Item = (WaypointId, WaypointId)> + '_ {
        self.ids()
            .flat_map(|id| self.neighbours(id).iter().map(move |&n| (id, n)))
    }

    /// The node closest to `to`, measured on the given axes (all when empty).
    pub fn closest(&self, to: &Waypoint, axes: &[Axis]) -> Option<WaypointId> {
        self.waypoints()
            .min_by(|(_, a, _), (_, b, _)| {
                a.distance_on_axes(to, axes)
                    .total_cmp(&b.distance_on_axes(to, axes))
            })
            .map(|(id, _, _)| id)
    }

    /// Copies the graph, keeping only nodes accepted by `keep`. Ids are
    /// compacted; the returned map translates old ids to new ones.
    pub fn filtered_copy(
        &self,
        keep: impl Fn(WaypointId) -> bool,
    ) -> (Graph, std::collections::HashMap<WaypointId, WaypointId>) {
        let mut copy = Graph::new();
        let mut remap = std::collections::HashMap::new();
        for (id, waypoint, info) in self.waypoints() {
            if keep(id) {
                let new_id = copy.add_with_info(waypoint, info.map(str::to_string));
                remap.insert(id, new_id);
            }
        }
        for (from, to) in self.edges() {
            if let (Some(&nf), Some(&nt)) = (remap.get(&from), remap.get(&to)) {
                copy.unidirectional_edge(nf, nt);
            }
        }
        (copy, remap)
    }

    /// Spatial sorting over every live node.
    pub fn create_sorting(&self, rule: SpatialRule) -> SpatialSorting {
        let mut sorting = SpatialSorting::new(rule);
        sorting.rebuild(self.waypoints().map(|(id, waypoint, _)| SortedEntry {
            id,
            waypoint,
        }));
        sorting
    }

    /// Edge-by-edge traversal from `start`. The caller pulls edges with
    /// [`Traversal::next`] and expands the frontier explicitly with
    /// [`Traversal::descend`].
    pub fn traverse(&self, start: WaypointId, bfs: bool) -> Traversal<'_> {
        let mut frontier = VecDeque::new();
        for &n in self.neighbours(start) {
            frontier.push_back((start, n));
        }
        Traversal {
            graph: self,
            frontier,
            bfs,
        }
    }
}

/// Explicit-worklist graph walk; breadth- or depth-first depending on how
/// new edges are queued.
pub struct Traversal<'a> {
    graph: &'a Graph,
    frontier: VecDeque<(WaypointId, WaypointId)>,
    bfs: bool,
}

impl Traversal<'_> {
    /// The next frontier edge, or `None` when the walk is exhausted.
    pub fn next(&mut self) -> Option<(WaypointId, WaypointId)> {
        self.frontier.pop_back()
    }

    /// Queues the edges out of `id` for visiting.
    pub fn descend(&mut self, id: WaypointId) {
        for &n in self.graph.neighbours(id) {
            if self.bfs {
                self.frontier.push_front((id, n));
            } else {
                self.frontier.push_back((id, n));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_graph() -> (Graph, Vec<WaypointId>) {
        let mut g = Graph::new();
        let ids: Vec<WaypointId> = (0..4)
            .map(|i| g.add(Waypoint::new(i as f64, 0.0, 0.0)))
            .collect();
        g.bidirectional_edge(ids[0], ids[1]);
        g.bidirectional_edge(ids[1], ids[2]);
        g.bidirectional_edge(ids[2], ids[3]);
        (g, ids)
    }

    #[test]
    fn edges_are_directed_pairs() {
        let (g, ids) = line_graph();
        assert_eq!(g.len(), 4);
        // each bidirectional edge contributes both directions
        assert_eq!(g.edges().count(), 6);
        assert_eq!(g.neighbours(ids[1]), &[ids[0], ids[2]]);
    }

    #[test]
    fn duplicate_bidirectional_edges_are_ignored() {
        let mut g = Graph::new();
        let a = g.add(Waypoint::default());
        let b = g.add(Waypoint::new(1.0, 0.0, 0.0));
        g.bidirectional_edge(a, b);
        g.bidirectional_edge(b, a);
        assert_eq!(g.edges().count(), 2);
    }

    #[test]
    fn remove_disconnects_and_keeps_ids_stable() {
        let (mut g, ids) = line_graph();
        assert!(g.remove(ids[1]));
        assert!(!g.remove(ids[1]));
        assert_eq!(g.len(), 3);
        assert_eq!(g.neighbours(ids[0]), &[] as &[WaypointId]);
        assert_eq!(g.neighbours(ids[2]), &[ids[3]]);
        assert_eq!(g.waypoint(ids[3]), Some(Waypoint::new(3.0, 0.0, 0.0)));
    }

    #[test]
    fn closest_can_ignore_axes() {
        let mut g = Graph::new();
        let near_flat = g.add(Waypoint::new(1.0, 100.0, 0.0));
        let near_3d = g.add(Waypoint::new(3.0, 0.0, 0.0));
        let probe = Waypoint::default();
        assert_eq!(g.closest(&probe, &[]), Some(near_3d));
        assert_eq!(g.closest(&probe, &[Axis::X]), Some(near_flat));
    }

    #[test]
    fn traversal_visits_on_demand() {
        let (g, ids) = line_graph();
        let mut seen = Vec::new();
        let mut walk = g.traverse(ids[0], true);
        let mut visited = vec![ids[0]];
        while let Some((_, to)) = walk.next() {
            seen.push(to);
            if !visited.contains(&to) {
                visited.push(to);
                walk.descend(to);
            }
        }
        assert!(seen.contains(&ids[3]));
        assert_eq!(visited, ids);
    }

    #[test]
    fn filtered_copy_compacts_and_remaps() {
        let (g, ids) = line_graph();
        let (copy, remap) = g.filtered_copy(|id| id != ids[0]);
        assert_eq!(copy.len(), 3);
        assert_eq!(copy.edges().count(), 4);
        let new_1 = remap[&ids[1]];
        // the edge back to the dropped node is gone
        assert_eq!(copy.neighbours(new_1), &[remap[&ids[2]]]);
    }
}
