//! Map building: merge, connect, and answer path queries.

use std::collections::{HashMap, HashSet};

use crate::graph::{Graph, WaypointId};
use crate::path::Path;
use crate::rule::SpatialRule;
use crate::sorting::{SortedEntry, SpatialSorting};
use crate::waypoint::{Axis, Waypoint};

/// A growing map of explored positions.
///
/// Four rules steer it: `merge` decides when a new point is a duplicate of
/// an existing one, `connect` decides which neighbors an accepted point
/// links to, `reach` bounds how far a disconnected point may link and how
/// far a query position may be from the map, and `proximity` decides when a
/// follower has arrived at a point.
pub struct MapGraph {
    proximity_rule: SpatialRule,
    reach_rule: SpatialRule,
    merge_sorting: SpatialSorting,
    connect_sorting: SpatialSorting,
    reach_sorting: SpatialSorting,
    graph: Graph,
}

impl MapGraph {
    pub fn new(
        proximity_rule: SpatialRule,
        merge_rule: SpatialRule,
        connect_rule: SpatialRule,
        reach_rule: SpatialRule,
    ) -> Self {
        Self {
            proximity_rule,
            reach_rule: reach_rule.clone(),
            merge_sorting: SpatialSorting::new(merge_rule),
            connect_sorting: SpatialSorting::new(connect_rule),
            reach_sorting: SpatialSorting::new(reach_rule),
            graph: Graph::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Rebuilds the map from a batch of points, connecting each to its
    /// in-reach neighbors.
    pub fn from_waypoints(&mut self, waypoints: impl IntoIterator<Item = Waypoint>) {
        self.graph = Graph::new();
        let ids: Vec<WaypointId> = waypoints
            .into_iter()
            .map(|w| self.graph.add(w))
            .collect();
        let entries: Vec<SortedEntry> = ids
            .iter()
            .map(|&id| SortedEntry {
                id,
                waypoint: self.graph.waypoint(id).unwrap_or_default(),
            })
            .collect();
        self.merge_sorting.rebuild(entries.clone());
        self.connect_sorting.rebuild(entries.clone());
        self.reach_sorting.rebuild(entries);
        for &id in &ids {
            self.connect_waypoint(id, false);
        }
    }

    fn connect_waypoint(&mut self, id: WaypointId, bidirectional: bool) {
        let Some(waypoint) = self.graph.waypoint(id) else {
            return;
        };
        let mut connected = false;
        for entry in self.connect_sorting.around_filtered(&waypoint, |e| e.id != id) {
            if bidirectional {
                self.graph.bidirectional_edge(id, entry.id);
            } else {
                self.graph.unidirectional_edge(id, entry.id);
            }
            connected = true;
        }
        if !connected {
            // fall back to the nearest point in reach, even if far
            if let Some(entry) = self.reach_sorting.nearest_filtered(&waypoint, |e| e.id != id) {
                if bidirectional {
                    self.graph.bidirectional_edge(id, entry.id);
                } else {
                    self.graph.unidirectional_edge(id, entry.id);
                }
            }
        }
    }

    /// Records an observed position. Returns `true` when a new node was
    /// added; a point near an existing node merges into it instead, at most
    /// taking over its label.
    pub fn add_waypoint(&mut self, waypoint: Waypoint, info: Option<String>) -> bool {
        if let Some(merged) = self.merge_sorting.around(&waypoint).first() {
            if let Some(info) = info {
                self.graph.set_info(merged.id, Some(info));
                return true;
            }
            return false;
        }
        let id = self.graph.add_with_info(waypoint, info);
        self.connect_waypoint(id, true);
        let entry = SortedEntry { id, waypoint };
        self.merge_sorting.insert(entry);
        self.connect_sorting.insert(entry);
        self.reach_sorting.insert(entry);
        true
    }

    /// Removes the node closest to `near`, measured on `axes` (all when
    /// empty). Returns whether one was removed.
    pub fn remove_closest_waypoint(&mut self, near: Waypoint, axes: &[Axis]) -> bool {
        let Some(id) = self.graph.closest(&near, axes) else {
            return false;
        };
        if !self.graph.remove(id) {
            return false;
        }
        self.merge_sorting.remove(id);
        self.connect_sorting.remove(id);
        self.reach_sorting.remove(id);
        true
    }

    /// Colors connected components; nodes sharing a color are mutually
    /// reachable along edges.
    fn color_components(graph: &Graph) -> HashMap<WaypointId, u32> {
        let mut colors: HashMap<WaypointId, u32> = HashMap::new();
        let mut next_color = 1u32;
        let ids: Vec<WaypointId> = graph.ids().collect();
        for start in ids {
            if colors.contains_key(&start) {
                continue;
            }
            let color = next_color;
            next_color += 1;
            colors.insert(start, color);
            let mut walk = graph.traverse(start, false);
            while let Some((_, to)) = walk.next() {
                if colors.get(&to) != Some(&color) {
                    colors.insert(to, color);
                    walk.descend(to);
                }
            }
        }
        colors
    }

    /// Distance-to-destination labels, relaxed over a reverse breadth-first
    /// walk from `end`.
    fn distances_to(graph: &Graph, end: WaypointId) -> HashMap<WaypointId, f64> {
        let mut distances: HashMap<WaypointId, f64> = HashMap::new();
        distances.insert(end, 0.0);
        let mut walk = graph.traverse(end, true);
        while let Some((from, to)) = walk.next() {
            let Some(&from_distance) = distances.get(&from) else {
                continue;
            };
            let step = match (graph.waypoint(from), graph.waypoint(to)) {
                (Some(a), Some(b)) => a.distance(&b),
                _ => continue,
            };
            let candidate = from_distance + step;
            let improves = distances.get(&to).is_none_or(|&d| candidate < d);
            if improves {
                distances.insert(to, candidate);
                walk.descend(to);
            }
        }
        distances
    }

    /// Builds a follower from anywhere on the map toward `end`, or `None`
    /// when no node is within reach of the destination.
    pub fn paths_to(&self, end: Waypoint) -> Option<Path> {
        let colors = Self::color_components(&self.graph);
        let ending_colors: HashSet<u32> = self
            .reach_sorting
            .around(&end)
            .iter()
            .filter_map(|e| colors.get(&e.id).copied())
            .collect();
        if ending_colors.is_empty() {
            return None;
        }
        // only components that can reach the destination participate
        let (mut route_graph, remap) = self
            .graph
            .filtered_copy(|id| colors.get(&id).is_some_and(|c| ending_colors.contains(c)));
        let end_id = route_graph.add(end);
        let reach_sorting = route_graph.create_sorting(self.reach_rule.clone());

        // tie the destination into each participating component once
        let mut gateway: HashSet<WaypointId> = HashSet::new();
        for color in &ending_colors {
            let of_color: HashSet<WaypointId> = colors
                .iter()
                .filter(|(_, c)| *c == color)
                .filter_map(|(old, _)| remap.get(old).copied())
                .collect();
            if let Some(entry) =
                reach_sorting.nearest_filtered(&end, |e| e.id != end_id && of_color.contains(&e.id))
            {
                gateway.insert(entry.id);
            }
        }
        for id in gateway {
            route_graph.bidirectional_edge(end_id, id);
        }

        let distances = Self::distances_to(&route_graph, end_id);
        Some(Path::new(
            route_graph,
            end_id,
            self.proximity_rule.clone(),
            reach_sorting,
            distances,
        ))
    }
}
