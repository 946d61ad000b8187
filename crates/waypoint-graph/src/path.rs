//! Step-by-step path following.

use std::collections::HashMap;

use crate::graph::{Graph, WaypointId};
use crate::rule::SpatialRule;
use crate::sorting::SpatialSorting;
use crate::waypoint::{Axis, Waypoint};

/// A follower over a routing graph whose nodes carry distance-to-destination
/// labels. Stateless apart from remembering arrival; the caller feeds in its
/// current position every step.
pub struct Path {
    graph: Graph,
    end: WaypointId,
    proximity_rule: SpatialRule,
    reach_sorting: SpatialSorting,
    distances: HashMap<WaypointId, f64>,
    end_reached: bool,
}

impl Path {
    pub(crate) fn new(
        graph: Graph,
        end: WaypointId,
        proximity_rule: SpatialRule,
        reach_sorting: SpatialSorting,
        distances: HashMap<WaypointId, f64>,
    ) -> Self {
        Self {
            graph,
            end,
            proximity_rule,
            reach_sorting,
            distances,
            end_reached: false,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn is_end_reached(&self) -> bool {
        self.end_reached
    }

    /// The neighbor of the node nearest `from` that is closest to the
    /// destination by label.
    fn closest_to_final(&self, from: &Waypoint) -> Option<WaypointId> {
        let anchor = self.reach_sorting.nearest(from)?;
        self.graph
            .neighbours(anchor.id)
            .iter()
            .copied()
            .min_by(|a, b| {
                let da = self.distances.get(a).copied().unwrap_or(f64::INFINITY);
                let db = self.distances.get(b).copied().unwrap_or(f64::INFINITY);
                da.total_cmp(&db)
            })
    }

    /// The next waypoint to move to from `current`, skipping over waypoints
    /// already within proximity. `None` once the destination is reached, or
    /// when the follower is off the map.
    pub fn next_nearest(&mut self, current: &Waypoint) -> Option<Waypoint> {
        if self.end_reached {
            return None;
        }
        let end = self.graph.waypoint(self.end)?;
        if self.proximity_rule.is_near(current, &end) {
            self.end_reached = true;
            return None;
        }
        let mut next = self.closest_to_final(current)?;
        loop {
            let waypoint = self.graph.waypoint(next)?;
            if !self.proximity_rule.is_near(current, &waypoint) {
                return Some(waypoint);
            }
            next = self.closest_to_final(&waypoint)?;
        }
    }

    /// Whether `points` lie on a straight segment, within the proximity
    /// rule's tolerance of the ideal line.
    fn is_line(rule: &SpatialRule, points: &[Waypoint]) -> bool {
        debug_assert!(points.len() >= 2);
        if points.len() == 2 {
            return true;
        }
        let a = points[0];
        let b = points[points.len() - 1];
        let ab = [
            b.get(Axis::X) - a.get(Axis::X),
            b.get(Axis::Y) - a.get(Axis::Y),
            b.get(Axis::Z) - a.get(Axis::Z),
        ];
        let ab_sq = ab[0] * ab[0] + ab[1] * ab[1] + ab[2] * ab[2];
        if ab_sq == 0.0 {
            return false;
        }
        for c in &points[1..points.len() - 1] {
            let ac = [
                c.get(Axis::X) - a.get(Axis::X),
                c.get(Axis::Y) - a.get(Axis::Y),
                c.get(Axis::Z) - a.get(Axis::Z),
            ];
            let t = (ab[0] * ac[0] + ab[1] * ac[1] + ab[2] * ac[2]) / ab_sq;
            let projection = a.shift(ab[0] * t, ab[1] * t, ab[2] * t);
            if !rule.is_near(c, &projection) {
                return false;
            }
        }
        true
    }

    /// The furthest waypoint reachable from `current` by moving in a
    /// straight line along the path. Lets a mover cross several collinear
    /// waypoints in one go.
    pub fn next_furthest_on_line(&mut self, current: &Waypoint) -> Option<Waypoint> {
        let mut line: Vec<Waypoint> = vec![*current];
        let mut cursor = *current;
        loop {
            if let Some(next) = self.next_nearest(&cursor) {
                line.push(next);
                if Self::is_line(&self.proximity_rule, &line) {
                    cursor = next;
                    continue;
                }
            }
            if line.len() > 1 {
                return Some(cursor);
            }
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapGraph;

    fn map_with_bend() -> MapGraph {
        let merge = SpatialRule::cube(0.5).no_further_than(0.7);
        let connect = SpatialRule::cube(3.0).no_further_than(4.0);
        let reach = SpatialRule::cube(6.0).no_further_than(8.0);
        let mut map = MapGraph::new(merge.clone(), merge, connect, reach);
        // straight run along x, then a turn up y
        for i in 0..4 {
            map.add_waypoint(Waypoint::new(2.0 * i as f64, 0.0, 0.0), None);
        }
        for i in 1..4 {
            map.add_waypoint(Waypoint::new(6.0, 2.0 * i as f64, 0.0), None);
        }
        map
    }

    #[test]
    fn furthest_on_line_stops_at_the_bend() {
        let mut path = map_with_bend()
            .paths_to(Waypoint::new(6.0, 6.5, 0.0))
            .expect("path exists");
        let far = path
            .next_furthest_on_line(&Waypoint::new(0.0, 0.0, 0.0))
            .expect("line segment exists");
        // the straight x run ends at the corner
        assert_eq!(far, Waypoint::new(6.0, 0.0, 0.0));
    }

    #[test]
    fn is_line_tolerates_small_wobble_only() {
        let rule = SpatialRule::cube(0.5).no_further_than(0.7);
        let straight = [
            Waypoint::new(0.0, 0.0, 0.0),
            Waypoint::new(2.0, 0.1, 0.0),
            Waypoint::new(4.0, 0.0, 0.0),
        ];
        assert!(Path::is_line(&rule, &straight));
        let bent = [
            Waypoint::new(0.0, 0.0, 0.0),
            Waypoint::new(2.0, 2.0, 0.0),
            Waypoint::new(4.0, 0.0, 0.0),
        ];
        assert!(!Path::is_line(&rule, &bent));
    }
}
