//! Windowed spatial queries over a sorted point set.
//!
//! Points are kept ordered along one sort axis, chosen as the axis with the
//! largest span relative to the rule's reach on it. Neighborhood queries
//! binary-search the window start and walk only while the sort-axis distance
//! stays in reach.

use crate::graph::WaypointId;
use crate::rule::SpatialRule;
use crate::waypoint::{Axis, Waypoint};

/// One sorted point, tagged with the graph node it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortedEntry {
    pub id: WaypointId,
    pub waypoint: Waypoint,
}

pub struct SpatialSorting {
    rule: SpatialRule,
    entries: Vec<SortedEntry>,
    sort_axis: Axis,
    min: [f64; 3],
    max: [f64; 3],
}

impl SpatialSorting {
    pub fn new(rule: SpatialRule) -> Self {
        Self {
            rule,
            entries: Vec::new(),
            sort_axis: Axis::X,
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sort_axis(&self) -> Axis {
        self.sort_axis
    }

    pub fn span(&self, axis: Axis) -> f64 {
        let i = axis.index();
        if self.max[i] < self.min[i] {
            0.0
        } else {
            self.max[i] - self.min[i]
        }
    }

    fn best_sort_axis(&self) -> Axis {
        let mut best = Axis::X;
        let mut best_score = f64::NEG_INFINITY;
        for axis in Axis::ALL {
            let score = self.span(axis) / self.rule.max_distance(axis);
            if score > best_score {
                best_score = score;
                best = axis;
            }
        }
        best
    }

    fn sort_entries(&mut self) {
        let axis = self.sort_axis;
        self.entries
            .sort_by(|a, b| a.waypoint.get(axis).total_cmp(&b.waypoint.get(axis)));
    }

    /// Rebuilds the sorting from scratch.
    pub fn rebuild(&mut self, entries: impl IntoIterator<Item = SortedEntry>) {
        self.entries = entries.into_iter().collect();
        self.min = [f64::INFINITY; 3];
        self.max = [f64::NEG_INFINITY; 3];
        for entry in &self.entries {
            for axis in Axis::ALL {
                let c = entry.waypoint.get(axis);
                let i = axis.index();
                self.min[i] = self.min[i].min(c);
                self.max[i] = self.max[i].max(c);
            }
        }
        if !self.entries.is_empty() {
            self.sort_axis = self.best_sort_axis();
        }
        self.sort_entries();
    }

    /// Inserts one point, re-sorting only when the new extremes move the
    /// preferred sort axis.
    pub fn insert(&mut self, entry: SortedEntry) {
        let mut span_changed = false;
        for axis in Axis::ALL {
            let c = entry.waypoint.get(axis);
            let i = axis.index();
            if c < self.min[i] {
                self.min[i] = c;
                span_changed = true;
            }
            if c > self.max[i] {
                self.max[i] = c;
                span_changed = true;
            }
        }
        if span_changed {
            let best = self.best_sort_axis();
            if best != self.sort_axis {
                self.sort_axis = best;
                self.sort_entries();
            }
        }
        let axis = self.sort_axis;
        let coord = entry.waypoint.get(axis);
        let idx = self
            .entries
            .partition_point(|e| e.waypoint.get(axis) < coord);
        self.entries.insert(idx, entry);
    }

    pub fn remove(&mut self, id: WaypointId) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    fn window_start(&self, around: &Waypoint) -> Option<usize> {
        let coords: Vec<f64> = self
            .entries
            .iter()
            .map(|e| e.waypoint.get(self.sort_axis))
            .collect();
        self.rule
            .first_in_range(&coords, self.sort_axis, around, None)
    }

    /// All points near `around` under the rule, window-scanned.
    pub fn around(&self, around: &Waypoint) -> Vec<SortedEntry> {
        self.around_filtered(around, |_| true)
    }

    pub fn around_filtered(
        &self,
        around: &Waypoint,
        accept: impl Fn(&SortedEntry) -> bool,
    ) -> Vec<SortedEntry> {
        let Some(start) = self.window_start(around) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for entry in &self.entries[start..] {
            if !self
                .rule
                .is_near_by_axis(around, &entry.waypoint, self.sort_axis)
            {
                break;
            }
            if accept(entry) && self.rule.is_near(around, &entry.waypoint) {
                out.push(*entry);
            }
        }
        out
    }

    /// The nearest in-reach point, or `None` when nothing is in reach.
    pub fn nearest(&self, around: &Waypoint) -> Option<SortedEntry> {
        self.nearest_filtered(around, |_| true)
    }

    pub fn nearest_filtered(
        &self,
        around: &Waypoint,
        accept: impl Fn(&SortedEntry) -> bool,
    ) -> Option<SortedEntry> {
        self.around_filtered(around, accept)
            .into_iter()
            .min_by(|a, b| {
                a.waypoint
                    .distance(around)
                    .total_cmp(&b.waypoint.distance(around))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: usize, x: f64, y: f64, z: f64) -> SortedEntry {
        SortedEntry {
            id: WaypointId(id),
            waypoint: Waypoint::new(x, y, z),
        }
    }

    #[test]
    fn picks_widest_relative_axis() {
        let mut sorting = SpatialSorting::new(SpatialRule::new(1.0, 10.0, 1.0));
        sorting.rebuild([
            entry(0, 0.0, 0.0, 0.0),
            entry(1, 5.0, 50.0, 0.0),
            entry(2, 9.0, 90.0, 2.0),
        ]);
        // x span 9 over reach 1 beats y span 90 over reach 10
        assert_eq!(sorting.sort_axis(), Axis::X);
        assert_eq!(sorting.span(Axis::Y), 90.0);
    }

    #[test]
    fn around_returns_only_in_reach_points() {
        let mut sorting = SpatialSorting::new(SpatialRule::cube(2.0));
        sorting.rebuild([
            entry(0, 0.0, 0.0, 0.0),
            entry(1, 1.0, 1.0, 0.0),
            entry(2, 10.0, 0.0, 0.0),
        ]);
        let near = sorting.around(&Waypoint::new(0.5, 0.5, 0.0));
        let ids: Vec<usize> = near.iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn nearest_respects_filter() {
        let mut sorting = SpatialSorting::new(SpatialRule::cube(5.0));
        sorting.rebuild([entry(0, 1.0, 0.0, 0.0), entry(1, 2.0, 0.0, 0.0)]);
        let around = Waypoint::default();
        assert_eq!(sorting.nearest(&around).unwrap().id, WaypointId(0));
        let other = sorting
            .nearest_filtered(&around, |e| e.id != WaypointId(0))
            .unwrap();
        assert_eq!(other.id, WaypointId(1));
    }

    #[test]
    fn insert_keeps_order_and_remove_deletes() {
        let mut sorting = SpatialSorting::new(SpatialRule::cube(2.0));
        sorting.rebuild([entry(0, 0.0, 0.0, 0.0), entry(2, 4.0, 0.0, 0.0)]);
        sorting.insert(entry(1, 2.0, 0.0, 0.0));
        let near = sorting.around(&Waypoint::new(2.0, 0.0, 0.0));
        assert_eq!(near.len(), 3);
        assert!(sorting.remove(WaypointId(1)));
        assert!(!sorting.remove(WaypointId(1)));
        assert_eq!(sorting.len(), 2);
    }
}
