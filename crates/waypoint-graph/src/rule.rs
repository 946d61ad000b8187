//! Proximity rules: a per-axis distance box plus arbitrary constraints.

use std::fmt;
use std::sync::Arc;

use crate::waypoint::{Axis, Waypoint};

type Constraint = dyn Fn(&Waypoint, &Waypoint) -> f64 + Send + Sync;

/// Two points are "near" when they fall within the rule's per-axis box and
/// every extra constraint scores them non-negative.
#[derive(Clone)]
pub struct SpatialRule {
    max_distance: [f64; 3],
    constraints: Vec<Arc<Constraint>>,
}

impl SpatialRule {
    pub fn new(max_x: f64, max_y: f64, max_z: f64) -> Self {
        Self {
            max_distance: [max_x, max_y, max_z],
            constraints: Vec::new(),
        }
    }

    /// Same box size on every axis.
    pub fn cube(max: f64) -> Self {
        Self::new(max, max, max)
    }

    pub fn constraint(
        mut self,
        f: impl Fn(&Waypoint, &Waypoint) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.constraints.push(Arc::new(f));
        self
    }

    /// Caps the euclidean distance on top of the per-axis box.
    pub fn no_further_than(self, max: f64) -> Self {
        self.constraint(move |a, b| {
            let d = a.distance(b);
            if d > max { -1.0 } else { max - d }
        })
    }

    /// Caps the horizontal distance, ignoring elevation.
    pub fn no_further_than_xz(self, max: f64) -> Self {
        self.constraint(move |a, b| {
            let d = a.distance_on_axes(b, &[Axis::X, Axis::Z]);
            if d > max { -1.0 } else { max - d }
        })
    }

    pub fn max_distance(&self, axis: Axis) -> f64 {
        self.max_distance[axis.index()]
    }

    pub fn is_near(&self, a: &Waypoint, b: &Waypoint) -> bool {
        for axis in Axis::ALL {
            if !self.is_near_by_axis(a, b, axis) {
                return false;
            }
        }
        self.constraints.iter().all(|c| c(a, b) >= 0.0)
    }

    pub fn is_near_by_axis(&self, a: &Waypoint, b: &Waypoint, axis: Axis) -> bool {
        a.distance_on_axis(b, axis) <= self.max_distance(axis)
    }

    pub fn is_near_by_axes(&self, a: &Waypoint, b: &Waypoint, axes: &[Axis]) -> bool {
        !axes.is_empty() && axes.iter().all(|&axis| self.is_near_by_axis(a, b, axis))
    }

    /// Index of the first point whose `axis` coordinate is within reach of
    /// `lookup`, in a list sorted ascending on that coordinate.
    pub fn first_in_range(
        &self,
        sorted_coords: &[f64],
        axis: Axis,
        lookup: &Waypoint,
        distance: Option<f64>,
    ) -> Option<usize> {
        let distance = distance.unwrap_or_else(|| self.max_distance(axis));
        let threshold = lookup.get(axis) - distance;
        let idx = sorted_coords.partition_point(|&c| c < threshold);
        (idx < sorted_coords.len()).then_some(idx)
    }
}

impl fmt::Debug for SpatialRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialRule")
            .field("max_distance", &self.max_distance)
            .field("constraints", &self.constraints.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_and_constraint_both_gate() {
        let rule = SpatialRule::cube(3.0).no_further_than(4.0);
        let origin = Waypoint::default();
        assert!(rule.is_near(&origin, &Waypoint::new(2.0, 2.0, 2.0)));
        // inside the box but beyond the euclidean cap
        assert!(!rule.is_near(&origin, &Waypoint::new(3.0, 3.0, 3.0)));
        // outside the box on one axis
        assert!(!rule.is_near(&origin, &Waypoint::new(3.5, 0.0, 0.0)));
    }

    #[test]
    fn first_in_range_finds_window_start() {
        let rule = SpatialRule::cube(2.0);
        let coords = [1.0, 3.0, 5.0, 9.0];
        let lookup = Waypoint::new(5.0, 0.0, 0.0);
        assert_eq!(rule.first_in_range(&coords, Axis::X, &lookup, None), Some(1));
        let lookup = Waypoint::new(20.0, 0.0, 0.0);
        assert_eq!(rule.first_in_range(&coords, Axis::X, &lookup, None), None);
        let lookup = Waypoint::new(0.0, 0.0, 0.0);
        assert_eq!(
            rule.first_in_range(&coords, Axis::X, &lookup, Some(0.0)),
            Some(0)
        );
    }
}
