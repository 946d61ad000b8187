//! Points and axes.

use std::fmt;

/// The three world axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub const fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// A point in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Waypoint {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub fn shift(&self, dx: f64, dy: f64, dz: f64) -> Waypoint {
        Waypoint::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn distance(&self, other: &Waypoint) -> f64 {
        self.distance_on_axes(other, &Axis::ALL)
    }

    pub fn distance_on_axes(&self, other: &Waypoint, axes: &[Axis]) -> f64 {
        let axes = if axes.is_empty() { &Axis::ALL } else { axes };
        axes.iter()
            .map(|&a| {
                let d = self.get(a) - other.get(a);
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }

    pub fn distance_on_axis(&self, other: &Waypoint, axis: Axis) -> f64 {
        (self.get(axis) - other.get(axis)).abs()
    }
}

impl fmt::Display for Waypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}
