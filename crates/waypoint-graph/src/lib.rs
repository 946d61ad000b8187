//! Spatial waypoint graph for movement planning.
//!
//! Waypoints are plain 3D points kept in an arena [`Graph`]; proximity
//! queries go through [`SpatialSorting`], which keeps points ordered along
//! the most discriminating axis so neighborhood scans touch a narrow window
//! instead of the whole set. [`MapGraph`] layers the map-building policy on
//! top: merge near-duplicates, connect neighbors, and answer path queries
//! with a [`Path`] follower.
//!
//! # Architecture
//!
//! - [`Waypoint`]/[`Axis`]: point arithmetic
//! - [`SpatialRule`]: per-axis distance box plus arbitrary constraints
//! - [`SpatialSorting`]: windowed nearest/around queries
//! - [`Graph`]: arena of nodes and directed edges, with traversal
//! - [`MapGraph`]: merge/connect/reach policy and path construction
//! - [`Path`]: step-by-step follower toward a destination

pub mod graph;
pub mod map;
pub mod path;
pub mod rule;
pub mod sorting;
pub mod waypoint;

pub use graph::{Graph, Traversal, WaypointId};
pub use map::MapGraph;
pub use path::Path;
pub use rule::SpatialRule;
pub use sorting::{SortedEntry, SpatialSorting};
pub use waypoint::{Axis, Waypoint};
