//! File persistence for shared reuse timers and waypoint maps.
//!
//! Timers survive restarts so long-reuse abilities are not re-cast just
//! because the scheduler came back up. Saves go through a temp file and an
//! atomic rename, so a crash mid-write leaves the previous snapshot intact.

use std::fs;
use std::path::{Path, PathBuf};

use combat_core::{AbilityKey, SharedTimerRegistry, SharedTimers};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use waypoint_graph::{Graph, Waypoint, WaypointId};

use crate::error::StoreError;

const TIMER_FILE: &str = "timers.json";

fn default_data_dir() -> Result<PathBuf, StoreError> {
    directories::ProjectDirs::from("", "", "combat-scheduler")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(StoreError::NoDataDir)
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp = path.with_extension("json.tmp");
    fs::write(&temp, bytes)?;
    fs::rename(&temp, path)?;
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct TimerRecord {
    key: AbilityKey,
    timers: SharedTimers,
}

/// Persists the shared reuse timers of every known ability.
pub struct TimerStore {
    base_dir: PathBuf,
}

impl TimerStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Store rooted in the platform data directory.
    pub fn open_default() -> Result<Self, StoreError> {
        Ok(Self::new(default_data_dir()?))
    }

    fn path(&self) -> PathBuf {
        self.base_dir.join(TIMER_FILE)
    }

    pub fn save(&self, registry: &SharedTimerRegistry) -> Result<(), StoreError> {
        let records: Vec<TimerRecord> = registry
            .export()
            .into_iter()
            .map(|(key, timers)| TimerRecord { key, timers })
            .collect();
        let bytes = serde_json::to_vec_pretty(&records)?;
        let path = self.path();
        write_atomically(&path, &bytes)?;
        debug!(path = %path.display(), count = records.len(), "saved shared timers");
        Ok(())
    }

    /// Loads persisted timers into `registry`. A missing or unreadable file
    /// is a fresh start, not an error.
    pub fn load_into(&self, registry: &SharedTimerRegistry) {
        let path = self.path();
        if !path.exists() {
            return;
        }
        let records: Vec<TimerRecord> = match fs::read(&path)
            .map_err(StoreError::from)
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(StoreError::from))
        {
            Ok(records) => records,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable timer snapshot");
                return;
            }
        };
        let count = records.len();
        for record in records {
            registry.restore(record.key, record.timers);
        }
        debug!(path = %path.display(), count, "restored shared timers");
    }
}

#[derive(Serialize, Deserialize)]
struct GraphNode {
    x: f64,
    y: f64,
    z: f64,
    info: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct GraphRecord {
    nodes: Vec<GraphNode>,
    edges: Vec<[usize; 2]>,
}

/// Persists named waypoint graphs, one JSON file per zone.
pub struct GraphStore {
    base_dir: PathBuf,
}

impl GraphStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn open_default() -> Result<Self, StoreError> {
        Ok(Self::new(default_data_dir()?.join("graphs")))
    }

    fn path(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{name}.json"))
    }

    pub fn save(&self, name: &str, graph: &Graph) -> Result<(), StoreError> {
        let mut ids = Vec::new();
        let mut nodes = Vec::new();
        for (id, waypoint, info) in graph.waypoints() {
            ids.push(id);
            nodes.push(GraphNode {
                x: waypoint.x,
                y: waypoint.y,
                z: waypoint.z,
                info: info.map(str::to_owned),
            });
        }
        let index_of = |id: WaypointId| ids.iter().position(|known| *known == id);
        let edges = graph
            .edges()
            .filter_map(|(from, to)| Some([index_of(from)?, index_of(to)?]))
            .collect();
        let record = GraphRecord { nodes, edges };
        let bytes = serde_json::to_vec_pretty(&record)?;
        let path = self.path(name);
        write_atomically(&path, &bytes)?;
        debug!(path = %path.display(), "saved waypoint graph");
        Ok(())
    }

    pub fn load(&self, name: &str) -> Result<Option<Graph>, StoreError> {
        let path = self.path(name);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let record: GraphRecord = serde_json::from_slice(&bytes)?;
        let mut graph = Graph::new();
        let ids: Vec<WaypointId> = record
            .nodes
            .into_iter()
            .map(|node| graph.add_with_info(Waypoint::new(node.x, node.y, node.z), node.info))
            .collect();
        for [from, to] in record.edges {
            if let (Some(from), Some(to)) = (ids.get(from), ids.get(to)) {
                graph.unidirectional_edge(*from, *to);
            }
        }
        debug!(path = %path.display(), "loaded waypoint graph");
        Ok(Some(graph))
    }
}
