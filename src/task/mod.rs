//! Generic task lifecycle and per-agent bookkeeping (§3 "Task (instance)",
//! §4.3 Task Manager).
//!
//! Tasks form a tree, but per §9's "Back-references" note, child/parent
//! links are **non-owning indices** (`TaskInstanceId`), not owned pointers —
//! each task kind lives in its own arena on `TaskManager`, the way the
//! teacher keeps `Chunk`s in a `ChunkManager`-owned map rather than as Rust
//! references chasing each other. Dynamic dispatch by kind (§9) is a closed
//! tagged variant: `TaskManager` has one arena field per task kind and a
//! small set of free functions match on which arena a `TaskInstanceId`
//! belongs to.

pub mod complete_area;
pub mod deconstruct_chunk;
pub mod get_walking_path;
pub mod scan_areas;
pub mod walk_path;
pub mod walk_to_location;

pub use complete_area::{CompleteAreaAgentState, CompleteAreaTask};
pub use deconstruct_chunk::{DeconstructChunkAgentState, DeconstructChunkTask};
pub use get_walking_path::{GetWalkingPathAgentState, GetWalkingPathResult, GetWalkingPathTask};
pub use scan_areas::ScanAreasTask;
pub use walk_path::{WalkPathAgentState, WalkPathTask};
pub use walk_to_location::{WalkToLocationAgentState, WalkToLocationTask};

use bevy::prelude::*;
use std::collections::HashMap;

use crate::ids::{IdCounter, JobId, TaskInstanceId};

/// Top-level per-agent state shared by every task kind (§3 "Per-agent task
/// state"). Task kinds that need more than this extend their own
/// `*AgentState` struct (e.g. `WalkToLocationAgentState` carries `NoPath`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentTaskStatus {
    Active,
    Completed,
    Stuck,
    NoPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Warning,
}

/// `(ticksToWait, stateDetails)` returned by every `Progress` call (§4.1).
#[derive(Debug, Clone)]
pub struct ProgressResult {
    pub ticks_to_wait: u32,
    pub state: Option<StateDetails>,
}

impl ProgressResult {
    pub fn wait(ticks: u32, text: impl Into<String>, severity: Severity) -> Self {
        Self {
            ticks_to_wait: ticks,
            state: Some(StateDetails {
                text: text.into(),
                severity,
            }),
        }
    }

    pub fn silent(ticks: u32) -> Self {
        Self {
            ticks_to_wait: ticks,
            state: None,
        }
    }

    /// A task returning `ticksToWait = 0` consents to same-tick re-entry
    /// (§4.1, §9 "Same-tick re-entry").
    pub fn wants_reentry(&self) -> bool {
        self.ticks_to_wait == 0
    }
}

#[derive(Debug, Clone)]
pub struct StateDetails {
    pub text: String,
    pub severity: Severity,
}

/// Arena + id issuance for every task kind, the engine's single source of
/// truth for the task tree (§4.3).
#[derive(Resource, Default)]
pub struct TaskManager {
    ids: IdCounter<TaskInstanceId>,

    get_walking_path: HashMap<TaskInstanceId, GetWalkingPathTask>,
    walk_path: HashMap<TaskInstanceId, WalkPathTask>,
    walk_to_location: HashMap<TaskInstanceId, WalkToLocationTask>,
    scan_areas: HashMap<TaskInstanceId, ScanAreasTask>,
    deconstruct_chunk: HashMap<TaskInstanceId, DeconstructChunkTask>,
    complete_area: HashMap<TaskInstanceId, CompleteAreaTask>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> TaskInstanceId {
        self.ids.issue()
    }

    pub fn insert_get_walking_path(&mut self, task: GetWalkingPathTask) {
        self.get_walking_path.insert(task.id, task);
    }
    pub fn get_walking_path(&self, id: TaskInstanceId) -> Option<&GetWalkingPathTask> {
        self.get_walking_path.get(&id)
    }
    pub fn get_walking_path_mut(&mut self, id: TaskInstanceId) -> Option<&mut GetWalkingPathTask> {
        self.get_walking_path.get_mut(&id)
    }
    pub fn remove_get_walking_path(&mut self, id: TaskInstanceId) -> Option<GetWalkingPathTask> {
        self.get_walking_path.remove(&id)
    }

    pub fn insert_walk_path(&mut self, task: WalkPathTask) {
        self.walk_path.insert(task.id, task);
    }
    pub fn walk_path(&self, id: TaskInstanceId) -> Option<&WalkPathTask> {
        self.walk_path.get(&id)
    }
    pub fn walk_path_mut(&mut self, id: TaskInstanceId) -> Option<&mut WalkPathTask> {
        self.walk_path.get_mut(&id)
    }
    pub fn remove_walk_path(&mut self, id: TaskInstanceId) -> Option<WalkPathTask> {
        self.walk_path.remove(&id)
    }

    pub fn insert_walk_to_location(&mut self, task: WalkToLocationTask) {
        self.walk_to_location.insert(task.id, task);
    }
    pub fn walk_to_location(&self, id: TaskInstanceId) -> Option<&WalkToLocationTask> {
        self.walk_to_location.get(&id)
    }
    pub fn walk_to_location_mut(&mut self, id: TaskInstanceId) -> Option<&mut WalkToLocationTask> {
        self.walk_to_location.get_mut(&id)
    }
    pub fn remove_walk_to_location(&mut self, id: TaskInstanceId) -> Option<WalkToLocationTask> {
        self.walk_to_location.remove(&id)
    }

    pub fn insert_scan_areas(&mut self, task: ScanAreasTask) {
        self.scan_areas.insert(task.id, task);
    }
    pub fn scan_areas(&self, id: TaskInstanceId) -> Option<&ScanAreasTask> {
        self.scan_areas.get(&id)
    }
    pub fn scan_areas_mut(&mut self, id: TaskInstanceId) -> Option<&mut ScanAreasTask> {
        self.scan_areas.get_mut(&id)
    }
    pub fn remove_scan_areas(&mut self, id: TaskInstanceId) -> Option<ScanAreasTask> {
        self.scan_areas.remove(&id)
    }

    pub fn insert_deconstruct_chunk(&mut self, task: DeconstructChunkTask) {
        self.deconstruct_chunk.insert(task.id, task);
    }
    pub fn deconstruct_chunk(&self, id: TaskInstanceId) -> Option<&DeconstructChunkTask> {
        self.deconstruct_chunk.get(&id)
    }
    pub fn deconstruct_chunk_mut(&mut self, id: TaskInstanceId) -> Option<&mut DeconstructChunkTask> {
        self.deconstruct_chunk.get_mut(&id)
    }
    pub fn remove_deconstruct_chunk(&mut self, id: TaskInstanceId) -> Option<DeconstructChunkTask> {
        self.deconstruct_chunk.remove(&id)
    }

    pub fn insert_complete_area(&mut self, task: CompleteAreaTask) {
        self.complete_area.insert(task.id, task);
    }
    pub fn complete_area(&self, id: TaskInstanceId) -> Option<&CompleteAreaTask> {
        self.complete_area.get(&id)
    }
    pub fn complete_area_mut(&mut self, id: TaskInstanceId) -> Option<&mut CompleteAreaTask> {
        self.complete_area.get_mut(&id)
    }
    pub fn remove_complete_area(&mut self, id: TaskInstanceId) -> Option<CompleteAreaTask> {
        self.complete_area.remove(&id)
    }
}

/// Shared task-wide identity fields every task kind carries (§3).
#[derive(Debug, Clone, Copy)]
pub struct TaskHeader {
    pub id: TaskInstanceId,
    pub job: JobId,
    pub parent: Option<TaskInstanceId>,
}

/// Bound used by `max(globalMaxX-globalMinX, globalMaxY-globalMinY)` in
/// §4.8's ring search termination and §8 property 6.
pub fn max_chunk_span(min_x: i32, max_x: i32, min_y: i32, max_y: i32) -> i32 {
    (max_x - min_x).max(max_y - min_y)
}
