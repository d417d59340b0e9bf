//! Persisted debug toggles and tunables (§6.3).
//!
//! Mirrors the shape of the teacher's `SimulationSpeed`/`SimulationState`
//! resources in `simulation/tick.rs`: small, serde-derived, inserted once
//! at plugin build time, mutated by the host (debug UI, commands) rather
//! than by the engine itself.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Debug overlay toggles (§6.3, §4.3, §4.7, §4.8).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DebugSettings {
    /// Render the waypoint list while WalkPath is driving an agent.
    pub show_path_walking: bool,
    /// Render rectangles/bounding boxes while CompleteArea is active.
    pub show_complete_areas: bool,
    /// Divide mining tick delay by 10 (fast-forward testing aid).
    pub fast_deconstruct: bool,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            show_path_walking: false,
            show_complete_areas: false,
            fast_deconstruct: false,
        }
    }
}

/// Top-level engine settings, a Bevy `Resource` (§6.3).
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Whether agents render above-head status text at all (§4.12).
    pub show_robot_state: bool,
    pub debug: DebugSettings,

    /// Ticks to wait before retrying a pathfinder timeout or an exhausted
    /// chunk search (`Robot.EndOfTaskWaitTicks`, default 60, §4.6, §4.8).
    pub end_of_task_wait_ticks: u32,

    /// Batch budget for scan stage 2 dedup (§4.7, default 1000).
    pub entities_deduped_per_batch: usize,
    /// Batch budget for scan stage 3 resolve/index (§4.7, default 100).
    pub entities_handled_per_batch: usize,

    /// Waypoint-arrival tolerance in tiles, checked per axis (§4.5, 0.3).
    pub walk_accuracy: f32,

    /// Fixed tick cost of a mine operation before the prototype-scaled
    /// component is added (§4.8, `DeconstructTimeDelay`, default 30).
    pub deconstruct_time_delay: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_robot_state: true,
            debug: DebugSettings::default(),
            end_of_task_wait_ticks: 60,
            entities_deduped_per_batch: 1_000,
            entities_handled_per_batch: 100,
            walk_accuracy: 0.3,
            deconstruct_time_delay: 30,
        }
    }
}

impl Settings {
    /// Mining tick delay for one entity given its prototype mining_time and
    /// the agent's mining speed (§4.8): `DeconstructTimeDelay + ceil(mining_time * 60 / mining_speed)`.
    pub fn mine_ticks(&self, mining_time: f32, mining_speed: f32) -> u32 {
        let scaled = (mining_time * 60.0 / mining_speed).ceil() as u32;
        let total = self.deconstruct_time_delay + scaled;
        if self.debug.fast_deconstruct {
            (total / 10).max(1)
        } else {
            total
        }
    }
}
