//! Job/task execution engine for a fleet of cooperative construction robots.
//!
//! `CoreEnginePlugin` wires the resources the tick loop needs (§6.3
//! "persisted state"); the host owns the `WorldAdapter` implementation,
//! spawns agents/jobs through `AgentManager`/`JobManager`, and drives
//! `AgentManager::run_tick` once per simulation tick.

pub mod agent;
pub mod errors;
pub mod ids;
pub mod job;
pub mod pathfinding;
pub mod plan;
pub mod settings;
pub mod state_text;
pub mod task;
pub mod world_adapter;

use bevy::prelude::*;

pub use agent::{Agent, AgentManager, EngineTick, SchedulingState};
pub use errors::CoreError;
pub use ids::{AgentId, JobId, StableEntityId, TaskInstanceId};
pub use job::{Job, JobKind, JobManager, JobState};
pub use pathfinding::registry::PathRequestRegistry;
pub use settings::Settings;
pub use state_text::AgentStateText;
pub use task::TaskManager;
pub use world_adapter::prototype_cache::PrototypeAttributeCache;
pub use world_adapter::{WorldAdapter, WorldHandle};

/// Installs every resource the engine's tick handler needs, plus the tick
/// system itself (§6.3 "one Update-schedule system gated behind the host's
/// own tick accumulator"). The system only runs once the host inserts a
/// `WorldHandle` — mirroring the teacher's AI systems, which gate on
/// `resource_exists::<WorldLoader>` rather than running before the world is
/// ready.
pub struct CoreEnginePlugin;

impl Plugin for CoreEnginePlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(Settings::default())
            .insert_resource(TaskManager::new())
            .insert_resource(JobManager::new())
            .insert_resource(AgentManager::new())
            .insert_resource(PathRequestRegistry::new())
            .insert_resource(PrototypeAttributeCache::new())
            .insert_resource(AgentStateText::new())
            .insert_resource(EngineTick::default())
            .add_systems(
                Update,
                agent::run_agent_tick_system.run_if(resource_exists::<WorldHandle>),
            );
    }
}
