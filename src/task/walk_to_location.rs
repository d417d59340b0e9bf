//! WalkToLocation Task (§4.6, composite).
//!
//! Composes GetWalkingPath and WalkPath, retrying on pathfinder timeout and
//! re-planning on a WalkPath stall, the way the teacher's higher-level AI
//! actions compose a pathfind step and a follow-path step rather than one
//! monolithic system.

use bevy::prelude::*;
use std::collections::HashMap;

use super::get_walking_path::GetWalkingPathTask;
use super::walk_path::WalkPathTask;
use super::{AgentTaskStatus, ProgressResult, Severity, TaskManager};
use crate::ids::{AgentId, JobId, TaskInstanceId};
use crate::pathfinding::registry::PathRequestRegistry;
use crate::settings::Settings;
use crate::world_adapter::{CollisionMask, ForceId, Rect, SurfaceId, WorldAdapter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    AwaitingPath,
    /// Waiting out `EndOfTaskWaitTicks` after a pathfinder timeout before a
    /// fresh GetWalkingPath request is submitted.
    RetryCooldown { ticks_remaining: u32 },
    Walking,
}

#[derive(Debug, Clone)]
pub struct WalkToLocationAgentState {
    pub status: AgentTaskStatus,
    stage: Stage,
    /// Whether this task is the primary task of its job for this agent; a
    /// `noPath` outcome here asks the Agent Manager to stand the agent down
    /// (§4.6 step 1).
    pub is_primary: bool,
}

impl WalkToLocationAgentState {
    fn new(is_primary: bool) -> Self {
        Self {
            status: AgentTaskStatus::Active,
            stage: Stage::AwaitingPath,
            is_primary,
        }
    }
}

/// Request that the Agent Manager place `agent` in standby, raised when a
/// primary WalkToLocation hits `noPath` (§4.6 step 1, §4.1).
#[derive(Debug, Clone, Copy)]
pub struct StandbyRequest {
    pub agent: AgentId,
}

pub struct WalkToLocationTask {
    pub id: TaskInstanceId,
    pub job: JobId,
    pub parent: Option<TaskInstanceId>,

    pub surface: SurfaceId,
    pub end_position: Vec2,
    pub closeness_to_end_position: f32,
    pub collision_mask: CollisionMask,
    pub force: ForceId,

    /// Planned children, constructed unconditionally at first progress so
    /// later ticks index deterministically (§4.6).
    pub get_walking_path: TaskInstanceId,
    pub walk_path: TaskInstanceId,

    pub per_agent: HashMap<AgentId, WalkToLocationAgentState>,
}

impl WalkToLocationTask {
    #[allow(clippy::too_many_arguments)]
    pub fn activate(
        id: TaskInstanceId,
        job: JobId,
        parent: Option<TaskInstanceId>,
        surface: SurfaceId,
        end_position: Vec2,
        closeness_to_end_position: f32,
        collision_mask: CollisionMask,
        force: ForceId,
        tasks: &mut TaskManager,
    ) -> Self {
        let get_walking_path_id = tasks.next_id();
        tasks.insert_get_walking_path(GetWalkingPathTask::new(
            get_walking_path_id,
            job,
            Some(id),
            surface,
            end_position,
            closeness_to_end_position,
            collision_mask.clone(),
            force,
        ));
        let walk_path_id = tasks.next_id();
        tasks.insert_walk_path(WalkPathTask::new(walk_path_id, job, Some(id), Vec::new()));

        Self {
            id,
            job,
            parent,
            surface,
            end_position,
            closeness_to_end_position,
            collision_mask,
            force,
            get_walking_path: get_walking_path_id,
            walk_path: walk_path_id,
            per_agent: HashMap::new(),
        }
    }

    pub fn agent_state(&self, agent: AgentId) -> Option<&WalkToLocationAgentState> {
        self.per_agent.get(&agent)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn progress(
        &mut self,
        agent: AgentId,
        entity: Entity,
        is_primary: bool,
        agent_bounding_box: Rect,
        current_position: Vec2,
        tasks: &mut TaskManager,
        registry: &mut PathRequestRegistry,
        settings: &Settings,
        world: &mut dyn WorldAdapter,
    ) -> (ProgressResult, Option<StandbyRequest>) {
        {
            let state = self
                .per_agent
                .entry(agent)
                .or_insert_with(|| WalkToLocationAgentState::new(is_primary));
            if state.status == AgentTaskStatus::Completed || state.status == AgentTaskStatus::NoPath
            {
                return (ProgressResult::silent(0), None);
            }
        }
        let stage = self.per_agent.get(&agent).unwrap().stage;

        match stage {
            Stage::RetryCooldown { ticks_remaining } => {
                if ticks_remaining <= 1 {
                    self.per_agent.get_mut(&agent).unwrap().stage = Stage::AwaitingPath;
                    // Re-enter immediately so AwaitingPath submits a fresh
                    // request this same tick.
                    return self.progress(
                        agent,
                        entity,
                        is_primary,
                        agent_bounding_box,
                        current_position,
                        tasks,
                        registry,
                        settings,
                        world,
                    );
                }
                self.per_agent.get_mut(&agent).unwrap().stage = Stage::RetryCooldown {
                    ticks_remaining: ticks_remaining - 1,
                };
                (
                    ProgressResult::wait(
                        1,
                        "Going to start a new path search",
                        Severity::Warning,
                    ),
                    None,
                )
            }
            Stage::AwaitingPath => {
                let get_walking_path = tasks
                    .get_walking_path_mut(self.get_walking_path)
                    .expect("GetWalkingPath child missing for WalkToLocation");
                let inner = get_walking_path.progress(
                    agent,
                    agent_bounding_box,
                    current_position,
                    entity,
                    registry,
                    world,
                );

                let Some(result) = get_walking_path.agent_state(agent).and_then(|s| {
                    if s.status == AgentTaskStatus::Completed {
                        s.result.clone()
                    } else {
                        None
                    }
                }) else {
                    return (inner, None);
                };

                if result.pathfinder_timeout {
                    get_walking_path.reset_agent(agent, registry);
                    let state = self.per_agent.get_mut(&agent).unwrap();
                    state.stage = Stage::RetryCooldown {
                        ticks_remaining: settings.end_of_task_wait_ticks,
                    };
                    return (
                        ProgressResult::wait(
                            1,
                            "Going to start a new path search",
                            Severity::Warning,
                        ),
                        None,
                    );
                }

                let Some(waypoints) = result.path_found else {
                    let state = self.per_agent.get_mut(&agent).unwrap();
                    state.status = AgentTaskStatus::NoPath;
                    let standby = if state.is_primary {
                        Some(StandbyRequest { agent })
                    } else {
                        None
                    };
                    return (
                        ProgressResult::wait(0, "No path found", Severity::Warning),
                        standby,
                    );
                };

                let walk_path = tasks
                    .walk_path_mut(self.walk_path)
                    .expect("WalkPath child missing for WalkToLocation");
                walk_path.path = waypoints;
                walk_path.per_agent.remove(&agent);

                let state = self.per_agent.get_mut(&agent).unwrap();
                state.stage = Stage::Walking;
                (ProgressResult::wait(0, "Got a path", Severity::Normal), None)
            }
            Stage::Walking => {
                let walk_path = tasks
                    .walk_path_mut(self.walk_path)
                    .expect("WalkPath child missing for WalkToLocation");
                let inner = walk_path.progress(agent, entity, current_position, settings, world);
                let walk_status = walk_path.agent_state(agent).map(|s| s.status);

                match walk_status {
                    Some(AgentTaskStatus::Stuck) => {
                        self.removing_robot_from_task(agent, entity, tasks, registry, world);
                        let state = self
                            .per_agent
                            .entry(agent)
                            .or_insert_with(|| WalkToLocationAgentState::new(is_primary));
                        state.stage = Stage::AwaitingPath;
                        self.progress(
                            agent,
                            entity,
                            is_primary,
                            agent_bounding_box,
                            current_position,
                            tasks,
                            registry,
                            settings,
                            world,
                        )
                    }
                    Some(AgentTaskStatus::Completed) => {
                        let state = self.per_agent.get_mut(&agent).unwrap();
                        state.status = AgentTaskStatus::Completed;
                        (
                            ProgressResult::wait(0, "Robot arrived", Severity::Normal),
                            None,
                        )
                    }
                    _ => (inner, None),
                }
            }
        }
    }

    /// §4.3 `RemovingRobotFromTask`: tears both children's per-agent state
    /// for this agent only; other agents sharing this task are undisturbed.
    pub fn removing_robot_from_task(
        &mut self,
        agent: AgentId,
        entity: Entity,
        tasks: &mut TaskManager,
        registry: &mut PathRequestRegistry,
        world: &mut dyn WorldAdapter,
    ) {
        if let Some(get_walking_path) = tasks.get_walking_path_mut(self.get_walking_path) {
            get_walking_path.removing_robot_from_task(agent, registry);
        }
        if let Some(walk_path) = tasks.walk_path_mut(self.walk_path) {
            walk_path.removing_robot_from_task(agent, entity, world);
        }
        self.per_agent.remove(&agent);
    }

    /// §4.3 `RemovingTask`: full branch teardown.
    pub fn removing_task(
        &mut self,
        agents: &[(AgentId, Entity)],
        tasks: &mut TaskManager,
        registry: &mut PathRequestRegistry,
        world: &mut dyn WorldAdapter,
    ) {
        if let Some(mut get_walking_path) = tasks.remove_get_walking_path(self.get_walking_path) {
            get_walking_path.removing_task(registry);
        }
        if let Some(mut walk_path) = tasks.remove_walk_path(self.walk_path) {
            walk_path.removing_task(agents, world);
        }
        self.per_agent.clear();
    }
}
