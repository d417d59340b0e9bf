//! GetWalkingPath Task (§4.4).
//!
//! Issues a pathfind request, awaits its completion via the Path Request
//! Registry, exposes the result. Mirrors the teacher's
//! `PathRequested`/`PathReady`/`PathFailed` component state machine
//! (`pathfinding/path_components.rs`), but the state lives in this task's
//! own per-agent arena rather than as Bevy components, since §9 models the
//! task tree as manager-owned arenas rather than ECS components.

use bevy::prelude::*;
use std::collections::HashMap;

use super::{AgentTaskStatus, ProgressResult, Severity};
use crate::ids::{AgentId, JobId, PathRequestId, TaskInstanceId};
use crate::pathfinding::registry::{PathRequestRegistry, RequestOwner};
use crate::world_adapter::{
    CollisionMask, ForceId, PathfindRequest, PathfindResult, Rect, SurfaceId, Waypoint,
    WorldAdapter,
};

/// Outcome of a completed path request (§4.4).
#[derive(Debug, Clone)]
pub struct GetWalkingPathResult {
    pub path_found: Option<Vec<Waypoint>>,
    pub pathfinder_timeout: bool,
}

#[derive(Debug, Clone)]
pub struct GetWalkingPathAgentState {
    pub status: AgentTaskStatus,
    pub request_id: Option<PathRequestId>,
    pub result: Option<GetWalkingPathResult>,
}

impl GetWalkingPathAgentState {
    fn new() -> Self {
        Self {
            status: AgentTaskStatus::Active,
            request_id: None,
            result: None,
        }
    }
}

/// Task-wide inputs (§4.4): `endPosition`, `surface`, `closenessToEndPosition`.
pub struct GetWalkingPathTask {
    pub id: TaskInstanceId,
    pub job: JobId,
    pub parent: Option<TaskInstanceId>,
    pub surface: SurfaceId,
    pub end_position: Vec2,
    pub closeness_to_end_position: f32,
    pub collision_mask: CollisionMask,
    pub force: ForceId,
    pub per_agent: HashMap<AgentId, GetWalkingPathAgentState>,
}

impl GetWalkingPathTask {
    pub fn new(
        id: TaskInstanceId,
        job: JobId,
        parent: Option<TaskInstanceId>,
        surface: SurfaceId,
        end_position: Vec2,
        closeness_to_end_position: f32,
        collision_mask: CollisionMask,
        force: ForceId,
    ) -> Self {
        Self {
            id,
            job,
            parent,
            surface,
            end_position,
            closeness_to_end_position,
            collision_mask,
            force,
            per_agent: HashMap::new(),
        }
    }

    pub fn agent_state(&self, agent: AgentId) -> Option<&GetWalkingPathAgentState> {
        self.per_agent.get(&agent)
    }

    /// First/subsequent progress for `agent` (§4.4).
    pub fn progress(
        &mut self,
        agent: AgentId,
        agent_bounding_box: Rect,
        start_position: Vec2,
        ignore_entity: Entity,
        registry: &mut PathRequestRegistry,
        world: &mut dyn WorldAdapter,
    ) -> ProgressResult {
        let state = self
            .per_agent
            .entry(agent)
            .or_insert_with(GetWalkingPathAgentState::new);

        match state.status {
            // §3 invariant 4: once completed, future calls are no-ops.
            AgentTaskStatus::Completed => ProgressResult::silent(0),
            _ => {
                if state.request_id.is_none() {
                    let request = PathfindRequest {
                        bounding_box: agent_bounding_box,
                        collision_mask: self.collision_mask.clone(),
                        start: start_position,
                        goal: self.end_position,
                        force: self.force,
                        radius: self.closeness_to_end_position,
                        ignore_entity,
                        cache: false,
                        prefer_straight_paths: false,
                        no_break: false,
                        high_priority: true,
                        // No caller ever needs a coarser profile than the
                        // adapter's default (§4.4: "default: the engine's
                        // most detailed profile").
                        path_resolution_modifier: 0,
                    };
                    let request_id = world.request_path(request);
                    state.request_id = Some(request_id);
                    registry.register(
                        request_id,
                        RequestOwner {
                            task: self.id,
                            agent,
                        },
                    );
                    debug!(
                        "GetWalkingPath task {:?}: agent {:?} submitted request {:?} -> {:?}",
                        self.id, agent, request_id, self.end_position
                    );
                }
                ProgressResult::wait(1, "Looking for walking path", Severity::Normal)
            }
        }
    }

    /// Apply a world callback correlated to `agent` via the registry (§4.4).
    /// The registry entry itself is removed by the caller (the bridge
    /// system), matching §3 invariant 6.
    pub fn apply_result(&mut self, agent: AgentId, result: PathfindResult) {
        let Some(state) = self.per_agent.get_mut(&agent) else {
            return;
        };
        state.request_id = None;
        state.status = AgentTaskStatus::Completed;
        match result {
            PathfindResult::Found { waypoints } => {
                if waypoints.iter().any(|w| w.needs_destroy_to_reach) {
                    warn!(
                        "GetWalkingPath task {:?}: agent {:?} path requires destructive steps; \
                         destructive path following is not supported",
                        self.id, agent
                    );
                }
                state.result = Some(GetWalkingPathResult {
                    path_found: Some(waypoints),
                    pathfinder_timeout: false,
                });
            }
            PathfindResult::TryAgainLater => {
                state.result = Some(GetWalkingPathResult {
                    path_found: None,
                    pathfinder_timeout: true,
                });
            }
            PathfindResult::NotFound => {
                state.result = Some(GetWalkingPathResult {
                    path_found: None,
                    pathfinder_timeout: false,
                });
            }
        }
    }

    /// Reset one agent so the next `progress` call submits a fresh request
    /// (used by WalkToLocation's timeout retry, §4.6).
    pub fn reset_agent(&mut self, agent: AgentId, registry: &mut PathRequestRegistry) {
        if let Some(state) = self.per_agent.get_mut(&agent) {
            if let Some(request_id) = state.request_id.take() {
                registry.take(request_id);
            }
            *state = GetWalkingPathAgentState::new();
        }
    }

    /// §4.3 `RemovingRobotFromTask`.
    pub fn removing_robot_from_task(&mut self, agent: AgentId, registry: &mut PathRequestRegistry) {
        if let Some(state) = self.per_agent.remove(&agent) {
            if let Some(request_id) = state.request_id {
                registry.take(request_id);
            }
        }
    }

    /// §4.3 `RemovingTask`: full teardown, removes every outstanding
    /// registry entry owned by this task so late callbacks become no-ops
    /// (§8 property 7).
    pub fn removing_task(&mut self, registry: &mut PathRequestRegistry) {
        self.per_agent.clear();
        registry.remove_task(self.id);
    }
}
