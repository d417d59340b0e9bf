//! DeconstructEntitiesInChunkDetails Task (§4.8).
//!
//! Assigns chunks to agents via a ring search biased outward from the job's
//! bounding-box center, then drives each agent's pathfind→mine inner loop,
//! mutating the shared scanned plan as entities come down — the spatial
//! counterpart of the teacher's `ChunkManager` load-distance ring walk
//! (`tilemap/chunk_manager.rs`), but searching for *available work* instead
//! of *unloaded terrain*.

use bevy::prelude::*;
use std::collections::HashMap;

use super::walk_to_location::{StandbyRequest, WalkToLocationTask};
use super::{max_chunk_span, AgentTaskStatus, ProgressResult, Severity, TaskManager};
use crate::errors::CoreError;
use crate::ids::{AgentId, JobId, StableEntityId, TaskInstanceId};
use crate::pathfinding::registry::PathRequestRegistry;
use crate::plan::{ChunkPosition, ScannedActionPlan};
use crate::settings::Settings;
use crate::world_adapter::prototype_cache::PrototypeAttributeCache;
use crate::world_adapter::{CollisionMask, ForceId, MineResult, Rect, SurfaceId, WorldAdapter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Available,
    Assigned(AgentId),
    Completed,
}

#[derive(Debug, Clone)]
pub struct DeconstructChunkAgentState {
    pub assigned_chunk: Option<ChunkPosition>,
    pub current_target: Option<StableEntityId>,
    pub walk_task: Option<TaskInstanceId>,
    /// Stamped on every `progress` call so the task can tear this agent's
    /// embedded walk child down even on a tick where it isn't the one
    /// calling in (e.g. the plan drains out from under a different agent
    /// while this one is still mid-walk, §3 invariant 6).
    pub entity: Option<Entity>,
}

impl Default for DeconstructChunkAgentState {
    fn default() -> Self {
        Self {
            assigned_chunk: None,
            current_target: None,
            walk_task: None,
            entity: None,
        }
    }
}

/// Per-agent inputs the task cannot derive on its own (§3 `Agent`:
/// "cached mining distance / mining speed").
#[derive(Debug, Clone, Copy)]
pub struct AgentMiningStats {
    pub mining_distance: f32,
    pub mining_speed: f32,
}

pub struct DeconstructChunkTask {
    pub id: TaskInstanceId,
    pub job: JobId,
    pub parent: Option<TaskInstanceId>,

    pub surface: SurfaceId,
    pub force: ForceId,
    pub collision_mask: CollisionMask,
    pub starting_chunk: ChunkPosition,
    pub job_bbox_center: ChunkPosition,

    pub plan: ScannedActionPlan,
    chunks_state: HashMap<ChunkPosition, ChunkState>,

    pub per_agent: HashMap<AgentId, DeconstructChunkAgentState>,
    completed: bool,
}

impl DeconstructChunkTask {
    pub fn activate(
        id: TaskInstanceId,
        job: JobId,
        parent: Option<TaskInstanceId>,
        surface: SurfaceId,
        force: ForceId,
        collision_mask: CollisionMask,
        starting_chunk: ChunkPosition,
        job_bbox_center: ChunkPosition,
        plan: ScannedActionPlan,
    ) -> Self {
        let chunks_state = plan
            .chunks
            .iter()
            .filter(|(_, details)| !details.is_deconstruct_empty())
            .map(|(pos, _)| (*pos, ChunkState::Available))
            .collect();

        let completed = plan.is_deconstruct_empty();

        Self {
            id,
            job,
            parent,
            surface,
            force,
            collision_mask,
            starting_chunk,
            job_bbox_center,
            plan,
            chunks_state,
            per_agent: HashMap::new(),
            completed,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn agent_state(&self, agent: AgentId) -> Option<&DeconstructChunkAgentState> {
        self.per_agent.get(&agent)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn progress(
        &mut self,
        agent: AgentId,
        entity: Entity,
        agent_bounding_box: Rect,
        agent_position: Vec2,
        stats: AgentMiningStats,
        tasks: &mut TaskManager,
        registry: &mut PathRequestRegistry,
        settings: &Settings,
        cache: &mut PrototypeAttributeCache,
        world: &mut dyn WorldAdapter,
    ) -> Result<(ProgressResult, Option<StandbyRequest>), CoreError> {
        if self.completed {
            return Ok((ProgressResult::silent(0), None));
        }
        self.per_agent.entry(agent).or_default().entity = Some(entity);

        // --- 1. Chunk acquisition -------------------------------------
        let needs_chunk = match self.per_agent.get(&agent).and_then(|s| s.assigned_chunk) {
            Some(chunk) => self.chunks_state.get(&chunk) == Some(&ChunkState::Completed),
            None => true,
        };
        if needs_chunk {
            let search_from = self
                .per_agent
                .get(&agent)
                .and_then(|s| s.assigned_chunk)
                .unwrap_or(self.starting_chunk);
            match self.find_available_chunk_for_robot(search_from) {
                Some(chunk) => {
                    self.chunks_state.insert(chunk, ChunkState::Assigned(agent));
                    self.per_agent.entry(agent).or_default().assigned_chunk = Some(chunk);
                }
                None => {
                    return Ok((
                        ProgressResult::wait(
                            settings.end_of_task_wait_ticks,
                            "Waiting for an available chunk",
                            Severity::Normal,
                        ),
                        None,
                    ));
                }
            }
        }

        let assigned_chunk = self.per_agent[&agent].assigned_chunk.unwrap();

        // --- 2. Target selection ---------------------------------------
        if self.per_agent[&agent].current_target.is_none() {
            let nearest = self
                .plan
                .chunks
                .get(&assigned_chunk)
                .map(|details| details.to_be_deconstructed.keys().copied().collect::<Vec<_>>())
                .unwrap_or_default()
                .into_iter()
                .filter_map(|stable_id| {
                    self.plan
                        .flat_deconstruct
                        .get(&stable_id)
                        .map(|d| (stable_id, d.position))
                })
                .min_by(|(_, a), (_, b)| {
                    a.distance_squared(agent_position)
                        .partial_cmp(&b.distance_squared(agent_position))
                        .unwrap()
                });

            match nearest {
                Some((stable_id, _)) => {
                    self.per_agent.get_mut(&agent).unwrap().current_target = Some(stable_id);
                }
                None => {
                    self.chunks_state.insert(assigned_chunk, ChunkState::Completed);
                    if self.plan.is_deconstruct_empty() {
                        self.completed = true;
                        self.teardown_other_agents(agent, tasks, registry, world);
                    }
                    return self.progress(
                        agent,
                        entity,
                        agent_bounding_box,
                        agent_position,
                        stats,
                        tasks,
                        registry,
                        settings,
                        cache,
                        world,
                    );
                }
            }
        }

        let target_id = self.per_agent[&agent].current_target.unwrap();
        let Some(target) = self.plan.flat_deconstruct.get(&target_id).cloned() else {
            // Target vanished from the plan between selection and use
            // (another agent reached it first). Drop it and re-select.
            self.per_agent.get_mut(&agent).unwrap().current_target = None;
            return self.progress(
                agent,
                entity,
                agent_bounding_box,
                agent_position,
                stats,
                tasks,
                registry,
                settings,
                cache,
                world,
            );
        };

        // --- 3. Mine or walk ---------------------------------------------
        let walking = self.per_agent[&agent].walk_task.is_some();
        let within_range = agent_position.distance(target.position) <= stats.mining_distance;

        if !walking && within_range {
            // The target may have been destroyed by something else between
            // selection and this tick. Drop it from the plan without mining
            // and re-select in the same call rather than leaving it behind
            // to be picked again next tick.
            if !world.entity_valid(target.entity) {
                self.drop_target_from_plan(target_id, assigned_chunk, agent, tasks, registry, world);
                return self.progress(
                    agent,
                    entity,
                    agent_bounding_box,
                    agent_position,
                    stats,
                    tasks,
                    registry,
                    settings,
                    cache,
                    world,
                );
            }

            let mining_time = cache
                .get_or_fetch("entity", &target.name, "mining_time", || {
                    world.prototype_attribute("entity", &target.name, "mining_time")
                })
                .and_then(|v| v.as_f32())
                .unwrap_or(1.0);
            let ticks_to_wait = settings.mine_ticks(mining_time, stats.mining_speed);

            let result: MineResult = world.mine_entity(target.entity, entity);
            if !result.all_items_fit {
                return Err(CoreError::deconstruct(format!(
                    "agent {:?} inventory overflowed mining {:?}",
                    agent, target.stable_id
                )));
            }
            if !result.ok {
                // Mining itself refused (e.g. the entity went invalid in the
                // same tick `mine_entity` ran). Drop it the same way so the
                // plan still drains instead of re-selecting this target
                // forever.
                self.drop_target_from_plan(target_id, assigned_chunk, agent, tasks, registry, world);
                return Ok((
                    ProgressResult::wait(1, "Deconstruction target no longer valid", Severity::Normal),
                    None,
                ));
            }

            self.plan.remove_deconstruct_entity(target_id);
            let agent_state = self.per_agent.get_mut(&agent).unwrap();
            agent_state.current_target = None;

            let chunk_empty = self
                .plan
                .chunks
                .get(&assigned_chunk)
                .map(|d| d.is_deconstruct_empty())
                .unwrap_or(true);
            if chunk_empty {
                self.chunks_state.insert(assigned_chunk, ChunkState::Completed);
                if self.plan.is_deconstruct_empty() {
                    self.completed = true;
                    self.teardown_other_agents(agent, tasks, registry, world);
                }
            }

            return Ok((
                ProgressResult::wait(ticks_to_wait, "Deconstruction completed", Severity::Normal),
                None,
            ));
        }

        // Walking branch: spawn the embedded WalkToLocation child if absent.
        let walk_task_id = match self.per_agent[&agent].walk_task {
            Some(id) => id,
            None => {
                let walk_id = tasks.next_id();
                let walk = WalkToLocationTask::activate(
                    walk_id,
                    self.job,
                    Some(self.id),
                    self.surface,
                    target.position,
                    (stats.mining_distance - 1.0).max(0.0),
                    self.collision_mask.clone(),
                    self.force,
                    tasks,
                );
                tasks.insert_walk_to_location(walk);
                self.per_agent.get_mut(&agent).unwrap().walk_task = Some(walk_id);
                walk_id
            }
        };

        // Remove the child from its arena for the duration of this call:
        // it needs `&mut TaskManager` itself (to reach its own
        // GetWalkingPath/WalkPath children), and it cannot be both that
        // borrow's target and a live argument at once.
        let mut walk_to_location = tasks
            .remove_walk_to_location(walk_task_id)
            .expect("embedded WalkToLocation missing for DeconstructChunk agent");
        let (inner, standby) = walk_to_location.progress(
            agent,
            entity,
            false,
            agent_bounding_box,
            agent_position,
            tasks,
            registry,
            settings,
            world,
        );
        let status = walk_to_location.agent_state(agent).map(|s| s.status);

        match status {
            Some(AgentTaskStatus::Completed) => {
                walk_to_location.removing_robot_from_task(agent, entity, tasks, registry, world);
                tasks.insert_walk_to_location(walk_to_location);
                self.per_agent.get_mut(&agent).unwrap().walk_task = None;
                self.progress(
                    agent,
                    entity,
                    agent_bounding_box,
                    agent_position,
                    stats,
                    tasks,
                    registry,
                    settings,
                    cache,
                    world,
                )
            }
            Some(AgentTaskStatus::NoPath) => {
                walk_to_location.removing_robot_from_task(agent, entity, tasks, registry, world);
                tasks.insert_walk_to_location(walk_to_location);
                let agent_state = self.per_agent.get_mut(&agent).unwrap();
                agent_state.walk_task = None;
                agent_state.current_target = None;
                Ok((
                    ProgressResult::wait(1, "Deconstruction target unreachable", Severity::Warning),
                    None,
                ))
            }
            _ => {
                tasks.insert_walk_to_location(walk_to_location);
                Ok((
                    ProgressResult {
                        ticks_to_wait: inner.ticks_to_wait,
                        state: Some(super::StateDetails {
                            text: format!(
                                "Pathing to deconstruction target: {}",
                                inner
                                    .state
                                    .map(|s| s.text)
                                    .unwrap_or_else(|| "walking".to_string())
                            ),
                            severity: Severity::Normal,
                        }),
                    },
                    standby,
                ))
            }
        }
    }

    /// Drop a target that turned out to be unmineable from both plan maps
    /// (§9 open question: entity invalid mid-plan), clear the agent's
    /// current target, and complete the chunk/task/teardown exactly as a
    /// successful mine would once the plan drains (§3 invariant 2).
    fn drop_target_from_plan(
        &mut self,
        target_id: StableEntityId,
        assigned_chunk: ChunkPosition,
        agent: AgentId,
        tasks: &mut TaskManager,
        registry: &mut PathRequestRegistry,
        world: &mut dyn WorldAdapter,
    ) {
        self.plan.remove_deconstruct_entity(target_id);
        self.per_agent.get_mut(&agent).unwrap().current_target = None;

        let chunk_empty = self
            .plan
            .chunks
            .get(&assigned_chunk)
            .map(|d| d.is_deconstruct_empty())
            .unwrap_or(true);
        if chunk_empty {
            self.chunks_state.insert(assigned_chunk, ChunkState::Completed);
            if self.plan.is_deconstruct_empty() {
                self.completed = true;
                self.teardown_other_agents(agent, tasks, registry, world);
            }
        }
    }

    /// `FindAvailableChunkForRobot` (§4.8).
    fn find_available_chunk_for_robot(&self, search_from: ChunkPosition) -> Option<ChunkPosition> {
        if self.chunks_state.get(&self.starting_chunk) == Some(&ChunkState::Available) {
            return Some(self.starting_chunk);
        }

        let (min_x, max_x, min_y, max_y) = self.plan.index.chunks().fold(
            (i32::MAX, i32::MIN, i32::MAX, i32::MIN),
            |(lox, hix, loy, hiy), c| {
                (lox.min(c.x), hix.max(c.x), loy.min(c.y), hiy.max(c.y))
            },
        );
        let max_span = max_chunk_span(min_x, max_x, min_y, max_y).max(1);

        let sign_x = if search_from.x < self.job_bbox_center.x {
            -1
        } else {
            1
        };
        let sign_y = if search_from.y < self.job_bbox_center.y {
            -1
        } else {
            1
        };

        for radius in 1..=max_span {
            let mut ring: Vec<(i32, i32)> = Vec::new();
            for dx in -radius..=radius {
                for dy in -radius..=radius {
                    if dx.abs().max(dy.abs()) == radius {
                        ring.push((dx, dy));
                    }
                }
            }
            // Outward-biased ordering: candidates whose offset points away
            // from the job's bounding-box center sort first.
            ring.sort_by_key(|(dx, dy)| -(sign_x * dx + sign_y * dy));

            for (dx, dy) in ring {
                let candidate = ChunkPosition::new(search_from.x + dx, search_from.y + dy);
                if self.chunks_state.get(&candidate) == Some(&ChunkState::Available) {
                    return Some(candidate);
                }
            }
        }
        None
    }

    pub fn removing_robot_from_task(
        &mut self,
        agent: AgentId,
        entity: Entity,
        tasks: &mut TaskManager,
        registry: &mut PathRequestRegistry,
        world: &mut dyn WorldAdapter,
    ) {
        if let Some(state) = self.per_agent.remove(&agent) {
            if let Some(chunk) = state.assigned_chunk {
                if self.chunks_state.get(&chunk) == Some(&ChunkState::Assigned(agent)) {
                    self.chunks_state.insert(chunk, ChunkState::Available);
                }
            }
            if let Some(walk_id) = state.walk_task {
                if let Some(mut walk) = tasks.remove_walk_to_location(walk_id) {
                    walk.removing_robot_from_task(agent, entity, tasks, registry, world);
                    tasks.insert_walk_to_location(walk);
                }
            }
        }
    }

    /// Called once this task has decided to complete. Any other agent still
    /// mid-walk on a now-abandoned target would otherwise be orphaned: this
    /// task is about to be dropped wholesale by its caller, taking the
    /// `walk_task` reference with it while the child itself keeps living in
    /// `TaskManager`'s arena forever (§3 invariant 6, §5 cancellation).
    fn teardown_other_agents(
        &mut self,
        except: AgentId,
        tasks: &mut TaskManager,
        registry: &mut PathRequestRegistry,
        world: &mut dyn WorldAdapter,
    ) {
        let others: Vec<AgentId> = self
            .per_agent
            .keys()
            .copied()
            .filter(|a| *a != except)
            .collect();
        for other in others {
            let state = self.per_agent.get_mut(&other).expect("collected from per_agent above");
            let walk_id = match state.walk_task.take() {
                Some(id) => id,
                None => continue,
            };
            state.current_target = None;
            let entity = match state.entity {
                Some(e) => e,
                None => continue,
            };
            if let Some(mut walk) = tasks.remove_walk_to_location(walk_id) {
                walk.removing_robot_from_task(other, entity, tasks, registry, world);
            }
        }
    }
}
