//! Agent Manager (§4.1, the tick loop).
//!
//! Grounded on the teacher's `run_simulation_ticks` (`simulation/tick.rs`):
//! a single system-shaped function driving one discrete step for every
//! live entity it owns, called once per accumulated tick rather than once
//! per frame. Agents here are manager-owned records (not their own ECS
//! components) the way the teacher's `PathfindingQueue` owns `GridPathRequest`
//! records keyed by entity rather than attaching state directly.

use bevy::prelude::*;
use std::collections::HashMap;

use crate::errors::CoreError;
use crate::ids::{AgentId, IdCounter, JobId};
use crate::job::JobManager;
use crate::pathfinding::registry::PathRequestRegistry;
use crate::settings::Settings;
use crate::state_text::AgentStateText;
use crate::task::deconstruct_chunk::AgentMiningStats;
use crate::task::{Severity, TaskManager};
use crate::world_adapter::prototype_cache::PrototypeAttributeCache;
use crate::world_adapter::{CollisionMask, ForceId, Rect, SurfaceId, WorldAdapter, WorldHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingState {
    Active,
    Standby,
}

/// §3 "Agent". `bounding_box`/`collision_mask` are read off the agent's
/// prototype by the host and cached here, the same way the teacher caches
/// movement speed on `MovementSpeed` rather than re-querying a prototype
/// table every tick.
pub struct Agent {
    pub id: AgentId,
    pub entity: Entity,
    pub surface: SurfaceId,
    pub force: ForceId,
    pub master: u32,
    pub bounding_box: Rect,
    pub collision_mask: CollisionMask,
    pub mining_distance: f32,
    pub mining_speed: f32,
    pub color: Color,
    pub display_name: String,

    pub jobs: Vec<JobId>,
    pub scheduling_state: SchedulingState,
    pub busy_until_tick: u64,
}

/// §6.3 "agents indexed by id, with next-id counter".
#[derive(Resource, Default)]
pub struct AgentManager {
    ids: IdCounter<AgentId>,
    agents: HashMap<AgentId, Agent>,
}

impl AgentManager {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        &mut self,
        entity: Entity,
        surface: SurfaceId,
        force: ForceId,
        master: u32,
        bounding_box: Rect,
        collision_mask: CollisionMask,
        mining_distance: f32,
        mining_speed: f32,
        color: Color,
        display_name: impl Into<String>,
    ) -> AgentId {
        let id = self.ids.issue();
        self.agents.insert(
            id,
            Agent {
                id,
                entity,
                surface,
                force,
                master,
                bounding_box,
                collision_mask,
                mining_distance,
                mining_speed,
                color,
                display_name: display_name.into(),
                jobs: Vec::new(),
                scheduling_state: SchedulingState::Active,
                busy_until_tick: 0,
            },
        );
        id
    }

    pub fn get(&self, agent: AgentId) -> Option<&Agent> {
        self.agents.get(&agent)
    }

    /// Appends to the back of the agent's priority list (lowest priority).
    /// Callers wanting a higher-priority job insert at a specific index via
    /// `agent.jobs` directly.
    pub fn assign_job(&mut self, agent: AgentId, job: JobId) {
        if let Some(agent) = self.agents.get_mut(&agent) {
            agent.jobs.push(job);
        }
    }

    pub fn destroy(&mut self, agent: AgentId, state_text: &mut AgentStateText, world: &mut dyn WorldAdapter) {
        self.agents.remove(&agent);
        state_text.remove(agent, world);
    }

    /// Runs one tick: drains the world's path-result queue into whichever
    /// `GetWalkingPathTask` owns each request (§4.10 lifecycle tied to the
    /// engine), then drives every eligible agent (§4.1).
    #[allow(clippy::too_many_arguments)]
    pub fn run_tick(
        &mut self,
        current_tick: u64,
        jobs: &mut JobManager,
        tasks: &mut TaskManager,
        registry: &mut PathRequestRegistry,
        settings: &Settings,
        cache: &mut PrototypeAttributeCache,
        state_text: &mut AgentStateText,
        world: &mut dyn WorldAdapter,
    ) {
        for (request_id, result) in world.poll_path_results() {
            if let Some(owner) = registry.take(request_id) {
                if let Some(get_walking_path) = tasks.get_walking_path_mut(owner.task) {
                    get_walking_path.apply_result(owner.agent, result);
                }
            }
        }

        let eligible: Vec<AgentId> = self
            .agents
            .values()
            .filter(|a| a.scheduling_state == SchedulingState::Active && a.busy_until_tick <= current_tick)
            .map(|a| a.id)
            .collect();

        for agent_id in eligible {
            self.run_agent_tick(agent_id, current_tick, jobs, tasks, registry, settings, cache, state_text, world);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_agent_tick(
        &mut self,
        agent_id: AgentId,
        current_tick: u64,
        jobs: &mut JobManager,
        tasks: &mut TaskManager,
        registry: &mut PathRequestRegistry,
        settings: &Settings,
        cache: &mut PrototypeAttributeCache,
        state_text: &mut AgentStateText,
        world: &mut dyn WorldAdapter,
    ) {
        let mut last_state: Option<(String, Severity)> = None;

        loop {
            let Some(agent) = self.agents.get(&agent_id) else {
                return;
            };
            let Some(&job_id) = agent.jobs.first() else {
                break;
            };
            if jobs.get(job_id).map(|j| j.is_paused()).unwrap_or(true) {
                break;
            }

            let entity = agent.entity;
            let bounding_box = agent.bounding_box;
            let position = world.entity_position(entity).unwrap_or(Vec2::ZERO);
            let stats = AgentMiningStats {
                mining_distance: agent.mining_distance,
                mining_speed: agent.mining_speed,
            };

            let outcome = jobs.progress_job_for_agent(
                job_id,
                agent_id,
                entity,
                bounding_box,
                position,
                stats,
                tasks,
                registry,
                settings,
                cache,
                world,
            );

            let (progress, standby) = match outcome {
                Ok(v) => v,
                Err(err) => {
                    error!("agent {:?}: job {:?} failed: {}", agent_id, job_id, err);
                    break;
                }
            };

            if let Some(agent) = self.agents.get_mut(&agent_id) {
                agent.busy_until_tick = current_tick + progress.ticks_to_wait as u64;
            }
            if let Some(details) = &progress.state {
                last_state = Some((details.text.clone(), details.severity));
            }

            if standby.is_some() {
                if let Some(agent) = self.agents.get_mut(&agent_id) {
                    agent.scheduling_state = SchedulingState::Standby;
                }
                break;
            }

            if jobs.is_job_complete_for_agent(job_id, agent_id) {
                if let Some(agent) = self.agents.get_mut(&agent_id) {
                    if agent.jobs.first() == Some(&job_id) {
                        agent.jobs.remove(0);
                    }
                }
                jobs.remove_agent_from_job(job_id, agent_id, entity, tasks, registry, world);

                if progress.wants_reentry() {
                    continue;
                }
            }
            break;
        }

        let Some(agent) = self.agents.get(&agent_id) else {
            return;
        };
        let (text, severity) = last_state.unwrap_or_else(|| ("Idle".to_string(), Severity::Normal));
        if !settings.show_robot_state {
            return;
        }
        let position = world.entity_position(agent.entity).unwrap_or(Vec2::ZERO);
        state_text.apply(agent_id, agent.surface, agent.entity, position, &text, severity, world);
    }
}

/// Thin result wrapper so callers outside this module can surface job
/// activation failures without reaching into `JobManager` directly.
pub type AgentResult<T> = Result<T, CoreError>;

/// Engine-owned tick counter (§5: "fully deterministic", driven by the
/// host once per world tick). The host's own accumulator decides *when*
/// a tick fires; this resource only counts how many have.
#[derive(Resource, Default)]
pub struct EngineTick(pub u64);

/// The one `Update`-schedule system the core installs: drives
/// `AgentManager::run_tick` for the current tick, then advances the
/// counter. Mirrors the teacher's `run_simulation_ticks`, which is itself
/// gated behind `accumulate_ticks` rather than running every frame — here
/// that gating is left to the host via `run_if(resource_exists::<WorldHandle>)`.
#[allow(clippy::too_many_arguments)]
pub fn run_agent_tick_system(
    mut tick: ResMut<EngineTick>,
    mut agents: ResMut<AgentManager>,
    mut jobs: ResMut<JobManager>,
    mut tasks: ResMut<TaskManager>,
    mut registry: ResMut<PathRequestRegistry>,
    settings: Res<Settings>,
    mut cache: ResMut<PrototypeAttributeCache>,
    mut state_text: ResMut<AgentStateText>,
    mut world: ResMut<WorldHandle>,
) {
    agents.run_tick(
        tick.0,
        &mut jobs,
        &mut tasks,
        &mut registry,
        &settings,
        &mut cache,
        &mut state_text,
        world.0.as_mut(),
    );
    tick.0 += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobKind, JobManager};
    use crate::world_adapter::mock::{MockEntityRecord, MockWorldAdapter};
    use crate::world_adapter::prototype_cache::AttributeValue;

    #[test]
    fn idle_agent_gets_idle_text() {
        let mut world = MockWorldAdapter::new();
        let mut tasks = TaskManager::new();
        let mut registry = PathRequestRegistry::new();
        let settings = Settings::default();
        let mut cache = PrototypeAttributeCache::new();
        let mut jobs = JobManager::new();
        let mut state_text = AgentStateText::new();
        let mut agents = AgentManager::new();

        let entity = world.spawn(MockEntityRecord::default());
        let agent_id = agents.spawn(
            entity,
            SurfaceId(0),
            ForceId(0),
            0,
            Rect::new(Vec2::ZERO, Vec2::ZERO),
            CollisionMask("robot".to_string()),
            5.0,
            1.0,
            Color::WHITE,
            "Agent 1",
        );

        agents.run_tick(0, &mut jobs, &mut tasks, &mut registry, &settings, &mut cache, &mut state_text, &mut world);

        assert_eq!(agents.get(agent_id).unwrap().busy_until_tick, 0);
    }

    #[test]
    fn agent_drives_job_to_completion_across_ticks() {
        let mut world = MockWorldAdapter::new();
        let mut tasks = TaskManager::new();
        let mut registry = PathRequestRegistry::new();
        let settings = Settings::default();
        let mut cache = PrototypeAttributeCache::new();
        let mut jobs = JobManager::new();
        let mut state_text = AgentStateText::new();
        let mut agents = AgentManager::new();

        world.spawn(MockEntityRecord {
            position: Vec2::new(3.0, 3.0),
            name: "tree".to_string(),
            to_be_deconstructed: true,
            deconstruct_order_force: Some(ForceId(0)),
            neutral: true,
            ..Default::default()
        });
        world.set_prototype_attribute("entity", "tree", "mining_time", AttributeValue::F32(1.0));

        let entity = world.spawn(MockEntityRecord {
            position: Vec2::new(3.0, 3.0),
            ..Default::default()
        });
        let agent_id = agents.spawn(
            entity,
            SurfaceId(0),
            ForceId(0),
            0,
            Rect::new(Vec2::ZERO, Vec2::ZERO),
            CollisionMask("robot".to_string()),
            5.0,
            1.0,
            Color::WHITE,
            "Agent 1",
        );

        let job_id = jobs.create(
            JobKind::CompleteArea {
                surface: SurfaceId(0),
                areas_to_complete: vec![Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0))],
                force: ForceId(0),
                collision_mask: CollisionMask("robot".to_string()),
            },
            0,
        );
        agents.assign_job(agent_id, job_id);

        for tick in 0..6u64 {
            agents.run_tick(tick, &mut jobs, &mut tasks, &mut registry, &settings, &mut cache, &mut state_text, &mut world);
        }

        assert!(agents.get(agent_id).unwrap().jobs.is_empty());
    }
}
