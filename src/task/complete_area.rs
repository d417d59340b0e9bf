//! CompleteArea Task (§4.9, top-level composite).
//!
//! Composes Scan -> Deconstruct -> (Upgrade, Build as unimplemented plug-in
//! points), the same sequential-phase composition the teacher uses for
//! `ai/action.rs`'s higher-level actions, just with whole sub-tasks as the
//! phases instead of animation/movement steps.

use bevy::prelude::*;

use super::deconstruct_chunk::{AgentMiningStats, DeconstructChunkTask};
use super::scan_areas::ScanAreasTask;
use super::walk_to_location::StandbyRequest;
use super::{AgentTaskStatus, ProgressResult, Severity, TaskManager};
use crate::errors::CoreError;
use crate::ids::{AgentId, JobId, TaskInstanceId};
use crate::pathfinding::registry::PathRequestRegistry;
use crate::plan::ChunkPosition;
use crate::settings::Settings;
use crate::world_adapter::prototype_cache::PrototypeAttributeCache;
use crate::world_adapter::{CollisionMask, ForceId, Rect, SurfaceId, WorldAdapter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Scanning,
    Deconstructing,
    Done,
}

/// This task has no per-agent divergence of its own (§4.9): every agent
/// just helps drive whichever child is active, and sees the same overall
/// completion state.
#[derive(Debug, Clone, Copy)]
pub struct CompleteAreaAgentState {
    pub status: AgentTaskStatus,
}

pub struct CompleteAreaTask {
    pub id: TaskInstanceId,
    pub job: JobId,
    pub parent: Option<TaskInstanceId>,

    pub surface: SurfaceId,
    pub areas_to_complete: Vec<Rect>,
    pub force: ForceId,
    pub collision_mask: CollisionMask,
    bbox_center: ChunkPosition,

    stage: Stage,
    scan_areas: TaskInstanceId,
    deconstruct_chunk: Option<TaskInstanceId>,
    completed: bool,
}

impl CompleteAreaTask {
    pub fn activate(
        id: TaskInstanceId,
        job: JobId,
        parent: Option<TaskInstanceId>,
        surface: SurfaceId,
        areas_to_complete: Vec<Rect>,
        force: ForceId,
        collision_mask: CollisionMask,
        tasks: &mut TaskManager,
    ) -> Self {
        let scan_id = tasks.next_id();
        tasks.insert_scan_areas(ScanAreasTask::new(
            scan_id,
            job,
            Some(id),
            surface,
            areas_to_complete.clone(),
            force,
        ));

        let bbox_center = bounding_box_center(&areas_to_complete);

        Self {
            id,
            job,
            parent,
            surface,
            areas_to_complete,
            force,
            collision_mask,
            bbox_center,
            stage: Stage::Scanning,
            scan_areas: scan_id,
            deconstruct_chunk: None,
            completed: false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn agent_state(&self, _agent: AgentId) -> CompleteAreaAgentState {
        CompleteAreaAgentState {
            status: if self.completed {
                AgentTaskStatus::Completed
            } else {
                AgentTaskStatus::Active
            },
        }
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

        match self.stage {
            Stage::Scanning => {
                let scan = tasks
                    .scan_areas_mut(self.scan_areas)
                    .expect("Scan child missing for CompleteArea");
                let inner = scan.progress(
                    settings.entities_deduped_per_batch,
                    settings.entities_handled_per_batch,
                    cache,
                    world,
                );

                if !scan.is_completed() {
                    return Ok((inner, None));
                }

                let plan = tasks
                    .remove_scan_areas(self.scan_areas)
                    .expect("Scan child missing for CompleteArea")
                    .plan;

                if plan.is_deconstruct_empty() {
                    self.stage = Stage::Done;
                    self.completed = true;
                    return Ok((
                        ProgressResult::wait(0, "Area complete", Severity::Normal),
                        None,
                    ));
                }

                let starting_chunk = plan.index.corner_nearest_origin().unwrap_or(self.bbox_center);
                let deconstruct_id = tasks.next_id();
                let deconstruct = DeconstructChunkTask::activate(
                    deconstruct_id,
                    self.job,
                    Some(self.id),
                    self.surface,
                    self.force,
                    self.collision_mask.clone(),
                    starting_chunk,
                    self.bbox_center,
                    plan,
                );
                tasks.insert_deconstruct_chunk(deconstruct);
                self.deconstruct_chunk = Some(deconstruct_id);
                self.stage = Stage::Deconstructing;

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

            Stage::Deconstructing => {
                let deconstruct_id = self
                    .deconstruct_chunk
                    .expect("Deconstruct child id missing once Deconstructing");

                // Same arena-self-reference issue as WalkToLocation inside
                // DeconstructChunk: take the child out, drive it freely,
                // put it back before returning.
                let mut deconstruct = tasks
                    .remove_deconstruct_chunk(deconstruct_id)
                    .expect("Deconstruct child missing for CompleteArea");
                let result = deconstruct.progress(
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
                let is_completed = deconstruct.is_completed();
                tasks.insert_deconstruct_chunk(deconstruct);

                let (inner, standby) = result?;

                if is_completed {
                    tasks.remove_deconstruct_chunk(deconstruct_id);
                    self.stage = Stage::Done;
                    self.completed = true;
                }

                Ok((inner, standby))
            }

            Stage::Done => {
                self.completed = true;
                Ok((ProgressResult::silent(0), None))
            }
        }
    }

    /// §4.3 `RemovingTask`: tear down whichever child is currently active.
    pub fn removing_task(
        &mut self,
        agents: &[(AgentId, Entity)],
        tasks: &mut TaskManager,
        registry: &mut PathRequestRegistry,
        world: &mut dyn WorldAdapter,
    ) {
        tasks.remove_scan_areas(self.scan_areas);
        if let Some(deconstruct_id) = self.deconstruct_chunk {
            if let Some(mut deconstruct) = tasks.remove_deconstruct_chunk(deconstruct_id) {
                for (agent, entity) in agents {
                    deconstruct.removing_robot_from_task(*agent, *entity, tasks, registry, world);
                }
            }
        }
    }
}

/// Average of every area rectangle's center, used as the outward-bias
/// reference for the deconstruct ring search when a plan happens to index
/// no chunks yet (degenerate, never hit once scanning has actually run).
fn bounding_box_center(areas: &[Rect]) -> ChunkPosition {
    if areas.is_empty() {
        return ChunkPosition::new(0, 0);
    }
    let sum = areas
        .iter()
        .fold(Vec2::ZERO, |acc, rect| acc + (rect.left_top + rect.right_bottom) * 0.5);
    ChunkPosition::from_world_position(sum / areas.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world_adapter::mock::{MockEntityRecord, MockWorldAdapter};
    use crate::world_adapter::prototype_cache::AttributeValue;

    #[allow(clippy::too_many_arguments)]
    fn drive(
        task: &mut CompleteAreaTask,
        agent: AgentId,
        entity: Entity,
        tasks: &mut TaskManager,
        registry: &mut PathRequestRegistry,
        settings: &Settings,
        cache: &mut PrototypeAttributeCache,
        world: &mut dyn WorldAdapter,
    ) -> ProgressResult {
        task.progress(
            agent,
            entity,
            Rect::new(Vec2::ZERO, Vec2::ZERO),
            Vec2::new(3.0, 3.0),
            AgentMiningStats {
                mining_distance: 5.0,
                mining_speed: 1.0,
            },
            tasks,
            registry,
            settings,
            cache,
            world,
        )
        .unwrap()
        .0
    }

    #[test]
    fn no_deconstructable_entities_completes_after_scan_alone() {
        let mut world = MockWorldAdapter::new();
        let mut tasks = TaskManager::new();
        let mut registry = PathRequestRegistry::new();
        let settings = Settings::default();
        let mut cache = PrototypeAttributeCache::new();

        let agent = AgentId::new(1);
        let entity = world.spawn(MockEntityRecord::default());
        let task_id = tasks.next_id();
        let mut task = CompleteAreaTask::activate(
            task_id,
            JobId::new(1),
            None,
            SurfaceId(0),
            vec![Rect::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0))],
            ForceId(0),
            CollisionMask("robot".to_string()),
            &mut tasks,
        );

        // raw collection, dedup, resolve: nothing found in any pass.
        drive(&mut task, agent, entity, &mut tasks, &mut registry, &settings, &mut cache, &mut world);
        drive(&mut task, agent, entity, &mut tasks, &mut registry, &settings, &mut cache, &mut world);
        drive(&mut task, agent, entity, &mut tasks, &mut registry, &settings, &mut cache, &mut world);

        assert!(task.is_completed());
    }

    #[test]
    fn deconstructable_entity_flows_through_scan_and_deconstruct() {
        let mut world = MockWorldAdapter::new();
        let mut tasks = TaskManager::new();
        let mut registry = PathRequestRegistry::new();
        let settings = Settings::default();
        let mut cache = PrototypeAttributeCache::new();

        world.spawn(MockEntityRecord {
            position: Vec2::new(3.0, 3.0),
            name: "tree".to_string(),
            to_be_deconstructed: true,
            deconstruct_order_force: Some(ForceId(0)),
            neutral: true,
            ..Default::default()
        });
        world.set_prototype_attribute(
            "entity",
            "tree",
            "mining_time",
            AttributeValue::F32(1.0),
        );

        let agent = AgentId::new(1);
        let entity = world.spawn(MockEntityRecord::default());
        let task_id = tasks.next_id();
        let mut task = CompleteAreaTask::activate(
            task_id,
            JobId::new(1),
            None,
            SurfaceId(0),
            vec![Rect::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0))],
            ForceId(0),
            CollisionMask("robot".to_string()),
            &mut tasks,
        );

        // raw collection, dedup -> not yet completed.
        drive(&mut task, agent, entity, &mut tasks, &mut registry, &settings, &mut cache, &mut world);
        drive(&mut task, agent, entity, &mut tasks, &mut registry, &settings, &mut cache, &mut world);
        assert!(!task.is_completed());

        // Resolve completes the scan in this same call; since the agent is
        // already within mining distance of (3, 3), the same-tick recursion
        // into Deconstructing immediately mines the entity too (§9 "same-tick
        // re-entry" — a single external call can cascade multiple stages).
        let result = drive(&mut task, agent, entity, &mut tasks, &mut registry, &settings, &mut cache, &mut world);
        assert_eq!(result.ticks_to_wait, 90);
        assert!(task.is_completed());
    }
}
