//! Job Manager (§4.2).
//!
//! Mirrors the teacher's `SimulationPlugin` resource-lifecycle shape: a
//! single `Resource` owning a map keyed by a monotonic id, with explicit
//! creation/removal rather than anything Bevy despawns implicitly. A job
//! holds only its kind-specific immutable input data and a primary-task
//! reference; the actual work lives in `TaskManager`'s arena.

use bevy::prelude::*;
use std::collections::HashSet;

use crate::errors::CoreError;
use crate::ids::{AgentId, IdCounter, JobId, TaskInstanceId};
use crate::pathfinding::registry::PathRequestRegistry;
use crate::settings::Settings;
use crate::task::{CompleteAreaTask, ProgressResult, TaskManager};
use crate::task::deconstruct_chunk::AgentMiningStats;
use crate::task::walk_to_location::StandbyRequest;
use crate::world_adapter::prototype_cache::PrototypeAttributeCache;
use crate::world_adapter::{CollisionMask, ForceId, Rect, SurfaceId, WorldAdapter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Active,
    Completed,
}

/// Kind-specific immutable input data (§3 "Job"). `CompleteArea` is the only
/// kind this core can activate; `Upgrade`/`Build` jobs are out of scope
/// (§9, "Upgrade / Build execution tasks").
#[derive(Debug, Clone)]
pub enum JobKind {
    CompleteArea {
        surface: SurfaceId,
        areas_to_complete: Vec<Rect>,
        force: ForceId,
        collision_mask: CollisionMask,
    },
}

pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub creator: u32,
    pub state: JobState,
    pub primary_task: Option<TaskInstanceId>,
    pub agents: HashSet<AgentId>,
    /// Not one of §3's three job states; gates whether the Agent Manager's
    /// tick loop should walk into this job at all. Resumption is not wired
    /// up automatically (Open Question decision 3 in DESIGN.md) — a paused
    /// job only unpauses via an explicit `resume` call.
    paused: bool,
}

impl Job {
    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

/// §4.2, §6.3 "jobs per player-index, with global next-id counter".
#[derive(Resource, Default)]
pub struct JobManager {
    ids: IdCounter<JobId>,
    jobs: std::collections::HashMap<JobId, Job>,
}

impl JobManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, kind: JobKind, creator: u32) -> JobId {
        let id = self.ids.issue();
        self.jobs.insert(
            id,
            Job {
                id,
                kind,
                creator,
                state: JobState::Pending,
                primary_task: None,
                agents: HashSet::new(),
                paused: false,
            },
        );
        id
    }

    pub fn get(&self, job: JobId) -> Option<&Job> {
        self.jobs.get(&job)
    }

    pub fn remove(&mut self, job: JobId) -> Option<Job> {
        self.jobs.remove(&job)
    }

    pub fn pause(&mut self, job: JobId) {
        if let Some(job) = self.jobs.get_mut(&job) {
            job.paused = true;
        }
    }

    pub fn resume(&mut self, job: JobId) {
        if let Some(job) = self.jobs.get_mut(&job) {
            job.paused = false;
        }
    }

    pub fn is_job_complete_for_agent(&self, job: JobId, _agent: AgentId) -> bool {
        self.jobs
            .get(&job)
            .map(|j| j.state == JobState::Completed)
            .unwrap_or(true)
    }

    /// `ActivateForAgent` + `ProgressPrimaryTask` (§4.1 step 1, §4.2).
    /// On the job's first progress call, constructs the primary task; every
    /// call drives it directly.
    #[allow(clippy::too_many_arguments)]
    pub fn progress_job_for_agent(
        &mut self,
        job_id: JobId,
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
        let job = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| CoreError::job(format!("unknown job {job_id}")))?;

        job.agents.insert(agent);

        let primary_task = match job.primary_task {
            Some(id) => id,
            None => {
                let JobKind::CompleteArea {
                    surface,
                    areas_to_complete,
                    force,
                    collision_mask,
                } = job.kind.clone();
                let task_id = tasks.next_id();
                let task = CompleteAreaTask::activate(
                    task_id,
                    job_id,
                    None,
                    surface,
                    areas_to_complete,
                    force,
                    collision_mask,
                    tasks,
                );
                tasks.insert_complete_area(task);
                job.primary_task = Some(task_id);
                job.state = JobState::Active;
                task_id
            }
        };

        // Same arena-self-reference pattern as DeconstructChunk/WalkToLocation
        // (DESIGN.md decision 5): CompleteArea needs `&mut TaskManager` to
        // drive its own embedded children, so it can't stay borrowed from the
        // arena while we hand the arena to it.
        let mut task = tasks
            .remove_complete_area(primary_task)
            .expect("primary task missing for active job");
        let result = task.progress(
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
        let is_completed = task.is_completed();
        tasks.insert_complete_area(task);

        let (progress, standby) = result?;

        if is_completed {
            if let Some(job) = self.jobs.get_mut(&job_id) {
                job.state = JobState::Completed;
            }
        }

        Ok((progress, standby))
    }

    /// Splices an agent out of a job's participant set (§4.1 step 3, §4.2
    /// "notifies every participating agent"). Does not tear down the
    /// primary task for other still-participating agents.
    #[allow(clippy::too_many_arguments)]
    pub fn remove_agent_from_job(
        &mut self,
        job_id: JobId,
        agent: AgentId,
        entity: Entity,
        tasks: &mut TaskManager,
        registry: &mut PathRequestRegistry,
        world: &mut dyn WorldAdapter,
    ) {
        let Some(job) = self.jobs.get_mut(&job_id) else {
            return;
        };
        job.agents.remove(&agent);

        if job.state == JobState::Completed {
            return;
        }
        if let Some(primary_task) = job.primary_task {
            if let Some(mut task) = tasks.remove_complete_area(primary_task) {
                task.removing_task(&[(agent, entity)], tasks, registry, world);
                tasks.insert_complete_area(task);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world_adapter::mock::{MockEntityRecord, MockWorldAdapter};

    #[test]
    fn activation_happens_on_first_progress_only() {
        let mut world = MockWorldAdapter::new();
        let mut tasks = TaskManager::new();
        let mut registry = PathRequestRegistry::new();
        let settings = Settings::default();
        let mut cache = PrototypeAttributeCache::new();
        let mut jobs = JobManager::new();

        let job_id = jobs.create(
            JobKind::CompleteArea {
                surface: SurfaceId(0),
                areas_to_complete: vec![Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0))],
                force: ForceId(0),
                collision_mask: CollisionMask("robot".to_string()),
            },
            0,
        );
        assert_eq!(jobs.get(job_id).unwrap().state, JobState::Pending);

        let agent = AgentId::new(1);
        let entity = world.spawn(MockEntityRecord::default());
        let stats = AgentMiningStats {
            mining_distance: 5.0,
            mining_speed: 1.0,
        };

        jobs.progress_job_for_agent(
            job_id,
            agent,
            entity,
            Rect::new(Vec2::ZERO, Vec2::ZERO),
            Vec2::new(3.0, 3.0),
            stats,
            &mut tasks,
            &mut registry,
            &settings,
            &mut cache,
            &mut world,
        )
        .unwrap();

        assert_eq!(jobs.get(job_id).unwrap().state, JobState::Active);
        assert!(jobs.get(job_id).unwrap().primary_task.is_some());
    }

    #[test]
    fn job_completes_when_area_has_nothing_to_deconstruct() {
        let mut world = MockWorldAdapter::new();
        let mut tasks = TaskManager::new();
        let mut registry = PathRequestRegistry::new();
        let settings = Settings::default();
        let mut cache = PrototypeAttributeCache::new();
        let mut jobs = JobManager::new();

        let job_id = jobs.create(
            JobKind::CompleteArea {
                surface: SurfaceId(0),
                areas_to_complete: vec![Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0))],
                force: ForceId(0),
                collision_mask: CollisionMask("robot".to_string()),
            },
            0,
        );
        let agent = AgentId::new(1);
        let entity = world.spawn(MockEntityRecord::default());
        let stats = AgentMiningStats {
            mining_distance: 5.0,
            mining_speed: 1.0,
        };

        for _ in 0..3 {
            jobs.progress_job_for_agent(
                job_id,
                agent,
                entity,
                Rect::new(Vec2::ZERO, Vec2::ZERO),
                Vec2::new(3.0, 3.0),
                stats,
                &mut tasks,
                &mut registry,
                &settings,
                &mut cache,
                &mut world,
            )
            .unwrap();
        }

        assert!(jobs.is_job_complete_for_agent(job_id, agent));
    }
}
