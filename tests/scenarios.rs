//! End-to-end scenarios driven straight through the public API, the same
//! role the teacher's `tests/pathfinding_queue_test.rs` played: exercise the
//! pieces the way a host application actually would, rather than poking at
//! internals.

use bevy::prelude::*;

use robot_friend_core::ids::AgentId;
use robot_friend_core::pathfinding::registry::PathRequestRegistry;
use robot_friend_core::plan::{ActionClass, ChunkPosition, EntityDetails, ScannedActionPlan};
use robot_friend_core::settings::Settings;
use robot_friend_core::task::deconstruct_chunk::{AgentMiningStats, DeconstructChunkTask};
use robot_friend_core::task::walk_to_location::WalkToLocationTask;
use robot_friend_core::task::{AgentTaskStatus, TaskManager};
use robot_friend_core::world_adapter::mock::{straight_line_path, MockEntityRecord, MockWorldAdapter};
use robot_friend_core::world_adapter::prototype_cache::{AttributeValue, PrototypeAttributeCache};
use robot_friend_core::world_adapter::{CollisionMask, ForceId, PathfindResult, Rect, SurfaceId};
use robot_friend_core::{AgentManager, AgentStateText, JobId, JobKind, JobManager, StableEntityId};

/// S1: one agent, one deconstructable entity already within mining range.
/// The job must run to completion end-to-end through the tick loop, and the
/// target must actually have been mined by the world.
#[test]
fn s1_job_runs_to_completion_and_mines_the_target() {
    let mut world = MockWorldAdapter::new();
    let mut tasks = TaskManager::new();
    let mut registry = PathRequestRegistry::new();
    let settings = Settings::default();
    let mut cache = PrototypeAttributeCache::new();
    let mut jobs = JobManager::new();
    let mut state_text = AgentStateText::new();
    let mut agents = AgentManager::new();

    let tree = world.spawn(MockEntityRecord {
        position: Vec2::new(3.0, 3.0),
        name: "tree".to_string(),
        to_be_deconstructed: true,
        deconstruct_order_force: Some(ForceId(0)),
        neutral: true,
        ..Default::default()
    });
    world.set_prototype_attribute("entity", "tree", "mining_time", AttributeValue::F32(1.0));

    let robot = world.spawn(MockEntityRecord {
        position: Vec2::new(3.0, 3.0),
        ..Default::default()
    });
    let agent_id = agents.spawn(
        robot,
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

    for tick in 0..150u64 {
        agents.run_tick(
            tick,
            &mut jobs,
            &mut tasks,
            &mut registry,
            &settings,
            &mut cache,
            &mut state_text,
            &mut world,
        );
    }

    assert!(agents.get(agent_id).unwrap().jobs.is_empty());
    assert!(!world.entity_record(tree).unwrap().valid);
}

/// S3: a pathfinder timeout is retried after the cooldown, and a subsequent
/// successful result lets the agent start walking.
#[test]
fn s3_pathfinder_timeout_retries_then_succeeds() {
    let mut tasks = TaskManager::new();
    let mut registry = PathRequestRegistry::new();
    let settings = Settings::default();
    let mut world = MockWorldAdapter::new();
    let agent = AgentId::new(1);
    let entity = world.spawn(MockEntityRecord::default());

    let task_id = tasks.next_id();
    let mut task = WalkToLocationTask::activate(
        task_id,
        JobId::new(1),
        None,
        SurfaceId(0),
        Vec2::new(20.0, 20.0),
        1.0,
        CollisionMask("robot".to_string()),
        ForceId(0),
        &mut tasks,
    );

    // First submission.
    let (first, _) = task.progress(
        agent,
        entity,
        false,
        Rect::new(Vec2::ZERO, Vec2::ZERO),
        Vec2::ZERO,
        &mut tasks,
        &mut registry,
        &settings,
        &mut world,
    );
    assert_eq!(first.ticks_to_wait, 1);
    assert_eq!(world.pending_request_count(), 1);

    world.resolve_oldest_path_request(PathfindResult::TryAgainLater);
    for (id, result) in world.poll_path_results() {
        registry.take(id);
        tasks
            .get_walking_path_mut(task.get_walking_path)
            .unwrap()
            .apply_result(agent, result);
    }

    // First post-timeout call enters RetryCooldown.
    let (cooldown, _) = task.progress(
        agent,
        entity,
        false,
        Rect::new(Vec2::ZERO, Vec2::ZERO),
        Vec2::ZERO,
        &mut tasks,
        &mut registry,
        &settings,
        &mut world,
    );
    assert_eq!(cooldown.ticks_to_wait, 1);
    assert_eq!(world.pending_request_count(), 0);

    // Burn through the remaining cooldown ticks; the last call re-enters the
    // same tick and submits a fresh request.
    for _ in 1..settings.end_of_task_wait_ticks {
        task.progress(
            agent,
            entity,
            false,
            Rect::new(Vec2::ZERO, Vec2::ZERO),
            Vec2::ZERO,
            &mut tasks,
            &mut registry,
            &settings,
            &mut world,
        );
    }
    assert_eq!(world.pending_request_count(), 1);

    let waypoints = straight_line_path(Vec2::ZERO, Vec2::new(20.0, 20.0), 2);
    world.resolve_oldest_path_request(PathfindResult::Found {
        waypoints: waypoints.clone(),
    });
    for (id, result) in world.poll_path_results() {
        registry.take(id);
        tasks
            .get_walking_path_mut(task.get_walking_path)
            .unwrap()
            .apply_result(agent, result);
    }

    let (got_path, _) = task.progress(
        agent,
        entity,
        false,
        Rect::new(Vec2::ZERO, Vec2::ZERO),
        Vec2::ZERO,
        &mut tasks,
        &mut registry,
        &settings,
        &mut world,
    );
    assert_eq!(got_path.ticks_to_wait, 0);
    assert_eq!(
        tasks
            .walk_path(task.walk_path)
            .unwrap()
            .path
            .len(),
        waypoints.len()
    );
}

/// S4: a one-tick stall on WalkPath tears the walk branch down and
/// re-requests a path within the same call.
#[test]
fn s4_stuck_agent_gets_a_fresh_path_same_tick() {
    let mut tasks = TaskManager::new();
    let mut registry = PathRequestRegistry::new();
    let settings = Settings::default();
    let mut world = MockWorldAdapter::new();
    let agent = AgentId::new(1);
    let entity = world.spawn(MockEntityRecord::default());

    let task_id = tasks.next_id();
    let mut task = WalkToLocationTask::activate(
        task_id,
        JobId::new(1),
        None,
        SurfaceId(0),
        Vec2::new(2.0, 0.0),
        0.1,
        CollisionMask("robot".to_string()),
        ForceId(0),
        &mut tasks,
    );

    task.progress(
        agent,
        entity,
        false,
        Rect::new(Vec2::ZERO, Vec2::ZERO),
        Vec2::ZERO,
        &mut tasks,
        &mut registry,
        &settings,
        &mut world,
    );
    let waypoints = straight_line_path(Vec2::ZERO, Vec2::new(2.0, 0.0), 2);
    world.resolve_oldest_path_request(PathfindResult::Found {
        waypoints: waypoints.clone(),
    });
    for (id, result) in world.poll_path_results() {
        registry.take(id);
        tasks
            .get_walking_path_mut(task.get_walking_path)
            .unwrap()
            .apply_result(agent, result);
    }
    task.progress(
        agent,
        entity,
        false,
        Rect::new(Vec2::ZERO, Vec2::ZERO),
        Vec2::ZERO,
        &mut tasks,
        &mut registry,
        &settings,
        &mut world,
    );

    // Two calls at a fixed, non-advancing position trip the stall.
    task.progress(
        agent,
        entity,
        false,
        Rect::new(Vec2::ZERO, Vec2::ZERO),
        Vec2::new(0.0, 5.0),
        &mut tasks,
        &mut registry,
        &settings,
        &mut world,
    );
    let (stuck_recovery, _) = task.progress(
        agent,
        entity,
        false,
        Rect::new(Vec2::ZERO, Vec2::ZERO),
        Vec2::new(0.0, 5.0),
        &mut tasks,
        &mut registry,
        &settings,
        &mut world,
    );

    assert_eq!(stuck_recovery.ticks_to_wait, 1);
    assert_eq!(world.pending_request_count(), 1);
}

/// S5: two agents racing the same chunk set never land on the same chunk at
/// once (single-assignment, §8 invariant 3), and the ring search reaches a
/// chunk far from the starting one.
#[test]
fn s5_two_agents_get_distinct_chunks() {
    let mut tasks = TaskManager::new();
    let mut registry = PathRequestRegistry::new();
    let settings = Settings::default();
    let mut cache = PrototypeAttributeCache::new();
    let mut world = MockWorldAdapter::new();

    let near_chunk = ChunkPosition::from_world_position(Vec2::new(3.0, 3.0));
    let far_chunk = ChunkPosition::from_world_position(Vec2::new(165.0, 3.0));
    assert_ne!(near_chunk, far_chunk);

    let mut plan = ScannedActionPlan::new(SurfaceId(0));
    plan.insert_entity(EntityDetails {
        stable_id: StableEntityId::DestroyedId(1),
        entity: Entity::from_raw(1),
        name: "tree".to_string(),
        position: Vec2::new(3.0, 3.0),
        chunk: near_chunk,
        action_class: ActionClass::Deconstruct,
        required_item: None,
    });
    plan.insert_entity(EntityDetails {
        stable_id: StableEntityId::DestroyedId(2),
        entity: Entity::from_raw(2),
        name: "tree".to_string(),
        position: Vec2::new(165.0, 3.0),
        chunk: far_chunk,
        action_class: ActionClass::Deconstruct,
        required_item: None,
    });

    let mut task = DeconstructChunkTask::activate(
        tasks.next_id(),
        JobId::new(1),
        None,
        SurfaceId(0),
        ForceId(0),
        CollisionMask("robot".to_string()),
        near_chunk,
        near_chunk,
        plan,
    );

    let stats = AgentMiningStats {
        mining_distance: 0.5,
        mining_speed: 1.0,
    };
    let agent_1 = AgentId::new(1);
    let agent_2 = AgentId::new(2);
    let entity_1 = world.spawn(MockEntityRecord::default());
    let entity_2 = world.spawn(MockEntityRecord::default());

    task.progress(
        agent_1,
        entity_1,
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
    task.progress(
        agent_2,
        entity_2,
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

    let chunk_1 = task.agent_state(agent_1).unwrap().assigned_chunk.unwrap();
    let chunk_2 = task.agent_state(agent_2).unwrap().assigned_chunk.unwrap();
    assert_ne!(chunk_1, chunk_2);
    assert_eq!(chunk_1, near_chunk);
    assert_eq!(chunk_2, far_chunk);
}

/// S6: the world reports no route at all (not a retryable timeout) for a
/// primary task; the agent is asked to stand down and no walking state is
/// left behind.
#[test]
fn s6_no_path_on_primary_task_requests_standby() {
    let mut tasks = TaskManager::new();
    let mut registry = PathRequestRegistry::new();
    let settings = Settings::default();
    let mut world = MockWorldAdapter::new();
    let agent = AgentId::new(1);
    let entity = world.spawn(MockEntityRecord::default());

    let task_id = tasks.next_id();
    let mut task = WalkToLocationTask::activate(
        task_id,
        JobId::new(1),
        None,
        SurfaceId(0),
        Vec2::new(50.0, 50.0),
        1.0,
        CollisionMask("robot".to_string()),
        ForceId(0),
        &mut tasks,
    );

    task.progress(
        agent,
        entity,
        true,
        Rect::new(Vec2::ZERO, Vec2::ZERO),
        Vec2::ZERO,
        &mut tasks,
        &mut registry,
        &settings,
        &mut world,
    );
    world.resolve_oldest_path_request(PathfindResult::NotFound);
    for (id, result) in world.poll_path_results() {
        registry.take(id);
        tasks
            .get_walking_path_mut(task.get_walking_path)
            .unwrap()
            .apply_result(agent, result);
    }

    let (result, standby) = task.progress(
        agent,
        entity,
        true,
        Rect::new(Vec2::ZERO, Vec2::ZERO),
        Vec2::ZERO,
        &mut tasks,
        &mut registry,
        &settings,
        &mut world,
    );

    assert_eq!(result.ticks_to_wait, 0);
    assert!(standby.is_some());
    assert_eq!(standby.unwrap().agent, agent);
    assert_eq!(
        task.agent_state(agent).unwrap().status,
        AgentTaskStatus::NoPath
    );
    assert!(registry.is_empty());
}
