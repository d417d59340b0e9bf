//! Headless demo binary for the robot-friend core engine.
//!
//! Spawns a handful of mock entities and a `CompleteArea` job so the tick
//! loop has something to chew on, the same shape as the teacher's headless
//! `main.rs` (`MinimalPlugins` + `ScheduleRunnerPlugin`, world set up in a
//! `Startup` system, resource inserted once setup completes so the gated
//! `Update` systems can start running).

use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use std::time::Duration;

use robot_friend_core::world_adapter::mock::{MockEntityRecord, MockWorldAdapter};
use robot_friend_core::world_adapter::prototype_cache::AttributeValue;
use robot_friend_core::world_adapter::{CollisionMask, ForceId, Rect, SurfaceId, WorldHandle};
use robot_friend_core::{AgentManager, CoreEnginePlugin, JobKind, JobManager};

fn main() {
    info!("starting robot-friend demo (headless)");

    App::new()
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(
            1.0 / 10.0,
        ))))
        .add_plugins(bevy::log::LogPlugin::default())
        .add_plugins(CoreEnginePlugin)
        .add_systems(Startup, setup)
        .run();
}

fn setup(mut agents: ResMut<AgentManager>, mut jobs: ResMut<JobManager>, mut commands: Commands) {
    let mut world = MockWorldAdapter::new();

    for (x, y) in [(2.0, 2.0), (6.0, 3.0), (4.0, 7.0)] {
        world.spawn(MockEntityRecord {
            position: Vec2::new(x, y),
            name: "tree".to_string(),
            to_be_deconstructed: true,
            deconstruct_order_force: Some(ForceId(0)),
            neutral: true,
            ..Default::default()
        });
    }
    world.set_prototype_attribute("entity", "tree", "mining_time", AttributeValue::F32(2.0));

    let robot_entity = world.spawn(MockEntityRecord {
        position: Vec2::ZERO,
        name: "Robot 1".to_string(),
        ..Default::default()
    });
    let agent_id = agents.spawn(
        robot_entity,
        SurfaceId(0),
        ForceId(0),
        0,
        Rect::new(Vec2::splat(-0.4), Vec2::splat(0.4)),
        CollisionMask("robot".to_string()),
        1.5,
        1.0,
        Color::srgb(0.2, 0.7, 0.9),
        "Robot 1",
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

    info!("spawned agent {:?} with job {:?}", agent_id, job_id);

    commands.insert_resource(WorldHandle(Box::new(world)));
}
