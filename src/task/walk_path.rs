//! WalkPath Task (§4.5).
//!
//! Drives an agent tile-by-tile along a waypoint list already resolved by
//! GetWalkingPath, detecting one-tick stalls the way the teacher's
//! `movement::apply_velocity` advances a unit toward its next tile and the
//! region map flags an unreachable hop.

use bevy::prelude::*;
use std::collections::HashMap;

use super::{AgentTaskStatus, ProgressResult, Severity};
use crate::ids::{AgentId, JobId, TaskInstanceId};
use crate::settings::Settings;
use crate::world_adapter::{Direction, Waypoint, WalkingCommand, WorldAdapter};

#[derive(Debug, Clone)]
pub struct WalkPathAgentState {
    pub status: AgentTaskStatus,
    /// 1-based target-waypoint index (§4.5).
    pub target_index: usize,
    /// `None` until the first tick has observed a position — the stall
    /// check is only meaningful from the second tick onward.
    pub last_tick_position: Option<Vec2>,
}

impl WalkPathAgentState {
    fn new(path: &[Waypoint]) -> Self {
        Self {
            status: if path.is_empty() {
                AgentTaskStatus::Completed
            } else {
                AgentTaskStatus::Active
            },
            target_index: 1,
            last_tick_position: None,
        }
    }
}

pub struct WalkPathTask {
    pub id: TaskInstanceId,
    pub job: JobId,
    pub parent: Option<TaskInstanceId>,
    pub path: Vec<Waypoint>,
    pub per_agent: HashMap<AgentId, WalkPathAgentState>,
}

impl WalkPathTask {
    pub fn new(
        id: TaskInstanceId,
        job: JobId,
        parent: Option<TaskInstanceId>,
        path: Vec<Waypoint>,
    ) -> Self {
        Self {
            id,
            job,
            parent,
            path,
            per_agent: HashMap::new(),
        }
    }

    pub fn agent_state(&self, agent: AgentId) -> Option<&WalkPathAgentState> {
        self.per_agent.get(&agent)
    }

    /// One tick of progress for `agent`, currently at `current_position`
    /// (§4.5).
    pub fn progress(
        &mut self,
        agent: AgentId,
        entity: Entity,
        current_position: Vec2,
        settings: &Settings,
        world: &mut dyn WorldAdapter,
    ) -> ProgressResult {
        let path = self.path.clone();
        let state = self
            .per_agent
            .entry(agent)
            .or_insert_with(|| WalkPathAgentState::new(&path));

        if matches!(state.status, AgentTaskStatus::Completed | AgentTaskStatus::Stuck) {
            return ProgressResult::silent(0);
        }

        // Advance past any waypoint within walkAccuracy on both axes
        // independently (never diagonal distance, §4.5).
        while state.target_index <= path.len() {
            let target = path[state.target_index - 1].position;
            let close = (target.x - current_position.x).abs() <= settings.walk_accuracy
                && (target.y - current_position.y).abs() <= settings.walk_accuracy;
            if close {
                state.target_index += 1;
            } else {
                break;
            }
        }

        if state.target_index > path.len() {
            world.set_walking_command(entity, None);
            state.status = AgentTaskStatus::Completed;
            return ProgressResult::silent(0);
        }

        if state.last_tick_position == Some(current_position) {
            world.set_walking_command(entity, None);
            state.status = AgentTaskStatus::Stuck;
            return ProgressResult::silent(0);
        }

        let target = path[state.target_index - 1].position;
        let offset = target - current_position;
        let direction = Direction::from_offset(offset.x, offset.y);
        world.set_walking_command(
            entity,
            Some(WalkingCommand {
                walking: true,
                direction,
            }),
        );
        state.last_tick_position = Some(current_position);

        ProgressResult::wait(1, "Walking the path", Severity::Normal)
    }

    /// §4.3/§4.5 teardown: clear the walking command for any agent still
    /// `active`.
    pub fn removing_robot_from_task(&mut self, agent: AgentId, entity: Entity, world: &mut dyn WorldAdapter) {
        if let Some(state) = self.per_agent.remove(&agent) {
            if state.status == AgentTaskStatus::Active {
                world.set_walking_command(entity, None);
            }
        }
    }

    pub fn removing_task(&mut self, agents: &[(AgentId, Entity)], world: &mut dyn WorldAdapter) {
        for (agent, entity) in agents {
            self.removing_robot_from_task(*agent, *entity, world);
        }
        self.per_agent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world_adapter::mock::{MockEntityRecord, MockWorldAdapter};

    fn straight_path() -> Vec<Waypoint> {
        vec![
            Waypoint {
                position: Vec2::new(1.0, 0.0),
                needs_destroy_to_reach: false,
            },
            Waypoint {
                position: Vec2::new(2.0, 0.0),
                needs_destroy_to_reach: false,
            },
        ]
    }

    #[test]
    fn arrival_clears_command_and_completes() {
        let single_waypoint = vec![Waypoint {
            position: Vec2::new(1.0, 0.0),
            needs_destroy_to_reach: false,
        }];
        let mut task = WalkPathTask::new(TaskInstanceId::new(1), JobId::new(1), None, single_waypoint);
        let mut world = MockWorldAdapter::new();
        let entity = world.spawn(MockEntityRecord::default());
        let settings = Settings::default();
        let agent = AgentId::new(1);

        // Agent already within walk_accuracy of the only waypoint.
        let result = task.progress(agent, entity, Vec2::new(1.05, 0.0), &settings, &mut world);

        assert_eq!(result.ticks_to_wait, 0);
        assert_eq!(
            task.agent_state(agent).unwrap().status,
            AgentTaskStatus::Completed
        );
    }

    #[test]
    fn no_movement_between_ticks_is_stuck() {
        // §8 S4.
        let mut task = WalkPathTask::new(TaskInstanceId::new(1), JobId::new(1), None, straight_path());
        let mut world = MockWorldAdapter::new();
        let entity = world.spawn(MockEntityRecord::default());
        let settings = Settings::default();
        let agent = AgentId::new(1);

        let first = task.progress(agent, entity, Vec2::new(0.0, 0.0), &settings, &mut world);
        assert_eq!(first.ticks_to_wait, 1);

        let second = task.progress(agent, entity, Vec2::new(0.0, 0.0), &settings, &mut world);
        assert_eq!(second.ticks_to_wait, 0);
        assert_eq!(
            task.agent_state(agent).unwrap().status,
            AgentTaskStatus::Stuck
        );
    }

    #[test]
    fn diagonal_approach_does_not_trigger_spurious_arrival_on_one_axis() {
        let mut task = WalkPathTask::new(TaskInstanceId::new(1), JobId::new(1), None, straight_path());
        let mut world = MockWorldAdapter::new();
        let entity = world.spawn(MockEntityRecord::default());
        let settings = Settings::default();
        let agent = AgentId::new(1);

        // x is within accuracy of waypoint 1 but y is far off: must not
        // advance the index from x alone.
        task.progress(agent, entity, Vec2::new(1.05, 5.0), &settings, &mut world);
        assert_eq!(task.agent_state(agent).unwrap().target_index, 1);
    }
}
