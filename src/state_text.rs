//! Agent State Text (§4.12).
//!
//! Idempotent above-head status rendering, the per-agent analogue of the
//! teacher's `CurrentAction` component: instead of a Bevy component diffed
//! by change detection, this is a plain resource keyed by `AgentId` since
//! agents in this core are manager-owned records, not ECS entities in their
//! own right.

use bevy::prelude::*;
use std::collections::HashMap;

use crate::ids::AgentId;
use crate::task::Severity as TaskSeverity;
use crate::world_adapter::{RenderHandle, Severity as RenderSeverity, SurfaceId, WorldAdapter};

#[derive(Debug, Clone, PartialEq)]
struct AppliedState {
    text: String,
    severity: RenderSeverity,
    target_entity: Entity,
    target_position: Vec2,
    surface: SurfaceId,
}

/// One render handle per agent, compared on
/// `(text, severity, target-entity, target-position, surface)` before
/// touching the world (§4.12).
#[derive(Resource, Default)]
pub struct AgentStateText {
    applied: HashMap<AgentId, (AppliedState, RenderHandle)>,
}

impl AgentStateText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render `agent`'s status text if anything comparable changed since the
    /// last call; otherwise keep the existing handle untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &mut self,
        agent: AgentId,
        surface: SurfaceId,
        target_entity: Entity,
        target_position: Vec2,
        text: &str,
        severity: TaskSeverity,
        world: &mut dyn WorldAdapter,
    ) -> RenderHandle {
        let desired = AppliedState {
            text: text.to_string(),
            severity: map_severity(severity),
            target_entity,
            target_position,
            surface,
        };

        if let Some((applied, handle)) = self.applied.get(&agent) {
            if *applied == desired {
                return *handle;
            }
        }

        if let Some((_, old_handle)) = self.applied.remove(&agent) {
            world.destroy_render(old_handle);
        }

        let handle = world.render_text(surface, target_position, &desired.text, desired.severity);
        self.applied.insert(agent, (desired, handle));
        handle
    }

    /// Drop any rendering for an agent that no longer exists.
    pub fn remove(&mut self, agent: AgentId, world: &mut dyn WorldAdapter) {
        if let Some((_, handle)) = self.applied.remove(&agent) {
            world.destroy_render(handle);
        }
    }
}

fn map_severity(severity: TaskSeverity) -> RenderSeverity {
    match severity {
        TaskSeverity::Normal => RenderSeverity::Normal,
        TaskSeverity::Warning => RenderSeverity::Warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world_adapter::mock::MockWorldAdapter;

    #[test]
    fn identical_state_retains_handle() {
        let mut world = MockWorldAdapter::new();
        let mut state_text = AgentStateText::new();
        let agent = AgentId::new(1);
        let entity = world.spawn(Default::default());

        let first = state_text.apply(
            agent,
            SurfaceId(0),
            entity,
            Vec2::new(1.0, 1.0),
            "Idle",
            TaskSeverity::Normal,
            &mut world,
        );
        let second = state_text.apply(
            agent,
            SurfaceId(0),
            entity,
            Vec2::new(1.0, 1.0),
            "Idle",
            TaskSeverity::Normal,
            &mut world,
        );

        assert_eq!(first, second);
    }

    #[test]
    fn changed_text_gets_a_new_handle() {
        let mut world = MockWorldAdapter::new();
        let mut state_text = AgentStateText::new();
        let agent = AgentId::new(1);
        let entity = world.spawn(Default::default());

        let first = state_text.apply(
            agent,
            SurfaceId(0),
            entity,
            Vec2::new(1.0, 1.0),
            "Idle",
            TaskSeverity::Normal,
            &mut world,
        );
        let second = state_text.apply(
            agent,
            SurfaceId(0),
            entity,
            Vec2::new(1.0, 1.0),
            "Walking the path",
            TaskSeverity::Normal,
            &mut world,
        );

        assert_ne!(first, second);
    }
}
