//! In-memory `WorldAdapter` test double.
//!
//! Not gated behind `#[cfg(test)]` so both the integration tests under
//! `tests/` and the demo binary can exercise the engine without a running
//! Bevy `World`/pathfinder — the same role `WorldLoader::load_default`
//! played for the teacher's standalone test binaries.

use bevy::prelude::*;
use std::collections::{HashMap, VecDeque};

use super::prototype_cache::AttributeValue;
use super::{
    EntityFilter, ForceId, MineResult, PathfindRequest, PathfindResult, Rect, RenderHandle,
    Severity, SurfaceId, WalkingCommand, Waypoint, WorldAdapter,
};
use crate::ids::PathRequestId;

#[derive(Debug, Clone)]
pub struct MockEntityRecord {
    pub position: Vec2,
    pub name: String,
    pub entity_type: String,
    pub valid: bool,
    /// Owning force; `None` for neutral entities such as trees and rocks.
    pub force: Option<ForceId>,
    pub to_be_deconstructed: bool,
    /// Which force ordered the deconstruction. For neutral entities this is
    /// independent of `force` (which stays `None`).
    pub deconstruct_order_force: Option<ForceId>,
    pub to_be_upgraded: bool,
    pub is_ghost: bool,
    pub neutral: bool,
}

impl Default for MockEntityRecord {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            name: "unknown".to_string(),
            entity_type: "simple-entity".to_string(),
            valid: true,
            force: None,
            to_be_deconstructed: false,
            deconstruct_order_force: None,
            to_be_upgraded: false,
            is_ghost: false,
            neutral: false,
        }
    }
}

#[derive(Default)]
pub struct MockWorldAdapter {
    entities: HashMap<Entity, MockEntityRecord>,
    next_entity_index: u32,

    destroyed_ids: HashMap<Entity, u64>,
    next_destroyed_id: u64,

    pending_requests: VecDeque<PathRequestId>,
    ready_results: Vec<(PathRequestId, PathfindResult)>,
    next_request_id: u64,

    mine_outcomes: HashMap<Entity, MineResult>,

    prototype_attributes: HashMap<(String, String, String), AttributeValue>,

    next_render_handle: u64,

    tick: u64,
}

impl MockWorldAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, record: MockEntityRecord) -> Entity {
        let entity = Entity::from_raw(self.next_entity_index);
        self.next_entity_index += 1;
        self.entities.insert(entity, record);
        entity
    }

    pub fn set_prototype_attribute(
        &mut self,
        category: &str,
        name: &str,
        attribute: &str,
        value: AttributeValue,
    ) {
        self.prototype_attributes.insert(
            (category.to_string(), name.to_string(), attribute.to_string()),
            value,
        );
    }

    pub fn set_mine_outcome(&mut self, entity: Entity, outcome: MineResult) {
        self.mine_outcomes.insert(entity, outcome);
    }

    pub fn set_tick(&mut self, tick: u64) {
        self.tick = tick;
    }

    pub fn advance_tick(&mut self) {
        self.tick += 1;
    }

    /// Number of path requests submitted but not yet resolved.
    pub fn pending_request_count(&self) -> usize {
        self.pending_requests.len()
    }

    /// Resolve the oldest still-pending request with `result` (test driver
    /// hook standing in for the host's async pathfinder callback, §5).
    pub fn resolve_oldest_path_request(&mut self, result: PathfindResult) -> Option<PathRequestId> {
        let id = self.pending_requests.pop_front()?;
        self.ready_results.push((id, result));
        Some(id)
    }

    pub fn entity_record(&self, entity: Entity) -> Option<&MockEntityRecord> {
        self.entities.get(&entity)
    }
}

impl WorldAdapter for MockWorldAdapter {
    fn find_entities(&self, _surface: SurfaceId, rect: Rect, filter: &EntityFilter) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|(_, record)| rect.contains(record.position))
            .filter(|(_, record)| {
                if filter.neutral_any_force {
                    record.neutral
                } else if let Some(force) = filter.force {
                    record.force == Some(force)
                } else {
                    true
                }
            })
            .filter(|(_, record)| {
                filter
                    .to_be_deconstructed
                    .is_none_or(|want| record.to_be_deconstructed == want)
            })
            .filter(|(_, record)| {
                filter
                    .to_be_upgraded
                    .is_none_or(|want| record.to_be_upgraded == want)
            })
            .filter(|(_, record)| filter.entity_ghost.is_none_or(|want| record.is_ghost == want))
            .filter(|(_, record)| {
                filter
                    .types
                    .as_ref()
                    .is_none_or(|types| types.contains(&record.entity_type))
            })
            .filter(|(_, record)| {
                filter
                    .names
                    .as_ref()
                    .is_none_or(|names| names.contains(&record.name))
            })
            .map(|(entity, _)| *entity)
            .collect()
    }

    fn is_registered_for_deconstruction(&self, entity: Entity, force: ForceId) -> bool {
        self.entities
            .get(&entity)
            .map(|record| {
                record.to_be_deconstructed && record.deconstruct_order_force == Some(force)
            })
            .unwrap_or(false)
    }

    fn register_on_destroyed(&mut self, entity: Entity) -> u64 {
        if let Some(id) = self.destroyed_ids.get(&entity) {
            return *id;
        }
        let id = self.next_destroyed_id;
        self.next_destroyed_id += 1;
        self.destroyed_ids.insert(entity, id);
        id
    }

    fn request_path(&mut self, _opts: PathfindRequest) -> PathRequestId {
        let id = PathRequestId::new(self.next_request_id);
        self.next_request_id += 1;
        self.pending_requests.push_back(id);
        id
    }

    fn poll_path_results(&mut self) -> Vec<(PathRequestId, PathfindResult)> {
        std::mem::take(&mut self.ready_results)
    }

    fn entity_position(&self, entity: Entity) -> Option<Vec2> {
        self.entities.get(&entity).map(|r| r.position)
    }

    fn entity_name(&self, entity: Entity) -> Option<String> {
        self.entities.get(&entity).map(|r| r.name.clone())
    }

    fn entity_type(&self, entity: Entity) -> Option<String> {
        self.entities.get(&entity).map(|r| r.entity_type.clone())
    }

    fn entity_valid(&self, entity: Entity) -> bool {
        self.entities.get(&entity).map(|r| r.valid).unwrap_or(false)
    }

    fn mine_entity(&mut self, entity: Entity, _into_inventory: Entity) -> MineResult {
        let outcome = self
            .mine_outcomes
            .get(&entity)
            .copied()
            .unwrap_or(MineResult {
                ok: true,
                all_items_fit: true,
            });
        if outcome.ok {
            if let Some(record) = self.entities.get_mut(&entity) {
                record.valid = false;
            }
        }
        outcome
    }

    fn set_walking_command(&mut self, _entity: Entity, _command: Option<WalkingCommand>) {
        // No-op for the mock: WalkPath's own state (target index) is what
        // tests assert on, not the persisted command itself.
    }

    fn prototype_attribute(
        &self,
        category: &str,
        name: &str,
        attribute: &str,
    ) -> Option<AttributeValue> {
        self.prototype_attributes
            .get(&(category.to_string(), name.to_string(), attribute.to_string()))
            .cloned()
    }

    fn render_text(
        &mut self,
        _surface: SurfaceId,
        _position: Vec2,
        _text: &str,
        _severity: Severity,
    ) -> RenderHandle {
        let handle = RenderHandle(self.next_render_handle);
        self.next_render_handle += 1;
        handle
    }

    fn render_rectangle(&mut self, _surface: SurfaceId, _rect: Rect) -> RenderHandle {
        let handle = RenderHandle(self.next_render_handle);
        self.next_render_handle += 1;
        handle
    }

    fn render_path(&mut self, _surface: SurfaceId, _waypoints: &[Waypoint]) -> RenderHandle {
        let handle = RenderHandle(self.next_render_handle);
        self.next_render_handle += 1;
        handle
    }

    fn destroy_render(&mut self, _handle: RenderHandle) {}

    fn current_tick(&self) -> u64 {
        self.tick
    }
}

/// Straight-line waypoint list between two points, a convenience for
/// scripting `resolve_oldest_path_request` in tests.
pub fn straight_line_path(from: Vec2, to: Vec2, steps: u32) -> Vec<Waypoint> {
    (1..=steps)
        .map(|i| Waypoint {
            position: from.lerp(to, i as f32 / steps as f32),
            needs_destroy_to_reach: false,
        })
        .collect()
}
