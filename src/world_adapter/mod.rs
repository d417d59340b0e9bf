//! World Adapter — the narrow interface to the host simulation (§6.1).
//!
//! The core never touches the host's `bevy::ecs::world::World`,
//! tile/surface storage, or pathfinder directly. Everything it needs goes
//! through this trait, the same way the teacher narrows terrain access
//! behind `WorldLoader`/`TerrainQuery` instead of querying chunks inline
//! from AI systems.

pub mod mock;
pub mod prototype_cache;

pub use mock::MockWorldAdapter;
pub use prototype_cache::{AttributeValue, PrototypeAttributeCache};

use bevy::prelude::*;
use std::collections::HashSet;

use crate::ids::PathRequestId;

/// Allegiance token scoping world queries (§3, §6.1 "force").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForceId(pub u32);

/// The surface (map/level) a query or request applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u32);

/// Opaque collision-mask token read off an agent's prototype (§6.2).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollisionMask(pub String);

/// Axis-aligned rectangle in tile or world-float coordinates, reused for
/// both `areasToComplete` rectangles (§4.7) and pathfinder bounding boxes (§6.2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left_top: Vec2,
    pub right_bottom: Vec2,
}

impl Rect {
    pub fn new(left_top: Vec2, right_bottom: Vec2) -> Self {
        Self {
            left_top,
            right_bottom,
        }
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.left_top.x
            && point.x <= self.right_bottom.x
            && point.y >= self.left_top.y
            && point.y <= self.right_bottom.y
    }
}

/// 8-direction compass encoding, clockwise from N=0 (§4.5, §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    N = 0,
    NE = 1,
    E = 2,
    SE = 3,
    S = 4,
    SW = 5,
    W = 6,
    NW = 7,
}

impl Direction {
    /// Map the sign of `(dx, dy)` to the engine's 8-direction encoding
    /// (§4.5 step: "compute an 8-direction vector from the current offset").
    /// `dy` grows downward (screen/tile convention), so a negative dy is
    /// North.
    pub fn from_offset(dx: f32, dy: f32) -> Self {
        let sx = if dx > 0.0 {
            1
        } else if dx < 0.0 {
            -1
        } else {
            0
        };
        let sy = if dy > 0.0 {
            1
        } else if dy < 0.0 {
            -1
        } else {
            0
        };
        match (sx, sy) {
            (0, -1) => Direction::N,
            (1, -1) => Direction::NE,
            (1, 0) => Direction::E,
            (1, 1) => Direction::SE,
            (0, 1) => Direction::S,
            (-1, 1) => Direction::SW,
            (-1, 0) => Direction::W,
            (-1, -1) => Direction::NW,
            // dx == 0 && dy == 0: no movement needed; arbitrary but stable.
            (0, 0) => Direction::N,
            _ => unreachable!("sign values are always in {{-1, 0, 1}}"),
        }
    }

    /// Unit vector for this direction, used by the direction-encoding
    /// round-trip property test (§8 item 5).
    pub fn unit_vector(&self) -> Vec2 {
        match self {
            Direction::N => Vec2::new(0.0, -1.0),
            Direction::NE => Vec2::new(1.0, -1.0).normalize(),
            Direction::E => Vec2::new(1.0, 0.0),
            Direction::SE => Vec2::new(1.0, 1.0).normalize(),
            Direction::S => Vec2::new(0.0, 1.0),
            Direction::SW => Vec2::new(-1.0, 1.0).normalize(),
            Direction::W => Vec2::new(-1.0, 0.0),
            Direction::NW => Vec2::new(-1.0, -1.0).normalize(),
        }
    }
}

/// Persistent walking command issued to an agent's world entity (§4.5, §6.1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkingCommand {
    pub walking: bool,
    pub direction: Direction,
}

/// Filter accepted by `find_entities` (§6.1).
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    pub force: Option<ForceId>,
    pub to_be_deconstructed: Option<bool>,
    pub to_be_upgraded: Option<bool>,
    pub entity_ghost: Option<bool>,
    /// When true, matches neutral (no-force) entities such as trees and
    /// rock-like decoratives instead of the `force` field (§4.7 stage 1,
    /// second bucket: "trees and rock-like neutral entities, any force").
    pub neutral_any_force: bool,
    pub types: Option<HashSet<String>>,
    pub names: Option<HashSet<String>>,
}

/// One waypoint along a found path (§6.2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub position: Vec2,
    pub needs_destroy_to_reach: bool,
}

/// Bit-exact pathfinder request fields (§6.2), plus the `high_priority`
/// flag GetWalkingPath always sets (§4.4) which sits alongside but outside
/// the spec's strict three-field `flags` struct.
#[derive(Debug, Clone)]
pub struct PathfindRequest {
    pub bounding_box: Rect,
    pub collision_mask: CollisionMask,
    pub start: Vec2,
    pub goal: Vec2,
    pub force: ForceId,
    pub radius: f32,
    pub ignore_entity: Entity,
    pub cache: bool,
    pub prefer_straight_paths: bool,
    pub no_break: bool,
    pub high_priority: bool,
    /// `[-8, +8]`; engine's most detailed profile defaults to 0.
    pub path_resolution_modifier: i8,
}

/// Result of a completed pathfinder request (§6.2).
#[derive(Debug, Clone)]
pub enum PathfindResult {
    Found { waypoints: Vec<Waypoint> },
    TryAgainLater,
    /// No route exists; distinct from `TryAgainLater` (§8 S6: "path = none,
    /// try_again_later = false").
    NotFound,
}

/// Result of a mine operation (§6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MineResult {
    pub ok: bool,
    pub all_items_fit: bool,
}

/// Opaque handle to a render object (`renderText`/`renderRectangle`/`renderPath`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Warning,
    Error,
}

/// The narrow interface the core requires from the host simulation (§6.1).
///
/// `request_path`/`poll_path_results` split what the spec describes as a
/// single "submit, then later receive a callback" operation into a
/// submit-now / drain-later pair, because the engine is single-threaded
/// cooperative (§5): there is no actual callback, only a per-tick drain the
/// way the teacher's `process_pathfinding_requests` system drains completed
/// `GridPathRequest`s once per Update.
pub trait WorldAdapter: Send + Sync {
    fn find_entities(&self, surface: SurfaceId, rect: Rect, filter: &EntityFilter) -> Vec<Entity>;

    fn is_registered_for_deconstruction(&self, entity: Entity, force: ForceId) -> bool;

    /// Stable numeric id for an unnamed entity; same number for the same
    /// entity across calls (§6.1).
    fn register_on_destroyed(&mut self, entity: Entity) -> u64;

    fn request_path(&mut self, opts: PathfindRequest) -> PathRequestId;

    /// Drain completed path requests since the last drain. Delivered on the
    /// engine thread (§5); the only cross-tick async primitive in the core.
    fn poll_path_results(&mut self) -> Vec<(PathRequestId, PathfindResult)>;

    fn entity_position(&self, entity: Entity) -> Option<Vec2>;
    fn entity_name(&self, entity: Entity) -> Option<String>;
    fn entity_type(&self, entity: Entity) -> Option<String>;
    fn entity_valid(&self, entity: Entity) -> bool;

    fn mine_entity(&mut self, entity: Entity, into_inventory: Entity) -> MineResult;

    fn set_walking_command(&mut self, entity: Entity, command: Option<WalkingCommand>);

    fn prototype_attribute(
        &self,
        category: &str,
        name: &str,
        attribute: &str,
    ) -> Option<AttributeValue>;

    fn render_text(&mut self, surface: SurfaceId, position: Vec2, text: &str, severity: Severity)
        -> RenderHandle;
    fn render_rectangle(&mut self, surface: SurfaceId, rect: Rect) -> RenderHandle;
    fn render_path(&mut self, surface: SurfaceId, waypoints: &[Waypoint]) -> RenderHandle;
    fn destroy_render(&mut self, handle: RenderHandle);

    fn current_tick(&self) -> u64;
}

/// Resource wrapper so a `Box<dyn WorldAdapter>` can be inserted into the
/// app, the same seam `WorldLoader` filled for the teacher's AI systems —
/// the host supplies the implementation, the engine only ever sees the trait.
#[derive(Resource)]
pub struct WorldHandle(pub Box<dyn WorldAdapter>);
