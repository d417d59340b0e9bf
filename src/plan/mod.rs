//! Scanned action plan (§3 "Scanned action plan", §4.7).
//!
//! The immutable-once-built-but-mutated-as-work-completes output of the
//! scan pipeline: a chunk-indexed, deduped set of entities to act on.
//! Chunk math mirrors the teacher's `tilemap::chunk::ChunkCoordinate`
//! (`floor(x / CHUNK_SIZE)`), except the spec fixes the chunk size at 16
//! tiles over a 32-tile divisor (§ GLOSSARY: "a fixed constant of the host
//! engine") rather than deriving it from `CHUNK_SIZE`.

use bevy::prelude::*;
use std::collections::BTreeMap;

use crate::ids::StableEntityId;
use crate::world_adapter::SurfaceId;

/// World-to-chunk divisor (§ GLOSSARY: chunk = 16x16 tiles, keyed by
/// `floor(wx / 32), floor(wy / 32)` — the host engine's fixed constant).
pub const CHUNK_TILE_DIVISOR: f32 = 32.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkPosition {
    pub x: i32,
    pub y: i32,
}

impl ChunkPosition {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// `floor(entity.x / 32), floor(entity.y / 32)` (§4.7 step 1).
    pub fn from_world_position(position: Vec2) -> Self {
        Self {
            x: (position.x / CHUNK_TILE_DIVISOR).floor() as i32,
            y: (position.y / CHUNK_TILE_DIVISOR).floor() as i32,
        }
    }

    pub fn chebyshev_distance(&self, other: &ChunkPosition) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionClass {
    Deconstruct,
    Upgrade,
    Build,
}

/// A newly assigned sequential key for the flat action-class maps (§4.7 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityDetailsKey(pub u64);

/// One entity slated for an action (§3 "EntityDetails").
#[derive(Debug, Clone)]
pub struct EntityDetails {
    pub stable_id: StableEntityId,
    pub entity: Entity,
    pub name: String,
    pub position: Vec2,
    pub chunk: ChunkPosition,
    pub action_class: ActionClass,
    /// Required item name/count, if any (§4.7 step 2).
    pub required_item: Option<(String, u32)>,
}

/// Per-chunk view of the plan (§3 "ChunkDetails").
#[derive(Debug, Clone, Default)]
pub struct ChunkDetails {
    pub position: Option<ChunkPosition>,
    /// Deduped entity-identifier -> EntityDetails for deconstruction (flat
    /// within the chunk, §3 invariant 1).
    pub to_be_deconstructed: BTreeMap<StableEntityId, EntityDetailsKey>,
    /// Grouped by entity name for upgrade/build (§3).
    pub to_be_upgraded: BTreeMap<String, Vec<EntityDetailsKey>>,
    pub to_be_built: BTreeMap<String, Vec<EntityDetailsKey>>,
}

impl ChunkDetails {
    pub fn new(position: ChunkPosition) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn is_deconstruct_empty(&self) -> bool {
        self.to_be_deconstructed.is_empty()
    }
}

/// Two-level column-then-row chunk index with bounds (§3).
#[derive(Debug, Clone, Default)]
pub struct ChunkIndex {
    /// Outer key: chunk X. Inner key: chunk Y.
    columns: BTreeMap<i32, BTreeMap<i32, ChunkPosition>>,
    column_y_bounds: BTreeMap<i32, (i32, i32)>,
    pub global_min_x: i32,
    pub global_max_x: i32,
    pub global_min_y: i32,
    pub global_max_y: i32,
    initialized: bool,
}

impl ChunkIndex {
    /// Lazily register `chunk`, updating global and per-column bounds
    /// (§4.7 step 1: "Lazily create the X column... and within it the Y row").
    pub fn insert(&mut self, chunk: ChunkPosition) {
        let column = self.columns.entry(chunk.x).or_default();
        column.entry(chunk.y).or_insert(chunk);

        let (min_y, max_y) = self
            .column_y_bounds
            .entry(chunk.x)
            .or_insert((chunk.y, chunk.y));
        *min_y = (*min_y).min(chunk.y);
        *max_y = (*max_y).max(chunk.y);

        if !self.initialized {
            self.global_min_x = chunk.x;
            self.global_max_x = chunk.x;
            self.global_min_y = chunk.y;
            self.global_max_y = chunk.y;
            self.initialized = true;
        } else {
            self.global_min_x = self.global_min_x.min(chunk.x);
            self.global_max_x = self.global_max_x.max(chunk.x);
            self.global_min_y = self.global_min_y.min(chunk.y);
            self.global_max_y = self.global_max_y.max(chunk.y);
        }
    }

    pub fn contains(&self, chunk: &ChunkPosition) -> bool {
        self.columns
            .get(&chunk.x)
            .map(|col| col.contains_key(&chunk.y))
            .unwrap_or(false)
    }

    pub fn chunks(&self) -> impl Iterator<Item = &ChunkPosition> {
        self.columns.values().flat_map(|col| col.values())
    }

    /// The corner chunk nearest the world origin among registered chunks
    /// (§4.9 "outer-corner chunk nearest world origin").
    pub fn corner_nearest_origin(&self) -> Option<ChunkPosition> {
        self.chunks().min_by_key(|c| c.x.unsigned_abs() as i64 + c.y.unsigned_abs() as i64).copied()
    }
}

/// Item name -> count aggregation (§3 `requiredInputItems`/`guaranteedOutputItems`).
pub type ItemCounts = BTreeMap<String, u32>;

/// The output of the scan pipeline (§3 "Scanned action plan", §4.7).
#[derive(Default)]
pub struct ScannedActionPlan {
    pub surface: Option<SurfaceId>,
    pub chunks: BTreeMap<ChunkPosition, ChunkDetails>,
    pub index: ChunkIndex,

    pub flat_deconstruct: BTreeMap<StableEntityId, EntityDetails>,
    pub flat_upgrade: BTreeMap<StableEntityId, EntityDetails>,
    pub flat_build: BTreeMap<StableEntityId, EntityDetails>,

    pub required_input_items: ItemCounts,
    pub guaranteed_output_items: ItemCounts,

    next_key: u64,
}

impl ScannedActionPlan {
    pub fn new(surface: SurfaceId) -> Self {
        Self {
            surface: Some(surface),
            ..Default::default()
        }
    }

    fn flat_map_mut(
        &mut self,
        class: ActionClass,
    ) -> &mut BTreeMap<StableEntityId, EntityDetails> {
        match class {
            ActionClass::Deconstruct => &mut self.flat_deconstruct,
            ActionClass::Upgrade => &mut self.flat_upgrade,
            ActionClass::Build => &mut self.flat_build,
        }
    }

    pub fn flat_map(&self, class: ActionClass) -> &BTreeMap<StableEntityId, EntityDetails> {
        match class {
            ActionClass::Deconstruct => &self.flat_deconstruct,
            ActionClass::Upgrade => &self.flat_upgrade,
            ActionClass::Build => &self.flat_build,
        }
    }

    /// Install `details` into both the flat map and its chunk's grouped map
    /// atomically (§3 invariant 1, §4.7 step 3). Re-observing a stable id
    /// already on the plan moves it rather than duplicating it: any stale
    /// entry under its previous chunk is dropped first, so a single id never
    /// lives in two chunks' maps at once.
    pub fn insert_entity(&mut self, details: EntityDetails) -> EntityDetailsKey {
        if details.action_class == ActionClass::Deconstruct {
            self.remove_deconstruct_entity(details.stable_id);
        }

        self.next_key += 1;
        let key = EntityDetailsKey(self.next_key);

        self.index.insert(details.chunk);
        let chunk_entry = self
            .chunks
            .entry(details.chunk)
            .or_insert_with(|| ChunkDetails::new(details.chunk));

        match details.action_class {
            ActionClass::Deconstruct => {
                chunk_entry
                    .to_be_deconstructed
                    .insert(details.stable_id, key);
            }
            ActionClass::Upgrade => {
                chunk_entry
                    .to_be_upgraded
                    .entry(details.name.clone())
                    .or_default()
                    .push(key);
            }
            ActionClass::Build => {
                chunk_entry
                    .to_be_built
                    .entry(details.name.clone())
                    .or_default()
                    .push(key);
            }
        }

        let stable_id = details.stable_id;
        let class = details.action_class;
        self.flat_map_mut(class).insert(stable_id, details);
        key
    }

    /// Remove an entity from both the flat map and its chunk's map
    /// atomically (§3 invariant 1, invariant 2: the action executor must
    /// remove both before declaring the entity done).
    pub fn remove_deconstruct_entity(&mut self, stable_id: StableEntityId) -> Option<EntityDetails> {
        let details = self.flat_deconstruct.remove(&stable_id)?;
        if let Some(chunk) = self.chunks.get_mut(&details.chunk) {
            chunk.to_be_deconstructed.remove(&stable_id);
        }
        Some(details)
    }

    pub fn is_deconstruct_empty(&self) -> bool {
        self.flat_deconstruct.is_empty()
    }
}
