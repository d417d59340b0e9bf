//! ScanAreasForActionsToComplete Task (§4.7, multi-batch pipeline).
//!
//! Three pipeline stages sharing work across whichever agents call
//! `Progress` this tick, mirroring the teacher's `ChunkManager` background
//! loading queue: collection, then a budgeted dedup pass, then a budgeted
//! resolve/index pass, each resumable across ticks from exactly where the
//! last call left off.

use bevy::prelude::*;
use std::collections::BTreeMap;

use super::{ProgressResult, Severity};
use crate::ids::{JobId, StableEntityId, TaskInstanceId};
use crate::plan::{ActionClass, ChunkPosition, EntityDetails, ItemCounts, ScannedActionPlan};
use crate::world_adapter::prototype_cache::PrototypeAttributeCache;
use crate::world_adapter::{EntityFilter, ForceId, Rect, SurfaceId, WorldAdapter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    RawCollection,
    Dedup,
    Resolve,
    Done,
}

#[derive(Default)]
struct RawBuckets {
    deconstruct_owned: Vec<Entity>,
    deconstruct_neutral: Vec<Entity>,
    upgrade_owned: Vec<Entity>,
    ghost_owned: Vec<Entity>,
}

impl RawBuckets {
    fn is_empty(&self) -> bool {
        self.deconstruct_owned.is_empty()
            && self.deconstruct_neutral.is_empty()
            && self.upgrade_owned.is_empty()
            && self.ghost_owned.is_empty()
    }
}

#[derive(Default)]
struct DedupMaps {
    deconstruct: BTreeMap<StableEntityId, Entity>,
    upgrade: BTreeMap<StableEntityId, Entity>,
    build: BTreeMap<StableEntityId, Entity>,
    /// Pending sweep: neutral entities awaiting the post-pass once the four
    /// raw buckets are fully consumed (§4.7 stage 2).
    neutral_pending: Vec<(StableEntityId, Entity)>,
}

pub struct ScanAreasTask {
    pub id: TaskInstanceId,
    pub job: JobId,
    pub parent: Option<TaskInstanceId>,

    pub surface: SurfaceId,
    pub areas_to_complete: Vec<Rect>,
    pub force: ForceId,

    stage: Stage,
    raw: RawBuckets,
    dedup: DedupMaps,
    required_manipulate_items: ItemCounts,

    pub plan: ScannedActionPlan,
    completed: bool,
}

impl ScanAreasTask {
    pub fn new(
        id: TaskInstanceId,
        job: JobId,
        parent: Option<TaskInstanceId>,
        surface: SurfaceId,
        areas_to_complete: Vec<Rect>,
        force: ForceId,
    ) -> Self {
        Self {
            id,
            job,
            parent,
            surface,
            areas_to_complete,
            force,
            stage: Stage::RawCollection,
            raw: RawBuckets::default(),
            dedup: DedupMaps::default(),
            required_manipulate_items: ItemCounts::new(),
            plan: ScannedActionPlan::new(surface),
            completed: false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn progress(
        &mut self,
        settings_deduped_per_batch: usize,
        settings_handled_per_batch: usize,
        cache: &mut PrototypeAttributeCache,
        world: &mut dyn WorldAdapter,
    ) -> ProgressResult {
        if self.completed {
            return ProgressResult::silent(0);
        }

        match self.stage {
            Stage::RawCollection => {
                for area in &self.areas_to_complete {
                    self.raw.deconstruct_owned.extend(world.find_entities(
                        self.surface,
                        *area,
                        &EntityFilter {
                            force: Some(self.force),
                            to_be_deconstructed: Some(true),
                            ..Default::default()
                        },
                    ));
                    self.raw.deconstruct_neutral.extend(world.find_entities(
                        self.surface,
                        *area,
                        &EntityFilter {
                            neutral_any_force: true,
                            to_be_deconstructed: Some(true),
                            ..Default::default()
                        },
                    ));
                    self.raw.upgrade_owned.extend(world.find_entities(
                        self.surface,
                        *area,
                        &EntityFilter {
                            force: Some(self.force),
                            to_be_upgraded: Some(true),
                            ..Default::default()
                        },
                    ));
                    self.raw.ghost_owned.extend(world.find_entities(
                        self.surface,
                        *area,
                        &EntityFilter {
                            force: Some(self.force),
                            entity_ghost: Some(true),
                            ..Default::default()
                        },
                    ));
                }
                self.stage = Stage::Dedup;
                ProgressResult::wait(1, "Collecting entities to act on", Severity::Normal)
            }

            Stage::Dedup => {
                let mut budget = settings_deduped_per_batch;
                self.drain_dedup_bucket(&mut budget, world, BucketKind::DeconstructOwned);
                self.drain_dedup_bucket(&mut budget, world, BucketKind::DeconstructNeutral);
                self.drain_dedup_bucket(&mut budget, world, BucketKind::UpgradeOwned);
                self.drain_dedup_bucket(&mut budget, world, BucketKind::GhostOwned);

                if self.raw.is_empty() {
                    let force = self.force;
                    let pending = std::mem::take(&mut self.dedup.neutral_pending);
                    for (stable_id, entity) in pending {
                        if self.dedup.deconstruct.contains_key(&stable_id) {
                            continue;
                        }
                        if world.is_registered_for_deconstruction(entity, force) {
                            self.dedup.deconstruct.insert(stable_id, entity);
                        }
                    }
                    self.stage = Stage::Resolve;
                }
                ProgressResult::wait(1, "Deduplicating scanned entities", Severity::Normal)
            }

            Stage::Resolve => {
                let mut budget = settings_handled_per_batch;
                self.resolve_class(&mut budget, ActionClass::Deconstruct, cache, world);
                self.resolve_class(&mut budget, ActionClass::Upgrade, cache, world);
                self.resolve_class(&mut budget, ActionClass::Build, cache, world);

                if self.dedup.deconstruct.is_empty()
                    && self.dedup.upgrade.is_empty()
                    && self.dedup.build.is_empty()
                {
                    for (item, count) in std::mem::take(&mut self.required_manipulate_items) {
                        self.plan
                            .required_input_items
                            .entry(item)
                            .or_insert(count.max(1));
                    }
                    self.stage = Stage::Done;
                    self.completed = true;
                    return ProgressResult::wait(0, "Scan complete", Severity::Normal);
                }
                ProgressResult::wait(1, "Indexing scanned entities", Severity::Normal)
            }

            Stage::Done => {
                self.completed = true;
                ProgressResult::silent(0)
            }
        }
    }

    fn drain_dedup_bucket(
        &mut self,
        budget: &mut usize,
        world: &mut dyn WorldAdapter,
        kind: BucketKind,
    ) {
        let bucket = match kind {
            BucketKind::DeconstructOwned => &mut self.raw.deconstruct_owned,
            BucketKind::DeconstructNeutral => &mut self.raw.deconstruct_neutral,
            BucketKind::UpgradeOwned => &mut self.raw.upgrade_owned,
            BucketKind::GhostOwned => &mut self.raw.ghost_owned,
        };
        while *budget > 0 {
            let Some(entity) = bucket.pop() else { break };
            *budget -= 1;
            let stable_id = stable_id_for(world, entity);
            match kind {
                BucketKind::DeconstructOwned => {
                    self.dedup.deconstruct.insert(stable_id, entity);
                }
                BucketKind::DeconstructNeutral => {
                    self.dedup.neutral_pending.push((stable_id, entity));
                }
                BucketKind::UpgradeOwned => {
                    self.dedup.upgrade.insert(stable_id, entity);
                }
                BucketKind::GhostOwned => {
                    self.dedup.build.insert(stable_id, entity);
                }
            }
        }
    }

    fn resolve_class(
        &mut self,
        budget: &mut usize,
        class: ActionClass,
        cache: &mut PrototypeAttributeCache,
        world: &mut dyn WorldAdapter,
    ) {
        let map = match class {
            ActionClass::Deconstruct => &mut self.dedup.deconstruct,
            ActionClass::Upgrade => &mut self.dedup.upgrade,
            ActionClass::Build => &mut self.dedup.build,
        };
        let mut keys = Vec::new();
        for stable_id in map.keys().copied() {
            if *budget == 0 {
                break;
            }
            keys.push(stable_id);
            *budget -= 1;
        }

        for stable_id in keys {
            let map = match class {
                ActionClass::Deconstruct => &mut self.dedup.deconstruct,
                ActionClass::Upgrade => &mut self.dedup.upgrade,
                ActionClass::Build => &mut self.dedup.build,
            };
            let Some(entity) = map.remove(&stable_id) else {
                continue;
            };
            let Some(position) = world.entity_position(entity) else {
                continue;
            };
            let name = world.entity_name(entity).unwrap_or_default();
            let chunk = ChunkPosition::from_world_position(position);

            let required_item = resolve_required_item(
                class,
                &name,
                cache,
                world,
                &mut self.required_manipulate_items,
            );
            if class != ActionClass::Build {
                let output_items = guaranteed_output_items(&name, cache, world);
                for (item, count) in output_items {
                    *self.plan.guaranteed_output_items.entry(item).or_insert(0) += count;
                }
            }
            if let Some((item, count)) = &required_item {
                *self
                    .plan
                    .required_input_items
                    .entry(item.clone())
                    .or_insert(0) += count;
            }

            self.plan.insert_entity(EntityDetails {
                stable_id,
                entity,
                name,
                position,
                chunk,
                action_class: class,
                required_item,
            });
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum BucketKind {
    DeconstructOwned,
    DeconstructNeutral,
    UpgradeOwned,
    GhostOwned,
}

/// `WorldAdapter` only surfaces the `registerOnDestroyed` fallback path
/// (§6.1); a world that can supply a real unit number would route through
/// `StableEntityId::UnitNumber` instead, but the core has no seam for that
/// distinction, so every entity is deduped through the destroyed-id
/// namespace.
fn stable_id_for(world: &mut dyn WorldAdapter, entity: Entity) -> StableEntityId {
    StableEntityId::DestroyedId(world.register_on_destroyed(entity))
}

/// Required input item for an entity of `class` (§4.7 step 2). Rotations
/// (upgrade target equal to current name) are folded into
/// `required_manipulate_items` instead of the per-entity slot.
fn resolve_required_item(
    class: ActionClass,
    name: &str,
    cache: &mut PrototypeAttributeCache,
    world: &dyn WorldAdapter,
    required_manipulate_items: &mut ItemCounts,
) -> Option<(String, u32)> {
    match class {
        ActionClass::Deconstruct => None,
        ActionClass::Build => cache
            .get_or_fetch("entity", name, "place_result_item", || {
                world.prototype_attribute("entity", name, "place_result_item")
            })
            .and_then(|v| v.as_items().and_then(|items| items.first().cloned())),
        ActionClass::Upgrade => {
            let target = cache
                .get_or_fetch("entity", name, "upgrade_target", || {
                    world.prototype_attribute("entity", name, "upgrade_target")
                })
                .and_then(|v| v.as_name().map(|s| s.to_string()));
            let item = cache
                .get_or_fetch("entity", name, "place_result_item", || {
                    world.prototype_attribute("entity", name, "place_result_item")
                })
                .and_then(|v| v.as_items().and_then(|items| items.first().cloned()));

            match (target, item) {
                (Some(target), Some((item_name, count))) if target == name => {
                    *required_manipulate_items.entry(item_name).or_insert(0) += count.max(1);
                    None
                }
                (_, item) => item,
            }
        }
    }
}

/// Mined products with probability 1 and amount >= 1 (§4.7 step 2). Only
/// meaningful for entities that will actually be destroyed.
fn guaranteed_output_items(
    name: &str,
    cache: &mut PrototypeAttributeCache,
    world: &dyn WorldAdapter,
) -> Vec<(String, u32)> {
    cache
        .get_or_fetch("entity", name, "mined_result", || {
            world.prototype_attribute("entity", name, "mined_result")
        })
        .and_then(|v| v.as_items().map(|items| items.to_vec()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world_adapter::mock::{MockEntityRecord, MockWorldAdapter};
    use crate::world_adapter::prototype_cache::AttributeValue;

    fn settings() -> (usize, usize) {
        (1_000, 100)
    }

    #[test]
    fn scan_collects_dedups_and_resolves_in_one_call_each() {
        let mut world = MockWorldAdapter::new();
        let mut cache = PrototypeAttributeCache::new();
        let tree = world.spawn(MockEntityRecord {
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
            "mined_result",
            AttributeValue::Items(vec![("wood".to_string(), 4)]),
        );

        let mut task = ScanAreasTask::new(
            TaskInstanceId::new(1),
            JobId::new(1),
            None,
            SurfaceId(0),
            vec![Rect::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0))],
            ForceId(0),
        );

        let (deduped, handled) = settings();
        task.progress(deduped, handled, &mut cache, &mut world); // raw collection
        task.progress(deduped, handled, &mut cache, &mut world); // dedup
        task.progress(deduped, handled, &mut cache, &mut world); // resolve

        assert!(task.is_completed());
        assert_eq!(task.plan.flat_deconstruct.len(), 1);
        assert_eq!(task.plan.guaranteed_output_items.get("wood"), Some(&4));
        let _ = tree;
    }

    #[test]
    fn overlapping_areas_dedup_to_one_flat_entry() {
        // §8 S2.
        let mut world = MockWorldAdapter::new();
        let mut cache = PrototypeAttributeCache::new();
        world.spawn(MockEntityRecord {
            position: Vec2::new(5.0, 5.0),
            name: "rock".to_string(),
            to_be_deconstructed: true,
            deconstruct_order_force: Some(ForceId(0)),
            neutral: true,
            ..Default::default()
        });

        let mut task = ScanAreasTask::new(
            TaskInstanceId::new(1),
            JobId::new(1),
            None,
            SurfaceId(0),
            vec![
                Rect::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0)),
                Rect::new(Vec2::new(2.0, 2.0), Vec2::new(8.0, 8.0)),
            ],
            ForceId(0),
        );

        let (deduped, handled) = settings();
        task.progress(deduped, handled, &mut cache, &mut world);
        task.progress(deduped, handled, &mut cache, &mut world);
        task.progress(deduped, handled, &mut cache, &mut world);

        assert_eq!(task.plan.flat_deconstruct.len(), 1);
    }

    #[test]
    fn dedup_batch_budget_is_respected_across_ticks() {
        let mut world = MockWorldAdapter::new();
        let mut cache = PrototypeAttributeCache::new();
        for i in 0..5 {
            world.spawn(MockEntityRecord {
                position: Vec2::new(i as f32, 0.0),
                name: "tree".to_string(),
                to_be_deconstructed: true,
                deconstruct_order_force: Some(ForceId(0)),
                neutral: true,
                ..Default::default()
            });
        }
        let mut task = ScanAreasTask::new(
            TaskInstanceId::new(1),
            JobId::new(1),
            None,
            SurfaceId(0),
            vec![Rect::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0))],
            ForceId(0),
        );

        task.progress(2, 100, &mut cache, &mut world); // raw collection
        task.progress(2, 100, &mut cache, &mut world); // dedup: only 2 of 5 consumed
        assert!(!task.raw.is_empty());
        task.progress(2, 100, &mut cache, &mut world);
        task.progress(2, 100, &mut cache, &mut world);
        assert!(task.raw.is_empty());
    }
}
