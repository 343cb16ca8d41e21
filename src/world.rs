// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The world: sole mutable authority over entity records, archetype
//! contents, relation store, entity-ref store, string pool, and event
//! queue (`spec.md` §5).
//!
//! Grounded in the teacher's `World` (`src/world.rs`): the same lifecycle
//! shape (`spawn`/`despawn`/`add_component`/`remove_component`, archetype
//! transition via a scratch split-borrow of two archetypes, a resource
//! map, a query cache) rebuilt against schema-driven components instead
//! of Rust generics. The teacher's parallel `Executor`/`Schedule`
//! (`src/executor.rs`, `src/schedule.rs`) take `&mut World` as an
//! explicit argument rather than being owned by it; `Scheduler` here
//! follows the same shape for the same reason — a system needs `&mut
//! World` to run, so the scheduler cannot live behind `&mut self` on
//! `World` without a self-borrow. Callers drive a tick by holding both
//! objects side by side and calling `world.run_tick(&mut scheduler)`.

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value as Json;

use crate::archetype_graph::ArchetypeGraph;
use crate::component::{ComponentBuilder, ComponentDef, ComponentRegistry, PrimitiveType, Value};
use crate::entity::{Entity, EntityAllocator, EntityRecord};
use crate::entity_ref::EntityRefStore;
use crate::error::{EcsError, Result};
use crate::event::EventQueue;
use crate::hooks::{HookRegistry, Snapshot};
use crate::query::{Query, QueryCache, View};
use crate::relation::{CascadePolicy, RelationStore};
use crate::resources::ResourceRegistry;
use crate::schedule::Scheduler;
use crate::spatial::SpatialGrid;
use crate::string_pool::StringPool;

/// Construction-time knobs, mirroring the teacher's `World::with_capacity`
/// family of constructors (`spec.md` §2/§6).
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Forwarded to every freshly-created `Archetype`'s row capacity hint.
    /// Rows still grow past this; `archetype::INITIAL_CAPACITY` is the
    /// actual floor used today, kept here for forward compatibility.
    pub initial_archetype_capacity: usize,
    pub spatial_width: f32,
    pub spatial_height: f32,
    pub spatial_cell_size: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            initial_archetype_capacity: crate::archetype::INITIAL_CAPACITY,
            spatial_width: 1000.0,
            spatial_height: 1000.0,
            spatial_cell_size: 32.0,
        }
    }
}

pub struct World {
    allocator: EntityAllocator,
    registry: ComponentRegistry,
    graph: ArchetypeGraph,
    strings: StringPool,
    relations: RelationStore,
    entity_refs: EntityRefStore,
    hooks: HookRegistry,
    events: EventQueue,
    resources: ResourceRegistry,
    query_cache: QueryCache,
    spatial: SpatialGrid,
    tick: u32,
    despawning: FxHashSet<Entity>,
}

impl World {
    pub fn new() -> Result<Self> {
        Self::with_config(WorldConfig::default())
    }

    pub fn with_config(config: WorldConfig) -> Result<Self> {
        let registry = ComponentRegistry::new();
        let graph = ArchetypeGraph::new(&registry)?;
        Ok(Self {
            allocator: EntityAllocator::new(),
            registry,
            graph,
            strings: StringPool::new(),
            relations: RelationStore::new(),
            entity_refs: EntityRefStore::new(),
            hooks: HookRegistry::new(),
            events: EventQueue::new(),
            resources: ResourceRegistry::new(),
            query_cache: QueryCache::new(),
            spatial: SpatialGrid::new(
                config.spatial_width,
                config.spatial_height,
                config.spatial_cell_size,
            ),
            tick: 0,
            despawning: FxHashSet::default(),
        })
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.allocator.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.allocator.live_count()
    }

    // ---- Component/relation registration -------------------------------

    pub fn register_component(
        &mut self,
        name: impl Into<String>,
        builder: ComponentBuilder,
    ) -> Result<usize> {
        self.registry.register(name, builder)
    }

    pub fn register_tag(&mut self, name: impl Into<String>) -> Result<usize> {
        self.registry.register_tag(name)
    }

    pub fn component_index(&self, name: &str) -> Option<usize> {
        self.registry.index_of(name)
    }

    pub fn component_def(&self, index: usize) -> Result<&ComponentDef> {
        self.registry.by_index(index)
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn register_relation_type(
        &mut self,
        name: impl Into<String>,
        exclusive: bool,
        symmetric: bool,
        cascade: CascadePolicy,
    ) -> Result<usize> {
        self.relations.register_type(name, exclusive, symmetric, cascade)
    }

    // ---- Lifecycle: spawn / despawn / add / remove / set / get --------

    /// Spawn an entity with the given resident components (dense indices).
    /// Fires `onAdd` for each component after its defaults are in place
    /// (`spec.md` §4.5).
    pub fn spawn(&mut self, components: &[usize]) -> Result<Entity> {
        #[cfg(feature = "profiling")]
        let span = tracing::info_span!("world.spawn", components = components.len(), archetype_count = self.graph.len());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let entity = self.allocator.allocate().ok_or(EcsError::EntityLimitExceeded)?;

        let archetype_id = self.graph.get_or_create(components, &self.registry)?;
        let archetype = self.graph.get_mut(archetype_id);
        let row = archetype.allocate_row(entity, &self.registry)?;
        self.allocator.set_record(entity, EntityRecord { archetype: archetype_id, row });

        let resident = self.graph.get(archetype_id).component_indices.clone();
        for component in resident {
            self.fire_add(archetype_id, row, entity, component);
        }
        Ok(entity)
    }

    pub fn spawn_named(&mut self, names: &[String]) -> Result<Entity> {
        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            indices.push(
                self.registry
                    .index_of(name)
                    .ok_or_else(|| EcsError::UnknownComponent(name.clone()))?,
            );
        }
        self.spawn(&indices)
    }

    fn fire_add(&mut self, archetype_id: usize, row: usize, entity: Entity, component: usize) {
        let is_tag = self.registry.by_index(component).map(|d| d.is_tag).unwrap_or(true);
        let snapshot = if is_tag {
            Snapshot::default()
        } else {
            self.snapshot_row(archetype_id, row, component)
        };
        self.hooks.fire_add(component, entity, &snapshot);
    }

    fn snapshot_row(&self, archetype_id: usize, row: usize, component: usize) -> Snapshot {
        let mut snapshot = Snapshot::default();
        let Ok(def) = self.registry.by_index(component) else {
            return snapshot;
        };
        let archetype = self.graph.get(archetype_id);
        for (field_index, field) in def.fields.iter().enumerate() {
            if let Ok(column) = archetype.field_column(component, field_index) {
                snapshot.insert(field.name.clone(), column.get(row));
            }
        }
        snapshot
    }

    /// Despawn `entity`: fires `onRemove` for every resident component,
    /// swap-removes its row, collects relation cascades, nullifies
    /// entity-ref fields pointing at it, frees the handle, then despawns
    /// the cascade set. Re-entrancy-guarded (`spec.md` §4.5); a no-op on a
    /// dead or already-despawning handle, returning `false`.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        #[cfg(feature = "profiling")]
        let span = tracing::info_span!("world.despawn", entity = entity.to_bits());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        if !self.allocator.is_alive(entity) || self.despawning.contains(&entity) {
            return false;
        }
        self.despawning.insert(entity);

        let record = self.allocator.record(entity).expect("live entity has a record");
        let archetype_id = record.archetype;
        let row = record.row;

        let resident = self.graph.get(archetype_id).component_indices.clone();
        for &component in &resident {
            let is_tag = self.registry.by_index(component).map(|d| d.is_tag).unwrap_or(true);
            let snapshot = if is_tag {
                Snapshot::default()
            } else {
                self.snapshot_row(archetype_id, row, component)
            };
            self.hooks.fire_remove(component, entity, &snapshot);
        }

        self.spatial.remove(entity);

        let archetype = self.graph.get_mut(archetype_id);
        if let Some(moved_entity) = archetype.free_row(row) {
            self.allocator.set_record(moved_entity, EntityRecord { archetype: archetype_id, row });
        }

        let cascades = self.relations.remove_entity(entity);

        self.entity_refs.remove_source(entity);
        let nullified = self.entity_refs.nullify_target(entity);
        for (source, component, field) in nullified {
            self.write_null_ref(source, component, field);
        }

        self.allocator.free(entity);
        self.despawning.remove(&entity);

        for cascade in cascades {
            self.despawn(cascade);
        }
        true
    }

    fn write_null_ref(&mut self, source: Entity, component: usize, field: usize) {
        if !self.allocator.is_alive(source) {
            return;
        }
        let Some(record) = self.allocator.record(source) else {
            return;
        };
        let Ok(def) = self.registry.by_index(component) else {
            return;
        };
        let def = def.clone();
        let Some(field_def) = def.fields.get(field) else {
            return;
        };
        let mut partial = FxHashMap::default();
        partial.insert(field_def.name.clone(), Value::Entity(crate::entity::NULL_ENTITY));
        let archetype = self.graph.get_mut(record.archetype);
        let _ = archetype.set_component_data(record.row, component, &def, &partial);
    }

    /// Add `component` to `entity`, initializing its fields from `partial`
    /// over defaults, and transitioning to the archetype that carries it.
    /// Delegates to [`World::set`] if the entity already has the
    /// component. A no-op on a dead handle (`spec.md` §4.5).
    pub fn add(&mut self, entity: Entity, component: usize, partial: FxHashMap<String, Value>) -> Result<()> {
        if !self.allocator.is_alive(entity) {
            return Ok(());
        }
        let record = self.allocator.record(entity).expect("live entity has a record");
        if self.graph.get(record.archetype).has_component(component) {
            return self.set(entity, component, partial);
        }

        let old_archetype_id = record.archetype;
        let old_row = record.row;
        let new_archetype_id = self.graph.add_transition(old_archetype_id, component, &self.registry)?;

        let (old_arch, new_arch) = self.graph.get_pair_mut(old_archetype_id, new_archetype_id);
        let new_row = new_arch.allocate_row(entity, &self.registry)?;
        for &c in &old_arch.component_indices.clone() {
            new_arch.copy_component_from(new_row, old_arch, old_row, c);
        }
        let moved = old_arch.free_row(old_row);
        self.allocator.set_record(entity, EntityRecord { archetype: new_archetype_id, row: new_row });
        if let Some(moved_entity) = moved {
            self.allocator.set_record(moved_entity, EntityRecord { archetype: old_archetype_id, row: old_row });
        }

        let def = self.registry.by_index(component)?.clone();
        if !def.is_tag {
            let archetype = self.graph.get_mut(new_archetype_id);
            archetype.set_component_data(new_row, component, &def, &partial)?;
        }
        self.fire_add(new_archetype_id, new_row, entity, component);
        Ok(())
    }

    pub fn add_named(&mut self, entity: Entity, name: &str, partial: FxHashMap<String, Value>) -> Result<()> {
        let component = self
            .registry
            .index_of(name)
            .ok_or_else(|| EcsError::UnknownComponent(name.to_string()))?;
        self.add(entity, component, partial)
    }

    /// Remove `component` from `entity`, firing `onRemove` before the
    /// transition. Returns `false` if the entity is dead or doesn't carry
    /// the component (`spec.md` §4.5).
    pub fn remove(&mut self, entity: Entity, component: usize) -> Result<bool> {
        if !self.allocator.is_alive(entity) {
            return Ok(false);
        }
        let record = self.allocator.record(entity).expect("live entity has a record");
        if !self.graph.get(record.archetype).has_component(component) {
            return Ok(false);
        }

        let is_tag = self.registry.by_index(component).map(|d| d.is_tag).unwrap_or(true);
        let snapshot = if is_tag {
            Snapshot::default()
        } else {
            self.snapshot_row(record.archetype, record.row, component)
        };
        self.hooks.fire_remove(component, entity, &snapshot);

        let old_archetype_id = record.archetype;
        let old_row = record.row;
        let new_archetype_id = self.graph.remove_transition(old_archetype_id, component, &self.registry)?;

        let (old_arch, new_arch) = self.graph.get_pair_mut(old_archetype_id, new_archetype_id);
        let new_row = new_arch.allocate_row(entity, &self.registry)?;
        for &c in &new_arch.component_indices.clone() {
            new_arch.copy_component_from(new_row, old_arch, old_row, c);
        }
        let moved = old_arch.free_row(old_row);
        self.allocator.set_record(entity, EntityRecord { archetype: new_archetype_id, row: new_row });
        if let Some(moved_entity) = moved {
            self.allocator.set_record(moved_entity, EntityRecord { archetype: old_archetype_id, row: old_row });
        }
        Ok(true)
    }

    pub fn remove_named(&mut self, entity: Entity, name: &str) -> Result<bool> {
        let component = self
            .registry
            .index_of(name)
            .ok_or_else(|| EcsError::UnknownComponent(name.to_string()))?;
        self.remove(entity, component)
    }

    /// Overwrite only the fields present in `partial`; fires `onSet` with
    /// the component's snapshot before and after the write. A no-op on a
    /// dead handle; errors if the entity doesn't carry the component.
    pub fn set(&mut self, entity: Entity, component: usize, partial: FxHashMap<String, Value>) -> Result<()> {
        if !self.allocator.is_alive(entity) {
            return Ok(());
        }
        let record = self.allocator.record(entity).expect("live entity has a record");
        if !self.graph.get(record.archetype).has_component(component) {
            let name = self.registry.by_index(component).map(|d| d.name.clone()).unwrap_or_default();
            return Err(EcsError::UnknownComponent(name));
        }

        let def = self.registry.by_index(component)?.clone();
        let prev = self.snapshot_row(record.archetype, record.row, component);
        let archetype = self.graph.get_mut(record.archetype);
        archetype.set_component_data(record.row, component, &def, &partial)?;
        let next = self.snapshot_row(record.archetype, record.row, component);
        self.hooks.fire_set(component, entity, &prev, &next);
        Ok(())
    }

    pub fn set_named(&mut self, entity: Entity, name: &str, partial: FxHashMap<String, Value>) -> Result<()> {
        let component = self
            .registry
            .index_of(name)
            .ok_or_else(|| EcsError::UnknownComponent(name.to_string()))?;
        self.set(entity, component, partial)
    }

    pub fn has_component(&self, entity: Entity, component: usize) -> bool {
        self.allocator
            .record(entity)
            .is_some_and(|r| self.graph.get(r.archetype).has_component(component))
    }

    /// Materialize a component's fields as a name-keyed map. `None` if the
    /// entity is dead or doesn't carry the component.
    pub fn get(&self, entity: Entity, component: usize) -> Option<Snapshot> {
        let record = self.allocator.record(entity)?;
        if !self.graph.get(record.archetype).has_component(component) {
            return None;
        }
        Some(self.snapshot_row(record.archetype, record.row, component))
    }

    pub fn field_value(&self, entity: Entity, component: usize, field_name: &str) -> Option<Value> {
        let def = self.registry.by_index(component).ok()?;
        let field_index = def.field_index(field_name)?;
        self.field_value_by_index(entity, component, field_index)
    }

    pub fn field_value_by_index(&self, entity: Entity, component: usize, field_index: usize) -> Option<Value> {
        let record = self.allocator.record(entity)?;
        let archetype = self.graph.get(record.archetype);
        if !archetype.has_component(component) {
            return None;
        }
        let column = archetype.field_column(component, field_index).ok()?;
        Some(column.get(record.row))
    }

    // ---- String / entity-ref field helpers -----------------------------

    pub fn get_string(&self, entity: Entity, component: usize, field_name: &str) -> Option<String> {
        let value = self.field_value(entity, component, field_name)?;
        let idx = value.as_str_index()?;
        Some(self.strings.get(idx).to_string())
    }

    pub fn set_string(&mut self, entity: Entity, component: usize, field_name: &str, value: &str) -> Result<()> {
        let def = self.registry.by_index(component)?;
        let field = def.field(field_name).ok_or_else(|| EcsError::UnknownField {
            component: def.name.clone(),
            field: field_name.to_string(),
        })?;
        if field.primitive != PrimitiveType::String {
            return Err(EcsError::TypeMismatch {
                field: field_name.to_string(),
                expected: "string",
            });
        }

        let idx = self.strings.intern(value);
        let mut partial = FxHashMap::default();
        partial.insert(field_name.to_string(), Value::Str(idx));
        self.set(entity, component, partial)
    }

    /// Raw read: returns the stored handle even if it points at a dead
    /// entity (`spec.md` §4.13).
    pub fn get_entity_ref_raw(&self, entity: Entity, component: usize, field_name: &str) -> Option<Entity> {
        self.field_value(entity, component, field_name)?.as_entity()
    }

    /// Validated read: `None` if the stored handle is null or dead.
    pub fn get_entity_ref(&self, entity: Entity, component: usize, field_name: &str) -> Option<Entity> {
        let target = self.get_entity_ref_raw(entity, component, field_name)?;
        if target.is_null() || !self.allocator.is_alive(target) {
            None
        } else {
            Some(target)
        }
    }

    pub fn set_entity_ref(
        &mut self,
        entity: Entity,
        component: usize,
        field_name: &str,
        target: Entity,
    ) -> Result<()> {
        let def = self.registry.by_index(component)?;
        let field_index = def.field_index(field_name).ok_or_else(|| EcsError::UnknownField {
            component: def.name.clone(),
            field: field_name.to_string(),
        })?;
        if def.fields[field_index].primitive != PrimitiveType::Entity {
            return Err(EcsError::TypeMismatch {
                field: field_name.to_string(),
                expected: "entity",
            });
        }
        self.entity_refs.set(entity, component, field_index, target);
        let mut partial = FxHashMap::default();
        partial.insert(field_name.to_string(), Value::Entity(target));
        self.set(entity, component, partial)
    }

    // ---- Relations ------------------------------------------------------

    pub fn relate(
        &mut self,
        source: Entity,
        rel_name: &str,
        target: Entity,
        data: FxHashMap<String, Value>,
    ) -> Result<()> {
        if !self.allocator.is_alive(source) || !self.allocator.is_alive(target) {
            return Err(EcsError::DeadEntity);
        }
        self.relations.relate(source, rel_name, target, data)
    }

    pub fn unrelate(&mut self, source: Entity, rel_name: &str, target: Entity) -> Result<()> {
        self.relations.unrelate(source, rel_name, target)
    }

    pub fn has_relation(&self, source: Entity, rel_name: &str, target: Entity) -> bool {
        self.relations.has(source, rel_name, target)
    }

    pub fn relation_target(&self, source: Entity, rel_name: &str) -> Option<Entity> {
        self.relations.get_target(source, rel_name)
    }

    pub fn relation_targets(&self, source: Entity, rel_name: &str) -> Vec<Entity> {
        self.relations.get_targets(source, rel_name)
    }

    pub fn relation_sources(&self, target: Entity, rel_name: &str) -> Vec<Entity> {
        self.relations.get_sources(target, rel_name)
    }

    pub fn relation_data(&self, source: Entity, rel_name: &str, target: Entity) -> Option<&FxHashMap<String, Value>> {
        self.relations.get_data(source, rel_name, target)
    }

    pub fn set_relation_data(
        &mut self,
        source: Entity,
        rel_name: &str,
        target: Entity,
        data: FxHashMap<String, Value>,
    ) -> Result<()> {
        self.relations.set_data(source, rel_name, target, data)
    }

    pub fn relations(&self) -> &RelationStore {
        &self.relations
    }

    // ---- Hooks ----------------------------------------------------------

    pub fn on_add(
        &mut self,
        component: usize,
        replace: bool,
        handler: impl FnMut(Entity, &Snapshot) + Send + 'static,
    ) -> Result<()> {
        let name = self.registry.by_index(component)?.name.clone();
        self.hooks.on_add(component, replace, handler, &name)
    }

    pub fn on_remove(
        &mut self,
        component: usize,
        replace: bool,
        handler: impl FnMut(Entity, &Snapshot) + Send + 'static,
    ) -> Result<()> {
        let name = self.registry.by_index(component)?.name.clone();
        self.hooks.on_remove(component, replace, handler, &name)
    }

    pub fn on_set(
        &mut self,
        component: usize,
        replace: bool,
        handler: impl FnMut(Entity, &Snapshot, &Snapshot) + Send + 'static,
    ) -> Result<()> {
        let name = self.registry.by_index(component)?.name.clone();
        self.hooks.on_set(component, replace, handler, &name)
    }

    pub fn with_hooks_disabled<R>(&mut self, f: impl FnOnce(&mut World) -> R) -> R {
        let previous = self.hooks.is_enabled();
        self.hooks.set_enabled(false);
        let result = f(self);
        self.hooks.set_enabled(previous);
        result
    }

    // ---- Events -----------------------------------------------------------

    pub fn emit_event(&mut self, event_type: impl Into<String>, payload: Json) {
        self.events.emit(event_type, payload);
    }

    pub fn on_event(
        &mut self,
        event_type: impl Into<String>,
        priority: i32,
        handler: impl FnMut(&str, &Json) + Send + 'static,
    ) {
        self.events.on(event_type, priority, handler);
    }

    pub fn on_event_wildcard(&mut self, priority: i32, handler: impl FnMut(&str, &Json) + Send + 'static) {
        self.events.on_wildcard(priority, handler);
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    // ---- Resources --------------------------------------------------------

    pub fn insert_resource<R: Send + Sync + 'static>(&mut self, resource: R) {
        self.resources.insert(resource);
    }

    pub fn resource<R: 'static>(&self) -> Option<&R> {
        self.resources.get()
    }

    pub fn resource_mut<R: 'static>(&mut self) -> Option<&mut R> {
        self.resources.get_mut()
    }

    pub fn has_resource<R: 'static>(&self) -> bool {
        self.resources.contains::<R>()
    }

    pub fn remove_resource<R: 'static>(&mut self) -> Option<R> {
        self.resources.remove()
    }

    pub fn set_resource_json(&mut self, key: impl Into<String>, value: Json) {
        self.resources.set_json(key, value);
    }

    pub fn resource_json(&self, key: &str) -> Option<&Json> {
        self.resources.get_json(key)
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.resources
    }

    // ---- Spatial grid -------------------------------------------------------

    pub fn spatial(&self) -> &SpatialGrid {
        &self.spatial
    }

    pub fn spatial_mut(&mut self) -> &mut SpatialGrid {
        &mut self.spatial
    }

    /// Reconcile the default spatial grid's copy of `entity`'s position
    /// from `component`'s `(x_field, y_field)`. Removes the entity from
    /// the grid if either field is absent (`spec.md` §4.14's
    /// `SpatialIndex::sync_entity`).
    pub fn sync_spatial_entity(&mut self, entity: Entity, component: usize, x_field: usize, y_field: usize) -> bool {
        let x = self.field_value_by_index(entity, component, x_field).and_then(|v| v.as_f64());
        let y = self.field_value_by_index(entity, component, y_field).and_then(|v| v.as_f64());
        match (x, y) {
            (Some(x), Some(y)) => {
                self.spatial.update(entity, x as f32, y as f32);
                true
            }
            _ => {
                self.spatial.remove(entity);
                false
            }
        }
    }

    // ---- Queries ------------------------------------------------------------

    pub fn query_run(&mut self, query: &Query, callback: impl FnMut(&View)) {
        query.run(&self.graph, &self.registry, &mut self.query_cache, callback);
    }

    pub fn query_collect(&mut self, query: &Query) -> Vec<Entity> {
        query.collect(&self.graph, &self.registry, &mut self.query_cache)
    }

    pub fn query_count(&mut self, query: &Query) -> usize {
        query.count(&self.graph, &self.registry, &mut self.query_cache)
    }

    pub fn query_first(&mut self, query: &Query) -> Option<Entity> {
        query.first(&self.graph, &self.registry, &mut self.query_cache)
    }

    pub fn query_cache_stats(&self) -> (u64, u64) {
        (self.query_cache.hits(), self.query_cache.misses())
    }

    // ---- Internals exposed for serialization/inspector ----------------------

    pub fn graph(&self) -> &ArchetypeGraph {
        &self.graph
    }

    pub fn strings(&self) -> &StringPool {
        &self.strings
    }

    pub fn strings_mut(&mut self) -> &mut StringPool {
        &mut self.strings
    }

    pub fn allocator(&self) -> &EntityAllocator {
        &self.allocator
    }

    /// Run every scheduled system phase in order, then flush the event
    /// queue, clear every archetype's change flags, and advance the tick
    /// counter (`spec.md` §4.5). The scheduler lives outside `World` (see
    /// module doc) so it is passed in rather than stored.
    pub fn run_tick(&mut self, scheduler: &mut Scheduler) -> Result<()> {
        #[cfg(feature = "profiling")]
        let span = tracing::info_span!("world.run_tick", tick = self.tick);
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        scheduler.run_all(self)?;
        self.events.flush()?;
        for archetype in self.graph.iter_mut() {
            archetype.clear_change_flags();
        }
        self.tick += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::PrimitiveType;

    fn make_world() -> (World, usize) {
        let mut world = World::new().unwrap();
        let position = world
            .register_component(
                "Position",
                ComponentBuilder::new()
                    .field("x", PrimitiveType::F32)
                    .field("y", PrimitiveType::F32),
            )
            .unwrap();
        (world, position)
    }

    #[test]
    fn spawn_initializes_defaults_and_fires_on_add() {
        let (mut world, position) = make_world();
        let log = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let l = log.clone();
        world
            .on_add(position, false, move |e, _| l.lock().unwrap().push(e))
            .unwrap();

        let e = world.spawn(&[position]).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![e]);
        assert_eq!(world.get(e, position).unwrap()["x"], Value::F32(0.0));
    }

    #[test]
    fn despawn_frees_handle_and_fires_on_remove() {
        let (mut world, position) = make_world();
        let fired = std::sync::Arc::new(std::sync::Mutex::new(false));
        let f = fired.clone();
        world
            .on_remove(position, false, move |_, _| *f.lock().unwrap() = true)
            .unwrap();

        let e = world.spawn(&[position]).unwrap();
        assert!(world.despawn(e));
        assert!(!world.is_alive(e));
        assert!(*fired.lock().unwrap());
    }

    #[test]
    fn despawn_on_dead_handle_is_noop() {
        let (mut world, position) = make_world();
        let e = world.spawn(&[position]).unwrap();
        world.despawn(e);
        assert!(!world.despawn(e));
    }

    #[test]
    fn add_transitions_archetype_and_preserves_existing_fields() {
        let (mut world, position) = make_world();
        let velocity = world
            .register_component("Velocity", ComponentBuilder::new().field("dx", PrimitiveType::F32))
            .unwrap();

        let e = world.spawn(&[position]).unwrap();
        let mut partial = FxHashMap::default();
        partial.insert("x".to_string(), Value::F32(5.0));
        world.set(e, position, partial).unwrap();

        let mut vel_partial = FxHashMap::default();
        vel_partial.insert("dx".to_string(), Value::F32(2.0));
        world.add(e, velocity, vel_partial).unwrap();

        assert_eq!(world.get(e, position).unwrap()["x"], Value::F32(5.0));
        assert_eq!(world.get(e, velocity).unwrap()["dx"], Value::F32(2.0));
    }

    #[test]
    fn add_on_existing_component_delegates_to_set() {
        let (mut world, position) = make_world();
        let e = world.spawn(&[position]).unwrap();
        let mut partial = FxHashMap::default();
        partial.insert("x".to_string(), Value::F32(9.0));
        world.add(e, position, partial).unwrap();
        assert_eq!(world.get(e, position).unwrap()["x"], Value::F32(9.0));
    }

    #[test]
    fn remove_transitions_and_drops_component() {
        let (mut world, position) = make_world();
        let e = world.spawn(&[position]).unwrap();
        assert!(world.remove(e, position).unwrap());
        assert!(!world.has_component(e, position));
    }

    #[test]
    fn set_fires_on_set_with_prev_and_next_snapshots() {
        let (mut world, position) = make_world();
        let e = world.spawn(&[position]).unwrap();
        let log = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let l = log.clone();
        world
            .on_set(position, false, move |_, prev, next| {
                l.lock().unwrap().push((prev.get("x").copied(), next.get("x").copied()));
            })
            .unwrap();

        let mut partial = FxHashMap::default();
        partial.insert("x".to_string(), Value::F32(3.0));
        world.set(e, position, partial).unwrap();

        assert_eq!(
            log.lock().unwrap()[0],
            (Some(Value::F32(0.0)), Some(Value::F32(3.0)))
        );
    }

    #[test]
    fn despawn_cascades_through_relation_store() {
        let (mut world, position) = make_world();
        world
            .register_relation_type("owns", false, false, CascadePolicy::CascadeTarget)
            .unwrap();
        let owner = world.spawn(&[position]).unwrap();
        let owned = world.spawn(&[position]).unwrap();
        world.relate(owner, "owns", owned, FxHashMap::default()).unwrap();

        world.despawn(owner);
        assert!(!world.is_alive(owned));
    }

    #[test]
    fn despawn_nullifies_entity_ref_fields() {
        let mut world = World::new().unwrap();
        let holder_comp = world
            .register_component("Holder", ComponentBuilder::new().field("target", PrimitiveType::Entity))
            .unwrap();
        let a = world.spawn(&[holder_comp]).unwrap();
        let b = world.spawn(&[holder_comp]).unwrap();
        world.set_entity_ref(a, holder_comp, "target", b).unwrap();

        world.despawn(b);
        assert_eq!(world.get_entity_ref(a, holder_comp, "target"), None);
        assert_eq!(
            world.get_entity_ref_raw(a, holder_comp, "target"),
            Some(crate::entity::NULL_ENTITY)
        );
    }

    #[test]
    fn relate_on_dead_entity_fails_without_mutation() {
        let (mut world, position) = make_world();
        world.register_relation_type("owns", false, false, CascadePolicy::None).unwrap();
        let a = world.spawn(&[position]).unwrap();
        let b = world.spawn(&[position]).unwrap();
        world.despawn(b);
        assert!(matches!(
            world.relate(a, "owns", b, FxHashMap::default()),
            Err(EcsError::DeadEntity)
        ));
        assert!(!world.has_relation(a, "owns", b));
    }

    #[test]
    fn run_tick_flushes_events_and_clears_change_flags() {
        let (mut world, position) = make_world();
        let mut scheduler = Scheduler::new();
        let e = world.spawn(&[position]).unwrap();

        let delivered = std::sync::Arc::new(std::sync::Mutex::new(false));
        let d = delivered.clone();
        world.on_event("tick.done", 0, move |_, _| *d.lock().unwrap() = true);
        world.emit_event("tick.done", Json::Null);

        world.run_tick(&mut scheduler).unwrap();
        assert!(*delivered.lock().unwrap());
        assert_eq!(world.tick(), 1);

        let record = world.allocator().record(e).unwrap();
        let archetype = world.graph().get(record.archetype);
        assert_eq!(archetype.change_flag(record.row), crate::archetype::ChangeFlag::None);
    }

    #[test]
    fn spatial_sync_tracks_component_position() {
        let (mut world, position) = make_world();
        let e = world.spawn(&[position]).unwrap();
        let mut partial = FxHashMap::default();
        partial.insert("x".to_string(), Value::F32(12.0));
        partial.insert("y".to_string(), Value::F32(34.0));
        world.set(e, position, partial).unwrap();

        assert!(world.sync_spatial_entity(e, position, 0, 1));
        assert_eq!(world.spatial().position(e), Some((12.0, 34.0)));
    }
}
