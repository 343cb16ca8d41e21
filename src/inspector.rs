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

//! Read-only world inspection: archetype/entity summaries and a text dump.
//! No method here mutates the world (`spec.md` §6 "Inspector interface").
//!
//! Grounded in the teacher's `WorldInspector`/`ArchetypeInfo` pair
//! (`src/debug.rs`), adapted from `TypeId`-keyed signatures to named
//! components.

use std::fmt::Write as _;

use crate::entity::Entity;
use crate::world::World;

#[derive(Debug, Clone)]
pub struct ArchetypeInfo {
    pub id: usize,
    pub components: Vec<String>,
    pub entity_count: usize,
}

#[derive(Debug, Clone)]
pub struct WorldStats {
    pub entity_count: usize,
    pub archetype_count: usize,
    pub component_count: usize,
    pub query_cache_hits: u64,
    pub query_cache_misses: u64,
    pub tick: u32,
}

#[derive(Debug, Clone)]
pub struct EntityInfo {
    pub entity: Entity,
    pub archetype_id: usize,
    pub components: Vec<String>,
}

pub fn stats(world: &World) -> WorldStats {
    let (hits, misses) = world.query_cache_stats();
    WorldStats {
        entity_count: world.entity_count(),
        archetype_count: world.graph().len(),
        component_count: world.registry().len(),
        query_cache_hits: hits,
        query_cache_misses: misses,
        tick: world.tick(),
    }
}

pub fn list_archetypes(world: &World) -> Vec<ArchetypeInfo> {
    world
        .graph()
        .iter()
        .map(|(id, archetype)| ArchetypeInfo {
            id,
            components: archetype
                .component_indices
                .iter()
                .map(|&c| {
                    world
                        .registry()
                        .by_index(c)
                        .map(|d| d.name.clone())
                        .unwrap_or_else(|_| format!("#{c}"))
                })
                .collect(),
            entity_count: archetype.count(),
        })
        .collect()
}

pub fn inspect_entity(world: &World, entity: Entity) -> Option<EntityInfo> {
    let record = world.allocator().record(entity)?;
    let archetype = world.graph().get(record.archetype);
    let components = archetype
        .component_indices
        .iter()
        .map(|&c| {
            world
                .registry()
                .by_index(c)
                .map(|d| d.name.clone())
                .unwrap_or_else(|_| format!("#{c}"))
        })
        .collect();
    Some(EntityInfo {
        entity,
        archetype_id: record.archetype,
        components,
    })
}

/// Every live entity carrying all of `components` (by name). Unknown names
/// simply match nothing rather than erroring.
pub fn find_entities_with(world: &World, components: &[&str]) -> Vec<Entity> {
    let indices: Vec<usize> = components.iter().filter_map(|&name| world.component_index(name)).collect();
    if indices.len() != components.len() {
        return Vec::new();
    }
    world
        .allocator()
        .iter_live()
        .filter(|&e| {
            let Some(record) = world.allocator().record(e) else {
                return false;
            };
            let archetype = world.graph().get(record.archetype);
            indices.iter().all(|&c| archetype.has_component(c))
        })
        .collect()
}

/// A human-readable text dump of the whole world: stats, per-archetype
/// breakdown, and resource keys. Intended for debug logging, not for
/// machine parsing.
pub fn dump_world(world: &World) -> String {
    let mut out = String::new();
    let s = stats(world);
    let _ = writeln!(
        out,
        "World: tick={} entities={} archetypes={} components={} query_cache(hits={} misses={})",
        s.tick, s.entity_count, s.archetype_count, s.component_count, s.query_cache_hits, s.query_cache_misses
    );

    for info in list_archetypes(world) {
        let _ = writeln!(
            out,
            "  archetype #{}: [{}] -> {} entities",
            info.id,
            info.components.join(", "),
            info.entity_count
        );
    }

    let resource_keys: Vec<&str> = world.resources().json_iter().map(|(k, _)| k).collect();
    if !resource_keys.is_empty() {
        let _ = writeln!(out, "  resources: [{}]", resource_keys.join(", "));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentBuilder;

    #[test]
    fn stats_reflects_entity_and_archetype_counts() {
        let mut world = World::new().unwrap();
        let tag = world.register_tag("Marker").unwrap();
        world.spawn(&[tag]).unwrap();
        world.spawn(&[tag]).unwrap();

        let s = stats(&world);
        assert_eq!(s.entity_count, 2);
        assert_eq!(s.component_count, 1);
    }

    #[test]
    fn list_archetypes_names_resident_components() {
        let mut world = World::new().unwrap();
        let position = world
            .register_component("Position", ComponentBuilder::new().field("x", crate::component::PrimitiveType::F32))
            .unwrap();
        world.spawn(&[position]).unwrap();

        let archetypes = list_archetypes(&world);
        assert!(archetypes.iter().any(|a| a.components == vec!["Position".to_string()]));
    }

    #[test]
    fn inspect_entity_reports_components_and_none_for_dead() {
        let mut world = World::new().unwrap();
        let tag = world.register_tag("Marker").unwrap();
        let e = world.spawn(&[tag]).unwrap();

        let info = inspect_entity(&world, e).unwrap();
        assert_eq!(info.components, vec!["Marker".to_string()]);

        world.despawn(e);
        assert!(inspect_entity(&world, e).is_none());
    }

    #[test]
    fn find_entities_with_matches_only_entities_holding_all_components() {
        let mut world = World::new().unwrap();
        let a = world.register_tag("A").unwrap();
        let b = world.register_tag("B").unwrap();
        let e1 = world.spawn(&[a, b]).unwrap();
        let _e2 = world.spawn(&[a]).unwrap();

        let found = find_entities_with(&world, &["A", "B"]);
        assert_eq!(found, vec![e1]);
    }

    #[test]
    fn dump_world_includes_archetype_breakdown() {
        let mut world = World::new().unwrap();
        let tag = world.register_tag("Marker").unwrap();
        world.spawn(&[tag]).unwrap();
        let dump = dump_world(&world);
        assert!(dump.contains("Marker"));
        assert!(dump.contains("entities=1"));
    }
}
