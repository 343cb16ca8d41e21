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

//! Archetype graph: lazily-created archetypes plus memoized add/remove
//! transition edges.
//!
//! Grounded in the teacher's `archetype_index: AHashMap<ArchetypeSignature,
//! usize>` and `transitions: AHashMap<(usize, TypeId, bool), usize>`
//! (`src/world.rs`), generalized from `TypeId` keys to dense component
//! indices.

use rustc_hash::FxHashMap;

use crate::archetype::Archetype;
use crate::component::ComponentRegistry;
use crate::error::Result;
use crate::mask::Mask;

/// Sorted component-index list identifying an archetype.
pub type Signature = Vec<usize>;

fn sorted_signature(mut indices: Vec<usize>) -> Signature {
    indices.sort_unstable();
    indices.dedup();
    indices
}

#[derive(Default)]
pub struct ArchetypeGraph {
    archetypes: Vec<Archetype>,
    by_signature: FxHashMap<Signature, usize>,
    add_edges: FxHashMap<(usize, usize), usize>,
    remove_edges: FxHashMap<(usize, usize), Option<usize>>,
}

impl ArchetypeGraph {
    pub fn new(registry: &ComponentRegistry) -> Result<Self> {
        let mut graph = Self::default();
        // Archetype 0 is always the empty (null) archetype.
        graph.get_or_create(&[], registry)?;
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    pub fn get(&self, id: usize) -> &Archetype {
        &self.archetypes[id]
    }

    pub fn get_mut(&mut self, id: usize) -> &mut Archetype {
        &mut self.archetypes[id]
    }

    pub fn get_pair_mut(&mut self, a: usize, b: usize) -> (&mut Archetype, &mut Archetype) {
        assert_ne!(a, b);
        if a < b {
            let (left, right) = self.archetypes.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.archetypes.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    /// Null archetype index (empty component set). Always 0.
    pub const NULL: usize = 0;

    pub fn get_or_create(
        &mut self,
        components: &[usize],
        registry: &ComponentRegistry,
    ) -> Result<usize> {
        let sig = sorted_signature(components.to_vec());
        if let Some(&id) = self.by_signature.get(&sig) {
            return Ok(id);
        }
        let archetype = Archetype::new(sig.clone(), registry)?;
        let id = self.archetypes.len();
        self.archetypes.push(archetype);
        self.by_signature.insert(sig, id);
        Ok(id)
    }

    /// Memoized `add(A, C)` transition.
    pub fn add_transition(
        &mut self,
        from: usize,
        component: usize,
        registry: &ComponentRegistry,
    ) -> Result<usize> {
        if let Some(&to) = self.add_edges.get(&(from, component)) {
            return Ok(to);
        }
        let mut sig = self.archetypes[from].component_indices.clone();
        sig.push(component);
        let to = self.get_or_create(&sig, registry)?;
        self.add_edges.insert((from, component), to);
        Ok(to)
    }

    /// Memoized `remove(A, C)` transition. `None` means the empty archetype.
    pub fn remove_transition(
        &mut self,
        from: usize,
        component: usize,
        registry: &ComponentRegistry,
    ) -> Result<usize> {
        if let Some(&to) = self.remove_edges.get(&(from, component)) {
            return Ok(to.unwrap_or(Self::NULL));
        }
        let sig: Vec<usize> = self.archetypes[from]
            .component_indices
            .iter()
            .copied()
            .filter(|&c| c != component)
            .collect();
        let to = self.get_or_create(&sig, registry)?;
        self.remove_edges
            .insert((from, component), if sig.is_empty() { None } else { Some(to) });
        Ok(to)
    }

    /// Linear scan over all archetypes matching `with`/`without` masks.
    /// The query cache in front of this mitigates the O(n) cost.
    pub fn matching(&self, with: &Mask, without: &Mask) -> Vec<usize> {
        self.archetypes
            .iter()
            .enumerate()
            .filter_map(|(id, arch)| {
                (arch.mask.contains_all(with) && arch.mask.disjoint(without)).then_some(id)
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Archetype)> {
        self.archetypes.iter().enumerate()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Archetype> {
        self.archetypes.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentBuilder;

    fn registry() -> ComponentRegistry {
        let mut reg = ComponentRegistry::new();
        reg.register_tag("A").unwrap();
        reg.register_tag("B").unwrap();
        reg.register("C", ComponentBuilder::new()).unwrap();
        reg
    }

    #[test]
    fn transitions_are_memoized_and_lazy() {
        let reg = registry();
        let mut graph = ArchetypeGraph::new(&reg).unwrap();
        assert_eq!(graph.len(), 1);

        let a = graph.add_transition(ArchetypeGraph::NULL, 0, &reg).unwrap();
        assert_eq!(graph.len(), 2);
        let a_again = graph.add_transition(ArchetypeGraph::NULL, 0, &reg).unwrap();
        assert_eq!(a, a_again);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn remove_to_empty_returns_null() {
        let reg = registry();
        let mut graph = ArchetypeGraph::new(&reg).unwrap();
        let a = graph.add_transition(ArchetypeGraph::NULL, 0, &reg).unwrap();
        let back = graph.remove_transition(a, 0, &reg).unwrap();
        assert_eq!(back, ArchetypeGraph::NULL);
    }

    #[test]
    fn matching_respects_with_and_without() {
        let reg = registry();
        let mut graph = ArchetypeGraph::new(&reg).unwrap();
        let a = graph.add_transition(ArchetypeGraph::NULL, 0, &reg).unwrap();
        let ab = graph.add_transition(a, 1, &reg).unwrap();

        let mut with = Mask::new();
        with.set(0);
        let without = Mask::new();
        let matches = graph.matching(&with, &without);
        assert!(matches.contains(&a));
        assert!(matches.contains(&ab));

        let mut without_b = Mask::new();
        without_b.set(1);
        let matches2 = graph.matching(&with, &without_b);
        assert!(matches2.contains(&a));
        assert!(!matches2.contains(&ab));
    }
}
